//! Criteria model: query intent for one entity, as a tree.
//!
//! # Responsibility
//! - Hold predicates, joined relation nodes, one OR group, ordering and
//!   pagination for one entity name.
//! - Parse flat filter maps into criteria trees (`CriteriaFactory`).
//! - Evaluate criteria against attribute maps for in-process stores.
//!
//! # Invariants
//! - Predicate, relation and OR-group order is insertion order.
//! - `limit`/`offset` are never negative.
//! - Criteria never touch storage.
//!
//! # See also
//! - `query::QueryBuilder` for SQL compilation.

use crate::config::ConfigError;
use std::error::Error;
use std::fmt::{Display, Formatter};

mod evaluate;
mod factory;
mod named;
mod node;
mod predicate;

pub use evaluate::{compare_values, order_records, CriteriaMatcher};
pub use factory::CriteriaFactory;
pub use named::{NamedCriteriaRegistry, NamedCriterion};
pub use node::Criteria;
pub use predicate::{Direction, Operand, Operator, OrderTerm, Predicate};

/// Ordered string-keyed filter map (`serde_json` with `preserve_order`).
pub type Filter = serde_json::Map<String, serde_json::Value>;

pub type CriteriaResult<T> = Result<T, CriteriaError>;

/// Errors raised while building or evaluating criteria.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CriteriaError {
    /// Malformed caller input (negative limit, bad `between` operand, ...).
    InvalidArgument(String),
    /// Operator token or named criterion is not recognized.
    UnknownPredicate { entity: String, name: String },
    /// Entity map lookup failed.
    Config(ConfigError),
}

impl CriteriaError {
    pub(crate) fn invalid(message: impl Into<String>) -> Self {
        Self::InvalidArgument(message.into())
    }
}

impl Display for CriteriaError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::InvalidArgument(message) => write!(f, "invalid argument: {message}"),
            Self::UnknownPredicate { entity, name } => {
                write!(f, "predicate `{name}` is not defined for `{entity}`")
            }
            Self::Config(err) => write!(f, "{err}"),
        }
    }
}

impl Error for CriteriaError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Config(err) => Some(err),
            Self::InvalidArgument(_) | Self::UnknownPredicate { .. } => None,
        }
    }
}

impl From<ConfigError> for CriteriaError {
    fn from(value: ConfigError) -> Self {
        Self::Config(value)
    }
}
