//! Repository layer: identity-mapped entity access with change events.
//!
//! # Responsibility
//! - Orchestrate criteria -> query -> executor -> mapper -> entity factory
//!   for reads, and mapper -> executor for writes.
//! - Track loaded entities (live + snapshot) to detect changes on `add`.
//! - Publish lifecycle and per-attribute change events.
//!
//! # Invariants
//! - Every identity map entry has a snapshot; snapshots only move after a
//!   successful write.
//! - `add` maps the entity to a row before any event fires.
//! - Repositories are single-threaded; shared handles use `Rc`.
//!
//! # See also
//! - `criteria::CriteriaFactory`, `query::QueryBuilder`, `mapper::Mapper`.

use crate::config::ConfigError;
use crate::criteria::{Criteria, CriteriaError, Filter};
use crate::db::DbError;
use crate::mapper::MapperError;
use serde_json::Value;
use std::error::Error;
use std::fmt::{Display, Formatter};

mod aggregate;
mod entity;
mod events;
mod executor;
mod identity_map;
mod in_memory;
mod repository;

pub use aggregate::{AggregateFactory, FinderAggregateRepository, RelatedEntities};
pub use entity::{Entity, EntityFactory, Record, RecordFactory};
pub use events::{
    changed_attributes, EntityChange, EntityEvent, EventManager, EventSink, SubscriptionId,
};
pub use executor::{Executor, SqliteExecutor};
pub use identity_map::{identity_key, IdentityMap};
pub use in_memory::InMemoryRepository;
pub use repository::Repository;

pub type RepoResult<T> = Result<T, RepoError>;

/// Repository-level error taxonomy.
#[derive(Debug)]
pub enum RepoError {
    /// Missing or malformed entity map entry.
    Config(ConfigError),
    InvalidArgument(String),
    UnknownPredicate { entity: String, name: String },
    UnknownAttribute { entity: String, attribute: String },
    UnknownRelation { entity: String, related: String },
    /// Operation is not supported by this repository (writes on a finder, ...).
    IllegalOperation(String),
    Db(DbError),
    /// Stored data cannot be decoded into attributes.
    InvalidData(String),
}

impl Display for RepoError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Config(err) => write!(f, "{err}"),
            Self::InvalidArgument(message) => write!(f, "invalid argument: {message}"),
            Self::UnknownPredicate { entity, name } => {
                write!(f, "predicate `{name}` is not defined for `{entity}`")
            }
            Self::UnknownAttribute { entity, attribute } => {
                write!(f, "attribute `{attribute}` is not declared for `{entity}`")
            }
            Self::UnknownRelation { entity, related } => {
                write!(f, "relation `{related}` is not declared for `{entity}`")
            }
            Self::IllegalOperation(message) => write!(f, "illegal operation: {message}"),
            Self::Db(err) => write!(f, "{err}"),
            Self::InvalidData(message) => write!(f, "invalid persisted data: {message}"),
        }
    }
}

impl Error for RepoError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Config(err) => Some(err),
            Self::Db(err) => Some(err),
            Self::InvalidArgument(_)
            | Self::UnknownPredicate { .. }
            | Self::UnknownAttribute { .. }
            | Self::UnknownRelation { .. }
            | Self::IllegalOperation(_)
            | Self::InvalidData(_) => None,
        }
    }
}

impl From<ConfigError> for RepoError {
    fn from(value: ConfigError) -> Self {
        match value {
            ConfigError::UnknownAttribute { entity, attribute } => {
                Self::UnknownAttribute { entity, attribute }
            }
            ConfigError::UnknownRelation { entity, related } => {
                Self::UnknownRelation { entity, related }
            }
            other => Self::Config(other),
        }
    }
}

impl From<CriteriaError> for RepoError {
    fn from(value: CriteriaError) -> Self {
        match value {
            CriteriaError::InvalidArgument(message) => Self::InvalidArgument(message),
            CriteriaError::UnknownPredicate { entity, name } => {
                Self::UnknownPredicate { entity, name }
            }
            CriteriaError::Config(err) => err.into(),
        }
    }
}

impl From<MapperError> for RepoError {
    fn from(value: MapperError) -> Self {
        Self::InvalidData(value.to_string())
    }
}

impl From<DbError> for RepoError {
    fn from(value: DbError) -> Self {
        match value {
            DbError::UnsupportedValue { .. } => Self::InvalidData(value.to_string()),
            other => Self::Db(other),
        }
    }
}

impl From<rusqlite::Error> for RepoError {
    fn from(value: rusqlite::Error) -> Self {
        Self::Db(DbError::Sqlite(value))
    }
}

/// Result of [`EntityRepository::add`].
#[derive(Debug, Clone, PartialEq)]
pub enum AddOutcome<E> {
    /// Inserted; carries the entity with its id (possibly substituted by a handler).
    Created(E),
    /// Loaded entity differed from its snapshot and was written.
    Updated { entity: E, affected: usize },
    /// Loaded entity equals its snapshot; nothing written, no events.
    Unchanged(E),
}

impl<E> AddOutcome<E> {
    pub fn entity(&self) -> &E {
        match self {
            Self::Created(entity) | Self::Updated { entity, .. } | Self::Unchanged(entity) => {
                entity
            }
        }
    }

    pub fn into_entity(self) -> E {
        match self {
            Self::Created(entity) | Self::Updated { entity, .. } | Self::Unchanged(entity) => {
                entity
            }
        }
    }
}

/// Repository contract shared by the SQL, in-memory and aggregate finders.
pub trait EntityRepository<E> {
    fn entity_name(&self) -> &str;

    /// Builds criteria for this repository's entity from a filter map.
    fn create_criteria(&self, filter: &Filter) -> RepoResult<Criteria>;

    /// First match only (limit 1, offset 0).
    fn find(&mut self, criteria: &Criteria) -> RepoResult<Option<E>>;

    fn find_many(&mut self, criteria: &Criteria) -> RepoResult<Vec<E>>;

    fn find_by_id(&mut self, id: &Value) -> RepoResult<Option<E>>;

    fn count(&self, criteria: &Criteria) -> RepoResult<u64>;

    /// Inserts a new entity or writes the changes of a loaded one.
    fn add(&mut self, entity: E) -> RepoResult<AddOutcome<E>>;

    /// Deletes by id. `None` when the entity has no id.
    fn remove(&mut self, entity: &E) -> RepoResult<Option<usize>>;

    fn find_by(&mut self, filter: &Filter) -> RepoResult<Option<E>> {
        let criteria = self.create_criteria(filter)?;
        self.find(&criteria)
    }

    fn find_many_by(&mut self, filter: &Filter) -> RepoResult<Vec<E>> {
        let criteria = self.create_criteria(filter)?;
        self.find_many(&criteria)
    }

    fn count_by(&self, filter: &Filter) -> RepoResult<u64> {
        let criteria = self.create_criteria(filter)?;
        self.count(&criteria)
    }
}

/// Rejects criteria built for a different entity than the repository serves.
pub(crate) fn ensure_entity(expected: &str, criteria: &Criteria) -> RepoResult<()> {
    if criteria.entity_name() == expected {
        Ok(())
    } else {
        Err(RepoError::InvalidArgument(format!(
            "criteria for `{}` passed to `{}` repository",
            criteria.entity_name(),
            expected
        )))
    }
}
