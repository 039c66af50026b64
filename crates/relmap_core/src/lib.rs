//! Criteria-driven relational mapping with identity-mapped repositories.
//!
//! Filter maps become criteria trees (`CriteriaFactory`), criteria compile to
//! flat SQL (`QueryBuilder`), rows map to attributes (`Mapper`), and
//! repositories track loaded entities to publish change events.

pub mod config;
pub mod criteria;
pub mod db;
pub mod logging;
pub mod mapper;
pub mod query;
pub mod repo;

pub use config::{ConfigError, ConfigResult, EntityDefinition, EntityMap, Relation};
pub use criteria::{
    Criteria, CriteriaError, CriteriaFactory, Direction, Filter, NamedCriteriaRegistry,
    NamedCriterion, Operand, Operator,
};
pub use logging::{default_log_level, init_logging, logging_status};
pub use mapper::{Attributes, Mapper, MapperError, Row};
pub use query::{Query, QueryBuilder, RenderedQuery};
pub use repo::{
    AddOutcome, Entity, EntityEvent, EntityFactory, EntityRepository, EventManager, EventSink,
    Executor, FinderAggregateRepository, InMemoryRepository, Record, RecordFactory, RepoError,
    RepoResult, Repository, SqliteExecutor,
};

/// Returns the core crate version.
pub fn core_version() -> &'static str {
    env!("CARGO_PKG_VERSION")
}
