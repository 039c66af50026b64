//! Entity map configuration: tables, column maps, relations.
//!
//! # Responsibility
//! - Load the entity map from JSON and validate it once at construction.
//! - Serve read-only lookups (table, column, relation, primary key) to the
//!   criteria, query and mapper layers.
//!
//! # Invariants
//! - Every configured column map is a bijection (column <-> attribute).
//! - Relations have exactly two (direct join) or three (link table) parts.
//! - Lookup failures are configuration errors, never query errors.

use std::error::Error;
use std::fmt::{Display, Formatter};

mod entity_map;

pub use entity_map::{
    ColumnMap, ColumnSerializer, EntityDefinition, EntityMap, Relation, DEFAULT_PRIMARY_KEY,
};

pub type ConfigResult<T> = Result<T, ConfigError>;

/// Missing or malformed entity map entry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConfigError {
    /// No entry exists for the entity name.
    EntityNotConfigured(String),
    /// Entity entry has an empty table name.
    MissingTable(String),
    /// Entity was registered twice.
    DuplicateEntity(String),
    /// Attribute is not declared in the entity column map.
    UnknownAttribute { entity: String, attribute: String },
    /// Column is not declared in the entity column map.
    UnknownColumn { entity: String, column: String },
    /// Two columns map to the same attribute.
    DuplicateAttribute { entity: String, attribute: String },
    /// Relation to `related` is not declared on `entity`.
    UnknownRelation { entity: String, related: String },
    /// Relation declaration does not have 2 or 3 parts.
    InvalidRelation {
        entity: String,
        related: String,
        parts: usize,
    },
    /// Relation exists but is not a many-to-many link.
    NotManyToMany { entity: String, related: String },
    /// Column serializer name is not supported.
    UnsupportedSerializer {
        entity: String,
        column: String,
        serializer: String,
    },
    /// Entity map source could not be read.
    Io { path: String, message: String },
    /// Entity map source is not valid JSON for the expected shape.
    Parse(String),
}

impl Display for ConfigError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::EntityNotConfigured(entity) => {
                write!(f, "entity map not configured for `{entity}`")
            }
            Self::MissingTable(entity) => write!(f, "entity map table not configured for `{entity}`"),
            Self::DuplicateEntity(entity) => write!(f, "entity `{entity}` is already configured"),
            Self::UnknownAttribute { entity, attribute } => write!(
                f,
                "attribute `{attribute}` is not declared in the column map of `{entity}`"
            ),
            Self::UnknownColumn { entity, column } => write!(
                f,
                "column `{column}` is not declared in the column map of `{entity}`"
            ),
            Self::DuplicateAttribute { entity, attribute } => write!(
                f,
                "attribute `{attribute}` is mapped by more than one column of `{entity}`"
            ),
            Self::UnknownRelation { entity, related } => {
                write!(f, "entity `{entity}` is not configured with relation `{related}`")
            }
            Self::InvalidRelation {
                entity,
                related,
                parts,
            } => write!(
                f,
                "relation `{entity}` -> `{related}` must have 2 or 3 parts, got {parts}"
            ),
            Self::NotManyToMany { entity, related } => write!(
                f,
                "relation `{entity}` -> `{related}` is not [link-table, field, joined-field]"
            ),
            Self::UnsupportedSerializer {
                entity,
                column,
                serializer,
            } => write!(
                f,
                "serializer `{serializer}` for `{entity}.{column}` is unsupported; expected json"
            ),
            Self::Io { path, message } => write!(f, "cannot read entity map `{path}`: {message}"),
            Self::Parse(message) => write!(f, "invalid entity map: {message}"),
        }
    }
}

impl Error for ConfigError {}

impl From<serde_json::Error> for ConfigError {
    fn from(value: serde_json::Error) -> Self {
        Self::Parse(value.to_string())
    }
}
