//! SQLite connection bootstrap and value conversion.
//!
//! # Responsibility
//! - Open and configure SQLite connections for repositories.
//! - Convert between JSON values and SQLite storage values.
//!
//! # Invariants
//! - Returned connections have `foreign_keys=ON` and a busy timeout.
//! - Schema management belongs to the caller; nothing here creates tables.

use std::error::Error;
use std::fmt::{Display, Formatter};

mod open;
mod value;

pub use open::{open_db, open_db_in_memory, BUSY_TIMEOUT};
pub use value::{json_from_sql, json_to_sql};

pub type DbResult<T> = Result<T, DbError>;

#[derive(Debug)]
pub enum DbError {
    Sqlite(rusqlite::Error),
    /// Column holds a storage class that has no JSON form (BLOB).
    UnsupportedValue { column: String, storage: String },
}

impl Display for DbError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Sqlite(err) => write!(f, "{err}"),
            Self::UnsupportedValue { column, storage } => write!(
                f,
                "column `{column}` holds {storage} data which cannot be mapped"
            ),
        }
    }
}

impl Error for DbError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Sqlite(err) => Some(err),
            Self::UnsupportedValue { .. } => None,
        }
    }
}

impl From<rusqlite::Error> for DbError {
    fn from(value: rusqlite::Error) -> Self {
        Self::Sqlite(value)
    }
}
