//! Relational query model and criteria compilation.
//!
//! # Responsibility
//! - Compile criteria trees into one flat `SELECT` (one FROM, N joins).
//! - Render queries to SQL text with positional `?` parameters.
//!
//! # Invariants
//! - Every attribute is resolved through the entity map; unknown names fail
//!   with `ConfigError` before any SQL is produced.
//! - Parameters appear in the same order as their placeholders.
//! - LIMIT/OFFSET come from the root criteria node only.

mod builder;
mod statement;

pub use builder::QueryBuilder;
pub use statement::{Condition, Join, OrderClause, Projection, Query, RenderedQuery};
