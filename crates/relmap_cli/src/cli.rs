//! CLI argument definitions for the relmap tool.

use clap::{Args, Parser, Subcommand};
use std::path::PathBuf;

/// Compile filter maps to SQL against an entity map, or run them on SQLite.
#[derive(Parser, Debug)]
#[command(name = "relmap")]
#[command(version)]
pub struct Cli {
    /// Absolute directory for rotating log files; logging stays off when unset.
    #[arg(long, global = true, env = "RELMAP_LOG_DIR")]
    pub log_dir: Option<String>,

    /// Log level (trace|debug|info|warn|error).
    #[arg(long, global = true, env = "RELMAP_LOG_LEVEL")]
    pub log_level: Option<String>,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Print the SQL and parameters compiled from a filter
    Compile(FilterArgs),
    /// Run a filter against a SQLite database and print matching records as JSON lines
    Find(FindArgs),
}

#[derive(Args, Debug)]
pub struct FilterArgs {
    /// Entity map JSON file
    #[arg(short, long, env = "RELMAP_ENTITY_MAP")]
    pub entity_map: PathBuf,

    /// Entity name as configured in the entity map
    pub entity: String,

    /// Filter map as a JSON object
    #[arg(default_value = "{}")]
    pub filter: String,

    /// Compile the `COUNT(*)` variant instead
    #[arg(long)]
    pub count: bool,
}

#[derive(Args, Debug)]
pub struct FindArgs {
    #[command(flatten)]
    pub filter: FilterArgs,

    /// SQLite database file
    #[arg(short, long, env = "RELMAP_DB")]
    pub db: PathBuf,
}
