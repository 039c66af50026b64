//! relmap command-line tool.
//!
//! # Responsibility
//! - Show the SQL a filter map compiles to for a given entity map.
//! - Run a filter against a SQLite file through the record repository.

mod cli;

use clap::Parser;
use cli::{Cli, Commands, FilterArgs, FindArgs};
use log::error;
use relmap_core::{
    db, default_log_level, init_logging, Criteria, CriteriaFactory, EntityMap, EntityRepository,
    EventManager, QueryBuilder, Record, RecordFactory, Repository,
};
use std::error::Error;
use std::rc::Rc;
use std::sync::Arc;

fn main() {
    let cli = Cli::parse();

    if let Some(log_dir) = cli.log_dir.as_deref() {
        let level = cli.log_level.as_deref().unwrap_or(default_log_level());
        if let Err(err) = init_logging(level, log_dir) {
            eprintln!("warning: logging disabled: {err}");
        }
    }

    let result = match cli.command {
        Commands::Compile(args) => compile(&args),
        Commands::Find(args) => find(&args),
    };

    if let Err(err) = result {
        error!("event=cli_run module=cli status=error error={err}");
        eprintln!("error: {err}");
        std::process::exit(1);
    }
}

fn load(args: &FilterArgs) -> Result<(CriteriaFactory, Criteria), Box<dyn Error>> {
    let entity_map = Arc::new(EntityMap::from_path(&args.entity_map)?);
    let factory = CriteriaFactory::new(entity_map);
    let filter: serde_json::Value = serde_json::from_str(&args.filter)?;
    let criteria = factory.build_from_value(&args.entity, &filter)?;
    Ok((factory, criteria))
}

fn compile(args: &FilterArgs) -> Result<(), Box<dyn Error>> {
    let (factory, criteria) = load(args)?;
    let mut query = QueryBuilder::new(factory.entity_map().clone()).compile(&criteria)?;
    if args.count {
        query = query.into_count();
    }
    let rendered = query.render();
    println!("{}", rendered.sql);
    println!("{}", serde_json::Value::Array(rendered.params));
    Ok(())
}

fn find(args: &FindArgs) -> Result<(), Box<dyn Error>> {
    let (factory, criteria) = load(&args.filter)?;
    let conn = Rc::new(db::open_db(&args.db)?);
    let mut repository: Repository<Record> = Repository::sqlite(
        &args.filter.entity,
        factory,
        conn,
        Box::new(RecordFactory),
        Rc::new(EventManager::<Record>::new()),
    )?;

    if args.filter.count {
        println!("{}", repository.count(&criteria)?);
        return Ok(());
    }
    for record in repository.find_many(&criteria)? {
        println!("{}", serde_json::Value::Object(record.attributes().clone()));
    }
    Ok(())
}
