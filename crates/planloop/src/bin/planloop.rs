//! Execute a plan file against a JSON-seeded in-memory store.
//!
//! Usage: `planloop <plan.json> <store.json> [config.json]`
//!
//! Prints the execution report as JSON on stdout. Exits with status 1 when
//! the plan fails and 2 on usage or load errors.

use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;

use planloop::executor::PlanExecutor;
use planloop::plan::parse_plan;
use planloop::store::MemoryStore;
use planloop::tools::builtin;
use planloop::{CoreError, CoreResult, EngineConfig};
use tracing_subscriber::EnvFilter;

const USAGE: &str = "usage: planloop <plan.json> <store.json> [config.json]";

fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();

    match run(std::env::args().skip(1).map(PathBuf::from).collect()) {
        Ok(true) => ExitCode::SUCCESS,
        Ok(false) => ExitCode::from(1),
        Err(e) => {
            eprintln!("planloop: {e}");
            ExitCode::from(2)
        }
    }
}

fn run(args: Vec<PathBuf>) -> CoreResult<bool> {
    let (plan_path, store_path, config_path) = match args.as_slice() {
        [plan, store] => (plan, store, None),
        [plan, store, config] => (plan, store, Some(config.as_path())),
        _ => return Err(CoreError::InvalidInput(USAGE.into())),
    };

    let config = EngineConfig::load_or_default(config_path)?;
    let store = Arc::new(MemoryStore::load(store_path)?);
    let plan = parse_plan(&std::fs::read_to_string(plan_path)?)?;
    let registry = builtin::customer_service()?;

    tracing::info!(plan = %plan_path.display(), steps = plan.steps.len(), "loaded plan");
    let report = PlanExecutor::new(&registry, config.executor).execute_on(&plan, store)?;

    println!("{}", serde_json::to_string_pretty(&report)?);
    Ok(report.success)
}
