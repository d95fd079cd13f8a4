// src/lib.rs

pub mod cli;
pub mod config;
pub mod dag;
pub mod engine;
pub mod errors;
pub mod exec;
pub mod logging;
pub mod report;
pub mod state;
pub mod types;

use std::path::Path;
use std::process::ExitCode;

use anyhow::Result;
use tracing::{debug, info, warn};

use crate::cli::{CliArgs, Command, RunArgs};
use crate::config::{load_dag, validate_path};
use crate::engine::{Runner, RunnerOptions};
use crate::exec::FunctionRegistry;
use crate::state::DagState;

pub use crate::dag::{Dag, Scheduler, Task};
pub use crate::errors::{DagError, TaskError};
pub use crate::state::{DagResult, TaskResult, TaskState};

/// High-level entry point used by `main.rs`.
///
/// Function tasks resolve against the built-in registry. The returned exit
/// code is non-zero when a run does not end in `Success` or a config is
/// invalid.
pub async fn run(args: CliArgs) -> Result<ExitCode> {
    let registry = FunctionRegistry::with_builtins();

    match args.command {
        Command::Run(run_args) => run_dag_command(run_args, &registry).await,
        Command::Validate(config) => Ok(validate_command(&config.config, &registry)),
        Command::Plan(config) => {
            let dag = load_dag(&config.config, &registry)?;
            println!("{}", report::summary(&dag));
            println!();
            println!("{}", report::execution_plan(&dag));
            Ok(ExitCode::SUCCESS)
        }
        Command::Functions => {
            for name in registry.names() {
                println!("{name}");
            }
            Ok(ExitCode::SUCCESS)
        }
    }
}

async fn run_dag_command(args: RunArgs, registry: &FunctionRegistry) -> Result<ExitCode> {
    let mut dag = load_dag(&args.config.config, registry)?;

    if let Some(max_workers) = args.max_workers {
        dag.set_max_workers(max_workers);
    }
    if let Some(mode) = args.execution_mode {
        dag.set_execution_mode(mode);
    }

    if args.plan {
        println!("{}", report::execution_plan(&dag));
        println!();
    }

    let runner = Runner::new(RunnerOptions::default());

    // Ctrl-C → stop submitting tasks and fail the run.
    {
        let runner = runner.clone();
        tokio::spawn(async move {
            if let Err(e) = tokio::signal::ctrl_c().await {
                eprintln!("failed to listen for Ctrl+C: {e}");
                return;
            }
            warn!("Ctrl+C received; shutting down runner");
            runner.shutdown();
        });
    }

    info!(dag = %dag.dag_id(), max_workers = dag.max_workers(), "running DAG");
    let result = runner.run_dag(&mut dag).await?;

    if args.json {
        println!("{}", serde_json::to_string_pretty(&result.to_dict())?);
    } else {
        println!("{}", report::result_summary(&result));
    }

    debug!(state = %result.state, "run finished");
    Ok(exit_code_for(result.state))
}

fn validate_command(path: &Path, registry: &FunctionRegistry) -> ExitCode {
    println!("Validating configuration: {}", path.display());

    let problems = validate_path(path, registry);
    if !problems.is_empty() {
        println!("Found {} validation error(s):", problems.len());
        for (idx, problem) in problems.iter().enumerate() {
            println!("  {}. {problem}", idx + 1);
        }
        return ExitCode::FAILURE;
    }

    println!("Configuration is valid");
    if let Ok(dag) = load_dag(path, registry) {
        println!();
        println!("{}", report::summary(&dag));
    }
    ExitCode::SUCCESS
}

fn exit_code_for(state: DagState) -> ExitCode {
    match state {
        DagState::Success => ExitCode::SUCCESS,
        _ => ExitCode::FAILURE,
    }
}
