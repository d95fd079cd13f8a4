// src/cli.rs

//! CLI argument parsing using `clap`.

use std::path::PathBuf;

use clap::{Args, Parser, Subcommand, ValueEnum};

use crate::config::default_config_path;
use crate::types::ExecutionMode;

/// Command-line arguments for `taskdag`.
#[derive(Debug, Clone, Parser)]
#[command(
    name = "taskdag",
    version,
    about = "Run DAGs of dependent tasks with bounded parallelism.",
    long_about = None
)]
pub struct CliArgs {
    /// Logging level (error, warn, info, debug, trace).
    ///
    /// If omitted, `TASKDAG_LOG` or a default level will be used.
    #[arg(long, value_enum, value_name = "LEVEL", global = true)]
    pub log_level: Option<LogLevel>,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Clone, Subcommand)]
pub enum Command {
    /// Execute a DAG from a config file.
    Run(RunArgs),

    /// Check a config file and print a summary of the DAG.
    Validate(ConfigArgs),

    /// Print the execution levels of a DAG without running it.
    Plan(ConfigArgs),

    /// List the functions that function tasks can reference.
    Functions,
}

#[derive(Debug, Clone, Args)]
pub struct ConfigArgs {
    /// Path to the config file (TOML, or JSON with a `.json` extension).
    #[arg(long, short, value_name = "PATH", default_value_os_t = default_config_path())]
    pub config: PathBuf,
}

#[derive(Debug, Clone, Args)]
pub struct RunArgs {
    #[command(flatten)]
    pub config: ConfigArgs,

    /// Override the DAG's `max_workers`.
    #[arg(long, value_name = "N", value_parser = parse_workers)]
    pub max_workers: Option<usize>,

    /// Override the DAG's execution mode (threaded or process).
    #[arg(long, value_name = "MODE")]
    pub execution_mode: Option<ExecutionMode>,

    /// Print the execution plan before running.
    #[arg(long)]
    pub plan: bool,

    /// Print the final result as JSON on stdout.
    #[arg(long)]
    pub json: bool,
}

/// Log level as exposed on the CLI.
#[derive(Debug, Copy, Clone, ValueEnum)]
pub enum LogLevel {
    Error,
    Warn,
    Info,
    Debug,
    Trace,
}

impl LogLevel {
    pub fn as_str(self) -> &'static str {
        match self {
            LogLevel::Error => "error",
            LogLevel::Warn => "warn",
            LogLevel::Info => "info",
            LogLevel::Debug => "debug",
            LogLevel::Trace => "trace",
        }
    }
}

fn parse_workers(s: &str) -> Result<usize, String> {
    match s.parse::<usize>() {
        Ok(0) => Err("max workers must be at least 1".to_string()),
        Ok(n) => Ok(n),
        Err(e) => Err(format!("invalid number '{s}': {e}")),
    }
}

/// Convenience wrapper around `CliArgs::parse()`.
pub fn parse() -> CliArgs {
    CliArgs::parse()
}
