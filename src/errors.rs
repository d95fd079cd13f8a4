// src/errors.rs

//! Crate-wide error types.
//!
//! Two families live here:
//! - [`DagError`]: structural and orchestration errors. These surface out of
//!   `Dag`, the config layer and the runner, and abort a run before any task
//!   executes.
//! - [`TaskError`]: per-attempt failures of a task body. These are always
//!   captured into a `TaskResult` and never propagate out of the runner.

use std::time::Duration;

use serde::{Serialize, Serializer};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum DagError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("TOML parsing error: {0}")]
    Toml(#[from] toml::de::Error),

    #[error("TOML serialization error: {0}")]
    TomlSer(#[from] toml::ser::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Task not found: {0}")]
    TaskNotFound(String),

    #[error("Task with ID '{0}' already exists")]
    DuplicateTask(String),

    #[error("Cycle detected in DAG: {0}")]
    DagCycle(String),

    #[error("Missing dependencies: {}", format_missing(.0))]
    MissingDependency(Vec<MissingDependency>),

    #[error("Unable to compute execution order: {0}")]
    Ordering(String),

    #[error("Scheduling inconsistency: {0}")]
    SchedulingInconsistency(String),

    #[error("DAG '{0}' is already running")]
    AlreadyRunning(String),

    #[error("runner has been shut down")]
    ShutDown,

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl DagError {
    /// Whether this error describes a malformed graph (cycle, missing or
    /// duplicate/unknown task id).
    pub fn is_structural(&self) -> bool {
        matches!(
            self,
            DagError::TaskNotFound(_)
                | DagError::DuplicateTask(_)
                | DagError::DagCycle(_)
                | DagError::MissingDependency(_)
        )
    }
}

/// One `task -> dependency` reference that points at no task in the DAG.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MissingDependency {
    pub task: String,
    pub dependency: String,
}

fn format_missing(missing: &[MissingDependency]) -> String {
    missing
        .iter()
        .map(|m| format!("task '{}' depends on missing task '{}'", m.task, m.dependency))
        .collect::<Vec<_>>()
        .join("; ")
}

/// Failure of a single task attempt.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum TaskError {
    #[error("{0}")]
    Execution(String),

    #[error("command exited with status {code}: {stderr}")]
    CommandFailed { code: i32, stderr: String },

    #[error("failed to start command: {0}")]
    Spawn(String),

    #[error("timed out after {after:?}")]
    Timeout { after: Duration },

    #[error("worker panicked: {0}")]
    Panicked(String),

    #[error("worker result lost: {0}")]
    Lost(String),
}

impl TaskError {
    pub fn is_timeout(&self) -> bool {
        matches!(self, TaskError::Timeout { .. })
    }
}

impl From<anyhow::Error> for TaskError {
    fn from(err: anyhow::Error) -> Self {
        TaskError::Execution(format!("{err:#}"))
    }
}

impl Serialize for TaskError {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

pub use anyhow::Error;
pub type Result<T> = std::result::Result<T, DagError>;
