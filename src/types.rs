// src/types.rs

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// Canonical task identifier type used throughout the crate.
pub type TaskId = String;

/// How task bodies are isolated from the coordinating loop.
///
/// - `Threaded`: function bodies run on the runtime's blocking thread pool.
/// - `Process`: function bodies each get a dedicated OS thread, so a body that
///   hangs never occupies a shared pool slot. Shell bodies always run as child
///   processes regardless of mode.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ExecutionMode {
    #[default]
    #[serde(alias = "threading")]
    Threaded,
    #[serde(alias = "multiprocessing")]
    Process,
}

impl FromStr for ExecutionMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "threaded" | "threading" => Ok(ExecutionMode::Threaded),
            "process" | "multiprocessing" => Ok(ExecutionMode::Process),
            other => Err(format!(
                "invalid execution_mode: {other} (expected \"threaded\" or \"process\")"
            )),
        }
    }
}

impl fmt::Display for ExecutionMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ExecutionMode::Threaded => write!(f, "threaded"),
            ExecutionMode::Process => write!(f, "process"),
        }
    }
}

/// The two kinds of task body.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TaskKind {
    /// Invoke a function from a `FunctionRegistry`.
    #[serde(alias = "python")]
    Function,
    /// Run a command through the platform shell.
    Shell,
}

impl FromStr for TaskKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "function" | "python" => Ok(TaskKind::Function),
            "shell" => Ok(TaskKind::Shell),
            other => Err(format!(
                "unsupported task type: {other} (expected \"function\" or \"shell\")"
            )),
        }
    }
}

impl fmt::Display for TaskKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TaskKind::Function => write!(f, "function"),
            TaskKind::Shell => write!(f, "shell"),
        }
    }
}
