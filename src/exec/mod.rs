// src/exec/mod.rs

//! Execution layer.
//!
//! - [`body`] defines what a task runs: a registered function or a shell
//!   command, plus the injectable [`FunctionRegistry`].
//! - [`guard`] bounds a body by its timeout and hands it a cancel token.
//! - [`shell`] runs shell commands with `tokio::process::Command`.
//! - [`pool`] is the bounded worker pool the runner submits tasks to.

pub mod body;
pub mod guard;
pub mod pool;
pub mod shell;

pub use body::{FunctionRegistry, TaskArgs, TaskBody, TaskFunction};
pub use guard::CancelToken;
pub use pool::{Completion, WorkerPool};
