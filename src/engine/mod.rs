// src/engine/mod.rs

//! Execution engine.
//!
//! [`Runner`] drives a DAG: one coordinating loop asks the
//! [`Scheduler`](crate::dag::Scheduler) for ready tasks, submits them to a
//! bounded [`WorkerPool`](crate::exec::WorkerPool) and folds completions
//! into a [`DagResult`](crate::state::DagResult). Runs in progress are
//! tracked in a [`RunRegistry`] owned by the runner.

pub mod registry;
pub mod runner;

pub use registry::RunRegistry;
pub use runner::{RunHandle, Runner, RunnerOptions, RunnerStats};
