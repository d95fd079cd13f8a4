// src/dag/mod.rs

//! DAG representation and scheduling.
//!
//! - [`graph`] owns the tasks and the dependency graph, and answers
//!   structural queries (validation, levels, ancestors/descendants).
//! - [`task`] is a single unit of work with its retry/timeout policy.
//! - [`scheduler`] contains the per-run state machine that decides which
//!   tasks are ready to run and skips the dependents of failures.

pub mod graph;
pub mod scheduler;
pub mod task;

pub use graph::{Dag, DagStats, DEFAULT_MAX_WORKERS};
pub use scheduler::{Progress, Scheduler};
pub use task::{RetryBackoff, Task};
