// src/report.rs

//! Plain-text rendering of DAGs and run results for the CLI.

use std::fmt::Write as _;

use crate::dag::Dag;
use crate::state::DagResult;

/// Execution levels of `dag`, one block per level, plus a short summary.
///
/// Ordering errors are rendered into the text instead of returned.
pub fn execution_plan(dag: &Dag) -> String {
    let mut out = String::new();
    let title = format!("Execution Plan: {}", dag.dag_id());
    let _ = writeln!(out, "{title}");
    let _ = writeln!(out, "{}", "=".repeat(title.len()));
    let _ = writeln!(out);

    let levels = match dag.get_execution_order() {
        Ok(levels) => levels,
        Err(e) => {
            let _ = writeln!(out, "Error generating execution plan: {e}");
            return out;
        }
    };

    for (idx, level) in levels.iter().enumerate() {
        let _ = writeln!(out, "Execution Level {}:", idx + 1);
        let _ = writeln!(out, "  Tasks: {}", level.join(", "));
        let _ = writeln!(out, "  Parallelizable: {} tasks", level.len());
        let _ = writeln!(out);
    }

    let total: usize = levels.iter().map(Vec::len).sum();
    let widest = levels.iter().map(Vec::len).max().unwrap_or(0);
    let speedup = if levels.is_empty() {
        1.0
    } else {
        total as f64 / levels.len() as f64
    };

    let _ = writeln!(out, "Summary:");
    let _ = writeln!(out, "  Total execution levels: {}", levels.len());
    let _ = writeln!(out, "  Maximum parallelism: {widest}");
    let _ = write!(out, "  Potential speedup: {speedup:.2}x");
    out
}

/// Shape and state counts of `dag`.
pub fn summary(dag: &Dag) -> String {
    let stats = dag.get_stats();
    let mut out = String::new();
    let title = format!("DAG Summary: {}", dag.dag_id());
    let _ = writeln!(out, "{title}");
    let _ = writeln!(out, "{}", "=".repeat(title.len()));
    if !dag.description().is_empty() {
        let _ = writeln!(out, "Description: {}", dag.description());
    }
    let _ = writeln!(out, "Total Tasks: {}", stats.total_tasks);
    let _ = writeln!(out, "Root Tasks: {}", stats.root_tasks);
    let _ = writeln!(out, "Leaf Tasks: {}", stats.leaf_tasks);
    let _ = writeln!(out, "Max Depth: {}", stats.max_depth);
    let _ = writeln!(out, "Execution Mode: {}", dag.execution_mode());
    let _ = write!(out, "Max Workers: {}", dag.max_workers());

    if stats.total_tasks > 0 {
        let _ = writeln!(out);
        let _ = writeln!(out);
        let _ = writeln!(out, "Task States:");
        let _ = writeln!(out, "  Pending: {}", stats.pending_tasks);
        let _ = writeln!(out, "  Running: {}", stats.running_tasks);
        let _ = writeln!(out, "  Success: {}", stats.successful_tasks);
        let _ = writeln!(out, "  Failed: {}", stats.failed_tasks);
        let _ = write!(out, "  Skipped: {}", stats.skipped_tasks);
    }
    out
}

/// Final state, timing and failures of a run.
pub fn result_summary(result: &DagResult) -> String {
    let mut out = String::new();
    let duration = result.duration().map_or(0.0, |d| d.as_secs_f64());
    let _ = writeln!(out, "Execution completed in {duration:.2} seconds");
    let _ = writeln!(out, "Final state: {}", result.state);
    let _ = write!(out, "Success rate: {:.2}%", result.success_rate() * 100.0);

    let failed = result.failed_tasks();
    if !failed.is_empty() {
        let _ = writeln!(out);
        let _ = writeln!(out);
        let _ = write!(out, "Failed tasks ({}):", failed.len());
        for (task_id, task_result) in failed {
            let error = task_result
                .error
                .as_ref()
                .map_or_else(|| "unknown error".to_string(), ToString::to_string);
            let _ = write!(out, "\n  - {task_id}: {error}");
        }
    }
    out
}
