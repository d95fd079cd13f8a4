// src/dag/scheduler.rs

use std::collections::HashSet;

use serde::Serialize;
use tracing::{debug, info, warn};

use crate::dag::graph::Dag;
use crate::dag::task::Task;
use crate::errors::Result;
use crate::state::TaskState;
use crate::types::TaskId;

/// Per-run dependency resolver.
///
/// It is responsible for:
/// - deciding when a task is ready to run (all deps completed)
/// - tracking which tasks are running / completed / failed in this run
/// - skipping the dependents of failed tasks
///
/// The three id sets are an index over the task states held by the DAG and
/// are only ever mutated by the coordinating loop. Construct a fresh
/// scheduler for each run.
#[derive(Debug)]
pub struct Scheduler<'a> {
    dag: &'a mut Dag,
    completed: HashSet<TaskId>,
    failed: HashSet<TaskId>,
    running: HashSet<TaskId>,
}

/// Snapshot of run progress.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct Progress {
    pub total: usize,
    pub completed: usize,
    pub failed: usize,
    pub running: usize,
    pub skipped: usize,
    pub pending: usize,
    pub percentage: f64,
}

impl<'a> Scheduler<'a> {
    /// Borrow `dag` for one run.
    ///
    /// Tasks that already finished (a DAG that was not reset) seed the
    /// completed/failed sets so their dependents resolve correctly. Pending
    /// tasks downstream of a failed or skipped task are skipped right away.
    pub fn new(dag: &'a mut Dag) -> Self {
        let mut completed = HashSet::new();
        let mut failed = HashSet::new();
        let mut blocked: Vec<TaskId> = Vec::new();
        for task in dag.tasks() {
            match task.state() {
                TaskState::Success => {
                    completed.insert(task.id().to_string());
                }
                TaskState::Failed => {
                    failed.insert(task.id().to_string());
                    blocked.push(task.id().to_string());
                }
                TaskState::Skipped => blocked.push(task.id().to_string()),
                _ => {}
            }
        }

        let mut scheduler = Self {
            dag,
            completed,
            failed,
            running: HashSet::new(),
        };
        for task_id in blocked {
            scheduler.mark_dependents_skipped(&task_id);
        }
        scheduler
    }

    pub fn dag(&self) -> &Dag {
        &*self.dag
    }

    pub fn dag_mut(&mut self) -> &mut Dag {
        &mut *self.dag
    }

    /// Tasks that can be submitted now, in DAG insertion order.
    ///
    /// A pending task whose direct dependency has failed is moved to
    /// `Skipped` here and left out of the result.
    pub fn get_ready_tasks(&mut self) -> Vec<Task> {
        let mut ready = Vec::new();
        let mut to_skip: Vec<(TaskId, TaskId)> = Vec::new();

        for task in self.dag.tasks() {
            if task.state() != TaskState::Pending || self.running.contains(task.id()) {
                continue;
            }

            if let Some(dep) = task
                .dependencies()
                .iter()
                .find(|dep| self.failed.contains(dep.as_str()))
            {
                to_skip.push((task.id().to_string(), dep.clone()));
                continue;
            }

            if task
                .dependencies()
                .iter()
                .all(|dep| self.completed.contains(dep.as_str()))
            {
                ready.push(task.clone());
            }
        }

        for (task_id, dep) in to_skip {
            info!(task = %task_id, dependency = %dep, "task skipped due to failed dependency");
            self.set_task_state(&task_id, TaskState::Skipped);
        }

        debug!(
            ready = ?ready.iter().map(Task::id).collect::<Vec<_>>(),
            "scheduler: found ready tasks"
        );
        ready
    }

    /// Like [`Scheduler::get_ready_tasks`], truncated to `max_tasks`.
    pub fn get_next_batch(&mut self, max_tasks: Option<usize>) -> Vec<Task> {
        let mut ready = self.get_ready_tasks();
        if let Some(max) = max_tasks {
            ready.truncate(max);
        }
        ready
    }

    pub fn mark_task_running(&mut self, task_id: &str) {
        if !self.dag.contains(task_id) {
            warn!(task = %task_id, "mark_task_running for unknown task; ignoring");
            return;
        }
        self.running.insert(task_id.to_string());
        self.set_task_state(task_id, TaskState::Running);
        debug!(task = %task_id, "marked task as running");
    }

    /// Write back the execution outcome carried by a worker's copy of the
    /// task (state and attempt counter).
    pub fn record_result(&mut self, finished: &Task) {
        match self.dag.get_task_mut(finished.id()) {
            Some(task) => task.absorb(finished),
            None => warn!(task = %finished.id(), "result for unknown task; ignoring"),
        }
    }

    /// Move `task_id` out of the running set. On failure every transitive
    /// dependent still pending is skipped.
    pub fn mark_task_completed(&mut self, task_id: &str, success: bool) {
        if !self.dag.contains(task_id) {
            warn!(task = %task_id, "completion for unknown task; ignoring");
            return;
        }

        self.running.remove(task_id);

        if success {
            self.completed.insert(task_id.to_string());
            self.set_task_state(task_id, TaskState::Success);
            debug!(task = %task_id, "marked task as completed successfully");
            return;
        }

        self.failed.insert(task_id.to_string());
        self.set_task_state(task_id, TaskState::Failed);
        debug!(task = %task_id, "marked task as failed");
        self.mark_dependents_skipped(task_id);
    }

    fn mark_dependents_skipped(&mut self, failed_task: &str) {
        let dependents = match self.dag.get_task_dependents(failed_task) {
            Ok(dependents) => dependents,
            Err(err) => {
                warn!(task = %failed_task, error = %err, "could not resolve dependents");
                return;
            }
        };

        for dependent in dependents {
            let Some(task) = self.dag.get_task_mut(&dependent) else {
                continue;
            };
            if task.state() == TaskState::Pending {
                task.set_state(TaskState::Skipped);
                info!(
                    task = %dependent,
                    dependency = %failed_task,
                    "task skipped due to failed dependency"
                );
            }
        }
    }

    fn set_task_state(&mut self, task_id: &str, state: TaskState) {
        if let Some(task) = self.dag.get_task_mut(task_id) {
            task.set_state(state);
        }
    }

    /// `false` once nothing is running and no task is pending.
    pub fn has_runnable_tasks(&self) -> bool {
        !self.running.is_empty() || self.dag.tasks().any(|t| t.state() == TaskState::Pending)
    }

    pub fn running_count(&self) -> usize {
        self.running.len()
    }

    pub fn is_running(&self, task_id: &str) -> bool {
        self.running.contains(task_id)
    }

    /// Direct dependencies of `task_id` that have not finished yet.
    ///
    /// Unknown ids yield an empty list.
    pub fn get_blocking_tasks(&self, task_id: &str) -> Vec<TaskId> {
        let Some(task) = self.dag.get_task(task_id) else {
            return Vec::new();
        };
        task.dependencies()
            .iter()
            .filter(|dep| !self.completed.contains(dep.as_str()) && !self.failed.contains(dep.as_str()))
            .cloned()
            .collect()
    }

    pub fn get_execution_plan(&self) -> Result<Vec<Vec<TaskId>>> {
        self.dag.get_execution_order()
    }

    pub fn get_progress(&self) -> Progress {
        let total = self.dag.len();
        let completed = self.completed.len();
        let failed = self.failed.len();
        let running = self.running.len();
        let skipped = self
            .dag
            .tasks()
            .filter(|t| t.state() == TaskState::Skipped)
            .count();
        let pending = total.saturating_sub(completed + failed + running + skipped);

        let percentage = if total > 0 {
            let done = (completed + failed + skipped) as f64 / total as f64 * 100.0;
            (done * 100.0).round() / 100.0
        } else {
            0.0
        };

        Progress {
            total,
            completed,
            failed,
            running,
            skipped,
            pending,
            percentage,
        }
    }

    /// Clear the per-run sets. Task states are left alone.
    pub fn reset(&mut self) {
        self.completed.clear();
        self.failed.clear();
        self.running.clear();
        debug!("scheduler state reset");
    }

    /// Whether the id sets agree with the task states: each task sits in
    /// at most one set, and in exactly the one matching its state.
    pub fn is_consistent(&self) -> bool {
        self.dag.tasks().all(|task| {
            let id = task.id();
            let in_completed = self.completed.contains(id);
            let in_failed = self.failed.contains(id);
            let in_running = self.running.contains(id);

            match task.state() {
                TaskState::Success => in_completed && !in_failed && !in_running,
                TaskState::Failed => in_failed && !in_completed && !in_running,
                TaskState::Running => in_running && !in_completed && !in_failed,
                TaskState::Pending | TaskState::Skipped => {
                    !in_completed && !in_failed && !in_running
                }
            }
        })
    }
}
