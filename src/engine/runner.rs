// src/engine/runner.rs

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use anyhow::anyhow;
use chrono::Utc;
use serde::Serialize;
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tracing::{debug, error, info, warn};

use crate::dag::{Dag, Scheduler, Task};
use crate::errors::{DagError, Result, TaskError};
use crate::exec::{Completion, WorkerPool};
use crate::state::{DagResult, DagState, TaskResult, TaskState};
use crate::types::ExecutionMode;

use super::registry::{lock, RunEntry, RunRegistry};

/// Runner-wide knobs.
#[derive(Debug, Clone)]
pub struct RunnerOptions {
    /// Overrides the DAG's own `max_workers` when set.
    pub max_workers: Option<usize>,
    /// Overrides the DAG's own execution mode when set.
    pub execution_mode: Option<ExecutionMode>,
    /// Upper bound on a single wait for a worker completion.
    pub poll_interval: Duration,
    /// How long to wait for in-flight tasks after the loop stops.
    pub drain_timeout: Duration,
}

impl Default for RunnerOptions {
    fn default() -> Self {
        Self {
            max_workers: None,
            execution_mode: None,
            poll_interval: Duration::from_millis(100),
            drain_timeout: Duration::from_secs(30),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RunnerStats {
    pub max_workers: Option<usize>,
    pub execution_mode: Option<ExecutionMode>,
    pub running_dags: usize,
    pub poll_interval_ms: u128,
    pub shut_down: bool,
}

/// Executes DAGs on a bounded worker pool.
///
/// Cloning is cheap; clones share the run registry and the shutdown flag.
#[derive(Debug, Clone, Default)]
pub struct Runner {
    options: RunnerOptions,
    registry: RunRegistry,
    shutdown: Arc<AtomicBool>,
}

/// A DAG executing in the background.
#[derive(Debug)]
pub struct RunHandle {
    dag_id: String,
    result: Arc<Mutex<DagResult>>,
    join: JoinHandle<(Dag, Result<DagResult>)>,
}

impl RunHandle {
    pub fn dag_id(&self) -> &str {
        &self.dag_id
    }

    /// Snapshot of the (possibly still in-progress) result.
    pub fn status(&self) -> DagResult {
        lock(&self.result).clone()
    }

    pub fn is_finished(&self) -> bool {
        self.join.is_finished()
    }

    /// Wait for the run to finish and get the DAG back with its result.
    pub async fn wait(self) -> Result<(Dag, DagResult)> {
        let dag_id = self.dag_id;
        let (dag, outcome) = self
            .join
            .await
            .map_err(|e| DagError::Other(anyhow!("run of DAG '{dag_id}' did not complete: {e}")))?;
        Ok((dag, outcome?))
    }
}

impl Runner {
    pub fn new(options: RunnerOptions) -> Self {
        Self {
            options,
            registry: RunRegistry::new(),
            shutdown: Arc::new(AtomicBool::new(false)),
        }
    }

    pub fn options(&self) -> &RunnerOptions {
        &self.options
    }

    /// Execute `dag` to completion.
    ///
    /// Structural problems are reported as `Err` before any task runs.
    /// Task failures never are: they end up in the returned `DagResult`.
    pub async fn run_dag(&self, dag: &mut Dag) -> Result<DagResult> {
        let entry = self.prepare(dag)?;
        self.execute(dag, &entry).await
    }

    /// Start executing `dag` on a Tokio task and return immediately.
    ///
    /// Progress can be polled through the handle or through
    /// [`Runner::get_dag_status`].
    pub fn run_dag_background(&self, mut dag: Dag) -> Result<RunHandle> {
        let entry = self.prepare(&mut dag)?;
        let dag_id = dag.dag_id().to_string();
        let result = Arc::clone(&entry.result);
        let runner = self.clone();

        let join = tokio::spawn(async move {
            let outcome = runner.execute(&mut dag, &entry).await;
            (dag, outcome)
        });

        Ok(RunHandle {
            dag_id,
            result,
            join,
        })
    }

    /// Execute a single task outside of any DAG.
    pub async fn run_task(&self, task: &mut Task) -> TaskResult {
        info!(task = %task.id(), "executing single task");
        let mode = self.options.execution_mode.unwrap_or_default();
        task.execute(mode).await
    }

    /// Snapshot of a tracked run, `None` once it has finished.
    pub fn get_dag_status(&self, dag_id: &str) -> Option<DagResult> {
        self.registry.status(dag_id)
    }

    pub fn list_running_dags(&self) -> Vec<String> {
        self.registry.list()
    }

    /// Stop submitting new tasks for `dag_id`. Tasks already running are
    /// not recalled. Returns `false` if no such run is tracked.
    pub fn cancel_dag(&self, dag_id: &str) -> bool {
        self.registry.cancel(dag_id)
    }

    /// Stop every run and refuse new ones. Tracked runs are marked `Failed`.
    pub fn shutdown(&self) {
        info!("shutting down task runner");
        self.shutdown.store(true, Ordering::SeqCst);
        self.registry.fail_all();
    }

    pub fn is_shut_down(&self) -> bool {
        self.shutdown.load(Ordering::SeqCst)
    }

    pub fn get_stats(&self) -> RunnerStats {
        RunnerStats {
            max_workers: self.options.max_workers,
            execution_mode: self.options.execution_mode,
            running_dags: self.registry.len(),
            poll_interval_ms: self.options.poll_interval.as_millis(),
            shut_down: self.is_shut_down(),
        }
    }

    /// Validate, register and open the result for a new run.
    fn prepare(&self, dag: &mut Dag) -> Result<RunEntry> {
        if self.is_shut_down() {
            return Err(DagError::ShutDown);
        }

        info!(dag = %dag.dag_id(), tasks = dag.len(), "starting execution of DAG");
        dag.validate()?;

        let mut result = DagResult::new(dag.dag_id(), dag.len());
        result.start_time = Some(Utc::now());
        result.state = DagState::Running;

        // A DAG that was not reset keeps its finished tasks; they count
        // towards this run's outcome as they stand.
        for task in dag.tasks().filter(|t| t.state().is_terminal()) {
            debug!(task = %task.id(), state = %task.state(), "carrying over finished task");
            result.add_task_result(TaskResult::carried_over(
                task.id(),
                task.state(),
                task.current_attempt(),
            ));
        }

        let entry = self
            .registry
            .register(dag.dag_id(), Arc::new(Mutex::new(result)))?;
        dag.set_state(DagState::Running);
        Ok(entry)
    }

    async fn execute(&self, dag: &mut Dag, entry: &RunEntry) -> Result<DagResult> {
        let outcome = self.drive(dag, entry).await;
        let result = self.finalize(dag, entry);
        outcome.map(|()| result)
    }

    fn stop_requested(&self, entry: &RunEntry) -> bool {
        self.is_shut_down() || entry.is_cancelled()
    }

    /// The coordinating loop: submit ready tasks, then fold in at most one
    /// completion, until the scheduler has nothing left.
    async fn drive(&self, dag: &mut Dag, entry: &RunEntry) -> Result<()> {
        let max_workers = self.options.max_workers.unwrap_or(dag.max_workers()).max(1);
        let mode = self.options.execution_mode.unwrap_or(dag.execution_mode());
        let poll = self.options.poll_interval;
        let dag_id = dag.dag_id().to_string();

        let mut pool = WorkerPool::new(max_workers, mode);
        let mut scheduler = Scheduler::new(dag);
        let mut stalled = false;

        debug!(dag = %dag_id, max_workers, %mode, "execution loop started");

        while scheduler.has_runnable_tasks() && !self.stop_requested(entry) {
            for task in scheduler.get_ready_tasks() {
                if !pool.has_capacity() || self.stop_requested(entry) {
                    break;
                }
                scheduler.mark_task_running(task.id());
                pool.submit(task);
            }

            if pool.is_idle() {
                if !scheduler.has_runnable_tasks() {
                    break;
                }
                if stalled {
                    let pending: Vec<&str> = scheduler
                        .dag()
                        .tasks()
                        .filter(|t| t.state() == TaskState::Pending)
                        .map(Task::id)
                        .collect();
                    error!(dag = %dag_id, ?pending, "no ready tasks while tasks remain pending");
                    return Err(DagError::SchedulingInconsistency(format!(
                        "no ready or running tasks in DAG '{dag_id}' but pending tasks remain: {pending:?}"
                    )));
                }
                stalled = true;
                tokio::time::sleep(poll).await;
                continue;
            }
            stalled = false;

            if let Some(completion) = pool.next_completion(poll).await {
                self.handle_completion(&mut scheduler, entry, completion);
            }
        }

        if !pool.is_idle() {
            self.drain(&mut scheduler, &mut pool, entry).await;
        }

        debug!(dag = %dag_id, "execution loop finished");
        Ok(())
    }

    /// Wait for tasks still in flight, bounded by the drain timeout.
    async fn drain(&self, scheduler: &mut Scheduler<'_>, pool: &mut WorkerPool, entry: &RunEntry) {
        info!(
            dag = %scheduler.dag().dag_id(),
            in_flight = pool.in_flight(),
            "waiting for in-flight tasks to finish"
        );
        let deadline = Instant::now() + self.options.drain_timeout;

        while !pool.is_idle() {
            let remaining = deadline.saturating_duration_since(Instant::now());
            if remaining.is_zero() {
                break;
            }
            match pool.next_completion(remaining).await {
                Some(completion) => self.handle_completion(scheduler, entry, completion),
                None => break,
            }
        }

        for task_id in pool.abandon() {
            warn!(task = %task_id, "task did not finish within the drain timeout");
            self.handle_completion(
                scheduler,
                entry,
                Completion {
                    task_id,
                    outcome: Err(TaskError::Lost(
                        "task did not finish before the run was finalized".to_string(),
                    )),
                },
            );
        }
    }

    fn handle_completion(&self, scheduler: &mut Scheduler<'_>, entry: &RunEntry, completion: Completion) {
        let Completion { task_id, outcome } = completion;

        let task_result = match outcome {
            Ok((task, task_result)) => {
                scheduler.record_result(&task);
                if task_result.success() {
                    info!(task = %task_id, attempt = task_result.attempt, "task completed successfully");
                } else {
                    let error = task_result.error.as_ref().map(ToString::to_string);
                    error!(task = %task_id, error = ?error, "task failed");
                }
                task_result
            }
            Err(err) => {
                error!(task = %task_id, error = %err, "error getting result for task");
                let now = Utc::now();
                let attempt = scheduler
                    .dag()
                    .get_task(&task_id)
                    .map_or(0, Task::current_attempt);
                TaskResult::failed(task_id.clone(), Some(now), Some(now), err, attempt)
            }
        };

        scheduler.mark_task_completed(&task_id, task_result.success());
        lock(&entry.result).add_task_result(task_result);
    }

    /// Close the result, mirror its state onto the DAG and stop tracking the
    /// run.
    fn finalize(&self, dag: &mut Dag, entry: &RunEntry) -> DagResult {
        let snapshot = {
            let mut result = lock(&entry.result);
            for task in dag.tasks() {
                if task.state() == TaskState::Skipped && !result.task_results.contains_key(task.id()) {
                    result.add_task_result(TaskResult::skipped(task.id()));
                }
            }
            result.end_time = Some(Utc::now());
            result.update_state();
            if self.is_shut_down() {
                result.state = DagState::Failed;
            }
            result.clone()
        };

        dag.set_state(snapshot.state);
        self.registry.deregister(dag.dag_id(), entry);

        info!(
            dag = %snapshot.dag_id,
            duration = ?snapshot.duration(),
            state = %snapshot.state,
            success_rate = %format!("{:.2}%", snapshot.success_rate() * 100.0),
            "DAG execution completed"
        );
        snapshot
    }
}
