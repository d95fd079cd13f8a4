// src/dag/task.rs

//! A single schedulable unit of work.

use std::time::Duration;

use chrono::Utc;
use serde_json::Value;
use tracing::{debug, error, info};

use crate::errors::{DagError, Result, TaskError};
use crate::exec::TaskBody;
use crate::state::{TaskResult, TaskState};
use crate::types::{ExecutionMode, TaskId, TaskKind};

/// Exponential backoff between attempts: `min(base * 2^(attempt-1), cap)`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryBackoff {
    pub base: Duration,
    pub cap: Duration,
}

impl Default for RetryBackoff {
    fn default() -> Self {
        Self {
            base: Duration::from_secs(1),
            cap: Duration::from_secs(60),
        }
    }
}

impl RetryBackoff {
    pub fn new(base: Duration, cap: Duration) -> Self {
        Self { base, cap }
    }

    /// Delay to wait after failed attempt number `attempt` (1-based).
    pub fn delay(&self, attempt: u32) -> Duration {
        let exponent = attempt.saturating_sub(1);
        let factor = 2u32.checked_pow(exponent).unwrap_or(u32::MAX);
        self.base.saturating_mul(factor).min(self.cap)
    }
}

/// A task: identity, body, retry/timeout policy, declared dependencies and
/// its current lifecycle state.
///
/// State changes happen in two places only: [`Task::execute`] (on the
/// worker's copy of the task) and the scheduler's skip propagation.
#[derive(Debug, Clone)]
pub struct Task {
    task_id: TaskId,
    body: TaskBody,
    retries: u32,
    timeout: Option<Duration>,
    dependencies: Vec<TaskId>,
    backoff: RetryBackoff,
    state: TaskState,
    current_attempt: u32,
}

impl Task {
    /// Create a task. Fails if the id is empty or a shell body has an empty
    /// command.
    pub fn new(task_id: impl Into<TaskId>, body: TaskBody) -> Result<Self> {
        let task_id = task_id.into();
        if task_id.trim().is_empty() {
            return Err(DagError::Config("task_id must not be empty".to_string()));
        }
        if let TaskBody::Shell { command } = &body {
            if command.trim().is_empty() {
                return Err(DagError::Config(format!(
                    "shell task '{task_id}' must specify a non-empty command"
                )));
            }
        }

        Ok(Self {
            task_id,
            body,
            retries: 0,
            timeout: None,
            dependencies: Vec::new(),
            backoff: RetryBackoff::default(),
            state: TaskState::Pending,
            current_attempt: 0,
        })
    }

    pub fn with_retries(mut self, retries: u32) -> Self {
        self.retries = retries;
        self
    }

    /// A zero timeout is treated as "no timeout".
    pub fn with_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.timeout = timeout.filter(|t| !t.is_zero());
        self
    }

    /// Declare dependencies. Duplicates are collapsed, order is kept.
    pub fn with_dependencies<I, S>(mut self, deps: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<TaskId>,
    {
        for dep in deps {
            let dep = dep.into();
            if !self.dependencies.contains(&dep) {
                self.dependencies.push(dep);
            }
        }
        self
    }

    pub fn with_backoff(mut self, backoff: RetryBackoff) -> Self {
        self.backoff = backoff;
        self
    }

    pub fn id(&self) -> &str {
        &self.task_id
    }

    pub fn body(&self) -> &TaskBody {
        &self.body
    }

    pub fn kind(&self) -> TaskKind {
        self.body.kind()
    }

    pub fn retries(&self) -> u32 {
        self.retries
    }

    pub fn timeout(&self) -> Option<Duration> {
        self.timeout
    }

    pub fn dependencies(&self) -> &[TaskId] {
        &self.dependencies
    }

    pub fn backoff(&self) -> RetryBackoff {
        self.backoff
    }

    pub fn state(&self) -> TaskState {
        self.state
    }

    /// Attempts used so far.
    ///
    /// Workers execute a copy of the task, so the DAG's own task only picks
    /// up the count when the worker reports back: while a run is in flight
    /// it still shows the value from before the task started.
    pub fn current_attempt(&self) -> u32 {
        self.current_attempt
    }

    pub(crate) fn set_state(&mut self, state: TaskState) {
        self.state = state;
    }

    /// Adopt the execution outcome of a worker's copy of this task.
    pub(crate) fn absorb(&mut self, finished: &Task) {
        self.state = finished.state;
        self.current_attempt = finished.current_attempt;
    }

    /// Introspection helper: whether another attempt is still allowed.
    pub fn can_retry(&self) -> bool {
        self.current_attempt < self.retries
    }

    /// Back to `Pending` with a zeroed attempt counter. Only between runs.
    pub fn reset(&mut self) {
        self.state = TaskState::Pending;
        self.current_attempt = 0;
    }

    /// Run the body up to `retries + 1` times.
    ///
    /// Returns on the first success. Between failed attempts the worker
    /// sleeps for the backoff delay; the final failure is carried in the
    /// returned result. Errors never escape this method.
    pub async fn execute(&mut self, mode: ExecutionMode) -> TaskResult {
        info!(task = %self.task_id, kind = %self.kind(), "starting execution of task");

        let mut last_error = TaskError::Execution(format!(
            "task '{}' has no attempts remaining; reset it before re-running",
            self.task_id
        ));
        let mut last_start = None;
        let mut last_end = None;

        while self.current_attempt <= self.retries {
            self.current_attempt += 1;
            self.state = TaskState::Running;

            let start_time = Utc::now();
            let outcome = self
                .body
                .invoke(&self.task_id, mode, self.timeout)
                .await;
            let end_time = Utc::now();

            match outcome {
                Ok(value) => {
                    self.state = TaskState::Success;
                    info!(
                        task = %self.task_id,
                        attempt = self.current_attempt,
                        "task completed successfully"
                    );
                    return TaskResult::succeeded(
                        self.task_id.clone(),
                        start_time,
                        end_time,
                        value,
                        self.current_attempt,
                    );
                }
                Err(err) => {
                    error!(
                        task = %self.task_id,
                        attempt = self.current_attempt,
                        error = %err,
                        "task attempt failed"
                    );
                    last_error = err;
                    last_start = Some(start_time);
                    last_end = Some(end_time);

                    if self.current_attempt <= self.retries {
                        let delay = self.backoff.delay(self.current_attempt);
                        info!(task = %self.task_id, ?delay, "retrying task after backoff");
                        tokio::time::sleep(delay).await;
                    }
                }
            }
        }

        self.state = TaskState::Failed;
        debug!(task = %self.task_id, attempts = self.current_attempt, "task exhausted its attempts");
        TaskResult::failed(
            self.task_id.clone(),
            last_start,
            last_end,
            last_error,
            self.current_attempt,
        )
    }

    pub fn to_dict(&self) -> Value {
        let mut out = serde_json::json!({
            "task_id": self.task_id,
            "task_type": self.kind(),
            "state": self.state,
            "retries": self.retries,
            "timeout": self.timeout.map(|t| t.as_secs_f64()),
            "dependencies": self.dependencies,
            "current_attempt": self.current_attempt,
        });

        if let Value::Object(map) = &mut out {
            match &self.body {
                TaskBody::Function { name, args, .. } => {
                    map.insert("function".into(), Value::String(name.clone()));
                    map.insert("args".into(), Value::Array(args.args.clone()));
                    map.insert(
                        "kwargs".into(),
                        Value::Object(args.kwargs.clone().into_iter().collect()),
                    );
                }
                TaskBody::Shell { command } => {
                    map.insert("command".into(), Value::String(command.clone()));
                }
            }
        }

        out
    }
}
