// src/state.rs

//! Lifecycle states and result containers.

use std::collections::BTreeMap;
use std::fmt;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::Serialize;
use serde_json::Value;

use crate::errors::TaskError;
use crate::types::TaskId;

/// Lifecycle state of a single task.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskState {
    #[default]
    Pending,
    Running,
    Success,
    Failed,
    Skipped,
}

impl TaskState {
    /// Whether the task will not change state again within this run.
    pub fn is_terminal(self) -> bool {
        matches!(self, TaskState::Success | TaskState::Failed | TaskState::Skipped)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            TaskState::Pending => "pending",
            TaskState::Running => "running",
            TaskState::Success => "success",
            TaskState::Failed => "failed",
            TaskState::Skipped => "skipped",
        }
    }
}

impl fmt::Display for TaskState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Overall state of a DAG run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum DagState {
    #[default]
    Pending,
    Running,
    Success,
    Failed,
    PartialSuccess,
}

impl DagState {
    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            DagState::Success | DagState::Failed | DagState::PartialSuccess
        )
    }

    pub fn as_str(self) -> &'static str {
        match self {
            DagState::Pending => "pending",
            DagState::Running => "running",
            DagState::Success => "success",
            DagState::Failed => "failed",
            DagState::PartialSuccess => "partial_success",
        }
    }
}

impl fmt::Display for DagState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Outcome of one task's attempt series.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TaskResult {
    pub task_id: TaskId,
    pub state: TaskState,
    pub start_time: Option<DateTime<Utc>>,
    pub end_time: Option<DateTime<Utc>>,
    pub return_value: Option<Value>,
    pub error: Option<TaskError>,
    /// Number of attempts used (1-based). Zero for tasks that never ran.
    pub attempt: u32,
}

impl TaskResult {
    pub fn succeeded(
        task_id: impl Into<TaskId>,
        start_time: DateTime<Utc>,
        end_time: DateTime<Utc>,
        return_value: Value,
        attempt: u32,
    ) -> Self {
        Self {
            task_id: task_id.into(),
            state: TaskState::Success,
            start_time: Some(start_time),
            end_time: Some(end_time),
            return_value: Some(return_value),
            error: None,
            attempt,
        }
    }

    pub fn failed(
        task_id: impl Into<TaskId>,
        start_time: Option<DateTime<Utc>>,
        end_time: Option<DateTime<Utc>>,
        error: TaskError,
        attempt: u32,
    ) -> Self {
        Self {
            task_id: task_id.into(),
            state: TaskState::Failed,
            start_time,
            end_time,
            return_value: None,
            error: Some(error),
            attempt,
        }
    }

    /// Placeholder result for a task that was skipped because an upstream
    /// dependency failed.
    pub fn skipped(task_id: impl Into<TaskId>) -> Self {
        Self {
            task_id: task_id.into(),
            state: TaskState::Skipped,
            start_time: None,
            end_time: None,
            return_value: None,
            error: None,
            attempt: 0,
        }
    }

    /// Result for a task that was already in a terminal state when the run
    /// started. Only the state and attempt count are known.
    pub fn carried_over(task_id: impl Into<TaskId>, state: TaskState, attempt: u32) -> Self {
        Self {
            task_id: task_id.into(),
            state,
            start_time: None,
            end_time: None,
            return_value: None,
            error: None,
            attempt,
        }
    }

    pub fn duration(&self) -> Option<Duration> {
        let (start, end) = (self.start_time?, self.end_time?);
        (end - start).to_std().ok()
    }

    pub fn success(&self) -> bool {
        self.state == TaskState::Success
    }

    pub fn to_dict(&self) -> Value {
        let return_value = self.return_value.as_ref().and_then(|v| match v {
            Value::Null => None,
            Value::String(s) => Some(s.clone()),
            other => Some(other.to_string()),
        });

        serde_json::json!({
            "task_id": self.task_id,
            "state": self.state,
            "start_time": self.start_time.map(|t| t.to_rfc3339()),
            "end_time": self.end_time.map(|t| t.to_rfc3339()),
            "duration": self.duration().map(|d| d.as_secs_f64()),
            "return_value": return_value,
            "error": self.error.as_ref().map(|e| e.to_string()),
            "attempt": self.attempt,
        })
    }
}

/// Aggregated outcome of a whole DAG run.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DagResult {
    pub dag_id: String,
    pub state: DagState,
    pub start_time: Option<DateTime<Utc>>,
    pub end_time: Option<DateTime<Utc>>,
    /// Number of tasks in the DAG when the run started.
    pub total_tasks: usize,
    pub task_results: BTreeMap<TaskId, TaskResult>,
}

impl DagResult {
    pub fn new(dag_id: impl Into<String>, total_tasks: usize) -> Self {
        Self {
            dag_id: dag_id.into(),
            state: DagState::Pending,
            start_time: None,
            end_time: None,
            total_tasks,
            task_results: BTreeMap::new(),
        }
    }

    pub fn add_task_result(&mut self, result: TaskResult) {
        self.task_results.insert(result.task_id.clone(), result);
    }

    /// Derive the overall state from the collected task results.
    ///
    /// - no tasks at all: `Success`
    /// - every task succeeded: `Success`
    /// - at least one failure: `PartialSuccess` if anything succeeded,
    ///   otherwise `Failed`
    /// - anything still running: `Running`
    /// - otherwise the run stopped early (cancelled): `Failed`
    pub fn update_state(&mut self) {
        self.state = derive_state(self.total_tasks, self.task_results.values().map(|r| r.state));
    }

    pub fn successful_count(&self) -> usize {
        self.task_results.values().filter(|r| r.success()).count()
    }

    /// Successful tasks over all tasks in the DAG; `0.0` for an empty DAG.
    pub fn success_rate(&self) -> f64 {
        if self.total_tasks == 0 {
            return 0.0;
        }
        self.successful_count() as f64 / self.total_tasks as f64
    }

    pub fn duration(&self) -> Option<Duration> {
        let (start, end) = (self.start_time?, self.end_time?);
        (end - start).to_std().ok()
    }

    pub fn failed_tasks(&self) -> BTreeMap<&str, &TaskResult> {
        self.task_results
            .iter()
            .filter(|(_, r)| r.state == TaskState::Failed)
            .map(|(id, r)| (id.as_str(), r))
            .collect()
    }

    pub fn to_dict(&self) -> Value {
        let task_results: serde_json::Map<String, Value> = self
            .task_results
            .iter()
            .map(|(id, r)| (id.clone(), r.to_dict()))
            .collect();

        serde_json::json!({
            "dag_id": self.dag_id,
            "state": self.state,
            "start_time": self.start_time.map(|t| t.to_rfc3339()),
            "end_time": self.end_time.map(|t| t.to_rfc3339()),
            "duration": self.duration().map(|d| d.as_secs_f64()),
            "success_rate": self.success_rate(),
            "task_results": task_results,
        })
    }
}

fn derive_state(total_tasks: usize, states: impl Iterator<Item = TaskState>) -> DagState {
    let mut seen = 0usize;
    let mut success = 0usize;
    let mut failed = 0usize;
    let mut running = 0usize;

    for state in states {
        seen += 1;
        match state {
            TaskState::Success => success += 1,
            TaskState::Failed => failed += 1,
            TaskState::Running => running += 1,
            TaskState::Pending | TaskState::Skipped => {}
        }
    }

    if total_tasks == 0 && seen == 0 {
        return DagState::Success;
    }
    if success == seen && seen == total_tasks.max(seen) {
        return DagState::Success;
    }
    if failed > 0 {
        return if success > 0 {
            DagState::PartialSuccess
        } else {
            DagState::Failed
        };
    }
    if running > 0 {
        return DagState::Running;
    }
    DagState::Failed
}
