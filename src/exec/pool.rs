// src/exec/pool.rs

//! Bounded worker pool used by the runner.
//!
//! Each submitted task runs in its own Tokio task on an owned copy of the
//! `Task`. When it finishes, the worker sends a [`Completion`] back over an
//! mpsc channel; the coordinating loop is the only reader.

use std::collections::HashSet;
use std::time::Duration;

use tokio::sync::mpsc;
use tracing::{debug, warn};

use crate::dag::Task;
use crate::errors::TaskError;
use crate::exec::guard::panic_message;
use crate::state::TaskResult;
use crate::types::{ExecutionMode, TaskId};

/// A finished unit of work handed back to the coordinator.
///
/// `outcome` is `Err` only when the worker itself died (panic or lost join
/// handle); task failures are carried inside the `TaskResult`.
#[derive(Debug)]
pub struct Completion {
    pub task_id: TaskId,
    pub outcome: Result<(Task, TaskResult), TaskError>,
}

#[derive(Debug)]
pub struct WorkerPool {
    max_workers: usize,
    mode: ExecutionMode,
    tx: mpsc::Sender<Completion>,
    rx: mpsc::Receiver<Completion>,
    in_flight: HashSet<TaskId>,
}

impl WorkerPool {
    pub fn new(max_workers: usize, mode: ExecutionMode) -> Self {
        let max_workers = max_workers.max(1);
        let (tx, rx) = mpsc::channel(max_workers);
        Self {
            max_workers,
            mode,
            tx,
            rx,
            in_flight: HashSet::new(),
        }
    }

    pub fn max_workers(&self) -> usize {
        self.max_workers
    }

    pub fn mode(&self) -> ExecutionMode {
        self.mode
    }

    pub fn has_capacity(&self) -> bool {
        self.in_flight.len() < self.max_workers
    }

    pub fn in_flight(&self) -> usize {
        self.in_flight.len()
    }

    pub fn is_idle(&self) -> bool {
        self.in_flight.is_empty()
    }

    /// Start executing `task` on a worker.
    ///
    /// Callers check [`WorkerPool::has_capacity`] first; the pool itself
    /// does not queue.
    pub fn submit(&mut self, task: Task) {
        let task_id = task.id().to_string();
        let mode = self.mode;
        let tx = self.tx.clone();

        if !self.in_flight.insert(task_id.clone()) {
            warn!(task = %task_id, "task already in flight; ignoring submit");
            return;
        }
        debug!(task = %task_id, in_flight = self.in_flight.len(), "submitted task for execution");

        tokio::spawn(async move {
            let worker = tokio::spawn(async move {
                let mut task = task;
                let result = task.execute(mode).await;
                (task, result)
            });

            let outcome = match worker.await {
                Ok(done) => Ok(done),
                Err(err) if err.is_panic() => {
                    Err(TaskError::Panicked(panic_message(err.into_panic())))
                }
                Err(err) => Err(TaskError::Lost(err.to_string())),
            };

            if tx.send(Completion { task_id: task_id.clone(), outcome }).await.is_err() {
                debug!(task = %task_id, "completion receiver dropped; discarding result");
            }
        });
    }

    /// Wait up to `wait` for the next finished task.
    ///
    /// Returns `None` immediately when nothing is in flight.
    pub async fn next_completion(&mut self, wait: Duration) -> Option<Completion> {
        if self.in_flight.is_empty() {
            return None;
        }

        match tokio::time::timeout(wait, self.rx.recv()).await {
            Ok(Some(completion)) => {
                self.in_flight.remove(&completion.task_id);
                Some(completion)
            }
            Ok(None) | Err(_) => None,
        }
    }

    /// Forget every in-flight task and return their ids. Their workers keep
    /// running but their completions are dropped.
    pub fn abandon(&mut self) -> Vec<TaskId> {
        let mut ids: Vec<TaskId> = self.in_flight.drain().collect();
        ids.sort();
        ids
    }
}
