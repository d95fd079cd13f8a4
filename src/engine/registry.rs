// src/engine/registry.rs

//! Runs currently tracked by one [`Runner`](super::Runner).
//!
//! Each entry shares the in-progress `DagResult` with the executing loop
//! and carries the cancel flag the loop polls. Entries are added when a run
//! starts and removed when it finalizes.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use chrono::Utc;
use tracing::{debug, info};

use crate::errors::{DagError, Result};
use crate::state::{DagResult, DagState};

/// Lock ignoring poisoning: the guarded data is plain state that stays
/// valid even if a holder panicked.
pub(crate) fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Handles shared between the registry and the loop executing one run.
#[derive(Debug, Clone)]
pub(crate) struct RunEntry {
    pub(crate) result: Arc<Mutex<DagResult>>,
    pub(crate) cancel: Arc<AtomicBool>,
}

impl RunEntry {
    pub(crate) fn is_cancelled(&self) -> bool {
        self.cancel.load(Ordering::SeqCst)
    }
}

#[derive(Debug, Clone, Default)]
pub struct RunRegistry {
    runs: Arc<Mutex<HashMap<String, RunEntry>>>,
}

impl RunRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Start tracking `dag_id`. Fails if a run with that id is tracked.
    pub(crate) fn register(&self, dag_id: &str, result: Arc<Mutex<DagResult>>) -> Result<RunEntry> {
        let mut runs = lock(&self.runs);
        if runs.contains_key(dag_id) {
            return Err(DagError::AlreadyRunning(dag_id.to_string()));
        }

        let entry = RunEntry {
            result,
            cancel: Arc::new(AtomicBool::new(false)),
        };
        runs.insert(dag_id.to_string(), entry.clone());
        debug!(dag = %dag_id, "registered run");
        Ok(entry)
    }

    /// Stop tracking `entry`. A newer run registered under the same id is
    /// left alone.
    pub(crate) fn deregister(&self, dag_id: &str, entry: &RunEntry) {
        let mut runs = lock(&self.runs);
        let ours = runs
            .get(dag_id)
            .is_some_and(|current| Arc::ptr_eq(&current.result, &entry.result));
        if ours {
            runs.remove(dag_id);
            debug!(dag = %dag_id, "deregistered run");
        }
    }

    /// Snapshot of the in-progress result of `dag_id`.
    pub fn status(&self, dag_id: &str) -> Option<DagResult> {
        let runs = lock(&self.runs);
        runs.get(dag_id).map(|entry| lock(&entry.result).clone())
    }

    /// Ids of tracked runs, sorted.
    pub fn list(&self) -> Vec<String> {
        let mut ids: Vec<String> = lock(&self.runs).keys().cloned().collect();
        ids.sort();
        ids
    }

    pub fn len(&self) -> usize {
        lock(&self.runs).len()
    }

    pub fn is_empty(&self) -> bool {
        lock(&self.runs).is_empty()
    }

    /// Flag `dag_id` for cancellation. Returns `false` if it is not tracked.
    pub fn cancel(&self, dag_id: &str) -> bool {
        match lock(&self.runs).get(dag_id) {
            Some(entry) => {
                info!(dag = %dag_id, "cancelling DAG");
                entry.cancel.store(true, Ordering::SeqCst);
                true
            }
            None => false,
        }
    }

    /// Cancel every tracked run, mark the running ones `Failed` and stop
    /// tracking them all.
    pub(crate) fn fail_all(&self) {
        let mut runs = lock(&self.runs);
        for (dag_id, entry) in runs.drain() {
            entry.cancel.store(true, Ordering::SeqCst);
            let mut result = lock(&entry.result);
            if result.state == DagState::Running {
                result.state = DagState::Failed;
                result.end_time = Some(Utc::now());
                info!(dag = %dag_id, "marked running DAG as failed");
            }
        }
    }
}
