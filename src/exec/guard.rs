// src/exec/guard.rs

//! Timeout guard and cooperative cancellation for task bodies.
//!
//! Function bodies are synchronous, so they are moved off the async runtime
//! onto an isolated thread and their result is handed back over a oneshot
//! channel. The calling attempt waits on that channel, bounded by the task's
//! timeout. When the timeout fires the attempt fails immediately and the
//! body's [`CancelToken`] is cancelled; the thread itself cannot be killed,
//! so well-behaved bodies poll the token and return early.

use std::any::Any;
use std::future::Future;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use serde_json::Value;
use tokio::sync::oneshot;
use tracing::{debug, warn};

use crate::errors::TaskError;
use crate::exec::body::{TaskArgs, TaskFunction};
use crate::types::ExecutionMode;

/// Cancellation signal handed to a running function body.
#[derive(Debug, Clone, Default)]
pub struct CancelToken {
    cancelled: Arc<AtomicBool>,
}

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.cancelled.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::SeqCst)
    }

    /// Sleep for `total`, waking early (and returning `false`) if cancelled.
    pub fn sleep(&self, total: Duration) -> bool {
        let slice = Duration::from_millis(10);
        let mut remaining = total;
        while !remaining.is_zero() {
            if self.is_cancelled() {
                return false;
            }
            let step = remaining.min(slice);
            std::thread::sleep(step);
            remaining -= step;
        }
        !self.is_cancelled()
    }
}

/// Await `fut`, failing with [`TaskError::Timeout`] if it does not finish
/// within `limit`. On timeout `cancel` is fired and `fut` is dropped.
pub async fn guarded<F>(
    limit: Option<Duration>,
    cancel: &CancelToken,
    fut: F,
) -> Result<Value, TaskError>
where
    F: Future<Output = Result<Value, TaskError>>,
{
    let Some(limit) = limit else {
        return fut.await;
    };

    match tokio::time::timeout(limit, fut).await {
        Ok(outcome) => outcome,
        Err(_) => {
            cancel.cancel();
            Err(TaskError::Timeout { after: limit })
        }
    }
}

/// Run a function body on an isolated thread chosen by `mode`.
pub async fn run_function(
    task_id: &str,
    func: Arc<dyn TaskFunction>,
    args: TaskArgs,
    mode: ExecutionMode,
    limit: Option<Duration>,
) -> Result<Value, TaskError> {
    let cancel = CancelToken::new();
    let (tx, rx) = oneshot::channel();

    let body_cancel = cancel.clone();
    let job = move || {
        let outcome = catch_unwind(AssertUnwindSafe(|| func.call(&args, &body_cancel)));
        // The receiver is gone if the attempt already timed out.
        let _ = tx.send(outcome);
    };

    match mode {
        ExecutionMode::Threaded => {
            // Detached: the attempt only cares about the channel.
            drop(tokio::task::spawn_blocking(job));
        }
        ExecutionMode::Process => {
            std::thread::Builder::new()
                .name(format!("taskdag-{task_id}"))
                .spawn(job)
                .map_err(|e| TaskError::Spawn(e.to_string()))?;
        }
    }

    let waiter = async move {
        match rx.await {
            Ok(Ok(Ok(value))) => Ok(value),
            Ok(Ok(Err(err))) => Err(TaskError::from(err)),
            Ok(Err(panic)) => Err(TaskError::Panicked(panic_message(panic))),
            Err(_) => Err(TaskError::Lost(
                "function worker exited without reporting a result".to_string(),
            )),
        }
    };

    let result = guarded(limit, &cancel, waiter).await;
    if let Err(TaskError::Timeout { after }) = &result {
        warn!(
            task = %task_id,
            ?after,
            "function body timed out; cancellation requested, thread left to finish"
        );
    } else {
        debug!(task = %task_id, ok = result.is_ok(), "function body returned");
    }
    result
}

pub(crate) fn panic_message(payload: Box<dyn Any + Send>) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic payload".to_string()
    }
}
