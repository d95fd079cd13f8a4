#![allow(dead_code)]

//! Instrumented task functions for runner and task tests.

use std::sync::atomic::{AtomicU32, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use anyhow::{Result, bail};
use serde_json::Value;
use taskdag::exec::{CancelToken, TaskArgs};
use tracing::debug;

/// Records the order in which labelled function bodies ran.
#[derive(Clone, Default)]
pub struct Recorder {
    calls: Arc<Mutex<Vec<String>>>,
}

impl Recorder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Body that appends `label` to the log and returns it.
    pub fn func(
        &self,
        label: &str,
    ) -> impl Fn(&TaskArgs, &CancelToken) -> Result<Value> + Send + Sync + 'static {
        let calls = Arc::clone(&self.calls);
        let label = label.to_string();
        move |_: &TaskArgs, _: &CancelToken| {
            debug!(label = %label, "recorder body called");
            calls.lock().unwrap().push(label.clone());
            Ok(Value::String(label.clone()))
        }
    }

    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().unwrap().clone()
    }

    pub fn count(&self, label: &str) -> usize {
        self.calls.lock().unwrap().iter().filter(|c| *c == label).count()
    }

    pub fn position(&self, label: &str) -> Option<usize> {
        self.calls.lock().unwrap().iter().position(|c| c == label)
    }
}

/// Tracks how many bodies run at the same time.
#[derive(Clone, Default)]
pub struct ConcurrencyGauge {
    current: Arc<AtomicUsize>,
    max: Arc<AtomicUsize>,
}

impl ConcurrencyGauge {
    pub fn new() -> Self {
        Self::default()
    }

    /// Body that holds a slot for `hold` before returning.
    pub fn func(
        &self,
        hold: Duration,
    ) -> impl Fn(&TaskArgs, &CancelToken) -> Result<Value> + Send + Sync + 'static {
        let current = Arc::clone(&self.current);
        let max = Arc::clone(&self.max);
        move |_: &TaskArgs, _: &CancelToken| {
            let now = current.fetch_add(1, Ordering::SeqCst) + 1;
            max.fetch_max(now, Ordering::SeqCst);
            std::thread::sleep(hold);
            current.fetch_sub(1, Ordering::SeqCst);
            Ok(Value::Null)
        }
    }

    pub fn max_observed(&self) -> usize {
        self.max.load(Ordering::SeqCst)
    }
}

/// Body that fails its first `failures` calls and then succeeds, returning
/// the number of the call that succeeded. The counter is shared.
pub fn flaky(
    failures: u32,
) -> (
    impl Fn(&TaskArgs, &CancelToken) -> Result<Value> + Send + Sync + 'static,
    Arc<AtomicU32>,
) {
    let calls = Arc::new(AtomicU32::new(0));
    let counter = Arc::clone(&calls);
    let func = move |_: &TaskArgs, _: &CancelToken| {
        let call = counter.fetch_add(1, Ordering::SeqCst) + 1;
        if call <= failures {
            bail!("flaky failure on call {call}");
        }
        Ok(Value::from(call))
    };
    (func, calls)
}

/// Body that always fails and counts its calls.
pub fn always_fail(
    message: &str,
) -> (
    impl Fn(&TaskArgs, &CancelToken) -> Result<Value> + Send + Sync + 'static,
    Arc<AtomicU32>,
) {
    let calls = Arc::new(AtomicU32::new(0));
    let counter = Arc::clone(&calls);
    let message = message.to_string();
    let func = move |_: &TaskArgs, _: &CancelToken| {
        counter.fetch_add(1, Ordering::SeqCst);
        bail!("{message}")
    };
    (func, calls)
}

/// Body that sleeps for `duration`, returning early if cancelled.
pub fn sleepy(
    duration: Duration,
) -> impl Fn(&TaskArgs, &CancelToken) -> Result<Value> + Send + Sync + 'static {
    move |_: &TaskArgs, cancel: &CancelToken| {
        if !cancel.sleep(duration) {
            bail!("cancelled");
        }
        Ok(Value::Bool(true))
    }
}

/// Body that panics.
pub fn panicking(
    message: &'static str,
) -> impl Fn(&TaskArgs, &CancelToken) -> Result<Value> + Send + Sync + 'static {
    move |_: &TaskArgs, _: &CancelToken| -> Result<Value> { panic!("{message}") }
}
