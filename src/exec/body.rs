// src/exec/body.rs

//! Task bodies: what a task actually does when it runs.
//!
//! A body is either a registered function or a shell command. Functions are
//! looked up by name in an explicit [`FunctionRegistry`] when the DAG is
//! built, never at execution time.

use std::collections::{BTreeMap, HashMap};
use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{anyhow, bail};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::errors::TaskError;
use crate::exec::guard::{run_function, CancelToken};
use crate::exec::shell::run_shell;
use crate::types::{ExecutionMode, TaskKind};

/// Positional and keyword arguments passed to a function body.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TaskArgs {
    #[serde(default)]
    pub args: Vec<Value>,
    #[serde(default)]
    pub kwargs: BTreeMap<String, Value>,
}

impl TaskArgs {
    pub fn new(args: Vec<Value>, kwargs: BTreeMap<String, Value>) -> Self {
        Self { args, kwargs }
    }

    pub fn kwarg(&self, key: &str) -> Option<&Value> {
        self.kwargs.get(key)
    }

    /// Keyword argument `key`, falling back to positional argument `index`.
    pub fn get(&self, key: &str, index: usize) -> Option<&Value> {
        self.kwargs.get(key).or_else(|| self.args.get(index))
    }
}

/// A callable that can serve as a task body.
///
/// Implementations run on an isolated thread and should check
/// `cancel.is_cancelled()` periodically when they do long work.
pub trait TaskFunction: Send + Sync + 'static {
    fn call(&self, args: &TaskArgs, cancel: &CancelToken) -> anyhow::Result<Value>;
}

impl<F> TaskFunction for F
where
    F: Fn(&TaskArgs, &CancelToken) -> anyhow::Result<Value> + Send + Sync + 'static,
{
    fn call(&self, args: &TaskArgs, cancel: &CancelToken) -> anyhow::Result<Value> {
        self(args, cancel)
    }
}

/// Name → function mapping injected into DAG construction.
#[derive(Clone, Default)]
pub struct FunctionRegistry {
    functions: HashMap<String, Arc<dyn TaskFunction>>,
}

impl fmt::Debug for FunctionRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FunctionRegistry")
            .field("functions", &self.names())
            .finish()
    }
}

impl FunctionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry pre-populated with the `builtin.*` functions.
    pub fn with_builtins() -> Self {
        let mut registry = Self::new();
        registry.register("builtin.hello", builtin_hello);
        registry.register("builtin.echo", builtin_echo);
        registry.register("builtin.sleep", builtin_sleep);
        registry.register("builtin.fail", builtin_fail);
        registry
    }

    /// Register a closure or fn under `name`, replacing any previous entry.
    pub fn register<F>(&mut self, name: impl Into<String>, func: F) -> &mut Self
    where
        F: Fn(&TaskArgs, &CancelToken) -> anyhow::Result<Value> + Send + Sync + 'static,
    {
        self.insert(name, Arc::new(func))
    }

    /// Register an already shared [`TaskFunction`] implementation.
    pub fn insert(&mut self, name: impl Into<String>, func: Arc<dyn TaskFunction>) -> &mut Self {
        self.functions.insert(name.into(), func);
        self
    }

    pub fn get(&self, name: &str) -> Option<Arc<dyn TaskFunction>> {
        self.functions.get(name).cloned()
    }

    pub fn contains(&self, name: &str) -> bool {
        self.functions.contains_key(name)
    }

    /// Registered names, sorted.
    pub fn names(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.functions.keys().map(String::as_str).collect();
        names.sort_unstable();
        names
    }
}

/// The executable part of a task.
#[derive(Clone)]
pub enum TaskBody {
    Function {
        name: String,
        func: Arc<dyn TaskFunction>,
        args: TaskArgs,
    },
    Shell {
        command: String,
    },
}

impl fmt::Debug for TaskBody {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TaskBody::Function { name, args, .. } => f
                .debug_struct("Function")
                .field("name", name)
                .field("args", args)
                .finish_non_exhaustive(),
            TaskBody::Shell { command } => {
                f.debug_struct("Shell").field("command", command).finish()
            }
        }
    }
}

impl TaskBody {
    pub fn function<F>(name: impl Into<String>, func: F, args: TaskArgs) -> Self
    where
        F: Fn(&TaskArgs, &CancelToken) -> anyhow::Result<Value> + Send + Sync + 'static,
    {
        TaskBody::Function {
            name: name.into(),
            func: Arc::new(func),
            args,
        }
    }

    /// Resolve `name` in `registry`.
    pub fn from_registry(
        registry: &FunctionRegistry,
        name: &str,
        args: TaskArgs,
    ) -> anyhow::Result<Self> {
        let func = registry
            .get(name)
            .ok_or_else(|| anyhow!("function '{name}' is not registered"))?;
        Ok(TaskBody::Function {
            name: name.to_string(),
            func,
            args,
        })
    }

    pub fn shell(command: impl Into<String>) -> Self {
        TaskBody::Shell {
            command: command.into(),
        }
    }

    pub fn kind(&self) -> TaskKind {
        match self {
            TaskBody::Function { .. } => TaskKind::Function,
            TaskBody::Shell { .. } => TaskKind::Shell,
        }
    }

    /// Run the body once, bounded by `limit` if given.
    pub async fn invoke(
        &self,
        task_id: &str,
        mode: ExecutionMode,
        limit: Option<Duration>,
    ) -> Result<Value, TaskError> {
        match self {
            TaskBody::Function { func, args, .. } => {
                run_function(task_id, Arc::clone(func), args.clone(), mode, limit).await
            }
            TaskBody::Shell { command } => run_shell(task_id, command, limit).await,
        }
    }
}

fn builtin_hello(args: &TaskArgs, _cancel: &CancelToken) -> anyhow::Result<Value> {
    let name = args
        .get("name", 0)
        .and_then(Value::as_str)
        .unwrap_or("World");
    Ok(Value::String(format!("Hello, {name}!")))
}

fn builtin_echo(args: &TaskArgs, _cancel: &CancelToken) -> anyhow::Result<Value> {
    match args.args.as_slice() {
        [single] if args.kwargs.is_empty() => Ok(single.clone()),
        _ => Ok(serde_json::json!({ "args": args.args, "kwargs": args.kwargs })),
    }
}

fn builtin_sleep(args: &TaskArgs, cancel: &CancelToken) -> anyhow::Result<Value> {
    let seconds = args
        .get("seconds", 0)
        .and_then(Value::as_f64)
        .unwrap_or(1.0);
    if !seconds.is_finite() || seconds < 0.0 {
        bail!("builtin.sleep: invalid duration {seconds}");
    }
    if !cancel.sleep(Duration::from_secs_f64(seconds)) {
        bail!("builtin.sleep: cancelled");
    }
    Ok(Value::from(seconds))
}

fn builtin_fail(args: &TaskArgs, _cancel: &CancelToken) -> anyhow::Result<Value> {
    let message = args
        .get("message", 0)
        .and_then(Value::as_str)
        .unwrap_or("Simulated task failure");
    bail!("{message}")
}
