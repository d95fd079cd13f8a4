#![allow(dead_code)]

use std::collections::BTreeMap;
use std::time::Duration;

use serde_json::Value;
use taskdag::config::{ConfigFile, RawConfigFile, TaskConfig, TimeoutSpec};
use taskdag::dag::{Dag, RetryBackoff, Task};
use taskdag::exec::{CancelToken, TaskArgs, TaskBody};
use taskdag::types::{ExecutionMode, TaskKind};

/// Backoff short enough that retry tests stay fast.
pub fn fast_backoff() -> RetryBackoff {
    RetryBackoff::new(Duration::from_millis(1), Duration::from_millis(5))
}

/// A function task whose body returns its own id.
pub fn ok_task(id: &str, deps: &[&str]) -> Task {
    let value = Value::String(id.to_string());
    let body = TaskBody::function(
        "test.ok",
        move |_: &TaskArgs, _: &CancelToken| Ok(value.clone()),
        TaskArgs::default(),
    );
    Task::new(id, body)
        .expect("valid task")
        .with_dependencies(deps.iter().copied())
        .with_backoff(fast_backoff())
}

/// A function task whose body always fails.
pub fn failing_task(id: &str, deps: &[&str]) -> Task {
    let message = format!("{id} failed");
    let body = TaskBody::function(
        "test.fail",
        move |_: &TaskArgs, _: &CancelToken| Err(anyhow::anyhow!(message.clone())),
        TaskArgs::default(),
    );
    Task::new(id, body)
        .expect("valid task")
        .with_dependencies(deps.iter().copied())
        .with_backoff(fast_backoff())
}

pub fn shell_task(id: &str, command: &str, deps: &[&str]) -> Task {
    Task::new(id, TaskBody::shell(command))
        .expect("valid task")
        .with_dependencies(deps.iter().copied())
        .with_backoff(fast_backoff())
}

/// Builder for `Dag` to simplify test setup.
pub struct DagBuilder {
    dag: Dag,
}

impl DagBuilder {
    pub fn new(dag_id: &str) -> Self {
        Self { dag: Dag::new(dag_id) }
    }

    pub fn max_workers(mut self, max_workers: usize) -> Self {
        self.dag.set_max_workers(max_workers);
        self
    }

    pub fn mode(mut self, mode: ExecutionMode) -> Self {
        self.dag.set_execution_mode(mode);
        self
    }

    pub fn task(mut self, task: Task) -> Self {
        self.dag.add_task(task).expect("Failed to add task in DagBuilder");
        self
    }

    pub fn ok(self, id: &str, deps: &[&str]) -> Self {
        self.task(ok_task(id, deps))
    }

    pub fn failing(self, id: &str, deps: &[&str]) -> Self {
        self.task(failing_task(id, deps))
    }

    pub fn build(self) -> Dag {
        self.dag
    }
}

/// The `root -> {left, right} -> join` DAG with instantly succeeding bodies.
pub fn diamond(dag_id: &str) -> Dag {
    DagBuilder::new(dag_id)
        .ok("root", &[])
        .ok("left", &["root"])
        .ok("right", &["root"])
        .ok("join", &["left", "right"])
        .build()
}

/// Builder for `ConfigFile`.
pub struct ConfigFileBuilder {
    config: RawConfigFile,
}

impl ConfigFileBuilder {
    pub fn new(dag_id: &str) -> Self {
        Self {
            config: RawConfigFile {
                dag_id: dag_id.to_string(),
                description: String::new(),
                max_workers: 4,
                execution_mode: ExecutionMode::Threaded,
                task: BTreeMap::new(),
            },
        }
    }

    pub fn max_workers(mut self, max_workers: usize) -> Self {
        self.config.max_workers = max_workers;
        self
    }

    pub fn with_task(mut self, id: &str, task: TaskConfig) -> Self {
        self.config.task.insert(id.to_string(), task);
        self
    }

    pub fn raw(self) -> RawConfigFile {
        self.config
    }

    pub fn build(self) -> ConfigFile {
        ConfigFile::try_from(self.config).expect("Failed to build valid config from builder")
    }
}

/// Builder for `TaskConfig`.
pub struct TaskConfigBuilder {
    task: TaskConfig,
}

impl TaskConfigBuilder {
    fn empty(kind: TaskKind) -> Self {
        Self {
            task: TaskConfig {
                kind,
                function: None,
                args: Vec::new(),
                kwargs: BTreeMap::new(),
                command: None,
                retries: 0,
                timeout: None,
                after: Vec::new(),
            },
        }
    }

    pub fn function(name: &str) -> Self {
        let mut builder = Self::empty(TaskKind::Function);
        builder.task.function = Some(name.to_string());
        builder
    }

    pub fn shell(command: &str) -> Self {
        let mut builder = Self::empty(TaskKind::Shell);
        builder.task.command = Some(command.to_string());
        builder
    }

    pub fn after(mut self, dep: &str) -> Self {
        self.task.after.push(dep.to_string());
        self
    }

    pub fn arg(mut self, value: Value) -> Self {
        self.task.args.push(value);
        self
    }

    pub fn kwarg(mut self, key: &str, value: Value) -> Self {
        self.task.kwargs.insert(key.to_string(), value);
        self
    }

    pub fn retries(mut self, retries: u32) -> Self {
        self.task.retries = retries;
        self
    }

    pub fn timeout_secs(mut self, secs: f64) -> Self {
        self.task.timeout = Some(TimeoutSpec::Seconds(secs));
        self
    }

    pub fn timeout(mut self, text: &str) -> Self {
        self.task.timeout = Some(TimeoutSpec::Text(text.to_string()));
        self
    }

    pub fn build(self) -> TaskConfig {
        self.task
    }
}
