// src/config/validate.rs

use std::time::Duration;

use tracing::info;

use crate::config::model::{ConfigFile, RawConfigFile, TaskConfig};
use crate::dag::{Dag, Task};
use crate::errors::{DagError, Result};
use crate::exec::{FunctionRegistry, TaskArgs, TaskBody};
use crate::types::TaskKind;

impl TryFrom<RawConfigFile> for ConfigFile {
    type Error = DagError;

    fn try_from(raw: RawConfigFile) -> std::result::Result<Self, Self::Error> {
        let problems = validate_config(&raw);
        if !problems.is_empty() {
            return Err(DagError::Config(problems.join("; ")));
        }
        Ok(ConfigFile::new_unchecked(raw))
    }
}

/// Required-field and per-type checks. Returns every problem found.
///
/// Graph-level checks (cycles, unknown dependencies) are left to
/// [`Dag::validate`].
pub fn validate_config(cfg: &RawConfigFile) -> Vec<String> {
    let mut problems = Vec::new();

    if cfg.dag_id.trim().is_empty() {
        problems.push("dag_id must not be empty".to_string());
    }
    if cfg.max_workers == 0 {
        problems.push("max_workers must be >= 1 (got 0)".to_string());
    }

    for (task_id, task) in cfg.task.iter() {
        problems.extend(validate_task(task_id, task));
    }

    problems
}

fn validate_task(task_id: &str, task: &TaskConfig) -> Vec<String> {
    let mut problems = Vec::new();

    if task_id.trim().is_empty() {
        problems.push("task ids must not be empty".to_string());
    }

    match task.kind {
        TaskKind::Function => {
            let named = task
                .function
                .as_deref()
                .is_some_and(|f| !f.trim().is_empty());
            if !named {
                problems.push(format!("function task '{task_id}' must specify 'function'"));
            }
        }
        TaskKind::Shell => {
            let has_command = task
                .command
                .as_deref()
                .is_some_and(|c| !c.trim().is_empty());
            if !has_command {
                problems.push(format!("shell task '{task_id}' must specify 'command'"));
            }
        }
    }

    if task.after.iter().any(|dep| dep == task_id) {
        problems.push(format!("task '{task_id}' cannot depend on itself"));
    }

    if let Some(timeout) = &task.timeout {
        if let Err(e) = timeout.to_duration() {
            problems.push(format!("task '{task_id}': {e}"));
        }
    }

    problems
}

impl ConfigFile {
    /// Build the DAG, resolving function names against `registry`.
    ///
    /// Tasks are added in task-id order. The DAG is not validated here.
    pub fn build_dag(&self, registry: &FunctionRegistry) -> Result<Dag> {
        let mut dag = Dag::new(&self.dag_id)
            .with_description(&self.description)
            .with_max_workers(self.max_workers)
            .with_execution_mode(self.execution_mode);

        for (task_id, cfg) in self.task.iter() {
            dag.add_task(build_task(task_id, cfg, registry)?)?;
        }

        info!(dag = %self.dag_id, tasks = dag.len(), "loaded DAG configuration");
        Ok(dag)
    }
}

fn build_task(task_id: &str, cfg: &TaskConfig, registry: &FunctionRegistry) -> Result<Task> {
    let body = match cfg.kind {
        TaskKind::Function => {
            let name = cfg.function.as_deref().unwrap_or_default();
            let args = TaskArgs::new(cfg.args.clone(), cfg.kwargs.clone());
            TaskBody::from_registry(registry, name, args)
                .map_err(|e| DagError::Config(format!("task '{task_id}': {e}")))?
        }
        TaskKind::Shell => TaskBody::shell(cfg.command.clone().unwrap_or_default()),
    };

    let timeout: Option<Duration> = cfg
        .timeout
        .as_ref()
        .map(|t| t.to_duration())
        .transpose()
        .map_err(|e| DagError::Config(format!("task '{task_id}': {e}")))?;

    Ok(Task::new(task_id, body)?
        .with_retries(cfg.retries)
        .with_timeout(timeout)
        .with_dependencies(cfg.after.iter().cloned()))
}
