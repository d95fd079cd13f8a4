// src/config/model.rs

use std::collections::BTreeMap;
use std::ops::Deref;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::dag::{Dag, DEFAULT_MAX_WORKERS};
use crate::exec::TaskBody;
use crate::types::{ExecutionMode, TaskKind};

/// Top-level configuration as read from a TOML or JSON file.
///
/// ```toml
/// dag_id = "etl"
/// max_workers = 2
///
/// [task.extract]
/// type = "shell"
/// command = "echo extracting"
///
/// [task.transform]
/// type = "function"
/// function = "builtin.echo"
/// args = ["rows"]
/// retries = 2
/// timeout = "30s"
/// after = ["extract"]
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RawConfigFile {
    pub dag_id: String,

    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub description: String,

    #[serde(default = "default_max_workers")]
    pub max_workers: usize,

    #[serde(default)]
    pub execution_mode: ExecutionMode,

    /// All tasks from `[task.<id>]`, keyed by task id.
    #[serde(default)]
    pub task: BTreeMap<String, TaskConfig>,
}

fn default_max_workers() -> usize {
    DEFAULT_MAX_WORKERS
}

/// `[task.<id>]` section.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TaskConfig {
    /// `"function"` (alias `"python"`) or `"shell"`.
    #[serde(rename = "type")]
    pub kind: TaskKind,

    /// Registry name of the function to call. Function tasks only.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub function: Option<String>,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub args: Vec<Value>,

    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub kwargs: BTreeMap<String, Value>,

    /// Shell command line. Shell tasks only.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub command: Option<String>,

    /// Additional attempts after the first.
    #[serde(default)]
    pub retries: u32,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timeout: Option<TimeoutSpec>,

    /// Tasks that must succeed before this one runs.
    #[serde(default, alias = "dependencies", skip_serializing_if = "Vec::is_empty")]
    pub after: Vec<String>,
}

/// A timeout as written in a config file: seconds (`1.5`) or a duration
/// string (`"500ms"`, `"3s"`, `"2m"`, `"1h"`).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum TimeoutSpec {
    Seconds(f64),
    Text(String),
}

impl TimeoutSpec {
    /// Resolve to a strictly positive duration.
    pub fn to_duration(&self) -> Result<Duration, String> {
        let duration = match self {
            TimeoutSpec::Seconds(secs) => {
                if !secs.is_finite() || *secs < 0.0 {
                    return Err(format!("invalid timeout {secs}"));
                }
                Duration::from_secs_f64(*secs)
            }
            TimeoutSpec::Text(text) => parse_duration(text)?,
        };

        if duration.is_zero() {
            return Err("timeout must be greater than zero".to_string());
        }
        Ok(duration)
    }
}

/// Parse a duration string like `"500ms"`, `"3s"`, `"1.5s"`, `"2m"` or `"1h"`.
pub fn parse_duration(s: &str) -> Result<Duration, String> {
    let s = s.trim();
    if s.is_empty() {
        return Err("empty duration string".to_string());
    }

    // Find the boundary between the number and the suffix.
    let idx = s
        .chars()
        .position(|c| !(c.is_ascii_digit() || c == '.'))
        .ok_or_else(|| "duration missing unit suffix".to_string())?;

    let (num_part, unit_part) = s.split_at(idx);
    let value: f64 = num_part
        .parse()
        .map_err(|e| format!("invalid duration number '{}': {}", num_part, e))?;
    let unit = unit_part.trim().to_lowercase();

    let secs = match unit.as_str() {
        "ms" => value / 1000.0,
        "s" => value,
        "m" => value * 60.0,
        "h" => value * 60.0 * 60.0,
        _ => {
            return Err(format!(
                "unsupported duration unit '{}'; expected ms, s, m, or h",
                unit
            ));
        }
    };

    Duration::try_from_secs_f64(secs).map_err(|e| format!("invalid duration '{s}': {e}"))
}

impl RawConfigFile {
    /// Describe an existing DAG as a config document.
    pub fn from_dag(dag: &Dag) -> Self {
        let task = dag
            .tasks()
            .map(|t| {
                let mut cfg = TaskConfig {
                    kind: t.kind(),
                    function: None,
                    args: Vec::new(),
                    kwargs: BTreeMap::new(),
                    command: None,
                    retries: t.retries(),
                    timeout: t.timeout().map(|d| TimeoutSpec::Seconds(d.as_secs_f64())),
                    after: t.dependencies().to_vec(),
                };
                match t.body() {
                    TaskBody::Function { name, args, .. } => {
                        cfg.function = Some(name.clone());
                        cfg.args = args.args.clone();
                        cfg.kwargs = args.kwargs.clone();
                    }
                    TaskBody::Shell { command } => cfg.command = Some(command.clone()),
                }
                (t.id().to_string(), cfg)
            })
            .collect();

        Self {
            dag_id: dag.dag_id().to_string(),
            description: dag.description().to_string(),
            max_workers: dag.max_workers(),
            execution_mode: dag.execution_mode(),
            task,
        }
    }
}

/// A config that passed the required-field and per-type checks.
///
/// Only obtainable through `TryFrom<RawConfigFile>`.
#[derive(Debug, Clone, PartialEq)]
pub struct ConfigFile {
    raw: RawConfigFile,
}

impl ConfigFile {
    pub(crate) fn new_unchecked(raw: RawConfigFile) -> Self {
        Self { raw }
    }

    pub fn into_raw(self) -> RawConfigFile {
        self.raw
    }
}

impl Deref for ConfigFile {
    type Target = RawConfigFile;

    fn deref(&self) -> &Self::Target {
        &self.raw
    }
}
