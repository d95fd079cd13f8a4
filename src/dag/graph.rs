// src/dag/graph.rs

use std::collections::{BTreeSet, HashMap, HashSet};

use petgraph::Direction;
use petgraph::algo::{is_cyclic_directed, toposort};
use petgraph::stable_graph::{NodeIndex, StableDiGraph};
use petgraph::visit::{Dfs, Reversed};
use serde::Serialize;
use serde_json::Value;
use tracing::{debug, info, warn};

use crate::dag::task::Task;
use crate::errors::{DagError, MissingDependency, Result};
use crate::state::{DagState, TaskState};
use crate::types::{ExecutionMode, TaskId};

pub const DEFAULT_MAX_WORKERS: usize = 4;

/// A set of tasks plus the dependency graph between them.
///
/// Edges point from dependency to dependent. Dependencies may name tasks
/// that have not been added yet; such names get a placeholder node and are
/// only rejected by [`Dag::validate`].
#[derive(Debug, Clone)]
pub struct Dag {
    dag_id: String,
    description: String,
    max_workers: usize,
    execution_mode: ExecutionMode,
    state: DagState,
    tasks: HashMap<TaskId, Task>,
    /// Insertion order of `tasks`; the tie-break for everything that
    /// iterates tasks.
    order: Vec<TaskId>,
    graph: StableDiGraph<TaskId, ()>,
    nodes: HashMap<TaskId, NodeIndex>,
}

/// Counts and shape information for a DAG.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DagStats {
    pub dag_id: String,
    pub total_tasks: usize,
    pub pending_tasks: usize,
    pub running_tasks: usize,
    pub successful_tasks: usize,
    pub failed_tasks: usize,
    pub skipped_tasks: usize,
    pub root_tasks: usize,
    pub leaf_tasks: usize,
    pub max_depth: usize,
}

impl Dag {
    pub fn new(dag_id: impl Into<String>) -> Self {
        Self {
            dag_id: dag_id.into(),
            description: String::new(),
            max_workers: DEFAULT_MAX_WORKERS,
            execution_mode: ExecutionMode::default(),
            state: DagState::Pending,
            tasks: HashMap::new(),
            order: Vec::new(),
            graph: StableDiGraph::new(),
            nodes: HashMap::new(),
        }
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }

    pub fn with_max_workers(mut self, max_workers: usize) -> Self {
        self.set_max_workers(max_workers);
        self
    }

    pub fn with_execution_mode(mut self, mode: ExecutionMode) -> Self {
        self.execution_mode = mode;
        self
    }

    pub fn dag_id(&self) -> &str {
        &self.dag_id
    }

    pub fn description(&self) -> &str {
        &self.description
    }

    pub fn max_workers(&self) -> usize {
        self.max_workers
    }

    /// Values below 1 are clamped to 1.
    pub fn set_max_workers(&mut self, max_workers: usize) {
        if max_workers == 0 {
            warn!(dag = %self.dag_id, "max_workers must be positive; using 1");
        }
        self.max_workers = max_workers.max(1);
    }

    pub fn execution_mode(&self) -> ExecutionMode {
        self.execution_mode
    }

    pub fn set_execution_mode(&mut self, mode: ExecutionMode) {
        self.execution_mode = mode;
    }

    pub fn state(&self) -> DagState {
        self.state
    }

    pub(crate) fn set_state(&mut self, state: DagState) {
        self.state = state;
    }

    pub fn len(&self) -> usize {
        self.tasks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tasks.is_empty()
    }

    pub fn contains(&self, task_id: &str) -> bool {
        self.tasks.contains_key(task_id)
    }

    /// Number of graph nodes, including placeholders for dependencies that
    /// are not (yet) tasks.
    pub fn node_count(&self) -> usize {
        self.graph.node_count()
    }

    pub fn get_task(&self, task_id: &str) -> Option<&Task> {
        self.tasks.get(task_id)
    }

    pub(crate) fn get_task_mut(&mut self, task_id: &str) -> Option<&mut Task> {
        self.tasks.get_mut(task_id)
    }

    /// Task ids in insertion order.
    pub fn task_ids(&self) -> impl Iterator<Item = &str> {
        self.order.iter().map(String::as_str)
    }

    /// Tasks in insertion order.
    pub fn tasks(&self) -> impl Iterator<Item = &Task> {
        self.order.iter().filter_map(|id| self.tasks.get(id))
    }

    fn node_for(&mut self, task_id: &str) -> NodeIndex {
        if let Some(idx) = self.nodes.get(task_id) {
            return *idx;
        }
        let idx = self.graph.add_node(task_id.to_string());
        self.nodes.insert(task_id.to_string(), idx);
        idx
    }

    /// Insert a task and one edge per declared dependency.
    pub fn add_task(&mut self, task: Task) -> Result<()> {
        let task_id = task.id().to_string();
        if self.tasks.contains_key(&task_id) {
            return Err(DagError::DuplicateTask(task_id));
        }

        let node = self.node_for(&task_id);
        for dep in task.dependencies() {
            if !self.tasks.contains_key(dep) {
                warn!(
                    dag = %self.dag_id,
                    task = %task_id,
                    dependency = %dep,
                    "dependency not found yet; it must be added before validation"
                );
            }
            let dep_node = self.node_for(dep);
            self.graph.update_edge(dep_node, node, ());
        }

        // Re-link tasks that already named this id (it may have been removed
        // and added back).
        let dependents: Vec<NodeIndex> = self
            .tasks
            .values()
            .filter(|t| t.dependencies().iter().any(|d| *d == task_id))
            .filter_map(|t| self.nodes.get(t.id()).copied())
            .collect();
        for dependent in dependents {
            self.graph.update_edge(node, dependent, ());
        }

        self.tasks.insert(task_id.clone(), task);
        self.order.push(task_id.clone());
        debug!(dag = %self.dag_id, task = %task_id, "added task");
        Ok(())
    }

    /// Remove a task, its graph node and all incident edges.
    pub fn remove_task(&mut self, task_id: &str) -> Result<Task> {
        let task = self
            .tasks
            .remove(task_id)
            .ok_or_else(|| DagError::TaskNotFound(task_id.to_string()))?;
        self.order.retain(|id| id != task_id);
        if let Some(idx) = self.nodes.remove(task_id) {
            self.graph.remove_node(idx);
        }
        debug!(dag = %self.dag_id, task = %task_id, "removed task");
        Ok(task)
    }

    /// Structural checks without mutation: acyclicity, then that every
    /// dependency names a task.
    pub fn check(&self) -> Result<()> {
        if is_cyclic_directed(&self.graph) {
            let involved = match toposort(&self.graph, None) {
                Err(cycle) => self.graph[cycle.node_id()].clone(),
                Ok(_) => String::from("<unknown>"),
            };
            return Err(DagError::DagCycle(format!(
                "DAG '{}' contains a cycle involving task '{}'",
                self.dag_id, involved
            )));
        }

        let missing: Vec<MissingDependency> = self
            .tasks()
            .flat_map(|task| {
                task.dependencies()
                    .iter()
                    .filter(move |dep| !self.tasks.contains_key(dep.as_str()))
                    .map(move |dep| MissingDependency {
                        task: task.id().to_string(),
                        dependency: dep.clone(),
                    })
            })
            .collect();

        if !missing.is_empty() {
            return Err(DagError::MissingDependency(missing));
        }

        Ok(())
    }

    /// Validate the graph and drop placeholder nodes that have no task.
    ///
    /// Must succeed before the DAG is executed.
    pub fn validate(&mut self) -> Result<bool> {
        info!(dag = %self.dag_id, "validating DAG");
        self.check()?;

        let orphans: Vec<TaskId> = self
            .nodes
            .keys()
            .filter(|id| !self.tasks.contains_key(id.as_str()))
            .cloned()
            .collect();
        if !orphans.is_empty() {
            warn!(dag = %self.dag_id, ?orphans, "dropping orphaned graph nodes");
            for id in orphans {
                if let Some(idx) = self.nodes.remove(&id) {
                    self.graph.remove_node(idx);
                }
            }
        }

        info!(dag = %self.dag_id, tasks = self.tasks.len(), "DAG validation successful");
        Ok(true)
    }

    /// Group tasks into the fewest levels such that every task's
    /// dependencies sit in strictly earlier levels.
    ///
    /// Within a level tasks keep insertion order.
    pub fn get_execution_order(&self) -> Result<Vec<Vec<TaskId>>> {
        self.check()?;
        toposort(&self.graph, None).map_err(|cycle| {
            DagError::Ordering(format!(
                "failed to compute topological order at task '{}'",
                self.graph[cycle.node_id()]
            ))
        })?;

        let mut placed: HashSet<&str> = HashSet::new();
        let mut remaining: Vec<&str> = self.task_ids().collect();
        let mut levels = Vec::new();

        while !remaining.is_empty() {
            let level: Vec<&str> = remaining
                .iter()
                .copied()
                .filter(|id| {
                    self.task_predecessors(id)
                        .iter()
                        .all(|pred| placed.contains(pred))
                })
                .collect();

            if level.is_empty() {
                return Err(DagError::Ordering(
                    "unable to find executable tasks - possible circular dependency".to_string(),
                ));
            }

            placed.extend(level.iter().copied());
            remaining.retain(|id| !placed.contains(id));
            levels.push(level.into_iter().map(str::to_string).collect());
        }

        debug!(dag = %self.dag_id, ?levels, "computed execution order");
        Ok(levels)
    }

    /// Direct predecessors of `task_id` that are tasks of this DAG.
    fn task_predecessors(&self, task_id: &str) -> Vec<&str> {
        let Some(idx) = self.nodes.get(task_id).copied() else {
            return Vec::new();
        };
        self.graph
            .neighbors_directed(idx, Direction::Incoming)
            .map(|pred| self.graph[pred].as_str())
            .filter(|pred| self.tasks.contains_key(*pred))
            .collect()
    }

    /// Tasks that declare no dependencies.
    pub fn get_root_tasks(&self) -> Vec<TaskId> {
        self.tasks()
            .filter(|t| t.dependencies().is_empty())
            .map(|t| t.id().to_string())
            .collect()
    }

    /// Tasks that no other task names as a dependency.
    pub fn get_leaf_tasks(&self) -> Vec<TaskId> {
        let named: HashSet<&str> = self
            .tasks()
            .flat_map(|t| t.dependencies().iter().map(String::as_str))
            .collect();
        self.task_ids()
            .filter(|id| !named.contains(id))
            .map(str::to_string)
            .collect()
    }

    /// All transitive dependencies (ancestors) of `task_id`.
    pub fn get_task_dependencies(&self, task_id: &str) -> Result<BTreeSet<TaskId>> {
        let start = self.node_of_task(task_id)?;
        let reversed = Reversed(&self.graph);
        let mut dfs = Dfs::new(reversed, start);
        let mut out = BTreeSet::new();
        while let Some(idx) = dfs.next(reversed) {
            if idx != start {
                out.insert(self.graph[idx].clone());
            }
        }
        Ok(out)
    }

    /// All transitive dependents (descendants) of `task_id`.
    pub fn get_task_dependents(&self, task_id: &str) -> Result<BTreeSet<TaskId>> {
        let start = self.node_of_task(task_id)?;
        let mut dfs = Dfs::new(&self.graph, start);
        let mut out = BTreeSet::new();
        while let Some(idx) = dfs.next(&self.graph) {
            if idx != start {
                out.insert(self.graph[idx].clone());
            }
        }
        Ok(out)
    }

    fn node_of_task(&self, task_id: &str) -> Result<NodeIndex> {
        if !self.tasks.contains_key(task_id) {
            return Err(DagError::TaskNotFound(task_id.to_string()));
        }
        self.nodes
            .get(task_id)
            .copied()
            .ok_or_else(|| DagError::TaskNotFound(task_id.to_string()))
    }

    /// Every task back to `Pending`, and the DAG itself.
    pub fn reset(&mut self) {
        for task in self.tasks.values_mut() {
            task.reset();
        }
        self.state = DagState::Pending;
        info!(dag = %self.dag_id, "reset DAG to initial state");
    }

    pub fn get_stats(&self) -> DagStats {
        let count = |state: TaskState| self.tasks.values().filter(|t| t.state() == state).count();

        DagStats {
            dag_id: self.dag_id.clone(),
            total_tasks: self.tasks.len(),
            pending_tasks: count(TaskState::Pending),
            running_tasks: count(TaskState::Running),
            successful_tasks: count(TaskState::Success),
            failed_tasks: count(TaskState::Failed),
            skipped_tasks: count(TaskState::Skipped),
            root_tasks: self.get_root_tasks().len(),
            leaf_tasks: self.get_leaf_tasks().len(),
            max_depth: self.get_execution_order().map(|l| l.len()).unwrap_or(0),
        }
    }

    pub fn to_dict(&self) -> Value {
        let tasks: serde_json::Map<String, Value> = self
            .tasks()
            .map(|t| (t.id().to_string(), t.to_dict()))
            .collect();

        serde_json::json!({
            "dag_id": self.dag_id,
            "description": self.description,
            "max_workers": self.max_workers,
            "execution_mode": self.execution_mode,
            "state": self.state,
            "tasks": tasks,
            "stats": self.get_stats(),
        })
    }
}
