// src/dag/graph.rs

use std::collections::{HashMap, HashSet};

use petgraph::graphmap::DiGraphMap;
use petgraph::visit::{Control, DfsEvent, depth_first_search};
use tracing::{debug, warn};

use crate::dag::task::{Task, TaskStatus};
use crate::errors::{Result, SchedulerError};
use crate::types::{ProcessId, TaskId};

/// Per-process task arena plus dependency adjacency.
///
/// Tasks are stored in registration order, which is also the tie-break order
/// for eligibility. A task is looked up by id through `index`.
#[derive(Debug, Clone)]
pub struct DependencyGraph {
    process_id: ProcessId,
    tasks: Vec<Task>,
    index: HashMap<TaskId, usize>,
    /// Direct dependents: tasks that list the key in their `dependencies`.
    dependents: HashMap<TaskId, Vec<TaskId>>,
}

impl DependencyGraph {
    pub fn new(process_id: impl Into<ProcessId>) -> Self {
        Self {
            process_id: process_id.into(),
            tasks: Vec::new(),
            index: HashMap::new(),
            dependents: HashMap::new(),
        }
    }

    pub fn process_id(&self) -> &str {
        &self.process_id
    }

    pub fn len(&self) -> usize {
        self.tasks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tasks.is_empty()
    }

    pub fn contains(&self, task_id: &str) -> bool {
        self.index.contains_key(task_id)
    }

    pub fn get(&self, task_id: &str) -> Option<&Task> {
        self.index.get(task_id).map(|&i| &self.tasks[i])
    }

    pub fn get_mut(&mut self, task_id: &str) -> Option<&mut Task> {
        match self.index.get(task_id) {
            Some(&i) => Some(&mut self.tasks[i]),
            None => None,
        }
    }

    /// All tasks in registration order.
    pub fn tasks(&self) -> impl Iterator<Item = &Task> {
        self.tasks.iter()
    }

    pub(crate) fn tasks_mut(&mut self) -> impl Iterator<Item = &mut Task> {
        self.tasks.iter_mut()
    }

    /// Immediate dependencies of a task.
    pub fn dependencies_of(&self, task_id: &str) -> &[TaskId] {
        self.get(task_id)
            .map(|t| t.dependencies.as_slice())
            .unwrap_or(&[])
    }

    /// Immediate dependents of a task (tasks that list this one as a dependency).
    pub fn dependents_of(&self, task_id: &str) -> &[TaskId] {
        self.dependents
            .get(task_id)
            .map(|d| d.as_slice())
            .unwrap_or(&[])
    }

    /// Check a batch against the current graph without mutating anything.
    ///
    /// Rejects reused or duplicate ids, dependencies that name no task in the
    /// process (existing or in the batch), and dependency cycles.
    pub fn validate_batch(&self, batch: &[Task]) -> Result<()> {
        let mut batch_ids: HashSet<&str> = HashSet::new();
        for task in batch {
            if self.contains(&task.task_id) || !batch_ids.insert(task.task_id.as_str()) {
                return Err(SchedulerError::ValidationError(format!(
                    "task_id '{}' is already used in process '{}'",
                    task.task_id, self.process_id
                )));
            }
        }

        for task in batch {
            for dep in &task.dependencies {
                if !self.contains(dep) && !batch_ids.contains(dep.as_str()) {
                    return Err(SchedulerError::UnknownDependencyError {
                        process_id: self.process_id.clone(),
                        task_id: task.task_id.clone(),
                        dependency: dep.clone(),
                    });
                }
            }
        }

        if let Some(task_id) = self.find_cycle(batch) {
            return Err(SchedulerError::CyclicDependencyError {
                process_id: self.process_id.clone(),
                task_id,
            });
        }

        Ok(())
    }

    /// Validate and append a batch atomically: either every task is
    /// registered or none is.
    pub fn register(&mut self, batch: Vec<Task>) -> Result<()> {
        self.validate_batch(&batch)?;

        for task in batch {
            for dep in &task.dependencies {
                self.dependents
                    .entry(dep.clone())
                    .or_default()
                    .push(task.task_id.clone());
            }
            debug!(
                process = %self.process_id,
                task = %task.task_id,
                deps = ?task.dependencies,
                "registered task"
            );
            self.index.insert(task.task_id.clone(), self.tasks.len());
            self.tasks.push(task);
        }

        Ok(())
    }

    /// Depth-first traversal with visited/in-progress marking over the
    /// combined graph. A back edge means a cycle; the task it points at is
    /// returned.
    fn find_cycle(&self, batch: &[Task]) -> Option<TaskId> {
        // Edge direction: dep -> task.
        let mut graph: DiGraphMap<&str, ()> = DiGraphMap::new();

        for task in self.tasks.iter().chain(batch.iter()) {
            graph.add_node(task.task_id.as_str());
        }
        for task in self.tasks.iter().chain(batch.iter()) {
            for dep in &task.dependencies {
                graph.add_edge(dep.as_str(), task.task_id.as_str(), ());
            }
        }

        let outcome = depth_first_search(&graph, graph.nodes(), |event| match event {
            DfsEvent::BackEdge(_, target) => Control::Break(target),
            _ => Control::Continue,
        });

        outcome.break_value().map(|node| node.to_string())
    }

    /// Whether every dependency of `task` is `COMPLETED`.
    pub fn deps_satisfied(&self, task: &Task) -> bool {
        task.dependencies.iter().all(|dep_id| match self.get(dep_id) {
            Some(dep) => dep.status() == TaskStatus::Completed,
            None => {
                warn!(
                    process = %self.process_id,
                    task = %task.task_id,
                    dep = %dep_id,
                    "dependency missing from process"
                );
                false
            }
        })
    }

    /// Tasks that are `PENDING` with all dependencies `COMPLETED`, in
    /// registration order.
    pub fn eligible(&self) -> Vec<TaskId> {
        self.tasks
            .iter()
            .filter(|t| t.status() == TaskStatus::Pending && self.deps_satisfied(t))
            .map(|t| t.task_id.clone())
            .collect()
    }

    pub fn count_with_status(&self, status: TaskStatus) -> usize {
        self.tasks.iter().filter(|t| t.status() == status).count()
    }

    /// True when the graph is non-empty and every task is terminal.
    pub fn all_terminal(&self) -> bool {
        !self.tasks.is_empty() && self.tasks.iter().all(Task::is_terminal)
    }
}
