// src/dag/context.rs

//! Per-process record of completed task results.

use std::collections::HashMap;

use serde_json::Value;

use crate::dag::graph::DependencyGraph;
use crate::types::TaskId;

/// Results of completed tasks for one process, plus their completion order.
///
/// Owned by the process it belongs to and only touched under that process's
/// lock.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ExecutionContext {
    results: HashMap<TaskId, Value>,
    completed: Vec<TaskId>,
}

impl ExecutionContext {
    pub fn new() -> Self {
        Self::default()
    }

    /// Store `result` for `task_id`.
    ///
    /// Recording the same task twice overwrites the result; the completed
    /// list keeps a single entry at its original position.
    pub fn record_result(&mut self, task_id: &str, result: Value) {
        if self.results.insert(task_id.to_string(), result).is_none() {
            self.completed.push(task_id.to_string());
        }
    }

    pub fn get_result(&self, task_id: &str) -> Option<&Value> {
        self.results.get(task_id)
    }

    pub fn is_completed(&self, task_id: &str) -> bool {
        self.results.contains_key(task_id)
    }

    /// Task ids in the order they completed.
    pub fn completed_tasks(&self) -> &[TaskId] {
        &self.completed
    }

    pub fn results(&self) -> &HashMap<TaskId, Value> {
        &self.results
    }

    pub fn len(&self) -> usize {
        self.completed.len()
    }

    pub fn is_empty(&self) -> bool {
        self.completed.is_empty()
    }

    /// First task, in registration order, that has not completed and whose
    /// dependencies all have.
    pub fn next_ready<'g>(&self, graph: &'g DependencyGraph) -> Option<&'g str> {
        graph
            .tasks()
            .find(|t| {
                !self.is_completed(&t.task_id)
                    && t.dependencies.iter().all(|d| self.is_completed(d))
            })
            .map(|t| t.task_id.as_str())
    }
}
