// src/dag/task.rs

//! Task description, lifecycle status and the status state machine.

use std::fmt;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use tokio::time::Instant;

use crate::errors::{Result, SchedulerError};
use crate::types::{Capability, ProcessId, TaskId};

/// Default retry budget for tasks that do not specify one.
pub const DEFAULT_RETRY_COUNT: u32 = 3;

/// Default timeout for tasks that do not specify one.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(300);

/// Lifecycle status of a task.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TaskStatus {
    Pending,
    InProgress,
    Completed,
    Failed,
    Paused,
}

impl fmt::Display for TaskStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            TaskStatus::Pending => "PENDING",
            TaskStatus::InProgress => "IN_PROGRESS",
            TaskStatus::Completed => "COMPLETED",
            TaskStatus::Failed => "FAILED",
            TaskStatus::Paused => "PAUSED",
        };
        f.write_str(s)
    }
}

/// Values applied to a [`TaskSpec`] that leaves `retry_count` or `timeout`
/// unspecified.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TaskDefaults {
    pub retry_count: u32,
    pub timeout: Duration,
}

impl Default for TaskDefaults {
    fn default() -> Self {
        Self {
            retry_count: DEFAULT_RETRY_COUNT,
            timeout: DEFAULT_TIMEOUT,
        }
    }
}

/// Validated, transport-independent description of a task as submitted.
#[derive(Debug, Clone, PartialEq)]
pub struct TaskSpec {
    pub task_id: TaskId,
    pub name: String,
    pub description: String,
    /// Ordered; the first capability with a registered route wins.
    pub capabilities: Vec<Capability>,
    pub dependencies: Vec<TaskId>,
    pub retry_count: Option<u32>,
    pub timeout: Option<Duration>,
    pub context: Map<String, Value>,
}

impl TaskSpec {
    /// Minimal spec with the given id and name; everything else empty.
    pub fn new(task_id: impl Into<TaskId>, name: impl Into<String>) -> Self {
        Self {
            task_id: task_id.into(),
            name: name.into(),
            description: String::new(),
            capabilities: Vec::new(),
            dependencies: Vec::new(),
            retry_count: None,
            timeout: None,
            context: Map::new(),
        }
    }
}

/// One schedulable unit of work plus its mutable runtime status.
///
/// The descriptive fields are fixed at creation. Status only changes through
/// [`Task::transition`] (or [`Task::force_fail`] for cancellation and
/// failure propagation), so the retry budget can never grow.
#[derive(Debug, Clone)]
pub struct Task {
    pub process_id: ProcessId,
    pub task_id: TaskId,
    pub name: String,
    pub description: String,
    pub capabilities: Vec<Capability>,
    pub dependencies: Vec<TaskId>,
    pub context: Map<String, Value>,
    pub timeout: Duration,
    /// Retry count as originally submitted.
    pub retry_count: u32,

    status: TaskStatus,
    retry_budget: u32,
    dispatch_attempts: u32,
    dispatched_at: Option<Instant>,
    last_error: Option<String>,
}

impl Task {
    /// Build a `PENDING` task from a spec, filling unset fields from `defaults`.
    ///
    /// Duplicate capabilities and dependencies are collapsed, keeping the
    /// first occurrence.
    pub fn create(process_id: &str, spec: TaskSpec, defaults: &TaskDefaults) -> Result<Self> {
        if spec.task_id.trim().is_empty() {
            return Err(SchedulerError::ValidationError(format!(
                "task in process '{process_id}' has an empty task_id"
            )));
        }

        let retry_count = spec.retry_count.unwrap_or(defaults.retry_count);
        let timeout = spec.timeout.unwrap_or(defaults.timeout);

        Ok(Self {
            process_id: process_id.to_string(),
            task_id: spec.task_id,
            name: spec.name,
            description: spec.description,
            capabilities: dedup_preserving_order(spec.capabilities),
            dependencies: dedup_preserving_order(spec.dependencies),
            context: spec.context,
            timeout,
            retry_count,
            status: TaskStatus::Pending,
            retry_budget: retry_count,
            dispatch_attempts: 0,
            dispatched_at: None,
            last_error: None,
        })
    }

    pub fn status(&self) -> TaskStatus {
        self.status
    }

    /// Remaining retry attempts.
    pub fn retry_budget(&self) -> u32 {
        self.retry_budget
    }

    /// Number of times this task has been admitted for dispatch.
    pub fn dispatch_attempts(&self) -> u32 {
        self.dispatch_attempts
    }

    pub fn dispatched_at(&self) -> Option<Instant> {
        self.dispatched_at
    }

    pub fn last_error(&self) -> Option<&str> {
        self.last_error.as_deref()
    }

    /// `COMPLETED`, or `FAILED` with nothing left to retry.
    pub fn is_terminal(&self) -> bool {
        match self.status {
            TaskStatus::Completed => true,
            TaskStatus::Failed => self.retry_budget == 0,
            _ => false,
        }
    }

    /// `FAILED` with budget left; the next admission pass re-queues it.
    pub fn is_retryable(&self) -> bool {
        self.status == TaskStatus::Failed && self.retry_budget > 0
    }

    /// Key a worker can use to detect retransmission of the same attempt.
    pub fn idempotency_key(&self) -> String {
        format!("{}:{}", self.task_id, self.dispatch_attempts)
    }

    /// Apply a status change, enforcing the lifecycle state machine:
    ///
    /// ```text
    /// PENDING -> IN_PROGRESS
    /// IN_PROGRESS -> COMPLETED | FAILED
    /// FAILED -> PENDING            (retry_budget > 0, budget decremented)
    /// FAILED -> FAILED             (retry_budget == 0)
    /// PENDING | IN_PROGRESS -> PAUSED
    /// PAUSED -> PENDING
    /// ```
    pub fn transition(&mut self, to: TaskStatus) -> Result<()> {
        use TaskStatus::*;

        match (self.status, to) {
            (Pending, InProgress)
            | (InProgress, Completed)
            | (InProgress, Failed)
            | (Pending, Paused)
            | (InProgress, Paused)
            | (Paused, Pending) => {}
            (Failed, Pending) if self.retry_budget > 0 => {
                self.retry_budget -= 1;
            }
            (Failed, Failed) if self.retry_budget == 0 => {}
            (from, to) => {
                return Err(SchedulerError::InvalidTransition {
                    task_id: self.task_id.clone(),
                    from,
                    to,
                });
            }
        }

        self.status = to;
        Ok(())
    }

    /// Record that the task was just admitted; returns the new attempt number.
    pub(crate) fn record_dispatch(&mut self, now: Instant) -> u32 {
        self.dispatch_attempts += 1;
        self.dispatched_at = Some(now);
        self.dispatch_attempts
    }

    pub(crate) fn record_error(&mut self, error: impl Into<String>) {
        self.last_error = Some(error.into());
    }

    /// Whether an `IN_PROGRESS` task has been out longer than its timeout.
    pub fn has_timed_out(&self, now: Instant) -> bool {
        if self.status != TaskStatus::InProgress {
            return false;
        }
        match self.dispatched_at {
            Some(at) => now.saturating_duration_since(at) > self.timeout,
            None => false,
        }
    }

    /// Terminally fail the task regardless of its current status.
    ///
    /// Used for cancellation, upstream-failure propagation, and recovery from
    /// an invalid transition. The budget is forced to zero.
    pub(crate) fn force_fail(&mut self, reason: impl Into<String>) {
        self.status = TaskStatus::Failed;
        self.retry_budget = 0;
        self.last_error = Some(reason.into());
    }
}

fn dedup_preserving_order<T: PartialEq>(items: Vec<T>) -> Vec<T> {
    let mut out: Vec<T> = Vec::with_capacity(items.len());
    for item in items {
        if !out.contains(&item) {
            out.push(item);
        }
    }
    out
}
