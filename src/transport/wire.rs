// src/transport/wire.rs

//! JSON payloads exchanged with the broker.
//!
//! - [`DispatchMessage`]: scheduler -> worker queue.
//! - [`WorkerReport`]: worker -> scheduler.
//! - [`FailureEscalation`]: scheduler -> failure topic.
//! - [`parse_submission`]: process request -> [`Submission`], with all
//!   required-field checks done before any task object exists.

use std::time::Duration;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::dag::{ReportOutcome, Task, TaskSpec, TaskStatus};
use crate::engine::Submission;
use crate::errors::{Result, SchedulerError};
use crate::types::{Capability, ProcessId, ReportStatus, TaskId};

/// Serialized form of a task as sent to a worker.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TaskPayload {
    pub task_id: TaskId,
    pub task_name: String,
    pub task_description: String,
    pub capabilities: Vec<Capability>,
    pub dependencies: Vec<TaskId>,
    /// Remaining retry budget at dispatch time.
    pub retry_count: u32,
    /// Whole seconds, rounded up so a sub-second timeout is never `0`.
    pub timeout: u64,
    pub context: Map<String, Value>,
    pub status: TaskStatus,
}

impl From<&Task> for TaskPayload {
    fn from(task: &Task) -> Self {
        Self {
            task_id: task.task_id.clone(),
            task_name: task.name.clone(),
            task_description: task.description.clone(),
            capabilities: task.capabilities.clone(),
            dependencies: task.dependencies.clone(),
            retry_count: task.retry_budget(),
            timeout: ceil_secs(task.timeout),
            context: task.context.clone(),
            status: task.status(),
        }
    }
}

fn ceil_secs(timeout: Duration) -> u64 {
    timeout.as_secs() + u64::from(timeout.subsec_nanos() > 0)
}

/// Message sent to the address returned by the agent router.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DispatchMessage {
    pub process_id: ProcessId,
    pub task: TaskPayload,
    pub dispatch_attempt: u32,
    /// `task_id:dispatch_attempt`; identical for retransmissions of one attempt.
    pub idempotency_key: String,
}

impl DispatchMessage {
    pub fn for_task(task: &Task) -> Self {
        Self {
            process_id: task.process_id.clone(),
            task: TaskPayload::from(task),
            dispatch_attempt: task.dispatch_attempts(),
            idempotency_key: task.idempotency_key(),
        }
    }
}

/// Emitted when a task exhausts its retry budget.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FailureEscalation {
    pub task_id: TaskId,
    pub process_id: ProcessId,
    pub error: String,
}

/// Outcome reported by a worker for one dispatched task.
///
/// `process_id` and `dispatch_attempt` are optional; when present they pin
/// the report to a process and to a specific attempt. Workers should echo
/// the `dispatch_attempt` they were sent: an unpinned failure that arrives
/// after a retry is charged to the current attempt.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WorkerReport {
    pub task_id: TaskId,
    pub status: ReportStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub result: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub process_id: Option<ProcessId>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub dispatch_attempt: Option<u32>,
}

impl WorkerReport {
    pub fn completed(task_id: impl Into<TaskId>, result: Value) -> Self {
        Self {
            task_id: task_id.into(),
            status: ReportStatus::Completed,
            result: Some(result),
            error: None,
            process_id: None,
            dispatch_attempt: None,
        }
    }

    pub fn failed(task_id: impl Into<TaskId>, error: impl Into<String>) -> Self {
        Self {
            task_id: task_id.into(),
            status: ReportStatus::Failed,
            result: None,
            error: Some(error.into()),
            process_id: None,
            dispatch_attempt: None,
        }
    }

    pub fn in_process(mut self, process_id: impl Into<ProcessId>) -> Self {
        self.process_id = Some(process_id.into());
        self
    }

    pub fn for_attempt(mut self, attempt: u32) -> Self {
        self.dispatch_attempt = Some(attempt);
        self
    }

    /// A completion without a result records `null`; a failure without an
    /// error message gets a generic one.
    pub fn outcome(&self) -> ReportOutcome {
        match self.status {
            ReportStatus::Completed => {
                ReportOutcome::Completed(self.result.clone().unwrap_or(Value::Null))
            }
            ReportStatus::Failed => ReportOutcome::Failed(
                self.error
                    .clone()
                    .unwrap_or_else(|| "worker reported failure".to_string()),
            ),
        }
    }
}

// ── Submissions ──────────────────────────────────────────────────────

#[derive(Debug, Deserialize)]
struct RawSubmission {
    process_id: Option<String>,
    tasks: Option<Vec<RawTask>>,
    /// Single-task form: `{"process_id": .., "task": {..}}`.
    task: Option<RawTask>,
    max_parallel_tasks: Option<i64>,
}

#[derive(Debug, Deserialize)]
struct RawTask {
    task_id: Option<String>,
    task_name: Option<String>,
    task_description: Option<String>,
    capabilities: Option<CapabilityList>,
    dependencies: Option<Vec<String>>,
    retry_count: Option<i64>,
    timeout: Option<i64>,
    context: Option<Map<String, Value>>,
}

/// Producers disagree on whether `capabilities` is one tag or a list.
#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum CapabilityList {
    One(String),
    Many(Vec<String>),
}

impl CapabilityList {
    fn into_capabilities(self) -> Vec<Capability> {
        match self {
            CapabilityList::One(tag) => vec![Capability::new(tag)],
            CapabilityList::Many(tags) => tags.into_iter().map(Capability::new).collect(),
        }
    }
}

/// Parse a JSON submission string.
pub fn parse_submission_str(s: &str) -> Result<Submission> {
    let value: Value = serde_json::from_str(s)
        .map_err(|e| SchedulerError::ValidationError(format!("submission is not valid JSON: {e}")))?;
    parse_submission(value)
}

/// Validate a submission payload and convert it into a [`Submission`].
///
/// Accepts either `tasks: [...]` or a single `task: {...}`.
pub fn parse_submission(value: Value) -> Result<Submission> {
    let raw: RawSubmission = serde_json::from_value(value)
        .map_err(|e| SchedulerError::ValidationError(format!("malformed submission: {e}")))?;

    let process_id = match raw.process_id {
        Some(pid) if !pid.trim().is_empty() => pid,
        _ => return Err(missing("submission", "process_id")),
    };

    let raw_tasks = match (raw.tasks, raw.task) {
        (Some(tasks), None) => tasks,
        (None, Some(task)) => vec![task],
        (Some(_), Some(_)) => {
            return Err(SchedulerError::ValidationError(format!(
                "submission for process '{process_id}' has both `tasks` and `task`"
            )));
        }
        (None, None) => return Err(missing("submission", "tasks")),
    };

    if raw_tasks.is_empty() {
        return Err(SchedulerError::ValidationError(format!(
            "submission for process '{process_id}' contains no tasks"
        )));
    }

    let max_parallel_tasks = match raw.max_parallel_tasks {
        None => None,
        Some(n) if n >= 1 => Some(n as usize),
        Some(n) => {
            return Err(SchedulerError::ValidationError(format!(
                "max_parallel_tasks must be >= 1 (got {n})"
            )));
        }
    };

    let tasks = raw_tasks
        .into_iter()
        .enumerate()
        .map(|(i, raw)| task_spec_from_raw(i, raw))
        .collect::<Result<Vec<_>>>()?;

    Ok(Submission {
        process_id,
        tasks,
        max_parallel_tasks,
    })
}

fn task_spec_from_raw(index: usize, raw: RawTask) -> Result<TaskSpec> {
    let where_ = format!("task #{index}");

    let task_id = match raw.task_id {
        Some(id) if !id.trim().is_empty() => id,
        _ => return Err(missing(&where_, "task_id")),
    };
    let name = raw
        .task_name
        .ok_or_else(|| missing(&format!("task '{task_id}'"), "task_name"))?;
    let capabilities = raw
        .capabilities
        .ok_or_else(|| missing(&format!("task '{task_id}'"), "capabilities"))?
        .into_capabilities();

    let retry_count = match raw.retry_count {
        None => None,
        Some(n) => Some(u32::try_from(n).map_err(|_| {
            SchedulerError::ValidationError(format!(
                "task '{task_id}' has invalid retry_count {n} (must be >= 0)"
            ))
        })?),
    };

    let timeout = match raw.timeout {
        None => None,
        Some(secs) if secs > 0 => Some(Duration::from_secs(secs as u64)),
        Some(secs) => {
            return Err(SchedulerError::ValidationError(format!(
                "task '{task_id}' has invalid timeout {secs} (must be > 0 seconds)"
            )));
        }
    };

    Ok(TaskSpec {
        task_id,
        name,
        description: raw.task_description.unwrap_or_default(),
        capabilities,
        dependencies: raw.dependencies.unwrap_or_default(),
        retry_count,
        timeout,
        context: raw.context.unwrap_or_default(),
    })
}

fn missing(where_: &str, field: &str) -> SchedulerError {
    SchedulerError::ValidationError(format!("{where_} is missing required field `{field}`"))
}
