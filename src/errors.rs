// src/errors.rs

//! Crate-wide error type and result alias.

use thiserror::Error;

use crate::dag::TaskStatus;
use crate::types::{Capability, ProcessId, TaskId};

#[derive(Error, Debug)]
pub enum SchedulerError {
    /// Malformed submission; no task was created.
    #[error("Validation error: {0}")]
    ValidationError(String),

    #[error("Cyclic dependency detected in process '{process_id}' involving task '{task_id}'")]
    CyclicDependencyError {
        process_id: ProcessId,
        task_id: TaskId,
    },

    #[error("Task '{task_id}' in process '{process_id}' has unknown dependency '{dependency}'")]
    UnknownDependencyError {
        process_id: ProcessId,
        task_id: TaskId,
        dependency: TaskId,
    },

    /// A status change outside the task state machine. Indicates a scheduler bug.
    #[error("Invalid transition for task '{task_id}': {from} -> {to}")]
    InvalidTransition {
        task_id: TaskId,
        from: TaskStatus,
        to: TaskStatus,
    },

    #[error("No capable agent for capabilities {0:?}")]
    NoCapableAgent(Vec<Capability>),

    #[error("Task '{0}' timed out")]
    TimeoutError(TaskId),

    #[error("Task '{0}' exhausted its retry budget")]
    RetryBudgetExhausted(TaskId),

    #[error("Process not found: {0}")]
    ProcessNotFound(ProcessId),

    #[error("Task not found: {0}")]
    TaskNotFound(TaskId),

    #[error("Configuration error: {0}")]
    ConfigError(String),

    #[error("Transport error: {0}")]
    TransportError(String),

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("TOML parsing error: {0}")]
    TomlError(#[from] toml::de::Error),

    #[error("JSON error: {0}")]
    JsonError(#[from] serde_json::Error),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl SchedulerError {
    /// Whether this error is a structural submission error that must be
    /// surfaced to the submitter rather than absorbed into task state.
    pub fn is_structural(&self) -> bool {
        matches!(
            self,
            SchedulerError::ValidationError(_)
                | SchedulerError::CyclicDependencyError { .. }
                | SchedulerError::UnknownDependencyError { .. }
        )
    }
}

pub use anyhow::Error;
pub type Result<T> = std::result::Result<T, SchedulerError>;
