// src/engine/mod.rs

//! Orchestration engine for agentflow.
//!
//! This module ties together:
//! - the per-process state machines ([`crate::dag::ProcessState`])
//! - the round-robin admission queue
//! - the outbound queue towards the transport
//! - the runtime event loop that reacts to:
//!   - submissions
//!   - worker reports
//!   - cancel / pause / resume requests
//!   - the periodic timeout sweep
//!   - shutdown signals
//!
//! [`Scheduler`] is the concurrent, lock-per-process layer; [`Runtime`] is
//! the async event loop around it.

use std::time::Duration;

use crate::dag::TaskSpec;
use crate::transport::wire::WorkerReport;
use crate::types::{ProcessId, TaskId};

/// A validated batch of tasks for one process.
#[derive(Debug, Clone, PartialEq)]
pub struct Submission {
    pub process_id: ProcessId,
    pub tasks: Vec<TaskSpec>,
    /// Overrides the configured default for this process.
    pub max_parallel_tasks: Option<usize>,
}

/// Runtime options for the async event loop.
#[derive(Debug, Clone, Copy)]
pub struct RuntimeOptions {
    /// How often to sweep for timed-out tasks.
    pub sweep_interval: Duration,
    /// Exit once at least one process exists and every process is finished
    /// (used for `--once`).
    pub exit_when_idle: bool,
}

impl Default for RuntimeOptions {
    fn default() -> Self {
        Self {
            sweep_interval: Duration::from_secs(1),
            exit_when_idle: false,
        }
    }
}

/// Events flowing into the runtime from the transport, the CLI and signals.
#[derive(Debug, Clone)]
pub enum RuntimeEvent {
    Submit(Submission),
    Report(WorkerReport),
    CancelProcess {
        process_id: ProcessId,
    },
    PauseTask {
        process_id: ProcessId,
        task_id: TaskId,
    },
    ResumeTask {
        process_id: ProcessId,
        task_id: TaskId,
    },
    /// Graceful shutdown requested (e.g. Ctrl-C).
    ShutdownRequested,
}

pub mod admission;
pub mod runtime;
pub mod scheduler;

pub use admission::AdmissionQueue;
pub use runtime::Runtime;
pub use scheduler::{ProcessSummary, Scheduler};
