// src/dag/mod.rs

//! Tasks, dependency graphs and the per-process state machine.
//!
//! - [`task`] defines a task, its status and the status state machine.
//! - [`graph`] stores one process's tasks and rejects cycles and unknown
//!   dependencies on registration.
//! - [`context`] records completed task results.
//! - [`process`] ties the above together into a synchronous core that
//!   admits, fails, retries and finishes tasks.
//! - [`process_step`] defines the result type of one process step.

pub mod context;
pub mod graph;
pub mod process;
pub mod process_step;
pub mod task;

pub use context::ExecutionContext;
pub use graph::DependencyGraph;
pub use process::{ProcessState, ReportDisposition, ReportOutcome};
pub use process_step::{Dispatch, ProcessStep};
pub use task::{DEFAULT_RETRY_COUNT, DEFAULT_TIMEOUT, Task, TaskDefaults, TaskSpec, TaskStatus};
