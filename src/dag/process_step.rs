// src/dag/process_step.rs

//! Result types for a single step of a process state machine.

use crate::transport::wire::{DispatchMessage, FailureEscalation};
use crate::types::{Address, TaskId};

/// A message ready to be sent to an agent queue.
#[derive(Debug, Clone, PartialEq)]
pub struct Dispatch {
    pub address: Address,
    pub message: DispatchMessage,
}

/// Structured result of one step on a [`ProcessState`](crate::dag::ProcessState).
///
/// The caller owns all IO: it sends `dispatches`, publishes `escalations`,
/// and runs another admission pass when `needs_admission` is set.
#[derive(Debug, Clone, Default)]
pub struct ProcessStep {
    /// Tasks admitted in this step, with their routed address.
    pub dispatches: Vec<Dispatch>,
    /// Tasks that exhausted their retry budget in this step.
    pub escalations: Vec<FailureEscalation>,
    /// Tasks newly marked `FAILED` (retryable or not), including dependents
    /// failed by propagation.
    pub newly_failed: Vec<TaskId>,
    /// Tasks failed by the timeout sweep.
    pub timed_out: Vec<TaskId>,
    /// Something changed that may have made tasks eligible.
    pub needs_admission: bool,
    /// Every task in the process reached a terminal state in this step.
    pub process_just_finished: bool,
}

impl ProcessStep {
    pub fn is_empty(&self) -> bool {
        self.dispatches.is_empty()
            && self.escalations.is_empty()
            && self.newly_failed.is_empty()
            && self.timed_out.is_empty()
            && !self.needs_admission
            && !self.process_just_finished
    }

    pub fn merge(&mut self, other: ProcessStep) {
        self.dispatches.extend(other.dispatches);
        self.escalations.extend(other.escalations);
        self.newly_failed.extend(other.newly_failed);
        self.timed_out.extend(other.timed_out);
        self.needs_admission |= other.needs_admission;
        self.process_just_finished |= other.process_just_finished;
    }
}
