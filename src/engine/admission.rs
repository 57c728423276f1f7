// src/engine/admission.rs

use std::collections::{HashSet, VecDeque};

use tracing::debug;

use crate::types::ProcessId;

/// Processes waiting for an admission pass.
///
/// Semantics:
/// - Each process appears at most once; requesting a pass for a process
///   that is already queued is a no-op.
/// - Passes are serviced in FIFO order. A process that needs another pass
///   after being serviced is re-requested and goes to the back, so a busy
///   process cannot starve the others.
#[derive(Debug, Default)]
pub struct AdmissionQueue {
    order: VecDeque<ProcessId>,
    queued: HashSet<ProcessId>,
}

impl AdmissionQueue {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_empty(&self) -> bool {
        self.order.is_empty()
    }

    pub fn len(&self) -> usize {
        self.order.len()
    }

    pub fn contains(&self, process_id: &str) -> bool {
        self.queued.contains(process_id)
    }

    /// Queue an admission pass for `process_id`.
    ///
    /// Returns `false` if one was already queued.
    pub fn request(&mut self, process_id: &str) -> bool {
        if !self.queued.insert(process_id.to_string()) {
            debug!(process = %process_id, "admission pass already queued; coalescing");
            return false;
        }
        self.order.push_back(process_id.to_string());
        true
    }

    /// Take the next process to service.
    pub fn pop(&mut self) -> Option<ProcessId> {
        let process_id = self.order.pop_front()?;
        self.queued.remove(&process_id);
        Some(process_id)
    }

    /// Drop any queued pass for `process_id`.
    pub fn remove(&mut self, process_id: &str) {
        if self.queued.remove(process_id) {
            self.order.retain(|p| p != process_id);
        }
    }
}
