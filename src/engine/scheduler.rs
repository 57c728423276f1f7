// src/engine/scheduler.rs

use std::collections::HashMap;
use std::collections::hash_map::Entry;
use std::sync::{Arc, Mutex as StdMutex, PoisonError, RwLock};

use serde::Serialize;
use tokio::sync::{Mutex, mpsc};
use tokio::time::Instant;
use tracing::{debug, info, warn};

use crate::config::SchedulerSettings;
use crate::dag::{
    ExecutionContext, ProcessState, ProcessStep, ReportDisposition, Task, TaskStatus,
};
use crate::engine::Submission;
use crate::engine::admission::AdmissionQueue;
use crate::errors::{Result, SchedulerError};
use crate::routing::AgentRouter;
use crate::transport::Outbound;
use crate::transport::wire::WorkerReport;
use crate::types::{ProcessId, TaskId};

type ProcessHandle = Arc<Mutex<ProcessState>>;

/// Concurrent front end over all processes.
///
/// Each process lives behind its own `tokio::sync::Mutex`; the registry
/// around them is a plain read/write lock that is never held across an
/// `.await`. Reports for different processes proceed in parallel, reports
/// for one process are applied in the order they acquire its lock.
///
/// Outbound messages are pushed onto an unbounded queue and sent by the
/// outbound pump (see [`crate::transport::spawn_outbound_pump`]), so no
/// process lock is ever held while the transport is busy.
///
/// Cheap to clone; clones share state.
#[derive(Clone)]
pub struct Scheduler {
    inner: Arc<Inner>,
}

struct Inner {
    settings: SchedulerSettings,
    router: Arc<AgentRouter>,
    processes: RwLock<HashMap<ProcessId, ProcessHandle>>,
    /// task_id -> processes containing it, for reports without a process_id.
    task_index: RwLock<HashMap<TaskId, Vec<ProcessId>>>,
    admission: StdMutex<AdmissionQueue>,
    outbound: mpsc::UnboundedSender<Outbound>,
}

/// Per-status task counts for one process.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ProcessSummary {
    pub process_id: ProcessId,
    pub total: usize,
    pub pending: usize,
    pub in_progress: usize,
    pub completed: usize,
    pub failed: usize,
    pub paused: usize,
    pub finished: bool,
    pub cancelled: bool,
}

impl ProcessSummary {
    fn from_state(state: &ProcessState) -> Self {
        let graph = state.graph();
        Self {
            process_id: state.process_id().to_string(),
            total: graph.len(),
            pending: graph.count_with_status(TaskStatus::Pending),
            in_progress: graph.count_with_status(TaskStatus::InProgress),
            completed: graph.count_with_status(TaskStatus::Completed),
            failed: graph.count_with_status(TaskStatus::Failed),
            paused: graph.count_with_status(TaskStatus::Paused),
            finished: state.is_finished(),
            cancelled: state.is_cancelled(),
        }
    }
}

impl Scheduler {
    pub fn new(
        settings: SchedulerSettings,
        router: Arc<AgentRouter>,
        outbound: mpsc::UnboundedSender<Outbound>,
    ) -> Self {
        Self {
            inner: Arc::new(Inner {
                settings,
                router,
                processes: RwLock::new(HashMap::new()),
                task_index: RwLock::new(HashMap::new()),
                admission: StdMutex::new(AdmissionQueue::new()),
                outbound,
            }),
        }
    }

    pub fn settings(&self) -> &SchedulerSettings {
        &self.inner.settings
    }

    pub fn router(&self) -> &Arc<AgentRouter> {
        &self.inner.router
    }

    // ── Commands ─────────────────────────────────────────────────────

    /// Register a batch of tasks and run an admission pass.
    ///
    /// A new `process_id` creates the process; an existing one gets the
    /// tasks appended. Structural errors (duplicate ids, unknown
    /// dependencies, cycles) are returned and leave the process untouched.
    pub async fn submit(&self, submission: Submission) -> Result<()> {
        let Submission {
            process_id,
            tasks,
            max_parallel_tasks,
        } = submission;

        if tasks.is_empty() {
            return Err(SchedulerError::ValidationError(format!(
                "submission for process '{process_id}' contains no tasks"
            )));
        }

        let defaults = self.inner.settings.task_defaults;
        let task_ids: Vec<TaskId> = tasks.iter().map(|t| t.task_id.clone()).collect();

        let existing = match self.process_handle(&process_id) {
            Some(handle) => Some(handle),
            None => {
                let mut fresh = ProcessState::new(
                    process_id.clone(),
                    max_parallel_tasks.unwrap_or(self.inner.settings.max_parallel_tasks),
                );
                fresh.register(tasks.clone(), &defaults)?;
                self.install_process(fresh)
            }
        };

        // Someone else created the process first (or it already existed).
        if let Some(handle) = existing {
            let mut state = handle.lock().await;
            state.register(tasks, &defaults)?;
            if let Some(limit) = max_parallel_tasks {
                state.set_max_parallel_tasks(limit);
            }
        }

        self.index_tasks(&process_id, task_ids);
        self.request_admission(&process_id);
        self.run_admission_passes().await;
        Ok(())
    }

    /// Apply one worker report.
    ///
    /// The status change and the follow-up admission for the same process
    /// happen under a single acquisition of its lock.
    pub async fn on_worker_report(&self, report: WorkerReport) -> ReportDisposition {
        let process_id = match report.process_id.clone() {
            Some(pid) => pid,
            None => match self.resolve_process(&report.task_id) {
                Some(pid) => pid,
                None => return ReportDisposition::Unknown,
            },
        };

        let Some(handle) = self.process_handle(&process_id) else {
            warn!(
                process = %process_id,
                task = %report.task_id,
                "report for unknown process; ignoring"
            );
            return ReportDisposition::Unknown;
        };

        let (disposition, step) = {
            let mut state = handle.lock().await;
            let (disposition, mut step) =
                state.apply_report(&report.task_id, report.dispatch_attempt, report.outcome());
            self.admit_locked(&mut state, &mut step);
            (disposition, step)
        };

        self.publish(&process_id, step);
        self.run_admission_passes().await;
        disposition
    }

    /// Service queued admission passes until the queue is empty.
    pub async fn run_admission_passes(&self) {
        while let Some(process_id) = self.next_admission() {
            let Some(handle) = self.process_handle(&process_id) else {
                continue;
            };
            let step = {
                let mut state = handle.lock().await;
                state.admit(&self.inner.router, Instant::now())
            };
            self.publish(&process_id, step);
        }
    }

    /// Fail every task whose timeout has elapsed since dispatch.
    ///
    /// Returns the number of tasks that timed out.
    pub async fn sweep_timeouts(&self) -> usize {
        let now = Instant::now();
        let mut expired = 0;

        for (process_id, handle) in self.process_handles() {
            let step = {
                let mut state = handle.lock().await;
                let mut step = state.sweep_timeouts(now);
                self.admit_locked(&mut state, &mut step);
                step
            };
            expired += step.timed_out.len();
            self.publish(&process_id, step);
        }

        if expired > 0 {
            debug!(expired, "timeout sweep failed tasks");
        }
        self.run_admission_passes().await;
        expired
    }

    /// Terminally fail all non-terminal tasks of a process.
    pub async fn cancel_process(&self, process_id: &str) -> Result<()> {
        let handle = self.require_process(process_id)?;
        let step = handle.lock().await.cancel();
        self.lock_admission().remove(process_id);
        self.publish(process_id, step);
        Ok(())
    }

    pub async fn pause_task(&self, process_id: &str, task_id: &str) -> Result<()> {
        let handle = self.require_process(process_id)?;
        handle.lock().await.pause(task_id)?;

        // A paused IN_PROGRESS task frees a slot.
        self.request_admission(process_id);
        self.run_admission_passes().await;
        Ok(())
    }

    pub async fn resume_task(&self, process_id: &str, task_id: &str) -> Result<()> {
        let handle = self.require_process(process_id)?;
        let step = {
            let mut state = handle.lock().await;
            let mut step = state.resume(task_id)?;
            self.admit_locked(&mut state, &mut step);
            step
        };
        self.publish(process_id, step);
        self.run_admission_passes().await;
        Ok(())
    }

    /// Forget a process entirely, returning its final execution context.
    ///
    /// Reports that arrive afterwards are treated as unknown.
    pub async fn remove_process(&self, process_id: &str) -> Result<ExecutionContext> {
        let handle = {
            let mut processes = self.write_processes();
            processes
                .remove(process_id)
                .ok_or_else(|| SchedulerError::ProcessNotFound(process_id.to_string()))?
        };
        self.lock_admission().remove(process_id);
        {
            let mut index = self
                .inner
                .task_index
                .write()
                .unwrap_or_else(PoisonError::into_inner);
            index.retain(|_, pids| {
                pids.retain(|p| p != process_id);
                !pids.is_empty()
            });
        }

        let state = handle.lock().await;
        info!(
            process = %process_id,
            completed = state.context().len(),
            "process removed"
        );
        Ok(state.context().clone())
    }

    // ── Queries ──────────────────────────────────────────────────────

    /// Known process ids, sorted.
    pub fn process_ids(&self) -> Vec<ProcessId> {
        let mut ids: Vec<ProcessId> = self.read_processes().keys().cloned().collect();
        ids.sort();
        ids
    }

    pub async fn status_of(&self, process_id: &str, task_id: &str) -> Option<TaskStatus> {
        let handle = self.process_handle(process_id)?;
        let state = handle.lock().await;
        state.status_of(task_id)
    }

    /// Snapshot of a task.
    pub async fn task(&self, process_id: &str, task_id: &str) -> Option<Task> {
        let handle = self.process_handle(process_id)?;
        let state = handle.lock().await;
        state.task(task_id).cloned()
    }

    pub async fn eligible(&self, process_id: &str) -> Result<Vec<TaskId>> {
        let handle = self.require_process(process_id)?;
        let state = handle.lock().await;
        Ok(state.eligible())
    }

    /// Snapshot of a process's execution context.
    pub async fn context(&self, process_id: &str) -> Result<ExecutionContext> {
        let handle = self.require_process(process_id)?;
        let state = handle.lock().await;
        Ok(state.context().clone())
    }

    pub async fn in_progress_count(&self, process_id: &str) -> Result<usize> {
        let handle = self.require_process(process_id)?;
        let state = handle.lock().await;
        Ok(state.in_progress_count())
    }

    pub async fn summary(&self, process_id: &str) -> Result<ProcessSummary> {
        let handle = self.require_process(process_id)?;
        let state = handle.lock().await;
        Ok(ProcessSummary::from_state(&state))
    }

    /// True when at least one process exists and all of them are finished.
    pub async fn all_finished(&self) -> bool {
        let handles = self.process_handles();
        if handles.is_empty() {
            return false;
        }
        for (_, handle) in handles {
            if !handle.lock().await.is_finished() {
                return false;
            }
        }
        true
    }

    // ── Internals ────────────────────────────────────────────────────

    /// Run an admission pass on an already-locked process if `step` asks
    /// for one. Whatever the pass itself needs afterwards is carried over.
    fn admit_locked(&self, state: &mut ProcessState, step: &mut ProcessStep) {
        if !step.needs_admission {
            return;
        }
        let admitted = state.admit(&self.inner.router, Instant::now());
        step.needs_admission = false;
        step.merge(admitted);
    }

    /// Push the step's messages onto the outbound queue and queue another
    /// admission pass if needed.
    fn publish(&self, process_id: &str, step: ProcessStep) {
        if step.needs_admission {
            self.request_admission(process_id);
        }

        for dispatch in step.dispatches {
            if self.inner.outbound.send(Outbound::Dispatch(dispatch)).is_err() {
                warn!(process = %process_id, "outbound queue closed; dropping dispatch");
            }
        }
        for escalation in step.escalations {
            if self.inner.outbound.send(Outbound::Escalation(escalation)).is_err() {
                warn!(process = %process_id, "outbound queue closed; dropping escalation");
            }
        }
    }

    fn request_admission(&self, process_id: &str) {
        self.lock_admission().request(process_id);
    }

    fn next_admission(&self) -> Option<ProcessId> {
        self.lock_admission().pop()
    }

    fn lock_admission(&self) -> std::sync::MutexGuard<'_, AdmissionQueue> {
        self.inner
            .admission
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }

    fn read_processes(
        &self,
    ) -> std::sync::RwLockReadGuard<'_, HashMap<ProcessId, ProcessHandle>> {
        self.inner
            .processes
            .read()
            .unwrap_or_else(PoisonError::into_inner)
    }

    fn write_processes(
        &self,
    ) -> std::sync::RwLockWriteGuard<'_, HashMap<ProcessId, ProcessHandle>> {
        self.inner
            .processes
            .write()
            .unwrap_or_else(PoisonError::into_inner)
    }

    fn process_handle(&self, process_id: &str) -> Option<ProcessHandle> {
        self.read_processes().get(process_id).cloned()
    }

    fn require_process(&self, process_id: &str) -> Result<ProcessHandle> {
        self.process_handle(process_id)
            .ok_or_else(|| SchedulerError::ProcessNotFound(process_id.to_string()))
    }

    fn process_handles(&self) -> Vec<(ProcessId, ProcessHandle)> {
        self.read_processes()
            .iter()
            .map(|(pid, handle)| (pid.clone(), handle.clone()))
            .collect()
    }

    /// Insert a freshly registered process. If another submission created
    /// the same process in the meantime, the existing handle is returned
    /// and `state` is discarded.
    fn install_process(&self, state: ProcessState) -> Option<ProcessHandle> {
        let mut processes = self.write_processes();
        match processes.entry(state.process_id().to_string()) {
            Entry::Occupied(entry) => Some(entry.get().clone()),
            Entry::Vacant(entry) => {
                info!(process = %entry.key(), "process created");
                entry.insert(Arc::new(Mutex::new(state)));
                None
            }
        }
    }

    fn index_tasks(&self, process_id: &str, task_ids: Vec<TaskId>) {
        let mut index = self
            .inner
            .task_index
            .write()
            .unwrap_or_else(PoisonError::into_inner);
        for task_id in task_ids {
            let pids = index.entry(task_id).or_default();
            if !pids.iter().any(|p| p == process_id) {
                pids.push(process_id.to_string());
            }
        }
    }

    /// Find the process of a report that did not name one.
    fn resolve_process(&self, task_id: &str) -> Option<ProcessId> {
        let index = self
            .inner
            .task_index
            .read()
            .unwrap_or_else(PoisonError::into_inner);
        match index.get(task_id).map(Vec::as_slice) {
            Some([only]) => Some(only.clone()),
            Some([]) | None => {
                warn!(task = %task_id, "report for unknown task; ignoring");
                None
            }
            Some(many) => {
                warn!(
                    task = %task_id,
                    processes = ?many,
                    "report without process_id matches several processes; ignoring"
                );
                None
            }
        }
    }
}

impl std::fmt::Debug for Scheduler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Scheduler")
            .field("settings", &self.inner.settings)
            .field("processes", &self.process_ids())
            .finish_non_exhaustive()
    }
}
