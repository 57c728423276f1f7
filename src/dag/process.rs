// src/dag/process.rs

//! Synchronous per-process state machine.
//!
//! [`ProcessState`] owns one process's dependency graph and execution
//! context. Every operation mutates state and returns a [`ProcessStep`]
//! describing what the caller must do next (send dispatches, publish
//! escalations, run another admission pass). Nothing here does IO or
//! awaits, so the whole lifecycle can be stepped by hand in tests.

use serde_json::Value;
use tokio::time::Instant;
use tracing::{debug, error, info, warn};

use crate::dag::context::ExecutionContext;
use crate::dag::graph::DependencyGraph;
use crate::dag::process_step::{Dispatch, ProcessStep};
use crate::dag::task::{Task, TaskDefaults, TaskSpec, TaskStatus};
use crate::errors::{Result, SchedulerError};
use crate::routing::AgentRouter;
use crate::transport::wire::{DispatchMessage, FailureEscalation};
use crate::types::{ProcessId, TaskId};

/// What a worker said about one dispatched task.
#[derive(Debug, Clone, PartialEq)]
pub enum ReportOutcome {
    Completed(Value),
    Failed(String),
}

/// How a worker report was handled.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReportDisposition {
    /// The report moved the task to a new status.
    Applied,
    /// The task already holds the reported outcome; nothing changed.
    Duplicate,
    /// The report refers to an attempt that is no longer outstanding.
    Stale,
    /// No such task (or process).
    Unknown,
}

/// Tasks, results and admission bookkeeping for one process.
#[derive(Debug, Clone)]
pub struct ProcessState {
    graph: DependencyGraph,
    context: ExecutionContext,
    max_parallel_tasks: usize,
    cancelled: bool,
    finished: bool,
}

impl ProcessState {
    pub fn new(process_id: impl Into<ProcessId>, max_parallel_tasks: usize) -> Self {
        Self {
            graph: DependencyGraph::new(process_id),
            context: ExecutionContext::new(),
            max_parallel_tasks: max_parallel_tasks.max(1),
            cancelled: false,
            finished: false,
        }
    }

    pub fn process_id(&self) -> &str {
        self.graph.process_id()
    }

    pub fn graph(&self) -> &DependencyGraph {
        &self.graph
    }

    pub fn context(&self) -> &ExecutionContext {
        &self.context
    }

    pub fn task(&self, task_id: &str) -> Option<&Task> {
        self.graph.get(task_id)
    }

    pub fn status_of(&self, task_id: &str) -> Option<TaskStatus> {
        self.graph.get(task_id).map(Task::status)
    }

    pub fn max_parallel_tasks(&self) -> usize {
        self.max_parallel_tasks
    }

    pub fn set_max_parallel_tasks(&mut self, max_parallel_tasks: usize) {
        self.max_parallel_tasks = max_parallel_tasks.max(1);
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancelled
    }

    /// All tasks terminal.
    pub fn is_finished(&self) -> bool {
        self.finished
    }

    pub fn in_progress_count(&self) -> usize {
        self.graph.count_with_status(TaskStatus::InProgress)
    }

    /// `PENDING` tasks whose dependencies are all `COMPLETED`.
    pub fn eligible(&self) -> Vec<TaskId> {
        self.graph.eligible()
    }

    /// Build tasks from `specs` and add them to the graph.
    ///
    /// Validation covers the whole batch first; on any error no task is
    /// registered.
    pub fn register(&mut self, specs: Vec<TaskSpec>, defaults: &TaskDefaults) -> Result<()> {
        if self.cancelled {
            return Err(SchedulerError::ValidationError(format!(
                "process '{}' has been cancelled",
                self.process_id()
            )));
        }

        let process_id = self.process_id().to_string();
        let tasks = specs
            .into_iter()
            .map(|spec| Task::create(&process_id, spec, defaults))
            .collect::<Result<Vec<_>>>()?;
        let added: Vec<TaskId> = tasks.iter().map(|t| t.task_id.clone()).collect();

        self.graph.register(tasks)?;
        self.finished = false;

        info!(
            process = %process_id,
            added = added.len(),
            total = self.graph.len(),
            "registered tasks"
        );

        // New tasks hanging off an already exhausted task can never run.
        let mut step = ProcessStep::default();
        for task_id in &added {
            self.fail_if_upstream_failed(task_id, &mut step);
        }
        self.check_finished(&mut step);
        Ok(())
    }

    /// Apply a worker report to the task it names.
    ///
    /// When `dispatch_attempt` is given it must match the task's current
    /// attempt, otherwise the report is stale. Without it a late failure for
    /// an earlier attempt is indistinguishable from a failure of the current
    /// one and is charged against the retry budget.
    pub fn apply_report(
        &mut self,
        task_id: &str,
        dispatch_attempt: Option<u32>,
        outcome: ReportOutcome,
    ) -> (ReportDisposition, ProcessStep) {
        let mut step = ProcessStep::default();

        let Some(task) = self.graph.get_mut(task_id) else {
            warn!(
                process = %self.graph.process_id(),
                task = %task_id,
                "report for unknown task; ignoring"
            );
            return (ReportDisposition::Unknown, step);
        };

        if let Some(attempt) = dispatch_attempt {
            if attempt != task.dispatch_attempts() {
                debug!(
                    process = %task.process_id,
                    task = %task_id,
                    reported = attempt,
                    current = task.dispatch_attempts(),
                    "report for a superseded attempt; dropping"
                );
                return (ReportDisposition::Stale, step);
            }
        }

        let disposition = match (task.status(), outcome) {
            (TaskStatus::InProgress, ReportOutcome::Completed(result)) => {
                if let Err(err) = task.transition(TaskStatus::Completed) {
                    error!(task = %task_id, error = %err, "could not complete task");
                    return (ReportDisposition::Stale, step);
                }
                info!(
                    process = %task.process_id,
                    task = %task_id,
                    attempt = task.dispatch_attempts(),
                    "task completed"
                );
                self.context.record_result(task_id, result);
                step.needs_admission = true;
                ReportDisposition::Applied
            }
            (TaskStatus::InProgress, ReportOutcome::Failed(reason)) => {
                if dispatch_attempt.is_none() && task.dispatch_attempts() > 1 {
                    warn!(
                        process = %task.process_id,
                        task = %task_id,
                        current = task.dispatch_attempts(),
                        "unpinned failure report for a retried task; charging the current attempt"
                    );
                }
                self.fail_task(task_id, reason, &mut step);
                ReportDisposition::Applied
            }
            (TaskStatus::Completed, ReportOutcome::Completed(_))
            | (TaskStatus::Failed, ReportOutcome::Failed(_)) => {
                debug!(task = %task_id, "duplicate report; ignoring");
                ReportDisposition::Duplicate
            }
            (status, _) => {
                debug!(
                    task = %task_id,
                    %status,
                    "report for a task that is not in progress; dropping"
                );
                ReportDisposition::Stale
            }
        };

        self.check_finished(&mut step);
        (disposition, step)
    }

    /// Re-queue retryable failures, then move eligible tasks to
    /// `IN_PROGRESS` up to the free parallelism slots and route each one.
    ///
    /// A task whose capabilities have no route fails in place and consumes
    /// a retry, exactly like a worker-reported failure.
    pub fn admit(&mut self, router: &AgentRouter, now: Instant) -> ProcessStep {
        let mut step = ProcessStep::default();
        if self.cancelled {
            return step;
        }

        self.requeue_retryable();

        let eligible = self.graph.eligible();
        let slots = self
            .max_parallel_tasks
            .saturating_sub(self.in_progress_count());

        if eligible.len() > slots {
            debug!(
                process = %self.process_id(),
                eligible = eligible.len(),
                slots,
                "parallelism bound reached; deferring tasks"
            );
        }

        for task_id in eligible.into_iter().take(slots) {
            let Some(task) = self.graph.get_mut(&task_id) else {
                continue;
            };

            if let Err(err) = task.transition(TaskStatus::InProgress) {
                error!(task = %task_id, error = %err, "admission of ineligible task");
                task.force_fail(err.to_string());
                step.newly_failed.push(task_id);
                continue;
            }
            let attempt = task.record_dispatch(now);

            match router.route(&task.capabilities) {
                Ok(address) => {
                    info!(
                        process = %task.process_id,
                        task = %task_id,
                        attempt,
                        address = %address,
                        "dispatching task"
                    );
                    step.dispatches.push(Dispatch {
                        address,
                        message: DispatchMessage::for_task(task),
                    });
                }
                Err(err) => {
                    warn!(
                        process = %task.process_id,
                        task = %task_id,
                        error = %err,
                        "task cannot be routed"
                    );
                    self.fail_task(&task_id, err.to_string(), &mut step);
                }
            }
        }

        self.check_finished(&mut step);
        step
    }

    /// Fail every `IN_PROGRESS` task dispatched longer ago than its timeout.
    pub fn sweep_timeouts(&mut self, now: Instant) -> ProcessStep {
        let mut step = ProcessStep::default();

        let expired: Vec<TaskId> = self
            .graph
            .tasks()
            .filter(|t| t.has_timed_out(now))
            .map(|t| t.task_id.clone())
            .collect();

        for task_id in expired {
            let err = SchedulerError::TimeoutError(task_id.clone());
            warn!(process = %self.process_id(), task = %task_id, "task timed out");
            self.fail_task(&task_id, err.to_string(), &mut step);
            step.timed_out.push(task_id);
        }

        self.check_finished(&mut step);
        step
    }

    /// Terminally fail every non-terminal task and refuse further
    /// admissions. No escalation is published for cancelled tasks.
    pub fn cancel(&mut self) -> ProcessStep {
        let mut step = ProcessStep::default();
        self.cancelled = true;

        for task in self.graph.tasks_mut() {
            if !task.is_terminal() {
                task.force_fail("process cancelled");
                step.newly_failed.push(task.task_id.clone());
            }
        }

        info!(
            process = %self.process_id(),
            cancelled = step.newly_failed.len(),
            "process cancelled"
        );
        self.check_finished(&mut step);
        step
    }

    /// Hold a `PENDING` or `IN_PROGRESS` task out of admission.
    ///
    /// A report for a paused task's outstanding attempt is dropped.
    pub fn pause(&mut self, task_id: &str) -> Result<()> {
        let task = self
            .graph
            .get_mut(task_id)
            .ok_or_else(|| SchedulerError::TaskNotFound(task_id.to_string()))?;
        task.transition(TaskStatus::Paused)?;
        info!(process = %task.process_id, task = %task_id, "task paused");
        Ok(())
    }

    /// Return a paused task to `PENDING`.
    pub fn resume(&mut self, task_id: &str) -> Result<ProcessStep> {
        let task = self
            .graph
            .get_mut(task_id)
            .ok_or_else(|| SchedulerError::TaskNotFound(task_id.to_string()))?;
        task.transition(TaskStatus::Pending)?;
        info!(process = %task.process_id, task = %task_id, "task resumed");

        Ok(ProcessStep {
            needs_admission: true,
            ..ProcessStep::default()
        })
    }

    fn requeue_retryable(&mut self) {
        for task in self.graph.tasks_mut() {
            if !task.is_retryable() {
                continue;
            }
            if let Err(err) = task.transition(TaskStatus::Pending) {
                error!(task = %task.task_id, error = %err, "could not re-queue task");
                continue;
            }
            debug!(
                process = %task.process_id,
                task = %task.task_id,
                remaining = task.retry_budget(),
                "re-queued task for retry"
            );
        }
    }

    /// Move an `IN_PROGRESS` task to `FAILED`. With budget left it waits for
    /// the next admission pass; otherwise it is escalated and its pending
    /// dependents fail with it.
    fn fail_task(&mut self, task_id: &str, reason: String, step: &mut ProcessStep) {
        let Some(task) = self.graph.get_mut(task_id) else {
            return;
        };

        if let Err(err) = task.transition(TaskStatus::Failed) {
            error!(task = %task_id, error = %err, "forcing task to FAILED");
            task.force_fail(reason.clone());
        }
        task.record_error(reason.clone());
        step.newly_failed.push(task_id.to_string());

        let remaining = task.retry_budget();
        if remaining > 0 {
            info!(
                process = %task.process_id,
                task = %task_id,
                remaining,
                error = %reason,
                "task failed; will retry"
            );
            step.needs_admission = true;
            return;
        }

        warn!(
            process = %task.process_id,
            task = %task_id,
            error = %reason,
            "{}; escalating",
            SchedulerError::RetryBudgetExhausted(task_id.to_string())
        );
        step.escalations.push(FailureEscalation {
            task_id: task_id.to_string(),
            process_id: task.process_id.clone(),
            error: reason,
        });

        let mut dependents = self.fail_dependents(task_id);
        step.newly_failed.append(&mut dependents);
    }

    /// Force-fail a still-pending `task_id` whose dependency is terminally
    /// `FAILED`, together with its own pending dependents.
    fn fail_if_upstream_failed(&mut self, task_id: &str, step: &mut ProcessStep) {
        let upstream = self
            .graph
            .dependencies_of(task_id)
            .iter()
            .find(|dep| {
                self.graph
                    .get(dep)
                    .is_some_and(|t| t.status() == TaskStatus::Failed && t.is_terminal())
            })
            .cloned();
        let Some(upstream) = upstream else {
            return;
        };
        let Some(task) = self.graph.get_mut(task_id) else {
            return;
        };
        if task.status() != TaskStatus::Pending {
            return;
        }

        task.force_fail(format!("upstream task '{upstream}' failed"));
        debug!(
            task = %task_id,
            upstream = %upstream,
            "new task depends on a failed task; failing it"
        );
        step.newly_failed.push(task_id.to_string());
        let mut dependents = self.fail_dependents(task_id);
        step.newly_failed.append(&mut dependents);
    }

    /// Fail all not-yet-started transitive dependents of `failed_task`.
    fn fail_dependents(&mut self, failed_task: &str) -> Vec<TaskId> {
        let mut stack: Vec<TaskId> = self.graph.dependents_of(failed_task).to_vec();
        let reason = format!("upstream task '{failed_task}' failed");
        let mut newly_failed = Vec::new();

        while let Some(task_id) = stack.pop() {
            let Some(task) = self.graph.get_mut(&task_id) else {
                continue;
            };
            match task.status() {
                TaskStatus::Pending | TaskStatus::Paused => {
                    task.force_fail(reason.clone());
                    debug!(
                        task = %task_id,
                        upstream = %failed_task,
                        "failing dependent of failed task"
                    );
                    stack.extend(self.graph.dependents_of(&task_id).iter().cloned());
                    newly_failed.push(task_id);
                }
                TaskStatus::InProgress | TaskStatus::Completed | TaskStatus::Failed => {}
            }
        }

        newly_failed
    }

    fn check_finished(&mut self, step: &mut ProcessStep) {
        if !self.finished && self.graph.all_terminal() {
            self.finished = true;
            step.process_just_finished = true;
            info!(
                process = %self.process_id(),
                completed = self.graph.count_with_status(TaskStatus::Completed),
                failed = self.graph.count_with_status(TaskStatus::Failed),
                "all tasks terminal; process finished"
            );
        }
    }
}
