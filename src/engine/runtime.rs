// src/engine/runtime.rs

use std::fmt;

use tokio::sync::mpsc;
use tokio::time::MissedTickBehavior;
use tracing::{debug, error, info, warn};

use crate::errors::Result;

use super::scheduler::Scheduler;
use super::{RuntimeEvent, RuntimeOptions};

/// Drives the [`Scheduler`] in response to `RuntimeEvent`s and ticks the
/// timeout sweep.
///
/// Per-event errors (a rejected submission, a pause for an unknown task)
/// are logged and never stop the loop.
pub struct Runtime {
    scheduler: Scheduler,
    event_rx: mpsc::Receiver<RuntimeEvent>,
    options: RuntimeOptions,
}

impl fmt::Debug for Runtime {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Runtime")
            .field("scheduler", &self.scheduler)
            .field("options", &self.options)
            .finish_non_exhaustive()
    }
}

impl Runtime {
    pub fn new(
        scheduler: Scheduler,
        event_rx: mpsc::Receiver<RuntimeEvent>,
        options: RuntimeOptions,
    ) -> Self {
        Self {
            scheduler,
            event_rx,
            options,
        }
    }

    pub fn scheduler(&self) -> &Scheduler {
        &self.scheduler
    }

    /// Main event loop.
    ///
    /// Stops when the event channel closes, on `ShutdownRequested`, or (with
    /// `exit_when_idle`) once every process is finished.
    pub async fn run(mut self) -> Result<()> {
        info!("agentflow runtime started");

        let mut sweep = tokio::time::interval(self.options.sweep_interval);
        sweep.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                maybe_event = self.event_rx.recv() => {
                    let Some(event) = maybe_event else {
                        info!("runtime event channel closed; exiting");
                        break;
                    };
                    debug!(?event, "runtime received event");
                    if !self.handle_event(event).await {
                        break;
                    }
                }
                _ = sweep.tick() => {
                    self.scheduler.sweep_timeouts().await;
                }
            }

            if self.options.exit_when_idle && self.scheduler.all_finished().await {
                info!("all processes finished; stopping runtime");
                break;
            }
        }

        info!("runtime exiting");
        Ok(())
    }

    /// Returns `false` when the loop should stop.
    async fn handle_event(&mut self, event: RuntimeEvent) -> bool {
        match event {
            RuntimeEvent::Submit(submission) => {
                let process_id = submission.process_id.clone();
                match self.scheduler.submit(submission).await {
                    Ok(()) => {}
                    Err(err) if err.is_structural() => {
                        warn!(process = %process_id, error = %err, "submission rejected");
                    }
                    Err(err) => {
                        error!(process = %process_id, error = %err, "submission failed");
                    }
                }
            }
            RuntimeEvent::Report(report) => {
                let task_id = report.task_id.clone();
                let disposition = self.scheduler.on_worker_report(report).await;
                debug!(task = %task_id, ?disposition, "report handled");
            }
            RuntimeEvent::CancelProcess { process_id } => {
                if let Err(err) = self.scheduler.cancel_process(&process_id).await {
                    warn!(process = %process_id, error = %err, "cancel failed");
                }
            }
            RuntimeEvent::PauseTask {
                process_id,
                task_id,
            } => {
                if let Err(err) = self.scheduler.pause_task(&process_id, &task_id).await {
                    warn!(process = %process_id, task = %task_id, error = %err, "pause failed");
                }
            }
            RuntimeEvent::ResumeTask {
                process_id,
                task_id,
            } => {
                if let Err(err) = self.scheduler.resume_task(&process_id, &task_id).await {
                    warn!(process = %process_id, task = %task_id, error = %err, "resume failed");
                }
            }
            RuntimeEvent::ShutdownRequested => {
                info!("shutdown requested");
                return false;
            }
        }
        true
    }
}
