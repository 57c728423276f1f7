use std::future::Future;
use std::pin::Pin;
use std::sync::Mutex;

use serde_json::json;
use tokio::sync::mpsc;

use agentflow::engine::RuntimeEvent;
use agentflow::errors::Result;
use agentflow::transport::{DispatchMessage, FailureEscalation, Transport, WorkerReport};
use agentflow::types::Address;

/// A fake transport that:
/// - records every dispatch and escalation
/// - optionally reports `COMPLETED` straight back to the runtime for every
///   dispatched task, acting as an always-successful agent pool.
#[derive(Default)]
pub struct RecordingTransport {
    dispatched: Mutex<Vec<(Address, DispatchMessage)>>,
    escalated: Mutex<Vec<FailureEscalation>>,
    auto_complete: Option<mpsc::Sender<RuntimeEvent>>,
}

impl RecordingTransport {
    pub fn new() -> Self {
        Self::default()
    }

    /// Every dispatch is answered with a `COMPLETED` report whose result is
    /// `{"done": <task_id>}`.
    pub fn auto_completing(runtime_tx: mpsc::Sender<RuntimeEvent>) -> Self {
        Self {
            auto_complete: Some(runtime_tx),
            ..Self::default()
        }
    }

    pub fn dispatched(&self) -> Vec<(Address, DispatchMessage)> {
        self.dispatched.lock().unwrap().clone()
    }

    pub fn dispatched_task_ids(&self) -> Vec<String> {
        self.dispatched
            .lock()
            .unwrap()
            .iter()
            .map(|(_, m)| m.task.task_id.clone())
            .collect()
    }

    pub fn escalations(&self) -> Vec<FailureEscalation> {
        self.escalated.lock().unwrap().clone()
    }
}

impl Transport for RecordingTransport {
    fn dispatch(
        &self,
        address: Address,
        message: DispatchMessage,
    ) -> Pin<Box<dyn Future<Output = Result<()>> + Send + '_>> {
        Box::pin(async move {
            let report = WorkerReport::completed(
                message.task.task_id.clone(),
                json!({ "done": message.task.task_id }),
            )
            .in_process(message.process_id.clone())
            .for_attempt(message.dispatch_attempt);

            self.dispatched.lock().unwrap().push((address, message));

            if let Some(tx) = &self.auto_complete {
                tx.send(RuntimeEvent::Report(report))
                    .await
                    .map_err(anyhow::Error::from)?;
            }
            Ok(())
        })
    }

    fn escalate(
        &self,
        escalation: FailureEscalation,
    ) -> Pin<Box<dyn Future<Output = Result<()>> + Send + '_>> {
        Box::pin(async move {
            self.escalated.lock().unwrap().push(escalation);
            Ok(())
        })
    }
}
