// src/transport/channel.rs

use std::collections::HashMap;
use std::future::Future;
use std::pin::Pin;
use std::sync::{Mutex, PoisonError};

use tokio::sync::mpsc;
use tracing::debug;

use crate::errors::{Result, SchedulerError};
use crate::transport::Transport;
use crate::transport::wire::{DispatchMessage, FailureEscalation};
use crate::types::Address;

/// In-memory broker: one unbounded queue per registered address plus one
/// for escalations.
///
/// Dispatching to an address nobody registered is a transport error, the
/// same as publishing to a queue with no consumer.
#[derive(Debug)]
pub struct ChannelTransport {
    queues: Mutex<HashMap<Address, mpsc::UnboundedSender<DispatchMessage>>>,
    escalations: mpsc::UnboundedSender<FailureEscalation>,
}

impl ChannelTransport {
    /// Returns the transport and the receiving end of the failure topic.
    pub fn new() -> (Self, mpsc::UnboundedReceiver<FailureEscalation>) {
        let (escalations, escalation_rx) = mpsc::unbounded_channel();
        let transport = Self {
            queues: Mutex::new(HashMap::new()),
            escalations,
        };
        (transport, escalation_rx)
    }

    /// Attach a consumer to `address`. A second registration replaces the
    /// first consumer.
    pub fn register_queue(
        &self,
        address: impl Into<Address>,
    ) -> mpsc::UnboundedReceiver<DispatchMessage> {
        let (tx, rx) = mpsc::unbounded_channel();
        self.queues
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(address.into(), tx);
        rx
    }

    fn sender_for(&self, address: &Address) -> Option<mpsc::UnboundedSender<DispatchMessage>> {
        self.queues
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .get(address)
            .cloned()
    }
}

impl Transport for ChannelTransport {
    fn dispatch(
        &self,
        address: Address,
        message: DispatchMessage,
    ) -> Pin<Box<dyn Future<Output = Result<()>> + Send + '_>> {
        Box::pin(async move {
            let tx = self.sender_for(&address).ok_or_else(|| {
                SchedulerError::TransportError(format!("no consumer for queue '{address}'"))
            })?;
            debug!(%address, task = %message.task.task_id, "enqueue dispatch");
            tx.send(message).map_err(|_| {
                SchedulerError::TransportError(format!("queue '{address}' is closed"))
            })
        })
    }

    fn escalate(
        &self,
        escalation: FailureEscalation,
    ) -> Pin<Box<dyn Future<Output = Result<()>> + Send + '_>> {
        Box::pin(async move {
            self.escalations.send(escalation).map_err(|_| {
                SchedulerError::TransportError("failure topic is closed".to_string())
            })
        })
    }
}
