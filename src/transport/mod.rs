// src/transport/mod.rs

//! Interface boundary towards the message broker.
//!
//! The scheduler never talks to a broker directly: it pushes [`Outbound`]
//! messages onto an unbounded queue, and a background pump (see
//! [`spawn_outbound_pump`]) hands them to a [`Transport`].
//!
//! - [`ChannelTransport`] is an in-memory broker of named queues, for
//!   embedding and tests.
//! - [`JsonLinesTransport`] writes one JSON object per line
//!   ([`StdioTransport`] in the binary); [`spawn_line_reader`] reads the
//!   inbound side.

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::dag::Dispatch;
use crate::errors::Result;
use crate::types::Address;

pub mod channel;
pub mod stdio;
pub mod wire;

pub use channel::ChannelTransport;
pub use stdio::{
    JsonLinesTransport, StdioTransport, parse_inbound_line, spawn_line_reader, spawn_stdin_reader,
};
pub use wire::{DispatchMessage, FailureEscalation, TaskPayload, WorkerReport};

/// Message waiting to leave the scheduler.
#[derive(Debug, Clone, PartialEq)]
pub enum Outbound {
    Dispatch(Dispatch),
    Escalation(FailureEscalation),
}

/// How dispatches and escalations reach the outside world.
///
/// Production code uses [`JsonLinesTransport`]; tests typically use
/// [`ChannelTransport`] or a recording implementation.
pub trait Transport: Send + Sync + 'static {
    /// Deliver a task to the worker queue at `address`.
    fn dispatch(
        &self,
        address: Address,
        message: DispatchMessage,
    ) -> Pin<Box<dyn Future<Output = Result<()>> + Send + '_>>;

    /// Publish a terminal failure to the failure topic.
    fn escalate(
        &self,
        escalation: FailureEscalation,
    ) -> Pin<Box<dyn Future<Output = Result<()>> + Send + '_>>;
}

/// Spawn the background loop that drains the outbound queue.
///
/// Delivery is fire-and-forget: a transport error is logged and the message
/// dropped. Redelivery happens through the timeout sweep.
pub fn spawn_outbound_pump<T: Transport>(
    transport: Arc<T>,
) -> (mpsc::UnboundedSender<Outbound>, JoinHandle<()>) {
    let (tx, mut rx) = mpsc::unbounded_channel::<Outbound>();

    let handle = tokio::spawn(async move {
        info!("outbound pump started");

        while let Some(message) = rx.recv().await {
            match message {
                Outbound::Dispatch(Dispatch { address, message }) => {
                    let key = message.idempotency_key.clone();
                    match transport.dispatch(address.clone(), message).await {
                        Ok(()) => debug!(%address, key = %key, "dispatch delivered"),
                        Err(err) => {
                            warn!(%address, key = %key, error = %err, "dispatch failed")
                        }
                    }
                }
                Outbound::Escalation(escalation) => {
                    let task_id = escalation.task_id.clone();
                    if let Err(err) = transport.escalate(escalation).await {
                        warn!(task = %task_id, error = %err, "escalation failed");
                    }
                }
            }
        }

        info!("outbound pump finished (channel closed)");
    });

    (tx, handle)
}
