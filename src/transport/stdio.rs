// src/transport/stdio.rs

//! JSON-lines adapter.
//!
//! Inbound, one object per line tagged by `"type"`:
//!
//! ```text
//! {"type":"submit","process_id":"p1","tasks":[...]}
//! {"type":"report","task_id":"a","status":"COMPLETED","result":{...}}
//! {"type":"cancel","process_id":"p1"}
//! {"type":"pause","process_id":"p1","task_id":"a"}
//! {"type":"resume","process_id":"p1","task_id":"a"}
//! {"type":"shutdown"}
//! ```
//!
//! Outbound lines are tagged `dispatch` (with the routed `address`) or
//! `escalation` (with the failure `topic`).

use std::future::Future;
use std::pin::Pin;

use serde::{Deserialize, Serialize};
use serde_json::Value;
use tokio::io::{AsyncBufReadExt, AsyncRead, AsyncWrite, AsyncWriteExt, BufReader};
use tokio::sync::{Mutex, mpsc};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::engine::RuntimeEvent;
use crate::errors::{Result, SchedulerError};
use crate::transport::Transport;
use crate::transport::wire::{DispatchMessage, FailureEscalation, WorkerReport, parse_submission};
use crate::types::{Address, ProcessId, TaskId};

#[derive(Debug, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum OutboundLine<'a> {
    Dispatch {
        address: &'a Address,
        message: &'a DispatchMessage,
    },
    Escalation {
        topic: &'a str,
        escalation: &'a FailureEscalation,
    },
}

/// JSON lines on the process's stdout.
pub type StdioTransport = JsonLinesTransport<tokio::io::Stdout>;

/// Writes dispatches and escalations as JSON lines to `W`.
#[derive(Debug)]
pub struct JsonLinesTransport<W> {
    writer: Mutex<W>,
    failure_topic: String,
}

impl<W> JsonLinesTransport<W>
where
    W: AsyncWrite + Unpin + Send + 'static,
{
    pub fn new(writer: W, failure_topic: impl Into<String>) -> Self {
        Self {
            writer: Mutex::new(writer),
            failure_topic: failure_topic.into(),
        }
    }

    pub fn into_inner(self) -> W {
        self.writer.into_inner()
    }

    async fn write_line(&self, line: &OutboundLine<'_>) -> Result<()> {
        let mut buf = serde_json::to_vec(line)?;
        buf.push(b'\n');

        let mut writer = self.writer.lock().await;
        writer.write_all(&buf).await?;
        writer.flush().await?;
        Ok(())
    }
}

impl JsonLinesTransport<tokio::io::Stdout> {
    pub fn stdout(failure_topic: impl Into<String>) -> Self {
        Self::new(tokio::io::stdout(), failure_topic)
    }
}

impl<W> Transport for JsonLinesTransport<W>
where
    W: AsyncWrite + Unpin + Send + 'static,
{
    fn dispatch(
        &self,
        address: Address,
        message: DispatchMessage,
    ) -> Pin<Box<dyn Future<Output = Result<()>> + Send + '_>> {
        Box::pin(async move {
            self.write_line(&OutboundLine::Dispatch {
                address: &address,
                message: &message,
            })
            .await
        })
    }

    fn escalate(
        &self,
        escalation: FailureEscalation,
    ) -> Pin<Box<dyn Future<Output = Result<()>> + Send + '_>> {
        Box::pin(async move {
            self.write_line(&OutboundLine::Escalation {
                topic: &self.failure_topic,
                escalation: &escalation,
            })
            .await
        })
    }
}

#[derive(Debug, Deserialize)]
struct ProcessRef {
    process_id: ProcessId,
}

#[derive(Debug, Deserialize)]
struct TaskRef {
    process_id: ProcessId,
    task_id: TaskId,
}

/// Parse one inbound line into a runtime event.
pub fn parse_inbound_line(line: &str) -> Result<RuntimeEvent> {
    let value: Value = serde_json::from_str(line)?;
    let kind = value
        .get("type")
        .and_then(Value::as_str)
        .ok_or_else(|| {
            SchedulerError::ValidationError("inbound message has no `type` field".to_string())
        })?
        .to_string();

    let event = match kind.as_str() {
        "submit" => RuntimeEvent::Submit(parse_submission(value)?),
        "report" => RuntimeEvent::Report(serde_json::from_value::<WorkerReport>(value)?),
        "cancel" => {
            let r: ProcessRef = serde_json::from_value(value)?;
            RuntimeEvent::CancelProcess {
                process_id: r.process_id,
            }
        }
        "pause" => {
            let r: TaskRef = serde_json::from_value(value)?;
            RuntimeEvent::PauseTask {
                process_id: r.process_id,
                task_id: r.task_id,
            }
        }
        "resume" => {
            let r: TaskRef = serde_json::from_value(value)?;
            RuntimeEvent::ResumeTask {
                process_id: r.process_id,
                task_id: r.task_id,
            }
        }
        "shutdown" => RuntimeEvent::ShutdownRequested,
        other => {
            return Err(SchedulerError::ValidationError(format!(
                "unknown inbound message type '{other}'"
            )));
        }
    };
    Ok(event)
}

/// Spawn a task that reads JSON lines from `reader` and forwards them as
/// runtime events. Malformed or non-UTF-8 lines are logged and skipped; only
/// end of stream or a read error stops the reader.
pub fn spawn_line_reader<R>(reader: R, tx: mpsc::Sender<RuntimeEvent>) -> JoinHandle<()>
where
    R: AsyncRead + Unpin + Send + 'static,
{
    tokio::spawn(async move {
        let mut reader = BufReader::new(reader);
        let mut buf = Vec::new();

        loop {
            buf.clear();
            match reader.read_until(b'\n', &mut buf).await {
                Ok(0) => {
                    info!("inbound stream closed");
                    break;
                }
                Ok(_) => {
                    let line = match std::str::from_utf8(&buf) {
                        Ok(line) => line.trim(),
                        Err(err) => {
                            warn!(error = %err, "ignoring inbound line that is not valid UTF-8");
                            continue;
                        }
                    };
                    if line.is_empty() {
                        continue;
                    }
                    match parse_inbound_line(line) {
                        Ok(event) => {
                            if tx.send(event).await.is_err() {
                                debug!("runtime event channel closed; stopping line reader");
                                break;
                            }
                        }
                        Err(err) => warn!(error = %err, "ignoring malformed inbound line"),
                    }
                }
                Err(err) => {
                    warn!(error = %err, "failed to read inbound line");
                    break;
                }
            }
        }
    })
}

/// [`spawn_line_reader`] over the process's stdin.
pub fn spawn_stdin_reader(tx: mpsc::Sender<RuntimeEvent>) -> JoinHandle<()> {
    spawn_line_reader(tokio::io::stdin(), tx)
}
