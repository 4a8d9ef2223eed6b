//! Relay transport over live TCP connections.
//!
//! Each connection has exactly one writer task fed by a bounded channel.
//! Events and responses share that channel, so a connection sees frames in
//! the order they were queued. A frame whose sender stopped waiting for the
//! acknowledgement is dropped unwritten.

use async_trait::async_trait;
use parking_lot::RwLock;
use relay_core::{Transport, TransportError};
use relay_types::{ConnectionId, OutboundEvent};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::io::{AsyncWrite, AsyncWriteExt};
use tokio::sync::{mpsc, oneshot, Notify};
use tracing::debug;

/// Frames buffered per connection before senders wait.
pub(crate) const WRITER_QUEUE_DEPTH: usize = 256;

/// One serialized line for the writer task, with an optional
/// acknowledgement once it has been written and flushed.
pub(crate) struct OutboundFrame {
    pub line: String,
    pub ack: Option<oneshot::Sender<Result<(), String>>>,
}

pub(crate) type FrameSender = mpsc::Sender<OutboundFrame>;

/// Drain `rx` into `writer` until the channel closes or a write fails.
pub(crate) async fn run_writer<W>(mut writer: W, mut rx: mpsc::Receiver<OutboundFrame>)
where
    W: AsyncWrite + Unpin,
{
    while let Some(frame) = rx.recv().await {
        if frame.ack.as_ref().is_some_and(|ack| ack.is_closed()) {
            debug!("Skipping frame abandoned by its sender");
            continue;
        }

        let result = write_line(&mut writer, &frame.line).await;
        let failed = result.is_err();

        if let Some(ack) = frame.ack {
            let _ = ack.send(result.map_err(|e| e.to_string()));
        }
        if failed {
            debug!("Write failed, stopping connection writer");
            break;
        }
    }

    let _ = writer.shutdown().await;
}

async fn write_line<W>(writer: &mut W, line: &str) -> std::io::Result<()>
where
    W: AsyncWrite + Unpin,
{
    writer.write_all(line.as_bytes()).await?;
    writer.write_all(b"\n").await?;
    writer.flush().await
}

/// Queue a line and wait until the writer has flushed it.
pub(crate) async fn send_line(sender: &FrameSender, line: String) -> Result<(), String> {
    let (ack_tx, ack_rx) = oneshot::channel();
    sender
        .send(OutboundFrame {
            line,
            ack: Some(ack_tx),
        })
        .await
        .map_err(|_| "writer closed".to_string())?;

    ack_rx.await.map_err(|_| "writer closed".to_string())?
}

struct Attached {
    frames: FrameSender,
    hangup: Arc<Notify>,
}

/// Maps live connections to their writer channels.
#[derive(Default)]
pub struct TcpTransport {
    connections: RwLock<HashMap<ConnectionId, Attached>>,
}

impl TcpTransport {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a connection's writer. The returned `Notify` fires when the
    /// relay disconnects it; the connection task must then close the socket
    /// without flushing what is still queued.
    pub(crate) fn attach(&self, connection: ConnectionId, frames: FrameSender) -> Arc<Notify> {
        let hangup = Arc::new(Notify::new());
        self.connections.write().insert(
            connection,
            Attached {
                frames,
                hangup: hangup.clone(),
            },
        );
        hangup
    }

    pub(crate) fn detach(&self, connection: ConnectionId) {
        self.connections.write().remove(&connection);
    }

    /// Number of open connections, identified or not.
    pub fn connection_count(&self) -> usize {
        self.connections.read().len()
    }
}

#[async_trait]
impl Transport for TcpTransport {
    async fn emit(&self, connection: ConnectionId, event: &OutboundEvent) -> Result<(), TransportError> {
        let line = serde_json::to_string(event).map_err(|e| TransportError::Failed(e.to_string()))?;

        let sender = self
            .connections
            .read()
            .get(&connection)
            .map(|attached| attached.frames.clone())
            .ok_or(TransportError::Closed(connection))?;

        send_line(&sender, line).await.map_err(|e| {
            if e == "writer closed" {
                TransportError::Closed(connection)
            } else {
                TransportError::Failed(e)
            }
        })
    }

    async fn disconnect(&self, connection: ConnectionId) {
        if let Some(attached) = self.connections.write().remove(&connection) {
            debug!(connection = %connection, "Hanging up connection");
            attached.hangup.notify_one();
        }
    }
}
