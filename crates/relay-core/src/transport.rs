//! Outbound transport seam.
//!
//! The relay never touches sockets. It hands an event to a `Transport`
//! and treats `Ok(())` as "dispatched".

use async_trait::async_trait;
use parking_lot::Mutex;
use relay_types::{ConnectionId, EventName, MessageEnvelope, OutboundEvent};
use std::collections::HashSet;
use std::time::Duration;
use thiserror::Error;

/// Why an emission did not go out.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TransportError {
    /// The connection is gone.
    #[error("connection {0} is closed")]
    Closed(ConnectionId),

    /// The transport failed to write the event.
    #[error("emit failed: {0}")]
    Failed(String),
}

/// Delivers events to live connections. Fire-once: no retries.
#[async_trait]
pub trait Transport: Send + Sync {
    /// Resolve once the event has been handed to the connection.
    async fn emit(&self, connection: ConnectionId, event: &OutboundEvent) -> Result<(), TransportError>;

    /// Drop `connection`. An emission that was given up on must never reach
    /// the peer afterwards, so anything still queued for it is discarded.
    async fn disconnect(&self, _connection: ConnectionId) {}
}

#[derive(Default)]
struct RecordingState {
    emitted: Vec<(ConnectionId, OutboundEvent)>,
    failing_connections: HashSet<ConnectionId>,
    failing_events: HashSet<EventName>,
    successes_before_failure: Option<usize>,
    delay: Option<Duration>,
    disconnected: Vec<ConnectionId>,
}

/// A transport that records every dispatched event, for testing.
///
/// Failures and delays can be injected per connection, per event name, or
/// after a number of successful emissions.
#[derive(Default)]
pub struct RecordingTransport {
    state: Mutex<RecordingState>,
}

impl RecordingTransport {
    pub fn new() -> Self {
        Self::default()
    }

    /// Everything dispatched so far, in order.
    pub fn emitted(&self) -> Vec<(ConnectionId, OutboundEvent)> {
        self.state.lock().emitted.clone()
    }

    /// Events dispatched to one connection, in order.
    pub fn events_for(&self, connection: ConnectionId) -> Vec<OutboundEvent> {
        self.state
            .lock()
            .emitted
            .iter()
            .filter(|(conn, _)| *conn == connection)
            .map(|(_, event)| event.clone())
            .collect()
    }

    /// Message envelopes (new and old) dispatched to one connection.
    pub fn messages_for(&self, connection: ConnectionId) -> Vec<MessageEnvelope> {
        self.events_for(connection)
            .iter()
            .filter_map(OutboundEvent::envelope)
            .collect()
    }

    pub fn clear(&self) {
        self.state.lock().emitted.clear();
    }

    pub fn fail_connection(&self, connection: ConnectionId) {
        self.state.lock().failing_connections.insert(connection);
    }

    pub fn heal_connection(&self, connection: ConnectionId) {
        self.state.lock().failing_connections.remove(&connection);
    }

    pub fn fail_event(&self, event: EventName) {
        self.state.lock().failing_events.insert(event);
    }

    /// Let the next `successes` emissions through, then fail every one after.
    pub fn fail_after(&self, successes: usize) {
        self.state.lock().successes_before_failure = Some(successes);
    }

    /// Undo every injected failure, including `fail_after`.
    pub fn heal(&self) {
        let mut state = self.state.lock();
        state.failing_connections.clear();
        state.failing_events.clear();
        state.successes_before_failure = None;
    }

    /// Connections the relay asked to drop, in order.
    pub fn disconnected(&self) -> Vec<ConnectionId> {
        self.state.lock().disconnected.clone()
    }

    /// Sleep this long inside every emission.
    pub fn set_delay(&self, delay: Option<Duration>) {
        self.state.lock().delay = delay;
    }
}

#[async_trait]
impl Transport for RecordingTransport {
    async fn emit(&self, connection: ConnectionId, event: &OutboundEvent) -> Result<(), TransportError> {
        let delay = self.state.lock().delay;
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }

        let mut state = self.state.lock();

        if state.failing_connections.contains(&connection) {
            return Err(TransportError::Closed(connection));
        }
        if state.failing_events.contains(&event.event) {
            return Err(TransportError::Failed(format!("{} rejected", event.event)));
        }
        if let Some(remaining) = state.successes_before_failure.as_mut() {
            if *remaining == 0 {
                return Err(TransportError::Failed("injected failure".to_string()));
            }
            *remaining -= 1;
        }

        state.emitted.push((connection, event.clone()));
        Ok(())
    }

    async fn disconnect(&self, connection: ConnectionId) {
        let mut state = self.state.lock();
        state.disconnected.push(connection);
        state.failing_connections.insert(connection);
    }
}
