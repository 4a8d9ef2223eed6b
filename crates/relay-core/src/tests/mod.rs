//! Behavioral tests for the relay.
//!
//! Organized by rule:
//!
//! - `registry.rs`    - Presence: register, unregister, replacement, reverse index
//! - `gate.rs`        - Shared-secret gate on identification
//! - `routing.rs`     - Live vs queued routing, fallback, persistence failure
//! - `drain.rs`       - Drain order, interruption, at-least-once, duplication window
//! - `concurrency.rs` - Per-identity serialization and routing atomicity
//! - `scenarios.rs`   - End-to-end robot stories

mod concurrency;
mod drain;

use crate::{AccessGate, RecordingTransport, Relay, RelaySettings};
use async_trait::async_trait;
use relay_outbox::{OutboxError, OutboxResult, OutboxStore, SqliteOutbox};
use relay_types::{MessageId, Origin, PendingMessage, RecipientId};
use serde_json::Value;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

pub(crate) const SECRET: &str = "test-secret";

/// In-memory SQLite outbox with switchable failures.
pub(crate) struct FlakyOutbox {
    inner: SqliteOutbox,
    fail_append: AtomicBool,
    fail_fetch: AtomicBool,
    fail_remove: AtomicBool,
    removes: AtomicUsize,
}

impl FlakyOutbox {
    pub(crate) async fn new() -> Self {
        Self::wrap(SqliteOutbox::open_in_memory().await.unwrap())
    }

    pub(crate) fn wrap(inner: SqliteOutbox) -> Self {
        Self {
            inner,
            fail_append: AtomicBool::new(false),
            fail_fetch: AtomicBool::new(false),
            fail_remove: AtomicBool::new(false),
            removes: AtomicUsize::new(0),
        }
    }

    pub(crate) fn set_fail_append(&self, fail: bool) {
        self.fail_append.store(fail, Ordering::SeqCst);
    }

    pub(crate) fn set_fail_fetch(&self, fail: bool) {
        self.fail_fetch.store(fail, Ordering::SeqCst);
    }

    pub(crate) fn set_fail_remove(&self, fail: bool) {
        self.fail_remove.store(fail, Ordering::SeqCst);
    }

    /// Successful removes so far.
    pub(crate) fn removes(&self) -> usize {
        self.removes.load(Ordering::SeqCst)
    }

    fn injected(op: &str) -> OutboxError {
        OutboxError::InvalidData(format!("injected {} failure", op))
    }
}

#[async_trait]
impl OutboxStore for FlakyOutbox {
    async fn append(
        &self,
        recipient: &RecipientId,
        origin: &Origin,
        payload: &Value,
    ) -> OutboxResult<PendingMessage> {
        if self.fail_append.load(Ordering::SeqCst) {
            return Err(Self::injected("append"));
        }
        self.inner.append(recipient, origin, payload).await
    }

    async fn fetch_pending(
        &self,
        recipient: &RecipientId,
        after: Option<i64>,
        limit: usize,
    ) -> OutboxResult<Vec<PendingMessage>> {
        if self.fail_fetch.load(Ordering::SeqCst) {
            return Err(Self::injected("fetch"));
        }
        self.inner.fetch_pending(recipient, after, limit).await
    }

    async fn remove(&self, id: &MessageId) -> OutboxResult<bool> {
        if self.fail_remove.load(Ordering::SeqCst) {
            return Err(Self::injected("remove"));
        }
        let removed = self.inner.remove(id).await?;
        if removed {
            self.removes.fetch_add(1, Ordering::SeqCst);
        }
        Ok(removed)
    }

    async fn depth(&self, recipient: &RecipientId) -> OutboxResult<u64> {
        self.inner.depth(recipient).await
    }
}

/// A relay wired to a recording transport and a flaky in-memory outbox.
pub(crate) struct Harness {
    pub relay: Arc<Relay>,
    pub transport: Arc<RecordingTransport>,
    pub outbox: Arc<FlakyOutbox>,
}

impl Harness {
    pub(crate) async fn new() -> Self {
        Self::with_settings(RelaySettings {
            emit_timeout: Duration::from_millis(200),
            drain_page_size: 3,
        })
        .await
    }

    pub(crate) async fn with_settings(settings: RelaySettings) -> Self {
        Self::with_outbox(FlakyOutbox::new().await, settings)
    }

    pub(crate) fn with_outbox(outbox: FlakyOutbox, settings: RelaySettings) -> Self {
        let transport = Arc::new(RecordingTransport::new());
        let outbox = Arc::new(outbox);
        let relay = Arc::new(Relay::with_settings(
            outbox.clone(),
            transport.clone(),
            AccessGate::new(Some(SECRET)),
            settings,
        ));
        Self {
            relay,
            transport,
            outbox,
        }
    }

    pub(crate) async fn depth(&self, name: &str) -> u64 {
        self.outbox.depth(&id(name)).await.unwrap()
    }
}

pub(crate) fn id(name: &str) -> RecipientId {
    RecipientId::parse(name).unwrap()
}

pub(crate) fn from(name: &str) -> Origin {
    Origin::new(name)
}

/// Bodies of the message envelopes a connection received, in order.
pub(crate) fn bodies(transport: &RecordingTransport, connection: relay_types::ConnectionId) -> Vec<Value> {
    transport
        .messages_for(connection)
        .into_iter()
        .map(|envelope| envelope.body)
        .collect()
}
