//! The delivery reconciler.
//!
//! Online recipients get messages live. Offline recipients get them on the
//! next registration, drained from the outbox in sequence order. Every
//! operation on one identity runs under that identity's lock.

use crate::{
    AccessGate, ConnectionRegistry, IdentityLocks, RelayError, RelayResult, Transport,
    TransportError,
};
use relay_outbox::{OutboxDrain, OutboxStore, DRAIN_PAGE_SIZE};
use relay_types::{
    ConnectionId, InboundSms, MessageEnvelope, Origin, OutboundEvent, RecipientId,
};
use parking_lot::Mutex;
use serde_json::Value;
use std::collections::HashSet;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, error, info, warn};

/// Default bound on a single emission.
pub const DEFAULT_EMIT_TIMEOUT: Duration = Duration::from_secs(5);

/// Tunables for the reconciler.
#[derive(Debug, Clone)]
pub struct RelaySettings {
    /// An emission still pending after this long counts as failed.
    pub emit_timeout: Duration,
    /// Outbox page size while draining.
    pub drain_page_size: usize,
}

impl Default for RelaySettings {
    fn default() -> Self {
        Self {
            emit_timeout: DEFAULT_EMIT_TIMEOUT,
            drain_page_size: DRAIN_PAGE_SIZE,
        }
    }
}

/// Result of routing one message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SendOutcome {
    /// Emitted to the recipient's live connection. Nothing was stored.
    DeliveredLive,
    /// Stored in the outbox for the next registration.
    Queued { sequence: i64 },
    /// The recipient was unreachable and the outbox rejected the write.
    PersistenceFailed { reason: String },
}

impl SendOutcome {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::DeliveredLive => "delivered-live",
            Self::Queued { .. } => "queued",
            Self::PersistenceFailed { .. } => "persistence-failed",
        }
    }

    /// Reply text for the person who sent an SMS.
    pub fn sms_reply_text(&self) -> &'static str {
        match self {
            Self::DeliveredLive => "Got it!",
            _ => "Sorry, nobody is home, try again later.",
        }
    }
}

/// Why a drain stopped before the backlog was empty.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InterruptReason {
    /// The transport refused the event; the message stays queued.
    EmitFailed(TransportError),
    /// The emission did not complete in time; the message stays queued.
    EmitTimedOut,
    /// The outbox could not be read.
    StoreUnavailable(String),
    /// The message went out but could not be deleted; it will be sent again.
    RemoveFailed { sequence: i64, error: String },
}

impl fmt::Display for InterruptReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::EmitFailed(e) => write!(f, "emit failed: {}", e),
            Self::EmitTimedOut => f.write_str("emit timed out"),
            Self::StoreUnavailable(e) => write!(f, "outbox unavailable: {}", e),
            Self::RemoveFailed { sequence, error } => {
                write!(f, "remove of #{} failed: {}", sequence, error)
            }
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DrainOutcome {
    Complete,
    Interrupted(InterruptReason),
}

/// What one drain-and-deliver pass did.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DrainReport {
    /// Messages emitted to the connection during this pass.
    pub delivered: usize,
    pub outcome: DrainOutcome,
}

impl DrainReport {
    pub fn is_complete(&self) -> bool {
        self.outcome == DrainOutcome::Complete
    }
}

enum EmitFailure {
    Transport(TransportError),
    TimedOut,
}

impl From<EmitFailure> for InterruptReason {
    fn from(failure: EmitFailure) -> Self {
        match failure {
            EmitFailure::Transport(e) => Self::EmitFailed(e),
            EmitFailure::TimedOut => Self::EmitTimedOut,
        }
    }
}

impl fmt::Display for EmitFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Transport(e) => write!(f, "{}", e),
            Self::TimedOut => f.write_str("timed out"),
        }
    }
}

/// Presence-tracked store-and-forward relay.
pub struct Relay {
    registry: ConnectionRegistry,
    gate: AccessGate,
    outbox: Arc<dyn OutboxStore>,
    transport: Arc<dyn Transport>,
    locks: IdentityLocks,
    /// Online recipients whose last drain stopped short. New messages for
    /// them queue behind the backlog instead of overtaking it live.
    behind: Mutex<HashSet<RecipientId>>,
    settings: RelaySettings,
}

impl Relay {
    pub fn new(outbox: Arc<dyn OutboxStore>, transport: Arc<dyn Transport>, gate: AccessGate) -> Self {
        Self::with_settings(outbox, transport, gate, RelaySettings::default())
    }

    pub fn with_settings(
        outbox: Arc<dyn OutboxStore>,
        transport: Arc<dyn Transport>,
        gate: AccessGate,
        settings: RelaySettings,
    ) -> Self {
        Self {
            registry: ConnectionRegistry::new(),
            gate,
            outbox,
            transport,
            locks: IdentityLocks::new(),
            behind: Mutex::new(HashSet::new()),
            settings,
        }
    }

    pub fn registry(&self) -> &ConnectionRegistry {
        &self.registry
    }

    pub fn settings(&self) -> &RelaySettings {
        &self.settings
    }

    /// Check a supplied secret against the gate.
    pub fn authorize(&self, supplied: Option<&str>) -> bool {
        self.gate.authorize(supplied)
    }

    /// Number of identities currently holding or awaiting their lock.
    pub fn active_identity_locks(&self) -> usize {
        self.locks.len()
    }

    // ==========================================
    // Connection lifecycle
    // ==========================================

    /// Gate, then register. A rejected connection is never recorded.
    pub async fn on_connection_identified(
        &self,
        connection: ConnectionId,
        recipient: RecipientId,
        supplied_secret: Option<&str>,
    ) -> RelayResult<DrainReport> {
        if !self.gate.authorize(supplied_secret) {
            warn!(connection = %connection, recipient = %recipient, "Registration rejected: bad secret");
            return Err(RelayError::Unauthorized);
        }
        Ok(self.register(recipient, connection).await)
    }

    pub async fn on_connection_closed(&self, connection: ConnectionId) -> Option<RecipientId> {
        self.unregister(connection).await
    }

    /// Record `recipient` as online on `connection`, greet it, then drain
    /// its backlog. Returns once the drain has finished or stopped.
    pub async fn register(&self, recipient: RecipientId, connection: ConnectionId) -> DrainReport {
        let _guard = self.locks.lock(&recipient).await;

        match self.registry.insert(recipient.clone(), connection) {
            Some(replaced) => info!(
                recipient = %recipient,
                connection = %connection,
                replaced = %replaced,
                "Robot re-registered, previous connection replaced"
            ),
            None => info!(recipient = %recipient, connection = %connection, "Robot registered"),
        }

        if let Err(e) = self.emit(connection, &OutboundEvent::welcome(&recipient)).await {
            warn!(recipient = %recipient, connection = %connection, error = %e, "Welcome not delivered");
        }

        let report = self.drain_locked(&recipient, connection).await;
        self.set_behind(&recipient, !report.is_complete());
        match &report.outcome {
            DrainOutcome::Complete => {
                info!(recipient = %recipient, delivered = report.delivered, "Outbox drained")
            }
            DrainOutcome::Interrupted(reason) => warn!(
                recipient = %recipient,
                delivered = report.delivered,
                reason = %reason,
                "Outbox drain interrupted"
            ),
        }
        report
    }

    /// Forget whatever identity `connection` holds. Unknown connections are a no-op.
    pub async fn unregister(&self, connection: ConnectionId) -> Option<RecipientId> {
        loop {
            let Some(recipient) = self.registry.recipient_of(connection) else {
                debug!(connection = %connection, "Unregister of unknown connection");
                return None;
            };

            let _guard = self.locks.lock(&recipient).await;

            // The connection may have re-identified while we waited.
            if self.registry.recipient_of(connection).as_ref() != Some(&recipient) {
                continue;
            }

            if self.registry.remove_if_current(&recipient, connection) {
                self.set_behind(&recipient, false);
                info!(recipient = %recipient, connection = %connection, "Robot unregistered");
                return Some(recipient);
            }
            return None;
        }
    }

    async fn drain_locked(&self, recipient: &RecipientId, connection: ConnectionId) -> DrainReport {
        let mut drain = OutboxDrain::with_page_size(
            self.outbox.as_ref(),
            recipient.clone(),
            self.settings.drain_page_size,
        );
        let mut delivered = 0;

        loop {
            let message = match drain.next().await {
                Ok(Some(message)) => message,
                Ok(None) => {
                    return DrainReport {
                        delivered,
                        outcome: DrainOutcome::Complete,
                    }
                }
                Err(e) => {
                    return DrainReport {
                        delivered,
                        outcome: DrainOutcome::Interrupted(InterruptReason::StoreUnavailable(
                            e.to_string(),
                        )),
                    }
                }
            };

            let event = OutboundEvent::old_message(&message.envelope());
            if let Err(failure) = self.emit(connection, &event).await {
                return DrainReport {
                    delivered,
                    outcome: DrainOutcome::Interrupted(failure.into()),
                };
            }
            delivered += 1;

            if let Err(e) = self.outbox.remove(&message.id()).await {
                error!(
                    recipient = %recipient,
                    sequence = message.sequence,
                    error = %e,
                    "Delivered message could not be removed; it will be redelivered"
                );
                return DrainReport {
                    delivered,
                    outcome: DrainOutcome::Interrupted(InterruptReason::RemoveFailed {
                        sequence: message.sequence,
                        error: e.to_string(),
                    }),
                };
            }
            debug!(recipient = %recipient, sequence = message.sequence, "Queued message delivered");
        }
    }

    // ==========================================
    // Routing
    // ==========================================

    /// Deliver live when the recipient is online, otherwise queue. Never both.
    ///
    /// A failed live emission falls back to the outbox. While an online
    /// recipient still has undelivered backlog, new messages queue behind it;
    /// they only go live ahead of it if the outbox refuses them.
    pub async fn send_message(
        &self,
        recipient: &RecipientId,
        payload: Value,
        origin: Origin,
    ) -> SendOutcome {
        let _guard = self.locks.lock(recipient).await;

        let connection = self.registry.lookup(recipient);
        let behind = self.is_behind(recipient);
        let event = OutboundEvent::new_message(&MessageEnvelope::live(origin.clone(), payload.clone()));

        if let Some(connection) = connection.filter(|_| !behind) {
            match self.emit(connection, &event).await {
                Ok(()) => {
                    debug!(recipient = %recipient, origin = %origin, "Message delivered live");
                    return SendOutcome::DeliveredLive;
                }
                Err(e) => {
                    warn!(
                        recipient = %recipient,
                        connection = %connection,
                        error = %e,
                        "Live delivery failed, queueing instead"
                    );
                    self.set_behind(recipient, true);
                }
            }
        }

        match self.outbox.append(recipient, &origin, &payload).await {
            Ok(message) => {
                info!(recipient = %recipient, origin = %origin, sequence = message.sequence, "Message queued");
                SendOutcome::Queued {
                    sequence: message.sequence,
                }
            }
            Err(e) => {
                if let Some(connection) = connection.filter(|_| behind) {
                    warn!(recipient = %recipient, error = %e, "Outbox refused message, delivering live ahead of backlog");
                    if self.emit(connection, &event).await.is_ok() {
                        return SendOutcome::DeliveredLive;
                    }
                }
                error!(recipient = %recipient, origin = %origin, error = %e, "Message could not be queued");
                SendOutcome::PersistenceFailed {
                    reason: e.to_string(),
                }
            }
        }
    }

    /// Relay an inbound SMS with origin `sms:<from>`.
    pub async fn send_sms(&self, recipient: &RecipientId, sms: &InboundSms) -> SendOutcome {
        self.send_message(recipient, sms.payload(), sms.origin()).await
    }

    // ==========================================
    // Inspection
    // ==========================================

    pub fn is_online(&self, recipient: &RecipientId) -> bool {
        self.registry.is_online(recipient)
    }

    pub fn lookup(&self, recipient: &RecipientId) -> Option<ConnectionId> {
        self.registry.lookup(recipient)
    }

    pub async fn outbox_depth(&self, recipient: &RecipientId) -> RelayResult<u64> {
        Ok(self.outbox.depth(recipient).await?)
    }

    /// Whether `recipient` is online with backlog its last drain left behind.
    pub fn is_behind(&self, recipient: &RecipientId) -> bool {
        self.behind.lock().contains(recipient)
    }

    fn set_behind(&self, recipient: &RecipientId, behind: bool) {
        let mut set = self.behind.lock();
        if behind {
            set.insert(recipient.clone());
        } else {
            set.remove(recipient);
        }
    }

    /// Whether the outbox answers right now.
    pub async fn store_healthy(&self) -> bool {
        match self.outbox.ping().await {
            Ok(()) => true,
            Err(e) => {
                warn!(error = %e, "Outbox health probe failed");
                false
            }
        }
    }

    async fn emit(&self, connection: ConnectionId, event: &OutboundEvent) -> Result<(), EmitFailure> {
        match tokio::time::timeout(self.settings.emit_timeout, self.transport.emit(connection, event)).await {
            Ok(Ok(())) => Ok(()),
            Ok(Err(e)) => Err(EmitFailure::Transport(e)),
            Err(_) => {
                // The event may still be queued on the connection; drop the
                // connection so it can never arrive after being given up on.
                warn!(connection = %connection, event = %event.event, "Emit timed out, disconnecting");
                self.transport.disconnect(connection).await;
                Err(EmitFailure::TimedOut)
            }
        }
    }
}
