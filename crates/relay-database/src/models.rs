//! Outbox row types.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A persisted, not yet delivered message.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OutboxMessage {
    pub recipient: String,
    pub sequence: i64,
    pub origin: String,
    /// JSON-encoded payload, stored as text.
    pub payload: String,
    pub created_at: DateTime<Utc>,
}

/// Input for appending a message; the sequence is assigned on insert.
#[derive(Debug, Clone)]
pub struct NewOutboxMessage {
    pub recipient: String,
    pub origin: String,
    pub payload: String,
    pub created_at: DateTime<Utc>,
}
