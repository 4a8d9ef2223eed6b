//! Pending messages and the envelope robots receive.

use crate::{Origin, RecipientId};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;

/// Identifies one stored message: `(recipient, sequence)`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct MessageId {
    pub recipient: RecipientId,
    pub sequence: i64,
}

impl fmt::Display for MessageId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}#{}", self.recipient, self.sequence)
    }
}

/// A message held in the outbox until its recipient reconnects.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PendingMessage {
    pub recipient: RecipientId,
    /// Strictly increasing per recipient, never reused.
    pub sequence: i64,
    pub origin: Origin,
    pub payload: Value,
    pub created_at: DateTime<Utc>,
}

impl PendingMessage {
    pub fn id(&self) -> MessageId {
        MessageId {
            recipient: self.recipient.clone(),
            sequence: self.sequence,
        }
    }

    /// Envelope for redelivery, carrying the stored sequence and original timestamp.
    pub fn envelope(&self) -> MessageEnvelope {
        MessageEnvelope {
            from: self.origin.clone(),
            body: self.payload.clone(),
            sequence: Some(self.sequence),
            sent_at: self.created_at,
        }
    }
}

/// What a robot receives as the data of `newMessage` and `oldMessage` events.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MessageEnvelope {
    pub from: Origin,
    pub body: Value,
    /// Outbox sequence; absent for messages delivered live.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sequence: Option<i64>,
    pub sent_at: DateTime<Utc>,
}

impl MessageEnvelope {
    pub fn live(from: Origin, body: Value) -> Self {
        Self {
            from,
            body,
            sequence: None,
            sent_at: Utc::now(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn pending_envelope_carries_sequence() {
        let pending = PendingMessage {
            recipient: RecipientId::parse("rex").unwrap(),
            sequence: 7,
            origin: Origin::new("alice"),
            payload: json!("hi"),
            created_at: Utc::now(),
        };

        let envelope = pending.envelope();
        assert_eq!(envelope.sequence, Some(7));
        assert_eq!(envelope.from.as_str(), "alice");
        assert_eq!(pending.id().to_string(), "rex#7");
    }

    #[test]
    fn live_envelope_omits_sequence() {
        let envelope = MessageEnvelope::live(Origin::new("alice"), json!({"text": "hi"}));
        let value = serde_json::to_value(&envelope).unwrap();
        assert!(value.get("sequence").is_none());
        assert_eq!(value["from"], "alice");
        assert_eq!(value["body"]["text"], "hi");
    }
}
