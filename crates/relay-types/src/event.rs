//! Events pushed to robot connections.

use crate::{MessageEnvelope, RecipientId};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::fmt;

/// Names of the events a robot can receive.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum EventName {
    /// Sent once after a successful registration.
    #[serde(rename = "welcome")]
    Welcome,
    /// A message delivered while the robot was online.
    #[serde(rename = "newMessage")]
    NewMessage,
    /// A message drained from the outbox after reconnecting.
    #[serde(rename = "oldMessage")]
    OldMessage,
}

impl EventName {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Welcome => "welcome",
            Self::NewMessage => "newMessage",
            Self::OldMessage => "oldMessage",
        }
    }
}

impl fmt::Display for EventName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// An event with its payload, ready for a transport to frame.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OutboundEvent {
    pub event: EventName,
    pub data: Value,
}

impl OutboundEvent {
    pub fn welcome(recipient: &RecipientId) -> Self {
        Self {
            event: EventName::Welcome,
            data: json!({ "robot": recipient.as_str() }),
        }
    }

    pub fn new_message(envelope: &MessageEnvelope) -> Self {
        Self::message(EventName::NewMessage, envelope)
    }

    pub fn old_message(envelope: &MessageEnvelope) -> Self {
        Self::message(EventName::OldMessage, envelope)
    }

    fn message(event: EventName, envelope: &MessageEnvelope) -> Self {
        Self {
            event,
            data: serde_json::to_value(envelope).unwrap_or(Value::Null),
        }
    }

    /// Parse the data back into a message envelope, if it is one.
    pub fn envelope(&self) -> Option<MessageEnvelope> {
        match self.event {
            EventName::NewMessage | EventName::OldMessage => {
                serde_json::from_value(self.data.clone()).ok()
            }
            EventName::Welcome => None,
        }
    }
}
