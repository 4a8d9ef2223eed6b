//! Domain types shared by the relay crates. No I/O, no async.

mod event;
mod identity;
mod message;
mod sms;

pub use event::{EventName, OutboundEvent};
pub use identity::{ConnectionId, InvalidRecipient, Origin, RecipientId, MAX_RECIPIENT_LEN};
pub use message::{MessageEnvelope, MessageId, PendingMessage};
pub use sms::{InboundSms, SMS_ORIGIN_PREFIX};
