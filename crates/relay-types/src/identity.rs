//! Identities: who a message is for, which connection carries it, and where it came from.

use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;
use uuid::Uuid;

/// Longest accepted recipient name, in characters.
pub const MAX_RECIPIENT_LEN: usize = 128;

/// Rejected recipient name.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum InvalidRecipient {
    #[error("recipient is empty")]
    Empty,
    #[error("recipient is longer than 128 characters")]
    TooLong,
    #[error("recipient contains control characters")]
    ControlCharacter,
}

/// Name of a robot. Opaque beyond validation: trimmed, non-empty,
/// bounded length and free of control characters.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct RecipientId(String);

impl RecipientId {
    pub fn parse(raw: &str) -> Result<Self, InvalidRecipient> {
        let trimmed = raw.trim();
        if trimmed.is_empty() {
            return Err(InvalidRecipient::Empty);
        }
        if trimmed.chars().count() > MAX_RECIPIENT_LEN {
            return Err(InvalidRecipient::TooLong);
        }
        if trimmed.chars().any(char::is_control) {
            return Err(InvalidRecipient::ControlCharacter);
        }
        Ok(Self(trimmed.to_string()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl TryFrom<String> for RecipientId {
    type Error = InvalidRecipient;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::parse(&value)
    }
}

impl From<RecipientId> for String {
    fn from(id: RecipientId) -> Self {
        id.0
    }
}

impl std::str::FromStr for RecipientId {
    type Err = InvalidRecipient;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl fmt::Display for RecipientId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Handle for a live transport connection. Minted by the transport; the
/// registry only stores it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ConnectionId(Uuid);

impl ConnectionId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    pub fn as_uuid(&self) -> Uuid {
        self.0
    }
}

impl Default for ConnectionId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for ConnectionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Sender identity or external origin tag, e.g. `alice` or `sms:+15550100`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Origin(String);

impl Origin {
    pub fn new(origin: impl Into<String>) -> Self {
        Self(origin.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Origin {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn recipient_is_trimmed() {
        let id = RecipientId::parse("  rex \n").unwrap();
        assert_eq!(id.as_str(), "rex");
    }

    #[test]
    fn recipient_rejects_bad_names() {
        assert_eq!(RecipientId::parse("   "), Err(InvalidRecipient::Empty));
        assert_eq!(
            RecipientId::parse(&"r".repeat(MAX_RECIPIENT_LEN + 1)),
            Err(InvalidRecipient::TooLong)
        );
        assert_eq!(RecipientId::parse("re\u{0}x"), Err(InvalidRecipient::ControlCharacter));
        assert!(RecipientId::parse(&"r".repeat(MAX_RECIPIENT_LEN)).is_ok());
    }

    #[test]
    fn recipient_deserialization_validates() {
        let id: RecipientId = serde_json::from_str("\" rex \"").unwrap();
        assert_eq!(id.as_str(), "rex");
        assert!(serde_json::from_str::<RecipientId>("\"\"").is_err());
        assert_eq!(serde_json::to_string(&id).unwrap(), "\"rex\"");
    }

    #[test]
    fn connection_ids_are_unique() {
        assert_ne!(ConnectionId::new(), ConnectionId::new());
    }
}
