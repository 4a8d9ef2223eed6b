//! Shared-secret access gate.

use std::fmt;

/// Secret used when none is configured, or when it is configured empty.
pub const DEFAULT_SHARED_SECRET: &str = "sueprSecret1785";

/// Validates the single shared secret guarding registrations and
/// sender operations. The secret never appears in `Debug` output.
#[derive(Clone)]
pub struct AccessGate {
    secret: String,
}

impl AccessGate {
    pub fn new(configured: Option<&str>) -> Self {
        let secret = match configured {
            Some(secret) if !secret.is_empty() => secret.to_string(),
            _ => DEFAULT_SHARED_SECRET.to_string(),
        };
        Self { secret }
    }

    /// True only when a non-empty supplied secret matches.
    pub fn authorize(&self, supplied: Option<&str>) -> bool {
        match supplied {
            Some(supplied) if !supplied.is_empty() => supplied == self.secret,
            _ => false,
        }
    }

    pub fn uses_default_secret(&self) -> bool {
        self.secret == DEFAULT_SHARED_SECRET
    }
}

impl Default for AccessGate {
    fn default() -> Self {
        Self::new(None)
    }
}

impl fmt::Debug for AccessGate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AccessGate")
            .field("secret", &"<redacted>")
            .field("default", &self.uses_default_secret())
            .finish()
    }
}
