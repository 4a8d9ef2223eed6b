//! Relay error types.

use thiserror::Error;

/// Relay error type.
#[derive(Error, Debug)]
pub enum RelayError {
    /// Supplied secret did not match.
    #[error("Unauthorized")]
    Unauthorized,

    /// The outbox could not be read or written.
    #[error("Persistence failure: {0}")]
    Persistence(#[from] relay_outbox::OutboxError),
}

/// Result type alias using RelayError.
pub type RelayResult<T> = Result<T, RelayError>;
