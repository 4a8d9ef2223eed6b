//! IPC handler implementations.
//!
//! Thin handlers: decode params, check the shared secret, call the relay,
//! shape the response.

pub mod health;
pub mod message;
pub mod outbox;

use relay_core::Relay;
use relay_ipc::{error_codes, Response};

/// The `UNAUTHORIZED` response when `secret` does not pass the gate.
pub(crate) fn reject_unless_authorized(
    relay: &Relay,
    request_id: &str,
    secret: Option<&str>,
) -> Option<Response> {
    if relay.authorize(secret) {
        None
    } else {
        Some(Response::error(request_id, error_codes::UNAUTHORIZED, "Unauthorized"))
    }
}
