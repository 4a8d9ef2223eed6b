//! # Relay core
//!
//! A presence-tracked store-and-forward relay for robots.
//!
//! ```text
//! identify:  gate -> registry -> welcome -> drain outbox (oldMessage)
//! send:      online  -> emit live (newMessage)
//!            offline -> append to outbox
//! close:     registry entry removed
//! ```
//!
//! All operations on one identity are serialized by a per-identity lock;
//! different identities run in parallel. Delivery from the outbox is
//! at-least-once: a message is removed only after its emission succeeded,
//! and a failed remove means it will be sent again.
//!
//! ## Crate Structure
//!
//! - [`relay`] - The reconciler (`Relay`)
//! - [`registry`] - Recipient/connection maps
//! - [`gate`] - Shared-secret gate
//! - [`transport`] - Outbound seam and a recording test double
//! - [`locks`] - Per-identity async locks

mod error;
pub mod gate;
pub mod locks;
pub mod registry;
pub mod relay;
pub mod transport;

pub use error::{RelayError, RelayResult};
pub use gate::{AccessGate, DEFAULT_SHARED_SECRET};
pub use locks::{IdentityGuard, IdentityLocks};
pub use registry::ConnectionRegistry;
pub use relay::{
    DrainOutcome, DrainReport, InterruptReason, Relay, RelaySettings, SendOutcome,
    DEFAULT_EMIT_TIMEOUT,
};
pub use transport::{RecordingTransport, Transport, TransportError};

#[cfg(test)]
mod tests;
