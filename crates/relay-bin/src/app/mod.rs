//! Application wiring and lifecycle management.

mod init;
mod lifecycle;
mod state;

pub use init::{open_outbox, run_relay};
pub use lifecycle::{check_status, send_message, send_sms, stop_relay};
pub use state::RelayState;
