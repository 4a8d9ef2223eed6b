//! Relay state definition.

use relay_config_and_utils::Config;
use relay_core::Relay;
use std::sync::Arc;
use std::time::Instant;

/// Shared relay state handed to IPC handlers (cheap to clone).
#[derive(Clone)]
pub struct RelayState {
    pub config: Arc<Config>,
    pub relay: Arc<Relay>,
    /// When this process started serving.
    pub started_at: Instant,
}

impl RelayState {
    pub fn new(config: Config, relay: Arc<Relay>) -> Self {
        Self {
            config: Arc::new(config),
            relay,
            started_at: Instant::now(),
        }
    }
}
