//! Handler registration for the relay server.

use crate::app::RelayState;
use crate::ipc::handlers;
use relay_ipc::IpcServer;
use tracing::info;

/// Register all IPC handlers. `robot.identify` is built into the server.
pub async fn register_handlers(server: &IpcServer, state: RelayState) {
    handlers::health::register(server, state.clone()).await;
    handlers::message::register(server, state.clone()).await;
    handlers::outbox::register(server, state).await;

    info!("All IPC handlers registered");
}
