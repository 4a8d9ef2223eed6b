//! Health and shutdown handlers.

use super::reject_unless_authorized;
use crate::app::RelayState;
use relay_ipc::{IpcServer, Method, Response, ShutdownParams};
use tracing::info;

/// Register health and shutdown handlers.
pub async fn register(server: &IpcServer, state: RelayState) {
    // Health check
    let health_state = state.clone();
    server
        .register_handler(Method::Health, move |req| {
            let state = health_state.clone();
            async move {
                let store_ok = state.relay.store_healthy().await;
                Response::success(
                    &req.id,
                    serde_json::json!({
                        "status": if store_ok { "ok" } else { "degraded" },
                        "store_ok": store_ok,
                        "version": env!("CARGO_PKG_VERSION"),
                        "store": state.config.store,
                        "online": state.relay.registry().online_count(),
                        "uptime_secs": state.started_at.elapsed().as_secs(),
                    }),
                )
            }
        })
        .await;

    // Shutdown
    let shutdown_tx = server.shutdown_sender();
    server
        .register_handler(Method::Shutdown, move |req| {
            let tx = shutdown_tx.clone();
            let relay = state.relay.clone();
            async move {
                let params: ShutdownParams = match req.params_as() {
                    Ok(params) => params,
                    Err(response) => return response,
                };
                if let Some(rejected) =
                    reject_unless_authorized(&relay, &req.id, params.secret.as_deref())
                {
                    return rejected;
                }

                info!("Shutdown requested over IPC");
                let _ = tx.send(());
                Response::success(&req.id, serde_json::json!({ "status": "shutting_down" }))
            }
        })
        .await;

    info!("Registered health handlers");
}
