//! Relay initialization.

use crate::app::lifecycle::client_for;
use crate::app::RelayState;
use crate::ipc::register_handlers;
use relay_config_and_utils::{Config, Paths, StoreBackend};
use relay_core::{AccessGate, Relay, RelaySettings};
use relay_ipc::{IpcServer, TcpTransport};
use relay_outbox::{OutboxResult, OutboxStore, RedisOutbox, SqliteOutbox};
use std::sync::Arc;
use tracing::{info, warn};

/// Open the configured outbox backend.
pub async fn open_outbox(config: &Config, paths: &Paths) -> OutboxResult<Arc<dyn OutboxStore>> {
    match config.store {
        StoreBackend::Sqlite => {
            let path = paths.database_file();
            info!(path = %path.display(), "Opening SQLite outbox");
            Ok(Arc::new(SqliteOutbox::open(&path).await?))
        }
        StoreBackend::Redis => {
            info!(url = %config.redis_url, "Connecting to Redis outbox");
            Ok(Arc::new(RedisOutbox::connect(&config.redis_url).await?))
        }
    }
}

/// Run the relay until Ctrl-C or a `shutdown` request.
pub async fn run_relay(config: Config, paths: Paths) -> Result<(), Box<dyn std::error::Error>> {
    let listen_addr = config.listen_addr()?;

    // Singleton enforcement: refuse to start if a relay already answers here
    if client_for(&config)?.is_running().await {
        return Err(format!(
            "a relay is already running on {}; use 'robot-relay stop' first",
            listen_addr
        )
        .into());
    }

    info!(
        listen = %listen_addr,
        store = ?config.store,
        emit_timeout_ms = config.emit_timeout_ms,
        "Starting robot relay"
    );

    paths.ensure_dirs()?;

    let outbox = open_outbox(&config, &paths).await?;

    let gate = AccessGate::new(config.shared_secret.as_deref());
    if gate.uses_default_secret() {
        warn!("No shared secret configured, using the built-in default");
    }

    let transport = Arc::new(TcpTransport::new());
    let relay = Arc::new(Relay::with_settings(
        outbox,
        transport.clone(),
        gate,
        RelaySettings {
            emit_timeout: config.emit_timeout(),
            ..RelaySettings::default()
        },
    ));

    let server = IpcServer::new(listen_addr, relay.clone(), transport);
    let state = RelayState::new(config, relay);
    register_handlers(&server, state).await;

    let shutdown_tx = server.shutdown_sender();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            info!("Interrupt received, shutting down");
            let _ = shutdown_tx.send(());
        }
    });

    let server_result = server.run().await;

    info!("Relay stopped");

    server_result.map_err(|e| e.into())
}
