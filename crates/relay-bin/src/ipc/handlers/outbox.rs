//! Outbox status handler.

use super::reject_unless_authorized;
use crate::app::RelayState;
use relay_ipc::{error_codes, IpcServer, Method, OutboxStatusParams, Response};

/// Register the `outbox.status` handler.
pub async fn register(server: &IpcServer, state: RelayState) {
    server
        .register_handler(Method::OutboxStatus, move |req| {
            let relay = state.relay.clone();
            async move {
                let params: OutboxStatusParams = match req.params_as() {
                    Ok(params) => params,
                    Err(response) => return response,
                };
                if let Some(rejected) =
                    reject_unless_authorized(&relay, &req.id, params.secret.as_deref())
                {
                    return rejected;
                }

                match relay.outbox_depth(&params.recipient).await {
                    Ok(pending) => Response::success(
                        &req.id,
                        serde_json::json!({
                            "recipient": params.recipient,
                            "online": relay.is_online(&params.recipient),
                            "pending": pending,
                        }),
                    ),
                    Err(e) => Response::error(&req.id, error_codes::INTERNAL_ERROR, &e.to_string()),
                }
            }
        })
        .await;
}
