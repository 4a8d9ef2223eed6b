//! Message handlers: `message.send` and `sms.receive`.

use super::reject_unless_authorized;
use crate::app::RelayState;
use relay_core::SendOutcome;
use relay_ipc::{error_codes, IpcServer, Method, Response, SendParams, SmsParams};
use relay_types::Origin;
use serde_json::json;
use tracing::debug;

/// Sender identity when `message.send` names none.
pub const ANONYMOUS_ORIGIN: &str = "anonymous";

/// Register message handlers.
pub async fn register(server: &IpcServer, state: RelayState) {
    register_message_send(server, state.clone()).await;
    register_sms_receive(server, state).await;
}

async fn register_message_send(server: &IpcServer, state: RelayState) {
    server
        .register_handler(Method::MessageSend, move |req| {
            let relay = state.relay.clone();
            async move {
                let params: SendParams = match req.params_as() {
                    Ok(params) => params,
                    Err(response) => return response,
                };
                if let Some(rejected) =
                    reject_unless_authorized(&relay, &req.id, params.secret.as_deref())
                {
                    return rejected;
                }

                let from = Origin::new(params.from.as_deref().unwrap_or(ANONYMOUS_ORIGIN));
                debug!(recipient = %params.recipient, from = %from, "message.send");

                let outcome = relay.send_message(&params.recipient, params.body, from).await;
                outcome_response(&req.id, &outcome, None)
            }
        })
        .await;
}

async fn register_sms_receive(server: &IpcServer, state: RelayState) {
    server
        .register_handler(Method::SmsReceive, move |req| {
            let relay = state.relay.clone();
            async move {
                let params: SmsParams = match req.params_as() {
                    Ok(params) => params,
                    Err(response) => return response,
                };
                if let Some(rejected) =
                    reject_unless_authorized(&relay, &req.id, params.secret.as_deref())
                {
                    return rejected;
                }

                debug!(recipient = %params.recipient, from = %params.sms.sms_from, "sms.receive");

                let outcome = relay.send_sms(&params.recipient, &params.sms).await;
                outcome_response(&req.id, &outcome, Some(outcome.sms_reply_text()))
            }
        })
        .await;
}

/// Shape a routing outcome. `reply` is the SMS reply text, when there is one.
fn outcome_response(id: &str, outcome: &SendOutcome, reply: Option<&str>) -> Response {
    let mut body = json!({ "outcome": outcome.as_str() });
    if let Some(reply) = reply {
        body["reply"] = json!(reply);
    }

    match outcome {
        SendOutcome::DeliveredLive => Response::success(id, body),
        SendOutcome::Queued { sequence } => {
            body["sequence"] = json!(sequence);
            Response::success(id, body)
        }
        SendOutcome::PersistenceFailed { reason } => Response::error_with_data(
            id,
            error_codes::PERSISTENCE_FAILED,
            &format!("Recipient offline and message not stored: {}", reason),
            body,
        ),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_outcome_shapes() {
        let live = outcome_response("1", &SendOutcome::DeliveredLive, None);
        assert_eq!(live.result.unwrap(), json!({ "outcome": "delivered-live" }));

        let queued = outcome_response("2", &SendOutcome::Queued { sequence: 4 }, Some("Sorry"));
        assert_eq!(
            queued.result.unwrap(),
            json!({ "outcome": "queued", "sequence": 4, "reply": "Sorry" })
        );

        let failed = outcome_response(
            "3",
            &SendOutcome::PersistenceFailed {
                reason: "disk full".into(),
            },
            None,
        );
        let error = failed.error.unwrap();
        assert_eq!(error.code, error_codes::PERSISTENCE_FAILED);
        assert!(error.message.contains("disk full"));
        assert_eq!(error.data.unwrap()["outcome"], "persistence-failed");
    }
}
