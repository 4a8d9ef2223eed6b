//! Line-delimited JSON frames spoken on the relay port.
//!
//! One JSON object per line. Clients send requests `{id, method, params}`;
//! the server answers `{id, result}` or `{id, error}` and pushes robot events
//! as `{event, data}` on identified connections.

use relay_types::{InboundSms, OutboundEvent, RecipientId};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Request methods, named on the wire as shown in each `rename`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Method {
    Health,

    /// Bind the calling connection to a robot identity.
    #[serde(rename = "robot.identify")]
    RobotIdentify,

    #[serde(rename = "message.send")]
    MessageSend,

    /// Relay an inbound SMS to a robot.
    #[serde(rename = "sms.receive")]
    SmsReceive,

    #[serde(rename = "outbox.status")]
    OutboxStatus,

    /// Stop the relay.
    Shutdown,
}

/// `{id, method, params}` sent by clients and robots.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Request {
    pub id: String,
    pub method: Method,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub params: Option<Value>,
}

fn fresh_id() -> String {
    uuid::Uuid::new_v4().to_string()
}

impl Request {
    pub fn new(method: Method) -> Self {
        Self { id: fresh_id(), method, params: None }
    }

    pub fn with_params(method: Method, params: Value) -> Self {
        Self { id: fresh_id(), method, params: Some(params) }
    }

    /// Typed params. On failure the `Err` is the INVALID_PARAMS reply for
    /// this request, ready to send.
    pub fn params_as<T: DeserializeOwned>(&self) -> Result<T, Response> {
        let raw = self.params.clone().unwrap_or_default();
        serde_json::from_value(raw).map_err(|e| {
            Response::error(&self.id, error_codes::INVALID_PARAMS, &format!("Invalid parameters: {}", e))
        })
    }

    pub fn to_json(&self) -> serde_json::Result<String> {
        serde_json::to_string(self)
    }

    pub fn from_json(line: &str) -> serde_json::Result<Self> {
        serde_json::from_str(line)
    }
}

/// Reply to one request: exactly one of `result` or `error` is set.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Response {
    pub id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub result: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<ErrorInfo>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorInfo {
    pub code: i32,
    pub message: String,
    /// Extra context, such as the SMS reply on a persistence failure.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
}

impl Response {
    pub fn success(id: &str, result: Value) -> Self {
        Self { id: id.to_owned(), result: Some(result), error: None }
    }

    pub fn error(id: &str, code: i32, message: &str) -> Self {
        Self::failure(id, code, message, None)
    }

    pub fn error_with_data(id: &str, code: i32, message: &str, data: Value) -> Self {
        Self::failure(id, code, message, Some(data))
    }

    fn failure(id: &str, code: i32, message: &str, data: Option<Value>) -> Self {
        let error = ErrorInfo { code, message: message.to_owned(), data };
        Self { id: id.to_owned(), result: None, error: Some(error) }
    }

    pub fn to_json(&self) -> serde_json::Result<String> {
        serde_json::to_string(self)
    }

    pub fn from_json(line: &str) -> serde_json::Result<Self> {
        serde_json::from_str(line)
    }

    pub fn is_success(&self) -> bool {
        self.error.is_none()
    }

    pub fn error_code(&self) -> Option<i32> {
        self.error.as_ref().map(|e| e.code)
    }
}

/// Anything the server writes: a pushed event or a response.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Frame {
    Event(OutboundEvent),
    Response(Response),
}

impl Frame {
    pub fn from_json(json: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(json)
    }
}

/// `robot.identify`
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IdentifyParams {
    pub robot: RecipientId,
    #[serde(default)]
    pub secret: Option<String>,
}

/// `message.send`
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SendParams {
    pub recipient: RecipientId,
    pub body: Value,
    /// Sender identity; `anonymous` when absent.
    #[serde(default)]
    pub from: Option<String>,
    #[serde(default)]
    pub secret: Option<String>,
}

/// `sms.receive`
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SmsParams {
    pub recipient: RecipientId,
    #[serde(flatten)]
    pub sms: InboundSms,
    #[serde(default)]
    pub secret: Option<String>,
}

/// `outbox.status`
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OutboxStatusParams {
    pub recipient: RecipientId,
    #[serde(default)]
    pub secret: Option<String>,
}

/// `shutdown`
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ShutdownParams {
    #[serde(default)]
    pub secret: Option<String>,
}

/// JSON-RPC style codes; relay-specific ones sit below -32000.
pub mod error_codes {
    pub const PARSE_ERROR: i32 = -32700;
    pub const INVALID_REQUEST: i32 = -32600;
    pub const METHOD_NOT_FOUND: i32 = -32601;
    pub const INVALID_PARAMS: i32 = -32602;
    pub const INTERNAL_ERROR: i32 = -32603;
    pub const UNAUTHORIZED: i32 = -32001;
    pub const PERSISTENCE_FAILED: i32 = -32010;
}

#[cfg(test)]
mod tests {
    use super::*;
    use relay_types::EventName;
    use serde_json::json;

    #[test]
    fn test_request_serialization() {
        let request = Request::with_params(
            Method::RobotIdentify,
            json!({ "robot": "rex", "secret": "s" }),
        );
        let json = request.to_json().unwrap();

        assert!(json.contains("\"method\":\"robot.identify\""));
        assert!(json.contains("\"id\":"));
    }

    #[test]
    fn test_method_names() {
        for (method, name) in [
            (Method::Health, "health"),
            (Method::MessageSend, "message.send"),
            (Method::SmsReceive, "sms.receive"),
            (Method::OutboxStatus, "outbox.status"),
            (Method::Shutdown, "shutdown"),
        ] {
            assert_eq!(serde_json::to_value(&method).unwrap(), json!(name));
        }
    }

    #[test]
    fn test_params_as_reports_invalid_params() {
        let request = Request::with_params(Method::RobotIdentify, json!({ "robot": "  " }));
        let response = request.params_as::<IdentifyParams>().unwrap_err();
        assert_eq!(response.id, request.id);
        assert_eq!(response.error_code(), Some(error_codes::INVALID_PARAMS));

        let missing = Request::new(Method::MessageSend);
        assert!(missing.params_as::<SendParams>().is_err());
    }

    #[test]
    fn test_sms_params_flatten() {
        let request = Request::with_params(
            Method::SmsReceive,
            json!({
                "recipient": "rex",
                "smsText": "hi",
                "smsTo": "+15550000",
                "smsFrom": "+15550100",
                "secret": "s"
            }),
        );
        let params: SmsParams = request.params_as().unwrap();
        assert_eq!(params.sms.sms_from, "+15550100");
        assert_eq!(params.secret.as_deref(), Some("s"));
    }

    #[test]
    fn test_frame_distinguishes_events_and_responses() {
        let event = Frame::from_json(r#"{"event":"welcome","data":{"robot":"rex"}}"#).unwrap();
        assert!(matches!(event, Frame::Event(e) if e.event == EventName::Welcome));

        let response = Frame::from_json(r#"{"id":"1","result":{"ok":true}}"#).unwrap();
        assert!(matches!(response, Frame::Response(r) if r.is_success()));

        let error = Frame::from_json(r#"{"id":"2","error":{"code":-32001,"message":"Unauthorized"}}"#).unwrap();
        assert!(matches!(error, Frame::Response(r) if r.error_code() == Some(error_codes::UNAUTHORIZED)));
    }
}
