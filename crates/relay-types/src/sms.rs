//! Inbound SMS relayed to a robot.

use crate::{MessageEnvelope, Origin};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Origin tag prefix for messages that arrived by SMS.
pub const SMS_ORIGIN_PREFIX: &str = "sms:";

/// SMS as delivered by the provider webhook, already validated upstream.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InboundSms {
    pub sms_text: String,
    pub sms_to: String,
    pub sms_from: String,
}

impl InboundSms {
    /// `sms:<from>`
    pub fn origin(&self) -> Origin {
        Origin::new(format!("{}{}", SMS_ORIGIN_PREFIX, self.sms_from))
    }

    /// The SMS itself is the payload robots receive.
    pub fn payload(&self) -> Value {
        serde_json::to_value(self).unwrap_or(Value::Null)
    }

    pub fn envelope(&self) -> MessageEnvelope {
        MessageEnvelope::live(self.origin(), self.payload())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sms_uses_camel_case_fields_and_tagged_origin() {
        let sms: InboundSms = serde_json::from_str(
            r#"{"smsText":"hello","smsTo":"+15550000","smsFrom":"+15550100"}"#,
        )
        .unwrap();

        assert_eq!(sms.origin().as_str(), "sms:+15550100");
        assert_eq!(sms.payload()["smsText"], "hello");
        assert_eq!(sms.envelope().from.as_str(), "sms:+15550100");
    }
}
