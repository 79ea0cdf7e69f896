//! Intent and solution payloads.
//!
//! The relay never interprets these payloads. Intents are carried as raw
//! bytes and solutions as opaque JSON documents; both are only checked for
//! well-formedness of their envelope.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::encoding::{self, base64_bytes};
use crate::error::Result;

/// Upstream-assigned intent identifier.
pub type IntentId = String;

/// An intent as accepted by the upstream network.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Intent {
    /// Identifier assigned by upstream on submission.
    pub id: IntentId,

    /// Address of the submitting dApp or sender.
    pub submitter: String,

    /// Raw intent payload.
    #[serde(with = "base64_bytes")]
    pub payload: Vec<u8>,
}

/// A solver's answer to one intent.
///
/// Arrival order is carried by the position in the owning list.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SolverSolution(serde_json::Value);

impl SolverSolution {
    /// Wrap an already parsed JSON document.
    pub fn new(value: serde_json::Value) -> Self {
        Self(value)
    }

    /// Parse a solution from its JSON bytes.
    pub fn from_slice(bytes: &[u8]) -> Result<Self> {
        Ok(Self(serde_json::from_slice(bytes)?))
    }

    /// Decode a base64-wrapped solution as carried on the upstream wire.
    pub fn from_base64(text: &[u8]) -> Result<Self> {
        let raw = encoding::decode(text)?;
        Self::from_slice(&raw)
    }

    /// Borrow the JSON document.
    pub fn as_value(&self) -> &serde_json::Value {
        &self.0
    }

    /// Serialize the document back to bytes.
    pub fn to_bytes(&self) -> Vec<u8> {
        self.0.to_string().into_bytes()
    }
}

/// A new intent pushed by upstream, as forwarded to subscribed solvers.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IntentNotification {
    pub dapp_address: String,
    pub sender_address: String,
    pub intent_id: IntentId,

    /// Intent payload. Decoded from its wire encoding when possible.
    #[serde(with = "base64_bytes")]
    pub intent: Vec<u8>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timestamp: Option<DateTime<Utc>>,
}

/// A solution pushed by upstream for an intent this relay may be tracking.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SolutionNotification {
    pub intent_id: IntentId,
    pub solution: SolverSolution,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_solution_from_base64() {
        let text = encoding::encode(br#"{"from":"0xabc","bid":7}"#);
        let solution = SolverSolution::from_base64(text.as_bytes()).unwrap();
        assert_eq!(solution.as_value()["bid"], 7);
    }

    #[test]
    fn test_solution_from_base64_rejects_non_json() {
        let text = encoding::encode(b"definitely not json");
        assert!(SolverSolution::from_base64(text.as_bytes()).is_err());
    }

    #[test]
    fn test_intent_notification_encodes_payload() {
        let notification = IntentNotification {
            dapp_address: "0xdapp".into(),
            sender_address: "0xsender".into(),
            intent_id: "abc".into(),
            intent: b"hello".to_vec(),
            timestamp: None,
        };

        let value = serde_json::to_value(&notification).unwrap();
        assert_eq!(value["intent"], json!("aGVsbG8="));
        assert!(value.get("timestamp").is_none());
    }
}
