//! Inbound messages and launch options.

use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};

use crate::{ClosureDescriptor, Token, Value, WireError};

/// Launch option key the host's transition machinery reserves for usage
/// reporting. Repurposed as the side-channel slot for the first token.
pub const USAGE_TIME_REPORT: &str = "usage_time_report";

/// What a token delivery carries.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum Payload {
    /// A reverse channel handed over during the handshake.
    Token(Token),
    /// A procedure to run in the receiving context.
    Invocation(ClosureDescriptor),
    /// Anything else. Dispatchers ignore it.
    Opaque(Value),
}

impl fmt::Display for Payload {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Payload::Token(t) => write!(f, "{}", t),
            Payload::Invocation(d) => write!(f, "{}", d),
            Payload::Opaque(_) => write!(f, "Opaque"),
        }
    }
}

/// A message handed to a context's dispatcher by the host.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct Message {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub payload: Option<Payload>,

    /// Set by the host when the delivery is its own usage report rather
    /// than an application send. Non-negative means "report".
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub usage_time_report: Option<i64>,
}

impl Message {
    pub fn new(payload: Payload) -> Self {
        Self {
            payload: Some(payload),
            usage_time_report: None,
        }
    }

    pub fn empty() -> Self {
        Self::default()
    }

    /// A host-generated usage report for a token.
    pub fn usage_report(elapsed_ms: i64) -> Self {
        Self {
            payload: None,
            usage_time_report: Some(elapsed_ms),
        }
    }

    pub fn is_usage_report(&self) -> bool {
        self.usage_time_report.is_some_and(|ms| ms >= 0)
    }

    pub fn to_bytes(&self) -> Result<Vec<u8>, WireError> {
        Ok(serde_json::to_vec(self)?)
    }

    pub fn from_bytes(bytes: &[u8]) -> Result<Self, WireError> {
        Ok(serde_json::from_slice(bytes)?)
    }
}

/// Options attached to an entry-point launch request.
///
/// Only the host's transition machinery interprets these; the protocol only
/// reads and writes the side-channel key.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct LaunchOptions {
    entries: BTreeMap<String, Payload>,
}

impl LaunchOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, key: &str, payload: Payload) -> Self {
        self.entries.insert(key.to_string(), payload);
        self
    }

    pub fn get(&self, key: &str) -> Option<&Payload> {
        self.entries.get(key)
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn to_bytes(&self) -> Result<Vec<u8>, WireError> {
        Ok(serde_json::to_vec(self)?)
    }

    pub fn from_bytes(bytes: &[u8]) -> Result<Self, WireError> {
        Ok(serde_json::from_slice(bytes)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{ContextId, SlotId};

    #[test]
    fn usage_report_detection() {
        assert!(Message::usage_report(0).is_usage_report());
        assert!(Message::usage_report(1200).is_usage_report());
        assert!(!Message::empty().is_usage_report());

        let negative = Message {
            payload: None,
            usage_time_report: Some(-1),
        };
        assert!(!negative.is_usage_report());
    }

    #[test]
    fn token_payload_survives_the_wire() {
        let token = Token::new(ContextId(0), SlotId::shuttle(ContextId(0)), None);
        let message = Message::new(Payload::Token(token.clone()));

        let decoded = Message::from_bytes(&message.to_bytes().unwrap()).unwrap();
        match decoded.payload {
            Some(Payload::Token(t)) => assert!(t.same_handle(&token)),
            other => panic!("expected token, got {:?}", other),
        }
    }

    #[test]
    fn garbage_bytes_fail_to_decode() {
        assert!(Message::from_bytes(b"not json").is_err());
    }

    #[test]
    fn launch_options_lookup() {
        let token = Token::new(ContextId(0), SlotId::shuttle(ContextId(0)), None);
        let options = LaunchOptions::new().with(USAGE_TIME_REPORT, Payload::Token(token));
        assert!(options.get(USAGE_TIME_REPORT).is_some());
        assert!(options.get("other").is_none());
        assert!(LaunchOptions::new().is_empty());
    }
}
