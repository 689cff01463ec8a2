//! Protocol events exchanged between a connection and the relay.
//!
//! These are transport-neutral; [`Frame`](crate::Frame) gives them a JSON
//! text encoding.

use serde::{Deserialize, Serialize};
use serde_json::value::RawValue;
use std::fmt;

use crate::Code;

/// Opaque transfer payload.
///
/// Holds the exact JSON text the sender supplied. The relay never parses or
/// rewrites it, so what the receiver gets is byte-identical to what was sent.
#[derive(Clone, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Payload(Box<RawValue>);

impl Payload {
    /// Wrap a JSON document. Fails if `json` is not valid JSON.
    pub fn from_json(json: impl Into<String>) -> Result<Self, serde_json::Error> {
        RawValue::from_string(json.into()).map(Self)
    }

    /// The JSON `null` payload, used when a transmission carries no data.
    pub fn null() -> Self {
        Self::from_raw(RawValue::NULL.to_owned())
    }

    pub(crate) fn from_raw(raw: Box<RawValue>) -> Self {
        Self(raw)
    }

    pub(crate) fn as_raw(&self) -> &RawValue {
        &self.0
    }

    /// The payload's JSON text, exactly as received.
    pub fn as_str(&self) -> &str {
        self.0.get()
    }

    /// Size of the payload in bytes.
    pub fn len(&self) -> usize {
        self.0.get().len()
    }

    /// Whether the payload is empty (never true for valid JSON).
    pub fn is_empty(&self) -> bool {
        self.0.get().is_empty()
    }
}

impl PartialEq for Payload {
    fn eq(&self, other: &Self) -> bool {
        self.as_str() == other.as_str()
    }
}

impl Eq for Payload {}

impl fmt::Debug for Payload {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Payload({} bytes)", self.len())
    }
}

/// Events a connection sends to the relay.
///
/// Disconnects are not listed here: the transport reports those directly.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Inbound {
    /// Ask for a fresh code to send under.
    RequestSlot,
    /// Join the slot with this code as the receiver.
    ///
    /// `None` when the client omitted the code entirely.
    RequestFromSlot {
        /// Code as typed by the user, unvalidated.
        slot: Option<String>,
    },
    /// A chunk of data for the paired receiver.
    Transmission(Payload),
    /// The receiver has everything; tear the slot down.
    GotAll,
}

impl Inbound {
    /// Wire name of this event.
    pub fn name(&self) -> &'static str {
        match self {
            Inbound::RequestSlot => "request_slot",
            Inbound::RequestFromSlot { .. } => "request_from_slot",
            Inbound::Transmission(_) => "transmission",
            Inbound::GotAll => "got_all",
        }
    }
}

/// Events the relay sends to a connection.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outbound {
    /// Reply to a successful claim.
    SlotAnswer {
        /// The claimed code.
        slot: Code,
    },
    /// Tells the sender a receiver has joined.
    TransmitNow,
    /// Relayed payload, verbatim.
    Transmission(Payload),
    /// Tells the sender the receiver has everything.
    GotAll,
    /// A request could not be served.
    ServerError {
        /// Machine-readable error code (`old_slot`, `bad_slot`, ...).
        code: String,
        /// Human-readable explanation.
        text: String,
    },
}

impl Outbound {
    /// Wire name of this event.
    pub fn name(&self) -> &'static str {
        match self {
            Outbound::SlotAnswer { .. } => "slot_answer",
            Outbound::TransmitNow => "transmit_now",
            Outbound::Transmission(_) => "transmission",
            Outbound::GotAll => "got_all",
            Outbound::ServerError { .. } => "servererror",
        }
    }

    /// Build a `servererror` event.
    pub fn server_error(code: impl Into<String>, text: impl Into<String>) -> Self {
        Outbound::ServerError {
            code: code.into(),
            text: text.into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn payload_keeps_exact_text() {
        let text = r#"{ "data" : "hello",  "n": 1.50 }"#;
        let payload = Payload::from_json(text).unwrap();
        assert_eq!(payload.as_str(), text);
        assert_eq!(payload.len(), text.len());
    }

    #[test]
    fn payload_rejects_invalid_json() {
        assert!(Payload::from_json("{not json").is_err());
    }

    #[test]
    fn null_payload() {
        assert_eq!(Payload::null().as_str(), "null");
        assert!(!Payload::null().is_empty());
    }

    #[test]
    fn payload_equality_is_textual() {
        let a = Payload::from_json(r#"{"a":1}"#).unwrap();
        let b = Payload::from_json(r#"{"a":1}"#).unwrap();
        let c = Payload::from_json(r#"{"a": 1}"#).unwrap();
        assert_eq!(a, b);
        assert_ne!(a, c);
    }

    #[test]
    fn event_names() {
        assert_eq!(Inbound::RequestSlot.name(), "request_slot");
        assert_eq!(
            Inbound::RequestFromSlot { slot: None }.name(),
            "request_from_slot"
        );
        assert_eq!(Outbound::TransmitNow.name(), "transmit_now");
        assert_eq!(Outbound::server_error("old_slot", "x").name(), "servererror");
    }
}
