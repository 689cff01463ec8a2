//! Frame - the JSON text encoding of protocol events.
//!
//! Every event travels as one text message:
//!
//! ```text
//! {"event": "request_from_slot", "data": {"slot": "7AX0"}}
//! {"event": "transmit_now"}
//! ```
//!
//! `data` is omitted for events that carry none. For `transmission` the
//! `data` value is the opaque payload and is kept as raw text.

use serde::{Deserialize, Serialize};
use serde_json::value::{to_raw_value, RawValue};

use crate::{Code, DropError, Inbound, Outbound, Payload};

/// One event on the wire.
#[derive(Debug, Serialize, Deserialize)]
pub struct Frame {
    /// Event name
    pub event: String,
    /// Event data, kept undecoded
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<Box<RawValue>>,
}

#[derive(Serialize, Deserialize)]
struct SlotData {
    slot: Code,
}

#[derive(Serialize, Deserialize)]
struct ErrorData {
    code: String,
    text: String,
}

impl Frame {
    /// Parse a frame from JSON text.
    pub fn from_text(text: &str) -> Result<Self, DropError> {
        serde_json::from_str(text).map_err(DropError::Deserialization)
    }

    /// Encode this frame as JSON text.
    pub fn to_text(&self) -> Result<String, DropError> {
        serde_json::to_string(self).map_err(DropError::Serialization)
    }

    /// Decode a client-to-relay event.
    pub fn decode_inbound(text: &str) -> Result<Inbound, DropError> {
        let frame = Self::from_text(text)?;
        match frame.event.as_str() {
            "request_slot" => Ok(Inbound::RequestSlot),
            "request_from_slot" => Ok(Inbound::RequestFromSlot {
                slot: requested_slot(frame.data.as_deref())?,
            }),
            "transmission" => Ok(Inbound::Transmission(
                frame.data.map(Payload::from_raw).unwrap_or_else(Payload::null),
            )),
            "got_all" => Ok(Inbound::GotAll),
            _ => Err(DropError::UnknownEvent(frame.event)),
        }
    }

    /// Encode a client-to-relay event.
    pub fn encode_inbound(event: &Inbound) -> Result<String, DropError> {
        let data = match event {
            Inbound::RequestSlot | Inbound::GotAll => None,
            Inbound::RequestFromSlot { slot } => Some(raw(&serde_json::json!({ "slot": slot }))?),
            Inbound::Transmission(payload) => Some(payload.as_raw().to_owned()),
        };
        Self::with_data(event.name(), data).to_text()
    }

    /// Encode a relay-to-client event.
    pub fn encode_outbound(event: &Outbound) -> Result<String, DropError> {
        let data = match event {
            Outbound::TransmitNow | Outbound::GotAll => None,
            Outbound::SlotAnswer { slot } => Some(raw(&SlotData { slot: *slot })?),
            Outbound::Transmission(payload) => Some(payload.as_raw().to_owned()),
            Outbound::ServerError { code, text } => Some(raw(&ErrorData {
                code: code.clone(),
                text: text.clone(),
            })?),
        };
        Self::with_data(event.name(), data).to_text()
    }

    /// Decode a relay-to-client event.
    pub fn decode_outbound(text: &str) -> Result<Outbound, DropError> {
        let frame = Self::from_text(text)?;
        match frame.event.as_str() {
            "slot_answer" => {
                let data: SlotData = parse_data("slot_answer", frame.data.as_deref())?;
                Ok(Outbound::SlotAnswer { slot: data.slot })
            }
            "transmit_now" => Ok(Outbound::TransmitNow),
            "transmission" => Ok(Outbound::Transmission(
                frame.data.map(Payload::from_raw).unwrap_or_else(Payload::null),
            )),
            "got_all" => Ok(Outbound::GotAll),
            "servererror" => {
                let data: ErrorData = parse_data("servererror", frame.data.as_deref())?;
                Ok(Outbound::ServerError {
                    code: data.code,
                    text: data.text,
                })
            }
            _ => Err(DropError::UnknownEvent(frame.event)),
        }
    }

    fn with_data(event: &str, data: Option<Box<RawValue>>) -> Self {
        Self {
            event: event.to_string(),
            data,
        }
    }
}

/// Pull the `slot` field out of `request_from_slot` data.
///
/// A missing or null field yields `None`. Non-string values are passed on as
/// their JSON text, which the relay will reject as an unknown code.
fn requested_slot(data: Option<&RawValue>) -> Result<Option<String>, DropError> {
    let Some(data) = data else {
        return Ok(None);
    };
    let value: serde_json::Value =
        serde_json::from_str(data.get()).map_err(DropError::Deserialization)?;
    Ok(match value.get("slot") {
        None | Some(serde_json::Value::Null) => None,
        Some(serde_json::Value::String(s)) => Some(s.clone()),
        Some(other) => Some(other.to_string()),
    })
}

fn parse_data<T: for<'de> Deserialize<'de>>(
    event: &'static str,
    data: Option<&RawValue>,
) -> Result<T, DropError> {
    let data = data.ok_or_else(|| DropError::InvalidData {
        event,
        reason: "missing data".to_string(),
    })?;
    serde_json::from_str(data.get()).map_err(|e| DropError::InvalidData {
        event,
        reason: e.to_string(),
    })
}

fn raw<T: Serialize>(value: &T) -> Result<Box<RawValue>, DropError> {
    to_raw_value(value).map_err(DropError::Serialization)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn decodes_request_slot() {
        assert_eq!(
            Frame::decode_inbound(r#"{"event":"request_slot"}"#).unwrap(),
            Inbound::RequestSlot
        );
        // data on a data-less event is ignored
        assert_eq!(
            Frame::decode_inbound(r#"{"event":"got_all","data":{}}"#).unwrap(),
            Inbound::GotAll
        );
    }

    #[test]
    fn decodes_request_from_slot_variants() {
        let slot = |text: &str| match Frame::decode_inbound(text).unwrap() {
            Inbound::RequestFromSlot { slot } => slot,
            other => panic!("unexpected {:?}", other),
        };

        assert_eq!(
            slot(r#"{"event":"request_from_slot","data":{"slot":"7AX0"}}"#),
            Some("7AX0".to_string())
        );
        assert_eq!(slot(r#"{"event":"request_from_slot","data":{}}"#), None);
        assert_eq!(slot(r#"{"event":"request_from_slot"}"#), None);
        assert_eq!(
            slot(r#"{"event":"request_from_slot","data":{"slot":null}}"#),
            None
        );
        assert_eq!(
            slot(r#"{"event":"request_from_slot","data":{"slot":1234}}"#),
            Some("1234".to_string())
        );
    }

    #[test]
    fn transmission_payload_is_verbatim() {
        let text = r#"{"event":"transmission","data":{ "data" : "hello" }}"#;
        match Frame::decode_inbound(text).unwrap() {
            Inbound::Transmission(payload) => {
                assert_eq!(payload.as_str(), r#"{ "data" : "hello" }"#);

                let out = Frame::encode_outbound(&Outbound::Transmission(payload)).unwrap();
                assert_eq!(out, r#"{"event":"transmission","data":{ "data" : "hello" }}"#);
            }
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn transmission_without_data_is_null() {
        match Frame::decode_inbound(r#"{"event":"transmission"}"#).unwrap() {
            Inbound::Transmission(payload) => assert_eq!(payload.as_str(), "null"),
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn rejects_unknown_and_malformed() {
        assert!(matches!(
            Frame::decode_inbound(r#"{"event":"hello"}"#),
            Err(DropError::UnknownEvent(e)) if e == "hello"
        ));
        assert!(matches!(
            Frame::decode_inbound("not json"),
            Err(DropError::Deserialization(_))
        ));
        assert!(matches!(
            Frame::decode_inbound(r#"{"data":{}}"#),
            Err(DropError::Deserialization(_))
        ));
    }

    #[test]
    fn encodes_outbound_events() {
        let slot = Code::parse("NR7C").unwrap();
        assert_eq!(
            Frame::encode_outbound(&Outbound::SlotAnswer { slot }).unwrap(),
            r#"{"event":"slot_answer","data":{"slot":"NR7C"}}"#
        );
        assert_eq!(
            Frame::encode_outbound(&Outbound::TransmitNow).unwrap(),
            r#"{"event":"transmit_now"}"#
        );
        assert_eq!(
            Frame::encode_outbound(&Outbound::server_error("bad_slot", "Bad slot specified"))
                .unwrap(),
            r#"{"event":"servererror","data":{"code":"bad_slot","text":"Bad slot specified"}}"#
        );
    }

    #[test]
    fn client_side_decodes_what_relay_encodes() {
        let events = [
            Outbound::SlotAnswer {
                slot: Code::parse("0123").unwrap(),
            },
            Outbound::TransmitNow,
            Outbound::GotAll,
            Outbound::Transmission(Payload::from_json(r#"[1,2,3]"#).unwrap()),
            Outbound::server_error("old_slot", "expired"),
        ];
        for event in events {
            let text = Frame::encode_outbound(&event).unwrap();
            assert_eq!(Frame::decode_outbound(&text).unwrap(), event);
        }
    }

    #[test]
    fn slot_answer_requires_valid_code() {
        let text = r#"{"event":"slot_answer","data":{"slot":"AAAA"}}"#;
        assert!(matches!(
            Frame::decode_outbound(text),
            Err(DropError::InvalidData { event: "slot_answer", .. })
        ));
    }

    #[test]
    fn encodes_inbound_for_clients() {
        let join = Inbound::RequestFromSlot {
            slot: Some("7AX0".to_string()),
        };
        let text = Frame::encode_inbound(&join).unwrap();
        assert_eq!(text, r#"{"event":"request_from_slot","data":{"slot":"7AX0"}}"#);
        assert_eq!(Frame::decode_inbound(&text).unwrap(), join);
    }
}
