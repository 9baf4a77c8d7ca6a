use super::constants::{ERROR_EVENT, INTERNAL_FIELDS};
use crate::types::Result;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use uuid::Uuid;

/// The unit exchanged through the relay.
///
/// Every frame carries a `type` tag identifying the semantic event, an
/// optional `event_id` correlation id, and whatever payload fields the
/// `type` defines. Payload fields are carried verbatim; the relay never
/// interprets them.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct RelayMessage {
    #[serde(rename = "type")]
    pub kind: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub event_id: Option<String>,
    #[serde(flatten)]
    pub payload: Map<String, Value>,
}

impl RelayMessage {
    pub fn new(kind: impl Into<String>) -> Self {
        Self {
            kind: kind.into(),
            event_id: None,
            payload: Map::new(),
        }
    }

    /// Parses a raw inbound frame.
    pub fn from_text(raw: &str) -> Result<Self> {
        Ok(serde_json::from_str(raw)?)
    }

    pub fn to_text(&self) -> Result<String> {
        Ok(serde_json::to_string(self)?)
    }

    /// Removes fields that are not part of the upstream contract.
    pub fn strip_internal_fields(&mut self) {
        for field in INTERNAL_FIELDS {
            self.payload.remove(field);
        }
    }

    /// Assigns a generated `event_id` if the client did not provide one.
    pub fn ensure_event_id(&mut self) {
        if self.event_id.is_none() {
            self.event_id = Some(Uuid::new_v4().to_string());
        }
    }

    /// Builds an error frame of shape
    /// `{type: "error", event_id, error: {type, message, code}}`.
    pub fn error_frame(error_type: &str, message: &str, code: &str) -> Self {
        let mut payload = Map::new();
        payload.insert(
            "error".to_string(),
            serde_json::json!({
                "type": error_type,
                "message": message,
                "code": code,
            }),
        );
        Self {
            kind: ERROR_EVENT.to_string(),
            event_id: Some(Uuid::new_v4().to_string()),
            payload,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::constants::{error_codes, error_types};

    #[test]
    fn test_parse_preserves_payload_fields() {
        let message =
            RelayMessage::from_text(r#"{"type":"conversation.item.create","item":{"id":"abc"}}"#)
                .unwrap();
        assert_eq!(message.kind, "conversation.item.create");
        assert_eq!(message.event_id, None);
        assert_eq!(message.payload["item"]["id"], "abc");
    }

    #[test]
    fn test_strip_internal_fields() {
        let mut message =
            RelayMessage::from_text(r#"{"type":"audio.start","isProcessing":true,"delta":"x"}"#)
                .unwrap();
        message.strip_internal_fields();

        let json = message.to_text().unwrap();
        assert!(!json.contains("isProcessing"));
        assert!(json.contains(r#""delta":"x""#));
    }

    #[test]
    fn test_ensure_event_id_generates_once() {
        let mut message = RelayMessage::new("audio.start");
        message.ensure_event_id();
        let first = message.event_id.clone();
        assert!(first.is_some());

        message.ensure_event_id();
        assert_eq!(message.event_id, first);
    }

    #[test]
    fn test_ensure_event_id_keeps_client_id() {
        let mut message =
            RelayMessage::from_text(r#"{"type":"audio.start","event_id":"evt_1"}"#).unwrap();
        message.ensure_event_id();
        assert_eq!(message.event_id.as_deref(), Some("evt_1"));
    }

    #[test]
    fn test_error_frame_shape() {
        let frame = RelayMessage::error_frame(
            error_types::INVALID_REQUEST,
            "Error processing message",
            error_codes::PROCESSING,
        );
        assert_eq!(frame.kind, "error");
        assert!(frame.event_id.is_some());

        let error = &frame.payload["error"];
        assert_eq!(error["type"], "invalid_request_error");
        assert_eq!(error["message"], "Error processing message");
        assert_eq!(error["code"], "processing_error");
    }

    #[test]
    fn test_malformed_frame_is_parse_error() {
        assert!(RelayMessage::from_text("not json").is_err());
        assert!(RelayMessage::from_text(r#"{"no_type_field":1}"#).is_err());
    }
}
