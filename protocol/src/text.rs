//! Text frame JSON schema for the source channel (spec §4.1, §6).
//!
//! `{"version": "<semver>", "type": "<lowercase>", "payload": {...}}`.
//! Decoded once at the boundary into a tagged [`InboundText`], keeping a
//! catch-all variant for forward compatibility (spec §9).

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::version::Version;

#[derive(Debug, Clone, Deserialize)]
struct RawTextFrame {
    version: String,
    #[serde(rename = "type")]
    kind: Option<String>,
    payload: Option<Value>,
}

/// A decoded inbound text frame: version plus its typed payload.
#[derive(Debug, Clone, PartialEq)]
pub struct TextFrame {
    pub version: String,
    pub message: InboundText,
}

/// The known text message kinds, plus a catch-all for anything else —
/// unknown types are still routed through the same precondition policy.
#[derive(Debug, Clone, PartialEq)]
pub enum InboundText {
    Database(Value),
    Update(Value),
    Timer(Value),
    Decision(Value),
    Other(String, Value),
}

impl InboundText {
    pub fn kind(&self) -> &str {
        match self {
            InboundText::Database(_) => "database",
            InboundText::Update(_) => "update",
            InboundText::Timer(_) => "timer",
            InboundText::Decision(_) => "decision",
            InboundText::Other(name, _) => name,
        }
    }

    pub fn payload(&self) -> &Value {
        match self {
            InboundText::Database(p)
            | InboundText::Update(p)
            | InboundText::Timer(p)
            | InboundText::Decision(p)
            | InboundText::Other(_, p) => p,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum TextFrameError {
    /// Missing `type` or `payload` fields.
    InvalidFormat,
    /// `version` could not be parsed as a dotted triplet.
    UnparsableVersion(String),
}

/// Parses raw text-frame JSON bytes into a [`TextFrame`], without applying
/// the version-minimum policy (that's the caller's job — see
/// [`crate::reply::version_mismatch_reply`]).
pub fn parse_text_frame(raw: &str) -> Result<TextFrame, TextFrameError> {
    let parsed: RawTextFrame =
        serde_json::from_str(raw).map_err(|_| TextFrameError::InvalidFormat)?;
    let kind = parsed.kind.ok_or(TextFrameError::InvalidFormat)?;
    let payload = parsed.payload.ok_or(TextFrameError::InvalidFormat)?;

    let message = match kind.as_str() {
        "database" => InboundText::Database(payload),
        "update" => InboundText::Update(payload),
        "timer" => InboundText::Timer(payload),
        "decision" => InboundText::Decision(payload),
        other => InboundText::Other(other.to_owned(), payload),
    };

    Ok(TextFrame {
        version: parsed.version,
        message,
    })
}

/// Parses the `version` field of an already-decoded [`TextFrame`].
pub fn parsed_version(frame: &TextFrame) -> Option<Version> {
    Version::parse(&frame.version)
}

/// Reply envelope returned by the channel server for every processed frame
/// (spec §4.4).
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ReplyEnvelope {
    pub status: u16,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub missing: Option<Vec<String>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cached: Option<bool>,
}

impl ReplyEnvelope {
    pub fn ok(message: impl Into<String>) -> Self {
        Self {
            status: 200,
            message: message.into(),
            reason: None,
            missing: None,
            details: None,
            cached: None,
        }
    }

    pub fn ok_cached(message: impl Into<String>) -> Self {
        Self {
            cached: Some(true),
            ..Self::ok(message)
        }
    }

    pub fn accepted(message: impl Into<String>) -> Self {
        Self {
            status: 202,
            ..Self::ok(message)
        }
    }

    pub fn bad_request(reason: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            status: 400,
            message: message.into(),
            reason: Some(reason.into()),
            missing: None,
            details: None,
            cached: None,
        }
    }

    pub fn version_mismatch(received: &str, minimum: &str) -> Self {
        Self {
            status: 400,
            message: "Protocol version check failed".to_owned(),
            reason: Some("version_mismatch".to_owned()),
            missing: None,
            details: Some(serde_json::json!({ "received": received, "minimum": minimum })),
            cached: None,
        }
    }

    pub fn unauthenticated(message: impl Into<String>) -> Self {
        Self {
            status: 401,
            message: message.into(),
            reason: Some("unauthenticated".to_owned()),
            missing: None,
            details: None,
            cached: None,
        }
    }

    pub fn preconditions_missing(missing: Vec<String>) -> Self {
        Self {
            status: 428,
            message: "Missing preconditions".to_owned(),
            reason: Some("missing_preconditions".to_owned()),
            missing: Some(missing),
            details: None,
            cached: None,
        }
    }

    pub fn already_loading() -> Self {
        Self {
            status: 202,
            message: "database load already in progress".to_owned(),
            reason: Some("already_loading".to_owned()),
            missing: None,
            details: None,
            cached: None,
        }
    }

    pub fn invalid_data_structure(message: impl Into<String>) -> Self {
        Self {
            status: 400,
            message: message.into(),
            reason: Some("invalid_data_structure".to_owned()),
            missing: None,
            details: None,
            cached: None,
        }
    }

    pub fn internal(message: impl Into<String>) -> Self {
        Self {
            status: 500,
            message: message.into(),
            reason: Some("internal_error".to_owned()),
            missing: None,
            details: None,
            cached: None,
        }
    }

    pub fn invalid_format() -> Self {
        Self::bad_request(
            "invalid_format",
            "Invalid message format. Expected {version, type, payload}",
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_known_database_message() {
        let raw = r#"{"version":"2.0.0","type":"database","payload":{"athletes":{}}}"#;
        let frame = parse_text_frame(raw).unwrap();
        assert_eq!(frame.version, "2.0.0");
        assert_eq!(frame.message.kind(), "database");
    }

    #[test]
    fn unknown_type_routes_to_other_variant() {
        let raw = r#"{"version":"2.0.0","type":"custom_thing","payload":{}}"#;
        let frame = parse_text_frame(raw).unwrap();
        match frame.message {
            InboundText::Other(name, _) => assert_eq!(name, "custom_thing"),
            other => panic!("expected Other, got {other:?}"),
        }
    }

    #[test]
    fn missing_type_or_payload_is_invalid_format() {
        assert_eq!(
            parse_text_frame(r#"{"version":"2.0.0","payload":{}}"#),
            Err(TextFrameError::InvalidFormat)
        );
        assert_eq!(
            parse_text_frame(r#"{"version":"2.0.0","type":"update"}"#),
            Err(TextFrameError::InvalidFormat)
        );
    }

    #[test]
    fn reply_envelope_serializes_only_present_fields() {
        let reply = ReplyEnvelope::ok("Update processed");
        let json = serde_json::to_value(&reply).unwrap();
        assert_eq!(json["status"], 200);
        assert!(json.get("missing").is_none());
        assert!(json.get("cached").is_none());
    }

    #[test]
    fn preconditions_missing_lists_items() {
        let reply = ReplyEnvelope::preconditions_missing(vec![
            "database".to_owned(),
            "translations".to_owned(),
            "flags".to_owned(),
        ]);
        assert_eq!(reply.status, 428);
        assert_eq!(
            reply.missing,
            Some(vec![
                "database".to_owned(),
                "translations".to_owned(),
                "flags".to_owned()
            ])
        );
    }

    #[test]
    fn version_mismatch_reply_matches_scenario_s1() {
        let reply = ReplyEnvelope::version_mismatch("1.9.0", "2.0.0");
        assert_eq!(reply.status, 400);
        assert_eq!(reply.message, "Protocol version check failed");
        assert_eq!(reply.details, Some(serde_json::json!({"received": "1.9.0", "minimum": "2.0.0"})));
    }
}
