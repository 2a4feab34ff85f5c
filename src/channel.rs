//! Channel Server (spec §4.4): accepts the source's framed WebSocket
//! channel, classifies frames, applies the authentication and version
//! policy, and replies to each with a status envelope.
//!
//! The policy/dispatch logic ([`handle_text`], [`handle_binary`]) is kept
//! free of any socket I/O so it can be exercised directly in tests; the
//! socket loop at the bottom just drives it and performs the actual reads
//! and writes, separating protocol handling from the `axum` WebSocket
//! plumbing.

use std::io::Read;
use std::time::{Duration, SystemTime};

use axum::extract::ws::{CloseFrame, Message, WebSocket, WebSocketUpgrade};
use axum::extract::State;
use axum::response::IntoResponse;
use tracing::{debug, info, warn};

use tracker_protocol::{
    binary_types, decode_binary_frame, parse_text_frame, parsed_version, BinaryFrame, InboundText,
    ReplyEnvelope, TextFrame, TextFrameError,
};

use crate::assets::{self, AssetKind};
use crate::hub::{HubError, IngestOutcome};
use crate::samples;
use crate::state::AppState;

/// Idle timeout before a source channel's silence is treated as a
/// disconnect (spec §5); triggers `Hub::refresh()`.
const IDLE_TIMEOUT: Duration = Duration::from_secs(120);

/// Policy close code for a version mismatch (spec §4.1).
const POLICY_VERSION_MISMATCH: u16 = 4001;
/// Policy close code for an authentication rejection (spec §4.4).
const POLICY_UNAUTHENTICATED: u16 = 4002;

/// What the socket loop should do after a frame was processed.
pub enum FrameOutcome {
    Reply(ReplyEnvelope),
    ReplyThenClose(ReplyEnvelope, u16),
}

impl FrameOutcome {
    fn reply(&self) -> &ReplyEnvelope {
        match self {
            FrameOutcome::Reply(r) | FrameOutcome::ReplyThenClose(r, _) => r,
        }
    }
}

/// Per-channel handshake/session state, tracked by the socket loop and
/// threaded through the pure dispatch functions.
pub struct ChannelSession {
    pub authenticated: bool,
    pub first_text_frame: bool,
}

impl ChannelSession {
    pub fn new(requires_auth: bool) -> Self {
        Self {
            authenticated: !requires_auth,
            first_text_frame: true,
        }
    }
}

/// Handles one textual frame: format + version check, the one-time auth
/// handshake, then routing to the Hub.
pub async fn handle_text(state: &AppState, raw: &str, session: &mut ChannelSession) -> FrameOutcome {
    let frame = match parse_text_frame(raw) {
        Ok(frame) => frame,
        Err(TextFrameError::InvalidFormat) | Err(TextFrameError::UnparsableVersion(_)) => {
            return FrameOutcome::Reply(ReplyEnvelope::invalid_format());
        }
    };

    if let Some(outcome) = check_version(state, &frame).await {
        return outcome;
    }

    if session.first_text_frame {
        session.first_text_frame = false;
        if let Some(secret) = &state.config.secret {
            if !session.authenticated {
                let presented = frame.message.payload().get("updateKey").and_then(serde_json::Value::as_str);
                if presented == Some(secret.as_str()) {
                    session.authenticated = true;
                } else {
                    return FrameOutcome::ReplyThenClose(
                        ReplyEnvelope::unauthenticated("missing or invalid updateKey"),
                        POLICY_UNAUTHENTICATED,
                    );
                }
            }
        }
    }

    if state.config.learning_mode {
        samples::capture(&state.config.asset_root, frame.message.kind(), raw, SystemTime::now()).await;
    }

    FrameOutcome::Reply(dispatch_text_message(state, &frame.message).await)
}

async fn check_version(state: &AppState, frame: &TextFrame) -> Option<FrameOutcome> {
    match parsed_version(frame) {
        Some(version) if version.satisfies_minimum(state.hub.min_version()) => {
            state.hub.report_protocol_ok().await;
            None
        }
        _ => {
            state.hub.report_protocol_error(None, "version_mismatch").await;
            Some(FrameOutcome::ReplyThenClose(
                ReplyEnvelope::version_mismatch(&frame.version, &state.hub.min_version().to_string()),
                POLICY_VERSION_MISMATCH,
            ))
        }
    }
}

async fn dispatch_text_message(state: &AppState, message: &InboundText) -> ReplyEnvelope {
    match message {
        InboundText::Database(payload) => handle_database_message(state, payload.clone()).await,
        InboundText::Update(payload) => handle_event_message(state, payload, "update").await,
        InboundText::Timer(payload) => handle_event_message(state, payload, "timer").await,
        InboundText::Decision(payload) => handle_event_message(state, payload, "decision").await,
        InboundText::Other(_, payload) => handle_event_message(state, payload, "update").await,
    }
}

async fn handle_database_message(state: &AppState, payload: serde_json::Value) -> ReplyEnvelope {
    let db: tracker_protocol::Database = match serde_json::from_value(payload) {
        Ok(db) => db,
        Err(err) => return ReplyEnvelope::invalid_data_structure(err.to_string()),
    };
    reply_for_ingest(state.hub.ingest_database(db).await)
}

async fn handle_event_message(state: &AppState, payload: &serde_json::Value, kind: &str) -> ReplyEnvelope {
    let Some(platform) = payload.get("fop").and_then(serde_json::Value::as_str) else {
        return ReplyEnvelope::bad_request("missing_fop", "payload must include a \"fop\" platform identifier");
    };
    match state.hub.ingest_update(platform, kind, payload.clone()).await {
        Ok(()) => ReplyEnvelope::ok(match kind {
            "timer" => "Timer processed",
            "decision" => "Decision processed",
            _ => "Update processed",
        }),
        Err(HubError::MissingPreconditions(missing)) => ReplyEnvelope::preconditions_missing(missing),
        Err(other) => ReplyEnvelope::internal(other.to_string()),
    }
}

fn reply_for_ingest(result: Result<IngestOutcome, HubError>) -> ReplyEnvelope {
    match result {
        Ok(IngestOutcome::Accepted) => ReplyEnvelope::ok("Database processed"),
        Ok(IngestOutcome::Cached) => ReplyEnvelope::ok_cached("Database unchanged"),
        Ok(IngestOutcome::MetadataOnly) => {
            ReplyEnvelope::accepted("database_zip expected within the configured timeout")
        }
        Err(HubError::AlreadyLoading) => ReplyEnvelope::already_loading(),
        Err(HubError::InvalidDataStructure(reason)) => ReplyEnvelope::invalid_data_structure(reason),
        Err(HubError::MissingPreconditions(_)) => {
            ReplyEnvelope::internal("unexpected missing_preconditions from ingestDatabase")
        }
    }
}

/// Handles one binary frame: auth gate, then type-based routing to the
/// Asset Extractor or the database ingest path.
pub async fn handle_binary(state: &AppState, bytes: &[u8], session: &ChannelSession) -> FrameOutcome {
    if !session.authenticated {
        return FrameOutcome::ReplyThenClose(
            ReplyEnvelope::unauthenticated("binary frames require an authenticated channel"),
            POLICY_UNAUTHENTICATED,
        );
    }

    let frame = match decode_binary_frame(bytes) {
        Ok(frame) => frame,
        Err(err) => return FrameOutcome::Reply(ReplyEnvelope::bad_request("malformed_frame", err.to_string())),
    };

    if looks_database_shaped(&frame) {
        debug!("frame pre-peek detected a database-shaped binary frame");
    }

    let reply = match frame.type_name {
        t if t == binary_types::FLAGS_ZIP || t == binary_types::FLAGS_LEGACY => {
            extract_and_report(state, frame.payload, AssetKind::Flags).await
        }
        t if t == binary_types::PICTURES => extract_and_report(state, frame.payload, AssetKind::Pictures).await,
        t if t == binary_types::STYLES => extract_and_report(state, frame.payload, AssetKind::Styles).await,
        t if t == binary_types::TRANSLATIONS_ZIP => handle_translations_zip(state, frame.payload).await,
        t if t == binary_types::DATABASE_ZIP => handle_database_zip(state, frame.payload).await,
        other => {
            warn!(type_name = %other, "unknown binary frame type");
            ReplyEnvelope::bad_request("unknown_binary_type", format!("unknown binary type: {other}"))
        }
    };
    FrameOutcome::Reply(reply)
}

/// The pre-peek from spec §4.4: a type name starting with `data` implies a
/// `database`/`database_zip` frame. The connection-lifecycle reset itself
/// already runs once per process at accept time ([`crate::hub::Hub::on_source_connected`]);
/// this only lets the server log the moment real database content starts
/// flowing.
fn looks_database_shaped(frame: &BinaryFrame<'_>) -> bool {
    frame.type_name.starts_with("data")
}

async fn extract_and_report(state: &AppState, payload: &[u8], kind: AssetKind) -> ReplyEnvelope {
    match assets::extract_zip(payload, &state.config.asset_root, kind) {
        Ok(report) => {
            match kind {
                AssetKind::Flags => state.hub.set_flags_loaded().await,
                AssetKind::Pictures => state.hub.set_pictures_loaded().await,
                AssetKind::Styles => state.hub.set_styles_loaded().await,
                AssetKind::Translations | AssetKind::Database => {}
            }
            ReplyEnvelope::ok(format!("{} files extracted", report.files_written.len()))
        }
        Err(err) => {
            warn!(error = %err, "asset extraction failed");
            ReplyEnvelope::internal(err.to_string())
        }
    }
}

async fn handle_translations_zip(state: &AppState, payload: &[u8]) -> ReplyEnvelope {
    let parsed = match assets::extract_translations(payload) {
        Ok(parsed) => parsed,
        Err(err) => return ReplyEnvelope::internal(err.to_string()),
    };
    if let Some(checksum) = &parsed.checksum {
        if state.hub.translations_checksum_matches(checksum).await {
            return ReplyEnvelope::ok_cached("translations unchanged");
        }
    }
    for (locale, map) in parsed.locales {
        state.hub.set_translations(&locale, map, None).await;
    }
    state.hub.record_translations_checksum(parsed.checksum).await;
    ReplyEnvelope::ok("translations extracted")
}

/// `database_zip` is documented by the spec only as "a zip archive"; by
/// analogy with the `translations_zip` single-entry convention, it's
/// expected to contain one `database.json` entry holding the full
/// snapshot (see DESIGN.md).
async fn handle_database_zip(state: &AppState, payload: &[u8]) -> ReplyEnvelope {
    let cursor = std::io::Cursor::new(payload);
    let mut archive = match zip::ZipArchive::new(cursor) {
        Ok(archive) => archive,
        Err(err) => return ReplyEnvelope::internal(err.to_string()),
    };
    let mut entry = match archive.by_name("database.json") {
        Ok(entry) => entry,
        Err(_) => return ReplyEnvelope::invalid_data_structure("database_zip missing a database.json entry"),
    };
    let mut contents = String::new();
    if entry.read_to_string(&mut contents).is_err() {
        return ReplyEnvelope::invalid_data_structure("database.json entry is not valid UTF-8");
    }
    drop(entry);
    let db: tracker_protocol::Database = match serde_json::from_str(&contents) {
        Ok(db) => db,
        Err(err) => return ReplyEnvelope::invalid_data_structure(err.to_string()),
    };
    reply_for_ingest(state.hub.ingest_database(db).await)
}

pub async fn source_ws_handler(ws: WebSocketUpgrade, State(state): State<AppState>) -> impl IntoResponse {
    ws.on_upgrade(move |socket| handle_source_socket(socket, state))
}

async fn handle_source_socket(mut socket: WebSocket, state: AppState) {
    state.hub.on_source_connected().await;
    info!("source channel connected");

    let mut session = ChannelSession::new(state.config.secret.is_some());

    loop {
        match tokio::time::timeout(IDLE_TIMEOUT, socket.recv()).await {
            Ok(Some(Ok(Message::Text(text)))) => {
                let outcome = handle_text(&state, &text, &mut session).await;
                if apply_outcome(&mut socket, outcome).await {
                    break;
                }
            }
            Ok(Some(Ok(Message::Binary(bytes)))) => {
                let outcome = handle_binary(&state, &bytes, &session).await;
                if apply_outcome(&mut socket, outcome).await {
                    break;
                }
            }
            Ok(Some(Ok(Message::Ping(data)))) => {
                let _ = socket.send(Message::Pong(data)).await;
            }
            Ok(Some(Ok(Message::Pong(_)))) => {}
            Ok(Some(Ok(Message::Close(_)))) | Ok(None) => {
                info!("source channel closed by peer");
                break;
            }
            Ok(Some(Err(err))) => {
                warn!(error = %err, "source channel transport error");
                break;
            }
            Err(_) => {
                warn!("source channel idle timeout");
                break;
            }
        }
    }

    state.hub.refresh().await;
    info!("source channel disconnected");
}

/// Sends the reply, and if the outcome calls for it, closes the socket
/// with the policy code. Returns whether the socket loop should stop.
async fn apply_outcome(socket: &mut WebSocket, outcome: FrameOutcome) -> bool {
    let should_close = matches!(outcome, FrameOutcome::ReplyThenClose(_, _));
    if let Ok(json) = serde_json::to_string(outcome.reply()) {
        let _ = socket.send(Message::Text(json.into())).await;
    }
    if let FrameOutcome::ReplyThenClose(_, code) = outcome {
        let _ = socket
            .send(Message::Close(Some(CloseFrame {
                code,
                reason: "policy violation".into(),
            })))
            .await;
    }
    should_close
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Config;

    fn test_state(secret: Option<&str>) -> AppState {
        AppState::new(Config {
            secret: secret.map(str::to_owned),
            asset_root: std::env::temp_dir().join("tracker-channel-tests"),
            bind_addr: "127.0.0.1:0".to_owned(),
            learning_mode: false,
            source_proxy_url: None,
            min_version: "2.0.0".to_owned(),
            database_zip_timeout_secs: 5,
        })
    }

    #[tokio::test]
    async fn version_mismatch_closes_with_policy_code_and_emits_protocol_error() {
        let state = test_state(None);
        let mut session = ChannelSession::new(false);
        let raw = r#"{"version":"1.9.0","type":"database","payload":{"athletes":{}}}"#;
        let outcome = handle_text(&state, raw, &mut session).await;
        match outcome {
            FrameOutcome::ReplyThenClose(reply, code) => {
                assert_eq!(reply.status, 400);
                assert_eq!(reply.message, "Protocol version check failed");
                assert_eq!(code, POLICY_VERSION_MISMATCH);
            }
            FrameOutcome::Reply(_) => panic!("expected a close outcome"),
        }
        assert_eq!(state.hub.counters().await.protocol_errors, 1);
        assert!(state.hub.get_database_state().await.is_none());
    }

    #[tokio::test]
    async fn missing_preconditions_still_creates_platform_state() {
        let state = test_state(None);
        let mut session = ChannelSession::new(false);
        let raw = r#"{"version":"2.0.0","type":"update","payload":{"fop":"A","uiEvent":"ATHLETE_UPDATE"}}"#;
        let outcome = handle_text(&state, raw, &mut session).await;
        match outcome {
            FrameOutcome::Reply(reply) => {
                assert_eq!(reply.status, 428);
                assert_eq!(
                    reply.missing,
                    Some(vec!["database".to_owned(), "translations".to_owned(), "flags".to_owned()])
                );
            }
            FrameOutcome::ReplyThenClose(..) => panic!("missing preconditions must not close the channel"),
        }
        assert!(state.hub.get_fop_update("A").await.is_some());
    }

    #[tokio::test]
    async fn unauthenticated_first_frame_without_update_key_is_rejected_and_closes() {
        let state = test_state(Some("s3cr3t"));
        let mut session = ChannelSession::new(true);
        let raw = r#"{"version":"2.0.0","type":"database","payload":{"athletes":{}}}"#;
        let outcome = handle_text(&state, raw, &mut session).await;
        match outcome {
            FrameOutcome::ReplyThenClose(reply, code) => {
                assert_eq!(reply.status, 401);
                assert_eq!(code, POLICY_UNAUTHENTICATED);
            }
            FrameOutcome::Reply(_) => panic!("expected unauthenticated close"),
        }
    }

    #[tokio::test]
    async fn correct_update_key_on_first_frame_authenticates_the_channel() {
        let state = test_state(Some("s3cr3t"));
        let mut session = ChannelSession::new(true);
        let raw = r#"{"version":"2.0.0","type":"database","payload":{"athletes":{},"updateKey":"s3cr3t"}}"#;
        let outcome = handle_text(&state, raw, &mut session).await;
        assert!(matches!(outcome, FrameOutcome::Reply(_)));
        assert!(session.authenticated);
    }

    #[tokio::test]
    async fn binary_frame_before_authentication_is_rejected() {
        let state = test_state(Some("s3cr3t"));
        let session = ChannelSession::new(true);
        let outcome = handle_binary(&state, &[0, 0, 0, 0], &session).await;
        match outcome {
            FrameOutcome::ReplyThenClose(reply, code) => {
                assert_eq!(reply.status, 401);
                assert_eq!(code, POLICY_UNAUTHENTICATED);
            }
            FrameOutcome::Reply(_) => panic!("expected unauthenticated close"),
        }
    }

    #[tokio::test]
    async fn empty_database_text_frame_is_accepted_as_metadata_only() {
        let state = test_state(None);
        let mut session = ChannelSession::new(false);
        let raw = r#"{"version":"2.0.0","type":"database","payload":{"competition":{"name":"Test Cup"},"athletes":{}}}"#;
        let outcome = handle_text(&state, raw, &mut session).await;
        match outcome {
            FrameOutcome::Reply(reply) => assert_eq!(reply.status, 202),
            FrameOutcome::ReplyThenClose(..) => panic!("metadata-only database frame must not close"),
        }
    }
}
