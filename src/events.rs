//! Hub event catalog (spec §4.3). Events are serialized once by the
//! [`crate::broker::Broker`] and fanned out to matching subscribers.

use serde::Serialize;
use serde_json::Value;
use tracker_protocol::PlatformId;

fn unix_millis(at: std::time::SystemTime) -> u64 {
    at.duration_since(std::time::UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or(0)
}

#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum HubEvent {
    FopUpdate {
        platform: PlatformId,
        timestamp: u64,
        #[serde(flatten)]
        payload: Value,
    },
    CompetitionInitialized {
        timestamp: u64,
    },
    HubReadyBroadcast {
        timestamp: u64,
    },
    Waiting {
        timestamp: u64,
    },
    ProtocolError {
        timestamp: u64,
        #[serde(skip_serializing_if = "Option::is_none")]
        platform: Option<PlatformId>,
        reason: String,
    },
    ProtocolOk {
        timestamp: u64,
    },
    Timer {
        platform: PlatformId,
        timestamp: u64,
        #[serde(flatten)]
        payload: Value,
    },
    Decision {
        platform: PlatformId,
        timestamp: u64,
        #[serde(flatten)]
        payload: Value,
    },
}

impl HubEvent {
    pub fn now(at: std::time::SystemTime) -> u64 {
        unix_millis(at)
    }

    pub fn event_type(&self) -> &'static str {
        match self {
            HubEvent::FopUpdate { .. } => "fop_update",
            HubEvent::CompetitionInitialized { .. } => "competition_initialized",
            HubEvent::HubReadyBroadcast { .. } => "hub_ready_broadcast",
            HubEvent::Waiting { .. } => "waiting",
            HubEvent::ProtocolError { .. } => "protocol_error",
            HubEvent::ProtocolOk { .. } => "protocol_ok",
            HubEvent::Timer { .. } => "timer",
            HubEvent::Decision { .. } => "decision",
        }
    }

    pub fn platform(&self) -> Option<&str> {
        match self {
            HubEvent::FopUpdate { platform, .. }
            | HubEvent::Timer { platform, .. }
            | HubEvent::Decision { platform, .. } => Some(platform.as_str()),
            HubEvent::ProtocolError { platform, .. } => platform.as_deref(),
            HubEvent::CompetitionInitialized { .. }
            | HubEvent::HubReadyBroadcast { .. }
            | HubEvent::Waiting { .. }
            | HubEvent::ProtocolOk { .. } => None,
        }
    }

    /// The debounce key for this event, per spec §4.3 (`"<platform>-<eventType>"`).
    /// Events with no platform are never debounced.
    pub fn debounce_key(&self) -> Option<String> {
        self.platform().map(|p| format!("{p}-{}", self.event_type()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn debounce_key_only_present_for_platform_scoped_events() {
        let fop = HubEvent::FopUpdate {
            platform: "A".to_owned(),
            timestamp: 0,
            payload: Value::Null,
        };
        assert_eq!(fop.debounce_key().as_deref(), Some("A-fop_update"));

        let waiting = HubEvent::Waiting { timestamp: 0 };
        assert_eq!(waiting.debounce_key(), None);
    }

    #[test]
    fn event_type_names_match_spec_catalog() {
        assert_eq!(HubEvent::CompetitionInitialized { timestamp: 0 }.event_type(), "competition_initialized");
        assert_eq!(HubEvent::Waiting { timestamp: 0 }.event_type(), "waiting");
        assert_eq!(
            HubEvent::Decision { platform: "A".to_owned(), timestamp: 0, payload: Value::Null }.event_type(),
            "decision"
        );
    }
}
