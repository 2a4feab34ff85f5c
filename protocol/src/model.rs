//! Competition data model (spec §3): the database snapshot, athlete
//! records, and the per-platform update state the Hub merges into.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::BTreeMap;

/// Short opaque string identifying a field of play. Case-sensitive.
pub type PlatformId = String;

/// Opaque, non-empty, source-assigned key. May look numeric or negative;
/// treated as an opaque string throughout.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct AthleteKey(pub String);

impl AthleteKey {
    pub fn new(raw: impl Into<String>) -> Option<Self> {
        let raw = raw.into();
        if raw.is_empty() {
            None
        } else {
            Some(Self(raw))
        }
    }
}

/// Declaration / change / actual-lift quadruple for a single attempt.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct AttemptFields {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub declaration: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub change1: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub change2: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub actual_lift: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub automatic_progression: Option<String>,
}

impl AttemptFields {
    /// The weight currently requested for this attempt: the most recent
    /// change overrides the declaration. Raw fields are the source of
    /// truth; this is the one derived view over them (spec §3).
    pub fn requested_weight(&self) -> Option<&str> {
        self.change2
            .as_deref()
            .or(self.change1.as_deref())
            .or(self.declaration.as_deref())
            .filter(|w| !w.is_empty())
    }

    pub fn has_been_lifted(&self) -> bool {
        self.actual_lift.as_deref().is_some_and(|v| !v.is_empty())
    }
}

/// Lift type key, selecting which header/label is displayed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum LiftType {
    Snatch,
    CleanJerk,
}

/// V2 wire-shaped athlete record. Attempt arrays are indexed 0..3
/// (attempt 1, 2, 3). Unknown incoming fields are preserved in `extra` so
/// forward compatibility doesn't require a type discipline trade-off
/// (spec §9).
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct AthleteRecord {
    pub key: AthleteKey,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub full_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub team: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub category_code: Option<String>,

    #[serde(default)]
    pub snatch: [AttemptFields; 3],
    #[serde(default)]
    pub clean_and_jerk: [AttemptFields; 3],

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub best_snatch: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub best_clean_and_jerk: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub total: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rank_snatch: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rank_clean_and_jerk: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rank_total: Option<i64>,

    #[serde(default)]
    pub participations: Vec<Value>,

    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

/// Competition metadata, reference data, and the athlete roster.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
#[serde(rename_all = "camelCase")]
pub struct Database {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub checksum: Option<String>,
    #[serde(default)]
    pub competition: Value,
    #[serde(default)]
    pub athletes: BTreeMap<AthleteKey, AthleteRecord>,
    #[serde(default)]
    pub age_groups: Value,
    #[serde(default)]
    pub categories: Value,
    #[serde(default)]
    pub platforms: Value,
    #[serde(default)]
    pub teams: Value,
    #[serde(default)]
    pub sessions: Value,
}

impl Database {
    pub fn is_empty_snapshot(&self) -> bool {
        self.athletes.is_empty()
    }
}

/// Per-platform merged update state (spec §3/§4.3).
///
/// Only the fields the Hub's own logic depends on are typed; everything
/// else the source sends for a given update lands in `fields` so no
/// information is lost across a merge.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct FopState {
    pub platform: PlatformId,
    #[serde(default)]
    pub session_done: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub group_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub current_athlete_key: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub fop_state: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_update_millis: Option<u64>,
    /// Spill map for every other field the source sent in its most recent
    /// event, merged later-wins.
    #[serde(flatten)]
    pub fields: Map<String, Value>,
}

impl FopState {
    pub fn has_no_active_session(&self) -> bool {
        self.fop_state.as_deref() == Some("INACTIVE") && self.current_athlete_key.is_none()
    }
}

/// A bundle of translation keys for one locale.
pub type TranslationMap = BTreeMap<String, String>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn athlete_key_rejects_empty_string() {
        assert!(AthleteKey::new("").is_none());
        assert!(AthleteKey::new("-17").is_some());
    }

    #[test]
    fn requested_weight_prefers_latest_change() {
        let mut a = AttemptFields {
            declaration: Some("100".to_owned()),
            ..Default::default()
        };
        assert_eq!(a.requested_weight(), Some("100"));
        a.change1 = Some("102".to_owned());
        assert_eq!(a.requested_weight(), Some("102"));
        a.change2 = Some("105".to_owned());
        assert_eq!(a.requested_weight(), Some("105"));
    }

    #[test]
    fn has_been_lifted_checks_actual_lift_non_empty() {
        let mut a = AttemptFields::default();
        assert!(!a.has_been_lifted());
        a.actual_lift = Some(String::new());
        assert!(!a.has_been_lifted());
        a.actual_lift = Some("105".to_owned());
        assert!(a.has_been_lifted());
    }

    #[test]
    fn fop_state_no_active_session_requires_inactive_and_no_athlete() {
        let mut s = FopState {
            platform: "A".to_owned(),
            fop_state: Some("INACTIVE".to_owned()),
            ..Default::default()
        };
        assert!(s.has_no_active_session());
        s.current_athlete_key = Some("k1".to_owned());
        assert!(!s.has_no_active_session());
    }

    #[test]
    fn athlete_record_round_trips_through_json_with_extra_fields() {
        let json = serde_json::json!({
            "key": "k1",
            "fullName": "Jane Doe",
            "snatch": [
                {"declaration": "80"}, {}, {}
            ],
            "cleanAndJerk": [{}, {}, {}],
            "someFutureField": 42
        });
        let record: AthleteRecord = serde_json::from_value(json).unwrap();
        assert_eq!(record.key, AthleteKey("k1".to_owned()));
        assert_eq!(record.snatch[0].declaration.as_deref(), Some("80"));
        assert_eq!(record.extra.get("someFutureField"), Some(&Value::from(42)));
    }
}
