//! Competition Hub (spec §4.3): the authoritative in-memory state for the
//! database snapshot, per-platform update state, translations, and asset
//! readiness flags.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant, SystemTime};

use serde_json::Value;
use thiserror::Error;
use tokio::sync::RwLock;
use tracing::{info, warn};

use tracker_protocol::{preconditions, Database, FopState, PlatformId, TranslationMap, Version};

use crate::broker::Broker;
use crate::cache::EpochRegistry;
use crate::events::HubEvent;

/// Suppresses duplicate precondition re-requests from the same source
/// within this window (spec §4.3, §5).
const PRECONDITION_REQUEST_WINDOW: Duration = Duration::from_secs(1);
/// Debounce window for outgoing Hub events keyed by `"<platform>-<type>"`.
const DEBOUNCE_WINDOW: Duration = Duration::from_millis(100);
/// Without a checksum, a database snapshot ingested within this window of
/// the last one is treated as a no-op (spec §4.3).
const RECENTLY_LOADED_WINDOW: Duration = Duration::from_secs(2);

#[derive(Debug, Error, PartialEq, Eq)]
pub enum HubError {
    #[error("database load already in progress")]
    AlreadyLoading,
    #[error("invalid data structure: {0}")]
    InvalidDataStructure(String),
    #[error("missing preconditions")]
    MissingPreconditions(Vec<String>),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IngestOutcome {
    Accepted,
    Cached,
    /// A textual `database` frame with no athletes (spec §4.4): metadata
    /// only, a binary `database_zip` is expected to follow.
    MetadataOnly,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Inactive,
    Active,
    Done,
}

#[derive(Debug, Clone)]
pub struct PlatformRecord {
    pub fop_state: FopState,
    pub session_state: SessionState,
    pub last_update: SystemTime,
}

#[derive(Debug, Default, Clone, Copy)]
pub struct HubCounters {
    pub databases_ingested: u64,
    pub updates_ingested: u64,
    pub protocol_errors: u64,
}

struct HubInner {
    database: Option<Database>,
    last_database_checksum: Option<String>,
    last_database_loaded_at: Option<Instant>,
    loading_started_at: Option<Instant>,

    translations: HashMap<String, TranslationMap>,
    last_translations_checksum: Option<String>,

    flags_loaded: bool,
    pictures_loaded: bool,
    styles_loaded: bool,

    platforms: HashMap<PlatformId, PlatformRecord>,

    last_requested_at: HashMap<String, Instant>,
    debounce_last_fired: HashMap<String, Instant>,

    counters: HubCounters,
    hub_ready_emitted: bool,
}

impl HubInner {
    fn new() -> Self {
        Self {
            database: None,
            last_database_checksum: None,
            last_database_loaded_at: None,
            loading_started_at: None,
            translations: HashMap::new(),
            last_translations_checksum: None,
            flags_loaded: false,
            pictures_loaded: false,
            styles_loaded: false,
            platforms: HashMap::new(),
            last_requested_at: HashMap::new(),
            debounce_last_fired: HashMap::new(),
            counters: HubCounters::default(),
            hub_ready_emitted: false,
        }
    }

    fn missing_preconditions(&self) -> Vec<String> {
        let mut missing = Vec::new();
        if self.database.is_none() {
            missing.push(preconditions::DATABASE.to_owned());
        }
        if self.translations.is_empty() {
            missing.push(preconditions::TRANSLATIONS.to_owned());
        }
        // Open Question 1 (spec §9): always list flags until flagsLoaded,
        // not only on the first request.
        if !self.flags_loaded {
            missing.push(preconditions::FLAGS.to_owned());
        }
        missing
    }

    fn record_requested(&mut self, item: &str, now: Instant) {
        let stale = self
            .last_requested_at
            .get(item)
            .is_none_or(|at| now.duration_since(*at) >= PRECONDITION_REQUEST_WINDOW);
        if stale {
            self.last_requested_at.insert(item.to_owned(), now);
        }
    }
}

/// The Competition Hub. Cheaply cloneable; internal state is behind an
/// async `RwLock` so reads don't block each other.
#[derive(Clone)]
pub struct Hub {
    inner: Arc<RwLock<HubInner>>,
    broker: Arc<Broker>,
    epoch: Arc<EpochRegistry>,
    min_version: Version,
    seen_first_connection: Arc<AtomicBool>,
}

impl Hub {
    pub fn new(broker: Arc<Broker>, epoch: Arc<EpochRegistry>, min_version: Version) -> Self {
        Self {
            inner: Arc::new(RwLock::new(HubInner::new())),
            broker,
            epoch,
            min_version,
            seen_first_connection: Arc::new(AtomicBool::new(false)),
        }
    }

    pub fn min_version(&self) -> &Version {
        &self.min_version
    }

    fn emit(&self, inner: &mut HubInner, event: HubEvent, now: Instant) {
        if let Some(key) = event.debounce_key() {
            if let Some(last) = inner.debounce_last_fired.get(&key) {
                if now.duration_since(*last) < DEBOUNCE_WINDOW {
                    return;
                }
            }
            inner.debounce_last_fired.insert(key, now);
        }
        self.broker.dispatch(&event);
    }

    /// Emits `hub_ready_broadcast` the first time every precondition
    /// (database, translations, flags) becomes satisfied (spec §4.3, §7).
    /// Re-armed by [`Hub::refresh`] so a reconnect-then-reload cycle fires
    /// it again, mirroring how `competition_initialized` re-fires on the
    /// next database load after a disconnect clears it.
    fn maybe_emit_hub_ready(&self, inner: &mut HubInner, now: Instant) {
        if inner.hub_ready_emitted || !inner.missing_preconditions().is_empty() {
            return;
        }
        inner.hub_ready_emitted = true;
        self.emit(inner, HubEvent::HubReadyBroadcast { timestamp: HubEvent::now(SystemTime::now()) }, now);
    }

    /// Connection lifecycle policy (spec §4.3): on the first source
    /// connection after process start, wipe any stale state and bump the
    /// cache epoch. A no-op on subsequent reconnects.
    pub async fn on_source_connected(&self) {
        if self
            .seen_first_connection
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .is_err()
        {
            return;
        }
        let mut inner = self.inner.write().await;
        inner.database = None;
        inner.last_database_checksum = None;
        inner.translations.clear();
        inner.last_translations_checksum = None;
        inner.flags_loaded = false;
        inner.pictures_loaded = false;
        inner.styles_loaded = false;
        drop(inner);
        self.epoch.bump();
        info!("first source connection: reset stale state and bumped cache epoch");
    }

    /// `refresh()` (spec §4.3): used on source disconnect. Clears the
    /// published database snapshot and returns every platform to
    /// `INACTIVE`, then emits `waiting`.
    pub async fn refresh(&self) {
        let mut inner = self.inner.write().await;
        inner.database = None;
        inner.loading_started_at = None;
        inner.hub_ready_emitted = false;
        for record in inner.platforms.values_mut() {
            record.session_state = SessionState::Inactive;
        }
        let now = Instant::now();
        self.emit(&mut inner, HubEvent::Waiting { timestamp: HubEvent::now(SystemTime::now()) }, now);
    }

    pub async fn ingest_database(&self, db: Database) -> Result<IngestOutcome, HubError> {
        if db.is_empty_snapshot() {
            let mut inner = self.inner.write().await;
            inner.database = Some(db);
            return Ok(IngestOutcome::MetadataOnly);
        }

        {
            let mut inner = self.inner.write().await;
            if inner.loading_started_at.is_some() {
                return Err(HubError::AlreadyLoading);
            }
            if let Some(checksum) = db.checksum.as_deref() {
                if inner.last_database_checksum.as_deref() == Some(checksum) {
                    return Ok(IngestOutcome::Cached);
                }
            } else if let Some(last) = inner.last_database_loaded_at {
                if last.elapsed() < RECENTLY_LOADED_WINDOW {
                    return Ok(IngestOutcome::Cached);
                }
            }
            inner.loading_started_at = Some(Instant::now());
        }

        // Shape validation happens outside the lock; the load token held
        // above keeps concurrent ingests out while this runs (spec §9).
        if !db.competition.is_null() && !db.competition.is_object() {
            let mut inner = self.inner.write().await;
            inner.loading_started_at = None;
            return Err(HubError::InvalidDataStructure("competition field must be an object".to_owned()));
        }

        let mut inner = self.inner.write().await;
        let checksum = db.checksum.clone();
        let first_load = inner.database.is_none();
        inner.database = Some(db);
        inner.last_database_checksum = checksum;
        inner.last_database_loaded_at = Some(Instant::now());
        inner.loading_started_at = None;
        inner.counters.databases_ingested += 1;
        let now = Instant::now();
        if first_load {
            self.emit(&mut inner, HubEvent::CompetitionInitialized { timestamp: HubEvent::now(SystemTime::now()) }, now);
        }
        self.maybe_emit_hub_ready(&mut inner, now);
        self.epoch.bump();
        Ok(IngestOutcome::Accepted)
    }

    /// `ingestUpdate` (spec §4.3). `kind` is one of `update`/`timer`/`decision`
    /// or an unknown type routed through the same precondition policy.
    pub async fn ingest_update(&self, platform: &str, kind: &str, payload: Value) -> Result<(), HubError> {
        let mut inner = self.inner.write().await;
        let now_instant = Instant::now();
        let now = SystemTime::now();

        merge_platform_state(&mut inner, platform, &payload, now);

        let missing = inner.missing_preconditions();
        if !missing.is_empty() {
            for item in &missing {
                inner.record_requested(item, now_instant);
            }
            return Err(HubError::MissingPreconditions(missing));
        }

        inner.counters.updates_ingested += 1;
        let event = match kind {
            "timer" => HubEvent::Timer { platform: platform.to_owned(), timestamp: HubEvent::now(now), payload },
            "decision" => HubEvent::Decision { platform: platform.to_owned(), timestamp: HubEvent::now(now), payload },
            _ => HubEvent::FopUpdate { platform: platform.to_owned(), timestamp: HubEvent::now(now), payload },
        };
        self.emit(&mut inner, event, now_instant);
        Ok(())
    }

    pub async fn set_translations(&self, locale: &str, map: TranslationMap, checksum: Option<String>) {
        if map.is_empty() {
            warn!(locale, "setTranslations called with an empty map; ignored");
            return;
        }
        let mut inner = self.inner.write().await;
        if let Some(checksum) = &checksum {
            if inner.last_translations_checksum.as_deref() == Some(checksum.as_str()) {
                return;
            }
        }
        if let Some(base) = base_language(locale) {
            let merged = inner
                .translations
                .get(base)
                .cloned()
                .unwrap_or_default()
                .into_iter()
                .chain(map.clone())
                .collect();
            inner.translations.insert(locale.to_owned(), merged);
        } else {
            // A base-language insert refreshes every regional child that
            // doesn't already override a given key (spec §3).
            let regional_children: Vec<String> = inner
                .translations
                .keys()
                .filter(|k| base_language(k) == Some(locale))
                .cloned()
                .collect();
            for child in regional_children {
                let mut merged = map.clone();
                if let Some(existing) = inner.translations.get(&child) {
                    merged.extend(existing.clone());
                }
                inner.translations.insert(child, merged);
            }
            inner.translations.insert(locale.to_owned(), map);
        }
        inner.last_translations_checksum = checksum;
        self.maybe_emit_hub_ready(&mut inner, Instant::now());
    }

    /// `getTranslations` (spec §4.3): exact → base language → `en` → empty.
    pub async fn get_translations(&self, locale: &str) -> TranslationMap {
        let inner = self.inner.read().await;
        if let Some(exact) = inner.translations.get(locale) {
            return exact.clone();
        }
        if let Some(base) = base_language(locale) {
            if let Some(found) = inner.translations.get(base) {
                return found.clone();
            }
        }
        if locale != "en" {
            if let Some(en) = inner.translations.get("en") {
                warn!(locale, "no translations for locale or its base; falling back to en");
                return en.clone();
            }
        }
        TranslationMap::new()
    }

    pub async fn get_database_state(&self) -> Option<Database> {
        self.inner.read().await.database.clone()
    }

    pub async fn get_fop_update(&self, platform: &str) -> Option<FopState> {
        self.inner.read().await.platforms.get(platform).map(|r| r.fop_state.clone())
    }

    pub async fn get_session_status(&self, platform: &str) -> Option<SessionState> {
        self.inner.read().await.platforms.get(platform).map(|r| r.session_state)
    }

    pub async fn get_missing_preconditions(&self) -> Vec<String> {
        self.inner.read().await.missing_preconditions()
    }

    pub async fn translations_checksum_matches(&self, checksum: &str) -> bool {
        self.inner.read().await.last_translations_checksum.as_deref() == Some(checksum)
    }

    pub async fn record_translations_checksum(&self, checksum: Option<String>) {
        self.inner.write().await.last_translations_checksum = checksum;
    }

    pub async fn report_protocol_error(&self, platform: Option<&str>, reason: &str) {
        let mut inner = self.inner.write().await;
        inner.counters.protocol_errors += 1;
        let now = Instant::now();
        self.emit(
            &mut inner,
            HubEvent::ProtocolError {
                timestamp: HubEvent::now(SystemTime::now()),
                platform: platform.map(str::to_owned),
                reason: reason.to_owned(),
            },
            now,
        );
    }

    pub async fn report_protocol_ok(&self) {
        let mut inner = self.inner.write().await;
        let now = Instant::now();
        self.emit(&mut inner, HubEvent::ProtocolOk { timestamp: HubEvent::now(SystemTime::now()) }, now);
    }

    pub async fn set_flags_loaded(&self) {
        let mut inner = self.inner.write().await;
        inner.flags_loaded = true;
        self.maybe_emit_hub_ready(&mut inner, Instant::now());
        drop(inner);
        self.epoch.bump();
    }

    pub async fn set_pictures_loaded(&self) {
        self.inner.write().await.pictures_loaded = true;
    }

    pub async fn set_styles_loaded(&self) {
        self.inner.write().await.styles_loaded = true;
    }

    pub async fn counters(&self) -> HubCounters {
        self.inner.read().await.counters
    }

    pub async fn readiness(&self) -> (bool, bool, bool, bool) {
        let inner = self.inner.read().await;
        (
            inner.database.is_some(),
            !inner.translations.is_empty(),
            inner.flags_loaded,
            inner.pictures_loaded,
        )
    }
}

fn base_language(locale: &str) -> Option<&str> {
    locale.split_once('-').map(|(base, _)| base)
}

fn merge_platform_state(inner: &mut HubInner, platform: &str, payload: &Value, now: SystemTime) {
    let record = inner
        .platforms
        .entry(platform.to_owned())
        .or_insert_with(|| PlatformRecord {
            fop_state: FopState {
                platform: platform.to_owned(),
                ..FopState::default()
            },
            session_state: SessionState::Inactive,
            last_update: now,
        });

    record.last_update = now;
    record.fop_state.last_update_millis = Some(HubEvent::now(now));

    if let Value::Object(map) = payload {
        for (key, value) in map {
            match key.as_str() {
                "fop" => {}
                "groupName" => {
                    if let Some(s) = value.as_str() {
                        record.fop_state.group_name = Some(s.to_owned());
                    }
                }
                "currentAthleteKey" => {
                    record.fop_state.current_athlete_key = value.as_str().map(str::to_owned);
                }
                "fopState" => {
                    if let Some(s) = value.as_str() {
                        record.fop_state.fop_state = Some(s.to_owned());
                    }
                }
                _ => {
                    record.fop_state.fields.insert(key.clone(), value.clone());
                }
            }
        }
    }

    let is_group_done = payload.get("uiEvent").and_then(Value::as_str) == Some("GroupDone")
        || payload.get("breakType").and_then(Value::as_str) == Some("GROUP_DONE");

    record.session_state = if is_group_done {
        record.fop_state.group_name = payload
            .get("groupName")
            .and_then(Value::as_str)
            .map(str::to_owned)
            .or_else(|| record.fop_state.group_name.clone());
        SessionState::Done
    } else {
        match record.session_state {
            SessionState::Inactive => {
                if payload.get("fopState").and_then(Value::as_str) == Some("INACTIVE") {
                    SessionState::Inactive
                } else {
                    SessionState::Active
                }
            }
            SessionState::Done | SessionState::Active => SessionState::Active,
        }
    };
    record.fop_state.session_done = record.session_state == SessionState::Done;
}
