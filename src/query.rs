//! Query API (spec §4.7/§6): `(pluginType, platform, options) -> JSON`,
//! backed by the plugin registry and the epoch-invalidated plugin cache.
//! `/api/status` sits alongside it for readiness/introspection.

use std::collections::HashMap;

use axum::extract::{Query, State};
use axum::Json;
use futures_util::future::BoxFuture;
use serde::Serialize;
use serde_json::Value;

use crate::hub::{Hub, SessionState};
use crate::state::AppState;

#[derive(Debug, Serialize)]
pub struct QueryResponse {
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl QueryResponse {
    fn ok(data: Value) -> Self {
        Self { success: true, data: Some(data), error: None }
    }

    fn error(message: impl Into<String>) -> Self {
        Self { success: false, data: None, error: Some(message.into()) }
    }
}

/// `GET /api/scoreboard?type=<pluginType>&platform=<id>&<plugin-options…>`
pub async fn scoreboard_handler(
    State(state): State<AppState>,
    Query(params): Query<HashMap<String, String>>,
) -> Json<QueryResponse> {
    let Some(plugin_type) = params.get("type").cloned() else {
        return Json(QueryResponse::error("missing required query parameter: type"));
    };
    let Some(platform) = params.get("platform").cloned() else {
        return Json(QueryResponse::error("missing required query parameter: platform"));
    };
    let Some(descriptor) = state.plugins.find(&plugin_type) else {
        return Json(QueryResponse::error(format!("unknown plugin type: {plugin_type}")));
    };
    let Some(cache) = state.cache_for(&plugin_type) else {
        return Json(QueryResponse::error(format!("no cache configured for plugin type: {plugin_type}")));
    };

    let key = state.cache_key(&plugin_type, &platform, &params);
    if let Some(cached) = cache.get(&key) {
        let refreshed = (descriptor.refresh_volatile)(state.hub.clone(), platform, cached).await;
        return Json(QueryResponse::ok(refreshed));
    }

    let data = (descriptor.compute)(state.hub.clone(), platform, params).await;
    cache.insert(key, data.clone(), state.epoch.current());
    Json(QueryResponse::ok(data))
}

/// `GET /api/status`: readiness booleans, subscriber count, and message
/// counters (spec §6).
pub async fn status_handler(State(state): State<AppState>) -> Json<Value> {
    let (database_loaded, translations_loaded, flags_loaded, pictures_loaded) = state.hub.readiness().await;
    let counters = state.hub.counters().await;
    Json(serde_json::json!({
        "databaseLoaded": database_loaded,
        "translationsLoaded": translations_loaded,
        "flagsLoaded": flags_loaded,
        "picturesLoaded": pictures_loaded,
        "subscriberCount": state.broker.subscriber_count(),
        "cacheEpoch": state.epoch.current(),
        "databasesIngested": counters.databases_ingested,
        "updatesIngested": counters.updates_ingested,
        "protocolErrors": counters.protocol_errors,
    }))
}

/// Minimal demonstration plugin (spec §4.5/§9): current athlete/group
/// summary for a platform. Plugin-specific scoreboard shape logic is
/// explicitly out of core scope; this exists to exercise the cache and
/// registry machinery end to end.
pub fn compute_scoreboard(hub: Hub, platform: String, _options: HashMap<String, String>) -> BoxFuture<'static, Value> {
    Box::pin(async move {
        let fop = hub.get_fop_update(&platform).await;
        let session_done = matches!(hub.get_session_status(&platform).await, Some(SessionState::Done));
        serde_json::json!({
            "platform": platform,
            "currentAthleteKey": fop.as_ref().and_then(|f| f.current_athlete_key.clone()),
            "groupName": fop.as_ref().and_then(|f| f.group_name.clone()),
            "sessionDone": session_done,
        })
    })
}

/// Patches `currentAthleteKey`/`groupName`/`sessionDone` onto a cached
/// scoreboard payload with their current live values (spec §4.5).
pub fn refresh_scoreboard_volatile(hub: Hub, platform: String, cached: Value) -> BoxFuture<'static, Value> {
    Box::pin(async move {
        let fop = hub.get_fop_update(&platform).await;
        let session_done = matches!(hub.get_session_status(&platform).await, Some(SessionState::Done));
        let mut cached = cached;
        if let Value::Object(map) = &mut cached {
            map.insert(
                "currentAthleteKey".to_owned(),
                fop.as_ref().and_then(|f| f.current_athlete_key.clone()).map_or(Value::Null, Value::String),
            );
            map.insert(
                "groupName".to_owned(),
                fop.as_ref().and_then(|f| f.group_name.clone()).map_or(Value::Null, Value::String),
            );
            map.insert("sessionDone".to_owned(), Value::Bool(session_done));
        }
        cached
    })
}

/// The results roster only changes on a fresh database ingest, which
/// already bumps the cache epoch, so there's no volatile subset to patch
/// here — a cache hit's payload is already current.
pub fn refresh_results_volatile(_hub: Hub, _platform: String, cached: Value) -> BoxFuture<'static, Value> {
    Box::pin(async move { cached })
}

/// Minimal demonstration plugin: the full athlete roster ordered by total
/// descending. Platform-specific filtering relies on an optional
/// `platform` field carried in each athlete's spill map, since the core
/// data model doesn't assign athletes to platforms directly.
pub fn compute_results(hub: Hub, platform: String, _options: HashMap<String, String>) -> BoxFuture<'static, Value> {
    Box::pin(async move {
        let Some(db) = hub.get_database_state().await else {
            return serde_json::json!({ "platform": platform, "athletes": [] });
        };
        let mut athletes: Vec<_> = db
            .athletes
            .values()
            .filter(|a| {
                a.extra
                    .get("platform")
                    .and_then(Value::as_str)
                    .is_none_or(|p| p == platform)
            })
            .cloned()
            .collect();
        athletes.sort_by(|a, b| {
            let parse = |t: &Option<String>| t.as_deref().and_then(|s| s.parse::<i64>().ok()).unwrap_or(0);
            parse(&b.total).cmp(&parse(&a.total))
        });
        serde_json::json!({ "platform": platform, "athletes": athletes })
    })
}
