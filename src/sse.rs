//! Subscriber Broker HTTP surface (spec §4.6, §9): `GET /subscribe` hands
//! a filtered [`crate::broker::Broker`] feed to a browser scoreboard as an
//! SSE stream.

use std::collections::HashMap;
use std::collections::HashSet;
use std::convert::Infallible;
use std::time::Duration;

use axum::extract::{Query, State};
use axum::response::sse::{Event, KeepAlive, Sse};
use futures_util::stream::Stream;
use tokio_stream::wrappers::BroadcastStream;
use tokio_stream::StreamExt;

use crate::events::HubEvent;
use crate::state::AppState;

/// `GET /subscribe?platform=<id>&types=<comma,separated,list>`. A missing
/// `platform` subscribes to global (platform-less) events only; a missing
/// `types` admits every event type.
pub async fn subscribe_handler(
    State(state): State<AppState>,
    Query(params): Query<HashMap<String, String>>,
) -> Sse<impl Stream<Item = Result<Event, Infallible>>> {
    let platform_filter = params.get("platform").cloned();
    let type_filter: Option<HashSet<String>> = params
        .get("types")
        .map(|csv| csv.split(',').map(str::trim).filter(|s| !s.is_empty()).map(str::to_owned).collect());

    let initial = if state.hub.get_database_state().await.is_some() {
        HubEvent::CompetitionInitialized { timestamp: HubEvent::now(std::time::SystemTime::now()) }
    } else {
        HubEvent::Waiting { timestamp: HubEvent::now(std::time::SystemTime::now()) }
    };

    let (_id, rx) = state.broker.subscribe(platform_filter, type_filter, Some(&initial));

    let stream = BroadcastStream::new(rx).filter_map(|result| match result {
        Ok(json) => Some(Ok(Event::default().data(json.to_string()))),
        Err(_) => None,
    });

    Sse::new(stream).keep_alive(KeepAlive::new().interval(Duration::from_secs(15)).text("keepalive"))
}
