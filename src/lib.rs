pub mod assets;
pub mod broker;
pub mod cache;
pub mod channel;
pub mod config;
pub mod events;
pub mod hub;
pub mod query;
pub mod samples;
pub mod sse;
pub mod state;

pub use config::Config;
pub use state::AppState;

use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::routing::get;
use axum::Router;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

/// Wires the source channel, the scoreboard subscription feed, and the
/// Query API onto one router (spec §4, §6). No dashboard/HTML surface is
/// served here — rendering is a display client's job, not this server's
/// (spec §1 Non-goals).
pub fn build_router(state: AppState) -> Router {
    Router::new()
        .route("/ws", get(channel::source_ws_handler))
        .route("/subscribe", get(sse::subscribe_handler))
        .route("/api/scoreboard", get(query::scoreboard_handler))
        .route("/api/status", get(query::status_handler))
        .route("/healthz", get(health::healthz))
        .route("/readyz", get(health::readyz))
        .fallback(fallback_404)
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(state)
}

async fn fallback_404() -> impl IntoResponse {
    (StatusCode::NOT_FOUND, "not found")
}

mod health {
    use axum::response::IntoResponse;
    pub async fn healthz() -> impl IntoResponse {
        "ok"
    }
    pub async fn readyz() -> impl IntoResponse {
        "ok"
    }
}
