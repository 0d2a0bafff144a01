//! HTTP routes.

use std::sync::Arc;

use axum::{extract::State, routing::get, Json, Router};
use serde::{Deserialize, Serialize};

use crate::state::AppState;

pub mod export;
pub mod jobs;
pub mod ws;

#[derive(Debug, Serialize, Deserialize)]
pub struct BannerResponse {
    pub message: String,
    pub version: String,
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HealthResponse {
    pub status: String,
    pub version: String,
    pub uptime_secs: u64,
    pub workers: usize,
    pub queued: usize,
    pub in_flight: usize,
    pub observers: usize,
}

/// GET /
pub async fn banner() -> Json<BannerResponse> {
    Json(BannerResponse {
        message: "Harvest scraping API".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
    })
}

/// GET /health - worker pool and observer counts.
pub async fn health(State(state): State<Arc<AppState>>) -> Json<HealthResponse> {
    let stats = state.runner.stats();
    Json(HealthResponse {
        status: "ok".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
        uptime_secs: state.uptime_secs(),
        workers: stats.workers,
        queued: stats.queued,
        in_flight: stats.in_flight,
        observers: state.bus().observer_count(),
    })
}

/// Every route, without middleware.
pub fn router() -> Router<Arc<AppState>> {
    Router::new()
        .route("/", get(banner))
        .route("/health", get(health))
        .route("/ws", get(ws::ws_handler))
        .nest("/api/scraping", jobs::router().merge(export::router()))
}
