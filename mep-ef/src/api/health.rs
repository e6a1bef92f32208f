//! Health check endpoint

use axum::{extract::State, routing::get, Json, Router};
use chrono::Utc;
use serde::{Deserialize, Serialize};

use crate::AppState;

/// Health check response
#[derive(Debug, Serialize, Deserialize)]
pub struct HealthResponse {
    /// "ok", or "degraded" when the warehouse is unreachable
    pub status: String,
    /// Module name ("mep-ef")
    pub module: String,
    /// Crate version from Cargo.toml
    pub version: String,
    /// Seconds since service started
    pub uptime_seconds: u64,
    /// Events stored in the warehouse
    #[serde(skip_serializing_if = "Option::is_none")]
    pub stored_events: Option<i64>,
    pub enrichment_enabled: bool,
    /// Last error message if any (for diagnostics)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_error: Option<String>,
}

/// GET /health
pub async fn health_check(State(state): State<AppState>) -> Json<HealthResponse> {
    let uptime = Utc::now().signed_duration_since(state.startup_time);
    let uptime_seconds = uptime.num_seconds().max(0) as u64;

    let stored_events = mep_common::db::count_events(&state.db).await.ok();
    let last_error = state.last_error.read().await.clone();

    Json(HealthResponse {
        status: if stored_events.is_some() { "ok" } else { "degraded" }.to_string(),
        module: "mep-ef".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
        uptime_seconds,
        stored_events,
        enrichment_enabled: state.config.enrichment_enabled,
        last_error,
    })
}

/// Build health check routes
pub fn health_routes() -> Router<AppState> {
    Router::new().route("/health", get(health_check))
}
