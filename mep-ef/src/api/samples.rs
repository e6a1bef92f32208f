//! Deterministic sample events for demos and smoke tests

use axum::{extract::Query, routing::get, Json, Router};
use chrono::Utc;
use mep_common::SampleCursor;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::AppState;

#[derive(Debug, Deserialize)]
pub struct SampleQuery {
    #[serde(default)]
    pub cursor: u64,
    #[serde(default = "default_user")]
    pub user_id: String,
}

fn default_user() -> String {
    "user-0001".to_string()
}

/// Response of `GET /api/samples/next`
#[derive(Debug, Serialize, Deserialize)]
pub struct SampleResponse {
    pub cursor: u64,
    /// Pass back as `cursor` to walk the catalog
    pub next_cursor: u64,
    /// Raw event, ready to POST to `/api/ingest` or `/api/enrich`
    pub event: Value,
}

/// GET /api/samples/next?cursor=N&user_id=...
///
/// Nothing is stored; the caller owns the cursor.
pub async fn next_sample(Query(query): Query<SampleQuery>) -> Json<SampleResponse> {
    let cursor = SampleCursor::new(query.cursor);
    Json(SampleResponse {
        cursor: cursor.position(),
        next_cursor: cursor.advanced().position(),
        event: cursor.raw_event(&query.user_id, Utc::now()),
    })
}

/// Build sample routes
pub fn sample_routes() -> Router<AppState> {
    Router::new().route("/api/samples/next", get(next_sample))
}
