//! Aggregate queries
//!
//! Ad-hoc windows are computed from stored events on request; closed
//! windows are read back from `event_metrics` as written by the roll-up.

use axum::{
    extract::{Path, Query, State},
    routing::get,
    Json, Router,
};
use chrono::{DateTime, NaiveDate, Utc};
use mep_common::db::{self, DailyPlatformMetrics};
use mep_common::time::parse_timestamp;
use mep_common::{aggregate, AggregateWindow, TimeWindow};
use serde::Deserialize;
use tracing::debug;

use crate::{ApiError, ApiResult, AppState};

/// Query parameters of `GET /api/aggregates` and `GET /api/windows`
#[derive(Debug, Deserialize)]
pub struct RangeQuery {
    #[serde(alias = "from")]
    pub start: String,
    #[serde(alias = "to")]
    pub end: String,
}

#[derive(Debug, Deserialize)]
pub struct DateQuery {
    pub date: String,
}

/// GET /api/aggregates?start=...&end=...
///
/// Aggregates every stored event in `[start, end)`.
pub async fn get_aggregate(
    State(state): State<AppState>,
    Query(query): Query<RangeQuery>,
) -> ApiResult<Json<AggregateWindow>> {
    let window = TimeWindow::new(timestamp_param("start", &query.start)?, timestamp_param("end", &query.end)?)?;
    let events = db::events_in_window(&state.db, &window).await?;
    debug!("Aggregating {} events in [{}, {})", events.len(), window.start, window.end);
    Ok(Json(aggregate(&events, window)))
}

/// GET /api/windows/:start
pub async fn get_closed_window(
    State(state): State<AppState>,
    Path(start): Path<String>,
) -> ApiResult<Json<AggregateWindow>> {
    let start = timestamp_param("start", &start)?;
    db::get_window(&state.db, start)
        .await?
        .map(Json)
        .ok_or_else(|| ApiError::NotFound(format!("no closed window starts at {}", start.to_rfc3339())))
}

/// GET /api/windows?from=...&to=...
pub async fn list_closed_windows(
    State(state): State<AppState>,
    Query(query): Query<RangeQuery>,
) -> ApiResult<Json<Vec<AggregateWindow>>> {
    let from = timestamp_param("from", &query.start)?;
    let to = timestamp_param("to", &query.end)?;
    if to <= from {
        return Err(ApiError::BadRequest("`to` must be after `from`".to_string()));
    }
    Ok(Json(db::list_windows(&state.db, from, to).await?))
}

/// GET /api/metrics/platforms?date=YYYY-MM-DD
pub async fn get_platform_metrics(
    State(state): State<AppState>,
    Query(query): Query<DateQuery>,
) -> ApiResult<Json<Vec<DailyPlatformMetrics>>> {
    let date = NaiveDate::parse_from_str(query.date.trim(), "%Y-%m-%d")
        .map_err(|_| ApiError::BadRequest(format!("invalid date `{}`, expected YYYY-MM-DD", query.date)))?;
    let rows = db::daily_platform_metrics(&state.db, &date.format("%Y-%m-%d").to_string()).await?;
    Ok(Json(rows))
}

fn timestamp_param(name: &str, value: &str) -> ApiResult<DateTime<Utc>> {
    parse_timestamp(value).ok_or_else(|| ApiError::BadRequest(format!("invalid timestamp for `{}`: {}", name, value)))
}

/// Build aggregate routes
pub fn aggregate_routes() -> Router<AppState> {
    Router::new()
        .route("/api/aggregates", get(get_aggregate))
        .route("/api/windows", get(list_closed_windows))
        .route("/api/windows/:start", get(get_closed_window))
        .route("/api/metrics/platforms", get(get_platform_metrics))
}
