//! Single event enrichment
//!
//! `POST /api/enrich` always enriches, regardless of the ingest setting, and
//! returns the enrichment fields alongside storing the row.

use axum::{
    extract::{rejection::JsonRejection, State},
    routing::post,
    Json, Router,
};
use chrono::Utc;
use mep_common::{process_at, EnrichmentResponse};
use serde_json::Value;
use tracing::info;

use super::ingest::{received_at, reject, store};
use crate::{ApiError, ApiResult, AppState};

/// POST /api/enrich
pub async fn enrich_event(
    State(state): State<AppState>,
    payload: Result<Json<Value>, JsonRejection>,
) -> ApiResult<Json<EnrichmentResponse>> {
    let Json(raw) = payload?;
    let received_at = received_at(&state, &raw).await?;
    let record =
        process_at(&raw, received_at, Some(state.enricher.as_ref())).map_err(|err| reject(&state, &raw, err))?;

    store(&state, &record).await?;

    let response = record
        .to_response(Utc::now())
        .ok_or_else(|| ApiError::Internal(format!("event {} was not enriched", record.event.event_id)))?;
    info!(
        "Enriched {} with confidence {:.2}",
        response.event_id, response.enrichments.enrichment_confidence
    );
    Ok(Json(response))
}

/// Build enrichment routes
pub fn enrich_routes() -> Router<AppState> {
    Router::new().route("/api/enrich", post(enrich_event))
}
