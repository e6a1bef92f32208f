//! Raw event ingestion
//!
//! `POST /api/ingest` takes one raw event, `POST /api/ingest/batch` a JSON
//! array of them. Each event is normalized, derived, enriched when
//! enrichment is enabled, and stored. Redelivering an event overwrites its
//! row with identical content, so clients may retry freely: an event
//! without a timestamp keeps the receive time of its first delivery.

use axum::{
    extract::{rejection::JsonRejection, State},
    routing::post,
    Json, Router,
};
use chrono::{DateTime, SubsecRound, Utc};
use mep_common::{db, process_at, EnrichedRecord, PipelineEvent, ValidationError};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{debug, info, warn};

use crate::{ApiError, ApiResult, AppState};

/// Response of `POST /api/ingest`
#[derive(Debug, Serialize, Deserialize)]
pub struct IngestResponse {
    pub status: String,
    pub event_id: String,
    pub timestamp: DateTime<Utc>,
}

/// One rejected event of a batch
#[derive(Debug, Serialize, Deserialize)]
pub struct BatchItemError {
    /// Position in the submitted array
    pub index: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub event_id: Option<String>,
    pub field: String,
    pub reason: String,
}

/// Response of `POST /api/ingest/batch`
#[derive(Debug, Serialize, Deserialize)]
pub struct BatchIngestResponse {
    /// "success" when every event was stored, "partial" otherwise
    pub status: String,
    pub successful: usize,
    pub failed: usize,
    pub errors: Vec<BatchItemError>,
}

/// POST /api/ingest
pub async fn ingest_event(
    State(state): State<AppState>,
    payload: Result<Json<Value>, JsonRejection>,
) -> ApiResult<Json<IngestResponse>> {
    let Json(raw) = payload?;
    let received_at = received_at(&state, &raw).await?;
    let record = validate(&state, &raw, received_at)?;
    store(&state, &record).await?;

    Ok(Json(IngestResponse {
        status: "success".to_string(),
        event_id: record.event.event_id,
        timestamp: Utc::now(),
    }))
}

/// POST /api/ingest/batch
///
/// Invalid events are reported per index and never fail the batch; a
/// storage failure does.
pub async fn ingest_batch(
    State(state): State<AppState>,
    payload: Result<Json<Vec<Value>>, JsonRejection>,
) -> ApiResult<Json<BatchIngestResponse>> {
    let Json(raws) = payload?;
    let mut successful = 0;
    let mut errors = Vec::new();

    for (index, raw) in raws.iter().enumerate() {
        let received_at = received_at(&state, raw).await?;
        match validate(&state, raw, received_at) {
            Ok(record) => {
                store(&state, &record).await?;
                successful += 1;
            }
            Err(err) => errors.push(BatchItemError {
                index,
                event_id: raw_event_id(raw),
                field: err.field,
                reason: err.reason,
            }),
        }
    }

    info!("Batch ingest: {} stored, {} rejected", successful, errors.len());
    Ok(Json(BatchIngestResponse {
        status: if errors.is_empty() { "success" } else { "partial" }.to_string(),
        successful,
        failed: errors.len(),
        errors,
    }))
}

fn validate(state: &AppState, raw: &Value, received_at: DateTime<Utc>) -> Result<EnrichedRecord, ValidationError> {
    process_at(raw, received_at, state.ingest_enricher()).map_err(|err| reject(state, raw, err))
}

/// Stand-in timestamp for a payload that carries none
///
/// A redelivered event reuses the timestamp stored on first delivery, so
/// its row, derived fields and window stay the same. Millisecond precision
/// matches what the warehouse keeps.
pub(crate) async fn received_at(state: &AppState, raw: &Value) -> ApiResult<DateTime<Utc>> {
    let now = Utc::now().trunc_subsecs(3);
    let Some(event_id) = raw_event_id(raw) else {
        return Ok(now);
    };
    Ok(db::stored_timestamp(&state.db, &event_id).await?.unwrap_or(now))
}

/// Announce a rejected payload and hand the error back
pub(crate) fn reject(state: &AppState, raw: &Value, err: ValidationError) -> ValidationError {
    warn!("Rejected event: {}", err);
    state.event_bus.emit_lossy(PipelineEvent::EventRejected {
        event_id: raw_event_id(raw),
        field: err.field.clone(),
        reason: err.reason.clone(),
        timestamp: Utc::now(),
    });
    err
}

/// Write the row and announce it
pub(crate) async fn store(state: &AppState, record: &EnrichedRecord) -> ApiResult<()> {
    if let Err(e) = db::upsert_record(&state.db, record).await {
        state
            .record_error(format!("store {} failed: {}", record.event.event_id, e))
            .await;
        return Err(ApiError::Common(e));
    }

    let event = &record.event;
    debug!(event_id = %event.event_id, "Stored event");
    state.event_bus.emit_lossy(PipelineEvent::EventIngested {
        event_id: event.event_id.clone(),
        event_type: event.event_type,
        platform: event.platform,
        timestamp: Utc::now(),
    });
    if let Some(enrichment) = &record.enrichment {
        state.event_bus.emit_lossy(PipelineEvent::EventEnriched {
            event_id: event.event_id.clone(),
            matched_rule: enrichment.matched_rule.kind().to_string(),
            enrichment_confidence: enrichment.enrichment_confidence,
            timestamp: Utc::now(),
        });
    }
    Ok(())
}

fn raw_event_id(raw: &Value) -> Option<String> {
    raw.get("event_id").and_then(Value::as_str).map(str::to_string)
}

/// Build ingestion routes
pub fn ingest_routes() -> Router<AppState> {
    Router::new()
        .route("/api/ingest", post(ingest_event))
        .route("/api/ingest/batch", post(ingest_batch))
}
