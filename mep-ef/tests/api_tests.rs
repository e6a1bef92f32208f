//! HTTP API integration tests
//!
//! Each test builds the router over an in-memory warehouse and drives it
//! with `oneshot` requests.

use axum::body::Body;
use axum::http::{Request, StatusCode};
use chrono::{DateTime, TimeZone, Utc};
use mep_common::{EventBus, PipelineConfig, PipelineEvent, RuleEnricher, TimeWindow};
use mep_ef::{build_router, rollup, AppState};
use serde_json::{json, Value};
use std::sync::Arc;
use tower::ServiceExt;

async fn test_state(enrichment_enabled: bool) -> AppState {
    let pool = mep_common::db::init_memory_warehouse().await.unwrap();
    let config = PipelineConfig {
        enrichment_enabled,
        ..PipelineConfig::default()
    };
    AppState::new(pool, EventBus::new(100), config, Arc::new(RuleEnricher::default()))
}

fn at(minute: u32, second: u32) -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2024, 3, 9, 18, minute, second).unwrap()
}

fn raw_event(event_id: &str, ts: DateTime<Utc>) -> Value {
    json!({
        "event_id": event_id,
        "event_type": "play",
        "timestamp": ts.to_rfc3339(),
        "track": {"id": "trk-001", "title": "Hotel California", "duration_ms": 391000},
        "artist": {"name": "Eagles"},
        "user_interaction": {"user_id": "user-1"},
        "streaming_event": {"platform": "spotify"},
        "play_event": {"played_duration_ms": 380000}
    })
}

async fn send(state: &AppState, request: Request<Body>) -> (StatusCode, Value) {
    let response = build_router(state.clone()).oneshot(request).await.unwrap();
    let status = response.status();
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX).await.unwrap();
    let body = if bytes.is_empty() {
        Value::Null
    } else {
        serde_json::from_slice(&bytes).unwrap()
    };
    (status, body)
}

async fn get(state: &AppState, uri: &str) -> (StatusCode, Value) {
    send(state, Request::builder().uri(uri).body(Body::empty()).unwrap()).await
}

async fn post(state: &AppState, uri: &str, body: &Value) -> (StatusCode, Value) {
    post_text(state, uri, body.to_string()).await
}

async fn post_text(state: &AppState, uri: &str, body: String) -> (StatusCode, Value) {
    let request = Request::builder()
        .method("POST")
        .uri(uri)
        .header("content-type", "application/json")
        .body(Body::from(body))
        .unwrap();
    send(state, request).await
}

#[tokio::test]
async fn test_health_reports_module_and_store() {
    let state = test_state(true).await;
    let (status, body) = get(&state, "/health").await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "ok");
    assert_eq!(body["module"], "mep-ef");
    assert_eq!(body["stored_events"], 0);
    assert_eq!(body["enrichment_enabled"], true);
    assert!(body.get("last_error").is_none());
}

#[tokio::test]
async fn test_ingest_stores_and_broadcasts() {
    let state = test_state(true).await;
    let mut rx = state.event_bus.subscribe();

    let (status, body) = post(&state, "/api/ingest", &raw_event("evt-1", at(30, 5))).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "success");
    assert_eq!(body["event_id"], "evt-1");

    match rx.recv().await.unwrap() {
        PipelineEvent::EventIngested { event_id, .. } => assert_eq!(event_id, "evt-1"),
        other => panic!("unexpected event {:?}", other),
    }
    match rx.recv().await.unwrap() {
        PipelineEvent::EventEnriched { matched_rule, .. } => assert_eq!(matched_rule, "known_artist"),
        other => panic!("unexpected event {:?}", other),
    }

    // Redelivery overwrites the same row
    post(&state, "/api/ingest", &raw_event("evt-1", at(30, 5))).await;
    assert_eq!(mep_common::db::count_events(&state.db).await.unwrap(), 1);
}

#[tokio::test]
async fn test_ingest_without_enrichment_skips_enriched_event() {
    let state = test_state(false).await;
    let mut rx = state.event_bus.subscribe();

    let (status, _) = post(&state, "/api/ingest", &raw_event("evt-1", at(30, 5))).await;
    assert_eq!(status, StatusCode::OK);
    assert!(matches!(rx.recv().await.unwrap(), PipelineEvent::EventIngested { .. }));
    assert!(rx.try_recv().is_err());
}

#[tokio::test]
async fn test_ingest_rejects_missing_track_id() {
    let state = test_state(true).await;
    let mut rx = state.event_bus.subscribe();

    let mut raw = raw_event("evt-bad", at(30, 5));
    raw["track"].as_object_mut().unwrap().remove("id");
    let (status, body) = post(&state, "/api/ingest", &raw).await;

    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"]["code"], "VALIDATION_ERROR");
    assert_eq!(body["error"]["field"], "track.id");
    match rx.recv().await.unwrap() {
        PipelineEvent::EventRejected { event_id, field, .. } => {
            assert_eq!(event_id.as_deref(), Some("evt-bad"));
            assert_eq!(field, "track.id");
        }
        other => panic!("unexpected event {:?}", other),
    }
    assert_eq!(mep_common::db::count_events(&state.db).await.unwrap(), 0);
}

#[tokio::test]
async fn test_batch_reports_partial_success() {
    let state = test_state(true).await;
    let mut bad = raw_event("evt-2", at(30, 6));
    bad["streaming_event"]["platform"] = json!("walkman");
    let batch = json!([raw_event("evt-1", at(30, 5)), bad, raw_event("evt-3", at(30, 7))]);

    let (status, body) = post(&state, "/api/ingest/batch", &batch).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "partial");
    assert_eq!(body["successful"], 2);
    assert_eq!(body["failed"], 1);
    assert_eq!(body["errors"][0]["index"], 1);
    assert_eq!(body["errors"][0]["event_id"], "evt-2");
    assert_eq!(body["errors"][0]["field"], "streaming_event.platform");
    assert_eq!(mep_common::db::count_events(&state.db).await.unwrap(), 2);
}

#[tokio::test]
async fn test_redelivered_event_without_timestamp_keeps_first_time() {
    let state = test_state(true).await;
    let mut raw = raw_event("evt-untimed", at(30, 5));
    raw.as_object_mut().unwrap().remove("timestamp");

    let (status, _) = post(&state, "/api/ingest", &raw).await;
    assert_eq!(status, StatusCode::OK);
    let first = mep_common::db::stored_timestamp(&state.db, "evt-untimed").await.unwrap().unwrap();
    let window = TimeWindow::containing(first, 3600);
    let before = mep_common::db::events_in_window(&state.db, &window).await.unwrap();

    tokio::time::sleep(std::time::Duration::from_millis(20)).await;
    post(&state, "/api/ingest", &raw).await;
    tokio::time::sleep(std::time::Duration::from_millis(20)).await;
    let (status, _) = post(&state, "/api/enrich", &raw).await;
    assert_eq!(status, StatusCode::OK);

    let again = mep_common::db::stored_timestamp(&state.db, "evt-untimed").await.unwrap();
    assert_eq!(again, Some(first));
    assert_eq!(mep_common::db::count_events(&state.db).await.unwrap(), 1);
    let after = mep_common::db::events_in_window(&state.db, &window).await.unwrap();
    assert_eq!(after, before);
    assert_eq!(after[0].timestamp, first);
}

#[tokio::test]
async fn test_malformed_json_gets_error_body() {
    let state = test_state(true).await;

    let (status, body) = post_text(&state, "/api/ingest", "{\"event_id\": ".to_string()).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"]["code"], "BAD_REQUEST");
    assert!(!body["error"]["message"].as_str().unwrap().is_empty());

    let (status, body) = post(&state, "/api/ingest/batch", &raw_event("evt-1", at(30, 5))).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"]["code"], "BAD_REQUEST");

    let (status, body) = post_text(&state, "/api/enrich", "not json".to_string()).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"]["code"], "BAD_REQUEST");
    assert_eq!(mep_common::db::count_events(&state.db).await.unwrap(), 0);
}

#[tokio::test]
async fn test_enrich_returns_enrichment_fields() {
    // Enrichment switched off for ingest still enriches here
    let state = test_state(false).await;
    let (status, body) = post(&state, "/api/enrich", &raw_event("evt-1", at(30, 5))).await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "success");
    assert_eq!(body["event_id"], "evt-1");
    let enrichments = &body["enrichments"];
    assert_eq!(enrichments["similar_tracks"][0], "Take It Easy");
    assert_eq!(enrichments["enrichment_confidence"], 0.7);
    assert!(enrichments["mood_analysis"]
        .as_str()
        .unwrap()
        .to_lowercase()
        .contains("melancholic"));
    assert!(enrichments["event_description"]
        .as_str()
        .unwrap()
        .contains("Hotel California"));
}

#[tokio::test]
async fn test_enrich_rejects_invalid_event() {
    let state = test_state(true).await;
    let (status, body) = post(&state, "/api/enrich", &json!({"event_id": "evt-1"})).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"]["field"], "event_type");
}

#[tokio::test]
async fn test_aggregate_over_stored_events() {
    let state = test_state(true).await;
    for (id, ts) in [("e1", at(30, 0)), ("e2", at(30, 59)), ("e3", at(31, 0))] {
        post(&state, "/api/ingest", &raw_event(id, ts)).await;
    }

    let (status, body) = get(
        &state,
        "/api/aggregates?start=2024-03-09T18:30:00Z&end=2024-03-09T18:31:00Z",
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["total_events"], 2);
    assert_eq!(body["unique_users"], 1);
    assert_eq!(body["platform_distribution"]["spotify"], 2);
    assert_eq!(body["event_type_distribution"]["play"], 2);
}

#[tokio::test]
async fn test_aggregate_rejects_bad_range() {
    let state = test_state(true).await;

    let (status, body) = get(&state, "/api/aggregates?start=yesterday&end=2024-03-09T18:31:00Z").await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"]["code"], "BAD_REQUEST");

    let (status, _) = get(
        &state,
        "/api/aggregates?start=2024-03-09T18:31:00Z&end=2024-03-09T18:30:00Z",
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_unknown_window_is_404() {
    let state = test_state(true).await;
    let (status, body) = get(&state, "/api/windows/2024-03-09T18:30:00Z").await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["error"]["code"], "NOT_FOUND");
}

#[tokio::test]
async fn test_closed_window_is_written_once() {
    let state = test_state(true).await;
    let mut rx = state.event_bus.subscribe();
    post(&state, "/api/ingest", &raw_event("e1", at(30, 10))).await;
    post(&state, "/api/ingest", &raw_event("e2", at(30, 20))).await;

    let window = TimeWindow::containing(at(30, 10), 60);
    let closed = rollup::close_window(&state, window).await.unwrap().unwrap();
    assert_eq!(closed.total_events, 2);

    // Late arrival does not change the closed window
    post(&state, "/api/ingest", &raw_event("e3", at(30, 30))).await;
    assert!(rollup::close_window(&state, window).await.unwrap().is_none());

    let (status, body) = get(&state, "/api/windows/2024-03-09T18:30:00Z").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["total_events"], 2);

    let (status, body) = get(&state, "/api/windows?from=2024-03-09T18:00:00Z&to=2024-03-09T19:00:00Z").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body.as_array().unwrap().len(), 1);

    let mut closed_events = 0;
    while let Ok(event) = rx.try_recv() {
        if matches!(event, PipelineEvent::WindowClosed { .. }) {
            closed_events += 1;
        }
    }
    assert_eq!(closed_events, 1);
}

#[tokio::test]
async fn test_platform_metrics_by_date() {
    let state = test_state(true).await;
    post(&state, "/api/ingest", &raw_event("e1", at(30, 10))).await;

    let (status, body) = get(&state, "/api/metrics/platforms?date=2024-03-09").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body[0]["platform"], "spotify");
    assert_eq!(body[0]["total_events"], 1);

    let (status, _) = get(&state, "/api/metrics/platforms?date=March").await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_sample_cursor_walks_catalog() {
    let state = test_state(true).await;
    let (status, body) = get(&state, "/api/samples/next?cursor=0&user_id=user-42").await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["cursor"], 0);
    assert_eq!(body["next_cursor"], 1);
    assert_eq!(body["event"]["track"]["title"], "Hotel California");
    assert_eq!(body["event"]["user_interaction"]["user_id"], "user-42");

    // The sample is a valid raw event
    let (status, _) = post(&state, "/api/ingest", &body["event"]).await;
    assert_eq!(status, StatusCode::OK);
}
