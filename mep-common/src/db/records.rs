//! Enriched event rows

use chrono::{DateTime, SecondsFormat, Utc};
use serde::{Deserialize, Serialize};
use sqlx::SqlitePool;

use crate::aggregate::TimeWindow;
use crate::enrich::MatchedRule;
use crate::model::CanonicalEvent;
use crate::record::EnrichedRecord;
use crate::time::from_epoch_millis;
use crate::Result;

/// Insert or replace the row for `record.event.event_id`
///
/// Redelivery of the same event overwrites the row with identical content.
pub async fn upsert_record(pool: &SqlitePool, record: &EnrichedRecord) -> Result<()> {
    let event = &record.event;
    let derived = &record.derived;
    let enrichment = record.enrichment.as_ref();

    let predicted_genres = enrichment
        .map(|e| serde_json::to_string(&e.predicted_genres))
        .transpose()?;
    let similar_tracks = enrichment
        .map(|e| serde_json::to_string(&e.similar_tracks))
        .transpose()?;
    let matched_rule = enrichment.map(|e| match &e.matched_rule {
        MatchedRule::KnownArtist { .. } => "known_artist",
        MatchedRule::Genre { .. } => "genre",
        MatchedRule::Fallback => "fallback",
    });

    sqlx::query(
        r#"
        INSERT OR REPLACE INTO enriched_events (
            event_id, event_type, event_timestamp, event_ts_ms, event_date,
            user_id, session_id, track_id, track_title, artist_name, album_name, platform,
            track_duration_ms, played_duration_ms,
            hour_of_day, day_of_week, is_weekend, play_completion_ratio,
            is_full_play, is_skip, engagement_score, platform_category, time_context,
            event_description, mood_analysis, predicted_genres, listening_context,
            similar_tracks, enrichment_confidence, matched_rule,
            event_json, processed_at
        ) VALUES (
            ?, ?, ?, ?, ?,
            ?, ?, ?, ?, ?, ?, ?,
            ?, ?,
            ?, ?, ?, ?,
            ?, ?, ?, ?, ?,
            ?, ?, ?, ?,
            ?, ?, ?,
            ?, ?
        )
        "#,
    )
    .bind(&event.event_id)
    .bind(event.event_type.as_str())
    .bind(event.timestamp.to_rfc3339_opts(SecondsFormat::Millis, true))
    .bind(event.timestamp.timestamp_millis())
    .bind(record.event_date().to_string())
    .bind(&event.user_id)
    .bind(&event.session_id)
    .bind(&event.track.id)
    .bind(&event.track.title)
    .bind(&event.artist.name)
    .bind(&event.track.album)
    .bind(event.platform.as_str())
    .bind(event.track.duration_ms.map(|v| v as i64))
    .bind(event.played_duration_ms.map(|v| v as i64))
    .bind(derived.hour_of_day as i64)
    .bind(derived.day_of_week as i64)
    .bind(derived.is_weekend)
    .bind(derived.play_completion_ratio)
    .bind(derived.is_full_play)
    .bind(derived.is_skip)
    .bind(derived.engagement_score)
    .bind(derived.platform_category.as_str())
    .bind(derived.time_context.as_str())
    .bind(enrichment.map(|e| e.event_description.as_str()))
    .bind(enrichment.map(|e| e.mood_analysis.as_str()))
    .bind(predicted_genres)
    .bind(enrichment.map(|e| e.listening_context.as_str()))
    .bind(similar_tracks)
    .bind(enrichment.map(|e| e.enrichment_confidence))
    .bind(matched_rule)
    .bind(serde_json::to_string(event)?)
    .bind(Utc::now().to_rfc3339())
    .execute(pool)
    .await?;

    Ok(())
}

/// Canonical events whose timestamp falls in `[window.start, window.end)`
pub async fn events_in_window(pool: &SqlitePool, window: &TimeWindow) -> Result<Vec<CanonicalEvent>> {
    let rows: Vec<String> = sqlx::query_scalar(
        r#"
        SELECT event_json FROM enriched_events
        WHERE event_ts_ms >= ? AND event_ts_ms < ?
        ORDER BY event_ts_ms, event_id
        "#,
    )
    .bind(window.start.timestamp_millis())
    .bind(window.end.timestamp_millis())
    .fetch_all(pool)
    .await?;

    rows.iter()
        .map(|json| serde_json::from_str(json).map_err(Into::into))
        .collect()
}

/// Timestamp stored for `event_id`, if the event was seen before
pub async fn stored_timestamp(pool: &SqlitePool, event_id: &str) -> Result<Option<DateTime<Utc>>> {
    let millis: Option<i64> = sqlx::query_scalar("SELECT event_ts_ms FROM enriched_events WHERE event_id = ?")
        .bind(event_id)
        .fetch_optional(pool)
        .await?;
    Ok(millis.and_then(from_epoch_millis))
}

pub async fn count_events(pool: &SqlitePool) -> Result<i64> {
    let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM enriched_events")
        .fetch_one(pool)
        .await?;
    Ok(count)
}

/// One row of the `daily_platform_metrics` view
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, sqlx::FromRow)]
pub struct DailyPlatformMetrics {
    pub event_date: String,
    pub platform: String,
    pub total_events: i64,
    pub unique_users: i64,
    pub unique_tracks: i64,
    pub avg_engagement_score: Option<f64>,
    pub avg_completion_ratio: Option<f64>,
    pub full_plays: i64,
    pub skips: i64,
}

/// Per-platform metrics for one `YYYY-MM-DD` date
pub async fn daily_platform_metrics(pool: &SqlitePool, date: &str) -> Result<Vec<DailyPlatformMetrics>> {
    let rows = sqlx::query_as::<_, DailyPlatformMetrics>(
        r#"
        SELECT event_date, platform, total_events, unique_users, unique_tracks,
               avg_engagement_score, avg_completion_ratio, full_plays, skips
        FROM daily_platform_metrics
        WHERE event_date = ?
        ORDER BY platform
        "#,
    )
    .bind(date)
    .fetch_all(pool)
    .await?;
    Ok(rows)
}
