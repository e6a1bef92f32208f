//! Closed window roll-ups
//!
//! A bucket is written once. Later writes for the same `(window_start,
//! window_end)` are ignored, so a closed window never changes.

use chrono::{DateTime, SecondsFormat, Utc};
use sqlx::SqlitePool;
use std::collections::BTreeMap;

use crate::aggregate::AggregateWindow;
use crate::{Error, Result};

fn window_key(ts: DateTime<Utc>) -> String {
    ts.to_rfc3339_opts(SecondsFormat::Secs, true)
}

/// Store a roll-up; returns `false` when the window was already closed
pub async fn insert_window(pool: &SqlitePool, window: &AggregateWindow) -> Result<bool> {
    let result = sqlx::query(
        r#"
        INSERT OR IGNORE INTO event_metrics (
            window_start, window_end, window_date,
            total_events, unique_users, unique_tracks,
            platform_distribution, event_type_distribution,
            average_engagement_score, created_at
        ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
        "#,
    )
    .bind(window_key(window.window_start))
    .bind(window_key(window.window_end))
    .bind(window.window_start.date_naive().to_string())
    .bind(window.total_events as i64)
    .bind(window.unique_users as i64)
    .bind(window.unique_tracks as i64)
    .bind(serde_json::to_string(&window.platform_distribution)?)
    .bind(serde_json::to_string(&window.event_type_distribution)?)
    .bind(window.average_engagement_score)
    .bind(Utc::now().to_rfc3339())
    .execute(pool)
    .await?;

    Ok(result.rows_affected() > 0)
}

type WindowRow = (String, String, i64, i64, i64, String, String, f64);

/// Roll-up starting at `start`; the narrowest one when several widths exist
pub async fn get_window(pool: &SqlitePool, start: DateTime<Utc>) -> Result<Option<AggregateWindow>> {
    let row = sqlx::query_as::<_, WindowRow>(
        r#"
        SELECT window_start, window_end, total_events, unique_users, unique_tracks,
               platform_distribution, event_type_distribution, average_engagement_score
        FROM event_metrics
        WHERE window_start = ?
        ORDER BY window_end
        LIMIT 1
        "#,
    )
    .bind(window_key(start))
    .fetch_optional(pool)
    .await?;

    row.map(from_row).transpose()
}

/// Roll-ups whose start lies in `[from, to)`, oldest first
pub async fn list_windows(
    pool: &SqlitePool,
    from: DateTime<Utc>,
    to: DateTime<Utc>,
) -> Result<Vec<AggregateWindow>> {
    let rows = sqlx::query_as::<_, WindowRow>(
        r#"
        SELECT window_start, window_end, total_events, unique_users, unique_tracks,
               platform_distribution, event_type_distribution, average_engagement_score
        FROM event_metrics
        WHERE window_start >= ? AND window_start < ?
        ORDER BY window_start, window_end
        "#,
    )
    .bind(window_key(from))
    .bind(window_key(to))
    .fetch_all(pool)
    .await?;

    rows.into_iter().map(from_row).collect()
}

fn from_row(row: WindowRow) -> Result<AggregateWindow> {
    let (start, end, total_events, unique_users, unique_tracks, platforms, event_types, average) = row;
    Ok(AggregateWindow {
        window_start: parse_key(&start)?,
        window_end: parse_key(&end)?,
        total_events: total_events as u64,
        unique_users: unique_users as u64,
        unique_tracks: unique_tracks as u64,
        platform_distribution: serde_json::from_str::<BTreeMap<String, u64>>(&platforms)?,
        event_type_distribution: serde_json::from_str::<BTreeMap<String, u64>>(&event_types)?,
        average_engagement_score: average,
    })
}

fn parse_key(value: &str) -> Result<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(value)
        .map(|ts| ts.with_timezone(&Utc))
        .map_err(|e| Error::Internal(format!("corrupt window key `{}`: {}", value, e)))
}
