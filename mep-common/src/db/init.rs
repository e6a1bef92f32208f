//! Warehouse initialization
//!
//! Creates the SQLite file on first run and brings the schema up to date.
//! Every statement is idempotent, so opening an existing warehouse is safe.

use crate::Result;
use sqlx::{sqlite::SqlitePoolOptions, SqlitePool};
use std::path::Path;
use tracing::info;

/// Open (creating if needed) the warehouse at `db_path`
pub async fn init_warehouse(db_path: &Path) -> Result<SqlitePool> {
    let newly_created = !db_path.exists();

    if let Some(parent) = db_path.parent() {
        if !parent.as_os_str().is_empty() {
            std::fs::create_dir_all(parent)?;
        }
    }

    let db_url = format!("sqlite://{}?mode=rwc", db_path.display());
    let pool = SqlitePoolOptions::new()
        .max_connections(10)
        .connect(&db_url)
        .await?;

    if newly_created {
        info!("Initialized new warehouse: {}", db_path.display());
    } else {
        info!("Opened existing warehouse: {}", db_path.display());
    }

    // WAL allows concurrent readers with one writer
    sqlx::query("PRAGMA journal_mode = WAL").execute(&pool).await?;
    sqlx::query("PRAGMA busy_timeout = 5000").execute(&pool).await?;

    create_schema(&pool).await?;
    Ok(pool)
}

/// In-memory warehouse, one connection so every query sees the same database
pub async fn init_memory_warehouse() -> Result<SqlitePool> {
    let pool = SqlitePoolOptions::new()
        .max_connections(1)
        .connect("sqlite::memory:")
        .await?;
    create_schema(&pool).await?;
    Ok(pool)
}

/// Create tables, indexes and views
pub async fn create_schema(pool: &SqlitePool) -> Result<()> {
    create_enriched_events_table(pool).await?;
    create_event_metrics_table(pool).await?;
    create_daily_views(pool).await?;
    Ok(())
}

/// One wide row per event, keyed by `event_id`
///
/// `event_date` is the partition column; platform, artist and user carry the
/// clustering indexes. `event_json` holds the canonical event verbatim so
/// windows can be replayed.
async fn create_enriched_events_table(pool: &SqlitePool) -> Result<()> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS enriched_events (
            event_id TEXT PRIMARY KEY,
            event_type TEXT NOT NULL,
            event_timestamp TEXT NOT NULL,
            event_ts_ms INTEGER NOT NULL,
            event_date TEXT NOT NULL,
            user_id TEXT NOT NULL,
            session_id TEXT,
            track_id TEXT NOT NULL,
            track_title TEXT,
            artist_name TEXT,
            album_name TEXT,
            platform TEXT NOT NULL,
            track_duration_ms INTEGER,
            played_duration_ms INTEGER,
            hour_of_day INTEGER NOT NULL,
            day_of_week INTEGER NOT NULL,
            is_weekend INTEGER NOT NULL,
            play_completion_ratio REAL,
            is_full_play INTEGER NOT NULL,
            is_skip INTEGER NOT NULL,
            engagement_score REAL NOT NULL,
            platform_category TEXT NOT NULL,
            time_context TEXT NOT NULL,
            event_description TEXT,
            mood_analysis TEXT,
            predicted_genres TEXT,
            listening_context TEXT,
            similar_tracks TEXT,
            enrichment_confidence REAL,
            matched_rule TEXT,
            event_json TEXT NOT NULL,
            processed_at TEXT NOT NULL
        )
        "#,
    )
    .execute(pool)
    .await?;

    for sql in [
        "CREATE INDEX IF NOT EXISTS idx_enriched_events_date ON enriched_events(event_date)",
        "CREATE INDEX IF NOT EXISTS idx_enriched_events_ts ON enriched_events(event_ts_ms)",
        "CREATE INDEX IF NOT EXISTS idx_enriched_events_platform ON enriched_events(event_date, platform)",
        "CREATE INDEX IF NOT EXISTS idx_enriched_events_artist ON enriched_events(event_date, artist_name)",
        "CREATE INDEX IF NOT EXISTS idx_enriched_events_user ON enriched_events(event_date, user_id)",
    ] {
        sqlx::query(sql).execute(pool).await?;
    }

    Ok(())
}

/// Closed window roll-ups
async fn create_event_metrics_table(pool: &SqlitePool) -> Result<()> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS event_metrics (
            window_start TEXT NOT NULL,
            window_end TEXT NOT NULL,
            window_date TEXT NOT NULL,
            total_events INTEGER NOT NULL,
            unique_users INTEGER NOT NULL,
            unique_tracks INTEGER NOT NULL,
            platform_distribution TEXT NOT NULL,
            event_type_distribution TEXT NOT NULL,
            average_engagement_score REAL NOT NULL,
            created_at TEXT NOT NULL,
            PRIMARY KEY (window_start, window_end)
        )
        "#,
    )
    .execute(pool)
    .await?;

    Ok(())
}

async fn create_daily_views(pool: &SqlitePool) -> Result<()> {
    sqlx::query(
        r#"
        CREATE VIEW IF NOT EXISTS daily_platform_metrics AS
        SELECT
            event_date,
            platform,
            COUNT(*) AS total_events,
            COUNT(DISTINCT user_id) AS unique_users,
            COUNT(DISTINCT track_id) AS unique_tracks,
            AVG(engagement_score) AS avg_engagement_score,
            AVG(play_completion_ratio) AS avg_completion_ratio,
            SUM(is_full_play) AS full_plays,
            SUM(is_skip) AS skips
        FROM enriched_events
        GROUP BY event_date, platform
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        r#"
        CREATE VIEW IF NOT EXISTS daily_track_metrics AS
        SELECT
            event_date,
            track_id,
            MAX(track_title) AS track_title,
            MAX(artist_name) AS artist_name,
            COUNT(*) AS total_events,
            COUNT(DISTINCT user_id) AS unique_listeners,
            AVG(play_completion_ratio) AS avg_completion_ratio,
            SUM(is_skip) AS skips,
            AVG(engagement_score) AS avg_engagement_score
        FROM enriched_events
        GROUP BY event_date, track_id
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        r#"
        CREATE VIEW IF NOT EXISTS daily_user_metrics AS
        SELECT
            event_date,
            user_id,
            COUNT(*) AS total_events,
            COUNT(DISTINCT track_id) AS unique_tracks,
            COUNT(DISTINCT session_id) AS sessions,
            SUM(COALESCE(played_duration_ms, 0)) AS listening_ms,
            AVG(engagement_score) AS avg_engagement_score
        FROM enriched_events
        GROUP BY event_date, user_id
        "#,
    )
    .execute(pool)
    .await?;

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_schema_is_idempotent() {
        let pool = init_memory_warehouse().await.unwrap();
        create_schema(&pool).await.unwrap();

        let names: Vec<String> = sqlx::query_scalar(
            "SELECT name FROM sqlite_master WHERE type IN ('table', 'view') ORDER BY name",
        )
        .fetch_all(&pool)
        .await
        .unwrap();
        assert_eq!(
            names,
            vec![
                "daily_platform_metrics",
                "daily_track_metrics",
                "daily_user_metrics",
                "enriched_events",
                "event_metrics",
            ]
        );
    }
}
