//! Background window roll-up
//!
//! Shortly after each bucket boundary the buckets completed since the last
//! tick are aggregated from the warehouse and written to `event_metrics`. A written window is never
//! recomputed, so events arriving after their bucket closed only show up in
//! ad-hoc aggregates.

use chrono::{DateTime, Utc};
use mep_common::{aggregate, db, AggregateWindow, PipelineEvent, TimeWindow};
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::{interval_at, Instant, MissedTickBehavior};
use tracing::{debug, error, info};

use crate::AppState;

/// Aggregate `window` and persist it
///
/// Returns the roll-up when this call wrote it, `None` when the window was
/// already closed. `WindowClosed` is broadcast only for a fresh write.
pub async fn close_window(state: &AppState, window: TimeWindow) -> mep_common::Result<Option<AggregateWindow>> {
    let events = db::events_in_window(&state.db, &window).await?;
    let summary = aggregate(&events, window);

    if !db::insert_window(&state.db, &summary).await? {
        debug!("Window starting {} already closed", window.start.to_rfc3339());
        return Ok(None);
    }

    info!(
        "Closed window [{}, {}): {} events, {} users",
        window.start.to_rfc3339(),
        window.end.to_rfc3339(),
        summary.total_events,
        summary.unique_users
    );
    state.event_bus.emit_lossy(PipelineEvent::WindowClosed {
        window: summary.clone(),
        timestamp: Utc::now(),
    });
    Ok(Some(summary))
}

/// Delay after a bucket ends before it is closed, for in-flight events
pub const CLOSE_GRACE: Duration = Duration::from_secs(2);

/// Most windows closed in one tick after a stall; older ones are skipped
pub const MAX_CATCH_UP: usize = 60;

/// Last fully elapsed bucket as of `now`
pub fn last_completed_window(now: DateTime<Utc>, width_secs: i64) -> TimeWindow {
    TimeWindow::containing(now, width_secs).previous()
}

/// Buckets to close on a tick: from `pending` (first bucket not yet
/// closed) through `target`, oldest first
///
/// Without a pending start, or after a stall longer than
/// [`MAX_CATCH_UP`] buckets, only the newest buckets are returned.
pub fn windows_to_close(pending: Option<DateTime<Utc>>, target: TimeWindow) -> Vec<TimeWindow> {
    let mut windows = vec![target];
    let Some(pending) = pending else {
        return windows;
    };
    while windows.len() < MAX_CATCH_UP {
        let earlier = windows[windows.len() - 1].previous();
        if earlier.start < pending {
            break;
        }
        windows.push(earlier);
    }
    windows.reverse();
    windows
}

/// Time from `now` until the next bucket boundary plus [`CLOSE_GRACE`]
fn first_tick_delay(now: DateTime<Utc>, width_secs: i64) -> Duration {
    let boundary = TimeWindow::containing(now, width_secs).end;
    (boundary - now).to_std().unwrap_or_default() + CLOSE_GRACE
}

/// Spawn the periodic roll-up task
///
/// Ticks are aligned to bucket boundaries plus [`CLOSE_GRACE`]. A window
/// that fails to close is retried on the next tick.
pub fn spawn_window_rollup(state: AppState) -> JoinHandle<()> {
    let width = state.config.window_secs.max(1);
    info!("Starting window roll-up (width: {}s, grace: {:?})", width, CLOSE_GRACE);

    tokio::spawn(async move {
        let start = Instant::now() + first_tick_delay(Utc::now(), width);
        let mut timer = interval_at(start, Duration::from_secs(width as u64));
        timer.set_missed_tick_behavior(MissedTickBehavior::Delay);

        let mut pending: Option<DateTime<Utc>> = None;
        loop {
            timer.tick().await;
            let grace = chrono::Duration::seconds(CLOSE_GRACE.as_secs() as i64);
            let target = last_completed_window(Utc::now() - grace, width);
            for window in windows_to_close(pending, target) {
                if let Err(e) = close_window(&state, window).await {
                    error!("Window roll-up failed: {}", e);
                    state
                        .record_error(format!("roll-up of {} failed: {}", window.start.to_rfc3339(), e))
                        .await;
                    pending.get_or_insert(window.start);
                    break;
                }
                pending = Some(window.end);
            }
        }
    })
}
