//! Windowed aggregation of canonical events
//!
//! Aggregation is order independent: sets for cardinalities, ordered maps
//! for distributions, and engagement summed in integer micro-units so the
//! floating point average does not depend on summation order.

use std::collections::{BTreeMap, HashSet};

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

use crate::derive::{derive, round_to};
use crate::model::{CanonicalEvent, EventType, Platform};
use crate::time::align_down;
use crate::{Error, Result};

const MICROS: f64 = 1_000_000.0;

/// Half-open interval `[start, end)`
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct TimeWindow {
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
}

impl TimeWindow {
    pub fn new(start: DateTime<Utc>, end: DateTime<Utc>) -> Result<Self> {
        if end <= start {
            return Err(Error::InvalidInput(format!(
                "window end {} is not after start {}",
                end.to_rfc3339(),
                start.to_rfc3339()
            )));
        }
        Ok(Self { start, end })
    }

    /// Fixed, epoch-aligned bucket of `width_secs` containing `ts`
    pub fn containing(ts: DateTime<Utc>, width_secs: i64) -> Self {
        let width = width_secs.max(1);
        let start = align_down(ts, width);
        Self {
            start,
            end: start + Duration::seconds(width),
        }
    }

    pub fn contains(&self, ts: DateTime<Utc>) -> bool {
        self.start <= ts && ts < self.end
    }

    pub fn width_secs(&self) -> i64 {
        (self.end - self.start).num_seconds()
    }

    /// Bucket immediately before this one, same width
    pub fn previous(&self) -> Self {
        let width = self.end - self.start;
        Self {
            start: self.start - width,
            end: self.start,
        }
    }
}

/// Summary of all events in one window
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AggregateWindow {
    pub window_start: DateTime<Utc>,
    pub window_end: DateTime<Utc>,
    pub total_events: u64,
    pub unique_users: u64,
    pub unique_tracks: u64,
    /// Observed platforms only
    pub platform_distribution: BTreeMap<String, u64>,
    /// Observed event types only
    pub event_type_distribution: BTreeMap<String, u64>,
    /// 0.0 for an empty window
    pub average_engagement_score: f64,
}

impl AggregateWindow {
    pub fn window(&self) -> TimeWindow {
        TimeWindow {
            start: self.window_start,
            end: self.window_end,
        }
    }
}

/// Mergeable partial state for one window
#[derive(Debug, Clone)]
pub struct WindowAccumulator {
    window: TimeWindow,
    total_events: u64,
    users: HashSet<String>,
    tracks: HashSet<String>,
    platforms: BTreeMap<Platform, u64>,
    event_types: BTreeMap<EventType, u64>,
    engagement_micros: u64,
}

impl WindowAccumulator {
    pub fn new(window: TimeWindow) -> Self {
        Self {
            window,
            total_events: 0,
            users: HashSet::new(),
            tracks: HashSet::new(),
            platforms: BTreeMap::new(),
            event_types: BTreeMap::new(),
            engagement_micros: 0,
        }
    }

    pub fn window(&self) -> TimeWindow {
        self.window
    }

    /// Add an event with an already computed engagement score
    ///
    /// Returns `false` (and ignores the event) when it lies outside the window.
    pub fn add_scored(&mut self, event: &CanonicalEvent, engagement_score: f64) -> bool {
        if !self.window.contains(event.timestamp) {
            return false;
        }
        self.total_events += 1;
        self.users.insert(event.user_id.clone());
        self.tracks.insert(event.track.id.clone());
        *self.platforms.entry(event.platform).or_insert(0) += 1;
        *self.event_types.entry(event.event_type).or_insert(0) += 1;
        self.engagement_micros += (engagement_score.clamp(0.0, 1.0) * MICROS).round() as u64;
        true
    }

    pub fn add(&mut self, event: &CanonicalEvent) -> bool {
        let score = derive(event).engagement_score;
        self.add_scored(event, score)
    }

    /// Combine two partial accumulators of the same window
    pub fn merge(&mut self, other: WindowAccumulator) -> Result<()> {
        if other.window != self.window {
            return Err(Error::InvalidInput(
                "cannot merge accumulators of different windows".to_string(),
            ));
        }
        self.total_events += other.total_events;
        self.users.extend(other.users);
        self.tracks.extend(other.tracks);
        for (platform, count) in other.platforms {
            *self.platforms.entry(platform).or_insert(0) += count;
        }
        for (event_type, count) in other.event_types {
            *self.event_types.entry(event_type).or_insert(0) += count;
        }
        self.engagement_micros += other.engagement_micros;
        Ok(())
    }

    pub fn finish(&self) -> AggregateWindow {
        let average_engagement_score = if self.total_events == 0 {
            0.0
        } else {
            round_to(
                self.engagement_micros as f64 / self.total_events as f64 / MICROS,
                4,
            )
        };
        AggregateWindow {
            window_start: self.window.start,
            window_end: self.window.end,
            total_events: self.total_events,
            unique_users: self.users.len() as u64,
            unique_tracks: self.tracks.len() as u64,
            platform_distribution: self
                .platforms
                .iter()
                .map(|(p, c)| (p.as_str().to_string(), *c))
                .collect(),
            event_type_distribution: self
                .event_types
                .iter()
                .map(|(t, c)| (t.as_str().to_string(), *c))
                .collect(),
            average_engagement_score,
        }
    }
}

/// Summarize the events falling inside `window`; others are ignored
pub fn aggregate<'a, I>(events: I, window: TimeWindow) -> AggregateWindow
where
    I: IntoIterator<Item = &'a CanonicalEvent>,
{
    let mut acc = WindowAccumulator::new(window);
    for event in events {
        acc.add(event);
    }
    acc.finish()
}

/// Split a batch into consecutive fixed buckets, ordered by start time
///
/// Only buckets that contain at least one event are returned.
pub fn tumbling_windows<'a, I>(events: I, width_secs: i64) -> Vec<AggregateWindow>
where
    I: IntoIterator<Item = &'a CanonicalEvent>,
{
    let mut buckets: BTreeMap<TimeWindow, WindowAccumulator> = BTreeMap::new();
    for event in events {
        let window = TimeWindow::containing(event.timestamp, width_secs);
        buckets
            .entry(window)
            .or_insert_with(|| WindowAccumulator::new(window))
            .add(event);
    }
    buckets.values().map(WindowAccumulator::finish).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{ArtistMeta, TrackMeta};
    use chrono::TimeZone;

    fn at(minute: u32, second: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 3, 9, 18, minute, second).unwrap()
    }

    fn event(id: &str, user: &str, track: &str, platform: Platform, event_type: EventType, ts: DateTime<Utc>) -> CanonicalEvent {
        CanonicalEvent {
            event_id: id.to_string(),
            event_type,
            timestamp: ts,
            track: TrackMeta {
                id: track.to_string(),
                duration_ms: Some(200_000),
                ..Default::default()
            },
            artist: ArtistMeta::default(),
            user_id: user.to_string(),
            session_id: None,
            platform,
            played_duration_ms: Some(100_000),
            playback: Default::default(),
            context: Default::default(),
        }
    }

    fn window() -> TimeWindow {
        TimeWindow::new(at(30, 0), at(31, 0)).unwrap()
    }

    #[test]
    fn test_worked_example_three_events() {
        let events = vec![
            event("e1", "u1", "t1", Platform::Spotify, EventType::Play, at(30, 5)),
            event("e2", "u1", "t2", Platform::Spotify, EventType::Skip, at(30, 20)),
            event("e3", "u2", "t1", Platform::AppleMusic, EventType::Play, at(30, 40)),
        ];
        let agg = aggregate(&events, window());
        assert_eq!(agg.total_events, 3);
        assert_eq!(agg.unique_users, 2);
        assert_eq!(agg.unique_tracks, 2);
        assert_eq!(agg.platform_distribution.get("spotify"), Some(&2));
        assert_eq!(agg.platform_distribution.get("apple_music"), Some(&1));
        assert_eq!(agg.platform_distribution.len(), 2);
        assert_eq!(agg.event_type_distribution.get("play"), Some(&2));
        assert_eq!(agg.event_type_distribution.get("skip"), Some(&1));
    }

    #[test]
    fn test_half_open_boundaries() {
        let events = vec![
            event("start", "u1", "t1", Platform::Spotify, EventType::Play, at(30, 0)),
            event("end", "u1", "t1", Platform::Spotify, EventType::Play, at(31, 0)),
            event("before", "u1", "t1", Platform::Spotify, EventType::Play, at(29, 59)),
        ];
        let agg = aggregate(&events, window());
        assert_eq!(agg.total_events, 1);
    }

    #[test]
    fn test_empty_window() {
        let none: Vec<CanonicalEvent> = Vec::new();
        let agg = aggregate(&none, window());
        assert_eq!(agg.total_events, 0);
        assert_eq!(agg.average_engagement_score, 0.0);
        assert!(agg.platform_distribution.is_empty());
    }

    #[test]
    fn test_average_engagement() {
        // ratio 0.5: play 0.5 + 0.15 = 0.65, skip 0.65 - 0.2 = 0.45
        let events = vec![
            event("e1", "u1", "t1", Platform::Spotify, EventType::Play, at(30, 5)),
            event("e2", "u1", "t1", Platform::Spotify, EventType::Skip, at(30, 6)),
        ];
        let agg = aggregate(&events, window());
        assert_eq!(agg.average_engagement_score, 0.55);
    }

    #[test]
    fn test_order_independence() {
        let mut events: Vec<CanonicalEvent> = (0..20)
            .map(|i| {
                let event_type = EventType::ALL[i % EventType::ALL.len()];
                let platform = Platform::ALL[i % Platform::ALL.len()];
                let mut e = event(&format!("e{i}"), &format!("u{}", i % 4), &format!("t{}", i % 7), platform, event_type, at(30, i as u32));
                e.played_duration_ms = Some((i as u64 * 9_973) % 200_000);
                e
            })
            .collect();
        let forward = aggregate(&events, window());
        events.reverse();
        assert_eq!(aggregate(&events, window()), forward);
        events.rotate_left(7);
        assert_eq!(aggregate(&events, window()), forward);
    }

    #[test]
    fn test_merge_matches_single_pass() {
        let events: Vec<CanonicalEvent> = (0..10)
            .map(|i| event(&format!("e{i}"), &format!("u{}", i % 3), "t1", Platform::Tidal, EventType::Like, at(30, i)))
            .collect();
        let mut left = WindowAccumulator::new(window());
        let mut right = WindowAccumulator::new(window());
        for (i, e) in events.iter().enumerate() {
            if i % 2 == 0 {
                left.add(e);
            } else {
                right.add(e);
            }
        }
        left.merge(right).unwrap();
        assert_eq!(left.finish(), aggregate(&events, window()));
    }

    #[test]
    fn test_merge_rejects_other_window() {
        let mut acc = WindowAccumulator::new(window());
        let other = WindowAccumulator::new(window().previous());
        assert!(acc.merge(other).is_err());
    }

    #[test]
    fn test_containing_and_tumbling_windows() {
        let w = TimeWindow::containing(at(30, 42), 60);
        assert_eq!(w, window());
        assert_eq!(w.width_secs(), 60);

        let events = vec![
            event("e1", "u1", "t1", Platform::Spotify, EventType::Play, at(32, 10)),
            event("e2", "u1", "t1", Platform::Spotify, EventType::Play, at(30, 10)),
            event("e3", "u1", "t1", Platform::Spotify, EventType::Play, at(30, 50)),
        ];
        let windows = tumbling_windows(&events, 60);
        assert_eq!(windows.len(), 2);
        assert_eq!(windows[0].window_start, at(30, 0));
        assert_eq!(windows[0].total_events, 2);
        assert_eq!(windows[1].window_start, at(32, 0));
    }

    #[test]
    fn test_window_new_rejects_empty_interval() {
        assert!(TimeWindow::new(at(30, 0), at(30, 0)).is_err());
    }
}
