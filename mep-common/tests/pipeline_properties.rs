//! End-to-end properties of normalize → derive → enrich → aggregate
//!
//! Runs the pipeline over seeded generated traffic and checks the
//! invariants that must hold for every event, not just hand-picked ones.

use chrono::{DateTime, Duration, TimeZone, Utc};
use mep_common::enrich::{MAX_CONFIDENCE, MIN_CONFIDENCE};
use mep_common::samples::SampleGenerator;
use mep_common::{
    aggregate, derive, enrich, normalize, process, tumbling_windows, CanonicalEvent, EventType, RuleEnricher,
    TimeWindow, WindowAccumulator,
};
use rand::seq::SliceRandom;
use rand::SeedableRng;
use serde_json::json;

fn now() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2024, 3, 9, 19, 0, 0).unwrap()
}

fn batch(seed: u64, count: usize) -> Vec<CanonicalEvent> {
    SampleGenerator::new(seed)
        .with_user_pool(25)
        .generate(count, now())
        .iter()
        .map(|raw| normalize(raw).unwrap())
        .collect()
}

#[test]
fn test_derived_invariants_hold_for_generated_traffic() {
    for event in batch(3, 500) {
        let d = derive(&event);
        if let Some(ratio) = d.play_completion_ratio {
            assert!((0.0..=1.0).contains(&ratio));
            assert_eq!(d.is_full_play, ratio >= 0.9);
        }
        if event.event_type == EventType::Skip {
            assert!(d.is_skip);
        }
        assert!((0.0..=1.0).contains(&d.engagement_score));
        assert!(d.hour_of_day < 24);
        assert!(d.day_of_week < 7);
    }
}

#[test]
fn test_enrichment_invariants_hold_for_generated_traffic() {
    for event in batch(5, 300) {
        let d = derive(&event);
        let e = enrich(&event, &d);
        assert!((MIN_CONFIDENCE..=MAX_CONFIDENCE).contains(&e.enrichment_confidence));

        let mut seen = std::collections::HashSet::new();
        assert!(e.predicted_genres.iter().all(|g| seen.insert(g)), "duplicate genre in {:?}", e.predicted_genres);

        // re-running on the same input is bit-identical
        assert_eq!(derive(&event), d);
        assert_eq!(enrich(&event, &d), e);
    }
}

#[test]
fn test_aggregate_order_independent_under_shuffle() {
    let events = batch(9, 400);
    let window = TimeWindow::new(now() - Duration::hours(1), now()).unwrap();
    let expected = aggregate(&events, window);
    assert_eq!(expected.total_events, 400);

    let mut rng = rand::rngs::StdRng::seed_from_u64(99);
    for _ in 0..10 {
        let mut shuffled = events.clone();
        shuffled.shuffle(&mut rng);
        assert_eq!(aggregate(&shuffled, window), expected);
    }
}

#[test]
fn test_partitioned_accumulators_match_single_pass() {
    let events = batch(13, 240);
    let window = TimeWindow::new(now() - Duration::hours(1), now()).unwrap();

    let mut partials: Vec<WindowAccumulator> = (0..4).map(|_| WindowAccumulator::new(window)).collect();
    for (i, event) in events.iter().enumerate() {
        partials[i % 4].add(event);
    }
    let mut merged = WindowAccumulator::new(window);
    for partial in partials.into_iter().rev() {
        merged.merge(partial).unwrap();
    }
    assert_eq!(merged.finish(), aggregate(&events, window));
}

#[test]
fn test_tumbling_windows_cover_every_event() {
    let events = batch(21, 300);
    let windows = tumbling_windows(&events, 60);
    let total: u64 = windows.iter().map(|w| w.total_events).sum();
    assert_eq!(total, 300);
    for pair in windows.windows(2) {
        assert!(pair[0].window_end <= pair[1].window_start);
    }
}

#[test]
fn test_worked_examples_through_process() {
    let enricher = RuleEnricher::default();
    let full_play = json!({
        "event_id": "evt-1",
        "event_type": "play",
        "track": {"id": "trk-1", "title": "Hotel California", "duration_ms": 391000},
        "artist": {"name": "Eagles"},
        "user_interaction": {"user_id": "user-1"},
        "streaming_event": {"platform": "spotify"},
        "play_event": {"played_duration_ms": 380000}
    });
    let record = process(&full_play, Some(&enricher)).unwrap();
    let ratio = record.derived.play_completion_ratio.unwrap();
    assert!((ratio - 0.972).abs() < 0.001);
    assert!(record.derived.is_full_play);
    assert!(!record.derived.is_skip);
    let enrichment = record.enrichment.unwrap();
    assert!(enrichment.mood_analysis.to_lowercase().contains("melancholic"));
    assert_eq!(enrichment.similar_tracks[0], "Take It Easy");

    let skip = json!({
        "event_id": "evt-2",
        "event_type": "skip",
        "track": {"id": "trk-2", "title": "Untitled", "duration_ms": "200000"},
        "artist": {"name": "Unknown Artist"},
        "user_interaction": {"user_id": "user-1"},
        "streaming_event": {"platform": "pandora"},
        "play_event": {"played_duration_ms": 15000}
    });
    let record = process(&skip, Some(&enricher)).unwrap();
    assert!(record.derived.is_skip);
    assert_eq!(record.derived.play_completion_ratio, Some(0.075));
    let enrichment = record.enrichment.unwrap();
    assert!(enrichment.is_fallback());
    assert_eq!(enrichment.enrichment_confidence, 0.55);
}
