//! Sample catalog, cursor and seeded event generator
//!
//! Produces raw input payloads (the nested JSON shape accepted by
//! [`crate::normalize`]) for demos, load tests and the batch CLI.

use chrono::{DateTime, Duration, Utc};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde::Serialize;
use serde_json::{json, Value};
use uuid::Uuid;

use crate::model::{EventType, Platform};

/// One catalog entry
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct SampleTrack {
    pub id: &'static str,
    pub title: &'static str,
    pub artist: &'static str,
    /// Empty when the catalog has no genre for the track
    pub genre: &'static str,
    pub album: &'static str,
    pub duration_ms: u64,
    pub release_year: i32,
}

const fn track(
    id: &'static str,
    title: &'static str,
    artist: &'static str,
    genre: &'static str,
    album: &'static str,
    duration_ms: u64,
    release_year: i32,
) -> SampleTrack {
    SampleTrack {
        id,
        title,
        artist,
        genre,
        album,
        duration_ms,
        release_year,
    }
}

/// Well-known tracks, plus a few unknown acts that only genre rules or the fallback can place
pub const CATALOG: &[SampleTrack] = &[
    track("trk-001", "Hotel California", "Eagles", "rock", "Hotel California", 391_000, 1976),
    track("trk-002", "Bohemian Rhapsody", "Queen", "rock", "A Night at the Opera", 354_000, 1975),
    track("trk-003", "Stairway to Heaven", "Led Zeppelin", "rock", "Led Zeppelin IV", 482_000, 1971),
    track("trk-004", "Sweet Child O' Mine", "Guns N' Roses", "rock", "Appetite for Destruction", 356_000, 1987),
    track("trk-005", "Billie Jean", "Michael Jackson", "pop", "Thriller", 294_000, 1982),
    track("trk-006", "Imagine", "John Lennon", "pop", "Imagine", 183_000, 1971),
    track("trk-007", "Smells Like Teen Spirit", "Nirvana", "grunge", "Nevermind", 301_000, 1991),
    track("trk-008", "Superstition", "Stevie Wonder", "funk", "Talking Book", 245_000, 1972),
    track("trk-009", "Respect", "Aretha Franklin", "soul", "I Never Loved a Man the Way I Love You", 147_000, 1967),
    track("trk-010", "Purple Haze", "Jimi Hendrix", "rock", "Are You Experienced", 170_000, 1967),
    track("trk-011", "Good Vibrations", "The Beach Boys", "pop", "Smiley Smile", 215_000, 1967),
    track("trk-012", "What's Going On", "Marvin Gaye", "soul", "What's Going On", 233_000, 1971),
    track("trk-013", "Johnny B. Goode", "Chuck Berry", "rock", "Chuck Berry Is on Top", 161_000, 1959),
    track("trk-014", "I Want to Hold Your Hand", "The Beatles", "pop", "Meet the Beatles!", 145_000, 1964),
    track("trk-015", "Like a Rolling Stone", "Bob Dylan", "folk", "Highway 61 Revisited", 369_000, 1965),
    track("trk-016", "Moonlight Serenade", "Silver Moon", "jazz", "Lunar Cycle", 212_000, 2019),
    track("trk-017", "Midnight Dance", "The Midnight Runners", "electronic", "First Light", 264_000, 2021),
    track("trk-018", "Urban Rhythm", "Urban Waves", "hip_hop", "Urban Stories", 198_000, 2022),
    track("trk-019", "Desert Wind", "Desert Storm", "", "Desert Tales", 276_000, 2018),
];

const DEVICE_TYPES: &[&str] = &["mobile", "desktop", "tablet", "smart_speaker", "car_system"];
const LOCATIONS: &[&str] = &["US", "UK", "DE", "FR", "CA", "AU", "JP", "BR", "IN", "MX"];
const SUBSCRIPTIONS: &[&str] = &["free", "premium", "family", "student"];
const QUALITIES: &[&str] = &["low", "medium", "high", "lossless"];
const BITRATES: &[u32] = &[128, 192, 256, 320];

/// Event type mix of generated traffic: play 70, skip 20, like 5, share 3, pause 2
pub const EVENT_TYPE_WEIGHTS: [(EventType, u32); 5] = [
    (EventType::Play, 70),
    (EventType::Skip, 20),
    (EventType::Like, 5),
    (EventType::Share, 3),
    (EventType::Pause, 2),
];

/// Caller-owned position in the catalog/platform cycle
///
/// Tracks and platforms advance together, so consecutive events walk both
/// lists. The position is a plain counter and can be handed back and forth
/// over HTTP.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SampleCursor {
    position: u64,
}

impl SampleCursor {
    pub fn new(position: u64) -> Self {
        Self { position }
    }

    pub fn position(&self) -> u64 {
        self.position
    }

    pub fn track(&self) -> &'static SampleTrack {
        &CATALOG[(self.position % CATALOG.len() as u64) as usize]
    }

    pub fn platform(&self) -> Platform {
        Platform::ALL[(self.position % Platform::ALL.len() as u64) as usize]
    }

    /// Cursor for the following event
    pub fn advanced(&self) -> Self {
        Self {
            position: self.position.wrapping_add(1),
        }
    }

    /// Full play of the current track on the current platform
    pub fn raw_event(&self, user_id: &str, timestamp: DateTime<Utc>) -> Value {
        let track = self.track();
        let played = track.duration_ms - track.duration_ms / 40;
        raw_payload(&RawSpec {
            event_id: Uuid::new_v4(),
            event_type: EventType::Play,
            timestamp,
            track,
            platform: self.platform(),
            user_id,
            session_id: None,
            played_duration_ms: Some(played),
            extras: None,
        })
    }

    /// Return the event at this position and advance
    pub fn next_event(&mut self, user_id: &str, timestamp: DateTime<Utc>) -> Value {
        let event = self.raw_event(user_id, timestamp);
        *self = self.advanced();
        event
    }
}

/// Seeded generator of realistic raw traffic
pub struct SampleGenerator {
    rng: StdRng,
    user_pool: u32,
}

impl SampleGenerator {
    /// Same seed, same events
    pub fn new(seed: u64) -> Self {
        Self {
            rng: StdRng::seed_from_u64(seed),
            user_pool: 1000,
        }
    }

    /// Draw users from `user-0001..=user-{pool}`
    pub fn with_user_pool(mut self, pool: u32) -> Self {
        self.user_pool = pool.max(1);
        self
    }

    /// One raw event within the hour before `now`
    pub fn next_event(&mut self, now: DateTime<Utc>) -> Value {
        let total: u32 = EVENT_TYPE_WEIGHTS.iter().map(|(_, w)| w).sum();
        let event_type = pick_event_type(self.rng.gen_range(0..total));
        let track = &CATALOG[self.rng.gen_range(0..CATALOG.len())];
        let platform = Platform::ALL[self.rng.gen_range(0..Platform::ALL.len())];
        let user_id = format!("user-{:04}", self.rng.gen_range(1..=self.user_pool));
        let session_id = format!("session-{:06}", self.rng.gen_range(1..=10_000));
        let timestamp = now - Duration::seconds(self.rng.gen_range(0..3600));

        let ratio = match event_type {
            // two-uniform average: bell shaped around 0.5
            EventType::Play => Some((self.rng.gen::<f64>() + self.rng.gen::<f64>()) / 2.0),
            EventType::Skip => Some(self.rng.gen_range(0.0..0.3)),
            EventType::Pause => Some(self.rng.gen::<f64>()),
            EventType::Like | EventType::Share => None,
        };
        let played_duration_ms = ratio.map(|r| (track.duration_ms as f64 * r) as u64);

        let repeat_mode = match self.rng.gen_range(0..100) {
            0..=69 => "off",
            70..=89 => "track",
            _ => "context",
        };
        let extras = Extras {
            device_type: DEVICE_TYPES[self.rng.gen_range(0..DEVICE_TYPES.len())],
            location: LOCATIONS[self.rng.gen_range(0..LOCATIONS.len())],
            subscription_type: SUBSCRIPTIONS[self.rng.gen_range(0..SUBSCRIPTIONS.len())],
            stream_quality: QUALITIES[self.rng.gen_range(0..QUALITIES.len())],
            bandwidth_kbps: BITRATES[self.rng.gen_range(0..BITRATES.len())],
            followers: self.rng.gen_range(1_000..5_000_000),
            repeat_mode,
            shuffle_mode: self.rng.gen_bool(0.5),
        };
        let event_id = uuid::Builder::from_random_bytes(self.rng.gen()).into_uuid();

        raw_payload(&RawSpec {
            event_id,
            event_type,
            timestamp,
            track,
            platform,
            user_id: &user_id,
            session_id: Some(&session_id),
            played_duration_ms,
            extras: Some(extras),
        })
    }

    pub fn generate(&mut self, count: usize, now: DateTime<Utc>) -> Vec<Value> {
        (0..count).map(|_| self.next_event(now)).collect()
    }
}

fn pick_event_type(roll: u32) -> EventType {
    let mut upper = 0;
    for (event_type, weight) in EVENT_TYPE_WEIGHTS {
        upper += weight;
        if roll < upper {
            return event_type;
        }
    }
    EventType::Play
}

struct Extras {
    device_type: &'static str,
    location: &'static str,
    subscription_type: &'static str,
    stream_quality: &'static str,
    bandwidth_kbps: u32,
    followers: u64,
    repeat_mode: &'static str,
    shuffle_mode: bool,
}

struct RawSpec<'a> {
    event_id: Uuid,
    event_type: EventType,
    timestamp: DateTime<Utc>,
    track: &'a SampleTrack,
    platform: Platform,
    user_id: &'a str,
    session_id: Option<&'a str>,
    played_duration_ms: Option<u64>,
    extras: Option<Extras>,
}

fn raw_payload(spec: &RawSpec<'_>) -> Value {
    let track = spec.track;
    let mut raw = json!({
        "event_id": spec.event_id.to_string(),
        "event_type": spec.event_type.as_str(),
        "timestamp": spec.timestamp.to_rfc3339(),
        "track": {
            "id": track.id,
            "title": track.title,
            "album": track.album,
            "duration_ms": track.duration_ms,
            "release_year": track.release_year,
        },
        "artist": {
            "name": track.artist,
        },
        "user_interaction": {
            "user_id": spec.user_id,
        },
        "streaming_event": {
            "platform": spec.platform.as_str(),
        },
    });
    if !track.genre.is_empty() {
        raw["track"]["genre"] = json!(track.genre);
    }
    if let Some(session_id) = spec.session_id {
        raw["user_interaction"]["session_id"] = json!(session_id);
    }
    if let Some(played) = spec.played_duration_ms {
        raw["play_event"] = json!({ "played_duration_ms": played });
    }
    if let Some(extras) = &spec.extras {
        raw["artist"]["followers"] = json!(extras.followers);
        raw["user_interaction"]["device_type"] = json!(extras.device_type);
        raw["user_interaction"]["location"] = json!(extras.location);
        raw["user_interaction"]["subscription_type"] = json!(extras.subscription_type);
        raw["streaming_event"]["stream_quality"] = json!(extras.stream_quality);
        raw["streaming_event"]["bandwidth_kbps"] = json!(extras.bandwidth_kbps);
        if raw.get("play_event").is_none() {
            raw["play_event"] = json!({});
        }
        raw["play_event"]["repeat_mode"] = json!(extras.repeat_mode);
        raw["play_event"]["shuffle_mode"] = json!(extras.shuffle_mode);
    }
    raw
}
