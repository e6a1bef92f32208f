//! Canonical event model
//!
//! The validated, flattened representation of one user/track interaction.
//! Produced only by [`crate::normalize`]; every other stage consumes it
//! read-only.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Type of user interaction
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventType {
    Play,
    Pause,
    Skip,
    Like,
    Share,
}

impl EventType {
    pub const ALL: [EventType; 5] = [
        EventType::Play,
        EventType::Pause,
        EventType::Skip,
        EventType::Like,
        EventType::Share,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            EventType::Play => "play",
            EventType::Pause => "pause",
            EventType::Skip => "skip",
            EventType::Like => "like",
            EventType::Share => "share",
        }
    }

    /// Explicit interaction beyond listening
    pub fn is_interactive(&self) -> bool {
        matches!(self, EventType::Like | EventType::Share)
    }
}

impl fmt::Display for EventType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for EventType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        EventType::ALL
            .into_iter()
            .find(|t| t.as_str() == s)
            .ok_or_else(|| format!("unknown event type `{}`", s))
    }
}

/// Streaming platform the event originated from
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Platform {
    Spotify,
    AppleMusic,
    YoutubeMusic,
    AmazonMusic,
    Tidal,
    Soundcloud,
    Pandora,
}

impl Platform {
    pub const ALL: [Platform; 7] = [
        Platform::Spotify,
        Platform::AppleMusic,
        Platform::YoutubeMusic,
        Platform::AmazonMusic,
        Platform::Tidal,
        Platform::Soundcloud,
        Platform::Pandora,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Platform::Spotify => "spotify",
            Platform::AppleMusic => "apple_music",
            Platform::YoutubeMusic => "youtube_music",
            Platform::AmazonMusic => "amazon_music",
            Platform::Tidal => "tidal",
            Platform::Soundcloud => "soundcloud",
            Platform::Pandora => "pandora",
        }
    }

    /// Human-facing name used in generated descriptions
    pub fn display_name(&self) -> &'static str {
        match self {
            Platform::Spotify => "Spotify",
            Platform::AppleMusic => "Apple Music",
            Platform::YoutubeMusic => "YouTube Music",
            Platform::AmazonMusic => "Amazon Music",
            Platform::Tidal => "Tidal",
            Platform::Soundcloud => "SoundCloud",
            Platform::Pandora => "Pandora",
        }
    }
}

impl fmt::Display for Platform {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Platform {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Platform::ALL
            .into_iter()
            .find(|p| p.as_str() == s)
            .ok_or_else(|| format!("unknown platform `{}`", s))
    }
}

/// Repeat setting of the player when the event fired
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RepeatMode {
    #[default]
    Off,
    Track,
    Context,
}

impl FromStr for RepeatMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "off" => Ok(RepeatMode::Off),
            "track" => Ok(RepeatMode::Track),
            "context" => Ok(RepeatMode::Context),
            other => Err(format!("repeat mode must be one of off, track, context (got `{}`)", other)),
        }
    }
}

/// Track metadata carried on the event
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TrackMeta {
    pub id: String,
    pub title: Option<String>,
    pub album: Option<String>,
    pub duration_ms: Option<u64>,
    /// Lower-cased, deduplicated, in source order
    pub genres: Vec<String>,
    pub release_year: Option<i32>,
    pub popularity: Option<u8>,
    pub explicit: bool,
    /// Audio features, each in [0, 1]
    pub energy: Option<f64>,
    pub valence: Option<f64>,
    /// Beats per minute
    pub tempo: Option<f64>,
}

/// Artist metadata carried on the event
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ArtistMeta {
    pub id: Option<String>,
    pub name: Option<String>,
    pub genres: Vec<String>,
    pub followers: Option<u64>,
    pub verified: bool,
    pub country: Option<String>,
}

/// Player state at the time of the event
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PlaybackContext {
    pub repeat_mode: RepeatMode,
    pub shuffle_mode: bool,
    pub skip_reason: Option<String>,
    pub playlist_id: Option<String>,
}

/// Listener and stream context
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ListeningContext {
    pub device_type: Option<String>,
    pub location: Option<String>,
    pub subscription_type: Option<String>,
    pub stream_quality: Option<String>,
    pub bitrate_kbps: Option<u32>,
}

/// Validated, normalized representation of a single user-track interaction
///
/// Invariant: `played_duration_ms <= track.duration_ms` whenever both are
/// present (enforced by normalization).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CanonicalEvent {
    pub event_id: String,
    pub event_type: EventType,
    pub timestamp: DateTime<Utc>,
    pub track: TrackMeta,
    pub artist: ArtistMeta,
    pub user_id: String,
    pub session_id: Option<String>,
    pub platform: Platform,
    pub played_duration_ms: Option<u64>,
    #[serde(default)]
    pub playback: PlaybackContext,
    #[serde(default)]
    pub context: ListeningContext,
}

impl CanonicalEvent {
    /// Genre text used by genre rules: track genres first, then artist genres
    pub fn genre_text(&self) -> String {
        self.track
            .genres
            .iter()
            .chain(self.artist.genres.iter())
            .map(String::as_str)
            .collect::<Vec<_>>()
            .join(" ")
    }

    /// First known genre, track before artist
    pub fn primary_genre(&self) -> Option<&str> {
        self.track
            .genres
            .first()
            .or_else(|| self.artist.genres.first())
            .map(String::as_str)
    }
}
