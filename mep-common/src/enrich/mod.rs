//! Heuristic event enrichment
//!
//! Deterministic stand-in for an LLM call: an ordered rule table keyed by
//! case-insensitive substrings of the artist name and track title, then the
//! event's genres, then a generic fallback bundle.
//!
//! `listening_context` is the exception: events at 06:00-08:59 or
//! 22:00-23:59 (UTC) get a time-of-day context regardless of the rule.
//!
//! # Confidence
//! `enrichment_confidence` is a heuristic proxy for how complete the input
//! was. It is NOT the certainty of a model and carries no probabilistic
//! meaning:
//!
//! | populated input            | weight |
//! |----------------------------|--------|
//! | (base)                     | 0.50   |
//! | track or artist genre      | 0.15   |
//! | artist follower count      | 0.10   |
//! | platform                   | 0.05   |
//! | known-artist rule hit      | 0.15   |
//!
//! The sum is clamped to [0.5, 0.95] and never decreases when more fields
//! are populated.

pub mod rules;

use once_cell::sync::Lazy;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::derive::{round_to, DerivedFields};
use crate::model::{CanonicalEvent, EventType};
pub use rules::{ArtistRule, FallbackBundle, GenreRule, RuleBundle, RuleTable};

pub const MIN_CONFIDENCE: f64 = 0.5;
pub const MAX_CONFIDENCE: f64 = 0.95;

const GENRE_WEIGHT: f64 = 0.15;
const FOLLOWERS_WEIGHT: f64 = 0.10;
const PLATFORM_WEIGHT: f64 = 0.05;
const KNOWN_ARTIST_WEIGHT: f64 = 0.15;

const MORNING_CONTEXT: &str = "Morning commute or workout";
const LATE_EVENING_CONTEXT: &str = "Evening relaxation or party";

/// Which rule produced an enrichment
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum MatchedRule {
    KnownArtist { artist: String },
    Genre { genre: String },
    /// No rule matched; the generic bundle was used. Not an error.
    Fallback,
}

/// Heuristic, rule-based augmentation of an event
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Enrichment {
    pub event_description: String,
    pub mood_analysis: String,
    /// Ordered, deduplicated
    pub predicted_genres: Vec<String>,
    pub listening_context: String,
    pub similar_tracks: Vec<String>,
    /// In [0.5, 0.95]; see module docs
    pub enrichment_confidence: f64,
    pub matched_rule: MatchedRule,
}

impl MatchedRule {
    /// Rule kind as it appears on the wire
    pub fn kind(&self) -> &'static str {
        match self {
            MatchedRule::KnownArtist { .. } => "known_artist",
            MatchedRule::Genre { .. } => "genre",
            MatchedRule::Fallback => "fallback",
        }
    }
}

impl Enrichment {
    pub fn is_fallback(&self) -> bool {
        self.matched_rule == MatchedRule::Fallback
    }
}

/// Enrichment seam; callers may substitute canned responses
pub trait Enricher: Send + Sync {
    fn enrich(&self, event: &CanonicalEvent, derived: &DerivedFields) -> Enrichment;
}

/// Rule-table enricher
#[derive(Debug, Clone, Default)]
pub struct RuleEnricher {
    table: RuleTable,
}

impl RuleEnricher {
    pub fn new(table: RuleTable) -> Self {
        Self { table }
    }

    pub fn table(&self) -> &RuleTable {
        &self.table
    }
}

impl Enricher for RuleEnricher {
    fn enrich(&self, event: &CanonicalEvent, derived: &DerivedFields) -> Enrichment {
        let artist_lower = event.artist.name.as_deref().unwrap_or_default().to_lowercase();
        let title_lower = event.track.title.as_deref().unwrap_or_default().to_lowercase();
        let genre_lower = event.genre_text().to_lowercase();

        let (bundle, matched_rule) = if let Some(rule) = self
            .table
            .artists
            .iter()
            .find(|r| r.matches(&artist_lower, &title_lower))
        {
            (
                rule.bundle.clone(),
                MatchedRule::KnownArtist {
                    artist: rule.name.clone(),
                },
            )
        } else if let Some(rule) = self.table.genres.iter().find(|r| r.matches(&genre_lower)) {
            (
                rule.bundle.clone(),
                MatchedRule::Genre {
                    genre: rule.name.clone(),
                },
            )
        } else {
            (fallback_bundle(&self.table.fallback, event), MatchedRule::Fallback)
        };

        let known_artist = matches!(matched_rule, MatchedRule::KnownArtist { .. });
        debug!(
            event_id = %event.event_id,
            rule = ?matched_rule,
            "Enrichment rule selected"
        );

        Enrichment {
            event_description: describe(event, derived),
            mood_analysis: bundle.mood,
            predicted_genres: dedup(bundle.genres),
            listening_context: time_of_day_context(derived.hour_of_day)
                .map(str::to_string)
                .unwrap_or(bundle.context),
            similar_tracks: bundle.similar_tracks,
            enrichment_confidence: confidence(event, known_artist),
            matched_rule,
        }
    }
}

/// Listening context implied by the hour alone; beats any rule bundle
pub fn time_of_day_context(hour: u32) -> Option<&'static str> {
    match hour {
        6..=8 => Some(MORNING_CONTEXT),
        22..=23 => Some(LATE_EVENING_CONTEXT),
        _ => None,
    }
}

static BUILTIN: Lazy<RuleEnricher> = Lazy::new(RuleEnricher::default);

/// Enrich with the built-in rule table
pub fn enrich(event: &CanonicalEvent, derived: &DerivedFields) -> Enrichment {
    BUILTIN.enrich(event, derived)
}

fn fallback_bundle(fallback: &FallbackBundle, event: &CanonicalEvent) -> RuleBundle {
    let genres = match event.primary_genre() {
        Some(genre) => std::iter::once(genre.to_string())
            .chain(fallback.genre_suffix.iter().cloned())
            .collect(),
        None => fallback.unknown_genres.clone(),
    };
    RuleBundle {
        mood: fallback.mood.clone(),
        genres,
        context: fallback.context.clone(),
        similar_tracks: fallback.similar_tracks.clone(),
    }
}

/// Completeness-weighted confidence, see module docs
pub fn confidence(event: &CanonicalEvent, known_artist: bool) -> f64 {
    let mut score = MIN_CONFIDENCE;
    if !event.track.genres.is_empty() || !event.artist.genres.is_empty() {
        score += GENRE_WEIGHT;
    }
    if event.artist.followers.is_some() {
        score += FOLLOWERS_WEIGHT;
    }
    // platform is a required field today, weighted anyway so the formula
    // stays meaningful for sources where it is not
    score += PLATFORM_WEIGHT;
    if known_artist {
        score += KNOWN_ARTIST_WEIGHT;
    }
    round_to(score.clamp(MIN_CONFIDENCE, MAX_CONFIDENCE), 2)
}

fn describe(event: &CanonicalEvent, derived: &DerivedFields) -> String {
    let title = event.track.title.as_deref().unwrap_or("an untitled track");
    let artist = event.artist.name.as_deref().unwrap_or("an unknown artist");
    let platform = event.platform.display_name();

    let mut description = match event.event_type {
        EventType::Play if derived.is_full_play => {
            format!("User played {} by {} all the way through on {}", title, artist, platform)
        }
        EventType::Play if derived.is_skip => {
            format!("User briefly played {} by {} on {}", title, artist, platform)
        }
        EventType::Play => format!("User is enjoying {} by {} on {}", title, artist, platform),
        EventType::Pause => format!("User paused {} by {} on {}", title, artist, platform),
        EventType::Skip => format!("User skipped {} by {} on {}", title, artist, platform),
        EventType::Like => format!("User liked {} by {} on {}", title, artist, platform),
        EventType::Share => format!("User shared {} by {} on {}", title, artist, platform),
    };
    if let Some(quality) = &event.context.stream_quality {
        description.push_str(&format!(" with {}-quality streaming", quality));
    }
    description
}

fn dedup(items: Vec<String>) -> Vec<String> {
    let mut out: Vec<String> = Vec::with_capacity(items.len());
    for item in items {
        if !out.contains(&item) {
            out.push(item);
        }
    }
    out
}
