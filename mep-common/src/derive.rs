//! Derived analytics fields
//!
//! [`derive`] is a pure function of the [`CanonicalEvent`]: same input,
//! bit-identical output, so redelivered events re-derive to the same row.
//! Missing inputs never fail the derivation; the affected fields become
//! `None` and a [`DerivationWarning`] records why.

use chrono::{Datelike, Timelike};
use serde::{Deserialize, Serialize};

use crate::model::{CanonicalEvent, EventType, Platform, RepeatMode};

/// Tracks longer than this are "long" (5 minutes)
pub const LONG_TRACK_SECS: f64 = 300.0;
/// Tracks shorter than this are "short" (2 minutes)
pub const SHORT_TRACK_SECS: f64 = 120.0;
/// Completion at or above this ratio counts as a full play
pub const FULL_PLAY_RATIO: f64 = 0.9;
/// Completion below this ratio counts as a skip
pub const SKIP_RATIO: f64 = 0.1;
/// Engagement when the completion ratio is unknown
pub const BASELINE_ENGAGEMENT: f64 = 0.3;

/// Non-fatal derivation issue explaining a null field
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DerivationWarning {
    /// Track duration absent: duration and completion fields are null
    MissingTrackDuration,
    /// Track duration is zero: completion ratio would divide by zero
    ZeroTrackDuration,
    /// No played duration: completion ratio is null
    MissingPlayedDuration,
}

/// Coarse platform business model
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PlatformCategory {
    Premium,
    AdSupported,
    Other,
}

impl PlatformCategory {
    pub fn of(platform: Platform) -> Self {
        match platform {
            Platform::Spotify | Platform::AppleMusic | Platform::Tidal => PlatformCategory::Premium,
            Platform::YoutubeMusic | Platform::Soundcloud | Platform::Pandora => {
                PlatformCategory::AdSupported
            }
            Platform::AmazonMusic => PlatformCategory::Other,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            PlatformCategory::Premium => "premium",
            PlatformCategory::AdSupported => "ad_supported",
            PlatformCategory::Other => "other",
        }
    }
}

/// Part of the day the event falls in
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TimeContext {
    MorningCommute,
    LunchBreak,
    EveningCommute,
    EveningRelaxation,
    Other,
}

impl TimeContext {
    pub fn of_hour(hour: u32) -> Self {
        match hour {
            6..=9 => TimeContext::MorningCommute,
            12..=14 => TimeContext::LunchBreak,
            17..=19 => TimeContext::EveningCommute,
            20..=23 => TimeContext::EveningRelaxation,
            _ => TimeContext::Other,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            TimeContext::MorningCommute => "morning_commute",
            TimeContext::LunchBreak => "lunch_break",
            TimeContext::EveningCommute => "evening_commute",
            TimeContext::EveningRelaxation => "evening_relaxation",
            TimeContext::Other => "other",
        }
    }
}

/// Analytics attributes computed from one canonical event
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DerivedFields {
    /// 0..=23, UTC
    pub hour_of_day: u32,
    /// 0..=6, Monday = 0
    pub day_of_week: u32,
    pub is_weekend: bool,
    pub month: u32,
    pub year: i32,
    pub track_duration_seconds: Option<f64>,
    pub is_long_track: Option<bool>,
    pub is_short_track: Option<bool>,
    /// played / duration clamped to [0, 1]; null when either side is unknown or duration is zero
    pub play_completion_ratio: Option<f64>,
    pub is_full_play: bool,
    pub is_skip: bool,
    /// [0, 1]
    pub engagement_score: f64,
    pub platform_category: PlatformCategory,
    pub time_context: TimeContext,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub warnings: Vec<DerivationWarning>,
}

/// Compute the derived analytics fields of an event
pub fn derive(event: &CanonicalEvent) -> DerivedFields {
    let mut warnings = Vec::new();
    let ts = event.timestamp;
    let weekday = ts.weekday().num_days_from_monday();

    let duration_secs = match event.track.duration_ms {
        Some(ms) => Some(ms as f64 / 1000.0),
        None => {
            warnings.push(DerivationWarning::MissingTrackDuration);
            None
        }
    };

    let play_completion_ratio = completion_ratio(event, &mut warnings);

    let is_full_play = play_completion_ratio.is_some_and(|r| r >= FULL_PLAY_RATIO);
    let is_skip = event.event_type == EventType::Skip
        || play_completion_ratio.is_some_and(|r| r < SKIP_RATIO);

    DerivedFields {
        hour_of_day: ts.hour(),
        day_of_week: weekday,
        is_weekend: weekday >= 5,
        month: ts.month(),
        year: ts.year(),
        track_duration_seconds: duration_secs,
        is_long_track: duration_secs.map(|s| s > LONG_TRACK_SECS),
        is_short_track: duration_secs.map(|s| s < SHORT_TRACK_SECS),
        play_completion_ratio,
        is_full_play,
        is_skip,
        engagement_score: engagement_score(event, play_completion_ratio),
        platform_category: PlatformCategory::of(event.platform),
        time_context: TimeContext::of_hour(ts.hour()),
        warnings,
    }
}

fn completion_ratio(event: &CanonicalEvent, warnings: &mut Vec<DerivationWarning>) -> Option<f64> {
    let duration = event.track.duration_ms?;
    if duration == 0 {
        warnings.push(DerivationWarning::ZeroTrackDuration);
        return None;
    }
    let Some(played) = event.played_duration_ms else {
        warnings.push(DerivationWarning::MissingPlayedDuration);
        return None;
    };
    Some((played as f64 / duration as f64).clamp(0.0, 1.0))
}

/// Weighted engagement in [0, 1]
///
/// Listening depth contributes `0.5 + 0.3 * ratio`; with no ratio the event
/// type is the only signal and the score starts from the conservative
/// baseline. Likes/shares add 0.4, an active repeat mode 0.1, skips cost 0.2.
fn engagement_score(event: &CanonicalEvent, ratio: Option<f64>) -> f64 {
    let mut score = match ratio {
        Some(r) => 0.5 + r * 0.3,
        None => BASELINE_ENGAGEMENT,
    };
    if event.event_type.is_interactive() {
        score += 0.4;
    }
    if event.playback.repeat_mode != RepeatMode::Off {
        score += 0.1;
    }
    if event.event_type == EventType::Skip {
        score -= 0.2;
    }
    round_to(score.clamp(0.0, 1.0), 4)
}

pub(crate) fn round_to(value: f64, places: i32) -> f64 {
    let factor = 10f64.powi(places);
    (value * factor).round() / factor
}
