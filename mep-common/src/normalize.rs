//! Raw event normalization
//!
//! Flattens the nested ingestion payload (`track`, `artist`, `album`,
//! `user_interaction`, `streaming_event`, `play_event`) into a
//! [`CanonicalEvent`]. Validation stops at the first violation and returns
//! a [`ValidationError`]; no partially built event ever escapes.
//!
//! The upstream producers disagree on field names and types, so lookups
//! accept a few aliases (`title`/`name`, `duration_ms`/`duration` in
//! seconds, `genres`/`genre`, ...) and numeric strings are coerced.
//! Already-flat payloads (`track_id`, `user_id`, `platform`,
//! `track_duration_ms`, `played_duration_ms` at top level) are accepted
//! too.

use chrono::{DateTime, Utc};
use serde_json::{Map, Value};

use crate::error::ValidationError;
use crate::model::{
    ArtistMeta, CanonicalEvent, EventType, ListeningContext, PlaybackContext, Platform,
    RepeatMode, TrackMeta,
};
use crate::time;

type VResult<T> = Result<T, ValidationError>;

/// Normalize a raw payload, stamping events without a timestamp with "now"
pub fn normalize(raw: &Value) -> VResult<CanonicalEvent> {
    normalize_at(raw, time::now())
}

/// Normalize a raw payload; `received_at` is used when the payload has no timestamp
pub fn normalize_at(raw: &Value, received_at: DateTime<Utc>) -> VResult<CanonicalEvent> {
    let root = raw
        .as_object()
        .ok_or_else(|| ValidationError::new("$", "event must be a JSON object"))?;
    let raw = RawEvent { root };

    // Required fields, checked in a fixed order so the reported violation is stable
    let event_id = raw.require_string(None, &["event_id"], &[])?;
    let event_type_raw = raw.require_string(None, &["event_type"], &[])?;
    let event_type = event_type_raw
        .to_ascii_lowercase()
        .parse::<EventType>()
        .map_err(|reason| ValidationError::new("event_type", reason))?;
    raw.group("track")?;
    let track_id = raw.require_string(Some("track"), &["id"], &["track_id"])?;
    raw.group("user_interaction")?;
    let user_id = raw.require_string(Some("user_interaction"), &["user_id"], &["user_id"])?;
    raw.group("streaming_event")?;
    let platform_raw = raw.require_string(Some("streaming_event"), &["platform"], &["platform"])?;
    let platform = platform_raw
        .to_ascii_lowercase()
        .parse::<Platform>()
        .map_err(|reason| ValidationError::new(raw.path_of(Some("streaming_event"), "platform"), reason))?;

    let timestamp = match raw
        .find(None, &["timestamp"], &[])?
        .or(raw.find(Some("user_interaction"), &["timestamp"], &[])?)
    {
        Some(loc) => loc.timestamp()?,
        None => received_at,
    };

    let track = normalize_track(&raw, track_id)?;
    let artist = normalize_artist(&raw)?;

    let session_id = raw.optional_string(Some("user_interaction"), &["session_id"], &["session_id"])?;
    let context = ListeningContext {
        device_type: raw.optional_string(Some("user_interaction"), &["device_type"], &[])?,
        location: raw.optional_string(Some("user_interaction"), &["location"], &[])?,
        subscription_type: raw.optional_string(Some("user_interaction"), &["subscription_type"], &[])?,
        stream_quality: raw.optional_string(Some("streaming_event"), &["stream_quality", "quality"], &[])?,
        bitrate_kbps: match raw.find(Some("streaming_event"), &["bandwidth_kbps", "bitrate"], &[])? {
            Some(loc) => Some(loc.u32()?),
            None => None,
        },
    };

    raw.group("play_event")?;
    let played_duration_ms = match raw.find(
        Some("play_event"),
        &["played_duration_ms"],
        &["played_duration_ms"],
    )? {
        Some(loc) => {
            let played = loc.u64()?;
            if let Some(duration) = track.duration_ms {
                if played > duration {
                    return Err(ValidationError::new(
                        loc.path,
                        format!("played duration {}ms exceeds track duration {}ms", played, duration),
                    ));
                }
            }
            Some(played)
        }
        None => None,
    };

    let playback = PlaybackContext {
        repeat_mode: match raw.find(Some("play_event"), &["repeat_mode"], &[])? {
            Some(loc) => {
                let mode = loc.string()?;
                mode.to_ascii_lowercase()
                    .parse::<RepeatMode>()
                    .map_err(|reason| ValidationError::new(loc.path, reason))?
            }
            None => RepeatMode::Off,
        },
        shuffle_mode: match raw.find(Some("play_event"), &["shuffle_mode"], &[])? {
            Some(loc) => loc.bool()?,
            None => false,
        },
        skip_reason: raw.optional_string(Some("play_event"), &["skip_reason"], &[])?,
        playlist_id: raw.optional_string(Some("play_event"), &["playlist_id"], &[])?,
    };

    Ok(CanonicalEvent {
        event_id,
        event_type,
        timestamp,
        track,
        artist,
        user_id,
        session_id,
        platform,
        played_duration_ms,
        playback,
        context,
    })
}

fn normalize_track(raw: &RawEvent<'_>, id: String) -> VResult<TrackMeta> {
    let g = Some("track");

    let duration_ms = match raw.find(g, &["duration_ms"], &["track_duration_ms"])? {
        Some(loc) => Some(loc.u64()?),
        None => match raw.find(g, &["duration"], &[])? {
            // Some producers send whole seconds
            Some(loc) => Some(loc.u64()?.saturating_mul(1000)),
            None => None,
        },
    };

    let album = match raw.optional_string(g, &["album"], &[])? {
        Some(album) => Some(album),
        None => raw.optional_string(Some("album"), &["name"], &[])?,
    };

    let popularity = match raw.find(g, &["popularity"], &[])? {
        Some(loc) => {
            let value = loc.u64()?;
            if value > 100 {
                return Err(ValidationError::new(loc.path, "popularity must be between 0 and 100"));
            }
            Some(value as u8)
        }
        None => None,
    };

    Ok(TrackMeta {
        id,
        title: raw.optional_string(g, &["title", "name"], &["track_title"])?,
        album,
        duration_ms,
        genres: raw.genre_list(g)?,
        release_year: match raw.find(g, &["release_year"], &[])? {
            Some(loc) => Some(loc.i32()?),
            None => None,
        },
        popularity,
        explicit: match raw.find(g, &["explicit"], &[])? {
            Some(loc) => loc.bool()?,
            None => false,
        },
        energy: raw.unit_interval(g, "energy")?,
        valence: raw.unit_interval(g, "valence")?,
        tempo: match raw.find(g, &["tempo"], &[])? {
            Some(loc) => {
                let tempo = loc.f64()?;
                if tempo < 0.0 {
                    return Err(ValidationError::new(loc.path, "tempo must be non-negative"));
                }
                Some(tempo)
            }
            None => None,
        },
    })
}

fn normalize_artist(raw: &RawEvent<'_>) -> VResult<ArtistMeta> {
    raw.group("artist")?;
    let g = Some("artist");

    let name = match raw.optional_string(g, &["name"], &["artist_name"])? {
        Some(name) => Some(name),
        None => raw.optional_string(Some("track"), &["artist"], &[])?,
    };

    Ok(ArtistMeta {
        id: raw.optional_string(g, &["id"], &["artist_id"])?,
        name,
        genres: raw.genre_list(g)?,
        followers: match raw.find(g, &["followers"], &[])? {
            Some(loc) => Some(loc.u64()?),
            None => None,
        },
        verified: match raw.find(g, &["verified"], &[])? {
            Some(loc) => loc.bool()?,
            None => false,
        },
        country: raw.optional_string(g, &["country"], &[])?,
    })
}

/// Borrowed view over the raw payload root
struct RawEvent<'a> {
    root: &'a Map<String, Value>,
}

/// A present, non-null value and the dotted path it was found at
struct Located<'a> {
    path: String,
    value: &'a Value,
}

impl<'a> RawEvent<'a> {
    /// Nested group, `None` when absent or null; anything but an object is a violation
    fn group(&self, name: &str) -> VResult<Option<&'a Map<String, Value>>> {
        match self.root.get(name) {
            None | Some(Value::Null) => Ok(None),
            Some(Value::Object(map)) => Ok(Some(map)),
            Some(_) => Err(ValidationError::new(name, "expected a JSON object")),
        }
    }

    fn path_of(&self, group: Option<&str>, key: &str) -> String {
        match group {
            Some(g) => format!("{}.{}", g, key),
            None => key.to_string(),
        }
    }

    /// First non-null value among the group's `keys`, then the top-level `flat` aliases
    fn find(&self, group: Option<&str>, keys: &[&str], flat: &[&str]) -> VResult<Option<Located<'a>>> {
        let scope = match group {
            Some(name) => self.group(name)?,
            None => Some(self.root),
        };
        if let Some(map) = scope {
            for key in keys {
                match map.get(*key) {
                    None | Some(Value::Null) => continue,
                    Some(value) => {
                        return Ok(Some(Located {
                            path: self.path_of(group, key),
                            value,
                        }))
                    }
                }
            }
        }
        for key in flat {
            match self.root.get(*key) {
                None | Some(Value::Null) => continue,
                Some(value) => {
                    return Ok(Some(Located {
                        path: key.to_string(),
                        value,
                    }))
                }
            }
        }
        Ok(None)
    }

    fn require_string(&self, group: Option<&str>, keys: &[&str], flat: &[&str]) -> VResult<String> {
        let missing_path = self.path_of(group, keys[0]);
        let loc = self
            .find(group, keys, flat)?
            .ok_or_else(|| ValidationError::missing(missing_path.clone()))?;
        let value = loc.string()?;
        if value.is_empty() {
            return Err(ValidationError::new(loc.path, "must not be empty"));
        }
        Ok(value)
    }

    /// Optional string; blank strings count as absent
    fn optional_string(&self, group: Option<&str>, keys: &[&str], flat: &[&str]) -> VResult<Option<String>> {
        match self.find(group, keys, flat)? {
            Some(loc) => {
                let value = loc.string()?;
                Ok(if value.is_empty() { None } else { Some(value) })
            }
            None => Ok(None),
        }
    }

    fn unit_interval(&self, group: Option<&str>, key: &str) -> VResult<Option<f64>> {
        match self.find(group, &[key], &[])? {
            Some(loc) => {
                let value = loc.f64()?;
                if !(0.0..=1.0).contains(&value) {
                    return Err(ValidationError::new(loc.path, "must be between 0.0 and 1.0"));
                }
                Ok(Some(value))
            }
            None => Ok(None),
        }
    }

    /// `genres` (array or string) else `genre` (string); lower-cased, deduplicated
    fn genre_list(&self, group: Option<&str>) -> VResult<Vec<String>> {
        let Some(loc) = self.find(group, &["genres", "genre"], &[])? else {
            return Ok(Vec::new());
        };
        let items: Vec<String> = match loc.value {
            Value::Array(values) => values
                .iter()
                .enumerate()
                .filter(|(_, v)| !v.is_null())
                .map(|(i, v)| {
                    Located {
                        path: format!("{}[{}]", loc.path, i),
                        value: v,
                    }
                    .string()
                })
                .collect::<VResult<_>>()?,
            _ => vec![loc.string()?],
        };

        let mut genres: Vec<String> = Vec::with_capacity(items.len());
        for genre in items {
            let genre = genre.to_lowercase();
            if !genre.is_empty() && !genres.contains(&genre) {
                genres.push(genre);
            }
        }
        Ok(genres)
    }
}

impl Located<'_> {
    /// Strings are trimmed; numbers are accepted where ids arrive numeric
    fn string(&self) -> VResult<String> {
        match self.value {
            Value::String(s) => Ok(s.trim().to_string()),
            Value::Number(n) => Ok(n.to_string()),
            _ => Err(ValidationError::new(self.path.clone(), "expected a string")),
        }
    }

    fn f64(&self) -> VResult<f64> {
        let value = match self.value {
            Value::Number(n) => n.as_f64(),
            Value::String(s) => s.trim().parse::<f64>().ok(),
            _ => None,
        };
        match value {
            Some(v) if v.is_finite() => Ok(v),
            _ => Err(ValidationError::new(self.path.clone(), "expected a number")),
        }
    }

    fn i64(&self) -> VResult<i64> {
        match self.value {
            Value::Number(n) if n.is_i64() || n.is_u64() => n
                .as_i64()
                .ok_or_else(|| ValidationError::new(self.path.clone(), "integer out of range")),
            Value::String(s) if s.trim().parse::<i64>().is_ok() => s
                .trim()
                .parse::<i64>()
                .map_err(|_| ValidationError::new(self.path.clone(), "expected an integer")),
            _ => {
                // Whole floats ("391000.0") are tolerated, fractions are not
                let v = self.f64()?;
                if v.fract() != 0.0 || v.abs() > i64::MAX as f64 {
                    return Err(ValidationError::new(self.path.clone(), "expected an integer"));
                }
                Ok(v as i64)
            }
        }
    }

    fn u64(&self) -> VResult<u64> {
        let v = self.i64()?;
        u64::try_from(v).map_err(|_| ValidationError::new(self.path.clone(), "must be non-negative"))
    }

    fn u32(&self) -> VResult<u32> {
        let v = self.u64()?;
        u32::try_from(v).map_err(|_| ValidationError::new(self.path.clone(), "integer out of range"))
    }

    fn i32(&self) -> VResult<i32> {
        let v = self.i64()?;
        i32::try_from(v).map_err(|_| ValidationError::new(self.path.clone(), "integer out of range"))
    }

    fn bool(&self) -> VResult<bool> {
        match self.value {
            Value::Bool(b) => Ok(*b),
            Value::String(s) => match s.trim().to_ascii_lowercase().as_str() {
                "true" | "1" | "yes" => Ok(true),
                "false" | "0" | "no" => Ok(false),
                _ => Err(ValidationError::new(self.path.clone(), "expected a boolean")),
            },
            Value::Number(n) if n.as_u64() == Some(0) => Ok(false),
            Value::Number(n) if n.as_u64() == Some(1) => Ok(true),
            _ => Err(ValidationError::new(self.path.clone(), "expected a boolean")),
        }
    }

    fn timestamp(&self) -> VResult<DateTime<Utc>> {
        let parsed = match self.value {
            Value::String(s) => time::parse_timestamp(s),
            Value::Number(n) => n.as_i64().and_then(time::from_epoch_millis),
            _ => None,
        };
        parsed.ok_or_else(|| {
            ValidationError::new(self.path.clone(), "expected an RFC 3339 timestamp or epoch milliseconds")
        })
    }
}
