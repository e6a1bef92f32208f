//! Output records
//!
//! [`EnrichedRecord`] is the wide row written to the warehouse;
//! [`EnrichmentResponse`] is the HTTP shape returned by the enrich endpoint.

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::derive::{derive, DerivedFields};
use crate::enrich::{Enricher, Enrichment};
use crate::error::ValidationError;
use crate::model::CanonicalEvent;
use crate::normalize::normalize_at;

/// Canonical event, its derived fields and (optionally) its enrichment
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EnrichedRecord {
    pub event: CanonicalEvent,
    pub derived: DerivedFields,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub enrichment: Option<Enrichment>,
}

impl EnrichedRecord {
    /// Derive (and optionally enrich) an already validated event
    pub fn from_event(event: CanonicalEvent, enricher: Option<&dyn Enricher>) -> Self {
        let derived = derive(&event);
        let enrichment = enricher.map(|e| e.enrich(&event, &derived));
        Self {
            event,
            derived,
            enrichment,
        }
    }

    /// Date partition key
    pub fn event_date(&self) -> NaiveDate {
        self.event.timestamp.date_naive()
    }

    /// HTTP response body, `None` when the record was not enriched
    pub fn to_response(&self, timestamp: DateTime<Utc>) -> Option<EnrichmentResponse> {
        self.enrichment.as_ref().map(|enrichment| EnrichmentResponse {
            status: "success".to_string(),
            event_id: self.event.event_id.clone(),
            enrichments: EnrichmentFields::from(enrichment),
            timestamp,
        })
    }
}

/// The six enrichment fields exposed over HTTP
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EnrichmentFields {
    pub event_description: String,
    pub mood_analysis: String,
    pub predicted_genres: Vec<String>,
    pub listening_context: String,
    pub similar_tracks: Vec<String>,
    pub enrichment_confidence: f64,
}

impl From<&Enrichment> for EnrichmentFields {
    fn from(e: &Enrichment) -> Self {
        Self {
            event_description: e.event_description.clone(),
            mood_analysis: e.mood_analysis.clone(),
            predicted_genres: e.predicted_genres.clone(),
            listening_context: e.listening_context.clone(),
            similar_tracks: e.similar_tracks.clone(),
            enrichment_confidence: e.enrichment_confidence,
        }
    }
}

/// Response of `POST /api/enrich`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EnrichmentResponse {
    pub status: String,
    pub event_id: String,
    pub enrichments: EnrichmentFields,
    pub timestamp: DateTime<Utc>,
}

/// normalize → derive → (optional) enrich
pub fn process(raw: &Value, enricher: Option<&dyn Enricher>) -> Result<EnrichedRecord, ValidationError> {
    process_at(raw, Utc::now(), enricher)
}

/// As [`process`], with an explicit receive time for events without a timestamp
pub fn process_at(
    raw: &Value,
    received_at: DateTime<Utc>,
    enricher: Option<&dyn Enricher>,
) -> Result<EnrichedRecord, ValidationError> {
    let event = normalize_at(raw, received_at)?;
    Ok(EnrichedRecord::from_event(event, enricher))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::enrich::{MatchedRule, RuleEnricher};
    use serde_json::json;

    fn raw() -> Value {
        json!({
            "event_id": "evt-100",
            "event_type": "play",
            "timestamp": "2024-03-09T18:30:00Z",
            "track": {"id": "trk-1", "title": "Hotel California", "duration_ms": 391000, "genre": "rock"},
            "artist": {"name": "Eagles"},
            "user_interaction": {"user_id": "user-1"},
            "streaming_event": {"platform": "spotify"},
            "play_event": {"played_duration_ms": 380000}
        })
    }

    #[test]
    fn test_process_with_enricher() {
        let enricher = RuleEnricher::default();
        let record = process(&raw(), Some(&enricher)).unwrap();
        assert!(record.derived.is_full_play);
        let enrichment = record.enrichment.as_ref().unwrap();
        assert!(matches!(enrichment.matched_rule, MatchedRule::KnownArtist { .. }));
        assert_eq!(record.event_date(), NaiveDate::from_ymd_opt(2024, 3, 9).unwrap());
    }

    #[test]
    fn test_process_without_enricher() {
        let record = process(&raw(), None).unwrap();
        assert!(record.enrichment.is_none());
        assert!(record.to_response(Utc::now()).is_none());
        let json = serde_json::to_value(&record).unwrap();
        assert!(json.get("enrichment").is_none());
    }

    #[test]
    fn test_process_propagates_validation_error() {
        let mut bad = raw();
        bad["event_type"] = json!("playlist_add");
        let err = process(&bad, None).unwrap_err();
        assert_eq!(err.field, "event_type");
    }

    #[test]
    fn test_response_has_exactly_six_enrichment_fields() {
        let enricher = RuleEnricher::default();
        let record = process(&raw(), Some(&enricher)).unwrap();
        let response = record.to_response(Utc::now()).unwrap();
        assert_eq!(response.status, "success");
        assert_eq!(response.event_id, "evt-100");

        let json = serde_json::to_value(&response).unwrap();
        let fields = json["enrichments"].as_object().unwrap();
        let mut keys: Vec<&str> = fields.keys().map(String::as_str).collect();
        keys.sort();
        assert_eq!(
            keys,
            vec![
                "enrichment_confidence",
                "event_description",
                "listening_context",
                "mood_analysis",
                "predicted_genres",
                "similar_tracks",
            ]
        );
    }

    #[test]
    fn test_stored_event_replays_verbatim() {
        let record = process(&raw(), None).unwrap();
        let text = serde_json::to_string(&record.event).unwrap();
        let back: CanonicalEvent = serde_json::from_str(&text).unwrap();
        assert_eq!(back, record.event);
        assert_eq!(derive(&back), record.derived);
    }
}
