//! Pipeline events and the in-process event bus
//!
//! The bus is the hand-off point between ingestion/enrichment and anything
//! downstream (SSE clients, window roll-up). Delivery is best effort: slow
//! subscribers lag and drop, and emitting with no subscribers is not an error.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;

use crate::aggregate::AggregateWindow;
use crate::model::{EventType, Platform};

/// Events broadcast by the pipeline
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum PipelineEvent {
    /// A raw event passed validation and was stored
    EventIngested {
        event_id: String,
        event_type: EventType,
        platform: Platform,
        timestamp: DateTime<Utc>,
    },

    /// An event was enriched
    EventEnriched {
        event_id: String,
        /// `known_artist`, `genre` or `fallback`
        matched_rule: String,
        enrichment_confidence: f64,
        timestamp: DateTime<Utc>,
    },

    /// A raw event failed validation
    EventRejected {
        event_id: Option<String>,
        field: String,
        reason: String,
        timestamp: DateTime<Utc>,
    },

    /// A time bucket closed and its roll-up was written
    WindowClosed {
        window: AggregateWindow,
        timestamp: DateTime<Utc>,
    },
}

impl PipelineEvent {
    /// Event name, used as the SSE `event:` field
    pub fn event_type(&self) -> &'static str {
        match self {
            PipelineEvent::EventIngested { .. } => "EventIngested",
            PipelineEvent::EventEnriched { .. } => "EventEnriched",
            PipelineEvent::EventRejected { .. } => "EventRejected",
            PipelineEvent::WindowClosed { .. } => "WindowClosed",
        }
    }
}

/// Broadcast bus for [`PipelineEvent`]s
#[derive(Clone)]
pub struct EventBus {
    tx: broadcast::Sender<PipelineEvent>,
    capacity: usize,
}

impl EventBus {
    /// Create a bus buffering up to `capacity` events per subscriber
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity.max(1));
        Self {
            tx,
            capacity: capacity.max(1),
        }
    }

    /// Subscribe to all future events
    pub fn subscribe(&self) -> broadcast::Receiver<PipelineEvent> {
        self.tx.subscribe()
    }

    /// Emit an event; `Err` when nobody is listening
    #[allow(clippy::result_large_err)]
    pub fn emit(
        &self,
        event: PipelineEvent,
    ) -> Result<usize, broadcast::error::SendError<PipelineEvent>> {
        self.tx.send(event)
    }

    /// Emit an event, ignoring the no-subscriber case
    pub fn emit_lossy(&self, event: PipelineEvent) {
        let _ = self.tx.send(event);
    }

    pub fn subscriber_count(&self) -> usize {
        self.tx.receiver_count()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ingested(id: &str) -> PipelineEvent {
        PipelineEvent::EventIngested {
            event_id: id.to_string(),
            event_type: EventType::Play,
            platform: Platform::Spotify,
            timestamp: Utc::now(),
        }
    }

    #[test]
    fn test_emit_without_subscribers() {
        let bus = EventBus::new(10);
        assert!(bus.emit(ingested("e1")).is_err());
        // lossy emit never fails
        bus.emit_lossy(ingested("e2"));
        assert_eq!(bus.subscriber_count(), 0);
    }

    #[tokio::test]
    async fn test_subscriber_receives_events_in_order() {
        let bus = EventBus::new(10);
        let mut rx = bus.subscribe();
        assert_eq!(bus.emit(ingested("e1")).unwrap(), 1);
        bus.emit_lossy(ingested("e2"));

        for expected in ["e1", "e2"] {
            match rx.recv().await.unwrap() {
                PipelineEvent::EventIngested { event_id, .. } => assert_eq!(event_id, expected),
                other => panic!("unexpected event {:?}", other),
            }
        }
    }

    #[test]
    fn test_zero_capacity_is_raised_to_one() {
        assert_eq!(EventBus::new(0).capacity(), 1);
    }

    #[test]
    fn test_serialized_with_type_tag() {
        let json = serde_json::to_value(ingested("e1")).unwrap();
        assert_eq!(json["type"], "EventIngested");
        assert_eq!(json["platform"], "spotify");
        assert_eq!(ingested("e1").event_type(), "EventIngested");
    }
}
