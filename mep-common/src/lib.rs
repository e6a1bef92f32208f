//! # MEP Common Library
//!
//! Shared code for the music event pipeline:
//! - Canonical event model and raw-input normalization
//! - Derived analytics fields (engagement, completion, time buckets)
//! - Rule-based heuristic enrichment
//! - Windowed aggregation
//! - Output records, configuration, event bus and the SQLite warehouse

pub mod aggregate;
pub mod config;
#[cfg(feature = "sqlx")]
pub mod db;
pub mod derive;
pub mod enrich;
pub mod error;
pub mod events;
pub mod model;
pub mod normalize;
pub mod record;
pub mod samples;
pub mod sse;
pub mod time;

pub use aggregate::{aggregate, tumbling_windows, AggregateWindow, TimeWindow, WindowAccumulator};
pub use config::PipelineConfig;
pub use derive::{derive, DerivationWarning, DerivedFields};
pub use enrich::{enrich, Enricher, Enrichment, MatchedRule, RuleEnricher, RuleTable};
pub use error::{Error, Result, ValidationError};
pub use events::{EventBus, PipelineEvent};
pub use model::{CanonicalEvent, EventType, Platform};
pub use normalize::{normalize, normalize_at};
pub use record::{process, process_at, EnrichedRecord, EnrichmentFields, EnrichmentResponse};
pub use samples::{SampleCursor, SampleGenerator};
