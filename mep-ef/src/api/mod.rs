//! HTTP API handlers

pub mod aggregates;
pub mod enrich;
pub mod health;
pub mod ingest;
pub mod samples;
pub mod sse;

pub use aggregates::aggregate_routes;
pub use enrich::enrich_routes;
pub use health::health_routes;
pub use ingest::ingest_routes;
pub use samples::sample_routes;
pub use sse::event_stream;
