//! mep-ef library - music event enrichment function
//!
//! HTTP front of the pipeline: validates raw events, derives and enriches
//! them, writes the warehouse rows, broadcasts pipeline events and closes
//! fixed aggregation windows in the background.

pub mod api;
pub mod error;
pub mod rollup;

pub use crate::error::{ApiError, ApiResult};

use axum::Router;
use chrono::{DateTime, Utc};
use mep_common::{Enricher, EventBus, PipelineConfig};
use sqlx::SqlitePool;
use std::sync::Arc;
use tokio::sync::RwLock;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

/// Application state shared across handlers
#[derive(Clone)]
pub struct AppState {
    /// Warehouse connection pool
    pub db: SqlitePool,
    /// Pipeline event broadcast (SSE, roll-up notifications)
    pub event_bus: EventBus,
    pub config: Arc<PipelineConfig>,
    pub enricher: Arc<dyn Enricher>,
    /// Service startup timestamp for uptime tracking
    pub startup_time: DateTime<Utc>,
    /// Last error for diagnostic purposes
    pub last_error: Arc<RwLock<Option<String>>>,
}

impl AppState {
    pub fn new(db: SqlitePool, event_bus: EventBus, config: PipelineConfig, enricher: Arc<dyn Enricher>) -> Self {
        Self {
            db,
            event_bus,
            config: Arc::new(config),
            enricher,
            startup_time: Utc::now(),
            last_error: Arc::new(RwLock::new(None)),
        }
    }

    /// Enricher to apply on ingest, `None` when enrichment is switched off
    pub fn ingest_enricher(&self) -> Option<&dyn Enricher> {
        self.config.enrichment_enabled.then(|| self.enricher.as_ref())
    }

    pub async fn record_error(&self, message: impl Into<String>) {
        *self.last_error.write().await = Some(message.into());
    }
}

/// Build application router
pub fn build_router(state: AppState) -> Router {
    use axum::routing::get;

    // Browser demo pages call the service cross-origin
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .merge(api::ingest_routes())
        .merge(api::enrich_routes())
        .merge(api::aggregate_routes())
        .merge(api::sample_routes())
        .merge(api::health_routes())
        .route("/events", get(api::event_stream))
        .layer(cors)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
