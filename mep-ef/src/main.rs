//! mep-ef (Music Event Enrichment Function) - pipeline HTTP service
//!
//! Accepts raw streaming events, normalizes, derives and enriches them,
//! stores the wide rows in the SQLite warehouse and rolls them up into fixed
//! windows. Pipeline activity is broadcast over SSE at `/events`.

use anyhow::{Context, Result};
use clap::Parser;
use mep_common::config::{load_toml_config, CliOverrides};
use mep_common::{db, EventBus, PipelineConfig, RuleEnricher};
use mep_ef::{build_router, rollup, AppState};
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

/// Command-line arguments; each overrides the environment and config file
#[derive(Parser, Debug)]
#[command(name = "mep-ef", version, about = "Music event enrichment service")]
struct Args {
    /// Config file (default: platform config dir, then /etc/mep/config.toml)
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Folder holding the warehouse database
    #[arg(short, long)]
    root_folder: Option<PathBuf>,

    #[arg(long)]
    bind: Option<String>,

    #[arg(short, long)]
    port: Option<u16>,

    /// Roll-up window width in seconds
    #[arg(long)]
    window_secs: Option<i64>,

    /// Store events without enrichment on ingest
    #[arg(long)]
    no_enrich: bool,

    /// TOML enrichment rule table replacing the built-in one
    #[arg(long)]
    rules_file: Option<PathBuf>,

    /// trace, debug, info, warn or error (RUST_LOG takes precedence)
    #[arg(long)]
    log_level: Option<String>,
}

impl Args {
    fn overrides(&self) -> CliOverrides {
        CliOverrides {
            root_folder: self.root_folder.clone(),
            bind: self.bind.clone(),
            port: self.port,
            window_secs: self.window_secs,
            enrichment_enabled: self.no_enrich.then_some(false),
            rules_file: self.rules_file.clone(),
            log_level: self.log_level.clone(),
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    let toml_config = load_toml_config(args.config.as_deref())?;
    let config = PipelineConfig::resolve(&args.overrides(), toml_config.as_ref())?;

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&config.log_level));
    tracing_subscriber::fmt().with_env_filter(filter).init();

    info!(
        "Starting music event enrichment (mep-ef) v{} [{}] built {} ({})",
        env!("CARGO_PKG_VERSION"),
        env!("GIT_HASH"),
        env!("BUILD_TIMESTAMP"),
        env!("BUILD_PROFILE")
    );
    info!(
        "Window: {}s, enrichment on ingest: {}",
        config.window_secs,
        if config.enrichment_enabled { "enabled" } else { "disabled" }
    );

    std::fs::create_dir_all(&config.root_folder)
        .with_context(|| format!("Failed to create root folder {}", config.root_folder.display()))?;

    let db_path = config.database_path();
    info!("Database path: {}", db_path.display());
    let pool = match db::init_warehouse(&db_path).await {
        Ok(pool) => {
            info!("✓ Warehouse ready");
            pool
        }
        Err(e) => {
            error!("Failed to open warehouse: {}", e);
            return Err(e.into());
        }
    };

    let table = config.rule_table()?;
    info!(
        "Enrichment rules: {} artists, {} genres",
        table.artists.len(),
        table.genres.len()
    );
    let enricher = Arc::new(RuleEnricher::new(table));

    let event_bus = EventBus::new(config.event_bus_capacity);
    let addr = format!("{}:{}", config.bind, config.port);

    let state = AppState::new(pool, event_bus, config, enricher);
    let _rollup = rollup::spawn_window_rollup(state.clone());
    let app = build_router(state);

    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .with_context(|| format!("Failed to bind {}", addr))?;
    info!("mep-ef listening on http://{}", addr);
    info!("Health check: http://{}/health", addr);

    axum::serve(listener, app).await?;

    Ok(())
}
