//! mep-batch - offline pipeline runs over files
//!
//! **Usage:**
//! ```bash
//! mep-batch generate --count 1000 --seed 7 --output events.json
//! mep-batch process --input events.json [--no-enrich] [--window-secs 60] [--output enriched.jsonl]
//! ```

use anyhow::Result;
use chrono::Utc;
use clap::{Parser, Subcommand};
use mep_batch::{format_window, generate_events, process_batch, read_raw_events, write_json_array, write_jsonl};
use mep_common::config::MAX_WINDOW_SECS;
use mep_common::{Enricher, RuleEnricher, RuleTable};
use std::path::PathBuf;
use tracing::info;
use tracing_subscriber::EnvFilter;

/// Offline runs of the music event pipeline
#[derive(Parser, Debug)]
#[command(name = "mep-batch", version)]
struct Args {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Write seeded sample raw events as a JSON array
    Generate {
        #[arg(long, default_value_t = 100)]
        count: usize,

        #[arg(long, default_value_t = 0)]
        seed: u64,

        #[arg(long, value_name = "FILE")]
        output: PathBuf,
    },

    /// Normalize, derive and enrich raw events, then print window aggregates
    Process {
        /// JSON array or JSON lines of raw events
        #[arg(long, value_name = "FILE")]
        input: PathBuf,

        /// Skip enrichment
        #[arg(long)]
        no_enrich: bool,

        #[arg(long, default_value_t = 60)]
        window_secs: i64,

        /// TOML enrichment rule table replacing the built-in one
        #[arg(long, value_name = "FILE")]
        rules_file: Option<PathBuf>,

        /// Write the enriched records here, one per line
        #[arg(long, value_name = "FILE")]
        output: Option<PathBuf>,
    },
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    info!(
        "mep-batch v{} [{}] built {} ({})",
        env!("CARGO_PKG_VERSION"),
        env!("GIT_HASH"),
        env!("BUILD_TIMESTAMP"),
        env!("BUILD_PROFILE")
    );

    match Args::parse().command {
        Command::Generate { count, seed, output } => {
            let events = generate_events(count, seed, Utc::now());
            write_json_array(&output, &events)?;
            info!("Wrote {} events (seed {}) to {}", events.len(), seed, output.display());
        }
        Command::Process {
            input,
            no_enrich,
            window_secs,
            rules_file,
            output,
        } => {
            if !(1..=MAX_WINDOW_SECS).contains(&window_secs) {
                anyhow::bail!("--window-secs must be between 1 and {}", MAX_WINDOW_SECS);
            }

            let raws = read_raw_events(&input)?;
            info!("Read {} raw events from {}", raws.len(), input.display());

            let enricher = if no_enrich {
                None
            } else {
                let table = match &rules_file {
                    Some(path) => RuleTable::load(path)?,
                    None => RuleTable::builtin(),
                };
                Some(RuleEnricher::new(table))
            };

            let report = process_batch(
                &raws,
                enricher.as_ref().map(|e| e as &dyn Enricher),
                window_secs,
                Utc::now(),
            );

            for window in &report.windows {
                println!("{}", format_window(window));
            }
            info!(
                "Processed {} events: {} valid, {} rejected, {} duplicates, {} windows",
                report.processed(),
                report.records.len(),
                report.rejected.len(),
                report.duplicates,
                report.windows.len()
            );

            if let Some(path) = output {
                write_jsonl(&path, &report.records)?;
                info!("Wrote {} records to {}", report.records.len(), path.display());
            }
        }
    }

    Ok(())
}
