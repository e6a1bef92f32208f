//! mep-batch library - offline runs of the event pipeline
//!
//! Reads raw events from disk (a JSON array or one object per line), runs
//! them through normalize → derive → enrich and groups the survivors into
//! tumbling windows. Invalid events are collected, never fatal. A repeated
//! `event_id` replaces the earlier record, matching the warehouse upsert.

use chrono::{DateTime, Utc};
use mep_common::{process_at, tumbling_windows, AggregateWindow, EnrichedRecord, Enricher, SampleGenerator, ValidationError};
use serde::Serialize;
use serde_json::Value;
use std::collections::HashMap;
use std::fs;
use std::io::{BufWriter, Write};
use std::path::Path;
use tracing::{debug, warn};

/// A raw event that failed validation
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Rejected {
    /// Position in the input file
    pub index: usize,
    pub event_id: Option<String>,
    pub error: ValidationError,
}

/// Outcome of processing one input file
#[derive(Debug, Default)]
pub struct BatchReport {
    /// One per distinct `event_id`, in order of first appearance
    pub records: Vec<EnrichedRecord>,
    pub rejected: Vec<Rejected>,
    /// Valid events whose `event_id` had already been seen
    pub duplicates: usize,
    /// Non-empty windows, oldest first
    pub windows: Vec<AggregateWindow>,
}

impl BatchReport {
    pub fn processed(&self) -> usize {
        self.records.len() + self.rejected.len() + self.duplicates
    }
}

/// Parse raw events from file content
///
/// A leading `[` means a JSON array; anything else is read as JSON lines,
/// skipping blank lines.
pub fn parse_raw_events(content: &str) -> anyhow::Result<Vec<Value>> {
    let trimmed = content.trim_start();
    if trimmed.starts_with('[') {
        return Ok(serde_json::from_str(trimmed)?);
    }

    trimmed
        .lines()
        .enumerate()
        .filter(|(_, line)| !line.trim().is_empty())
        .map(|(n, line)| {
            serde_json::from_str(line).map_err(|e| anyhow::anyhow!("line {}: {}", n + 1, e))
        })
        .collect()
}

pub fn read_raw_events(path: &Path) -> anyhow::Result<Vec<Value>> {
    let content = fs::read_to_string(path)
        .map_err(|e| anyhow::anyhow!("Failed to read {}: {}", path.display(), e))?;
    parse_raw_events(&content)
}

/// Run every raw event through the pipeline and bucket the valid ones
///
/// `received_at` stands in for events without a timestamp.
pub fn process_batch(
    raws: &[Value],
    enricher: Option<&dyn Enricher>,
    window_secs: i64,
    received_at: DateTime<Utc>,
) -> BatchReport {
    let mut report = BatchReport::default();
    let mut positions: HashMap<String, usize> = HashMap::new();

    for (index, raw) in raws.iter().enumerate() {
        match process_at(raw, received_at, enricher) {
            Ok(record) => match positions.get(&record.event.event_id) {
                Some(&position) => {
                    debug!("Event {} redelivered at {}, keeping the latest", record.event.event_id, index);
                    report.records[position] = record;
                    report.duplicates += 1;
                }
                None => {
                    positions.insert(record.event.event_id.clone(), report.records.len());
                    report.records.push(record);
                }
            },
            Err(error) => {
                let event_id = raw.get("event_id").and_then(Value::as_str).map(str::to_string);
                warn!("Skipping event {} ({}): {}", index, event_id.as_deref().unwrap_or("no id"), error);
                report.rejected.push(Rejected { index, event_id, error });
            }
        }
    }

    report.windows = tumbling_windows(report.records.iter().map(|r| &r.event), window_secs);
    debug!(
        "{} records in {} windows, {} rejected, {} duplicates",
        report.records.len(),
        report.windows.len(),
        report.rejected.len(),
        report.duplicates
    );
    report
}

/// Seeded sample traffic
pub fn generate_events(count: usize, seed: u64, now: DateTime<Utc>) -> Vec<Value> {
    SampleGenerator::new(seed).generate(count, now)
}

/// Write values as a pretty JSON array
pub fn write_json_array(path: &Path, values: &[Value]) -> anyhow::Result<()> {
    let mut out = BufWriter::new(fs::File::create(path)?);
    serde_json::to_writer_pretty(&mut out, values)?;
    out.write_all(b"\n")?;
    out.flush()?;
    Ok(())
}

/// Write one JSON object per line
pub fn write_jsonl<T: Serialize>(path: &Path, items: &[T]) -> anyhow::Result<()> {
    let mut out = BufWriter::new(fs::File::create(path)?);
    for item in items {
        serde_json::to_writer(&mut out, item)?;
        out.write_all(b"\n")?;
    }
    out.flush()?;
    Ok(())
}

/// One human-readable line per window
pub fn format_window(window: &AggregateWindow) -> String {
    let platforms = window
        .platform_distribution
        .iter()
        .map(|(p, n)| format!("{}={}", p, n))
        .collect::<Vec<_>>()
        .join(",");
    format!(
        "[{} .. {}) events={} users={} tracks={} engagement={:.4} platforms={}",
        window.window_start.to_rfc3339(),
        window.window_end.to_rfc3339(),
        window.total_events,
        window.unique_users,
        window.unique_tracks,
        window.average_engagement_score,
        platforms
    )
}
