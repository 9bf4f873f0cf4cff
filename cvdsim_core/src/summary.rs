//! Rollup of event traces into CSV.
//!
//! Each rollup appends one row per trace record to the events CSV, syncs it,
//! then renames the trace to `.processed` so the same events are never
//! counted twice.

use crate::trace::{read_trace, TraceRecord};
use crate::Result;
use std::collections::BTreeMap;
use std::fs::OpenOptions;
use std::path::Path;

#[derive(Debug, serde::Serialize)]
struct CsvRow {
    entity: String,
    time: String,
    kind: &'static str,
    condition: Option<&'static str>,
    rule: String,
    fatal: bool,
}

impl From<&TraceRecord> for CsvRow {
    fn from(record: &TraceRecord) -> Self {
        CsvRow {
            entity: record.entity.to_string(),
            time: record.time.to_rfc3339(),
            kind: record.kind.label(),
            condition: record.kind.condition().map(|c| c.as_str()),
            rule: record.rule.clone(),
            fatal: record.fatal,
        }
    }
}

/// Count records per event label
pub fn count_by_kind(records: &[TraceRecord]) -> BTreeMap<&'static str, usize> {
    let mut counts = BTreeMap::new();
    for record in records {
        *counts.entry(record.kind.label()).or_insert(0) += 1;
    }
    counts
}

/// Append the trace to `csv_path` and archive the trace
///
/// The CSV is fsynced before the trace is renamed; the renamed trace stays
/// on disk until [`cleanup_processed_traces`] removes it.
pub fn trace_to_csv_and_archive(trace_path: &Path, csv_path: &Path) -> Result<usize> {
    let records = read_trace(trace_path)?;

    if records.is_empty() {
        tracing::info!("No events in trace to roll up");
        return Ok(0);
    }

    if let Some(parent) = csv_path.parent() {
        std::fs::create_dir_all(parent)?;
    }

    let file = OpenOptions::new()
        .create(true)
        .append(true)
        .open(csv_path)?;
    let needs_headers = file.metadata()?.len() == 0;

    let mut writer = csv::WriterBuilder::new()
        .has_headers(needs_headers)
        .from_writer(file);
    for record in &records {
        writer.serialize(CsvRow::from(record))?;
    }

    writer.flush()?;
    let file = writer
        .into_inner()
        .map_err(|e| std::io::Error::new(std::io::ErrorKind::Other, e))?;
    file.sync_all()?;

    tracing::info!("Wrote {} events to {:?}", records.len(), csv_path);

    let processed_path = trace_path.with_extension("jsonl.processed");
    std::fs::rename(trace_path, &processed_path)?;
    tracing::info!("Archived trace to {:?}", processed_path);

    Ok(records.len())
}

/// Remove every `.processed` trace in `dir`
pub fn cleanup_processed_traces(dir: &Path) -> Result<usize> {
    if !dir.exists() {
        return Ok(0);
    }

    let mut count = 0;
    for entry in std::fs::read_dir(dir)? {
        let path = entry?.path();
        if path.extension().is_some_and(|ext| ext == "processed") {
            std::fs::remove_file(&path)?;
            tracing::debug!("Removed processed trace: {:?}", path);
            count += 1;
        }
    }

    if count > 0 {
        tracing::info!("Cleaned up {} processed traces", count);
    }
    Ok(count)
}
