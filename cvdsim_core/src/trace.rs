//! Event trace: a JSONL file of every event produced by a run.
//!
//! Records are appended under an exclusive file lock, so several runs may
//! write to the same trace.

use crate::{Event, EventKind, Result};
use chrono::{DateTime, Utc};
use fs2::FileExt;
use serde::{Deserialize, Serialize};
use std::fs::{File, OpenOptions};
use std::io::{BufRead, BufReader, BufWriter, Write};
use std::path::{Path, PathBuf};
use uuid::Uuid;

/// One event, tagged with the entity it happened to
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct TraceRecord {
    pub entity: Uuid,
    pub time: DateTime<Utc>,
    pub kind: EventKind,
    pub rule: String,
    pub fatal: bool,
}

impl TraceRecord {
    pub fn new(entity: Uuid, event: &Event) -> Self {
        Self {
            entity,
            time: event.time,
            kind: event.kind,
            rule: event.rule.clone(),
            fatal: event.fatal,
        }
    }

    pub fn for_events(entity: Uuid, events: &[Event]) -> Vec<Self> {
        events.iter().map(|event| Self::new(entity, event)).collect()
    }
}

/// Destination for trace records
pub trait EventSink {
    fn append(&mut self, records: &[TraceRecord]) -> Result<()>;
}

/// JSONL trace file with file locking
pub struct JsonlEventSink {
    path: PathBuf,
}

impl JsonlEventSink {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn ensure_parent_dir(&self) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        Ok(())
    }
}

impl EventSink for JsonlEventSink {
    fn append(&mut self, records: &[TraceRecord]) -> Result<()> {
        if records.is_empty() {
            return Ok(());
        }
        self.ensure_parent_dir()?;

        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)?;
        file.lock_exclusive()?;

        {
            let mut writer = BufWriter::new(&file);
            for record in records {
                serde_json::to_writer(&mut writer, record)?;
                writer.write_all(b"\n")?;
            }
            writer.flush()?;
        }

        file.unlock()?;
        tracing::debug!("Appended {} records to {:?}", records.len(), self.path);
        Ok(())
    }
}

/// Read a trace back; unparseable lines are logged and skipped
pub fn read_trace(path: &Path) -> Result<Vec<TraceRecord>> {
    if !path.exists() {
        return Ok(Vec::new());
    }

    let file = File::open(path)?;
    file.lock_shared()?;

    let reader = BufReader::new(&file);
    let mut records = Vec::new();

    for (line_num, line_result) in reader.lines().enumerate() {
        let line = line_result?;
        if line.trim().is_empty() {
            continue;
        }

        match serde_json::from_str::<TraceRecord>(&line) {
            Ok(record) => records.push(record),
            Err(e) => {
                tracing::warn!("Skipping trace line {}: {}", line_num + 1, e);
            }
        }
    }

    file.unlock()?;
    tracing::debug!("Read {} trace records from {:?}", records.len(), path);
    Ok(records)
}
