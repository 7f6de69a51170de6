//! JSONL persistence helpers.
//!
//! Every durable artifact in the pipeline is one JSON record per line:
//! chunk corpora, enriched corpora, eval questions, and the evaluation
//! log. A malformed line is skipped and counted, never silently dropped:
//! callers surface the count so data loss stays observable. A missing file
//! is an error except where the caller explicitly tolerates it (the
//! augmenter's resume ledger, the evaluation log on first append).

use anyhow::{Context, Result};
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::fs::{File, OpenOptions};
use std::io::{BufRead, BufReader, BufWriter, Write};
use std::path::Path;

/// Records read from a JSONL file plus the number of unparseable lines
/// that were skipped.
pub struct JsonlRead<T> {
    pub records: Vec<T>,
    pub skipped: usize,
}

/// Read all records from a JSONL file, skipping malformed lines.
///
/// Skipped lines are counted and logged; an unreadable file is an error.
pub fn read_jsonl<T: DeserializeOwned>(path: &Path) -> Result<JsonlRead<T>> {
    let file = File::open(path)
        .with_context(|| format!("Failed to open {}", path.display()))?;
    let reader = BufReader::new(file);

    let mut records = Vec::new();
    let mut skipped = 0usize;

    for line in reader.lines() {
        let line = line.with_context(|| format!("Failed to read {}", path.display()))?;
        if line.trim().is_empty() {
            continue;
        }
        match serde_json::from_str::<T>(&line) {
            Ok(record) => records.push(record),
            Err(_) => skipped += 1,
        }
    }

    if skipped > 0 {
        tracing::warn!(
            file = %path.display(),
            skipped,
            "skipped malformed lines while reading"
        );
    }

    Ok(JsonlRead { records, skipped })
}

/// Like [`read_jsonl`], but a missing file yields zero records.
pub fn read_jsonl_or_empty<T: DeserializeOwned>(path: &Path) -> Result<JsonlRead<T>> {
    if !path.exists() {
        return Ok(JsonlRead {
            records: Vec::new(),
            skipped: 0,
        });
    }
    read_jsonl(path)
}

/// Write all records to a JSONL file, replacing any existing content.
pub fn write_jsonl<T: Serialize>(path: &Path, records: &[T]) -> Result<()> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    let file = File::create(path)
        .with_context(|| format!("Failed to create {}", path.display()))?;
    let mut writer = BufWriter::new(file);
    for record in records {
        serde_json::to_writer(&mut writer, record)?;
        writer.write_all(b"\n")?;
    }
    writer.flush()?;
    Ok(())
}

/// Append one record to a JSONL file, creating it if needed.
pub fn append_jsonl<T: Serialize>(path: &Path, record: &T) -> Result<()> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    let file = OpenOptions::new()
        .create(true)
        .append(true)
        .open(path)
        .with_context(|| format!("Failed to open {} for append", path.display()))?;
    let mut writer = BufWriter::new(file);
    serde_json::to_writer(&mut writer, record)?;
    writer.write_all(b"\n")?;
    writer.flush()?;
    Ok(())
}

/// An append-only JSONL writer held open across many records, used by the
/// augmenter's single writer task.
pub struct JsonlAppender {
    writer: BufWriter<File>,
}

impl JsonlAppender {
    pub fn open(path: &Path) -> Result<Self> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(path)
            .with_context(|| format!("Failed to open {} for append", path.display()))?;
        Ok(Self {
            writer: BufWriter::new(file),
        })
    }

    pub fn append<T: Serialize>(&mut self, record: &T) -> Result<()> {
        serde_json::to_writer(&mut self.writer, record)?;
        self.writer.write_all(b"\n")?;
        // Flushed per record so a crashed run leaves only whole lines
        // behind for the resume ledger.
        self.writer.flush()?;
        Ok(())
    }
}
