//! Contextual chunk augmentation.
//!
//! Enriches each chunk with a short situating summary from the generation
//! service before embedding, so chunks that are ambiguous out of context
//! retrieve better. Augmentation is the one pipeline stage that runs
//! against a slow external service per chunk, so it is parallel (bounded
//! worker pool), resumable (append-only output keyed by `(id, chunk_id)`,
//! existing keys skipped), and degradable (a failed generation yields an
//! empty summary and a counted warning instead of aborting the run).

use anyhow::{Context, Result};
use std::collections::HashMap;
use std::path::Path;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::sync::{mpsc, Semaphore};
use tokio::task::JoinSet;

use crate::chunker::chunk_document;
use crate::config::{AugmentStyle, Config};
use crate::generation::{context_prompt, Generator, OllamaGenerator};
use crate::models::{Chunk, ChunkKey, Document, EnrichedChunk};
use crate::store::{read_jsonl, read_jsonl_or_empty, JsonlAppender};

/// Outcome counters for one augmentation run.
#[derive(Debug, Default, Clone, Copy)]
pub struct AugmentStats {
    /// Chunks considered in this run.
    pub total: u64,
    /// Chunks skipped because their key was already in the output store.
    pub skipped: u64,
    /// Records appended by this run.
    pub generated: u64,
    /// Generation calls that failed and degraded to an empty summary.
    pub degraded: u64,
    /// Existing records whose parent chunk text has since changed.
    pub stale: u64,
}

/// Chunk a documents JSONL file and augment every chunk into the enriched
/// corpus, resuming past any existing entries.
pub async fn run_augment(config: &Config, input: &Path) -> Result<()> {
    let read = read_jsonl::<Document>(input)?;

    let mut pending = Vec::new();
    for doc in &read.records {
        for chunk in chunk_document(doc, &config.chunking)? {
            pending.push(PendingChunk {
                chunk,
                title: doc.title.clone(),
            });
        }
    }

    let generator: Arc<dyn Generator> = Arc::new(OllamaGenerator::new(&config.generation)?);
    let out = config.storage.enriched_path();
    let stats = augment_chunks(
        pending,
        generator,
        config.augment.style,
        config.augment.workers,
        &out,
    )
    .await?;

    println!("augment");
    println!("  chunks total: {}", stats.total);
    println!("  written: {}", stats.generated);
    println!("  skipped (already present): {}", stats.skipped);
    println!("  degraded (generation failed): {}", stats.degraded);
    if stats.stale > 0 {
        println!("  stale (base chunk changed): {}", stats.stale);
    }
    if read.skipped > 0 {
        println!("  skipped (malformed lines): {}", read.skipped);
    }
    println!("ok");

    Ok(())
}

/// A chunk queued for augmentation together with its parent document title.
#[derive(Debug, Clone)]
pub struct PendingChunk {
    pub chunk: Chunk,
    pub title: String,
}

/// Augment `pending` chunks into the append-only store at `out_path`.
///
/// The resume ledger (keys already present in the store) is loaded before
/// any worker starts. Workers run up to `workers` generation calls
/// concurrently; completed records are serialized through a single writer
/// task, so append order follows completion order, not input order.
pub async fn augment_chunks(
    pending: Vec<PendingChunk>,
    generator: Arc<dyn Generator>,
    style: AugmentStyle,
    workers: usize,
    out_path: &Path,
) -> Result<AugmentStats> {
    let mut stats = AugmentStats {
        total: pending.len() as u64,
        ..Default::default()
    };

    // Dedup ledger: read once, before any worker spawns. Duplicate keys in
    // the store would only waste downstream work, but they are avoidable
    // here for free.
    let existing = read_jsonl_or_empty::<EnrichedChunk>(out_path)?;
    let ledger: HashMap<ChunkKey, String> = existing
        .records
        .into_iter()
        .map(|record| (record.key(), record.parent_hash))
        .collect();

    let mut todo = Vec::new();
    for item in pending {
        match ledger.get(&item.chunk.key()) {
            Some(parent_hash) => {
                stats.skipped += 1;
                if *parent_hash != item.chunk.hash {
                    stats.stale += 1;
                }
            }
            None => todo.push(item),
        }
    }

    if stats.stale > 0 {
        tracing::warn!(
            stale = stats.stale,
            "existing augmented records no longer match their base chunks; rebuild the store to refresh them"
        );
    }

    if todo.is_empty() {
        return Ok(stats);
    }

    let degraded = Arc::new(AtomicU64::new(0));
    let semaphore = Arc::new(Semaphore::new(workers.max(1)));
    let (tx, mut rx) = mpsc::channel::<EnrichedChunk>(workers.max(1) * 2);

    let mut appender = JsonlAppender::open(out_path)?;
    let writer = tokio::spawn(async move {
        let mut written = 0u64;
        while let Some(record) = rx.recv().await {
            appender.append(&record)?;
            written += 1;
        }
        Ok::<u64, anyhow::Error>(written)
    });

    let mut tasks = JoinSet::new();
    for item in todo {
        let generator = Arc::clone(&generator);
        let semaphore = Arc::clone(&semaphore);
        let degraded = Arc::clone(&degraded);
        let tx = tx.clone();
        tasks.spawn(async move {
            let _permit = semaphore.acquire_owned().await?;
            let record = augment_chunk(item, generator.as_ref(), style, &degraded).await;
            // A closed channel means the writer failed; its error is
            // surfaced at join below.
            let _ = tx.send(record).await;
            Ok::<(), anyhow::Error>(())
        });
    }
    drop(tx);

    while let Some(joined) = tasks.join_next().await {
        joined.context("augment worker panicked")??;
    }

    stats.generated = writer.await.context("augment writer panicked")??;
    stats.degraded = degraded.load(Ordering::Relaxed);

    Ok(stats)
}

/// Enrich one chunk per the configured style.
///
/// Generation failures are caught here: the record is written with an
/// empty `context` and the degraded counter is incremented, keeping the
/// run alive under a flaky model server.
async fn augment_chunk(
    item: PendingChunk,
    generator: &dyn Generator,
    style: AugmentStyle,
    degraded: &AtomicU64,
) -> EnrichedChunk {
    let chunk = item.chunk;

    let summary = match style {
        // Title prefixing needs no generation call.
        AugmentStyle::TitlePrefix => String::new(),
        AugmentStyle::PrependSummary | AugmentStyle::AppendSummary => {
            let prompt = context_prompt(&item.title, &chunk.text);
            match generator.generate(&prompt).await {
                Ok(text) => text.trim().to_string(),
                Err(e) => {
                    degraded.fetch_add(1, Ordering::Relaxed);
                    tracing::warn!(
                        id = %chunk.id,
                        chunk_id = chunk.chunk_id,
                        error = %e,
                        "context generation failed; writing chunk without summary"
                    );
                    String::new()
                }
            }
        }
    };

    let text = merge_text(style, &item.title, &summary, &chunk.text);

    EnrichedChunk {
        id: chunk.id,
        chunk_id: chunk.chunk_id,
        text,
        tags: chunk.tags,
        label: chunk.label,
        source: chunk.source,
        parent_hash: chunk.hash,
        context: summary,
    }
}

/// Merge the generated summary (or title) with the original chunk text.
/// The convention must stay fixed across a corpus; it is part of what the
/// index was built over.
fn merge_text(style: AugmentStyle, title: &str, summary: &str, chunk_text: &str) -> String {
    match style {
        AugmentStyle::TitlePrefix => format!("Title: {}\n\n{}", title, chunk_text),
        AugmentStyle::PrependSummary => {
            if summary.is_empty() {
                chunk_text.to_string()
            } else {
                format!("{}\n\n{}", summary, chunk_text)
            }
        }
        AugmentStyle::AppendSummary => {
            if summary.is_empty() {
                chunk_text.to_string()
            } else {
                format!("{}\n\n{}", chunk_text, summary)
            }
        }
    }
}
