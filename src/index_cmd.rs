//! CLI orchestration for index build and status.

use anyhow::{bail, Result};

use crate::config::Config;
use crate::embedding;
use crate::index::VectorIndex;
use crate::models::{Chunk, EnrichedChunk};
use crate::store;

/// Build the index for a pipeline variant from its corpus file and persist
/// it. Indexes are always rebuilt in full; there is no incremental path.
pub async fn run_build(config: &Config, variant: &str) -> Result<()> {
    if !config.embedding.is_enabled() {
        bail!("Index build requires embeddings. Set [embedding] provider in config.");
    }

    let chunks = load_variant_corpus(config, variant)?;
    if chunks.is_empty() {
        bail!("No chunks to index for variant '{}'. Run `rag chunk` first.", variant);
    }

    let provider = embedding::create_provider(&config.embedding)?;
    tracing::info!(
        variant,
        chunks = chunks.len(),
        model = provider.model_name(),
        "building index"
    );

    let index = VectorIndex::build(&chunks, provider.as_ref(), config.embedding.batch_size).await?;

    let path = config.storage.index_path(variant);
    index.save(&path)?;

    println!("index build {}", variant);
    println!("  chunks indexed: {}", index.len());
    println!("  model: {}", index.model_name());
    println!("  dims: {}", index.dims());
    println!("  written: {}", path.display());
    println!("ok");

    Ok(())
}

/// Print what a persisted index contains, for operator verification.
pub fn run_status(config: &Config, variant: &str) -> Result<()> {
    let path = config.storage.index_path(variant);
    let index = VectorIndex::load(&path)?;

    println!("index status {}", variant);
    println!("  file: {}", path.display());
    println!("  rows: {}", index.len());
    println!("  model: {}", index.model_name());
    println!("  dims: {}", index.dims());

    Ok(())
}

/// Load the chunk corpus backing a variant.
///
/// The baseline variant prefers the train split when one exists (so held
/// out evaluation documents stay out of the index); the contextual variant
/// reads the enriched store.
fn load_variant_corpus(config: &Config, variant: &str) -> Result<Vec<Chunk>> {
    match variant {
        "baseline" => {
            let train = config.storage.train_corpus_path();
            let path = if train.exists() {
                train
            } else {
                config.storage.corpus_path()
            };
            let read = store::read_jsonl::<Chunk>(&path)?;
            report_skipped(read.skipped);
            Ok(read.records)
        }
        "contextual" => {
            let read = store::read_jsonl::<EnrichedChunk>(&config.storage.enriched_path())?;
            report_skipped(read.skipped);
            Ok(read
                .records
                .into_iter()
                .map(EnrichedChunk::into_chunk)
                .collect())
        }
        other => bail!(
            "Unknown pipeline variant: '{}'. Use baseline or contextual.",
            other
        ),
    }
}

fn report_skipped(skipped: usize) {
    if skipped > 0 {
        eprintln!("Warning: skipped {} malformed corpus lines", skipped);
    }
}
