//! Query-time retrieval against a persisted index.
//!
//! [`Retriever`] is the explicit query context: it owns the loaded index
//! and the embedding provider, is constructed once per process, and is
//! reused across queries. It never mutates the index, so one instance can
//! serve any number of read-only retrievals.

use anyhow::{Context, Result};
use std::io::Write;
use std::path::Path;
use std::sync::Arc;

use chrono::Utc;

use crate::config::Config;
use crate::embedding::{self, EmbeddingProvider};
use crate::generation::{self, Generator, OllamaGenerator};
use crate::index::VectorIndex;
use crate::models::{EvalLogEntry, ScoredChunk};
use crate::store;

pub struct Retriever {
    index: VectorIndex,
    provider: Box<dyn EmbeddingProvider>,
}

impl Retriever {
    /// Load the index at `path` and bind it to an embedding provider.
    ///
    /// The provider must be the one the index was built with; a mismatched
    /// embedder produces meaningless distances without any structural
    /// error, so a differing model name is at least warned about.
    pub fn open(path: &Path, provider: Box<dyn EmbeddingProvider>) -> Result<Self> {
        let index = VectorIndex::load(path)?;

        if index.model_name() != provider.model_name() {
            tracing::warn!(
                index_model = index.model_name(),
                provider_model = provider.model_name(),
                "index was built with a different embedding model; results will be unreliable"
            );
        }

        Ok(Self { index, provider })
    }

    pub fn from_parts(index: VectorIndex, provider: Box<dyn EmbeddingProvider>) -> Self {
        Self { index, provider }
    }

    pub fn len(&self) -> usize {
        self.index.len()
    }

    pub fn is_empty(&self) -> bool {
        self.index.is_empty()
    }

    /// Embed `query` and return the top-`k` chunks by ascending squared L2
    /// distance. Deterministic for a fixed index and query text.
    pub async fn retrieve(&self, query: &str, k: usize) -> Result<Vec<ScoredChunk>> {
        let query_vec = embedding::embed_query(self.provider.as_ref(), query).await?;
        self.index.search(&query_vec, k)
    }
}

/// Resolve the index path for a pipeline variant name.
fn variant_index_path(config: &Config, variant: &str) -> Result<std::path::PathBuf> {
    match variant {
        "baseline" | "contextual" => Ok(config.storage.index_path(variant)),
        other => anyhow::bail!(
            "Unknown pipeline variant: '{}'. Use baseline or contextual.",
            other
        ),
    }
}

fn open_retriever(config: &Config, variant: &str) -> Result<Retriever> {
    let provider = embedding::create_provider(&config.embedding)?;
    let path = variant_index_path(config, variant)?;
    Retriever::open(&path, provider)
}

/// One-shot query command: print the ranked chunks for a single query.
pub async fn run_query(config: &Config, variant: &str, query: &str, k: Option<usize>) -> Result<()> {
    let retriever = open_retriever(config, variant)?;
    let k = k.unwrap_or(config.retrieval.top_k);

    let results = retriever.retrieve(query, k).await?;
    print_results(&results);
    Ok(())
}

/// Interactive query loop with answer synthesis.
///
/// Reads queries from stdin until the `exit` sentinel, retrieves against
/// the chosen variant, synthesizes an answer, and appends each run to the
/// evaluation log. Synthesis failures are reported explicitly so a broken
/// model server is never mistaken for "no relevant chunks found".
pub async fn run_ask(config: &Config, variant: &str, k: Option<usize>) -> Result<()> {
    let retriever = open_retriever(config, variant)?;
    let generator: Arc<dyn Generator> = Arc::new(OllamaGenerator::new(&config.generation)?);
    let k = k.unwrap_or(config.retrieval.top_k);
    let log_path = config.storage.eval_log_path();

    let stdin = std::io::stdin();
    loop {
        print!("\nquery ('exit' to quit)> ");
        std::io::stdout().flush()?;

        let mut line = String::new();
        if stdin.read_line(&mut line)? == 0 {
            break;
        }
        let query = line.trim();
        if query.is_empty() {
            continue;
        }
        if query.eq_ignore_ascii_case("exit") {
            break;
        }

        let results = retriever
            .retrieve(query, k)
            .await
            .context("retrieval failed")?;

        if results.is_empty() {
            println!("No results.");
            continue;
        }

        print_results(&results);

        let entry = EvalLogEntry {
            query: query.to_string(),
            mode: variant.to_string(),
            chunks: results.iter().map(|r| r.text.clone()).collect(),
            gold_answer: None,
            logged_at: Utc::now(),
        };
        store::append_jsonl(&log_path, &entry)?;

        println!("\ngenerating answer with {}...", generator.model_name());
        match generation::generate_answer(generator.as_ref(), query, &results).await {
            Ok(answer) => {
                println!("\n--- Answer ---");
                println!("{}", answer);
            }
            Err(e) => {
                eprintln!("Error: answer generation failed: {}", e);
            }
        }
    }

    Ok(())
}

fn print_results(results: &[ScoredChunk]) {
    for (i, result) in results.iter().enumerate() {
        let excerpt: String = result.text.chars().take(240).collect();
        println!(
            "{}. [{:.3}] {} / chunk {}",
            i + 1,
            result.distance,
            result.id,
            result.chunk_id
        );
        if let Some(ref source) = result.source {
            println!("    source: {}", source);
        }
        if let Some(ref tags) = result.tags {
            println!("    tags: {}", tags);
        }
        println!("    excerpt: \"{}\"", excerpt.replace('\n', " "));
        println!();
    }
}
