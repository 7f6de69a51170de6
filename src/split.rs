//! Train/eval corpus split.
//!
//! Holds out a fraction of document ids from a chunk corpus as evaluation
//! questions and writes the remaining chunks as the training corpus. The
//! held-out question's gold data is the document's own chunk ids, so
//! identifier-mode evaluation can measure whether retrieval finds the
//! document the question came from. Seeded and deterministic.

use anyhow::{bail, Result};
use std::collections::HashMap;

use crate::config::Config;
use crate::models::{Chunk, EvalQuestion};
use crate::store;

/// Split the chunk corpus at `ratio` (fraction of documents held out for
/// evaluation), writing the train corpus and eval questions files.
pub fn run_split(config: &Config, ratio: f64, seed: u64) -> Result<()> {
    if !(0.0..1.0).contains(&ratio) {
        bail!("split ratio must be in [0.0, 1.0), got {}", ratio);
    }

    let corpus_path = config.storage.corpus_path();
    let read = store::read_jsonl::<Chunk>(&corpus_path)?;
    if read.records.is_empty() {
        bail!("Corpus {} is empty. Run `rag chunk` first.", corpus_path.display());
    }

    let (train, questions) = split_corpus(read.records, ratio, seed);

    store::write_jsonl(&config.storage.train_corpus_path(), &train)?;
    store::write_jsonl(&config.storage.eval_questions_path(), &questions)?;

    println!("split");
    println!("  train chunks: {}", train.len());
    println!("  eval questions: {}", questions.len());
    if read.skipped > 0 {
        println!("  skipped (malformed lines): {}", read.skipped);
    }
    println!("ok");

    Ok(())
}

/// Group chunks by document, hold out a seeded fraction of documents as
/// eval questions, and return the remaining chunks in their original
/// order.
pub fn split_corpus(chunks: Vec<Chunk>, ratio: f64, seed: u64) -> (Vec<Chunk>, Vec<EvalQuestion>) {
    let mut order: Vec<String> = Vec::new();
    let mut by_id: HashMap<String, Vec<Chunk>> = HashMap::new();
    for chunk in chunks {
        if !by_id.contains_key(&chunk.id) {
            order.push(chunk.id.clone());
        }
        by_id.entry(chunk.id.clone()).or_default().push(chunk);
    }

    let mut shuffled = order.clone();
    shuffle(&mut shuffled, seed);
    let eval_count = (shuffled.len() as f64 * ratio) as usize;
    let eval_ids: std::collections::HashSet<&String> = shuffled.iter().take(eval_count).collect();

    let mut train = Vec::new();
    let mut questions = Vec::new();

    for id in &order {
        let doc_chunks = &by_id[id];
        if eval_ids.contains(id) {
            questions.push(EvalQuestion {
                question: question_from(doc_chunks),
                id: id.clone(),
                relevant_chunk_ids: doc_chunks.iter().map(|c| c.chunk_id).collect(),
            });
        } else {
            train.extend(doc_chunks.iter().cloned());
        }
    }

    (train, questions)
}

/// Derive a question from a held-out document: the first line of its first
/// chunk (the title line when chunking included titles), capped at 300
/// chars.
fn question_from(chunks: &[Chunk]) -> String {
    chunks
        .first()
        .and_then(|chunk| chunk.text.lines().next())
        .map(|line| line.chars().take(300).collect())
        .unwrap_or_default()
}

/// Seeded Fisher-Yates shuffle driven by a SplitMix64 stream. The split
/// only needs a reproducible permutation, not a crypto-grade source.
fn shuffle<T>(items: &mut [T], seed: u64) {
    let mut state = seed;
    let mut next = move || {
        state = state.wrapping_add(0x9E37_79B9_7F4A_7C15);
        let mut z = state;
        z = (z ^ (z >> 30)).wrapping_mul(0xBF58_476D_1CE4_E5B9);
        z = (z ^ (z >> 27)).wrapping_mul(0x94D0_49BB_1331_11EB);
        z ^ (z >> 31)
    };

    for i in (1..items.len()).rev() {
        let j = (next() % (i as u64 + 1)) as usize;
        items.swap(i, j);
    }
}
