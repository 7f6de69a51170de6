//! Fixed-size text chunker.
//!
//! Splits document text into overlapping word windows or non-overlapping
//! character spans. Chunk ids are the 0-based position of the chunk within
//! its parent document, so the same input and configuration always produce
//! the same chunk records.

use anyhow::{bail, Result};
use std::path::Path;

use crate::config::{ChunkMode, ChunkingConfig, Config};
use crate::models::{text_hash, Chunk, Document};
use crate::store;

/// Split a document into chunks per the configured mode.
///
/// Word mode advances by `chunk_size - overlap` words per chunk; char mode
/// advances by `chunk_size` characters (overlap is not supported there).
/// An empty body produces zero chunks; the last chunk may be shorter than
/// `chunk_size`.
pub fn chunk_document(doc: &Document, config: &ChunkingConfig) -> Result<Vec<Chunk>> {
    let text = if config.include_title {
        format!("{}\n{}", doc.title, doc.body)
    } else {
        doc.body.clone()
    };

    let pieces = match config.mode {
        ChunkMode::WordCount => split_words(&text, config.chunk_size, config.overlap)?,
        ChunkMode::CharCount => split_chars(&text, config.chunk_size, config.overlap)?,
    };

    Ok(pieces
        .into_iter()
        .enumerate()
        .map(|(i, piece)| Chunk {
            id: doc.id.clone(),
            chunk_id: i as u32,
            hash: text_hash(&piece),
            text: piece,
            tags: doc.tags.clone(),
            label: doc.label,
            source: doc.source.clone(),
        })
        .collect())
}

/// Chunk a documents JSONL file into the corpus file.
pub fn run_chunk(config: &Config, input: &Path) -> Result<()> {
    let read = store::read_jsonl::<Document>(input)?;

    let mut chunks = Vec::new();
    for doc in &read.records {
        chunks.extend(chunk_document(doc, &config.chunking)?);
    }

    let out = config.storage.corpus_path();
    store::write_jsonl(&out, &chunks)?;

    println!("chunk");
    println!("  documents: {}", read.records.len());
    println!("  chunks written: {}", chunks.len());
    if read.skipped > 0 {
        println!("  skipped (malformed lines): {}", read.skipped);
    }
    println!("  written: {}", out.display());
    println!("ok");

    Ok(())
}

fn split_words(text: &str, chunk_size: usize, overlap: usize) -> Result<Vec<String>> {
    if chunk_size == 0 {
        bail!("chunk_size must be > 0");
    }
    // Re-checked here so a caller bypassing config validation still cannot
    // drive the window loop with a non-positive stride.
    if overlap >= chunk_size {
        bail!(
            "overlap ({}) must be strictly less than chunk_size ({})",
            overlap,
            chunk_size
        );
    }

    let words: Vec<&str> = text.split_whitespace().collect();
    if words.is_empty() {
        return Ok(Vec::new());
    }

    let stride = chunk_size - overlap;
    let mut chunks = Vec::new();
    let mut start = 0;
    while start < words.len() {
        let end = (start + chunk_size).min(words.len());
        chunks.push(words[start..end].join(" "));
        start += stride;
    }

    Ok(chunks)
}

fn split_chars(text: &str, chunk_size: usize, overlap: usize) -> Result<Vec<String>> {
    if chunk_size == 0 {
        bail!("chunk_size must be > 0");
    }
    if overlap != 0 {
        bail!("overlap is not supported in char_count mode");
    }

    if text.is_empty() {
        return Ok(Vec::new());
    }

    // Splits on char boundaries, never inside a UTF-8 code point.
    let chars: Vec<char> = text.chars().collect();
    Ok(chars
        .chunks(chunk_size)
        .map(|window| window.iter().collect())
        .collect())
}
