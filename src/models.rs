//! Core data models used throughout rag-bench.
//!
//! These types represent the documents, chunks, and retrieval results that
//! flow through the chunking, augmentation, indexing, and evaluation
//! pipeline. Persisted forms are one JSON record per line.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

/// Raw input document, read from a JSONL corpus. Immutable once ingested.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Document {
    pub id: String,
    pub title: String,
    pub body: String,
    #[serde(default)]
    pub tags: Option<String>,
    #[serde(default)]
    pub label: Option<i64>,
    #[serde(default)]
    pub source: Option<String>,
}

/// A fixed-size span of one document's text.
///
/// `(id, chunk_id)` is the unique key of a chunk across a corpus; `chunk_id`
/// is the 0-based position of the chunk within its parent document. `hash`
/// is a SHA-256 of the chunk text, used for staleness detection between a
/// base corpus and stores derived from it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Chunk {
    pub id: String,
    pub chunk_id: u32,
    #[serde(rename = "chunk")]
    pub text: String,
    #[serde(default)]
    pub tags: Option<String>,
    #[serde(default)]
    pub label: Option<i64>,
    #[serde(default)]
    pub source: Option<String>,
    #[serde(default)]
    pub hash: String,
}

impl Chunk {
    pub fn key(&self) -> ChunkKey {
        ChunkKey {
            id: self.id.clone(),
            chunk_id: self.chunk_id,
        }
    }
}

/// The unique key of a chunk: parent document id plus sequence index.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ChunkKey {
    pub id: String,
    pub chunk_id: u32,
}

/// A chunk enriched with generated context, persisted to the augmented
/// corpus. `parent_hash` is the hash of the chunk this record was derived
/// from; `context` is the generated summary (empty when generation was
/// degraded).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EnrichedChunk {
    pub id: String,
    pub chunk_id: u32,
    #[serde(rename = "chunk")]
    pub text: String,
    #[serde(default)]
    pub tags: Option<String>,
    #[serde(default)]
    pub label: Option<i64>,
    #[serde(default)]
    pub source: Option<String>,
    #[serde(default)]
    pub parent_hash: String,
    #[serde(default)]
    pub context: String,
}

impl EnrichedChunk {
    pub fn key(&self) -> ChunkKey {
        ChunkKey {
            id: self.id.clone(),
            chunk_id: self.chunk_id,
        }
    }

    /// View the enriched record as a plain chunk for indexing.
    pub fn into_chunk(self) -> Chunk {
        let hash = text_hash(&self.text);
        Chunk {
            id: self.id,
            chunk_id: self.chunk_id,
            text: self.text,
            tags: self.tags,
            label: self.label,
            source: self.source,
            hash,
        }
    }
}

/// A retrieval result: chunk metadata plus its squared L2 distance to the
/// query vector (smaller is closer).
#[derive(Debug, Clone)]
pub struct ScoredChunk {
    pub id: String,
    pub chunk_id: u32,
    pub text: String,
    pub tags: Option<String>,
    pub label: Option<i64>,
    pub source: Option<String>,
    pub distance: f32,
}

impl ScoredChunk {
    pub fn key(&self) -> ChunkKey {
        ChunkKey {
            id: self.id.clone(),
            chunk_id: self.chunk_id,
        }
    }
}

/// One gold evaluation question with its labeled relevant chunks.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EvalQuestion {
    pub question: String,
    pub id: String,
    pub relevant_chunk_ids: Vec<u32>,
}

/// One recorded retrieval run, appended to the evaluation log and read
/// back for gold-answer evaluation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EvalLogEntry {
    pub query: String,
    pub mode: String,
    pub chunks: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub gold_answer: Option<String>,
    pub logged_at: DateTime<Utc>,
}

/// SHA-256 hex digest of a text, the staleness marker carried on chunks.
pub fn text_hash(text: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(text.as_bytes());
    format!("{:x}", hasher.finalize())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_chunk_key_equality() {
        let a = ChunkKey {
            id: "42".into(),
            chunk_id: 0,
        };
        let b = ChunkKey {
            id: "42".into(),
            chunk_id: 0,
        };
        let c = ChunkKey {
            id: "42".into(),
            chunk_id: 1,
        };
        assert_eq!(a, b);
        assert_ne!(a, c);
    }

    #[test]
    fn test_text_hash_deterministic() {
        assert_eq!(text_hash("alpha"), text_hash("alpha"));
        assert_ne!(text_hash("alpha"), text_hash("beta"));
    }

    #[test]
    fn test_chunk_round_trips_through_json() {
        let chunk = Chunk {
            id: "7".into(),
            chunk_id: 3,
            text: "some words".into(),
            tags: Some("rust".into()),
            label: Some(1),
            source: Some("cs".into()),
            hash: text_hash("some words"),
        };
        let line = serde_json::to_string(&chunk).unwrap();
        // Persisted field name is `chunk`, matching the corpus format.
        assert!(line.contains("\"chunk\":\"some words\""));
        let back: Chunk = serde_json::from_str(&line).unwrap();
        assert_eq!(back.text, chunk.text);
        assert_eq!(back.key(), chunk.key());
    }
}
