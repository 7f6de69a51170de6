//! Exact flat vector index with paired chunk metadata.
//!
//! [`FlatIndex`] is a brute-force squared-L2 nearest-neighbor structure:
//! every query is compared against every stored vector. Exact search keeps
//! results bit-reproducible and is fast enough for the corpus sizes this
//! system targets (tens of thousands of chunks).
//!
//! [`VectorIndex`] pairs each vector with its chunk key and metadata in a
//! single persisted file, so the vector store and the metadata can never
//! drift apart: one JSONL file per pipeline variant, a header record
//! carrying `{version, model, dims}` followed by one record per row with
//! the embedding as a base64 little-endian f32 blob.
//!
//! Indexes are built in full and are read-only afterwards; changing the
//! embedding model or chunk parameters means rebuilding.

use anyhow::{bail, Context, Result};
use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use serde::{Deserialize, Serialize};
use std::io::{BufRead, BufReader, BufWriter, Write};
use std::path::Path;

use crate::embedding::{blob_to_vec, vec_to_blob, EmbeddingProvider};
use crate::models::{Chunk, ScoredChunk};

const INDEX_FORMAT_VERSION: u32 = 1;

/// Brute-force squared-L2 nearest-neighbor search over row-ordered vectors.
#[derive(Debug, Clone)]
pub struct FlatIndex {
    dims: usize,
    vectors: Vec<Vec<f32>>,
}

impl FlatIndex {
    pub fn new(dims: usize) -> Self {
        Self {
            dims,
            vectors: Vec::new(),
        }
    }

    pub fn dims(&self) -> usize {
        self.dims
    }

    pub fn len(&self) -> usize {
        self.vectors.len()
    }

    pub fn is_empty(&self) -> bool {
        self.vectors.is_empty()
    }

    /// Append a vector as the next row.
    pub fn add(&mut self, vector: Vec<f32>) -> Result<()> {
        if vector.len() != self.dims {
            bail!(
                "Vector dimension mismatch: index has {}, got {}",
                self.dims,
                vector.len()
            );
        }
        self.vectors.push(vector);
        Ok(())
    }

    /// Return the `k` nearest rows to `query` as `(row, squared L2
    /// distance)`, nearest first. Ties break by row order, so identical
    /// inputs always rank identically. `k` greater than the row count
    /// returns every row.
    pub fn search(&self, query: &[f32], k: usize) -> Result<Vec<(usize, f32)>> {
        if query.len() != self.dims {
            bail!(
                "Query dimension mismatch: index has {}, got {}",
                self.dims,
                query.len()
            );
        }

        let mut scored: Vec<(usize, f32)> = self
            .vectors
            .iter()
            .enumerate()
            .map(|(row, vec)| (row, l2_sq(query, vec)))
            .collect();

        scored.sort_by(|a, b| {
            a.1.partial_cmp(&b.1)
                .unwrap_or(std::cmp::Ordering::Equal)
                .then(a.0.cmp(&b.0))
        });
        scored.truncate(k.min(self.vectors.len()));
        Ok(scored)
    }
}

/// Squared Euclidean distance (no square root; ordering is unchanged and
/// matches what flat L2 index libraries report).
fn l2_sq(a: &[f32], b: &[f32]) -> f32 {
    a.iter()
        .zip(b.iter())
        .map(|(x, y)| {
            let d = x - y;
            d * d
        })
        .sum()
}

/// Chunk metadata carried on each index row.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IndexRow {
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

#[derive(Debug, Serialize, Deserialize)]
struct IndexHeader {
    version: u32,
    model: String,
    dims: usize,
}

#[derive(Debug, Serialize, Deserialize)]
struct PersistedRow {
    #[serde(flatten)]
    row: IndexRow,
    embedding: String,
}

/// A flat index plus the chunk metadata for every row, built and persisted
/// as one unit.
#[derive(Debug)]
pub struct VectorIndex {
    model: String,
    index: FlatIndex,
    rows: Vec<IndexRow>,
}

impl VectorIndex {
    pub fn model_name(&self) -> &str {
        &self.model
    }

    pub fn dims(&self) -> usize {
        self.index.dims()
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// Embed every chunk and record vectors in input chunk order.
    pub async fn build(
        chunks: &[Chunk],
        provider: &dyn EmbeddingProvider,
        batch_size: usize,
    ) -> Result<Self> {
        let mut index = FlatIndex::new(provider.dims());
        let mut rows = Vec::with_capacity(chunks.len());

        for batch in chunks.chunks(batch_size.max(1)) {
            let texts: Vec<String> = batch.iter().map(|c| c.text.clone()).collect();
            let vectors = provider.embed(&texts).await?;
            for (chunk, vector) in batch.iter().zip(vectors.into_iter()) {
                index.add(vector)?;
                rows.push(IndexRow {
                    id: chunk.id.clone(),
                    chunk_id: chunk.chunk_id,
                    text: chunk.text.clone(),
                    tags: chunk.tags.clone(),
                    label: chunk.label,
                    source: chunk.source.clone(),
                    hash: chunk.hash.clone(),
                });
            }
            tracing::debug!(embedded = rows.len(), total = chunks.len(), "index build progress");
        }

        Ok(Self {
            model: provider.model_name().to_string(),
            index,
            rows,
        })
    }

    /// Construct directly from rows and vectors, one vector per row.
    /// Exposed for tests and for callers that already hold vectors.
    pub fn from_parts(model: &str, dims: usize, rows: Vec<IndexRow>, vectors: Vec<Vec<f32>>) -> Result<Self> {
        if rows.len() != vectors.len() {
            bail!(
                "Row/vector count mismatch: {} rows, {} vectors",
                rows.len(),
                vectors.len()
            );
        }
        let mut index = FlatIndex::new(dims);
        for vector in vectors {
            index.add(vector)?;
        }
        Ok(Self {
            model: model.to_string(),
            index,
            rows,
        })
    }

    /// Write the index to a single JSONL file: header first, then one
    /// record per row pairing metadata with its vector.
    pub fn save(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let file = std::fs::File::create(path)
            .with_context(|| format!("Failed to create index file {}", path.display()))?;
        let mut writer = BufWriter::new(file);

        let header = IndexHeader {
            version: INDEX_FORMAT_VERSION,
            model: self.model.clone(),
            dims: self.index.dims(),
        };
        serde_json::to_writer(&mut writer, &header)?;
        writer.write_all(b"\n")?;

        for (row, vector) in self.rows.iter().zip(self.index.vectors.iter()) {
            let record = PersistedRow {
                row: row.clone(),
                embedding: BASE64.encode(vec_to_blob(vector)),
            };
            serde_json::to_writer(&mut writer, &record)?;
            writer.write_all(b"\n")?;
        }

        writer.flush()?;
        Ok(())
    }

    /// Load an index from disk.
    ///
    /// A missing file or corrupt header is fatal: retrieval cannot
    /// operate without the index. Malformed data rows are skipped and
    /// counted; a vector whose length disagrees with the header dims is
    /// fatal, since every retrieval against it would be silently wrong.
    pub fn load(path: &Path) -> Result<Self> {
        let file = std::fs::File::open(path).with_context(|| {
            format!(
                "index unavailable: cannot open {} (build it with `rag index build`)",
                path.display()
            )
        })?;
        let mut reader = BufReader::new(file);

        let mut header_line = String::new();
        reader
            .read_line(&mut header_line)
            .with_context(|| format!("Failed to read {}", path.display()))?;
        let header: IndexHeader = serde_json::from_str(header_line.trim())
            .with_context(|| format!("index unavailable: corrupt header in {}", path.display()))?;
        if header.version != INDEX_FORMAT_VERSION {
            bail!(
                "index unavailable: unsupported index format version {} in {}",
                header.version,
                path.display()
            );
        }

        let mut index = FlatIndex::new(header.dims);
        let mut rows = Vec::new();
        let mut skipped = 0usize;

        for line in reader.lines() {
            let line = line.with_context(|| format!("Failed to read {}", path.display()))?;
            if line.trim().is_empty() {
                continue;
            }
            let record: PersistedRow = match serde_json::from_str(&line) {
                Ok(record) => record,
                Err(_) => {
                    skipped += 1;
                    continue;
                }
            };
            let blob = match BASE64.decode(&record.embedding) {
                Ok(blob) => blob,
                Err(_) => {
                    skipped += 1;
                    continue;
                }
            };
            let vector = blob_to_vec(&blob);
            if vector.len() != header.dims {
                bail!(
                    "index unavailable: row ({}, {}) has {} dims, header says {}",
                    record.row.id,
                    record.row.chunk_id,
                    vector.len(),
                    header.dims
                );
            }
            index.add(vector)?;
            rows.push(record.row);
        }

        if skipped > 0 {
            tracing::warn!(
                file = %path.display(),
                skipped,
                "skipped malformed index rows while loading"
            );
        }

        Ok(Self {
            model: header.model,
            index,
            rows,
        })
    }

    /// Top-`k` rows for a query vector, nearest first.
    pub fn search(&self, query: &[f32], k: usize) -> Result<Vec<ScoredChunk>> {
        let hits = self.index.search(query, k)?;
        Ok(hits
            .into_iter()
            .map(|(row, distance)| {
                let meta = &self.rows[row];
                ScoredChunk {
                    id: meta.id.clone(),
                    chunk_id: meta.chunk_id,
                    text: meta.text.clone(),
                    tags: meta.tags.clone(),
                    label: meta.label,
                    source: meta.source.clone(),
                    distance,
                }
            })
            .collect())
    }
}
