//! End-to-end pipeline tests against deterministic in-test providers.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use anyhow::Result;
use async_trait::async_trait;
use tempfile::TempDir;

use rag_bench::augment::{augment_chunks, PendingChunk};
use rag_bench::config::AugmentStyle;
use rag_bench::embedding::EmbeddingProvider;
use rag_bench::eval::evaluate_ids;
use rag_bench::generation::Generator;
use rag_bench::index::VectorIndex;
use rag_bench::models::{text_hash, Chunk, EnrichedChunk, EvalQuestion};
use rag_bench::retriever::Retriever;
use rag_bench::store;

/// Embeds each text as a 2-D point derived from a trailing integer in the
/// text ("point 3" → (3, 3)), making nearest-neighbor results predictable.
struct PointProvider;

#[async_trait]
impl EmbeddingProvider for PointProvider {
    fn model_name(&self) -> &str {
        "point-model"
    }
    fn dims(&self) -> usize {
        2
    }
    async fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        Ok(texts
            .iter()
            .map(|text| {
                let n: f32 = text
                    .split_whitespace()
                    .last()
                    .and_then(|w| w.parse().ok())
                    .unwrap_or(0.0);
                vec![n, n]
            })
            .collect())
    }
}

/// Counts calls; fails every generation after `fail_after` calls.
struct CountingGenerator {
    calls: AtomicU64,
    fail_after: u64,
}

#[async_trait]
impl Generator for CountingGenerator {
    fn model_name(&self) -> &str {
        "counting"
    }
    async fn generate(&self, _prompt: &str) -> Result<String> {
        let n = self.calls.fetch_add(1, Ordering::SeqCst);
        if n >= self.fail_after {
            anyhow::bail!("model server went away");
        }
        Ok(format!("summary {}", n))
    }
}

fn point_chunk(doc: &str, chunk_id: u32, n: u32) -> Chunk {
    let text = format!("point {}", n);
    Chunk {
        id: doc.into(),
        chunk_id,
        hash: text_hash(&text),
        text,
        tags: None,
        label: None,
        source: Some("test".into()),
    }
}

#[tokio::test]
async fn build_save_load_retrieve_round_trip() {
    let tmp = TempDir::new().unwrap();
    let index_path = tmp.path().join("baseline.index.jsonl");

    // Corpus of 5 chunks embedding to (0,0)..(4,4).
    let chunks: Vec<Chunk> = (0..5).map(|i| point_chunk("d1", i, i)).collect();
    let index = VectorIndex::build(&chunks, &PointProvider, 2).await.unwrap();
    assert_eq!(index.len(), 5);
    index.save(&index_path).unwrap();

    let retriever = Retriever::open(&index_path, Box::new(PointProvider)).unwrap();

    // Query "point 0" embeds to (0,0): rows 0,1,2 at squared distances
    // 0, 2, 8.
    let results = retriever.retrieve("point 0", 3).await.unwrap();
    assert_eq!(
        results.iter().map(|r| r.chunk_id).collect::<Vec<_>>(),
        vec![0, 1, 2]
    );
    assert_eq!(
        results.iter().map(|r| r.distance).collect::<Vec<_>>(),
        vec![0.0, 2.0, 8.0]
    );

    // A second identical call returns identical ordered results.
    let again = retriever.retrieve("point 0", 3).await.unwrap();
    let a: Vec<_> = results.iter().map(|r| (r.chunk_id, r.distance.to_bits())).collect();
    let b: Vec<_> = again.iter().map(|r| (r.chunk_id, r.distance.to_bits())).collect();
    assert_eq!(a, b);
}

#[tokio::test]
async fn loaded_index_matches_fresh_index_for_all_k() {
    let chunks: Vec<Chunk> = (0..8).map(|i| point_chunk("d1", i, (i * 3) % 8)).collect();
    let fresh = VectorIndex::build(&chunks, &PointProvider, 3).await.unwrap();

    let tmp = TempDir::new().unwrap();
    let path = tmp.path().join("x.index.jsonl");
    fresh.save(&path).unwrap();
    let loaded = VectorIndex::load(&path).unwrap();

    for k in 1..=8 {
        let q = vec![2.5, 2.5];
        let a: Vec<_> = fresh
            .search(&q, k)
            .unwrap()
            .iter()
            .map(|r| (r.chunk_id, r.distance.to_bits()))
            .collect();
        let b: Vec<_> = loaded
            .search(&q, k)
            .unwrap()
            .iter()
            .map(|r| (r.chunk_id, r.distance.to_bits()))
            .collect();
        assert_eq!(a, b, "k = {}", k);
    }
}

#[tokio::test]
async fn identifier_eval_over_built_index() {
    let tmp = TempDir::new().unwrap();
    let index_path = tmp.path().join("baseline.index.jsonl");

    // Two documents: d1 near the origin, d2 far away.
    let mut chunks: Vec<Chunk> = (0..3).map(|i| point_chunk("d1", i, i)).collect();
    chunks.extend((0..3).map(|i| point_chunk("d2", i, 100 + i)));

    let index = VectorIndex::build(&chunks, &PointProvider, 10).await.unwrap();
    index.save(&index_path).unwrap();
    let retriever = Retriever::open(&index_path, Box::new(PointProvider)).unwrap();

    // A query embedding near d1 must rank d1's chunks first.
    let retrieved = retriever.retrieve("point 1", 5).await.unwrap();
    let gold = EvalQuestion {
        question: "point 1".into(),
        id: "d1".into(),
        relevant_chunk_ids: vec![0, 1, 2],
    };
    let metrics = evaluate_ids(&gold, &retrieved, 5);
    assert_eq!(metrics.recall_at_1, 1.0);
    assert_eq!(metrics.recall_at_k, 1.0);
    assert_eq!(metrics.mrr, 1.0);

    // A query embedding near d2 must not credit d1.
    let retrieved = retriever.retrieve("point 101", 3).await.unwrap();
    let metrics = evaluate_ids(&gold, &retrieved, 3);
    assert_eq!(metrics.recall_at_k, 0.0);
    assert_eq!(metrics.mrr, 0.0);
}

#[tokio::test]
async fn augment_then_index_contextual_corpus() {
    let tmp = TempDir::new().unwrap();
    let enriched_path = tmp.path().join("chunked_contextual.jsonl");

    let pending: Vec<PendingChunk> = (0..4)
        .map(|i| PendingChunk {
            chunk: point_chunk("d1", i, i),
            title: "Points".into(),
        })
        .collect();

    let generator = Arc::new(CountingGenerator {
        calls: AtomicU64::new(0),
        fail_after: u64::MAX,
    });
    let stats = augment_chunks(
        pending,
        generator,
        AugmentStyle::AppendSummary,
        2,
        &enriched_path,
    )
    .await
    .unwrap();
    assert_eq!(stats.generated, 4);
    assert_eq!(stats.degraded, 0);

    // The enriched store indexes like any corpus.
    let enriched = store::read_jsonl::<EnrichedChunk>(&enriched_path).unwrap();
    let chunks: Vec<Chunk> = enriched
        .records
        .into_iter()
        .map(EnrichedChunk::into_chunk)
        .collect();
    assert_eq!(chunks.len(), 4);

    let index = VectorIndex::build(&chunks, &PointProvider, 4).await.unwrap();
    assert_eq!(index.len(), 4);
}

#[tokio::test]
async fn augment_survives_midrun_failures_and_resumes() {
    let tmp = TempDir::new().unwrap();
    let enriched_path = tmp.path().join("chunked_contextual.jsonl");

    let pending: Vec<PendingChunk> = (0..6)
        .map(|i| PendingChunk {
            chunk: point_chunk("d1", i, i),
            title: "Points".into(),
        })
        .collect();

    // The generator fails from the third call on: every chunk still gets
    // a record, the failed ones with an empty summary.
    let generator = Arc::new(CountingGenerator {
        calls: AtomicU64::new(0),
        fail_after: 2,
    });
    let stats = augment_chunks(
        pending.clone(),
        generator,
        AugmentStyle::PrependSummary,
        1,
        &enriched_path,
    )
    .await
    .unwrap();
    assert_eq!(stats.generated, 6);
    assert_eq!(stats.degraded, 4);

    // A re-run with a healthy generator adds nothing: all keys exist.
    let healthy = Arc::new(CountingGenerator {
        calls: AtomicU64::new(0),
        fail_after: u64::MAX,
    });
    let stats = augment_chunks(
        pending,
        healthy,
        AugmentStyle::PrependSummary,
        1,
        &enriched_path,
    )
    .await
    .unwrap();
    assert_eq!(stats.generated, 0);
    assert_eq!(stats.skipped, 6);

    let records = store::read_jsonl::<EnrichedChunk>(&enriched_path).unwrap().records;
    assert_eq!(records.len(), 6);
}

#[tokio::test]
async fn malformed_index_rows_are_tolerated_at_load() {
    let tmp = TempDir::new().unwrap();
    let path = tmp.path().join("dented.index.jsonl");

    let chunks: Vec<Chunk> = (0..4).map(|i| point_chunk("d1", i, i)).collect();
    let index = VectorIndex::build(&chunks, &PointProvider, 4).await.unwrap();
    index.save(&path).unwrap();

    // Corrupt one data row; the header stays intact.
    let content = std::fs::read_to_string(&path).unwrap();
    let mut lines: Vec<String> = content.lines().map(String::from).collect();
    lines[3] = "{\"not\": \"a row\"}".into();
    std::fs::write(&path, lines.join("\n")).unwrap();

    let loaded = VectorIndex::load(&path).unwrap();
    assert_eq!(loaded.len(), 3);
    // Remaining rows still answer queries.
    let results = loaded.search(&[0.0, 0.0], 3).unwrap();
    assert_eq!(results.len(), 3);
}
