//! Retrieval quality evaluation.
//!
//! Two gold-record shapes, two modes:
//!
//! - **Answer mode** replays the evaluation log against a free-text gold
//!   answer. A retrieved chunk is a *keyword hit* when its token-set
//!   Jaccard similarity to the gold answer clears a threshold, and a
//!   *semantic hit* when the cosine similarity of their embeddings does.
//!   Recall@K here is hit-rate within the top K (hits divided by K, not
//!   by the number of relevant items) and Miss@K is its complement.
//! - **Identifier mode** scores retrieval against labeled relevant chunk
//!   keys: Recall@1 and Recall@K are set-membership tests, MRR@K is the
//!   reciprocal rank of the first gold hit, all averaged over queries.
//!
//! Entries without usable gold data are skipped from aggregates, never
//! counted as zero.

use anyhow::Result;
use std::collections::{HashMap, HashSet};

use crate::config::Config;
use crate::embedding::{self, cosine_similarity, EmbeddingProvider};
use crate::models::{ChunkKey, EvalLogEntry, EvalQuestion, ScoredChunk};
use crate::retriever::Retriever;
use crate::store;

/// Token-set Jaccard similarity over lower-cased whitespace tokens.
pub fn jaccard(a: &str, b: &str) -> f64 {
    let a_set: HashSet<String> = a.to_lowercase().split_whitespace().map(String::from).collect();
    let b_set: HashSet<String> = b.to_lowercase().split_whitespace().map(String::from).collect();
    let union = a_set.union(&b_set).count();
    if union == 0 {
        return 0.0;
    }
    let intersection = a_set.intersection(&b_set).count();
    intersection as f64 / union as f64
}

/// Answer-mode metrics for one log entry.
#[derive(Debug, Clone)]
pub struct AnswerMetrics {
    pub query: String,
    pub mode: String,
    pub keyword_recall: f64,
    pub keyword_miss: f64,
    /// Absent when no embedding provider is available.
    pub semantic_recall: Option<f64>,
    pub semantic_miss: Option<f64>,
}

/// Count keyword hits among the top-`k` chunks.
pub fn keyword_hits(gold: &str, chunks: &[String], k: usize, threshold: f64) -> usize {
    chunks
        .iter()
        .take(k)
        .filter(|chunk| jaccard(gold, chunk) >= threshold)
        .count()
}

/// Evaluate one log entry against its gold answer.
///
/// Returns `None` when the entry has no usable gold answer; such entries
/// are excluded from aggregates rather than scored zero.
pub async fn evaluate_answer_entry(
    entry: &EvalLogEntry,
    provider: Option<&dyn EmbeddingProvider>,
    k: usize,
    keyword_threshold: f64,
    semantic_threshold: f32,
) -> Result<Option<AnswerMetrics>> {
    let gold = match entry.gold_answer.as_deref() {
        Some(gold) if !gold.trim().is_empty() => gold,
        _ => return Ok(None),
    };

    let kw_hits = keyword_hits(gold, &entry.chunks, k, keyword_threshold);
    let keyword_recall = kw_hits as f64 / k as f64;

    let (semantic_recall, semantic_miss) = match provider {
        Some(provider) => {
            let gold_vec = embedding::embed_query(provider, gold).await?;
            let top: Vec<String> = entry.chunks.iter().take(k).cloned().collect();
            let chunk_vecs = provider.embed(&top).await?;
            let hits = chunk_vecs
                .iter()
                .filter(|vec| cosine_similarity(&gold_vec, vec) >= semantic_threshold)
                .count();
            let recall = hits as f64 / k as f64;
            (Some(recall), Some(1.0 - recall))
        }
        None => (None, None),
    };

    Ok(Some(AnswerMetrics {
        query: entry.query.clone(),
        mode: entry.mode.clone(),
        keyword_recall,
        keyword_miss: 1.0 - keyword_recall,
        semantic_recall,
        semantic_miss,
    }))
}

/// Identifier-mode scores for one query.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct IdMetrics {
    /// 1.0 when the top-ranked key is in the gold set.
    pub recall_at_1: f64,
    /// 1.0 when any of the top-K keys is in the gold set.
    pub recall_at_k: f64,
    /// Reciprocal rank of the first gold hit within the top K, else 0.
    pub mrr: f64,
}

/// Score retrieved keys against a gold relevant set.
pub fn evaluate_ids(gold: &EvalQuestion, retrieved: &[ScoredChunk], k: usize) -> IdMetrics {
    let gold_keys: HashSet<ChunkKey> = gold
        .relevant_chunk_ids
        .iter()
        .map(|&chunk_id| ChunkKey {
            id: gold.id.clone(),
            chunk_id,
        })
        .collect();

    let top: Vec<ChunkKey> = retrieved.iter().take(k).map(|r| r.key()).collect();

    let recall_at_1 = match top.first() {
        Some(first) if gold_keys.contains(first) => 1.0,
        _ => 0.0,
    };

    let recall_at_k = if top.iter().any(|key| gold_keys.contains(key)) {
        1.0
    } else {
        0.0
    };

    let mrr = top
        .iter()
        .position(|key| gold_keys.contains(key))
        .map(|pos| 1.0 / (pos + 1) as f64)
        .unwrap_or(0.0);

    IdMetrics {
        recall_at_1,
        recall_at_k,
        mrr,
    }
}

/// Replay the evaluation log and print answer-mode metrics per query/mode.
pub async fn run_eval_answers(config: &Config) -> Result<()> {
    let log_path = config.storage.eval_log_path();
    let read = store::read_jsonl::<EvalLogEntry>(&log_path)?;

    let provider: Option<Box<dyn EmbeddingProvider>> = if config.embedding.is_enabled() {
        Some(embedding::create_provider(&config.embedding)?)
    } else {
        None
    };

    let k = config.eval.top_k;
    let mut results: Vec<AnswerMetrics> = Vec::new();
    let mut skipped_no_gold = 0usize;

    for entry in &read.records {
        match evaluate_answer_entry(
            entry,
            provider.as_deref(),
            k,
            config.eval.keyword_threshold,
            config.eval.semantic_threshold,
        )
        .await?
        {
            Some(metrics) => results.push(metrics),
            None => skipped_no_gold += 1,
        }
    }

    // Group by query, preserving first-seen order.
    let mut order: Vec<String> = Vec::new();
    let mut grouped: HashMap<String, Vec<&AnswerMetrics>> = HashMap::new();
    for metrics in &results {
        if !grouped.contains_key(&metrics.query) {
            order.push(metrics.query.clone());
        }
        grouped.entry(metrics.query.clone()).or_default().push(metrics);
    }

    println!("eval answers (top-{})", k);
    for query in &order {
        println!("\nquery: {}", query);
        for run in &grouped[query] {
            println!("  mode: {}", run.mode);
            println!(
                "    keyword  recall@{}: {:.2}  miss: {:.2}",
                k, run.keyword_recall, run.keyword_miss
            );
            match (run.semantic_recall, run.semantic_miss) {
                (Some(recall), Some(miss)) => {
                    println!("    semantic recall@{}: {:.2}  miss: {:.2}", k, recall, miss);
                }
                _ => println!("    semantic recall@{}: (embedding provider disabled)", k),
            }
        }
    }

    println!();
    println!("  log entries: {}", read.records.len());
    println!("  evaluated: {}", results.len());
    println!("  skipped (no gold answer): {}", skipped_no_gold);
    if read.skipped > 0 {
        println!("  skipped (malformed lines): {}", read.skipped);
    }

    Ok(())
}

/// Score a gold question set against a variant's index and print the
/// aggregate Recall@1, Recall@K, and MRR@K.
pub async fn run_eval_questions(config: &Config, variant: &str) -> Result<()> {
    let questions_path = config.storage.eval_questions_path();
    let read = store::read_jsonl::<EvalQuestion>(&questions_path)?;

    let provider = embedding::create_provider(&config.embedding)?;
    let index_path = config.storage.index_path(variant);
    let retriever = Retriever::open(&index_path, provider)?;

    let k = config.eval.top_k;
    let mut recall_at_1 = 0.0;
    let mut recall_at_k = 0.0;
    let mut mrr = 0.0;
    let mut evaluated = 0usize;
    let mut skipped_no_gold = 0usize;

    for question in &read.records {
        if question.question.trim().is_empty() || question.relevant_chunk_ids.is_empty() {
            skipped_no_gold += 1;
            continue;
        }

        let retrieved = retriever.retrieve(&question.question, k).await?;
        let metrics = evaluate_ids(question, &retrieved, k);
        recall_at_1 += metrics.recall_at_1;
        recall_at_k += metrics.recall_at_k;
        mrr += metrics.mrr;
        evaluated += 1;
    }

    println!("eval questions ({}, top-{})", variant, k);
    if evaluated == 0 {
        println!("  no evaluable questions");
    } else {
        let n = evaluated as f64;
        println!("  recall@1: {:.4}", recall_at_1 / n);
        println!("  recall@{}: {:.4}", k, recall_at_k / n);
        println!("  mrr@{}: {:.4}", k, mrr / n);
    }
    println!("  evaluated: {}", evaluated);
    println!("  skipped (no gold): {}", skipped_no_gold);
    if read.skipped > 0 {
        println!("  skipped (malformed lines): {}", read.skipped);
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use chrono::Utc;

    #[test]
    fn test_jaccard_boundary() {
        // gold "a b c d", chunk "a b x y": intersection {a, b} = 2,
        // union {a, b, c, d, x, y} = 6, similarity = 1/3.
        let sim = jaccard("a b c d", "a b x y");
        assert!((sim - 1.0 / 3.0).abs() < 1e-9);

        // Not a hit at threshold 0.5; a hit at threshold 0.3.
        assert_eq!(keyword_hits("a b c d", &["a b x y".into()], 5, 0.5), 0);
        assert_eq!(keyword_hits("a b c d", &["a b x y".into()], 5, 0.3), 1);
    }

    #[test]
    fn test_jaccard_case_insensitive() {
        assert!((jaccard("Alpha Beta", "alpha beta") - 1.0).abs() < 1e-9);
    }

    #[test]
    fn test_jaccard_empty() {
        assert_eq!(jaccard("", ""), 0.0);
        assert_eq!(jaccard("a", ""), 0.0);
    }

    fn question(id: &str, relevant: &[u32]) -> EvalQuestion {
        EvalQuestion {
            question: "q".into(),
            id: id.into(),
            relevant_chunk_ids: relevant.to_vec(),
        }
    }

    fn retrieved(keys: &[(&str, u32)]) -> Vec<ScoredChunk> {
        keys.iter()
            .enumerate()
            .map(|(i, (id, chunk_id))| ScoredChunk {
                id: (*id).into(),
                chunk_id: *chunk_id,
                text: String::new(),
                tags: None,
                label: None,
                source: None,
                distance: i as f32,
            })
            .collect()
    }

    #[test]
    fn test_id_recall_membership_not_count() {
        // All five retrieved keys in the gold set: Recall@K is 1, not 5.
        let gold = question("d", &[0, 1, 2, 3, 4]);
        let hits = retrieved(&[("d", 0), ("d", 1), ("d", 2), ("d", 3), ("d", 4)]);
        let metrics = evaluate_ids(&gold, &hits, 5);
        assert_eq!(metrics.recall_at_k, 1.0);
        assert_eq!(metrics.recall_at_1, 1.0);
        assert_eq!(metrics.mrr, 1.0);
    }

    #[test]
    fn test_id_recall_at_1_requires_top_hit() {
        let gold = question("d", &[3]);
        let hits = retrieved(&[("d", 0), ("d", 3)]);
        let metrics = evaluate_ids(&gold, &hits, 5);
        assert_eq!(metrics.recall_at_1, 0.0);
        assert_eq!(metrics.recall_at_k, 1.0);
    }

    #[test]
    fn test_mrr_first_hit_at_rank_3() {
        let gold = question("d", &[9]);
        let hits = retrieved(&[("d", 0), ("d", 1), ("d", 9), ("d", 9)]);
        let metrics = evaluate_ids(&gold, &hits, 5);
        assert!((metrics.mrr - 1.0 / 3.0).abs() < 1e-9);
    }

    #[test]
    fn test_mrr_no_hit_is_zero() {
        let gold = question("d", &[7]);
        let hits = retrieved(&[("d", 0), ("other", 7)]);
        let metrics = evaluate_ids(&gold, &hits, 5);
        assert_eq!(metrics.mrr, 0.0);
        assert_eq!(metrics.recall_at_k, 0.0);
    }

    #[test]
    fn test_id_match_requires_same_document() {
        // Same chunk_id under a different document id is not a hit.
        let gold = question("d", &[0]);
        let hits = retrieved(&[("e", 0)]);
        let metrics = evaluate_ids(&gold, &hits, 5);
        assert_eq!(metrics.recall_at_k, 0.0);
    }

    #[test]
    fn test_keyword_recall_is_hits_over_k() {
        // 3 of 5 hits at K = 5 must be exactly 0.6.
        let gold = "alpha beta gamma";
        let chunks: Vec<String> = vec![
            "alpha beta gamma".into(),
            "alpha beta gamma delta".into(),
            "alpha beta gamma epsilon zeta".into(),
            "nothing relevant here".into(),
            "also unrelated text".into(),
        ];
        let hits = keyword_hits(gold, &chunks, 5, 0.5);
        assert_eq!(hits, 3);
        assert!((hits as f64 / 5.0 - 0.6).abs() < 1e-9);
    }

    struct ZeroProvider;

    #[async_trait]
    impl EmbeddingProvider for ZeroProvider {
        fn model_name(&self) -> &str {
            "zero"
        }
        fn dims(&self) -> usize {
            2
        }
        async fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
            // Identical unit vectors: every pair has cosine 1.0.
            Ok(texts.iter().map(|_| vec![1.0, 0.0]).collect())
        }
    }

    fn log_entry(gold: Option<&str>) -> EvalLogEntry {
        EvalLogEntry {
            query: "q".into(),
            mode: "baseline".into(),
            chunks: vec!["a b c d".into(), "x y z w".into()],
            gold_answer: gold.map(String::from),
            logged_at: Utc::now(),
        }
    }

    #[tokio::test]
    async fn test_entry_without_gold_skipped() {
        let metrics = evaluate_answer_entry(&log_entry(None), None, 5, 0.5, 0.7)
            .await
            .unwrap();
        assert!(metrics.is_none());

        let metrics = evaluate_answer_entry(&log_entry(Some("   ")), None, 5, 0.5, 0.7)
            .await
            .unwrap();
        assert!(metrics.is_none());
    }

    #[tokio::test]
    async fn test_semantic_recall_with_provider() {
        let provider = ZeroProvider;
        let metrics = evaluate_answer_entry(&log_entry(Some("a b c d")), Some(&provider), 5, 0.5, 0.7)
            .await
            .unwrap()
            .unwrap();
        // Keyword: only the first chunk matches exactly → 1/5.
        assert!((metrics.keyword_recall - 0.2).abs() < 1e-9);
        // Semantic: both chunks have cosine 1.0 → 2/5.
        assert_eq!(metrics.semantic_recall, Some(0.4));
        assert_eq!(metrics.semantic_miss, Some(0.6));
    }

    #[tokio::test]
    async fn test_semantic_absent_without_provider() {
        let metrics = evaluate_answer_entry(&log_entry(Some("a b c d")), None, 5, 0.5, 0.7)
            .await
            .unwrap()
            .unwrap();
        assert!(metrics.semantic_recall.is_none());
        assert!((metrics.keyword_miss - 0.8).abs() < 1e-9);
    }
}
