//! Integration tests driving the `rag` binary.

use std::fs;
use std::path::{Path, PathBuf};
use std::process::Command;
use tempfile::TempDir;

fn rag_binary() -> PathBuf {
    let mut path = std::env::current_exe().unwrap();
    path.pop(); // remove test binary name
    path.pop(); // remove deps/
    path.push("rag");
    path
}

fn setup_test_env() -> (TempDir, PathBuf) {
    let tmp = TempDir::new().unwrap();
    let root = tmp.path().to_path_buf();

    let data_dir = root.join("data");
    fs::create_dir_all(&data_dir).unwrap();

    // A small documents file: 10 documents, ~40 words each.
    let mut lines = Vec::new();
    for d in 0..10 {
        let body: String = (0..40)
            .map(|w| format!("word{}d{}", w, d))
            .collect::<Vec<_>>()
            .join(" ");
        lines.push(format!(
            "{{\"id\":\"{}\",\"title\":\"Document {}\",\"body\":\"{}\",\"tags\":\"test\",\"source\":\"cli\"}}",
            d, d, body
        ));
    }
    fs::write(root.join("documents.jsonl"), lines.join("\n")).unwrap();

    let config_content = format!(
        r#"[storage]
data_dir = "{}/data"

[chunking]
mode = "word_count"
chunk_size = 20
overlap = 5
"#,
        root.display()
    );
    let config_path = root.join("rag.toml");
    fs::write(&config_path, config_content).unwrap();

    (tmp, config_path)
}

fn run_rag(config_path: &Path, args: &[&str]) -> (String, String, bool) {
    let binary = rag_binary();
    let output = Command::new(&binary)
        .arg("--config")
        .arg(config_path.to_str().unwrap())
        .args(args)
        .output()
        .unwrap_or_else(|e| panic!("Failed to run rag binary at {:?}: {}", binary, e));

    let stdout = String::from_utf8_lossy(&output.stdout).to_string();
    let stderr = String::from_utf8_lossy(&output.stderr).to_string();
    let success = output.status.success();
    (stdout, stderr, success)
}

#[test]
fn test_chunk_writes_corpus() {
    let (tmp, config_path) = setup_test_env();
    let input = tmp.path().join("documents.jsonl");

    let (stdout, stderr, success) = run_rag(&config_path, &["chunk", input.to_str().unwrap()]);
    assert!(success, "chunk failed: stdout={}, stderr={}", stdout, stderr);
    assert!(stdout.contains("documents: 10"));
    assert!(stdout.contains("ok"));

    let corpus = fs::read_to_string(tmp.path().join("data/chunked_documents.jsonl")).unwrap();
    // 42 words per document (title + body) at stride 15 → 3 chunks each.
    assert_eq!(corpus.lines().count(), 30);
    assert!(corpus.lines().next().unwrap().contains("\"chunk_id\":0"));
}

#[test]
fn test_chunk_is_deterministic() {
    let (tmp, config_path) = setup_test_env();
    let input = tmp.path().join("documents.jsonl");

    run_rag(&config_path, &["chunk", input.to_str().unwrap()]);
    let first = fs::read_to_string(tmp.path().join("data/chunked_documents.jsonl")).unwrap();

    run_rag(&config_path, &["chunk", input.to_str().unwrap()]);
    let second = fs::read_to_string(tmp.path().join("data/chunked_documents.jsonl")).unwrap();

    assert_eq!(first, second);
}

#[test]
fn test_split_holds_out_documents() {
    let (tmp, config_path) = setup_test_env();
    let input = tmp.path().join("documents.jsonl");

    run_rag(&config_path, &["chunk", input.to_str().unwrap()]);
    let (stdout, stderr, success) =
        run_rag(&config_path, &["split", "--ratio", "0.2", "--seed", "7"]);
    assert!(success, "split failed: stdout={}, stderr={}", stdout, stderr);
    assert!(stdout.contains("eval questions: 2"));

    let questions = fs::read_to_string(tmp.path().join("data/eval_questions.jsonl")).unwrap();
    assert_eq!(questions.lines().count(), 2);
    assert!(questions.contains("relevant_chunk_ids"));

    let train = fs::read_to_string(tmp.path().join("data/chunked_documents_train.jsonl")).unwrap();
    assert_eq!(train.lines().count(), 24);
}

#[test]
fn test_invalid_overlap_fails_fast() {
    let (tmp, _) = setup_test_env();
    let config_path = tmp.path().join("bad.toml");
    fs::write(
        &config_path,
        format!(
            "[storage]\ndata_dir = \"{}/data\"\n\n[chunking]\nchunk_size = 20\noverlap = 20\n",
            tmp.path().display()
        ),
    )
    .unwrap();

    let input = tmp.path().join("documents.jsonl");
    let (_, stderr, success) = run_rag(&config_path, &["chunk", input.to_str().unwrap()]);
    assert!(!success);
    assert!(stderr.contains("strictly less"));
}

#[test]
fn test_query_without_index_reports_unavailable() {
    let (_tmp, config_path) = setup_test_env();

    let (_, stderr, success) = run_rag(&config_path, &["query", "baseline", "anything"]);
    assert!(!success);
    assert!(
        stderr.contains("index unavailable"),
        "expected an index-unavailable error, got: {}",
        stderr
    );
}

#[test]
fn test_index_build_requires_embedding_provider() {
    let (tmp, config_path) = setup_test_env();
    let input = tmp.path().join("documents.jsonl");

    run_rag(&config_path, &["chunk", input.to_str().unwrap()]);
    let (_, stderr, success) = run_rag(&config_path, &["index", "build", "baseline"]);
    assert!(!success);
    assert!(stderr.contains("requires embeddings"));
}

#[test]
fn test_eval_answers_keyword_only() {
    let (tmp, config_path) = setup_test_env();

    // An evaluation log with one scored entry and one entry lacking gold.
    let log = concat!(
        "{\"query\":\"q1\",\"mode\":\"baseline\",\"chunks\":[\"alpha beta gamma\",\"unrelated text here\"],\"gold_answer\":\"alpha beta gamma\",\"logged_at\":\"2026-01-01T00:00:00Z\"}\n",
        "{\"query\":\"q2\",\"mode\":\"baseline\",\"chunks\":[\"whatever\"],\"logged_at\":\"2026-01-01T00:00:00Z\"}\n",
    );
    fs::write(tmp.path().join("data/evaluation_logs.jsonl"), log).unwrap();

    let (stdout, stderr, success) = run_rag(&config_path, &["eval", "answers"]);
    assert!(success, "eval failed: stdout={}, stderr={}", stdout, stderr);
    assert!(stdout.contains("query: q1"));
    // One keyword hit among top-5 → 1/5.
    assert!(stdout.contains("keyword  recall@5: 0.20"));
    assert!(stdout.contains("skipped (no gold answer): 1"));
    assert!(stdout.contains("embedding provider disabled"));
}

#[test]
fn test_eval_answers_counts_malformed_lines() {
    let (tmp, config_path) = setup_test_env();

    let log = concat!(
        "{\"query\":\"q1\",\"mode\":\"baseline\",\"chunks\":[\"a b\"],\"gold_answer\":\"a b\",\"logged_at\":\"2026-01-01T00:00:00Z\"}\n",
        "not valid json\n",
    );
    fs::write(tmp.path().join("data/evaluation_logs.jsonl"), log).unwrap();

    let (stdout, _, success) = run_rag(&config_path, &["eval", "answers"]);
    assert!(success);
    assert!(stdout.contains("skipped (malformed lines): 1"));
}
