use anyhow::{Context, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};

#[derive(Debug, Deserialize, Clone)]
pub struct Config {
    pub storage: StorageConfig,
    pub chunking: ChunkingConfig,
    #[serde(default)]
    pub augment: AugmentConfig,
    #[serde(default)]
    pub embedding: EmbeddingConfig,
    #[serde(default)]
    pub generation: GenerationConfig,
    #[serde(default)]
    pub retrieval: RetrievalConfig,
    #[serde(default)]
    pub eval: EvalConfig,
}

#[derive(Debug, Deserialize, Clone)]
pub struct StorageConfig {
    /// Directory holding corpora, indexes, and the evaluation log.
    pub data_dir: PathBuf,
}

impl StorageConfig {
    pub fn corpus_path(&self) -> PathBuf {
        self.data_dir.join("chunked_documents.jsonl")
    }
    pub fn enriched_path(&self) -> PathBuf {
        self.data_dir.join("chunked_contextual.jsonl")
    }
    pub fn index_path(&self, variant: &str) -> PathBuf {
        self.data_dir.join(format!("{}.index.jsonl", variant))
    }
    pub fn eval_log_path(&self) -> PathBuf {
        self.data_dir.join("evaluation_logs.jsonl")
    }
    pub fn eval_questions_path(&self) -> PathBuf {
        self.data_dir.join("eval_questions.jsonl")
    }
    pub fn train_corpus_path(&self) -> PathBuf {
        self.data_dir.join("chunked_documents_train.jsonl")
    }
}

/// Splitting unit for the chunker.
#[derive(Debug, Deserialize, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum ChunkMode {
    WordCount,
    CharCount,
}

#[derive(Debug, Deserialize, Clone)]
pub struct ChunkingConfig {
    #[serde(default = "default_chunk_mode")]
    pub mode: ChunkMode,
    #[serde(default = "default_chunk_size")]
    pub chunk_size: usize,
    #[serde(default = "default_overlap")]
    pub overlap: usize,
    /// Chunk `title + "\n" + body` instead of the bare body.
    #[serde(default = "default_include_title")]
    pub include_title: bool,
}

impl Default for ChunkingConfig {
    fn default() -> Self {
        Self {
            mode: default_chunk_mode(),
            chunk_size: default_chunk_size(),
            overlap: default_overlap(),
            include_title: default_include_title(),
        }
    }
}

fn default_chunk_mode() -> ChunkMode {
    ChunkMode::WordCount
}
fn default_chunk_size() -> usize {
    150
}
fn default_overlap() -> usize {
    30
}
fn default_include_title() -> bool {
    true
}

/// How the generated context is merged with the original chunk. Fixed per
/// corpus: mixing styles inside one index makes results uninterpretable.
#[derive(Debug, Deserialize, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum AugmentStyle {
    PrependSummary,
    AppendSummary,
    TitlePrefix,
}

#[derive(Debug, Deserialize, Clone)]
pub struct AugmentConfig {
    #[serde(default = "default_augment_style")]
    pub style: AugmentStyle,
    #[serde(default = "default_workers")]
    pub workers: usize,
}

impl Default for AugmentConfig {
    fn default() -> Self {
        Self {
            style: default_augment_style(),
            workers: default_workers(),
        }
    }
}

fn default_augment_style() -> AugmentStyle {
    AugmentStyle::PrependSummary
}
fn default_workers() -> usize {
    4
}

#[derive(Debug, Deserialize, Clone)]
pub struct EmbeddingConfig {
    #[serde(default = "default_embed_provider")]
    pub provider: String,
    #[serde(default)]
    pub model: Option<String>,
    #[serde(default)]
    pub dims: Option<usize>,
    #[serde(default = "default_embed_base_url")]
    pub base_url: String,
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

impl Default for EmbeddingConfig {
    fn default() -> Self {
        Self {
            provider: default_embed_provider(),
            model: None,
            dims: None,
            base_url: default_embed_base_url(),
            batch_size: default_batch_size(),
            max_retries: default_max_retries(),
            timeout_secs: default_timeout_secs(),
        }
    }
}

impl EmbeddingConfig {
    pub fn is_enabled(&self) -> bool {
        self.provider != "disabled"
    }
}

fn default_embed_provider() -> String {
    "disabled".to_string()
}
fn default_embed_base_url() -> String {
    "http://127.0.0.1:11434".to_string()
}
fn default_batch_size() -> usize {
    64
}
fn default_max_retries() -> u32 {
    5
}
fn default_timeout_secs() -> u64 {
    30
}

#[derive(Debug, Deserialize, Clone)]
pub struct GenerationConfig {
    #[serde(default = "default_gen_model")]
    pub model: String,
    #[serde(default = "default_gen_base_url")]
    pub base_url: String,
    #[serde(default = "default_gen_timeout_secs")]
    pub timeout_secs: u64,
}

impl Default for GenerationConfig {
    fn default() -> Self {
        Self {
            model: default_gen_model(),
            base_url: default_gen_base_url(),
            timeout_secs: default_gen_timeout_secs(),
        }
    }
}

fn default_gen_model() -> String {
    "gemma3:latest".to_string()
}
fn default_gen_base_url() -> String {
    "http://127.0.0.1:11434".to_string()
}
fn default_gen_timeout_secs() -> u64 {
    120
}

#[derive(Debug, Deserialize, Clone)]
pub struct RetrievalConfig {
    #[serde(default = "default_top_k")]
    pub top_k: usize,
}

impl Default for RetrievalConfig {
    fn default() -> Self {
        Self {
            top_k: default_top_k(),
        }
    }
}

fn default_top_k() -> usize {
    5
}

#[derive(Debug, Deserialize, Clone)]
pub struct EvalConfig {
    #[serde(default = "default_eval_top_k")]
    pub top_k: usize,
    #[serde(default = "default_keyword_threshold")]
    pub keyword_threshold: f64,
    #[serde(default = "default_semantic_threshold")]
    pub semantic_threshold: f32,
}

impl Default for EvalConfig {
    fn default() -> Self {
        Self {
            top_k: default_eval_top_k(),
            keyword_threshold: default_keyword_threshold(),
            semantic_threshold: default_semantic_threshold(),
        }
    }
}

fn default_eval_top_k() -> usize {
    5
}
fn default_keyword_threshold() -> f64 {
    0.5
}
fn default_semantic_threshold() -> f32 {
    0.7
}

pub fn load_config(path: &Path) -> Result<Config> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file: {}", path.display()))?;

    let config: Config = toml::from_str(&content).with_context(|| "Failed to parse config file")?;

    validate(&config)?;

    Ok(config)
}

/// Configuration errors fail fast, before any pipeline work begins.
pub fn validate(config: &Config) -> Result<()> {
    if config.chunking.chunk_size == 0 {
        anyhow::bail!("chunking.chunk_size must be > 0");
    }

    // An overlap >= chunk_size makes the word-window stride non-positive
    // and the chunk loop would never advance.
    if config.chunking.overlap >= config.chunking.chunk_size {
        anyhow::bail!(
            "chunking.overlap ({}) must be strictly less than chunking.chunk_size ({})",
            config.chunking.overlap,
            config.chunking.chunk_size
        );
    }

    if config.chunking.mode == ChunkMode::CharCount && config.chunking.overlap != 0 {
        anyhow::bail!("chunking.overlap is not supported in char_count mode");
    }

    if config.augment.workers == 0 {
        anyhow::bail!("augment.workers must be >= 1");
    }

    if config.embedding.is_enabled() {
        if config.embedding.dims.is_none() || config.embedding.dims == Some(0) {
            anyhow::bail!(
                "embedding.dims must be > 0 when provider is '{}'",
                config.embedding.provider
            );
        }
        if config.embedding.model.is_none() {
            anyhow::bail!(
                "embedding.model must be specified when provider is '{}'",
                config.embedding.provider
            );
        }
    }

    match config.embedding.provider.as_str() {
        "disabled" | "ollama" | "openai" => {}
        other => anyhow::bail!(
            "Unknown embedding provider: '{}'. Must be disabled, ollama, or openai.",
            other
        ),
    }

    if config.retrieval.top_k == 0 || config.eval.top_k == 0 {
        anyhow::bail!("retrieval.top_k and eval.top_k must be >= 1");
    }

    if !(0.0..=1.0).contains(&config.eval.keyword_threshold) {
        anyhow::bail!("eval.keyword_threshold must be in [0.0, 1.0]");
    }

    if !(-1.0..=1.0).contains(&config.eval.semantic_threshold) {
        anyhow::bail!("eval.semantic_threshold must be in [-1.0, 1.0]");
    }

    Ok(())
}
