//! # rag-bench CLI (`rag`)
//!
//! The `rag` binary drives the full pipeline: chunking, contextual
//! augmentation, index building, interactive querying with answer
//! synthesis, and offline retrieval evaluation.
//!
//! ## Usage
//!
//! ```bash
//! rag --config ./config/rag.toml <command>
//! ```
//!
//! ## Commands
//!
//! | Command | Description |
//! |---------|-------------|
//! | `rag chunk <input>` | Split a documents JSONL file into the chunk corpus |
//! | `rag augment <input>` | Chunk and enrich documents with generated context |
//! | `rag split` | Hold out a fraction of documents as eval questions |
//! | `rag index build <variant>` | Embed a corpus and persist its index |
//! | `rag index status <variant>` | Show what a persisted index contains |
//! | `rag query <variant> "<text>"` | Print ranked chunks for one query |
//! | `rag ask <variant>` | Interactive query loop with answer synthesis |
//! | `rag eval answers` | Replay the evaluation log against gold answers |
//! | `rag eval questions <variant>` | Score a gold question set (recall/MRR) |

use clap::{Parser, Subcommand};
use std::path::PathBuf;

use rag_bench::{augment, chunker, config, eval, index_cmd, retriever, split};

/// rag-bench — a local-first retrieval-augmented QA workbench.
///
/// All commands accept a `--config` flag pointing to a TOML configuration
/// file. See `config/rag.example.toml` for a full example.
#[derive(Parser)]
#[command(
    name = "rag",
    about = "rag-bench — chunk, augment, index, retrieve, and evaluate a local RAG pipeline",
    version
)]
struct Cli {
    /// Path to configuration file (TOML).
    #[arg(long, global = true, default_value = "./config/rag.toml")]
    config: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

/// Top-level CLI commands.
#[derive(Subcommand)]
enum Commands {
    /// Split a documents JSONL file into the chunk corpus.
    ///
    /// Reads one document per line and writes one chunk record per line,
    /// deterministically, per the configured chunking mode.
    Chunk {
        /// Documents file (one JSON record per line).
        input: PathBuf,
    },

    /// Chunk documents and enrich each chunk with generated context.
    ///
    /// Calls the generation service once per chunk (except in
    /// title_prefix style) and appends enriched records to the contextual
    /// corpus. Resumable: chunks already present are skipped, so the
    /// command can be re-run after a partial failure.
    Augment {
        /// Documents file (one JSON record per line).
        input: PathBuf,
    },

    /// Hold out a fraction of documents as evaluation questions.
    ///
    /// Writes the train corpus and the eval questions file. Deterministic
    /// for a fixed seed.
    Split {
        /// Fraction of documents held out for evaluation.
        #[arg(long, default_value_t = 0.1)]
        ratio: f64,

        /// Shuffle seed.
        #[arg(long, default_value_t = 42)]
        seed: u64,
    },

    /// Build or inspect a persisted vector index.
    Index {
        #[command(subcommand)]
        action: IndexAction,
    },

    /// Print ranked chunks for a single query.
    Query {
        /// Pipeline variant: `baseline` or `contextual`.
        variant: String,

        /// The query text.
        query: String,

        /// Number of results (defaults to retrieval.top_k).
        #[arg(long)]
        k: Option<usize>,
    },

    /// Interactive query loop with answer synthesis.
    ///
    /// Retrieves against the chosen variant, prints ranked chunks,
    /// synthesizes an answer with the generation service, and appends each
    /// run to the evaluation log. Type `exit` to quit.
    Ask {
        /// Pipeline variant: `baseline` or `contextual`.
        variant: String,

        /// Number of results (defaults to retrieval.top_k).
        #[arg(long)]
        k: Option<usize>,
    },

    /// Evaluate retrieval quality.
    Eval {
        #[command(subcommand)]
        action: EvalAction,
    },
}

/// Index management subcommands.
#[derive(Subcommand)]
enum IndexAction {
    /// Embed a variant's corpus and persist its index.
    ///
    /// Rebuilds from scratch every time; rebuild after changing the
    /// embedding model or chunking parameters.
    Build {
        /// Pipeline variant: `baseline` or `contextual`.
        variant: String,
    },

    /// Show row count, model, and dims of a persisted index.
    Status {
        /// Pipeline variant: `baseline` or `contextual`.
        variant: String,
    },
}

/// Evaluation subcommands.
#[derive(Subcommand)]
enum EvalAction {
    /// Replay the evaluation log against recorded gold answers.
    ///
    /// Reports keyword and semantic Recall@K / Miss@K per query and mode.
    /// Entries without a gold answer are skipped.
    Answers,

    /// Score a gold question set against a variant's index.
    ///
    /// Reports aggregate Recall@1, Recall@K, and MRR@K over the labeled
    /// relevant chunk ids.
    Questions {
        /// Pipeline variant: `baseline` or `contextual`.
        variant: String,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("warn")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let cfg = config::load_config(&cli.config)?;

    match cli.command {
        Commands::Chunk { input } => {
            chunker::run_chunk(&cfg, &input)?;
        }
        Commands::Augment { input } => {
            augment::run_augment(&cfg, &input).await?;
        }
        Commands::Split { ratio, seed } => {
            split::run_split(&cfg, ratio, seed)?;
        }
        Commands::Index { action } => match action {
            IndexAction::Build { variant } => {
                index_cmd::run_build(&cfg, &variant).await?;
            }
            IndexAction::Status { variant } => {
                index_cmd::run_status(&cfg, &variant)?;
            }
        },
        Commands::Query { variant, query, k } => {
            retriever::run_query(&cfg, &variant, &query, k).await?;
        }
        Commands::Ask { variant, k } => {
            retriever::run_ask(&cfg, &variant, k).await?;
        }
        Commands::Eval { action } => match action {
            EvalAction::Answers => {
                eval::run_eval_answers(&cfg).await?;
            }
            EvalAction::Questions { variant } => {
                eval::run_eval_questions(&cfg, &variant).await?;
            }
        },
    }

    Ok(())
}
