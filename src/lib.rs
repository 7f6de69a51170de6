//! # rag-bench
//!
//! A local-first retrieval-augmented QA workbench: chunk a document
//! corpus, optionally enrich chunks with generated context, embed and
//! index them for exact nearest-neighbor search, query interactively with
//! answer synthesis, and score retrieval quality offline.
//!
//! ## Architecture
//!
//! ```text
//! ┌───────────┐   ┌──────────────┐   ┌─────────────┐   ┌───────────┐
//! │ Documents │──▶│   Chunker    │──▶│  Augmenter   │──▶│  Embedder │
//! │  (JSONL)  │   │ word / char  │   │ (contextual) │   │  (HTTP)   │
//! └───────────┘   └──────────────┘   └─────────────┘   └────┬──────┘
//!                                                          │
//!                               ┌──────────────────────────┤
//!                               ▼                          ▼
//!                        ┌────────────┐            ┌──────────────┐
//!                        │  Retriever │            │ Flat L2 index │
//!                        │  + answers │◀───────────│  (persisted)  │
//!                        └─────┬──────┘            └──────────────┘
//!                              ▼
//!                        ┌────────────┐
//!                        │  Evaluator │
//!                        │ recall/MRR │
//!                        └────────────┘
//! ```
//!
//! ## Quick Start
//!
//! ```bash
//! rag chunk documents.jsonl        # split documents into the chunk corpus
//! rag split                        # hold out eval questions
//! rag index build baseline         # embed and index the train corpus
//! rag ask baseline                 # interactive retrieval + answers
//! rag eval questions baseline      # recall@1 / recall@K / MRR@K
//! ```
//!
//! ## Modules
//!
//! | Module | Purpose |
//! |--------|---------|
//! | [`config`] | TOML configuration parsing and validation |
//! | [`models`] | Core data types |
//! | [`chunker`] | Fixed-size text chunking |
//! | [`augment`] | Contextual chunk augmentation |
//! | [`embedding`] | Embedding provider abstraction |
//! | [`generation`] | Generation service client and answer synthesis |
//! | [`index`] | Flat L2 vector index with paired metadata |
//! | [`retriever`] | Query-time retrieval |
//! | [`eval`] | Recall / MRR evaluation |
//! | [`split`] | Train/eval corpus split |
//! | [`store`] | JSONL persistence helpers |

pub mod augment;
pub mod chunker;
pub mod config;
pub mod embedding;
pub mod eval;
pub mod generation;
pub mod index;
pub mod index_cmd;
pub mod models;
pub mod retriever;
pub mod split;
pub mod store;
