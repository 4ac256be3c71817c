//! # Page Index RAG
//!
//! A page-indexed retrieval-augmented-generation pipeline. Documents are
//! segmented into pages and token-windowed chunks, embedded with a
//! deterministic hashing embedding plus sparse term statistics, and
//! queried through hybrid Reciprocal-Rank-Fusion retrieval, page-level
//! aggregation with neighbor expansion, pluggable reranking, and answer
//! composition with per-page citations.
//!
//! ## Architecture
//!
//! ```text
//! ingest: content ─▶ normalize ─▶ segment ─▶ chunk ─▶ features ─▶ snapshot
//!                                                        │
//!                                                        ▼ (optional)
//!                                                  vector store
//!
//! query:  text ─▶ features ─▶ hybrid retrieval ─▶ page aggregation
//!                  ─▶ neighbor expansion ─▶ rerank ─▶ compose + cite
//! ```
//!
//! Every external collaborator (vector store, model reranker, generation
//! backend) has a documented local fallback; the pipeline itself is pure,
//! deterministic computation.
//!
//! ## Modules
//!
//! | Module | Purpose |
//! |--------|---------|
//! | [`config`] | TOML configuration parsing and validation |
//! | [`models`] | Persisted records and service request/response types |
//! | [`text`] | Normalization and tokenization |
//! | [`segment`] | Page segmentation |
//! | [`chunk`] | Token-window chunking |
//! | [`features`] | Hash embeddings, sparse terms, IDF |
//! | [`retrieval`] | Hybrid scoring and Reciprocal Rank Fusion |
//! | [`aggregate`] | Page aggregation and neighbor expansion |
//! | [`rerank`] | Lexical and model-backed reranking |
//! | [`generate`] | Extractive and LLM-backed answer generation |
//! | [`vector_store`] | Qdrant collaborator client |
//! | [`store`] | File-backed storage snapshot |
//! | [`service`] | Query/ingest orchestration |

pub mod aggregate;
pub mod chunk;
pub mod config;
pub mod error;
pub mod features;
pub mod generate;
pub mod models;
pub mod rerank;
pub mod retrieval;
pub mod segment;
pub mod service;
pub mod store;
pub mod text;
pub mod vector_store;

pub use config::Config;
pub use error::{RagError, Result};
pub use service::RagService;
