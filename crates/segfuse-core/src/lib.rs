//! segfuse-core: Core library for segfuse
//!
//! Indexes text segments into several complementary vector spaces and answers
//! queries by fusing the per-space rankings with Reciprocal Rank Fusion.
//!
//! # Architecture
//!
//! ```text
//! Corpus (records) → EmbeddingGenerator → Indexer → VectorStore (3 named spaces)
//!                          ↓                               ↑
//!   query text ─────→ QueryEngine ── prefetch × 2 ── RRF ──┘
//! ```
//!
//! # Modules
//!
//! - `record` / `corpus`: indexable records and corpus loading
//! - `embedding`: dense and late-interaction embedders plus the generator
//! - `schema`: vector spaces and collection schema
//! - `collection`: idempotent collection provisioning
//! - `store`: vector store contract, in-process store, Qdrant REST client
//! - `indexer`: batched point construction and upsert
//! - `query`: prefetch + fusion query engine
//! - `fusion`: Reciprocal Rank Fusion
//! - `notification`: storage notification routing
//! - `config`, `logging`, `retry`, `error`: ambient plumbing
//!
//! # Safety
//!
//! This crate forbids unsafe code.

#![forbid(unsafe_code)]

pub mod collection;
pub mod config;
pub mod corpus;
pub mod embedding;
pub mod error;
pub mod fusion;
pub mod indexer;
pub mod logging;
pub mod notification;
pub mod query;
pub mod record;
pub mod retry;
pub mod schema;
pub mod similarity;
pub mod store;

pub use collection::{CollectionManager, Provisioning};
pub use config::Config;
pub use corpus::{Corpus, RejectedRecord};
pub use embedding::EmbeddingGenerator;
pub use error::{Error, ErrorCategory, Result};
pub use indexer::{BatchFailurePolicy, IndexReport, Indexer};
pub use query::{FusedHit, FusedResult, QueryEngine};
pub use record::{Record, SpanMark};
pub use schema::{CollectionSchema, Distance, VectorSpace};
pub use store::{VectorStore, open_store};
