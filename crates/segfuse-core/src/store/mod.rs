//! Vector store contract and implementations.
//!
//! [`VectorStore`] is the only surface the indexer, query engine and
//! collection manager see. Two implementations exist:
//!
//! - [`InMemoryStore`]: in-process, used by tests and the `memory` backend.
//! - [`QdrantStore`]: blocking client for the Qdrant REST API.

mod memory;
mod qdrant;

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::config::{StoreBackend, StoreConfig};
use crate::error::Remediation;
use crate::error::ErrorCategory;
use crate::record::Payload;
use crate::schema::CollectionSchema;

pub use memory::InMemoryStore;
pub use qdrant::QdrantStore;

/// A vector stored in one named space.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Vector {
    Dense(Vec<f32>),
    /// One vector per token for late-interaction spaces.
    Multi(Vec<Vec<f32>>),
}

impl Vector {
    /// Per-vector dimension; for multivectors, the dimension of the first
    /// token vector.
    pub fn dimension(&self) -> usize {
        match self {
            Self::Dense(v) => v.len(),
            Self::Multi(tokens) => tokens.first().map_or(0, Vec::len),
        }
    }

    pub fn is_multi(&self) -> bool {
        matches!(self, Self::Multi(_))
    }
}

/// One upsertable point: id, one vector per space, payload.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Point {
    pub id: u64,
    pub vector: BTreeMap<String, Vector>,
    pub payload: Payload,
}

/// Candidate retrieval against one space before fusion.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Prefetch {
    pub query: Vector,
    pub using: String,
    pub limit: usize,
}

/// How prefetch results are combined.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Fusion {
    /// Reciprocal Rank Fusion with smoothing constant `k`.
    Rrf { k: u32 },
}

/// A query hit.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScoredPoint {
    pub id: u64,
    pub score: f32,
    #[serde(default)]
    pub payload: Payload,
}

/// Vector store errors
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("store unavailable: {0}")]
    Unavailable(String),

    #[error("collection {0} already exists")]
    AlreadyExists(String),

    #[error("collection {0} not found")]
    CollectionNotFound(String),

    #[error("collection {collection} has no vector space named {space}")]
    UnknownSpace { collection: String, space: String },

    #[error("point {id} is missing a vector for space {space}")]
    MissingVector { id: u64, space: String },

    #[error("space {space}: expected dimension {expected}, got {actual}")]
    DimensionMismatch {
        space: String,
        expected: usize,
        actual: usize,
    },

    #[error("space {space}: {reason}")]
    ShapeMismatch { space: String, reason: String },

    #[error("store rejected request ({status}): {message}")]
    Rejected { status: u16, message: String },

    #[error("malformed store response: {0}")]
    MalformedResponse(String),
}

impl StoreError {
    #[must_use]
    pub fn category(&self) -> ErrorCategory {
        match self {
            Self::Unavailable(_) => ErrorCategory::StoreUnavailable,
            Self::AlreadyExists(_)
            | Self::UnknownSpace { .. }
            | Self::MissingVector { .. }
            | Self::DimensionMismatch { .. }
            | Self::ShapeMismatch { .. } => ErrorCategory::SchemaConflict,
            Self::CollectionNotFound(_) | Self::Rejected { .. } | Self::MalformedResponse(_) => {
                ErrorCategory::StoreRejected
            }
        }
    }

    /// Whether the failure is worth retrying.
    #[must_use]
    pub fn is_transient(&self) -> bool {
        matches!(self, Self::Unavailable(_))
    }

    #[must_use]
    pub fn remediation(&self) -> Remediation {
        match self {
            Self::Unavailable(_) => Remediation::new("The vector store could not be reached.")
                .command("Check Qdrant health", "curl http://localhost:6333/healthz")
                .alternative("Verify `store.url` and `store.api_key` in the config.")
                .alternative("Raise `store.timeout_secs` or `retry.max_attempts` for slow stores."),
            Self::AlreadyExists(_) => Remediation::new(
                "A collection with this name already exists; provisioning treats this as success.",
            ),
            Self::CollectionNotFound(_) => {
                Remediation::new("The collection does not exist yet.")
                    .command("Create the collection", "segfuse ensure")
            }
            Self::UnknownSpace { .. }
            | Self::MissingVector { .. }
            | Self::DimensionMismatch { .. }
            | Self::ShapeMismatch { .. } => Remediation::new(
                "Vectors do not match the collection's spaces. The collection was likely created with other models.",
            )
            .alternative("Use a new collection name or restore the original model configuration."),
            Self::Rejected { .. } => Remediation::new("The store rejected the request.")
                .alternative("Check the store logs; the request body may exceed its limits."),
            Self::MalformedResponse(_) => Remediation::new(
                "The store answered with an unexpected body. Check the store version.",
            ),
        }
    }
}

/// Operations the retrieval core needs from a vector store.
pub trait VectorStore: Send + Sync {
    fn collection_exists(&self, name: &str) -> Result<bool, StoreError>;

    /// Create a collection. Fails with [`StoreError::AlreadyExists`] when
    /// the name is taken.
    fn create_collection(&self, schema: &CollectionSchema) -> Result<(), StoreError>;

    /// Insert or replace points by id. The batch is applied as a unit.
    fn upsert(&self, collection: &str, points: &[Point]) -> Result<(), StoreError>;

    /// Run every prefetch, fuse the candidate lists, return the top `limit`.
    fn query(
        &self,
        collection: &str,
        prefetch: &[Prefetch],
        fusion: Fusion,
        limit: usize,
    ) -> Result<Vec<ScoredPoint>, StoreError>;

    /// Delete points by id. Unknown ids are ignored.
    fn delete(&self, collection: &str, ids: &[u64]) -> Result<(), StoreError>;
}

/// Open the store selected by configuration.
pub fn open_store(config: &StoreConfig) -> Result<Box<dyn VectorStore>, StoreError> {
    match config.backend {
        StoreBackend::Memory => Ok(Box::new(InMemoryStore::new())),
        StoreBackend::Qdrant => Ok(Box::new(QdrantStore::new(config)?)),
    }
}
