//! Embedding models for the three vector spaces.
//!
//! The hash backends need no downloads and are what tests run against.
//! The `fastembed` feature adds ONNX sentence models for the dense spaces
//! and, through [`TokenwiseEmbedder`], for the late-interaction space.

mod embedder;
mod generator;
mod hash_embedder;
mod token_embedder;

#[cfg(feature = "fastembed")]
mod fastembed_embedder;
#[cfg(feature = "fastembed")]
mod model_registry;

pub use embedder::{DenseEmbedder, EmbedError, EmbedderBackend, EmbedderInfo, MultiVectorEmbedder};
pub use generator::{EmbeddingGenerator, PointVectors, QueryVectors, SpaceDimensions};
pub use hash_embedder::HashEmbedder;
pub use token_embedder::{DEFAULT_MAX_TOKENS, HashTokenEmbedder, TokenwiseEmbedder, tokenize};

#[cfg(feature = "fastembed")]
pub use fastembed_embedder::FastEmbedEmbedder;
#[cfg(feature = "fastembed")]
pub use model_registry::{ModelInfo, ModelRegistry};
