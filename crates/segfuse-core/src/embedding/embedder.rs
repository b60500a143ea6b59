//! Core embedding traits and types.
use std::fmt;

use serde::{Deserialize, Serialize};

#[derive(Debug)]
pub enum EmbedError {
    ModelNotFound(String),
    EmptyInput { index: usize },
    InferenceFailed(String),
    DimensionMismatch { expected: usize, actual: usize },
    OutputCount { expected: usize, actual: usize },
}

impl fmt::Display for EmbedError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::ModelNotFound(p) => write!(f, "model not found: {p}"),
            Self::EmptyInput { index } => write!(f, "empty text at batch position {index}"),
            Self::InferenceFailed(e) => write!(f, "inference failed: {e}"),
            Self::DimensionMismatch { expected, actual } => {
                write!(f, "dimension mismatch: expected {expected}, got {actual}")
            }
            Self::OutputCount { expected, actual } => {
                write!(f, "model returned {actual} embeddings for {expected} inputs")
            }
        }
    }
}

impl std::error::Error for EmbedError {}

/// Which implementation backs an embedding space.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EmbedderBackend {
    /// FNV-1a feature hashing, no model download.
    #[default]
    Hash,
    /// ONNX sentence embeddings via fastembed.
    Fastembed,
}

impl fmt::Display for EmbedderBackend {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Hash => write!(f, "hash"),
            Self::Fastembed => write!(f, "fastembed"),
        }
    }
}

#[derive(Debug, Clone)]
pub struct EmbedderInfo {
    pub name: String,
    pub dimension: usize,
    pub backend: EmbedderBackend,
}

/// One fixed-length vector per text.
pub trait DenseEmbedder: Send {
    fn info(&self) -> EmbedderInfo;
    fn embed(&self, text: &str) -> Result<Vec<f32>, EmbedError>;
    fn embed_batch(&self, texts: &[&str]) -> Result<Vec<Vec<f32>>, EmbedError> {
        texts.iter().map(|t| self.embed(t)).collect()
    }
    fn dimension(&self) -> usize {
        self.info().dimension
    }
}

/// One vector per token, compared with late interaction (MaxSim).
pub trait MultiVectorEmbedder: Send {
    fn info(&self) -> EmbedderInfo;
    fn embed_tokens(&self, text: &str) -> Result<Vec<Vec<f32>>, EmbedError>;
    /// `EmptyInput` errors carry the text's position in `texts`.
    fn embed_tokens_batch(&self, texts: &[&str]) -> Result<Vec<Vec<Vec<f32>>>, EmbedError> {
        texts
            .iter()
            .enumerate()
            .map(|(index, t)| {
                self.embed_tokens(t).map_err(|e| match e {
                    EmbedError::EmptyInput { .. } => EmbedError::EmptyInput { index },
                    other => other,
                })
            })
            .collect()
    }
    fn dimension(&self) -> usize {
        self.info().dimension
    }
}

impl<T: DenseEmbedder + ?Sized> DenseEmbedder for Box<T> {
    fn info(&self) -> EmbedderInfo {
        (**self).info()
    }
    fn embed(&self, text: &str) -> Result<Vec<f32>, EmbedError> {
        (**self).embed(text)
    }
    fn embed_batch(&self, texts: &[&str]) -> Result<Vec<Vec<f32>>, EmbedError> {
        (**self).embed_batch(texts)
    }
}
