//! Sentence embeddings via fastembed (ONNX Runtime).
//!
//! Requires the `fastembed` feature.

use fastembed::{InitOptions, TextEmbedding};
use tracing::info;

use super::embedder::{DenseEmbedder, EmbedError, EmbedderBackend, EmbedderInfo};
use super::model_registry::ModelRegistry;

/// FastEmbed-based dense embedder.
pub struct FastEmbedEmbedder {
    model_name: String,
    dimension: usize,
    model: TextEmbedding,
}

impl FastEmbedEmbedder {
    /// Load a model by name, downloading it into the registry's cache dir on first use.
    pub fn load(model_name: &str, registry: &ModelRegistry) -> Result<Self, EmbedError> {
        let entry = registry
            .get(model_name)
            .ok_or_else(|| EmbedError::ModelNotFound(model_name.to_string()))?;

        let mut options = InitOptions::new(entry.model.clone()).with_show_download_progress(false);
        if let Some(dir) = registry.cache_dir() {
            options = options.with_cache_dir(dir.clone());
        }
        let model = TextEmbedding::try_new(options)
            .map_err(|e| EmbedError::ModelNotFound(format!("{model_name}: {e}")))?;

        info!(model = %entry.name, dimension = entry.dimension, "Embedding model loaded");
        Ok(Self {
            model_name: entry.name.clone(),
            dimension: entry.dimension,
            model,
        })
    }

    pub fn model_name(&self) -> &str {
        &self.model_name
    }
}

impl DenseEmbedder for FastEmbedEmbedder {
    fn info(&self) -> EmbedderInfo {
        EmbedderInfo {
            name: format!("fastembed-{}", self.model_name),
            dimension: self.dimension,
            backend: EmbedderBackend::Fastembed,
        }
    }

    fn embed(&self, text: &str) -> Result<Vec<f32>, EmbedError> {
        self.embed_batch(&[text])?
            .pop()
            .ok_or(EmbedError::OutputCount {
                expected: 1,
                actual: 0,
            })
    }

    fn embed_batch(&self, texts: &[&str]) -> Result<Vec<Vec<f32>>, EmbedError> {
        self.model
            .embed(texts.to_vec(), None)
            .map_err(|e| EmbedError::InferenceFailed(e.to_string()))
    }
}
