//! Maps configured model names to fastembed models.
//!
//! Requires the `fastembed` feature.

use std::collections::HashMap;
use std::path::PathBuf;

use fastembed::EmbeddingModel;

/// Information about a registered model.
#[derive(Debug, Clone)]
pub struct ModelInfo {
    pub name: String,
    pub dimension: usize,
    pub model: EmbeddingModel,
}

/// Registry of embedding models that can back a dense space.
pub struct ModelRegistry {
    models: HashMap<String, ModelInfo>,
    cache_dir: Option<PathBuf>,
}

impl ModelRegistry {
    /// Create an empty registry.
    pub fn new(cache_dir: Option<PathBuf>) -> Self {
        Self {
            models: HashMap::new(),
            cache_dir,
        }
    }

    /// Registry pre-populated with the supported sentence-embedding models.
    pub fn with_builtin_models(cache_dir: Option<PathBuf>) -> Self {
        let mut registry = Self::new(cache_dir);
        for (name, dimension, model) in [
            ("all-MiniLM-L6-v2", 384, EmbeddingModel::AllMiniLML6V2),
            (
                "paraphrase-multilingual-MiniLM-L12-v2",
                384,
                EmbeddingModel::ParaphraseMLMiniLML12V2,
            ),
            ("bge-small-en-v1.5", 384, EmbeddingModel::BGESmallENV15),
            ("multilingual-e5-small", 384, EmbeddingModel::MultilingualE5Small),
            ("nomic-embed-text-v1.5", 768, EmbeddingModel::NomicEmbedTextV15),
        ] {
            registry.register(ModelInfo {
                name: name.to_string(),
                dimension,
                model,
            });
        }
        registry
    }

    /// Register a model in the registry.
    pub fn register(&mut self, info: ModelInfo) {
        self.models.insert(info.name.to_lowercase(), info);
    }

    /// Look up a model by name. Organisation prefixes such as
    /// `sentence-transformers/` or `BAAI/` are ignored.
    pub fn get(&self, name: &str) -> Option<&ModelInfo> {
        let short = name.rsplit('/').next().unwrap_or(name);
        self.models.get(&short.to_lowercase())
    }

    /// List all registered models.
    pub fn list(&self) -> Vec<&ModelInfo> {
        self.models.values().collect()
    }

    /// Get the cache directory.
    pub fn cache_dir(&self) -> Option<&PathBuf> {
        self.cache_dir.as_ref()
    }
}
