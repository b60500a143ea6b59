//! Three-space embedding generator.
//!
//! Wraps the full-text dense model, the segment dense model, and the segment
//! late-interaction model. Batch output is positional: element `i` of every
//! returned sequence belongs to input `i`, and any failure fails the whole
//! batch so a point can never be built with a space missing.

use tracing::{debug, instrument};

use super::embedder::{DenseEmbedder, EmbedError, EmbedderBackend, MultiVectorEmbedder};
use super::hash_embedder::HashEmbedder;
use super::token_embedder::{HashTokenEmbedder, TokenwiseEmbedder};
use crate::config::{ModelSpec, ModelsConfig};
use crate::record::Record;

/// Vectors for one record across all three spaces.
#[derive(Debug, Clone, PartialEq)]
pub struct PointVectors {
    pub full_text: Vec<f32>,
    pub segment: Vec<f32>,
    pub late_interaction: Vec<Vec<f32>>,
}

/// Query-side vectors. The full-text space is never queried.
#[derive(Debug, Clone, PartialEq)]
pub struct QueryVectors {
    pub segment: Vec<f32>,
    pub late_interaction: Vec<Vec<f32>>,
}

/// Per-space dimensionality read from sampled model output.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SpaceDimensions {
    pub full_text: usize,
    pub segment: usize,
    pub late_interaction: usize,
}

pub struct EmbeddingGenerator {
    full_text: Box<dyn DenseEmbedder>,
    segment: Box<dyn DenseEmbedder>,
    late_interaction: Box<dyn MultiVectorEmbedder>,
}

impl EmbeddingGenerator {
    pub fn new(
        full_text: Box<dyn DenseEmbedder>,
        segment: Box<dyn DenseEmbedder>,
        late_interaction: Box<dyn MultiVectorEmbedder>,
    ) -> Self {
        Self {
            full_text,
            segment,
            late_interaction,
        }
    }

    /// Build every model named in the configuration.
    pub fn from_config(models: &ModelsConfig) -> Result<Self, EmbedError> {
        let generator = Self::new(
            build_dense(&models.full_text, models)?,
            build_dense(&models.segment, models)?,
            build_multivector(&models.late_interaction, models)?,
        );
        debug!(
            full_text = %generator.full_text.info().name,
            segment = %generator.segment.info().name,
            late_interaction = %generator.late_interaction.info().name,
            "Embedding generator ready"
        );
        Ok(generator)
    }

    /// Embed a batch of records into all three spaces.
    #[instrument(level = "debug", skip_all, fields(batch_len = records.len()))]
    pub fn embed_batch(&self, records: &[Record]) -> Result<Vec<PointVectors>, EmbedError> {
        if records.is_empty() {
            return Ok(Vec::new());
        }
        for (index, record) in records.iter().enumerate() {
            if record.text.trim().is_empty() || record.full_text.trim().is_empty() {
                return Err(EmbedError::EmptyInput { index });
            }
        }

        let full_texts: Vec<&str> = records.iter().map(|r| r.full_text.as_str()).collect();
        let segments: Vec<&str> = records.iter().map(|r| r.text.as_str()).collect();

        let full_text = self.full_text.embed_batch(&full_texts)?;
        check_dense(&full_text, records.len())?;
        let segment = self.segment.embed_batch(&segments)?;
        check_dense(&segment, records.len())?;
        let late_interaction = self.late_interaction.embed_tokens_batch(&segments)?;
        check_multivector(&late_interaction, records.len())?;

        Ok(full_text
            .into_iter()
            .zip(segment)
            .zip(late_interaction)
            .map(|((full_text, segment), late_interaction)| PointVectors {
                full_text,
                segment,
                late_interaction,
            })
            .collect())
    }

    /// Embed a query into the segment-dense and late-interaction spaces.
    pub fn embed_query(&self, text: &str) -> Result<QueryVectors, EmbedError> {
        if text.trim().is_empty() {
            return Err(EmbedError::EmptyInput { index: 0 });
        }
        let segment = self.segment.embed(text)?;
        check_dense(std::slice::from_ref(&segment), 1)?;
        let late_interaction = self.late_interaction.embed_tokens(text)?;
        check_multivector(std::slice::from_ref(&late_interaction), 1)?;
        Ok(QueryVectors {
            segment,
            late_interaction,
        })
    }

    /// Embed one record and read each space's dimension from the output.
    pub fn sample_dimensions(&self, sample: &Record) -> Result<SpaceDimensions, EmbedError> {
        let vectors = self
            .embed_batch(std::slice::from_ref(sample))?
            .pop()
            .ok_or(EmbedError::OutputCount {
                expected: 1,
                actual: 0,
            })?;
        let late_interaction = vectors.late_interaction.first().map_or(0, Vec::len);
        Ok(SpaceDimensions {
            full_text: vectors.full_text.len(),
            segment: vectors.segment.len(),
            late_interaction,
        })
    }
}

fn check_dense(vectors: &[Vec<f32>], expected: usize) -> Result<(), EmbedError> {
    if vectors.len() != expected {
        return Err(EmbedError::OutputCount {
            expected,
            actual: vectors.len(),
        });
    }
    let Some(first) = vectors.first() else {
        return Ok(());
    };
    if first.is_empty() {
        return Err(EmbedError::InferenceFailed(
            "model returned an empty vector".to_string(),
        ));
    }
    for v in vectors {
        if v.len() != first.len() {
            return Err(EmbedError::DimensionMismatch {
                expected: first.len(),
                actual: v.len(),
            });
        }
        if v.iter().any(|x| !x.is_finite()) {
            return Err(EmbedError::InferenceFailed(
                "model returned a non-finite value".to_string(),
            ));
        }
    }
    Ok(())
}

fn check_multivector(sequences: &[Vec<Vec<f32>>], expected: usize) -> Result<(), EmbedError> {
    if sequences.len() != expected {
        return Err(EmbedError::OutputCount {
            expected,
            actual: sequences.len(),
        });
    }
    for (index, tokens) in sequences.iter().enumerate() {
        if tokens.is_empty() {
            return Err(EmbedError::EmptyInput { index });
        }
        check_dense(tokens, tokens.len())?;
    }
    let dims: Vec<usize> = sequences.iter().filter_map(|t| t.first().map(Vec::len)).collect();
    if let Some(&first) = dims.first() {
        if let Some(&bad) = dims.iter().find(|&&d| d != first) {
            return Err(EmbedError::DimensionMismatch {
                expected: first,
                actual: bad,
            });
        }
    }
    Ok(())
}

fn build_dense(spec: &ModelSpec, models: &ModelsConfig) -> Result<Box<dyn DenseEmbedder>, EmbedError> {
    check_hash_dimension(spec)?;
    match spec.backend {
        EmbedderBackend::Hash => Ok(Box::new(HashEmbedder::new(spec.dimension))),
        EmbedderBackend::Fastembed => load_fastembed(spec, models),
    }
}

fn build_multivector(
    spec: &ModelSpec,
    models: &ModelsConfig,
) -> Result<Box<dyn MultiVectorEmbedder>, EmbedError> {
    check_hash_dimension(spec)?;
    match spec.backend {
        EmbedderBackend::Hash => Ok(Box::new(
            HashTokenEmbedder::new(spec.dimension).with_max_tokens(spec.max_tokens),
        )),
        EmbedderBackend::Fastembed => Ok(Box::new(
            TokenwiseEmbedder::new(load_fastembed(spec, models)?).with_max_tokens(spec.max_tokens),
        )),
    }
}

/// Hash models take their dimension from config, and zero is not one.
fn check_hash_dimension(spec: &ModelSpec) -> Result<(), EmbedError> {
    if spec.backend == EmbedderBackend::Hash && spec.dimension == 0 {
        return Err(EmbedError::ModelNotFound(
            "hash model with dimension 0".to_string(),
        ));
    }
    Ok(())
}

#[cfg(feature = "fastembed")]
fn load_fastembed(spec: &ModelSpec, models: &ModelsConfig) -> Result<Box<dyn DenseEmbedder>, EmbedError> {
    use super::fastembed_embedder::FastEmbedEmbedder;
    use super::model_registry::ModelRegistry;

    let name = spec
        .model
        .as_deref()
        .ok_or_else(|| EmbedError::ModelNotFound("no model name configured".to_string()))?;
    let registry = ModelRegistry::with_builtin_models(models.cache_dir.clone());
    Ok(Box::new(FastEmbedEmbedder::load(name, &registry)?))
}

#[cfg(not(feature = "fastembed"))]
fn load_fastembed(spec: &ModelSpec, _models: &ModelsConfig) -> Result<Box<dyn DenseEmbedder>, EmbedError> {
    Err(EmbedError::ModelNotFound(format!(
        "{} (built without the `fastembed` feature)",
        spec.model.as_deref().unwrap_or("<unnamed>")
    )))
}
