//! Late-interaction embedders producing one vector per token.
//!
//! [`HashTokenEmbedder`] hashes each token's character n-grams with short
//! n-gram lengths so one- and two-character tokens still land in a bucket.
//! [`TokenwiseEmbedder`] adapts any dense model into a multivector model by
//! embedding every token separately.

use super::embedder::{DenseEmbedder, EmbedError, EmbedderInfo, MultiVectorEmbedder};
use super::hash_embedder::HashEmbedder;

/// Default cap on token vectors per text.
pub const DEFAULT_MAX_TOKENS: usize = 256;

/// Split text into lowercase word tokens, keeping at most `max_tokens`.
pub fn tokenize(text: &str, max_tokens: usize) -> Vec<String> {
    text.split(|c: char| !c.is_alphanumeric())
        .filter(|t| !t.is_empty())
        .take(max_tokens)
        .map(str::to_lowercase)
        .collect()
}

#[derive(Debug, Clone)]
pub struct HashTokenEmbedder {
    inner: HashEmbedder,
    max_tokens: usize,
}

impl HashTokenEmbedder {
    pub fn new(dimension: usize) -> Self {
        Self {
            inner: HashEmbedder::new(dimension).with_ngram_range(2, 4),
            max_tokens: DEFAULT_MAX_TOKENS,
        }
    }

    #[must_use]
    pub fn with_max_tokens(mut self, max_tokens: usize) -> Self {
        self.max_tokens = max_tokens.max(1);
        self
    }
}

impl MultiVectorEmbedder for HashTokenEmbedder {
    fn info(&self) -> EmbedderInfo {
        let inner = self.inner.info();
        EmbedderInfo {
            name: format!("{}-tokens", inner.name),
            ..inner
        }
    }

    fn embed_tokens(&self, text: &str) -> Result<Vec<Vec<f32>>, EmbedError> {
        let tokens = tokenize(text, self.max_tokens);
        if tokens.is_empty() {
            return Err(EmbedError::EmptyInput { index: 0 });
        }
        tokens
            .iter()
            .map(|token| self.inner.embed(token))
            .collect()
    }
}

/// Multivector adapter over a dense model.
pub struct TokenwiseEmbedder<E> {
    inner: E,
    max_tokens: usize,
}

impl<E: DenseEmbedder> TokenwiseEmbedder<E> {
    pub fn new(inner: E) -> Self {
        Self {
            inner,
            max_tokens: DEFAULT_MAX_TOKENS,
        }
    }

    #[must_use]
    pub fn with_max_tokens(mut self, max_tokens: usize) -> Self {
        self.max_tokens = max_tokens.max(1);
        self
    }
}

impl<E: DenseEmbedder> MultiVectorEmbedder for TokenwiseEmbedder<E> {
    fn info(&self) -> EmbedderInfo {
        let inner = self.inner.info();
        EmbedderInfo {
            name: format!("{}-tokenwise", inner.name),
            ..inner
        }
    }

    fn embed_tokens(&self, text: &str) -> Result<Vec<Vec<f32>>, EmbedError> {
        let tokens = tokenize(text, self.max_tokens);
        if tokens.is_empty() {
            return Err(EmbedError::EmptyInput { index: 0 });
        }
        let refs: Vec<&str> = tokens.iter().map(String::as_str).collect();
        let vectors = self.inner.embed_batch(&refs)?;
        if vectors.len() != refs.len() {
            return Err(EmbedError::OutputCount {
                expected: refs.len(),
                actual: vectors.len(),
            });
        }
        Ok(vectors)
    }
}
