//! Feature-hashing embedder, used when no model download is wanted.
//!
//! Text is lowercased, whitespace-collapsed and padded with one space on
//! each side, then every character n-gram in the configured range is hashed
//! with FNV-1a into a signed bucket. Padding gives word boundaries their own
//! n-grams, so a single short word still produces a non-zero vector.

use super::embedder::{DenseEmbedder, EmbedError, EmbedderBackend, EmbedderInfo};

const FNV_OFFSET: u64 = 0xcbf2_9ce4_8422_2325;
const FNV_PRIME: u64 = 0x0000_0100_0000_01B3;

#[derive(Debug, Clone)]
pub struct HashEmbedder {
    dimension: usize,
    min_n: usize,
    max_n: usize,
}

impl HashEmbedder {
    /// Panics when `dimension` is zero; configuration validation rejects
    /// that before any embedder is built.
    pub fn new(dimension: usize) -> Self {
        assert!(dimension > 0, "hash embedder dimension must be > 0");
        Self {
            dimension,
            min_n: 3,
            max_n: 4,
        }
    }

    #[must_use]
    pub fn with_ngram_range(mut self, min_n: usize, max_n: usize) -> Self {
        assert!(min_n > 0 && min_n <= max_n, "invalid n-gram range");
        self.min_n = min_n;
        self.max_n = max_n;
        self
    }

    fn normalized_chars(text: &str) -> Vec<char> {
        let mut chars = vec![' '];
        for word in text.split_whitespace() {
            chars.extend(word.chars().flat_map(char::to_lowercase));
            chars.push(' ');
        }
        chars
    }
}

fn fnv1a(bytes: &[u8]) -> u64 {
    bytes.iter().fold(FNV_OFFSET, |hash, &b| {
        (hash ^ u64::from(b)).wrapping_mul(FNV_PRIME)
    })
}

/// Scale `v` to unit length in place. Near-zero vectors are left as is.
fn l2_normalize(v: &mut [f32]) {
    let norm = v.iter().map(|x| x * x).sum::<f32>().sqrt();
    if norm > f32::EPSILON {
        v.iter_mut().for_each(|x| *x /= norm);
    }
}

impl DenseEmbedder for HashEmbedder {
    fn info(&self) -> EmbedderInfo {
        EmbedderInfo {
            name: format!("hash-{}-{}gram-{}", self.min_n, self.max_n, self.dimension),
            dimension: self.dimension,
            backend: EmbedderBackend::Hash,
        }
    }

    fn embed(&self, text: &str) -> Result<Vec<f32>, EmbedError> {
        let mut vector = vec![0.0f32; self.dimension];
        let chars = Self::normalized_chars(text);
        // Only the padding: nothing to hash.
        if chars.len() < 2 {
            return Ok(vector);
        }
        let mut buf = String::new();
        for n in self.min_n..=self.max_n.min(chars.len()) {
            for window in chars.windows(n) {
                buf.clear();
                buf.extend(window);
                let h = fnv1a(buf.as_bytes());
                let bucket = (h % self.dimension as u64) as usize;
                vector[bucket] += if h >> 63 == 0 { 1.0 } else { -1.0 };
            }
        }
        l2_normalize(&mut vector);
        Ok(vector)
    }
}
