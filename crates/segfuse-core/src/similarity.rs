//! Similarity kernels used by the in-process store.
//!
//! Every function returns a score where higher means closer, so results for
//! all metrics sort the same way.

use crate::schema::Distance;

/// 8-lane unrolled dot product.
pub fn dot_product(a: &[f32], b: &[f32]) -> f32 {
    debug_assert_eq!(a.len(), b.len());
    let n = a.len().min(b.len());
    let chunks = n / 8;
    let mut sum0 = 0.0f32;
    let mut sum1 = 0.0f32;
    let mut sum2 = 0.0f32;
    let mut sum3 = 0.0f32;
    let mut sum4 = 0.0f32;
    let mut sum5 = 0.0f32;
    let mut sum6 = 0.0f32;
    let mut sum7 = 0.0f32;

    for i in 0..chunks {
        let base = i * 8;
        sum0 += a[base] * b[base];
        sum1 += a[base + 1] * b[base + 1];
        sum2 += a[base + 2] * b[base + 2];
        sum3 += a[base + 3] * b[base + 3];
        sum4 += a[base + 4] * b[base + 4];
        sum5 += a[base + 5] * b[base + 5];
        sum6 += a[base + 6] * b[base + 6];
        sum7 += a[base + 7] * b[base + 7];
    }

    let mut tail = 0.0f32;
    for i in (chunks * 8)..n {
        tail += a[i] * b[i];
    }
    (sum0 + sum1) + (sum2 + sum3) + (sum4 + sum5) + (sum6 + sum7) + tail
}

/// Cosine similarity. Zero vectors score 0.
pub fn cosine(a: &[f32], b: &[f32]) -> f32 {
    let norm_a = dot_product(a, a).sqrt();
    let norm_b = dot_product(b, b).sqrt();
    if norm_a <= f32::EPSILON || norm_b <= f32::EPSILON {
        return 0.0;
    }
    dot_product(a, b) / (norm_a * norm_b)
}

/// Negated Euclidean distance.
pub fn neg_euclidean(a: &[f32], b: &[f32]) -> f32 {
    -a.iter()
        .zip(b)
        .map(|(x, y)| (x - y) * (x - y))
        .sum::<f32>()
        .sqrt()
}

/// Score two dense vectors under `distance`.
pub fn score(distance: Distance, a: &[f32], b: &[f32]) -> f32 {
    match distance {
        Distance::Cosine => cosine(a, b),
        Distance::Dot => dot_product(a, b),
        Distance::Euclid => neg_euclidean(a, b),
    }
}

/// Late-interaction MaxSim: for each query token take the best-matching
/// document token, then sum over query tokens.
pub fn max_sim(distance: Distance, query: &[Vec<f32>], document: &[Vec<f32>]) -> f32 {
    query
        .iter()
        .map(|q| {
            document
                .iter()
                .map(|d| score(distance, q, d))
                .fold(f32::NEG_INFINITY, f32::max)
        })
        .filter(|best| best.is_finite())
        .sum()
}
