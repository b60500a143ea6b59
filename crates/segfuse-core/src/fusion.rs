//! Reciprocal Rank Fusion.
//!
//! RRF score = Σ 1 / (k + rank) over the lists where an id appears, with
//! rank 1-based. The output is sorted by descending score; equal scores keep
//! the order in which ids were first seen, scanning list 0 top to bottom
//! first, then list 1, and so on.

use std::collections::HashMap;

/// Default RRF smoothing constant.
pub const DEFAULT_RRF_K: u32 = 60;

/// A fused candidate and where it ranked in each input list.
#[derive(Debug, Clone, PartialEq)]
pub struct FusedCandidate {
    pub id: u64,
    pub score: f32,
    /// 1-based rank per input list, `None` where the id was absent.
    pub ranks: Vec<Option<usize>>,
}

impl FusedCandidate {
    /// Number of input lists that contained this id.
    pub fn support(&self) -> usize {
        self.ranks.iter().filter(|r| r.is_some()).count()
    }
}

/// Contribution of one list position.
#[inline]
pub fn rrf_contribution(rank: usize, k: u32) -> f32 {
    1.0 / (k as f32 + rank as f32)
}

/// Fuse ranked id lists with RRF.
///
/// An id repeated within one list counts only at its first (best) position.
pub fn rrf_fuse(lists: &[Vec<u64>], k: u32) -> Vec<FusedCandidate> {
    let mut index: HashMap<u64, usize> = HashMap::new();
    let mut fused: Vec<FusedCandidate> = Vec::new();

    for (list_idx, list) in lists.iter().enumerate() {
        for (pos, &id) in list.iter().enumerate() {
            let rank = pos + 1;
            let slot = *index.entry(id).or_insert_with(|| {
                fused.push(FusedCandidate {
                    id,
                    score: 0.0,
                    ranks: vec![None; lists.len()],
                });
                fused.len() - 1
            });
            let candidate = &mut fused[slot];
            if candidate.ranks[list_idx].is_some() {
                continue;
            }
            candidate.ranks[list_idx] = Some(rank);
            candidate.score += rrf_contribution(rank, k);
        }
    }

    // Stable sort keeps first-appearance order among equal scores.
    fused.sort_by(|a, b| b.score.total_cmp(&a.score));
    fused
}

/// Fuse and keep the top `limit` candidates.
pub fn rrf_fuse_top(lists: &[Vec<u64>], k: u32, limit: usize) -> Vec<FusedCandidate> {
    let mut fused = rrf_fuse(lists, k);
    fused.truncate(limit);
    fused
}
