//! Hybrid query: two prefetches fused with Reciprocal Rank Fusion.

use std::collections::HashSet;

use serde::Serialize;
use tracing::{debug, instrument, warn};

use crate::config::{Config, SpaceNames};
use crate::embedding::EmbeddingGenerator;
use crate::error::Result;
use crate::record::{Payload, Record};
use crate::retry::{RetryPolicy, with_retry};
use crate::store::{Fusion, Prefetch, Vector, VectorStore};

/// One fused hit.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FusedHit {
    pub id: u64,
    pub score: f32,
    /// The stored payload as returned by the store.
    pub payload: Payload,
}

impl FusedHit {
    /// Decode the payload back into a record.
    pub fn record(&self) -> Option<Record> {
        Record::from_payload(&self.payload).ok()
    }
}

/// Ranked hits, best first, no repeated ids.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct FusedResult {
    pub hits: Vec<FusedHit>,
}

impl FusedResult {
    pub fn len(&self) -> usize {
        self.hits.len()
    }

    pub fn is_empty(&self) -> bool {
        self.hits.is_empty()
    }

    pub fn ids(&self) -> Vec<u64> {
        self.hits.iter().map(|h| h.id).collect()
    }
}

pub struct QueryEngine<'a> {
    generator: &'a EmbeddingGenerator,
    store: &'a dyn VectorStore,
    collection: String,
    spaces: SpaceNames,
    prefetch_limit: usize,
    rrf_k: u32,
    default_limit: usize,
    retry: RetryPolicy,
}

impl<'a> QueryEngine<'a> {
    pub fn new(generator: &'a EmbeddingGenerator, store: &'a dyn VectorStore, config: &Config) -> Self {
        Self {
            generator,
            store,
            collection: config.collection.name.clone(),
            spaces: config.collection.spaces.clone(),
            prefetch_limit: config.query.prefetch_limit,
            rrf_k: config.query.rrf_k,
            default_limit: config.query.default_limit,
            retry: config.retry.to_policy(),
        }
    }

    #[must_use]
    pub fn with_prefetch_limit(mut self, prefetch_limit: usize) -> Self {
        self.prefetch_limit = prefetch_limit;
        self
    }

    #[must_use]
    pub fn with_rrf_k(mut self, k: u32) -> Self {
        self.rrf_k = k;
        self
    }

    #[must_use]
    pub fn with_retry_policy(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    pub fn default_limit(&self) -> usize {
        self.default_limit
    }

    /// Query with the configured default limit.
    pub fn search(&self, text: &str) -> Result<FusedResult> {
        self.query(text, self.default_limit)
    }

    /// Rank stored segments against `text`.
    ///
    /// The segment-dense and late-interaction spaces each contribute up to
    /// `prefetch_limit` candidates; the full-text space is not consulted.
    #[instrument(level = "debug", skip(self, text), fields(collection = %self.collection))]
    pub fn query(&self, text: &str, limit: usize) -> Result<FusedResult> {
        if limit == 0 {
            return Ok(FusedResult::default());
        }
        let vectors = self.generator.embed_query(text)?;
        let prefetch = [
            Prefetch {
                query: Vector::Dense(vectors.segment),
                using: self.spaces.segment.clone(),
                limit: self.prefetch_limit,
            },
            Prefetch {
                query: Vector::Multi(vectors.late_interaction),
                using: self.spaces.late_interaction.clone(),
                limit: self.prefetch_limit,
            },
        ];
        let fusion = Fusion::Rrf { k: self.rrf_k };

        let points = with_retry(&self.retry, || {
            Ok(self.store.query(&self.collection, &prefetch, fusion, limit)?)
        })?;

        let mut seen = HashSet::new();
        let mut hits: Vec<FusedHit> = points
            .into_iter()
            .filter(|p| seen.insert(p.id))
            .map(|p| FusedHit {
                id: p.id,
                score: p.score,
                payload: p.payload,
            })
            .collect();
        if hits.len() > limit {
            warn!(returned = hits.len(), limit, "Store returned more hits than requested");
        }
        hits.sort_by(|a, b| b.score.total_cmp(&a.score));
        hits.truncate(limit);

        debug!(hits = hits.len(), "Query answered");
        Ok(FusedResult { hits })
    }
}
