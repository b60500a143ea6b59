//! Batched indexing of records into every vector space.
//!
//! Each batch is embedded into all three spaces, paired with its records by
//! position, and written with one upsert. Batches run one after another.

use std::collections::{BTreeMap, HashSet};

use serde::Serialize;
use tracing::{debug, info, instrument, warn};

use crate::config::{Config, SpaceNames};
use crate::corpus::RejectedRecord;
use crate::embedding::{EmbedError, EmbeddingGenerator, PointVectors};
use crate::error::{Error, ErrorCategory, Result};
use crate::record::Record;
use crate::retry::{RetryPolicy, with_retry};
use crate::store::{Point, Vector, VectorStore};

pub use crate::config::BatchFailurePolicy;

/// Result of one batch.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct BatchOutcome {
    pub batch: usize,
    pub ids: Vec<u64>,
    /// `None` when the batch was written.
    pub error: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub category: Option<ErrorCategory>,
}

impl BatchOutcome {
    pub fn succeeded(&self) -> bool {
        self.error.is_none()
    }
}

/// Summary of an index run.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct IndexReport {
    pub batches: Vec<BatchOutcome>,
    pub rejected: Vec<RejectedRecord>,
    /// Points written.
    pub indexed: usize,
}

impl IndexReport {
    pub fn failed_batches(&self) -> impl Iterator<Item = &BatchOutcome> {
        self.batches.iter().filter(|b| !b.succeeded())
    }

    /// Ids of every point from a written batch.
    pub fn written_ids(&self) -> impl Iterator<Item = u64> + '_ {
        self.batches
            .iter()
            .filter(|b| b.succeeded())
            .flat_map(|b| b.ids.iter().copied())
    }

    pub fn is_complete(&self) -> bool {
        self.rejected.is_empty() && self.batches.iter().all(BatchOutcome::succeeded)
    }
}

pub struct Indexer<'a> {
    generator: &'a EmbeddingGenerator,
    store: &'a dyn VectorStore,
    collection: String,
    spaces: SpaceNames,
    batch_size: usize,
    policy: BatchFailurePolicy,
    retry: RetryPolicy,
}

impl<'a> Indexer<'a> {
    pub fn new(generator: &'a EmbeddingGenerator, store: &'a dyn VectorStore, config: &Config) -> Self {
        Self {
            generator,
            store,
            collection: config.collection.name.clone(),
            spaces: config.collection.spaces.clone(),
            batch_size: config.indexing.batch_size.max(1),
            policy: config.indexing.failure_policy,
            retry: config.retry.to_policy(),
        }
    }

    #[must_use]
    pub fn with_batch_size(mut self, batch_size: usize) -> Self {
        self.batch_size = batch_size.max(1);
        self
    }

    #[must_use]
    pub fn with_failure_policy(mut self, policy: BatchFailurePolicy) -> Self {
        self.policy = policy;
        self
    }

    #[must_use]
    pub fn with_retry_policy(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    pub fn collection(&self) -> &str {
        &self.collection
    }

    /// Index `records` in batches of `batch_size`.
    ///
    /// Malformed records and repeated ids are rejected up front and listed
    /// in the report. With [`BatchFailurePolicy::Abort`] the first failed
    /// batch ends the run with [`Error::BatchAborted`]; with
    /// [`BatchFailurePolicy::Skip`] it is recorded and the run continues.
    #[instrument(level = "info", skip_all, fields(collection = %self.collection, records = records.len()))]
    pub fn index(&self, records: &[Record]) -> Result<IndexReport> {
        let mut report = IndexReport::default();
        let mut seen = HashSet::new();
        let mut accepted: Vec<&Record> = Vec::with_capacity(records.len());
        for (position, record) in records.iter().enumerate() {
            if let Err(e) = record.validate() {
                warn!(position, id = record.id, error = %e, "Rejecting record");
                report
                    .rejected
                    .push(RejectedRecord::from_error(position, Some(record.id), &e));
                continue;
            }
            if !seen.insert(record.id) {
                let e = crate::record::RecordError::DuplicateId {
                    id: record.id,
                    position,
                };
                warn!(position, id = record.id, "Rejecting duplicate id");
                report
                    .rejected
                    .push(RejectedRecord::from_error(position, Some(record.id), &e));
                continue;
            }
            accepted.push(record);
        }

        if accepted.is_empty() {
            debug!("Nothing to index");
            return Ok(report);
        }

        for (batch, chunk) in accepted.chunks(self.batch_size).enumerate() {
            let owned: Vec<Record> = chunk.iter().map(|r| (*r).clone()).collect();
            let ids: Vec<u64> = owned.iter().map(|r| r.id).collect();
            match self.index_batch(&owned) {
                Ok(written) => {
                    report.indexed += written;
                    debug!(batch, points = written, "Batch indexed");
                    report.batches.push(BatchOutcome {
                        batch,
                        ids,
                        error: None,
                        category: None,
                    });
                }
                Err(e) => {
                    warn!(batch, points = ids.len(), error = %e, category = %e.category(), "Batch failed");
                    if self.policy == BatchFailurePolicy::Abort {
                        return Err(Error::BatchAborted {
                            batch,
                            indexed: report.indexed,
                            written: report.written_ids().collect(),
                            source: Box::new(e),
                        });
                    }
                    report.batches.push(BatchOutcome {
                        batch,
                        ids,
                        error: Some(e.to_string()),
                        category: Some(e.category()),
                    });
                }
            }
        }

        info!(
            indexed = report.indexed,
            batches = report.batches.len(),
            failed = report.failed_batches().count(),
            rejected = report.rejected.len(),
            "Index run finished"
        );
        Ok(report)
    }

    /// Embed and upsert one batch. Returns the number of points written.
    pub fn index_batch(&self, records: &[Record]) -> Result<usize> {
        if records.is_empty() {
            return Ok(0);
        }
        let vectors = self.generator.embed_batch(records)?;
        let points = build_points(&self.spaces, records, vectors)?;
        with_retry(&self.retry, || Ok(self.store.upsert(&self.collection, &points)?))?;
        Ok(points.len())
    }

    /// Delete points by id.
    pub fn remove(&self, ids: &[u64]) -> Result<()> {
        if ids.is_empty() {
            return Ok(());
        }
        with_retry(&self.retry, || Ok(self.store.delete(&self.collection, ids)?))?;
        info!(collection = %self.collection, points = ids.len(), "Points removed");
        Ok(())
    }
}

/// Pair records with their vectors by position.
pub fn build_points(
    spaces: &SpaceNames,
    records: &[Record],
    vectors: Vec<PointVectors>,
) -> Result<Vec<Point>> {
    if records.len() != vectors.len() {
        return Err(EmbedError::OutputCount {
            expected: records.len(),
            actual: vectors.len(),
        }
        .into());
    }
    Ok(records
        .iter()
        .zip(vectors)
        .map(|(record, v)| {
            let mut vector = BTreeMap::new();
            vector.insert(spaces.full_text.clone(), Vector::Dense(v.full_text));
            vector.insert(spaces.segment.clone(), Vector::Dense(v.segment));
            vector.insert(
                spaces.late_interaction.clone(),
                Vector::Multi(v.late_interaction),
            );
            Point {
                id: record.id,
                vector,
                payload: record.to_payload(),
            }
        })
        .collect())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::collection::CollectionManager;
    use crate::store::InMemoryStore;

    fn generator() -> EmbeddingGenerator {
        EmbeddingGenerator::from_config(&Config::default().models).unwrap()
    }

    fn record(id: u64, text: &str) -> Record {
        Record::new(id, text, format!("full text around {text}"), 0u64, 5u64)
    }

    fn provisioned(store: &InMemoryStore, generator: &EmbeddingGenerator, config: &Config) {
        CollectionManager::new(store)
            .provision(generator, &config.collection, &record(0, "sample"))
            .unwrap();
    }

    #[test]
    fn batches_cover_every_record() {
        let config = Config::default();
        let store = InMemoryStore::new();
        let generator = generator();
        provisioned(&store, &generator, &config);

        let records: Vec<Record> = (1..=10).map(|i| record(i, &format!("segment {i}"))).collect();
        let report = Indexer::new(&generator, &store, &config).index(&records).unwrap();
        assert_eq!(report.indexed, 10);
        let sizes: Vec<usize> = report.batches.iter().map(|b| b.ids.len()).collect();
        assert_eq!(sizes, vec![4, 4, 2]);
        assert_eq!(store.point_count("segments"), Some(10));
        assert!(report.is_complete());
    }

    #[test]
    fn points_pair_records_with_their_vectors() {
        let config = Config::default();
        let generator = generator();
        let records = vec![record(1, "alpha"), record(2, "beta gamma")];
        let vectors = generator.embed_batch(&records).unwrap();
        let expected = vectors[1].segment.clone();
        let points = build_points(&config.collection.spaces, &records, vectors).unwrap();
        assert_eq!(points[1].id, 2);
        assert_eq!(points[1].payload["text"], "beta gamma");
        assert_eq!(points[1].vector["segment"], Vector::Dense(expected));
        assert_eq!(points[1].vector.len(), 3);
    }

    #[test]
    fn vector_count_mismatch_is_model_failure() {
        let config = Config::default();
        let err = build_points(&config.collection.spaces, &[record(1, "a")], Vec::new()).unwrap_err();
        assert_eq!(err.category(), ErrorCategory::ModelFailure);
    }

    #[test]
    fn malformed_and_duplicate_records_are_rejected_individually() {
        let config = Config::default();
        let store = InMemoryStore::new();
        let generator = generator();
        provisioned(&store, &generator, &config);

        let records = vec![record(1, "ok"), record(2, "  "), record(1, "again"), record(3, "fine")];
        let report = Indexer::new(&generator, &store, &config).index(&records).unwrap();
        assert_eq!(report.indexed, 2);
        let positions: Vec<usize> = report.rejected.iter().map(|r| r.position).collect();
        assert_eq!(positions, vec![1, 2]);
        assert!(!report.is_complete());
    }

    #[test]
    fn abort_policy_stops_at_first_failed_batch() {
        let config = Config::default();
        let store = InMemoryStore::new();
        let generator = generator();
        // Collection never created: every upsert fails.
        let err = Indexer::new(&generator, &store, &config)
            .with_batch_size(1)
            .index(&[record(1, "a"), record(2, "b")])
            .unwrap_err();
        match err {
            Error::BatchAborted {
                batch,
                indexed,
                written,
                ..
            } => {
                assert_eq!(batch, 0);
                assert_eq!(indexed, 0);
                assert!(written.is_empty());
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn skip_policy_records_failures_and_continues() {
        let config = Config::default();
        let store = InMemoryStore::new();
        let generator = generator();
        let report = Indexer::new(&generator, &store, &config)
            .with_batch_size(1)
            .with_failure_policy(BatchFailurePolicy::Skip)
            .index(&[record(1, "a"), record(2, "b")])
            .unwrap();
        assert_eq!(report.batches.len(), 2);
        assert_eq!(report.failed_batches().count(), 2);
        assert_eq!(report.batches[0].category, Some(ErrorCategory::StoreRejected));
    }

    #[test]
    fn remove_deletes_points() {
        let config = Config::default();
        let store = InMemoryStore::new();
        let generator = generator();
        provisioned(&store, &generator, &config);
        let indexer = Indexer::new(&generator, &store, &config);
        indexer.index(&[record(1, "a"), record(2, "b")]).unwrap();
        indexer.remove(&[1]).unwrap();
        assert_eq!(store.point_count("segments"), Some(1));
        indexer.remove(&[]).unwrap();
    }
}
