//! End-to-end tests for provisioning and indexing against the in-process
//! store: corpus file → provision → batched upsert → stored points.

mod common;

use std::io::Write;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

use segfuse_core::corpus::load_corpus;
use segfuse_core::schema::CollectionSchema;
use segfuse_core::store::{
    Fusion, InMemoryStore, Point, Prefetch, ScoredPoint, StoreError, Vector, VectorStore,
};
use segfuse_core::{
    BatchFailurePolicy, CollectionManager, Error, ErrorCategory, Indexer, Provisioning, Record,
};

/// Counts every call that reaches the wrapped store. Upserts can be made to
/// fail: the next `unavailable_upserts` with `Unavailable`, or every one
/// with `Rejected` while `reject_upserts` is set.
#[derive(Default)]
struct CountingStore {
    inner: InMemoryStore,
    calls: AtomicUsize,
    creates: AtomicUsize,
    upserts: AtomicUsize,
    unavailable_upserts: AtomicUsize,
    reject_upserts: AtomicBool,
}

impl CountingStore {
    fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    fn tick(&self) {
        self.calls.fetch_add(1, Ordering::SeqCst);
    }
}

impl VectorStore for CountingStore {
    fn collection_exists(&self, name: &str) -> Result<bool, StoreError> {
        self.tick();
        self.inner.collection_exists(name)
    }

    fn create_collection(&self, schema: &CollectionSchema) -> Result<(), StoreError> {
        self.tick();
        self.creates.fetch_add(1, Ordering::SeqCst);
        self.inner.create_collection(schema)
    }

    fn upsert(&self, collection: &str, points: &[Point]) -> Result<(), StoreError> {
        self.tick();
        self.upserts.fetch_add(1, Ordering::SeqCst);
        if self.reject_upserts.load(Ordering::SeqCst) {
            return Err(StoreError::Rejected {
                status: 400,
                message: "wrong vector name".into(),
            });
        }
        let pending = self.unavailable_upserts.load(Ordering::SeqCst);
        if pending > 0 {
            self.unavailable_upserts.store(pending - 1, Ordering::SeqCst);
            return Err(StoreError::Unavailable("connection reset".into()));
        }
        self.inner.upsert(collection, points)
    }

    fn query(
        &self,
        collection: &str,
        prefetch: &[Prefetch],
        fusion: Fusion,
        limit: usize,
    ) -> Result<Vec<ScoredPoint>, StoreError> {
        self.tick();
        self.inner.query(collection, prefetch, fusion, limit)
    }

    fn delete(&self, collection: &str, ids: &[u64]) -> Result<(), StoreError> {
        self.tick();
        self.inner.delete(collection, ids)
    }
}

// =============================================================================
// Provisioning
// =============================================================================

#[test]
fn ensure_twice_creates_once() {
    let config = common::test_config();
    let store = CountingStore::default();
    let generator = common::generator(&config);
    let records = common::lecture_records();

    let mut manager = CollectionManager::new(&store);
    let first = manager
        .provision(&generator, &config.collection, &records[0])
        .unwrap();
    let second = manager
        .provision(&generator, &config.collection, &records[1])
        .unwrap();
    assert_eq!(first, Provisioning::Created);
    assert_eq!(second, Provisioning::AlreadyProvisioned);

    // A fresh manager sees the existing collection and leaves it alone.
    let third = CollectionManager::new(&store)
        .provision(&generator, &config.collection, &records[0])
        .unwrap();
    assert_eq!(third, Provisioning::AlreadyExists);
    assert_eq!(store.creates.load(Ordering::SeqCst), 1);
}

#[test]
fn provisioned_spaces_match_model_dimensions() {
    let config = common::test_config();
    let store = InMemoryStore::new();
    let generator = common::generator(&config);
    let records = common::lecture_records();
    common::provision(&store, &generator, &config, &records);

    let schema = store.schema(&config.collection.name).unwrap();
    let spaces = &config.collection.spaces;
    assert_eq!(schema.spaces.len(), 3);
    assert_eq!(schema.space_named(&spaces.full_text).unwrap().dimension, 64);
    assert_eq!(schema.space_named(&spaces.segment).unwrap().dimension, 64);
    let late = schema.space_named(&spaces.late_interaction).unwrap();
    assert_eq!(late.dimension, 32);
    assert!(late.is_multivector());
}

// =============================================================================
// Indexing
// =============================================================================

#[test]
fn every_point_carries_all_spaces_at_schema_dimension() {
    let config = common::test_config();
    let store = InMemoryStore::new();
    let generator = common::generator(&config);
    let records = common::lecture_records();
    common::provision(&store, &generator, &config, &records);
    Indexer::new(&generator, &store, &config).index(&records).unwrap();

    let schema = store.schema(&config.collection.name).unwrap();
    for record in &records {
        let point = store.get_point(&config.collection.name, record.id).unwrap();
        assert_eq!(point.vector.len(), schema.spaces.len());
        for space in &schema.spaces {
            let vector = &point.vector[&space.name];
            assert_eq!(vector.dimension(), space.dimension, "space {}", space.name);
            assert_eq!(vector.is_multi(), space.is_multivector());
        }
        if let Vector::Multi(tokens) = &point.vector[&config.collection.spaces.late_interaction] {
            assert!(!tokens.is_empty());
        }
    }
}

#[test]
fn reindexing_an_id_replaces_its_payload() {
    let config = common::test_config();
    let store = InMemoryStore::new();
    let generator = common::generator(&config);
    let records = common::lecture_records();
    common::provision(&store, &generator, &config, &records);
    let indexer = Indexer::new(&generator, &store, &config);
    indexer.index(&records).unwrap();

    let revised = Record::new(2, "revised segment text", "revised full text", 12u64, 25u64);
    indexer.index(std::slice::from_ref(&revised)).unwrap();

    assert_eq!(store.point_count(&config.collection.name), Some(records.len()));
    let point = store.get_point(&config.collection.name, 2).unwrap();
    assert_eq!(Record::from_payload(&point.payload).unwrap(), revised);
}

#[test]
fn empty_corpus_makes_no_store_calls() {
    let config = common::test_config();
    let store = CountingStore::default();
    let generator = common::generator(&config);

    let report = Indexer::new(&generator, &store, &config).index(&[]).unwrap();
    assert_eq!(report.indexed, 0);
    assert!(report.batches.is_empty());
    assert_eq!(store.calls(), 0);
}

#[test]
fn batch_count_follows_batch_size() {
    let config = common::test_config();
    let store = CountingStore::default();
    let generator = common::generator(&config);
    let records = common::lecture_records();
    common::provision(&store.inner, &generator, &config, &records);

    let report = Indexer::new(&generator, &store, &config)
        .with_batch_size(4)
        .index(&records)
        .unwrap();
    assert_eq!(report.batches.len(), 2);
    assert_eq!(store.upserts.load(Ordering::SeqCst), 2);
    assert_eq!(report.indexed, records.len());
}

#[test]
fn skip_policy_indexes_valid_batches_around_rejected_records() {
    let config = common::test_config();
    let store = InMemoryStore::new();
    let generator = common::generator(&config);
    let mut records = common::lecture_records();
    records.push(Record::new(99, "   ", "full", 0u64, 1u64));
    common::provision(&store, &generator, &config, &records);

    let report = Indexer::new(&generator, &store, &config)
        .with_failure_policy(BatchFailurePolicy::Skip)
        .index(&records)
        .unwrap();
    assert_eq!(report.indexed, 6);
    assert_eq!(report.rejected.len(), 1);
    assert_eq!(report.rejected[0].id, Some(99));
    assert_eq!(report.failed_batches().count(), 0);
}

// =============================================================================
// Store retries
// =============================================================================

#[test]
fn transient_upsert_failure_is_retried() {
    let config = common::test_config();
    let store = CountingStore::default();
    let generator = common::generator(&config);
    let records = common::lecture_records();
    common::provision(&store.inner, &generator, &config, &records);
    store.unavailable_upserts.store(1, Ordering::SeqCst);

    let report = Indexer::new(&generator, &store, &config)
        .with_batch_size(records.len())
        .index(&records)
        .unwrap();
    assert_eq!(report.indexed, records.len());
    assert!(report.is_complete());
    assert_eq!(store.upserts.load(Ordering::SeqCst), 2);
    assert_eq!(store.inner.point_count(&config.collection.name), Some(records.len()));
}

#[test]
fn rejected_upsert_is_not_retried() {
    let config = common::test_config();
    let store = CountingStore::default();
    let generator = common::generator(&config);
    let records = common::lecture_records();
    common::provision(&store.inner, &generator, &config, &records);
    store.reject_upserts.store(true, Ordering::SeqCst);

    let err = Indexer::new(&generator, &store, &config)
        .with_batch_size(records.len())
        .index(&records)
        .unwrap_err();
    assert!(matches!(err, Error::BatchAborted { batch: 0, .. }));
    assert_eq!(err.category(), ErrorCategory::StoreRejected);
    assert_eq!(store.upserts.load(Ordering::SeqCst), 1);
}

#[test]
fn unavailable_store_gives_up_after_max_attempts() {
    let config = common::test_config();
    let store = CountingStore::default();
    let generator = common::generator(&config);
    let records = common::lecture_records();
    common::provision(&store.inner, &generator, &config, &records);
    store.unavailable_upserts.store(usize::MAX, Ordering::SeqCst);

    let err = Indexer::new(&generator, &store, &config)
        .with_batch_size(records.len())
        .index(&records)
        .unwrap_err();
    assert_eq!(err.category(), ErrorCategory::StoreUnavailable);
    assert_eq!(
        store.upserts.load(Ordering::SeqCst),
        config.retry.max_attempts as usize
    );
    assert_eq!(store.inner.point_count(&config.collection.name), Some(0));
}

// =============================================================================
// Corpus files
// =============================================================================

#[test]
fn corpus_file_indexes_and_reports_bad_entries() {
    let mut file = tempfile::NamedTempFile::new().unwrap();
    write!(
        file,
        r#"[
            {{"_id": 1, "start": "00:00:00", "end": "00:00:05", "text": "first segment", "full_text": "the talk"}},
            {{"_id": "2", "start": 5, "end": 9.5, "text": "second segment", "full_text": "the talk"}},
            {{"_id": 3, "start": 0, "end": 1, "text": "", "full_text": "the talk"}},
            {{"start": 0, "end": 1, "text": "no id", "full_text": "the talk"}},
            {{"_id": 1, "start": 0, "end": 1, "text": "repeat", "full_text": "the talk"}}
        ]"#
    )
    .unwrap();

    let corpus = load_corpus(file.path()).unwrap();
    assert_eq!(corpus.records.len(), 2);
    let positions: Vec<usize> = corpus.rejected.iter().map(|r| r.position).collect();
    assert_eq!(positions, vec![2, 3, 4]);

    let config = common::test_config();
    let store = InMemoryStore::new();
    let generator = common::generator(&config);
    let sample = corpus.sample().unwrap();
    CollectionManager::new(&store)
        .provision(&generator, &config.collection, sample)
        .unwrap();
    let report = Indexer::new(&generator, &store, &config)
        .index(&corpus.records)
        .unwrap();
    assert_eq!(report.indexed, 2);
    assert!(report.is_complete());
}

#[test]
fn corpus_that_is_not_an_array_fails() {
    let mut file = tempfile::NamedTempFile::new().unwrap();
    write!(file, r#"{{"_id": 1}}"#).unwrap();
    let err = load_corpus(file.path()).unwrap_err();
    assert_eq!(err.category(), ErrorCategory::Io);
}
