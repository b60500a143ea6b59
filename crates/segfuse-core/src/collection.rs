//! Idempotent collection provisioning.

use std::collections::HashSet;

use serde::Serialize;
use tracing::{debug, info, instrument};

use crate::config::CollectionConfig;
use crate::embedding::EmbeddingGenerator;
use crate::error::{Error, Result};
use crate::record::Record;
use crate::retry::{RetryPolicy, with_retry};
use crate::schema::CollectionSchema;
use crate::store::{StoreError, VectorStore};

/// What `ensure_collection` did.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Provisioning {
    /// The collection was created by this call.
    Created,
    /// The collection was already present in the store.
    AlreadyExists,
    /// This manager already provisioned the collection; the store was not contacted.
    AlreadyProvisioned,
}

pub struct CollectionManager<'a> {
    store: &'a dyn VectorStore,
    retry: RetryPolicy,
    provisioned: HashSet<String>,
}

impl<'a> CollectionManager<'a> {
    pub fn new(store: &'a dyn VectorStore) -> Self {
        Self {
            store,
            retry: RetryPolicy::default(),
            provisioned: HashSet::new(),
        }
    }

    #[must_use]
    pub fn with_retry_policy(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    pub fn is_provisioned(&self, name: &str) -> bool {
        self.provisioned.contains(name)
    }

    /// Make sure a collection with `schema.name` exists.
    ///
    /// Existence is checked by name only; an existing collection is never
    /// compared against `schema`. A concurrent creator winning the race
    /// surfaces as "already exists" and is confirmed with a second check.
    #[instrument(level = "debug", skip_all, fields(collection = %schema.name))]
    pub fn ensure_collection(&mut self, schema: &CollectionSchema) -> Result<Provisioning> {
        if self.provisioned.contains(&schema.name) {
            debug!("Collection already provisioned by this manager");
            return Ok(Provisioning::AlreadyProvisioned);
        }
        schema.validate().map_err(Error::SchemaConflict)?;

        let exists = with_retry(&self.retry, || Ok(self.store.collection_exists(&schema.name)?))?;
        let outcome = if exists {
            debug!("Collection exists, leaving it untouched");
            Provisioning::AlreadyExists
        } else {
            match with_retry(&self.retry, || Ok(self.store.create_collection(schema)?)) {
                Ok(()) => {
                    info!(spaces = schema.spaces.len(), "Collection created");
                    Provisioning::Created
                }
                Err(Error::Store(StoreError::AlreadyExists(_))) => {
                    let confirmed = with_retry(&self.retry, || {
                        Ok(self.store.collection_exists(&schema.name)?)
                    })?;
                    if !confirmed {
                        return Err(Error::SchemaConflict(format!(
                            "store reported {} as existing but it cannot be found",
                            schema.name
                        )));
                    }
                    debug!("Collection created concurrently");
                    Provisioning::AlreadyExists
                }
                Err(e) => return Err(e),
            }
        };

        self.provisioned.insert(schema.name.clone());
        Ok(outcome)
    }

    /// Size the three spaces from `sample` and ensure the collection.
    pub fn provision(
        &mut self,
        generator: &EmbeddingGenerator,
        config: &CollectionConfig,
        sample: &Record,
    ) -> Result<Provisioning> {
        if self.provisioned.contains(&config.name) {
            return Ok(Provisioning::AlreadyProvisioned);
        }
        let dims = generator.sample_dimensions(sample)?;
        let schema = CollectionSchema::from_dimensions(config, dims);
        self.ensure_collection(&schema)
    }
}
