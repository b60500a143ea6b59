//! In-process vector store.
//!
//! Exhaustive scoring over every point, MaxSim for multivector spaces and
//! local RRF fusion. Upserts are validated against the collection schema
//! as a whole batch before any point is written.

use std::collections::{BTreeMap, HashMap};

use parking_lot::RwLock;
use tracing::debug;

use super::{Fusion, Point, Prefetch, ScoredPoint, StoreError, Vector, VectorStore};
use crate::fusion::rrf_fuse_top;
use crate::schema::{CollectionSchema, VectorSpace};
use crate::similarity;

struct Collection {
    schema: CollectionSchema,
    points: BTreeMap<u64, Point>,
}

#[derive(Default)]
pub struct InMemoryStore {
    collections: RwLock<HashMap<String, Collection>>,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of points in a collection, `None` if it does not exist.
    pub fn point_count(&self, collection: &str) -> Option<usize> {
        self.collections.read().get(collection).map(|c| c.points.len())
    }

    pub fn get_point(&self, collection: &str, id: u64) -> Option<Point> {
        self.collections
            .read()
            .get(collection)
            .and_then(|c| c.points.get(&id).cloned())
    }

    pub fn schema(&self, collection: &str) -> Option<CollectionSchema> {
        self.collections.read().get(collection).map(|c| c.schema.clone())
    }
}

fn check_vector(space: &VectorSpace, vector: &Vector) -> Result<(), StoreError> {
    let mismatch = |actual: usize| StoreError::DimensionMismatch {
        space: space.name.clone(),
        expected: space.dimension,
        actual,
    };
    match (space.is_multivector(), vector) {
        (false, Vector::Dense(v)) => {
            if v.len() != space.dimension {
                return Err(mismatch(v.len()));
            }
        }
        (true, Vector::Multi(tokens)) => {
            if tokens.is_empty() {
                return Err(StoreError::ShapeMismatch {
                    space: space.name.clone(),
                    reason: "multivector has no token vectors".to_string(),
                });
            }
            if let Some(bad) = tokens.iter().find(|t| t.len() != space.dimension) {
                return Err(mismatch(bad.len()));
            }
        }
        (true, Vector::Dense(_)) => {
            return Err(StoreError::ShapeMismatch {
                space: space.name.clone(),
                reason: "expected a multivector, got a single vector".to_string(),
            });
        }
        (false, Vector::Multi(_)) => {
            return Err(StoreError::ShapeMismatch {
                space: space.name.clone(),
                reason: "expected a single vector, got a multivector".to_string(),
            });
        }
    }
    Ok(())
}

fn check_point(schema: &CollectionSchema, point: &Point) -> Result<(), StoreError> {
    for space in &schema.spaces {
        let vector = point
            .vector
            .get(&space.name)
            .ok_or_else(|| StoreError::MissingVector {
                id: point.id,
                space: space.name.clone(),
            })?;
        check_vector(space, vector)?;
    }
    if let Some(extra) = point
        .vector
        .keys()
        .find(|name| schema.space_named(name).is_none())
    {
        return Err(StoreError::UnknownSpace {
            collection: schema.name.clone(),
            space: extra.clone(),
        });
    }
    Ok(())
}

fn score_point(space: &VectorSpace, query: &Vector, stored: &Vector) -> f32 {
    match (query, stored) {
        (Vector::Dense(q), Vector::Dense(d)) => similarity::score(space.distance, q, d),
        (Vector::Multi(q), Vector::Multi(d)) => similarity::max_sim(space.distance, q, d),
        _ => f32::NEG_INFINITY,
    }
}

fn prefetch_ranking(collection: &Collection, prefetch: &Prefetch) -> Result<Vec<u64>, StoreError> {
    let space = collection
        .schema
        .space_named(&prefetch.using)
        .ok_or_else(|| StoreError::UnknownSpace {
            collection: collection.schema.name.clone(),
            space: prefetch.using.clone(),
        })?;
    check_vector(space, &prefetch.query)?;

    let mut scored: Vec<(u64, f32)> = collection
        .points
        .values()
        .filter_map(|p| {
            p.vector
                .get(&space.name)
                .map(|v| (p.id, score_point(space, &prefetch.query, v)))
        })
        .collect();
    // Points iterate in id order, so the stable sort breaks ties by id.
    scored.sort_by(|a, b| b.1.total_cmp(&a.1));
    scored.truncate(prefetch.limit);
    Ok(scored.into_iter().map(|(id, _)| id).collect())
}

impl VectorStore for InMemoryStore {
    fn collection_exists(&self, name: &str) -> Result<bool, StoreError> {
        Ok(self.collections.read().contains_key(name))
    }

    fn create_collection(&self, schema: &CollectionSchema) -> Result<(), StoreError> {
        schema.validate().map_err(|reason| StoreError::ShapeMismatch {
            space: schema.name.clone(),
            reason,
        })?;
        let mut collections = self.collections.write();
        if collections.contains_key(&schema.name) {
            return Err(StoreError::AlreadyExists(schema.name.clone()));
        }
        collections.insert(
            schema.name.clone(),
            Collection {
                schema: schema.clone(),
                points: BTreeMap::new(),
            },
        );
        debug!(collection = %schema.name, spaces = schema.spaces.len(), "Collection created");
        Ok(())
    }

    fn upsert(&self, collection: &str, points: &[Point]) -> Result<(), StoreError> {
        let mut collections = self.collections.write();
        let target = collections
            .get_mut(collection)
            .ok_or_else(|| StoreError::CollectionNotFound(collection.to_string()))?;
        for point in points {
            check_point(&target.schema, point)?;
        }
        for point in points {
            target.points.insert(point.id, point.clone());
        }
        debug!(collection, points = points.len(), "Points upserted");
        Ok(())
    }

    fn query(
        &self,
        collection: &str,
        prefetch: &[Prefetch],
        fusion: Fusion,
        limit: usize,
    ) -> Result<Vec<ScoredPoint>, StoreError> {
        let collections = self.collections.read();
        let target = collections
            .get(collection)
            .ok_or_else(|| StoreError::CollectionNotFound(collection.to_string()))?;
        if prefetch.is_empty() {
            return Err(StoreError::Rejected {
                status: 400,
                message: "query needs at least one prefetch".to_string(),
            });
        }

        let rankings = prefetch
            .iter()
            .map(|p| prefetch_ranking(target, p))
            .collect::<Result<Vec<_>, _>>()?;

        let Fusion::Rrf { k } = fusion;
        Ok(rrf_fuse_top(&rankings, k, limit)
            .into_iter()
            .filter_map(|candidate| {
                target.points.get(&candidate.id).map(|p| ScoredPoint {
                    id: candidate.id,
                    score: candidate.score,
                    payload: p.payload.clone(),
                })
            })
            .collect())
    }

    fn delete(&self, collection: &str, ids: &[u64]) -> Result<(), StoreError> {
        let mut collections = self.collections.write();
        let target = collections
            .get_mut(collection)
            .ok_or_else(|| StoreError::CollectionNotFound(collection.to_string()))?;
        let before = target.points.len();
        for id in ids {
            target.points.remove(id);
        }
        debug!(collection, removed = before - target.points.len(), "Points deleted");
        Ok(())
    }
}
