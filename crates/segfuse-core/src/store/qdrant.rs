//! Qdrant REST client.
//!
//! Blocking `reqwest` client over the collection and point endpoints.
//! Request bodies are built by free functions so their wire shape can be
//! checked without a server.

use std::collections::BTreeMap;

use reqwest::Method;
use reqwest::blocking::{Client, Response};
use serde::Deserialize;
use serde_json::{Value, json};
use tracing::{debug, trace};

use super::{Fusion, Point, Prefetch, ScoredPoint, StoreError, VectorStore};
use crate::config::StoreConfig;
use crate::schema::CollectionSchema;

/// Qdrant's built-in RRF constant; other values need the parameterised form.
const QDRANT_DEFAULT_RRF_K: u32 = 60;

pub struct QdrantStore {
    base_url: String,
    api_key: Option<String>,
    http: Client,
}

impl QdrantStore {
    pub fn new(config: &StoreConfig) -> Result<Self, StoreError> {
        let http = Client::builder()
            .timeout(config.timeout())
            .build()
            .map_err(|e| StoreError::Unavailable(format!("failed to build HTTP client: {e}")))?;
        Ok(Self {
            base_url: config.url.trim_end_matches('/').to_string(),
            api_key: config.api_key.clone(),
            http,
        })
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    fn send(&self, method: Method, path: &str, body: Option<&Value>) -> Result<Value, StoreError> {
        let mut request = self.http.request(method.clone(), self.url(path));
        if let Some(key) = &self.api_key {
            request = request.header("api-key", key);
        }
        if let Some(body) = body {
            request = request.json(body);
        }
        trace!(%method, path, "Qdrant request");
        let response = request.send().map_err(transport_error)?;
        read_response(response)
    }
}

fn transport_error(err: reqwest::Error) -> StoreError {
    if err.is_decode() {
        StoreError::MalformedResponse(err.to_string())
    } else {
        StoreError::Unavailable(err.to_string())
    }
}

fn read_response(response: Response) -> Result<Value, StoreError> {
    let status = response.status().as_u16();
    let text = response.text().map_err(transport_error)?;
    if (200..300).contains(&status) {
        return serde_json::from_str(&text)
            .map_err(|e| StoreError::MalformedResponse(format!("{e}: {text}")));
    }
    Err(classify_failure(status, &text))
}

/// Map a non-success status and body onto the store error taxonomy.
fn classify_failure(status: u16, body: &str) -> StoreError {
    let message = serde_json::from_str::<Value>(body)
        .ok()
        .and_then(|v| v["status"]["error"].as_str().map(str::to_string))
        .unwrap_or_else(|| body.trim().to_string());

    match status {
        429 | 500..=599 => StoreError::Unavailable(format!("HTTP {status}: {message}")),
        404 => StoreError::CollectionNotFound(message),
        409 => StoreError::AlreadyExists(message),
        400 if message.contains("already exists") => StoreError::AlreadyExists(message),
        _ => StoreError::Rejected { status, message },
    }
}

fn collection_body(schema: &CollectionSchema) -> Value {
    let vectors: BTreeMap<&str, Value> = schema
        .spaces
        .iter()
        .map(|space| {
            let mut params = json!({
                "size": space.dimension,
                "distance": space.distance,
            });
            if let Some(comparator) = space.multivector {
                params["multivector_config"] = json!({ "comparator": comparator });
            }
            (space.name.as_str(), params)
        })
        .collect();
    json!({ "vectors": vectors })
}

fn upsert_body(points: &[Point]) -> Value {
    json!({ "points": points })
}

fn query_body(prefetch: &[Prefetch], fusion: Fusion, limit: usize) -> Value {
    let Fusion::Rrf { k } = fusion;
    let query = if k == QDRANT_DEFAULT_RRF_K {
        json!({ "fusion": "rrf" })
    } else {
        json!({ "rrf": { "k": k } })
    };
    json!({
        "prefetch": prefetch,
        "query": query,
        "limit": limit,
        "with_payload": true,
    })
}

fn delete_body(ids: &[u64]) -> Value {
    json!({ "points": ids })
}

#[derive(Deserialize)]
struct ExistsResult {
    exists: bool,
}

#[derive(Deserialize)]
struct QueryResult {
    points: Vec<ScoredPoint>,
}

fn result_field<T: for<'de> Deserialize<'de>>(mut body: Value) -> Result<T, StoreError> {
    let result = body
        .get_mut("result")
        .map(Value::take)
        .ok_or_else(|| StoreError::MalformedResponse("response has no `result`".to_string()))?;
    serde_json::from_value(result).map_err(|e| StoreError::MalformedResponse(e.to_string()))
}

impl VectorStore for QdrantStore {
    fn collection_exists(&self, name: &str) -> Result<bool, StoreError> {
        let body = self.send(Method::GET, &format!("/collections/{name}/exists"), None)?;
        Ok(result_field::<ExistsResult>(body)?.exists)
    }

    fn create_collection(&self, schema: &CollectionSchema) -> Result<(), StoreError> {
        let body = collection_body(schema);
        self.send(Method::PUT, &format!("/collections/{}", schema.name), Some(&body))?;
        debug!(collection = %schema.name, spaces = schema.spaces.len(), "Collection created");
        Ok(())
    }

    fn upsert(&self, collection: &str, points: &[Point]) -> Result<(), StoreError> {
        let body = upsert_body(points);
        self.send(
            Method::PUT,
            &format!("/collections/{collection}/points?wait=true"),
            Some(&body),
        )?;
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
        let body = query_body(prefetch, fusion, limit);
        let response = self.send(
            Method::POST,
            &format!("/collections/{collection}/points/query"),
            Some(&body),
        )?;
        Ok(result_field::<QueryResult>(response)?.points)
    }

    fn delete(&self, collection: &str, ids: &[u64]) -> Result<(), StoreError> {
        let body = delete_body(ids);
        self.send(
            Method::POST,
            &format!("/collections/{collection}/points/delete?wait=true"),
            Some(&body),
        )?;
        debug!(collection, points = ids.len(), "Points deleted");
        Ok(())
    }
}
