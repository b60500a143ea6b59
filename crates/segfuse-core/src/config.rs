//! Configuration management for segfuse
//!
//! Handles loading and validation of `segfuse.toml` files. Every section
//! and field has a default, so an empty file is a valid configuration.
//! Components receive the values they need through their constructors;
//! nothing in the core reads environment variables.

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::embedding::{DEFAULT_MAX_TOKENS, EmbedderBackend};
use crate::logging::LogConfig;
use crate::retry::RetryPolicy;
use crate::schema::Distance;

/// Configuration loading and validation errors
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("failed to read {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse config: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("failed to render config: {0}")]
    Render(#[from] toml::ser::Error),

    #[error("invalid config: {0}")]
    Invalid(String),
}

/// Main configuration structure
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub struct Config {
    /// Collection name and vector space layout
    #[serde(default)]
    pub collection: CollectionConfig,

    /// Embedding model per space
    #[serde(default)]
    pub models: ModelsConfig,

    /// Vector store connection
    #[serde(default)]
    pub store: StoreConfig,

    /// Batch indexing
    #[serde(default)]
    pub indexing: IndexingConfig,

    /// Query fusion
    #[serde(default)]
    pub query: QueryConfig,

    /// Backoff for transient store failures
    #[serde(default)]
    pub retry: RetryConfig,

    /// Storage notification routing
    #[serde(default)]
    pub notifications: NotificationsConfig,

    /// Logging
    #[serde(default)]
    pub logging: LogConfig,
}

/// Names of the three vector spaces inside a collection
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SpaceNames {
    #[serde(default = "default_full_text_space")]
    pub full_text: String,

    #[serde(default = "default_segment_space")]
    pub segment: String,

    #[serde(default = "default_late_interaction_space")]
    pub late_interaction: String,
}

impl Default for SpaceNames {
    fn default() -> Self {
        Self {
            full_text: default_full_text_space(),
            segment: default_segment_space(),
            late_interaction: default_late_interaction_space(),
        }
    }
}

fn default_full_text_space() -> String {
    "full_text".to_string()
}

fn default_segment_space() -> String {
    "segment".to_string()
}

fn default_late_interaction_space() -> String {
    "segment_late".to_string()
}

/// Collection configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CollectionConfig {
    #[serde(default = "default_collection_name")]
    pub name: String,

    #[serde(default)]
    pub spaces: SpaceNames,

    /// Distance metric for the two dense spaces. The late-interaction space
    /// always uses cosine with MaxSim.
    #[serde(default)]
    pub distance: Distance,
}

impl Default for CollectionConfig {
    fn default() -> Self {
        Self {
            name: default_collection_name(),
            spaces: SpaceNames::default(),
            distance: Distance::default(),
        }
    }
}

fn default_collection_name() -> String {
    "segments".to_string()
}

/// One embedding model
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ModelSpec {
    #[serde(default)]
    pub backend: EmbedderBackend,

    /// Model name for the `fastembed` backend
    #[serde(default)]
    pub model: Option<String>,

    /// Output dimension for the `hash` backend
    #[serde(default = "default_hash_dimension")]
    pub dimension: usize,

    /// Token cap for late-interaction models
    #[serde(default = "default_max_tokens")]
    pub max_tokens: usize,
}

impl ModelSpec {
    fn hash(dimension: usize) -> Self {
        Self {
            backend: EmbedderBackend::Hash,
            model: None,
            dimension,
            max_tokens: default_max_tokens(),
        }
    }
}

impl Default for ModelSpec {
    fn default() -> Self {
        Self::hash(default_hash_dimension())
    }
}

fn default_hash_dimension() -> usize {
    256
}

fn default_max_tokens() -> usize {
    DEFAULT_MAX_TOKENS
}

/// Models for the three spaces
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModelsConfig {
    #[serde(default = "default_full_text_model")]
    pub full_text: ModelSpec,

    #[serde(default = "default_segment_model")]
    pub segment: ModelSpec,

    #[serde(default = "default_late_interaction_model")]
    pub late_interaction: ModelSpec,

    /// Download cache for `fastembed` models
    #[serde(default)]
    pub cache_dir: Option<PathBuf>,
}

impl Default for ModelsConfig {
    fn default() -> Self {
        Self {
            full_text: default_full_text_model(),
            segment: default_segment_model(),
            late_interaction: default_late_interaction_model(),
            cache_dir: None,
        }
    }
}

fn default_full_text_model() -> ModelSpec {
    ModelSpec::hash(384)
}

fn default_segment_model() -> ModelSpec {
    ModelSpec::hash(256)
}

fn default_late_interaction_model() -> ModelSpec {
    ModelSpec::hash(128)
}

/// Which vector store implementation to open
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StoreBackend {
    /// In-process store; contents live as long as the process
    #[default]
    Memory,
    /// Qdrant over its REST API
    Qdrant,
}

impl std::fmt::Display for StoreBackend {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Memory => write!(f, "memory"),
            Self::Qdrant => write!(f, "qdrant"),
        }
    }
}

/// Vector store configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoreConfig {
    #[serde(default)]
    pub backend: StoreBackend,

    /// Base URL of the Qdrant REST API
    #[serde(default = "default_store_url")]
    pub url: String,

    /// Sent as the `api-key` header when set
    #[serde(default)]
    pub api_key: Option<String>,

    /// Per-request timeout in seconds
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            backend: StoreBackend::default(),
            url: default_store_url(),
            api_key: None,
            timeout_secs: default_timeout_secs(),
        }
    }
}

impl StoreConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

fn default_store_url() -> String {
    "http://localhost:6333".to_string()
}

fn default_timeout_secs() -> u64 {
    30
}

/// What the indexer does when a batch fails
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BatchFailurePolicy {
    /// Stop at the first failed batch and return its error
    #[default]
    Abort,
    /// Record the failure and continue with the next batch
    Skip,
}

/// Indexing configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IndexingConfig {
    /// Records per embed + upsert round
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,

    #[serde(default)]
    pub failure_policy: BatchFailurePolicy,
}

impl Default for IndexingConfig {
    fn default() -> Self {
        Self {
            batch_size: default_batch_size(),
            failure_policy: BatchFailurePolicy::default(),
        }
    }
}

fn default_batch_size() -> usize {
    4
}

/// Query configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct QueryConfig {
    /// Candidates requested from each space before fusion
    #[serde(default = "default_prefetch_limit")]
    pub prefetch_limit: usize,

    /// RRF smoothing constant
    #[serde(default = "default_rrf_k")]
    pub rrf_k: u32,

    /// Results returned when the caller gives no limit
    #[serde(default = "default_limit")]
    pub default_limit: usize,
}

impl Default for QueryConfig {
    fn default() -> Self {
        Self {
            prefetch_limit: default_prefetch_limit(),
            rrf_k: default_rrf_k(),
            default_limit: default_limit(),
        }
    }
}

fn default_prefetch_limit() -> usize {
    20
}

fn default_rrf_k() -> u32 {
    60
}

fn default_limit() -> usize {
    10
}

/// Retry configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RetryConfig {
    #[serde(default = "default_initial_delay_ms")]
    pub initial_delay_ms: u64,

    #[serde(default = "default_max_delay_ms")]
    pub max_delay_ms: u64,

    #[serde(default = "default_backoff_factor")]
    pub backoff_factor: f64,

    /// Fraction of the delay added or removed at random (0.0 to 1.0)
    #[serde(default = "default_jitter_percent")]
    pub jitter_percent: f64,

    /// Total attempts including the first; 1 disables retries
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            initial_delay_ms: default_initial_delay_ms(),
            max_delay_ms: default_max_delay_ms(),
            backoff_factor: default_backoff_factor(),
            jitter_percent: default_jitter_percent(),
            max_attempts: default_max_attempts(),
        }
    }
}

impl RetryConfig {
    pub fn to_policy(&self) -> RetryPolicy {
        RetryPolicy::new(
            Duration::from_millis(self.initial_delay_ms),
            Duration::from_millis(self.max_delay_ms),
            self.backoff_factor,
            self.jitter_percent,
            Some(self.max_attempts),
        )
    }
}

fn default_initial_delay_ms() -> u64 {
    100
}

fn default_max_delay_ms() -> u64 {
    5_000
}

fn default_backoff_factor() -> f64 {
    2.0
}

fn default_jitter_percent() -> f64 {
    0.1
}

fn default_max_attempts() -> u32 {
    3
}

/// Storage notification handling
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NotificationsConfig {
    /// Directory documents are read from when a creation event arrives
    #[serde(default = "default_documents_dir")]
    pub documents_dir: PathBuf,

    /// Delete points for a removed document. Only points indexed by the
    /// same router instance are known and can be pruned.
    #[serde(default)]
    pub prune_on_remove: bool,
}

impl Default for NotificationsConfig {
    fn default() -> Self {
        Self {
            documents_dir: default_documents_dir(),
            prune_on_remove: false,
        }
    }
}

fn default_documents_dir() -> PathBuf {
    PathBuf::from("data")
}

impl Config {
    /// Load and validate configuration from a TOML file
    pub fn load_from(path: &Path) -> crate::Result<Self> {
        let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        let config = Self::from_toml_str(&text)?;
        tracing::debug!(path = %path.display(), "Loaded configuration");
        Ok(config)
    }

    /// Parse and validate configuration from TOML text
    pub fn from_toml_str(text: &str) -> Result<Self, ConfigError> {
        let config: Self = toml::from_str(text)?;
        config.validate()?;
        Ok(config)
    }

    /// Render the effective configuration as TOML
    pub fn to_toml_string(&self) -> Result<String, ConfigError> {
        Ok(toml::to_string_pretty(self)?)
    }

    /// Check cross-field constraints serde cannot express
    pub fn validate(&self) -> Result<(), ConfigError> {
        let invalid = |msg: String| Err(ConfigError::Invalid(msg));

        if self.collection.name.trim().is_empty() {
            return invalid("collection.name must not be empty".into());
        }
        let spaces = &self.collection.spaces;
        for (key, name) in [
            ("full_text", &spaces.full_text),
            ("segment", &spaces.segment),
            ("late_interaction", &spaces.late_interaction),
        ] {
            if name.trim().is_empty() {
                return invalid(format!("collection.spaces.{key} must not be empty"));
            }
        }
        if spaces.full_text == spaces.segment
            || spaces.full_text == spaces.late_interaction
            || spaces.segment == spaces.late_interaction
        {
            return invalid("collection.spaces names must be distinct".into());
        }

        for (key, spec) in [
            ("full_text", &self.models.full_text),
            ("segment", &self.models.segment),
            ("late_interaction", &self.models.late_interaction),
        ] {
            match spec.backend {
                EmbedderBackend::Hash if spec.dimension == 0 => {
                    return invalid(format!("models.{key}.dimension must be > 0"));
                }
                EmbedderBackend::Fastembed if spec.model.is_none() => {
                    return invalid(format!("models.{key}.model is required for fastembed"));
                }
                _ => {}
            }
            if spec.max_tokens == 0 {
                return invalid(format!("models.{key}.max_tokens must be > 0"));
            }
        }

        if self.store.backend == StoreBackend::Qdrant
            && !(self.store.url.starts_with("http://") || self.store.url.starts_with("https://"))
        {
            return invalid(format!(
                "store.url must start with http:// or https://, got {:?}",
                self.store.url
            ));
        }
        if self.store.timeout_secs == 0 {
            return invalid("store.timeout_secs must be > 0".into());
        }

        if self.indexing.batch_size == 0 {
            return invalid("indexing.batch_size must be > 0".into());
        }
        if self.query.prefetch_limit == 0 {
            return invalid("query.prefetch_limit must be > 0".into());
        }

        let retry = &self.retry;
        if retry.max_attempts == 0 {
            return invalid("retry.max_attempts must be >= 1".into());
        }
        if !(retry.backoff_factor.is_finite() && retry.backoff_factor >= 1.0) {
            return invalid("retry.backoff_factor must be >= 1.0".into());
        }
        if !(0.0..=1.0).contains(&retry.jitter_percent) {
            return invalid("retry.jitter_percent must be within 0.0..=1.0".into());
        }
        if retry.initial_delay_ms > retry.max_delay_ms {
            return invalid("retry.initial_delay_ms must not exceed retry.max_delay_ms".into());
        }

        if self.logging.parsed_level().is_err() {
            return invalid(format!("logging.level {:?} is not a level", self.logging.level));
        }

        Ok(())
    }
}
