//! Error types for segfuse-core
//!
//! Every failure maps onto an [`ErrorCategory`] that drives retry and batch
//! decisions, and most carry a [`Remediation`] the CLI prints under the
//! error message.

use std::fmt;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::config::ConfigError;
use crate::embedding::EmbedError;
use crate::record::RecordError;
use crate::store::StoreError;

/// One step of a remediation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum RemediationStep {
    /// A command worth running, with what it is for.
    Run { label: String, command: String },
    /// Something else to check or change.
    Consider { hint: String },
}

/// How to get past an error.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Remediation {
    pub summary: String,
    pub steps: Vec<RemediationStep>,
}

impl Remediation {
    #[must_use]
    pub fn new(summary: impl Into<String>) -> Self {
        Self {
            summary: summary.into(),
            steps: Vec::new(),
        }
    }

    #[must_use]
    pub fn command(mut self, label: impl Into<String>, command: impl Into<String>) -> Self {
        self.steps.push(RemediationStep::Run {
            label: label.into(),
            command: command.into(),
        });
        self
    }

    #[must_use]
    pub fn alternative(mut self, hint: impl Into<String>) -> Self {
        self.steps.push(RemediationStep::Consider { hint: hint.into() });
        self
    }

    /// Multi-line text for terminal output, ending in a newline.
    #[must_use]
    pub fn render_plain(&self) -> String {
        self.to_string()
    }
}

impl fmt::Display for Remediation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "To fix: {}", self.summary)?;
        for step in &self.steps {
            match step {
                RemediationStep::Run { label, command } => writeln!(f, "  $ {command}    # {label}")?,
                RemediationStep::Consider { hint } => writeln!(f, "  - {hint}")?,
            }
        }
        Ok(())
    }
}

/// Coarse failure classes used for retry and batch-failure decisions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorCategory {
    /// An embedding call failed or produced malformed output.
    ModelFailure,
    /// The vector store could not be reached or answered with a transient error.
    StoreUnavailable,
    /// The store rejected a request for a reason other than schema shape.
    StoreRejected,
    /// Collection creation conflict or vector shape mismatch.
    SchemaConflict,
    /// A record is missing required fields.
    InputMalformed,
    /// Invalid configuration.
    Config,
    /// Local filesystem or serialization failure.
    Io,
}

impl fmt::Display for ErrorCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::ModelFailure => "model_failure",
            Self::StoreUnavailable => "store_unavailable",
            Self::StoreRejected => "store_rejected",
            Self::SchemaConflict => "schema_conflict",
            Self::InputMalformed => "input_malformed",
            Self::Config => "config",
            Self::Io => "io",
        };
        f.write_str(name)
    }
}

/// Result type alias using the library's Error type
pub type Result<T> = std::result::Result<T, Error>;

/// Main error type for segfuse-core
#[derive(Error, Debug)]
pub enum Error {
    /// Embedding model errors
    #[error("Embedding error: {0}")]
    Embed(#[from] EmbedError),

    /// Vector store errors
    #[error("Vector store error: {0}")]
    Store(#[from] StoreError),

    /// Collection schema could not be reconciled with the store
    #[error("Schema conflict: {0}")]
    SchemaConflict(String),

    /// Record validation errors
    #[error("Malformed record: {0}")]
    InputMalformed(#[from] RecordError),

    /// Configuration errors
    #[error("Config error: {0}")]
    Config(#[from] ConfigError),

    /// A batch failed and the index run was aborted
    #[error("Batch {batch} failed after {indexed} points were indexed: {source}")]
    BatchAborted {
        batch: usize,
        indexed: usize,
        /// Ids from the batches written before the failure.
        written: Vec<u64>,
        #[source]
        source: Box<Error>,
    },

    /// I/O errors
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON serialization errors
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl Error {
    /// Classify the error into the failure taxonomy.
    #[must_use]
    pub fn category(&self) -> ErrorCategory {
        match self {
            Self::Embed(_) => ErrorCategory::ModelFailure,
            Self::Store(err) => err.category(),
            Self::SchemaConflict(_) => ErrorCategory::SchemaConflict,
            Self::InputMalformed(_) => ErrorCategory::InputMalformed,
            Self::Config(_) => ErrorCategory::Config,
            Self::BatchAborted { source, .. } => source.category(),
            Self::Io(_) | Self::Json(_) => ErrorCategory::Io,
        }
    }

    /// Return remediation guidance when available.
    #[must_use]
    pub fn remediation(&self) -> Option<Remediation> {
        match self {
            Self::Embed(err) => Some(embed_remediation(err)),
            Self::Store(err) => Some(err.remediation()),
            Self::SchemaConflict(_) => Some(
                Remediation::new(
                    "The collection exists with a shape that does not match the configured spaces.",
                )
                .command("Show effective config", "segfuse config")
                .alternative("Use a new collection name or drop the existing collection."),
            ),
            Self::InputMalformed(_) => Some(
                Remediation::new("Fix the offending record; the rest of the corpus is unaffected.")
                    .alternative("Every record needs `_id`, `start`, `end`, `text` and `full_text`."),
            ),
            Self::Config(_) => Some(
                Remediation::new("Correct the configuration file and retry.")
                    .command("Show effective config", "segfuse config"),
            ),
            Self::BatchAborted { source, .. } => source.remediation(),
            Self::Io(_) => Some(
                Remediation::new("Check filesystem permissions and paths, then retry.")
                    .alternative("Verify the corpus and config paths exist and are readable."),
            ),
            Self::Json(_) => Some(
                Remediation::new("The input is not valid JSON for this command.")
                    .command("Check the document", "jq empty <file>")
                    .alternative("Corpora are a JSON array of records; notifications are an event or an array of events."),
            ),
        }
    }
}

fn embed_remediation(err: &EmbedError) -> Remediation {
    match err {
        EmbedError::ModelNotFound(_) => Remediation::new(
            "The configured embedding model could not be loaded.",
        )
        .alternative("Build with `--features fastembed` or switch the space to the `hash` backend.")
        .alternative("Check the model name against the supported model list."),
        EmbedError::EmptyInput { .. } => {
            Remediation::new("Remove or fix records whose text is empty; the batch was not indexed.")
        }
        _ => Remediation::new(
            "The embedding model produced no usable output. Inspect the input; retrying rarely helps.",
        ),
    }
}
