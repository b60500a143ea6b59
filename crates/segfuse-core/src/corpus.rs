//! Corpus loading.
//!
//! A corpus is a JSON array of records loaded fully into memory before
//! indexing starts. Entries are parsed one by one so a single malformed
//! record is rejected without discarding the rest.

use std::collections::HashSet;
use std::path::Path;

use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::error::Result;
use crate::record::{Record, RecordError};

/// A record that was dropped before indexing.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RejectedRecord {
    /// Position in the input sequence.
    pub position: usize,
    /// Record id when it could be read.
    pub id: Option<u64>,
    pub reason: String,
}

impl RejectedRecord {
    pub(crate) fn from_error(position: usize, id: Option<u64>, err: &RecordError) -> Self {
        Self {
            position,
            id,
            reason: err.to_string(),
        }
    }
}

/// Records ready for indexing plus the entries that were rejected.
#[derive(Debug, Clone, Default)]
pub struct Corpus {
    pub records: Vec<Record>,
    pub rejected: Vec<RejectedRecord>,
}

impl Corpus {
    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// First record, used to size the vector spaces.
    pub fn sample(&self) -> Option<&Record> {
        self.records.first()
    }
}

/// Load a corpus file.
pub fn load_corpus(path: &Path) -> Result<Corpus> {
    let raw = std::fs::read_to_string(path)?;
    let corpus = parse_corpus(&raw)?;
    debug!(
        path = %path.display(),
        records = corpus.records.len(),
        rejected = corpus.rejected.len(),
        "Corpus loaded"
    );
    Ok(corpus)
}

/// Parse a corpus from a JSON array.
///
/// Fails only when the document itself is not a JSON array; individual
/// entries that cannot be read, have blank text, or repeat an earlier id are
/// reported in [`Corpus::rejected`].
pub fn parse_corpus(raw: &str) -> Result<Corpus> {
    let entries: Vec<serde_json::Value> = serde_json::from_str(raw)?;
    let mut corpus = Corpus::default();
    let mut seen = HashSet::with_capacity(entries.len());

    for (position, entry) in entries.into_iter().enumerate() {
        let loose_id = entry.get("_id").and_then(loose_id);
        let record = match serde_json::from_value::<Record>(entry) {
            Ok(record) => record,
            Err(err) => {
                let err = RecordError::Unparseable {
                    position,
                    reason: err.to_string(),
                };
                warn!(position, error = %err, "Rejecting corpus entry");
                corpus
                    .rejected
                    .push(RejectedRecord::from_error(position, loose_id, &err));
                continue;
            }
        };

        if let Err(err) = record.validate() {
            warn!(position, record_id = record.id, error = %err, "Rejecting corpus entry");
            corpus
                .rejected
                .push(RejectedRecord::from_error(position, Some(record.id), &err));
            continue;
        }

        if !seen.insert(record.id) {
            let err = RecordError::DuplicateId {
                id: record.id,
                position,
            };
            warn!(position, record_id = record.id, "Rejecting duplicate corpus id");
            corpus
                .rejected
                .push(RejectedRecord::from_error(position, Some(record.id), &err));
            continue;
        }

        corpus.records.push(record);
    }

    Ok(corpus)
}

fn loose_id(value: &serde_json::Value) -> Option<u64> {
    value
        .as_u64()
        .or_else(|| value.as_str().and_then(|s| s.trim().parse().ok()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_valid_records_in_order() {
        let corpus = parse_corpus(
            r#"[
                {"_id": 1, "start": 0, "end": 5, "text": "alpha", "full_text": "alpha beta"},
                {"_id": "2", "start": 6, "end": 10, "text": "beta", "full_text": "alpha beta"}
            ]"#,
        )
        .unwrap();
        assert_eq!(corpus.len(), 2);
        assert_eq!(corpus.records[0].id, 1);
        assert_eq!(corpus.records[1].id, 2);
        assert!(corpus.rejected.is_empty());
        assert_eq!(corpus.sample().map(|r| r.id), Some(1));
    }

    #[test]
    fn malformed_entries_are_rejected_individually() {
        let corpus = parse_corpus(
            r#"[
                {"_id": 1, "start": 0, "end": 5, "text": "alpha", "full_text": "doc"},
                {"_id": 2, "start": 0, "end": 5, "full_text": "doc"},
                {"_id": 3, "start": 0, "end": 5, "text": "  ", "full_text": "doc"},
                {"_id": 1, "start": 0, "end": 5, "text": "again", "full_text": "doc"},
                {"_id": 4, "start": 0, "end": 5, "text": "delta", "full_text": "doc"}
            ]"#,
        )
        .unwrap();
        let ids: Vec<u64> = corpus.records.iter().map(|r| r.id).collect();
        assert_eq!(ids, vec![1, 4]);
        let rejected: Vec<(usize, Option<u64>)> = corpus
            .rejected
            .iter()
            .map(|r| (r.position, r.id))
            .collect();
        assert_eq!(rejected, vec![(1, Some(2)), (2, Some(3)), (3, Some(1))]);
        assert!(corpus.rejected[2].reason.contains("duplicate"));
    }

    #[test]
    fn non_array_document_is_an_error() {
        assert!(parse_corpus(r#"{"_id": 1}"#).is_err());
    }

    #[test]
    fn empty_array_is_an_empty_corpus() {
        let corpus = parse_corpus("[]").unwrap();
        assert!(corpus.is_empty());
        assert!(corpus.sample().is_none());
    }

    #[test]
    fn load_corpus_reads_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("final.json");
        std::fs::write(
            &path,
            r#"[{"_id": 9, "start": 0, "end": 1, "text": "x y z", "full_text": "x y z w"}]"#,
        )
        .unwrap();
        let corpus = load_corpus(&path).unwrap();
        assert_eq!(corpus.records[0].id, 9);
    }
}
