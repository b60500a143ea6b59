//! Indexable records and their point payloads.
//!
//! A [`Record`] is one text segment together with the full document it was
//! cut from. The record is replicated verbatim into the point payload so a
//! query hit can be displayed without a second lookup.

use serde::{Deserialize, Deserializer, Serialize};
use thiserror::Error;

/// Payload stored alongside every point.
pub type Payload = serde_json::Map<String, serde_json::Value>;

/// Boundary of a segment inside its full text.
///
/// Corpora use character offsets, seconds into a media file, or formatted
/// timestamps; the value is carried through unchanged.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum SpanMark {
    Offset(u64),
    Seconds(f64),
    Timestamp(String),
}

impl From<u64> for SpanMark {
    fn from(value: u64) -> Self {
        Self::Offset(value)
    }
}

impl From<f64> for SpanMark {
    fn from(value: f64) -> Self {
        Self::Seconds(value)
    }
}

impl From<&str> for SpanMark {
    fn from(value: &str) -> Self {
        Self::Timestamp(value.to_string())
    }
}

/// One indexable unit.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Record {
    #[serde(rename = "_id", deserialize_with = "deserialize_id")]
    pub id: u64,
    pub start: SpanMark,
    pub end: SpanMark,
    /// The segment text.
    pub text: String,
    pub full_text: String,
}

/// Record validation errors.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum RecordError {
    #[error("record {id}: field `{field}` is empty")]
    EmptyField { id: u64, field: &'static str },

    #[error("record at position {position}: {reason}")]
    Unparseable { position: usize, reason: String },

    #[error("record {id}: duplicate id at position {position}")]
    DuplicateId { id: u64, position: usize },
}

impl Record {
    pub fn new(
        id: u64,
        text: impl Into<String>,
        full_text: impl Into<String>,
        start: impl Into<SpanMark>,
        end: impl Into<SpanMark>,
    ) -> Self {
        Self {
            id,
            start: start.into(),
            end: end.into(),
            text: text.into(),
            full_text: full_text.into(),
        }
    }

    /// Check the fields every point needs to be embeddable in all spaces.
    pub fn validate(&self) -> Result<(), RecordError> {
        if self.text.trim().is_empty() {
            return Err(RecordError::EmptyField {
                id: self.id,
                field: "text",
            });
        }
        if self.full_text.trim().is_empty() {
            return Err(RecordError::EmptyField {
                id: self.id,
                field: "full_text",
            });
        }
        Ok(())
    }

    /// Payload replicating every record field.
    pub fn to_payload(&self) -> Payload {
        match serde_json::to_value(self) {
            Ok(serde_json::Value::Object(map)) => map,
            // Record always serializes to an object.
            _ => Payload::new(),
        }
    }

    /// Rebuild a record from a stored payload.
    pub fn from_payload(payload: &Payload) -> Result<Self, serde_json::Error> {
        serde_json::from_value(serde_json::Value::Object(payload.clone()))
    }
}

#[derive(Deserialize)]
#[serde(untagged)]
enum RawId {
    Int(u64),
    Text(String),
}

fn deserialize_id<'de, D>(deserializer: D) -> Result<u64, D::Error>
where
    D: Deserializer<'de>,
{
    match RawId::deserialize(deserializer)? {
        RawId::Int(id) => Ok(id),
        RawId::Text(text) => text
            .trim()
            .parse()
            .map_err(|_| serde::de::Error::custom(format!("`_id` is not an integer: {text:?}"))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn deserializes_numeric_and_string_ids() {
        let a: Record = serde_json::from_value(json!({
            "_id": 7, "start": 0, "end": 12, "text": "hello", "full_text": "hello world"
        }))
        .unwrap();
        assert_eq!(a.id, 7);

        let b: Record = serde_json::from_value(json!({
            "_id": "42", "start": "00:00:01.000", "end": "00:00:02.500",
            "text": "seg", "full_text": "doc"
        }))
        .unwrap();
        assert_eq!(b.id, 42);
        assert_eq!(b.start, SpanMark::Timestamp("00:00:01.000".into()));
    }

    #[test]
    fn rejects_non_integer_string_id() {
        let err = serde_json::from_value::<Record>(json!({
            "_id": "abc", "start": 0, "end": 1, "text": "t", "full_text": "f"
        }))
        .unwrap_err();
        assert!(err.to_string().contains("not an integer"));
    }

    #[test]
    fn span_marks_keep_their_shape() {
        let r: Record = serde_json::from_value(json!({
            "_id": 1, "start": 1.5, "end": 3, "text": "t", "full_text": "f"
        }))
        .unwrap();
        assert_eq!(r.start, SpanMark::Seconds(1.5));
        assert_eq!(r.end, SpanMark::Offset(3));
    }

    #[test]
    fn payload_round_trips_all_fields() {
        let record = Record::new(3, "segment", "full document", 10u64, 20u64);
        let payload = record.to_payload();
        assert_eq!(payload["_id"], json!(3));
        assert_eq!(payload["text"], json!("segment"));
        assert_eq!(payload["full_text"], json!("full document"));
        assert_eq!(Record::from_payload(&payload).unwrap(), record);
    }

    #[test]
    fn validate_flags_blank_fields() {
        let record = Record::new(1, "   ", "doc", 0u64, 1u64);
        assert_eq!(
            record.validate(),
            Err(RecordError::EmptyField {
                id: 1,
                field: "text"
            })
        );
        let record = Record::new(2, "seg", "", 0u64, 1u64);
        assert!(matches!(
            record.validate(),
            Err(RecordError::EmptyField {
                field: "full_text",
                ..
            })
        ));
        assert!(Record::new(3, "seg", "doc", 0u64, 1u64).validate().is_ok());
    }
}
