//! Trigger classification.
//!
//! An invocation is started either by a storage notification (a new object was
//! uploaded) or by a queue delivery carrying a [`Checkpoint`]. Both arrive as a
//! JSON envelope with a `Records` array; the record shape tells them apart.

use crate::checkpoint::Checkpoint;
use crate::error::IngestError;
use crate::storage::ObjectLocation;
use serde::Deserialize;
use std::path::Path;

#[derive(Debug, Deserialize)]
struct Envelope {
    #[serde(rename = "Records")]
    records: Vec<serde_json::Value>,
}

#[derive(Debug, Deserialize)]
struct StorageRecord {
    s3: StorageEntity,
}

#[derive(Debug, Deserialize)]
struct StorageEntity {
    bucket: BucketRef,
    object: ObjectRef,
}

#[derive(Debug, Deserialize)]
struct BucketRef {
    name: String,
}

#[derive(Debug, Deserialize)]
struct ObjectRef {
    key: String,
}

#[derive(Debug, Deserialize)]
struct QueueRecord {
    body: String,
    #[serde(rename = "receiptHandle")]
    receipt_handle: String,
}

/// What started this invocation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Trigger {
    /// A new object; start at page 0 with no carry-over.
    Fresh { source: ObjectLocation },
    /// A queued checkpoint. The message must be deleted once extracted.
    Continuation {
        checkpoint: Checkpoint,
        receipt_handle: String,
    },
}

impl Trigger {
    /// Classify a raw event.
    ///
    /// Storage keys are URL-decoded (`+` is a space). Queue deliveries must
    /// carry exactly one record; checkpoint fields are taken verbatim.
    pub fn from_event(event: &serde_json::Value) -> Result<Self, IngestError> {
        let envelope: Envelope = serde_json::from_value(event.clone())
            .map_err(|e| IngestError::MalformedEvent(format!("expected a Records envelope: {e}")))?;

        let first = envelope
            .records
            .first()
            .ok_or_else(|| IngestError::MalformedEvent("event has no records".into()))?;

        if first.get("s3").is_some() {
            let record: StorageRecord = serde_json::from_value(first.clone())
                .map_err(|e| IngestError::MalformedEvent(format!("bad storage record: {e}")))?;
            let key = decode_key(&record.s3.object.key)?;
            return Ok(Trigger::Fresh {
                source: ObjectLocation::new(record.s3.bucket.name, key),
            });
        }

        if first.get("body").is_some() {
            if envelope.records.len() != 1 {
                return Err(IngestError::MalformedCheckpoint {
                    reason: format!(
                        "expected exactly one queue record, got {}",
                        envelope.records.len()
                    ),
                });
            }
            let record: QueueRecord = serde_json::from_value(first.clone()).map_err(|e| {
                IngestError::MalformedCheckpoint {
                    reason: format!("bad queue record: {e}"),
                }
            })?;
            let checkpoint = Checkpoint::from_message_body(&record.body)?;
            return Ok(Trigger::Continuation {
                checkpoint,
                receipt_handle: record.receipt_handle,
            });
        }

        Err(IngestError::MalformedEvent(
            "record is neither a storage notification nor a queue delivery".into(),
        ))
    }

    /// The source document this trigger refers to.
    pub fn source(&self) -> ObjectLocation {
        match self {
            Trigger::Fresh { source } => source.clone(),
            Trigger::Continuation { checkpoint, .. } => checkpoint.source(),
        }
    }
}

/// Decode a notification key: `+` is a space, then percent-decoding.
pub fn decode_key(raw: &str) -> Result<String, IngestError> {
    let spaced = raw.replace('+', " ");
    urlencoding::decode(&spaced)
        .map(|k| k.into_owned())
        .map_err(|e| IngestError::MalformedEvent(format!("key '{raw}' is not valid UTF-8: {e}")))
}

/// Which handler a source object belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DocumentKind {
    Pdf,
    /// Converted to PDF first.
    Office,
    /// A finished media transcription.
    Transcript,
    Unsupported,
}

impl DocumentKind {
    /// Classify by file extension, case-insensitively.
    pub fn from_key(key: &str) -> Self {
        let ext = Path::new(key)
            .extension()
            .and_then(|e| e.to_str())
            .map(|e| e.to_ascii_lowercase());
        match ext.as_deref() {
            Some("pdf") => DocumentKind::Pdf,
            Some("ppt" | "pptx" | "doc" | "docx" | "xls" | "xlsx" | "excel" | "html") => {
                DocumentKind::Office
            }
            Some("json") => DocumentKind::Transcript,
            _ => DocumentKind::Unsupported,
        }
    }
}
