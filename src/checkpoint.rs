//! The continuation contract between successive invocations.
//!
//! A [`Checkpoint`] is written only after a page has been durably appended to
//! the output artifact, and it is never mutated: the successor reads it once,
//! the queue message is deleted, and a new checkpoint (if any) replaces it.

use crate::error::IngestError;
use crate::storage::ObjectLocation;
use serde::{Deserialize, Serialize};

/// Resume state handed from one invocation to the next.
///
/// Field names are the wire format and must not change.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Checkpoint {
    pub source_bucket: String,
    pub source_key: String,
    /// Output artifact key, in the configured output bucket.
    pub s3_output_key: String,
    /// 0-based index of the first page not yet committed.
    pub page_counter: usize,
    /// Text of the last committed page.
    pub previous_text: String,
}

impl Checkpoint {
    /// Serialize as a queue message body.
    pub fn to_message_body(&self) -> Result<String, IngestError> {
        serde_json::to_string(self)
            .map_err(|e| IngestError::Internal(format!("checkpoint serialization failed: {e}")))
    }

    /// Parse a queue message body.
    ///
    /// Missing fields, wrong types and negative counters all surface as
    /// [`IngestError::MalformedCheckpoint`].
    pub fn from_message_body(body: &str) -> Result<Self, IngestError> {
        serde_json::from_str(body).map_err(|e| IngestError::MalformedCheckpoint {
            reason: e.to_string(),
        })
    }

    pub fn source(&self) -> ObjectLocation {
        ObjectLocation::new(&self.source_bucket, &self.source_key)
    }
}

/// One document being transcribed: where it comes from and where text goes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DocumentJob {
    pub source: ObjectLocation,
    pub output: ObjectLocation,
}

impl DocumentJob {
    /// A job for a newly uploaded document. The artifact key is the source key plus `.txt`.
    pub fn fresh(source: ObjectLocation, output_bucket: &str) -> Self {
        let output = ObjectLocation::new(output_bucket, format!("{}.txt", source.key));
        Self { source, output }
    }

    /// The job a checkpoint refers to.
    pub fn from_checkpoint(checkpoint: &Checkpoint, output_bucket: &str) -> Self {
        Self {
            source: checkpoint.source(),
            output: ObjectLocation::new(output_bucket, &checkpoint.s3_output_key),
        }
    }

    /// Checkpoint for resuming this job at `next_page_index`.
    pub fn checkpoint(&self, next_page_index: usize, previous_text: impl Into<String>) -> Checkpoint {
        Checkpoint {
            source_bucket: self.source.bucket.clone(),
            source_key: self.source.key.clone(),
            s3_output_key: self.output.key.clone(),
            page_counter: next_page_index,
            previous_text: previous_text.into(),
        }
    }
}
