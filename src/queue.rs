//! Hand-off queue between invocations.
//!
//! The queue is the only channel from a suspended invocation to its
//! successor. Delivery is at-least-once: a message stays visible until it is
//! deleted with its receipt handle, so a crash between receive and delete
//! leads to redelivery (handled by resume reconciliation in the controller).

use crate::checkpoint::Checkpoint;
use crate::error::IngestError;
use async_trait::async_trait;
use serde_json::json;
use std::collections::VecDeque;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Mutex;
use std::time::{SystemTime, UNIX_EPOCH};
use tracing::{debug, info};

/// A delivered message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QueueMessage {
    pub body: String,
    pub receipt_handle: String,
}

impl QueueMessage {
    /// Wrap this message in the event envelope a successor invocation receives.
    pub fn to_event(&self) -> serde_json::Value {
        json!({
            "Records": [{
                "body": self.body,
                "receiptHandle": self.receipt_handle,
            }]
        })
    }
}

#[async_trait]
pub trait HandoffQueue: Send + Sync {
    /// Enqueue a checkpoint for a successor invocation.
    async fn send(&self, checkpoint: &Checkpoint) -> Result<(), IngestError>;

    /// Oldest undeleted message, if any.
    async fn receive(&self) -> Result<Option<QueueMessage>, IngestError>;

    /// Acknowledge a message. Deleting an unknown handle is not an error.
    async fn delete(&self, receipt_handle: &str) -> Result<(), IngestError>;
}

/// Directory-backed queue: one JSON file per message, named so that
/// lexicographic order is send order. The receipt handle is the file name.
#[derive(Debug)]
pub struct SpoolQueue {
    dir: PathBuf,
    seq: AtomicU64,
}

impl SpoolQueue {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self {
            dir: dir.into(),
            seq: AtomicU64::new(0),
        }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn io_error(&self, e: std::io::Error) -> IngestError {
        IngestError::Queue(format!("{}: {}", self.dir.display(), e))
    }

    fn next_name(&self) -> String {
        let nanos = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_nanos())
            .unwrap_or_default();
        let seq = self.seq.fetch_add(1, Ordering::SeqCst);
        format!("{nanos:024}-{seq:08}.json")
    }

    /// Receipt handles are bare file names; anything else is rejected.
    fn path_for(&self, receipt_handle: &str) -> Result<PathBuf, IngestError> {
        if receipt_handle.is_empty()
            || receipt_handle.contains(['/', '\\'])
            || receipt_handle.starts_with('.')
        {
            return Err(IngestError::Queue(format!(
                "invalid receipt handle '{receipt_handle}'"
            )));
        }
        Ok(self.dir.join(receipt_handle))
    }
}

#[async_trait]
impl HandoffQueue for SpoolQueue {
    async fn send(&self, checkpoint: &Checkpoint) -> Result<(), IngestError> {
        let body = checkpoint.to_message_body()?;
        tokio::fs::create_dir_all(&self.dir)
            .await
            .map_err(|e| self.io_error(e))?;

        let name = self.next_name();
        let tmp = self.dir.join(format!(".{name}.tmp"));
        tokio::fs::write(&tmp, body.as_bytes())
            .await
            .map_err(|e| self.io_error(e))?;
        tokio::fs::rename(&tmp, self.dir.join(&name))
            .await
            .map_err(|e| self.io_error(e))?;

        info!(
            "Queued checkpoint {} for {} at page index {}",
            name, checkpoint.source_key, checkpoint.page_counter
        );
        Ok(())
    }

    async fn receive(&self) -> Result<Option<QueueMessage>, IngestError> {
        let mut entries = match tokio::fs::read_dir(&self.dir).await {
            Ok(entries) => entries,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(self.io_error(e)),
        };

        let mut names = Vec::new();
        while let Some(entry) = entries.next_entry().await.map_err(|e| self.io_error(e))? {
            if let Some(name) = entry.file_name().to_str() {
                if name.ends_with(".json") && !name.starts_with('.') {
                    names.push(name.to_string());
                }
            }
        }
        names.sort();

        let Some(oldest) = names.into_iter().next() else {
            return Ok(None);
        };
        let body = tokio::fs::read_to_string(self.dir.join(&oldest))
            .await
            .map_err(|e| self.io_error(e))?;
        debug!("Received {}", oldest);
        Ok(Some(QueueMessage {
            body,
            receipt_handle: oldest,
        }))
    }

    async fn delete(&self, receipt_handle: &str) -> Result<(), IngestError> {
        let path = self.path_for(receipt_handle)?;
        match tokio::fs::remove_file(&path).await {
            Ok(()) => {
                debug!("Deleted {}", receipt_handle);
                Ok(())
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(self.io_error(e)),
        }
    }
}

/// In-memory queue that also records deletions.
#[derive(Debug, Default)]
pub struct MemoryQueue {
    state: Mutex<MemoryQueueState>,
}

#[derive(Debug, Default)]
struct MemoryQueueState {
    messages: VecDeque<QueueMessage>,
    deleted: Vec<String>,
    next_id: u64,
}

impl MemoryQueue {
    pub fn new() -> Self {
        Self::default()
    }

    /// Checkpoints currently queued, oldest first.
    pub fn pending(&self) -> Vec<Checkpoint> {
        self.lock()
            .messages
            .iter()
            .filter_map(|m| Checkpoint::from_message_body(&m.body).ok())
            .collect()
    }

    /// Receipt handles deleted so far, in order.
    pub fn deleted(&self) -> Vec<String> {
        self.lock().deleted.clone()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, MemoryQueueState> {
        self.state.lock().unwrap_or_else(|p| p.into_inner())
    }
}

#[async_trait]
impl HandoffQueue for MemoryQueue {
    async fn send(&self, checkpoint: &Checkpoint) -> Result<(), IngestError> {
        let body = checkpoint.to_message_body()?;
        let mut state = self.lock();
        state.next_id += 1;
        let receipt_handle = format!("msg-{}", state.next_id);
        state.messages.push_back(QueueMessage {
            body,
            receipt_handle,
        });
        Ok(())
    }

    async fn receive(&self) -> Result<Option<QueueMessage>, IngestError> {
        Ok(self.lock().messages.front().cloned())
    }

    async fn delete(&self, receipt_handle: &str) -> Result<(), IngestError> {
        let mut state = self.lock();
        state.messages.retain(|m| m.receipt_handle != receipt_handle);
        state.deleted.push(receipt_handle.to_string());
        Ok(())
    }
}
