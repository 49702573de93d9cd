//! Object storage boundary.
//!
//! The handlers only ever need whole-object get and put; there is no append
//! primitive, which is why [`crate::accumulator`] does read-modify-write.
//! Two implementations ship with the crate:
//!
//! * [`LocalObjectStore`]: one directory per bucket under a root, writes are
//!   temp-file + rename so a reader never sees a half-written object.
//! * [`MemoryObjectStore`]: a map behind a mutex, for tests and dry runs.

use crate::error::IngestError;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use std::path::{Component, Path, PathBuf};
use std::sync::Mutex;
use tracing::debug;

/// A bucket/key pair.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ObjectLocation {
    pub bucket: String,
    pub key: String,
}

impl ObjectLocation {
    pub fn new(bucket: impl Into<String>, key: impl Into<String>) -> Self {
        Self {
            bucket: bucket.into(),
            key: key.into(),
        }
    }

    /// Final path segment of the key.
    pub fn file_name(&self) -> &str {
        self.key.rsplit('/').next().unwrap_or(&self.key)
    }

    pub(crate) fn storage_error(&self, detail: impl fmt::Display) -> IngestError {
        IngestError::Storage {
            bucket: self.bucket.clone(),
            key: self.key.clone(),
            detail: detail.to_string(),
        }
    }
}

impl fmt::Display for ObjectLocation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "s3://{}/{}", self.bucket, self.key)
    }
}

/// Whole-object storage.
#[async_trait]
pub trait ObjectStore: Send + Sync {
    /// Fetch an object, `None` if it does not exist.
    async fn get(&self, location: &ObjectLocation) -> Result<Option<Vec<u8>>, IngestError>;

    /// Create or replace an object.
    async fn put(&self, location: &ObjectLocation, data: Vec<u8>) -> Result<(), IngestError>;

    /// Check whether an object exists.
    async fn exists(&self, location: &ObjectLocation) -> Result<bool, IngestError> {
        Ok(self.get(location).await?.is_some())
    }

    /// Store name for logging.
    fn name(&self) -> &str;
}

/// Filesystem-backed store: `<root>/<bucket>/<key>`.
#[derive(Debug, Clone)]
pub struct LocalObjectStore {
    root: PathBuf,
}

impl LocalObjectStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Map a location onto a path, rejecting keys that would escape the bucket.
    fn path_for(&self, location: &ObjectLocation) -> Result<PathBuf, IngestError> {
        let invalid = |reason: &str| IngestError::InvalidKey {
            key: location.key.clone(),
            reason: reason.to_string(),
        };
        if location.key.is_empty() {
            return Err(invalid("empty key"));
        }
        if location.bucket.is_empty() || location.bucket.contains(['/', '\\']) {
            return Err(invalid("bucket must be a single path segment"));
        }
        let key_path = Path::new(&location.key);
        if key_path
            .components()
            .any(|c| !matches!(c, Component::Normal(_)))
        {
            return Err(invalid("key must be relative without '..' segments"));
        }
        Ok(self.root.join(&location.bucket).join(key_path))
    }
}

#[async_trait]
impl ObjectStore for LocalObjectStore {
    async fn get(&self, location: &ObjectLocation) -> Result<Option<Vec<u8>>, IngestError> {
        let path = self.path_for(location)?;
        match tokio::fs::read(&path).await {
            Ok(bytes) => {
                debug!("Read {} bytes from {}", bytes.len(), location);
                Ok(Some(bytes))
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(location.storage_error(e)),
        }
    }

    async fn put(&self, location: &ObjectLocation, data: Vec<u8>) -> Result<(), IngestError> {
        let path = self.path_for(location)?;
        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(|e| location.storage_error(e))?;
        }

        // Atomic write: temp file next to the target, then rename
        let tmp_path = path.with_file_name(format!(".{}.tmp", location.file_name()));
        tokio::fs::write(&tmp_path, &data)
            .await
            .map_err(|e| location.storage_error(e))?;
        tokio::fs::rename(&tmp_path, &path)
            .await
            .map_err(|e| location.storage_error(e))?;

        debug!("Wrote {} bytes to {}", data.len(), location);
        Ok(())
    }

    fn name(&self) -> &str {
        "local"
    }
}

/// In-memory store.
#[derive(Debug, Default)]
pub struct MemoryObjectStore {
    objects: Mutex<HashMap<ObjectLocation, Vec<u8>>>,
}

impl MemoryObjectStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Seed an object synchronously.
    pub fn insert(&self, location: ObjectLocation, data: impl Into<Vec<u8>>) {
        self.lock().insert(location, data.into());
    }

    /// Read an object as UTF-8 text, lossily.
    pub fn text(&self, location: &ObjectLocation) -> Option<String> {
        self.lock()
            .get(location)
            .map(|b| String::from_utf8_lossy(b).into_owned())
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, HashMap<ObjectLocation, Vec<u8>>> {
        // A poisoned map is still structurally valid
        self.objects.lock().unwrap_or_else(|p| p.into_inner())
    }
}

#[async_trait]
impl ObjectStore for MemoryObjectStore {
    async fn get(&self, location: &ObjectLocation) -> Result<Option<Vec<u8>>, IngestError> {
        Ok(self.lock().get(location).cloned())
    }

    async fn put(&self, location: &ObjectLocation, data: Vec<u8>) -> Result<(), IngestError> {
        self.lock().insert(location.clone(), data);
        Ok(())
    }

    fn name(&self) -> &str {
        "memory"
    }
}
