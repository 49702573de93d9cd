//! Source staging: copy a stored object into a scratch directory.
//!
//! pdfium and soffice both need a file-system path, so the object is written
//! into a `TempDir` that lives as long as the returned [`StagedDocument`].
//! Cleanup happens on drop, including on early error returns.

use crate::error::IngestError;
use crate::storage::{ObjectLocation, ObjectStore};
use std::path::{Path, PathBuf};
use tempfile::TempDir;
use tracing::debug;

/// A source object copied to local disk.
#[derive(Debug)]
pub struct StagedDocument {
    path: PathBuf,
    _temp_dir: TempDir,
}

impl StagedDocument {
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Scratch directory holding the staged file.
    pub fn dir(&self) -> &Path {
        self._temp_dir.path()
    }
}

/// Fetch `location` into a fresh scratch directory under its own file name.
pub async fn stage_object(
    store: &dyn ObjectStore,
    location: &ObjectLocation,
) -> Result<StagedDocument, IngestError> {
    let bytes = store
        .get(location)
        .await?
        .ok_or_else(|| IngestError::ObjectNotFound {
            bucket: location.bucket.clone(),
            key: location.key.clone(),
        })?;

    let temp_dir = TempDir::new().map_err(|e| IngestError::Io {
        path: std::env::temp_dir(),
        source: e,
    })?;
    let path = temp_dir.path().join(location.file_name());
    tokio::fs::write(&path, &bytes)
        .await
        .map_err(|e| IngestError::Io {
            path: path.clone(),
            source: e,
        })?;

    debug!("Staged {} → {} ({} bytes)", location, path.display(), bytes.len());
    Ok(StagedDocument {
        path,
        _temp_dir: temp_dir,
    })
}

/// Stage a PDF, rejecting anything without the `%PDF` magic.
pub async fn stage_pdf(
    store: &dyn ObjectStore,
    location: &ObjectLocation,
) -> Result<StagedDocument, IngestError> {
    let staged = stage_object(store, location).await?;
    let head = tokio::fs::read(staged.path())
        .await
        .map_err(|e| IngestError::Io {
            path: staged.path().to_path_buf(),
            source: e,
        })?;

    if !head.starts_with(b"%PDF") {
        let mut magic = [0u8; 4];
        let n = head.len().min(4);
        magic[..n].copy_from_slice(&head[..n]);
        return Err(IngestError::NotAPdf {
            key: location.key.clone(),
            magic,
        });
    }
    Ok(staged)
}
