//! Office document → PDF conversion via LibreOffice.
//!
//! The converted PDF is uploaded to the interim bucket, whose upload
//! notifications feed back into the PDF transcription path.

use crate::error::IngestError;
use crate::pipeline::input::stage_object;
use crate::storage::{ObjectLocation, ObjectStore};
use std::path::{Path, PathBuf};
use tokio::process::Command;
use tracing::{debug, info};

/// Key of the converted PDF: the source file stem plus `.pdf`, without any prefix.
pub fn pdf_key_for(key: &str) -> String {
    let stem = Path::new(key)
        .file_stem()
        .and_then(|s| s.to_str())
        .unwrap_or(key);
    format!("{stem}.pdf")
}

#[derive(Debug, Clone)]
pub struct OfficeConverter {
    soffice: PathBuf,
    interim_bucket: String,
}

impl OfficeConverter {
    pub fn new(soffice: impl Into<PathBuf>, interim_bucket: impl Into<String>) -> Self {
        Self {
            soffice: soffice.into(),
            interim_bucket: interim_bucket.into(),
        }
    }

    /// Convert `source` and upload the PDF. Returns where it was written.
    pub async fn convert(
        &self,
        store: &dyn ObjectStore,
        source: &ObjectLocation,
    ) -> Result<ObjectLocation, IngestError> {
        let staged = stage_object(store, source).await?;
        let out_dir = staged.dir();
        let failed = |detail: String| IngestError::ConversionFailed {
            key: source.key.clone(),
            detail,
        };

        info!("Converting {} with {}", source, self.soffice.display());
        let output = Command::new(&self.soffice)
            .args([
                "--headless",
                "--nologo",
                "--nodefault",
                "--nofirststartwizard",
                "--convert-to",
                "pdf",
            ])
            .arg(staged.path())
            .arg("--outdir")
            .arg(out_dir)
            // soffice writes its profile under $HOME
            .env("HOME", out_dir)
            .output()
            .await
            .map_err(|e| failed(format!("could not run {}: {}", self.soffice.display(), e)))?;

        if !output.status.success() {
            return Err(failed(format!(
                "soffice exited with {}: {}",
                output.status,
                String::from_utf8_lossy(&output.stderr).trim()
            )));
        }

        let pdf_name = pdf_key_for(source.file_name());
        let pdf_path = out_dir.join(&pdf_name);
        let bytes = match tokio::fs::read(&pdf_path).await {
            Ok(bytes) => bytes,
            Err(_) => {
                return Err(failed(format!(
                    "no PDF produced; stdout: {}",
                    String::from_utf8_lossy(&output.stdout).trim()
                )))
            }
        };
        debug!("Converted {} → {} ({} bytes)", source, pdf_name, bytes.len());

        let target = ObjectLocation::new(&self.interim_bucket, pdf_key_for(&source.key));
        store.put(&target, bytes).await?;
        info!("Uploaded {}", target);
        Ok(target)
    }
}
