//! Configuration types for the ingestion handlers.
//!
//! Every process-wide setting (queue endpoint, buckets, region, model, retry
//! bounds) lives in one [`IngestConfig`], built once per process and handed to
//! [`crate::handler::EventHandler`]. Nothing is read from module-level
//! globals, so two handlers with different settings can share a process and
//! tests can construct exactly the configuration they need.

use crate::error::IngestError;
use crate::progress::ProgressCallback;
use crate::retry::RetryPolicy;
use edgequake_llm::LLMProvider;
use std::fmt;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

/// Configuration for the ingestion handlers.
///
/// Built via [`IngestConfig::builder()`] or using [`IngestConfig::default()`].
///
/// # Example
/// ```rust
/// use edgequake_ingest::IngestConfig;
/// use std::time::Duration;
///
/// let config = IngestConfig::builder()
///     .output_bucket("rag-output")
///     .budget_threshold(Duration::from_secs(120))
///     .model("gpt-4.1-nano")
///     .build()
///     .unwrap();
/// ```
#[derive(Clone)]
pub struct IngestConfig {
    /// Hand-off queue endpoint. For the bundled spool queue this is a directory.
    pub queue_endpoint: PathBuf,

    /// Root directory of the local object store (one sub-directory per bucket).
    pub storage_root: PathBuf,

    /// Bucket receiving transcription artifacts. Default: "output".
    pub output_bucket: String,

    /// Bucket receiving PDFs converted from office documents. Default: "interim-pdf".
    ///
    /// Uploads here re-trigger the PDF pipeline.
    pub interim_bucket: String,

    /// Bucket holding per-video frame labels. Default: "frames".
    pub frames_bucket: String,

    /// Deployment region, recorded for provider selection and logs.
    pub region: Option<String>,

    /// LLM model identifier. If None, uses the provider default.
    pub model: Option<String>,

    /// LLM provider name (e.g. "openai", "anthropic", "ollama").
    pub provider_name: Option<String>,

    /// Pre-constructed LLM provider. Takes precedence over `provider_name`.
    pub provider: Option<Arc<dyn LLMProvider>>,

    /// Sampling temperature. Default: 0.0.
    ///
    /// Transcription should be faithful to the page, not creative.
    pub temperature: f32,

    /// Maximum tokens the model may generate per page. Default: 4096.
    pub max_tokens: usize,

    /// Retry bounds for every model call. See [`RetryPolicy`].
    pub retry: RetryPolicy,

    /// Scale applied to a page image after an "image too large" rejection. Default: 0.9.
    pub resize_factor: f32,

    /// Remaining-budget threshold below which the controller checkpoints. Default: 120 s.
    ///
    /// Must cover one full page of classification, description and commit,
    /// otherwise the invocation can be killed before the checkpoint is sent.
    pub budget_threshold: Duration,

    /// Longest edge of a rendered page in pixels. Default: 1024.
    pub max_rendered_pixels: u32,

    /// PDF user password for encrypted documents.
    pub password: Option<String>,

    /// Directory holding the pdfium shared library. If None, the system library is used.
    pub pdfium_library_path: Option<PathBuf>,

    /// Compare the checkpoint cursor with the artifact before resuming. Default: true.
    pub reconcile_on_resume: bool,

    /// Path of the LibreOffice `soffice` binary used for office conversions.
    pub soffice_path: PathBuf,

    /// Per-page progress events.
    pub progress_callback: Option<ProgressCallback>,
}

impl Default for IngestConfig {
    fn default() -> Self {
        Self {
            queue_endpoint: PathBuf::from("spool/queue"),
            storage_root: PathBuf::from("spool/buckets"),
            output_bucket: "output".to_string(),
            interim_bucket: "interim-pdf".to_string(),
            frames_bucket: "frames".to_string(),
            region: None,
            model: None,
            provider_name: None,
            provider: None,
            temperature: 0.0,
            max_tokens: 4096,
            retry: RetryPolicy::default(),
            resize_factor: 0.9,
            budget_threshold: Duration::from_secs(120),
            max_rendered_pixels: 1024,
            password: None,
            pdfium_library_path: None,
            reconcile_on_resume: true,
            soffice_path: PathBuf::from("/opt/libreoffice7.5/program/soffice"),
            progress_callback: None,
        }
    }
}

impl fmt::Debug for IngestConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("IngestConfig")
            .field("queue_endpoint", &self.queue_endpoint)
            .field("storage_root", &self.storage_root)
            .field("output_bucket", &self.output_bucket)
            .field("interim_bucket", &self.interim_bucket)
            .field("frames_bucket", &self.frames_bucket)
            .field("region", &self.region)
            .field("model", &self.model)
            .field("provider_name", &self.provider_name)
            .field("provider", &self.provider.as_ref().map(|_| "<dyn LLMProvider>"))
            .field("temperature", &self.temperature)
            .field("max_tokens", &self.max_tokens)
            .field("retry", &self.retry)
            .field("resize_factor", &self.resize_factor)
            .field("budget_threshold", &self.budget_threshold)
            .field("max_rendered_pixels", &self.max_rendered_pixels)
            .field("reconcile_on_resume", &self.reconcile_on_resume)
            .finish()
    }
}

impl IngestConfig {
    /// Create a new builder for `IngestConfig`.
    pub fn builder() -> IngestConfigBuilder {
        IngestConfigBuilder {
            config: Self::default(),
        }
    }
}

/// Builder for [`IngestConfig`].
#[derive(Debug)]
pub struct IngestConfigBuilder {
    config: IngestConfig,
}

impl IngestConfigBuilder {
    pub fn queue_endpoint(mut self, endpoint: impl Into<PathBuf>) -> Self {
        self.config.queue_endpoint = endpoint.into();
        self
    }

    pub fn storage_root(mut self, root: impl Into<PathBuf>) -> Self {
        self.config.storage_root = root.into();
        self
    }

    pub fn output_bucket(mut self, bucket: impl Into<String>) -> Self {
        self.config.output_bucket = bucket.into();
        self
    }

    pub fn interim_bucket(mut self, bucket: impl Into<String>) -> Self {
        self.config.interim_bucket = bucket.into();
        self
    }

    pub fn frames_bucket(mut self, bucket: impl Into<String>) -> Self {
        self.config.frames_bucket = bucket.into();
        self
    }

    pub fn region(mut self, region: impl Into<String>) -> Self {
        self.config.region = Some(region.into());
        self
    }

    pub fn model(mut self, model: impl Into<String>) -> Self {
        self.config.model = Some(model.into());
        self
    }

    pub fn provider_name(mut self, name: impl Into<String>) -> Self {
        self.config.provider_name = Some(name.into());
        self
    }

    pub fn provider(mut self, provider: Arc<dyn LLMProvider>) -> Self {
        self.config.provider = Some(provider);
        self
    }

    pub fn temperature(mut self, t: f32) -> Self {
        self.config.temperature = t.clamp(0.0, 2.0);
        self
    }

    pub fn max_tokens(mut self, n: usize) -> Self {
        self.config.max_tokens = n;
        self
    }

    pub fn retry(mut self, policy: RetryPolicy) -> Self {
        self.config.retry = policy;
        self
    }

    /// Clamped to 20.
    pub fn max_retries(mut self, n: u32) -> Self {
        self.config.retry.max_retries = n.min(20);
        self
    }

    pub fn retry_base_delay(mut self, delay: Duration) -> Self {
        self.config.retry.base_delay = delay;
        self
    }

    pub fn max_resizes(mut self, n: u32) -> Self {
        self.config.retry.max_resizes = n;
        self
    }

    pub fn resize_factor(mut self, factor: f32) -> Self {
        self.config.resize_factor = factor;
        self
    }

    pub fn budget_threshold(mut self, threshold: Duration) -> Self {
        self.config.budget_threshold = threshold;
        self
    }

    pub fn max_rendered_pixels(mut self, px: u32) -> Self {
        self.config.max_rendered_pixels = px.max(100);
        self
    }

    pub fn password(mut self, pwd: impl Into<String>) -> Self {
        self.config.password = Some(pwd.into());
        self
    }

    pub fn pdfium_library_path(mut self, dir: impl Into<PathBuf>) -> Self {
        self.config.pdfium_library_path = Some(dir.into());
        self
    }

    pub fn reconcile_on_resume(mut self, v: bool) -> Self {
        self.config.reconcile_on_resume = v;
        self
    }

    pub fn soffice_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.config.soffice_path = path.into();
        self
    }

    pub fn progress_callback(mut self, cb: ProgressCallback) -> Self {
        self.config.progress_callback = Some(cb);
        self
    }

    /// Build the configuration, validating constraints.
    pub fn build(self) -> Result<IngestConfig, IngestError> {
        let c = &self.config;
        if !(c.resize_factor > 0.0 && c.resize_factor < 1.0) {
            return Err(IngestError::InvalidConfig(format!(
                "resize factor must be in (0, 1), got {}",
                c.resize_factor
            )));
        }
        if c.retry.backoff_multiplier < 1.0 {
            return Err(IngestError::InvalidConfig(format!(
                "backoff multiplier must be ≥ 1, got {}",
                c.retry.backoff_multiplier
            )));
        }
        if c.output_bucket.trim().is_empty() {
            return Err(IngestError::InvalidConfig(
                "output bucket must not be empty".into(),
            ));
        }
        Ok(self.config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_invocation_limits() {
        let c = IngestConfig::default();
        assert_eq!(c.budget_threshold, Duration::from_secs(120));
        assert_eq!(c.max_rendered_pixels, 1024);
        assert_eq!(c.retry.max_retries, 3);
        assert!(c.reconcile_on_resume);
    }

    #[test]
    fn builder_clamps_and_sets() {
        let c = IngestConfig::builder()
            .temperature(5.0)
            .max_rendered_pixels(10)
            .max_retries(1)
            .retry_base_delay(Duration::from_millis(5))
            .output_bucket("rag")
            .build()
            .unwrap();
        assert_eq!(c.temperature, 2.0);
        assert_eq!(c.max_rendered_pixels, 100);
        assert_eq!(c.retry.max_retries, 1);
        assert_eq!(c.retry.base_delay, Duration::from_millis(5));
        assert_eq!(c.output_bucket, "rag");

        let c = IngestConfig::builder().max_retries(u32::MAX).build().unwrap();
        assert_eq!(c.retry.max_retries, 20);
    }

    #[test]
    fn builder_rejects_bad_resize_factor() {
        let err = IngestConfig::builder().resize_factor(1.5).build().unwrap_err();
        assert!(err.to_string().contains("resize factor"));
    }

    #[test]
    fn builder_rejects_empty_output_bucket() {
        assert!(IngestConfig::builder().output_bucket("  ").build().is_err());
    }

    #[test]
    fn debug_hides_provider() {
        let s = format!("{:?}", IngestConfig::default());
        assert!(s.contains("IngestConfig"));
        assert!(s.contains("budget_threshold"));
    }
}
