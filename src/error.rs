//! Error types for the edgequake-ingest library.
//!
//! Two layers reflect two distinct failure scopes:
//!
//! * [`ModelError`]: a single vision-model call failed. It carries an
//!   [`ErrorClass`] so the retry combinator in [`crate::retry`] can decide
//!   between backing off, shrinking the page image, or giving up.
//!
//! * [`IngestError`]: **Fatal** for the current invocation. Returned from
//!   the controller and handlers; the event handler turns it into a non-2xx
//!   [`crate::handler::HandlerResponse`]. No checkpoint is ever written on this
//!   path, so the document stays at its last committed page.

use crate::retry::{Classify, ErrorClass};
use once_cell::sync::Lazy;
use regex::Regex;
use std::path::PathBuf;
use thiserror::Error;

static RE_STATUS_TOO_LARGE: Lazy<Regex> = Lazy::new(|| Regex::new(r"\b413\b").unwrap());
static RE_STATUS_TRANSIENT: Lazy<Regex> = Lazy::new(|| Regex::new(r"\b(429|503)\b").unwrap());

/// All fatal errors returned by the edgequake-ingest library.
#[derive(Debug, Error)]
pub enum IngestError {
    // ── Trigger errors ────────────────────────────────────────────────────
    /// The inbound event is not a storage notification or queue delivery.
    #[error("Malformed trigger event: {0}")]
    MalformedEvent(String),

    /// A continuation message could not be turned into a checkpoint.
    #[error("Malformed checkpoint message: {reason}")]
    MalformedCheckpoint { reason: String },

    /// No handler exists for this kind of source object.
    #[error("Unsupported source object '{key}': no handler for this file type")]
    Unsupported { key: String },

    // ── Storage / queue errors ────────────────────────────────────────────
    /// The source object does not exist in the store.
    #[error("Object not found: s3://{bucket}/{key}")]
    ObjectNotFound { bucket: String, key: String },

    /// The key cannot be mapped safely onto the backing store.
    #[error("Invalid object key '{key}': {reason}")]
    InvalidKey { key: String, reason: String },

    /// A read or write against the object store failed.
    #[error("Storage error on s3://{bucket}/{key}: {detail}")]
    Storage {
        bucket: String,
        key: String,
        detail: String,
    },

    /// The hand-off queue rejected a send, receive or delete.
    #[error("Queue error: {0}")]
    Queue(String),

    // ── Resume errors ─────────────────────────────────────────────────────
    /// The checkpoint points past the pages actually present in the artifact.
    #[error(
        "Checkpoint for '{key}' resumes at page index {next_page} but the artifact only holds {committed} pages"
    )]
    CheckpointAhead {
        key: String,
        next_page: usize,
        committed: usize,
    },

    /// The artifact does not end with the page the checkpoint recorded.
    #[error("Artifact '{key}' does not match its checkpoint at page index {page}")]
    ArtifactMismatch { key: String, page: usize },

    /// The resume cursor exceeds the rendered page count.
    #[error("Page {page} is out of range (document has {total} pages)")]
    PageOutOfRange { page: usize, total: usize },

    // ── PDF errors ────────────────────────────────────────────────────────
    /// The staged file is not a PDF.
    #[error("Source '{key}' is not a valid PDF\nFirst bytes: {magic:?}")]
    NotAPdf { key: String, magic: [u8; 4] },

    /// PDF header/trailer/xref is corrupt and cannot be parsed.
    #[error("PDF '{path}' is corrupt: {detail}")]
    CorruptPdf { path: PathBuf, detail: String },

    /// PDF requires a password but none was configured.
    #[error("PDF '{path}' is encrypted and requires a password.")]
    PasswordRequired { path: PathBuf },

    /// A password was configured but it is wrong.
    #[error("Wrong password for PDF '{path}'")]
    WrongPassword { path: PathBuf },

    /// pdfium-render returned an error for a specific page.
    #[error("Rasterisation failed for page {page}: {detail}")]
    RasterisationFailed { page: usize, detail: String },

    /// Could not bind to a pdfium library.
    #[error(
        "Failed to bind to pdfium library: {0}\n\
Set PDFIUM_LIB_PATH (or --pdfium-lib) to the directory holding libpdfium."
    )]
    PdfiumBindingFailed(String),

    // ── Model errors ──────────────────────────────────────────────────────
    /// The configured provider is not initialised (missing API key etc.).
    #[error("LLM provider '{provider}' is not configured.\n{hint}")]
    ProviderNotConfigured { provider: String, hint: String },

    /// Transient failures persisted past the retry bound.
    #[error("Page {page}: model call failed after {attempts} attempts: {detail}")]
    DescribeFailed {
        page: usize,
        attempts: u32,
        detail: String,
    },

    /// The page image was still too large after every allowed shrink.
    #[error("Page {page}: image still too large after {resizes} resizes: {detail}")]
    ImageTooLarge {
        page: usize,
        resizes: u32,
        detail: String,
    },

    /// The model returned a non-retryable error.
    #[error("Page {page}: model rejected the request: {detail}")]
    ModelRejected { page: usize, detail: String },

    // ── Conversion errors ─────────────────────────────────────────────────
    /// Office-to-PDF conversion did not produce a PDF.
    #[error("Conversion of '{key}' failed: {detail}")]
    ConversionFailed { key: String, detail: String },

    // ── I/O errors ────────────────────────────────────────────────────────
    /// Local scratch I/O failed.
    #[error("I/O error on '{path}': {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    // ── Config errors ─────────────────────────────────────────────────────
    /// Builder validation failed.
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    // ── Catch-all ─────────────────────────────────────────────────────────
    /// Unexpected internal error.
    #[error("Internal error: {0}")]
    Internal(String),
}

impl IngestError {
    /// HTTP-style status code reported by the event handler.
    ///
    /// Trigger problems are the caller's fault (4xx); everything else is a
    /// processing failure (500). Never 2xx: a failed invocation must not be
    /// mistaken for partial success.
    pub fn status_code(&self) -> u16 {
        match self {
            IngestError::MalformedEvent(_) | IngestError::MalformedCheckpoint { .. } => 400,
            IngestError::ObjectNotFound { .. } => 404,
            IngestError::Unsupported { .. } | IngestError::NotAPdf { .. } => 415,
            _ => 500,
        }
    }
}

/// A failed vision-model call, tagged with how the caller should react.
#[derive(Debug, Clone, Error)]
#[error("{message}")]
pub struct ModelError {
    pub class: ErrorClass,
    pub message: String,
}

impl ModelError {
    pub fn new(class: ErrorClass, message: impl Into<String>) -> Self {
        Self {
            class,
            message: message.into(),
        }
    }

    /// Classify a provider error message.
    ///
    /// Providers surface failures as strings, so classification keys off the
    /// wording: pixel/size limits are `TooLarge`, throttling and timeouts are
    /// `Transient`, everything else is `Fatal`.
    pub fn from_message(message: impl Into<String>) -> Self {
        let message = message.into();
        let lower = message.to_lowercase();
        let class = if lower.contains("image exceeds")
            || lower.contains("exceeds max pixels")
            || lower.contains("too large")
            || RE_STATUS_TOO_LARGE.is_match(&lower)
        {
            ErrorClass::TooLarge
        } else if lower.contains("timeout")
            || lower.contains("timed out")
            || RE_STATUS_TRANSIENT.is_match(&lower)
            || lower.contains("rate limit")
            || lower.contains("throttl")
            || lower.contains("overloaded")
        {
            ErrorClass::Transient
        } else {
            ErrorClass::Fatal
        };
        Self { class, message }
    }
}

impl Classify for ModelError {
    fn class(&self) -> ErrorClass {
        self.class
    }
}
