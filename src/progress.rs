//! Progress-callback trait for per-page ingestion events.
//!
//! Inject an [`Arc<dyn IngestProgressCallback>`] via
//! [`crate::config::IngestConfigBuilder::progress_callback`] to receive
//! events as the controller commits each page.
//!
//! Callbacks are the least-invasive integration point: callers can forward
//! events to a terminal progress bar, a metrics sink, or a job record without
//! the library knowing how the host communicates.
//!
//! # Example
//!
//! ```rust
//! use edgequake_ingest::{IngestConfig, IngestProgressCallback};
//! use std::sync::{Arc, atomic::{AtomicUsize, Ordering}};
//!
//! struct CountingCallback {
//!     committed: Arc<AtomicUsize>,
//! }
//!
//! impl IngestProgressCallback for CountingCallback {
//!     fn on_page_committed(&self, page_num: usize, total_pages: usize, text_len: usize) {
//!         self.committed.fetch_add(1, Ordering::SeqCst);
//!         eprintln!("Page {}/{} committed ({} bytes)", page_num, total_pages, text_len);
//!     }
//! }
//!
//! let counter = Arc::new(CountingCallback {
//!     committed: Arc::new(AtomicUsize::new(0)),
//! });
//!
//! let config = IngestConfig::builder()
//!     .progress_callback(counter as Arc<dyn IngestProgressCallback>)
//!     .build()
//!     .unwrap();
//! ```

use std::sync::Arc;

/// Called by the controller as it processes each page.
///
/// All methods have default no-op implementations so callers only override
/// what they care about. Pages are processed strictly in order, one at a time.
pub trait IngestProgressCallback: Send + Sync {
    /// Called once after rendering, before the first page of this invocation.
    ///
    /// # Arguments
    /// * `total_pages`: pages in the whole document
    /// * `start_page` : 0-based index this invocation resumes at
    fn on_invocation_start(&self, total_pages: usize, start_page: usize) {
        let _ = (total_pages, start_page);
    }

    /// Called before a page is classified and described.
    ///
    /// # Arguments
    /// * `page_num`   : 1-indexed page number
    /// * `total_pages`: total pages in the document
    fn on_page_start(&self, page_num: usize, total_pages: usize) {
        let _ = (page_num, total_pages);
    }

    /// Called once the page's text is durably in the output artifact.
    ///
    /// # Arguments
    /// * `page_num`   : 1-indexed page number
    /// * `total_pages`: total pages
    /// * `text_len`   : byte length of the transcription
    fn on_page_committed(&self, page_num: usize, total_pages: usize, text_len: usize) {
        let _ = (page_num, total_pages, text_len);
    }

    /// Called when the budget ran low and a checkpoint was enqueued.
    ///
    /// # Arguments
    /// * `next_page_index`: 0-based index the successor will resume at
    /// * `total_pages`    : total pages
    fn on_checkpoint(&self, next_page_index: usize, total_pages: usize) {
        let _ = (next_page_index, total_pages);
    }

    /// Called once when the invocation stops, whether finished or suspended.
    ///
    /// # Arguments
    /// * `total_pages`: total pages in the document
    /// * `committed`  : pages committed by this invocation
    fn on_invocation_complete(&self, total_pages: usize, committed: usize) {
        let _ = (total_pages, committed);
    }
}

/// A no-op implementation for callers that don't need progress events.
pub struct NoopProgressCallback;

impl IngestProgressCallback for NoopProgressCallback {}

/// Convenience alias matching the type stored in [`crate::config::IngestConfig`].
pub type ProgressCallback = Arc<dyn IngestProgressCallback>;
