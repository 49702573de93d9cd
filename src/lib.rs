//! # edgequake-ingest
//!
//! Event-triggered ingestion of heterogeneous documents into plain-text
//! artifacts for retrieval pipelines.
//!
//! ## Why checkpoints?
//!
//! Transcribing a long PDF page by page with a Vision Language Model takes
//! far longer than one bounded invocation is allowed to run. The controller
//! therefore watches its remaining budget, and when it runs low after a
//! committed page it enqueues a [`Checkpoint`] and stops. A successor
//! invocation picks the checkpoint up and resumes at the exact next page, so
//! the final artifact is identical to a single uninterrupted pass.
//!
//! ## Flow
//!
//! ```text
//! storage notification ──┐
//!                        ├─▶ EventHandler ─┬─ .pdf    ─▶ Controller ─▶ artifact
//! queued checkpoint ─────┘                 ├─ office  ─▶ soffice ─▶ interim PDF
//!                                          ├─ .json   ─▶ transcript summary
//!                                          └─ other   ─▶ 415
//! ```
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use edgequake_ingest::{Deadline, EventHandler, IngestConfig};
//! use std::time::Duration;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let config = IngestConfig::builder()
//!         .storage_root("spool/buckets")
//!         .queue_endpoint("spool/queue")
//!         .build()?;
//!     let handler = EventHandler::from_config(config)?;
//!
//!     let event = serde_json::json!({"Records": [{"s3": {
//!         "bucket": {"name": "raw"},
//!         "object": {"key": "reports/annual.pdf"}
//!     }}]});
//!     let response = handler.handle(&event, &Deadline::after(Duration::from_secs(900))).await;
//!     println!("{} {}", response.status_code, response.body);
//!     Ok(())
//! }
//! ```
//!
//! ## Feature Flags
//!
//! | Feature | Default | Description |
//! |---------|---------|-------------|
//! | `cli`   | on      | Enables the `ingest` binary (clap + anyhow + tracing-subscriber + indicatif) |

// ── Modules ──────────────────────────────────────────────────────────────

pub mod accumulator;
pub mod budget;
pub mod checkpoint;
pub mod config;
pub mod controller;
pub mod error;
pub mod event;
pub mod handler;
pub mod office;
pub mod pipeline;
pub mod progress;
pub mod prompts;
pub mod queue;
pub mod retry;
pub mod storage;
pub mod transcript;

// ── Re-exports ───────────────────────────────────────────────────────────

pub use accumulator::{page_section, OutputAccumulator};
pub use budget::{BudgetProbe, Deadline};
pub use checkpoint::{Checkpoint, DocumentJob};
pub use config::{IngestConfig, IngestConfigBuilder};
pub use controller::{Collaborators, Controller, RunOutcome, RunStatus};
pub use error::{IngestError, ModelError};
pub use event::{DocumentKind, Trigger};
pub use handler::{EventHandler, HandlerResponse, InvocationOutcome};
pub use pipeline::llm::VisionModel;
pub use pipeline::render::PageRenderer;
pub use progress::{IngestProgressCallback, NoopProgressCallback, ProgressCallback};
pub use queue::{HandoffQueue, MemoryQueue, QueueMessage, SpoolQueue};
pub use retry::{ErrorClass, RetryPolicy};
pub use storage::{LocalObjectStore, MemoryObjectStore, ObjectLocation, ObjectStore};
