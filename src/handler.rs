//! Invocation entry point.
//!
//! [`EventHandler::handle`] takes one raw trigger event and a budget probe,
//! routes it by trigger and document kind, and always returns a
//! [`HandlerResponse`]: 200 with a JSON outcome, or the error's status code
//! with its message.

use crate::budget::BudgetProbe;
use crate::checkpoint::DocumentJob;
use crate::config::IngestConfig;
use crate::controller::{Collaborators, Controller, RunOutcome};
use crate::error::IngestError;
use crate::event::{DocumentKind, Trigger};
use crate::office::OfficeConverter;
use crate::pipeline::llm::resolve_vision_model;
use crate::pipeline::render::PdfiumRenderer;
use crate::queue::SpoolQueue;
use crate::storage::{LocalObjectStore, ObjectLocation};
use crate::transcript::TranscriptSummarizer;
use serde::Serialize;
use serde_json::json;
use std::sync::Arc;
use tracing::{error, info};

/// What an invocation did.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum InvocationOutcome {
    /// PDF pages were transcribed (possibly suspended with a checkpoint).
    Transcribed {
        output: ObjectLocation,
        run: RunOutcome,
    },
    /// An office document was converted and re-submitted as a PDF.
    Converted { pdf: ObjectLocation },
    /// A transcription result was summarised.
    Summarized { output: ObjectLocation },
}

/// Wire result of an invocation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct HandlerResponse {
    #[serde(rename = "statusCode")]
    pub status_code: u16,
    /// JSON-encoded outcome or `{"error": ...}`.
    pub body: String,
}

impl HandlerResponse {
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status_code)
    }
}

pub struct EventHandler {
    config: IngestConfig,
    collaborators: Collaborators,
    controller: Controller,
    office: OfficeConverter,
    summarizer: TranscriptSummarizer,
}

impl EventHandler {
    pub fn new(config: IngestConfig, collaborators: Collaborators) -> Self {
        let controller = Controller::new(config.clone(), collaborators.clone());
        let office = OfficeConverter::new(&config.soffice_path, &config.interim_bucket);
        let summarizer = TranscriptSummarizer::new(
            Arc::clone(&collaborators.model),
            config.retry.clone(),
            &config.frames_bucket,
            &config.output_bucket,
        );
        Self {
            config,
            collaborators,
            controller,
            office,
            summarizer,
        }
    }

    /// Wire up the local store, spool queue, pdfium and the configured model.
    pub fn from_config(config: IngestConfig) -> Result<Self, IngestError> {
        let model = resolve_vision_model(&config)?;
        let renderer = PdfiumRenderer::new(config.max_rendered_pixels)
            .with_password(config.password.clone())
            .with_library_dir(config.pdfium_library_path.clone());
        let collaborators = Collaborators {
            store: Arc::new(LocalObjectStore::new(&config.storage_root)),
            queue: Arc::new(SpoolQueue::new(&config.queue_endpoint)),
            renderer: Arc::new(renderer),
            model: Arc::new(model),
        };
        info!(
            "Handler ready (store: {}, region: {})",
            collaborators.store.name(),
            config.region.as_deref().unwrap_or("unset")
        );
        Ok(Self::new(config, collaborators))
    }

    pub fn collaborators(&self) -> &Collaborators {
        &self.collaborators
    }

    /// Process one event.
    pub async fn process(
        &self,
        event: &serde_json::Value,
        budget: &dyn BudgetProbe,
    ) -> Result<InvocationOutcome, IngestError> {
        match Trigger::from_event(event)? {
            Trigger::Continuation {
                checkpoint,
                receipt_handle,
            } => {
                self.collaborators.queue.delete(&receipt_handle).await?;
                info!(
                    "Continuing {} at page index {}",
                    checkpoint.source_key, checkpoint.page_counter
                );
                let job = DocumentJob::from_checkpoint(&checkpoint, &self.config.output_bucket);
                let run = self
                    .controller
                    .run(&job, checkpoint.page_counter, checkpoint.previous_text, budget)
                    .await?;
                Ok(InvocationOutcome::Transcribed {
                    output: job.output,
                    run,
                })
            }
            Trigger::Fresh { source } => match DocumentKind::from_key(&source.key) {
                DocumentKind::Pdf => {
                    info!("New document {}", source);
                    let job = DocumentJob::fresh(source, &self.config.output_bucket);
                    let run = self.controller.run(&job, 0, String::new(), budget).await?;
                    Ok(InvocationOutcome::Transcribed {
                        output: job.output,
                        run,
                    })
                }
                DocumentKind::Office => {
                    let pdf = self
                        .office
                        .convert(self.collaborators.store.as_ref(), &source)
                        .await?;
                    Ok(InvocationOutcome::Converted { pdf })
                }
                DocumentKind::Transcript => {
                    let output = self
                        .summarizer
                        .summarize(self.collaborators.store.as_ref(), &source)
                        .await?;
                    Ok(InvocationOutcome::Summarized { output })
                }
                DocumentKind::Unsupported => Err(IngestError::Unsupported { key: source.key }),
            },
        }
    }

    /// Process one event and report the result in wire form.
    pub async fn handle(&self, event: &serde_json::Value, budget: &dyn BudgetProbe) -> HandlerResponse {
        match self.process(event, budget).await {
            Ok(outcome) => match serde_json::to_string(&outcome) {
                Ok(body) => HandlerResponse {
                    status_code: 200,
                    body,
                },
                Err(e) => HandlerResponse {
                    status_code: 500,
                    body: json!({ "error": format!("outcome serialization failed: {e}") }).to_string(),
                },
            },
            Err(e) => {
                error!("Invocation failed: {}", e);
                HandlerResponse {
                    status_code: e.status_code(),
                    body: json!({ "error": e.to_string() }).to_string(),
                }
            }
        }
    }
}
