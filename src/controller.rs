//! Checkpoint/resume controller for one PDF.
//!
//! ## Invocation lifecycle
//!
//! ```text
//! reconcile ─▶ stage ─▶ render all ─▶ for i in start..total:
//!                                       classify(i-1, i)
//!                                       describe(i, carry-over?)
//!                                       commit "Page {i+1}"
//!                                       budget low && pages left? ─▶ checkpoint(i+1), stop
//! ```
//!
//! A checkpoint is only ever sent after its page is durably in the artifact,
//! so `page_counter` always equals the number of committed pages. Any error
//! aborts the run without a checkpoint and the document stays at its last
//! committed page.

use crate::accumulator::{page_section, OutputAccumulator};
use crate::budget::BudgetProbe;
use crate::checkpoint::{Checkpoint, DocumentJob};
use crate::config::IngestConfig;
use crate::error::IngestError;
use crate::pipeline::classify::TableClassifier;
use crate::pipeline::describe::PageDescriber;
use crate::pipeline::input::stage_pdf;
use crate::pipeline::llm::VisionModel;
use crate::pipeline::render::PageRenderer;
use crate::progress::{IngestProgressCallback, NoopProgressCallback};
use crate::queue::HandoffQueue;
use crate::storage::ObjectStore;
use serde::Serialize;
use std::sync::Arc;
use std::time::Instant;
use tracing::{info, warn};

/// External services a controller talks to. Built once per process.
#[derive(Clone)]
pub struct Collaborators {
    pub store: Arc<dyn ObjectStore>,
    pub queue: Arc<dyn HandoffQueue>,
    pub renderer: Arc<dyn PageRenderer>,
    pub model: Arc<dyn VisionModel>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub enum RunStatus {
    /// Every page is in the artifact.
    Completed,
    /// The budget ran low; a successor will resume from this checkpoint.
    Suspended(Checkpoint),
}

/// Result of one controller run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RunOutcome {
    pub status: RunStatus,
    pub total_pages: usize,
    /// 0-based index this run started at.
    pub start_page: usize,
    pub pages_committed: usize,
    pub duration_ms: u64,
}

impl RunOutcome {
    pub fn checkpoint(&self) -> Option<&Checkpoint> {
        match &self.status {
            RunStatus::Suspended(cp) => Some(cp),
            RunStatus::Completed => None,
        }
    }
}

pub struct Controller {
    config: IngestConfig,
    collaborators: Collaborators,
    accumulator: OutputAccumulator,
    describer: PageDescriber,
    classifier: TableClassifier,
}

static NOOP_PROGRESS: NoopProgressCallback = NoopProgressCallback;

impl Controller {
    pub fn new(config: IngestConfig, collaborators: Collaborators) -> Self {
        let accumulator = OutputAccumulator::new(Arc::clone(&collaborators.store));
        let describer = PageDescriber::from_config(Arc::clone(&collaborators.model), &config);
        let classifier = TableClassifier::new(describer.clone());
        Self {
            config,
            collaborators,
            accumulator,
            describer,
            classifier,
        }
    }

    pub fn config(&self) -> &IngestConfig {
        &self.config
    }

    fn progress(&self) -> &dyn IngestProgressCallback {
        match &self.config.progress_callback {
            Some(cb) => cb.as_ref(),
            None => &NOOP_PROGRESS,
        }
    }

    /// Transcribe `job` from page index `start_page` until done or out of budget.
    ///
    /// `carry_over` is the text of page `start_page - 1` (empty for a fresh run).
    pub async fn run(
        &self,
        job: &DocumentJob,
        start_page: usize,
        mut carry_over: String,
        budget: &dyn BudgetProbe,
    ) -> Result<RunOutcome, IngestError> {
        let started = Instant::now();

        if start_page > 0 && self.config.reconcile_on_resume {
            self.reconcile(job, start_page, &carry_over).await?;
        }

        let staged = stage_pdf(self.collaborators.store.as_ref(), &job.source).await?;
        let pages = self.collaborators.renderer.render(staged.path()).await?;
        let total = pages.len();
        if start_page > total {
            return Err(IngestError::PageOutOfRange {
                page: start_page,
                total,
            });
        }

        info!(
            "Transcribing {} → {}: pages {}..{} of {}",
            job.source,
            job.output,
            start_page + 1,
            total,
            total
        );
        self.progress().on_invocation_start(total, start_page);

        let mut committed = 0usize;
        for i in start_page..total {
            let page_num = i + 1;
            self.progress().on_page_start(page_num, total);

            let previous = i.checked_sub(1).map(|p| &pages[p]);
            let include_previous = self
                .classifier
                .continues_table(i, previous, &pages[i])
                .await?;
            let context = (include_previous && !carry_over.is_empty()).then_some(carry_over.as_str());

            let text = self.describer.describe(page_num, &pages[i], context).await?;

            let section = page_section(page_num, &text);
            if i == 0 {
                self.accumulator.replace(&job.output, &section).await?;
            } else {
                self.accumulator.append(&job.output, &section).await?;
            }
            committed += 1;
            info!(
                "Page {}/{} committed ({} chars, table continuation: {})",
                page_num,
                total,
                text.len(),
                include_previous
            );
            self.progress().on_page_committed(page_num, total, text.len());
            carry_over = text;

            let pages_left = page_num < total;
            if pages_left && budget.remaining() < self.config.budget_threshold {
                let checkpoint = job.checkpoint(page_num, carry_over);
                self.collaborators.queue.send(&checkpoint).await?;
                info!(
                    "Budget low, suspending {} at page index {}",
                    job.source, page_num
                );
                self.progress().on_checkpoint(page_num, total);
                self.progress().on_invocation_complete(total, committed);
                return Ok(RunOutcome {
                    status: RunStatus::Suspended(checkpoint),
                    total_pages: total,
                    start_page,
                    pages_committed: committed,
                    duration_ms: started.elapsed().as_millis() as u64,
                });
            }
        }

        info!("Finished {} ({} pages)", job.output, total);
        self.progress().on_invocation_complete(total, committed);
        Ok(RunOutcome {
            status: RunStatus::Completed,
            total_pages: total,
            start_page,
            pages_committed: committed,
            duration_ms: started.elapsed().as_millis() as u64,
        })
    }

    /// Check the artifact against the checkpoint before resuming.
    ///
    /// The artifact must end with page `start_page` holding `carry_over`. A
    /// redelivered checkpoint can find the artifact ahead of it; the pages
    /// past the cursor are then cut off and transcribed again, so the cursor
    /// never moves forward. Anything else is fatal.
    async fn reconcile(
        &self,
        job: &DocumentJob,
        start_page: usize,
        carry_over: &str,
    ) -> Result<(), IngestError> {
        let found = self.accumulator.committed(&job.output).await?;
        if found.ends_with_page(start_page, carry_over) {
            return Ok(());
        }
        if let Some(prefix) = found.prefix_through(start_page, carry_over) {
            warn!(
                "Artifact {} is past page index {}; rewinding to the checkpoint",
                job.output, start_page
            );
            return self.accumulator.replace(&job.output, &prefix).await;
        }
        let committed = found.sections().len();
        if committed < start_page {
            return Err(IngestError::CheckpointAhead {
                key: job.output.key.clone(),
                next_page: start_page,
                committed,
            });
        }
        Err(IngestError::ArtifactMismatch {
            key: job.output.key.clone(),
            page: start_page,
        })
    }
}
