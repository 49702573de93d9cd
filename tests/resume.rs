//! End-to-end checkpoint/resume scenarios.
//!
//! These run the real handler, controller, classifier and describer against
//! an in-memory store and queue, a renderer that paints each page a distinct
//! colour, and a scripted model that recognises the page by that colour.
//! No pdfium or network access is needed.

use async_trait::async_trait;
use edgequake_ingest::prompts::{LEADING_TABLE_PROMPT, TRAILING_TABLE_PROMPT};
use edgequake_ingest::{
    page_section, BudgetProbe, Checkpoint, Collaborators, ErrorClass, EventHandler,
    HandoffQueue, IngestConfig, IngestError, IngestProgressCallback, InvocationOutcome,
    MemoryObjectStore, MemoryQueue, ModelError, ObjectLocation, PageRenderer, RunStatus,
    VisionModel,
};
use image::{DynamicImage, Rgba, RgbaImage};
use serde_json::json;
use std::collections::{HashMap, HashSet};
use std::path::Path;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio_test::{assert_err, assert_ok};

// ── Test doubles ─────────────────────────────────────────────────────────────

/// Renders `pages` solid images; page N has red channel N.
struct FakeRenderer {
    pages: usize,
}

#[async_trait]
impl PageRenderer for FakeRenderer {
    async fn render(&self, _pdf_path: &Path) -> Result<Vec<DynamicImage>, IngestError> {
        Ok((1..=self.pages)
            .map(|n| {
                DynamicImage::ImageRgba8(RgbaImage::from_pixel(8, 8, Rgba([n as u8, 0, 0, 255])))
            })
            .collect())
    }
}

fn page_of(image: &DynamicImage) -> usize {
    image.to_rgba8().get_pixel(0, 0)[0] as usize
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum Call {
    Trailing(usize),
    Leading(usize),
    Transcribe { page: usize, context: Option<String> },
}

/// Answers classifier questions from fixed sets of 1-based page numbers and
/// transcribes page N as "Text of page N", marking pages given carry-over.
#[derive(Default)]
struct ScriptedModel {
    trailing_tables: HashSet<usize>,
    leading_tables: HashSet<usize>,
    texts: HashMap<usize, String>,
    fail_on: Option<usize>,
    calls: Mutex<Vec<Call>>,
}

impl ScriptedModel {
    fn calls(&self) -> Vec<Call> {
        self.calls.lock().unwrap().clone()
    }

    fn transcriptions(&self) -> Vec<(usize, Option<String>)> {
        self.calls()
            .into_iter()
            .filter_map(|c| match c {
                Call::Transcribe { page, context } => Some((page, context)),
                _ => None,
            })
            .collect()
    }
}

fn extract_context(prompt: &str) -> Option<String> {
    let start = prompt.find("<previous_page>\n")? + "<previous_page>\n".len();
    let end = prompt.find("\n</previous_page>")?;
    Some(prompt[start..end].to_string())
}

#[async_trait]
impl VisionModel for ScriptedModel {
    async fn complete(
        &self,
        prompt: &str,
        image: Option<&DynamicImage>,
    ) -> Result<String, ModelError> {
        let page = image.map(page_of).unwrap_or_default();
        let yes_no = |yes: bool| if yes { "Yes".to_string() } else { "No".to_string() };

        if prompt == TRAILING_TABLE_PROMPT {
            self.calls.lock().unwrap().push(Call::Trailing(page));
            return Ok(yes_no(self.trailing_tables.contains(&page)));
        }
        if prompt == LEADING_TABLE_PROMPT {
            self.calls.lock().unwrap().push(Call::Leading(page));
            return Ok(yes_no(self.leading_tables.contains(&page)));
        }

        let context = extract_context(prompt);
        self.calls.lock().unwrap().push(Call::Transcribe {
            page,
            context: context.clone(),
        });
        if self.fail_on == Some(page) {
            return Err(ModelError::new(ErrorClass::Fatal, "model refused the page"));
        }
        let base = self
            .texts
            .get(&page)
            .cloned()
            .unwrap_or_else(|| format!("Text of page {page}"));
        Ok(match context {
            Some(_) => format!("{base} (continued)"),
            None => base,
        })
    }
}

#[derive(Default)]
struct CountingProgress {
    committed: AtomicUsize,
    checkpoints: AtomicUsize,
}

impl IngestProgressCallback for CountingProgress {
    fn on_page_committed(&self, _page_num: usize, _total_pages: usize, _text_len: usize) {
        self.committed.fetch_add(1, Ordering::SeqCst);
    }

    fn on_checkpoint(&self, _next_page_index: usize, _total_pages: usize) {
        self.checkpoints.fetch_add(1, Ordering::SeqCst);
    }
}

// ── Harness ──────────────────────────────────────────────────────────────────

const SOURCE_KEY: &str = "reports/q3 results.pdf";
const OUTPUT_KEY: &str = "reports/q3 results.pdf.txt";

struct Harness {
    store: Arc<MemoryObjectStore>,
    queue: Arc<MemoryQueue>,
    model: Arc<ScriptedModel>,
    progress: Arc<CountingProgress>,
    handler: EventHandler,
}

impl Harness {
    fn new(pages: usize, model: ScriptedModel) -> Self {
        let store = Arc::new(MemoryObjectStore::new());
        store.insert(source(), b"%PDF-1.7\n%fake".to_vec());
        let queue = Arc::new(MemoryQueue::new());
        let model = Arc::new(model);
        let progress = Arc::new(CountingProgress::default());

        let config = IngestConfig::builder()
            .output_bucket("output")
            .retry_base_delay(Duration::from_millis(1))
            .progress_callback(progress.clone() as Arc<dyn IngestProgressCallback>)
            .build()
            .unwrap();
        let collaborators = Collaborators {
            store: store.clone(),
            queue: queue.clone(),
            renderer: Arc::new(FakeRenderer { pages }),
            model: model.clone(),
        };
        Self {
            store,
            queue,
            model,
            progress,
            handler: EventHandler::new(config, collaborators),
        }
    }

    fn artifact(&self) -> Option<String> {
        self.store.text(&output())
    }

    /// Feed every queued checkpoint back in, each with a fresh budget.
    async fn drain(&self, budget: impl Fn() -> Box<dyn BudgetProbe>) -> usize {
        let mut invocations = 0;
        while let Some(message) = self.queue.receive().await.unwrap() {
            let response = self.handler.handle(&message.to_event(), budget().as_ref()).await;
            assert_eq!(response.status_code, 200, "{}", response.body);
            invocations += 1;
        }
        invocations
    }
}

fn source() -> ObjectLocation {
    ObjectLocation::new("raw", SOURCE_KEY)
}

fn output() -> ObjectLocation {
    ObjectLocation::new("output", OUTPUT_KEY)
}

fn upload_event() -> serde_json::Value {
    json!({"Records": [{"s3": {
        "bucket": {"name": "raw"},
        "object": {"key": "reports/q3+results.pdf"}
    }}]})
}

fn continuation_event(checkpoint: &Checkpoint, receipt_handle: &str) -> serde_json::Value {
    json!({"Records": [{
        "body": checkpoint.to_message_body().unwrap(),
        "receiptHandle": receipt_handle,
    }]})
}

fn checkpoint_at(page_counter: usize, previous_text: &str) -> Checkpoint {
    Checkpoint {
        source_bucket: "raw".into(),
        source_key: SOURCE_KEY.into(),
        s3_output_key: OUTPUT_KEY.into(),
        page_counter,
        previous_text: previous_text.into(),
    }
}

fn plenty() -> impl BudgetProbe {
    || Duration::from_secs(900)
}

/// Budget that reports less than the threshold from the `n`th probe on.
fn low_after(n: usize) -> impl BudgetProbe {
    let probes = AtomicUsize::new(0);
    move || {
        if probes.fetch_add(1, Ordering::SeqCst) + 1 >= n {
            Duration::from_secs(60)
        } else {
            Duration::from_secs(900)
        }
    }
}

fn artifact_of(pages: &[&str]) -> String {
    pages
        .iter()
        .enumerate()
        .map(|(i, text)| page_section(i + 1, text))
        .collect()
}

// ── Scenarios ────────────────────────────────────────────────────────────────

#[tokio::test]
async fn one_page_document_produces_exact_artifact() {
    let h = Harness::new(
        1,
        ScriptedModel {
            texts: HashMap::from([(1, "Hello".to_string())]),
            ..Default::default()
        },
    );

    let response = h.handler.handle(&upload_event(), &plenty()).await;
    assert_eq!(response.status_code, 200, "{}", response.body);

    assert_eq!(h.artifact().as_deref(), Some("Page 1\nHello\n\n"));
    assert!(h.queue.pending().is_empty());
    // A single page has no predecessor, so no classifier calls at all
    assert_eq!(
        h.model.calls(),
        vec![Call::Transcribe {
            page: 1,
            context: None
        }]
    );
}

#[tokio::test]
async fn low_budget_checkpoints_after_committed_page() {
    let h = Harness::new(5, ScriptedModel::default());

    let outcome = assert_ok!(h.handler.process(&upload_event(), &low_after(3)).await);
    let run = match outcome {
        InvocationOutcome::Transcribed { output: out, run } => {
            assert_eq!(out, output());
            run
        }
        other => panic!("unexpected outcome: {other:?}"),
    };

    let expected = checkpoint_at(3, "Text of page 3");
    assert_eq!(run.status, RunStatus::Suspended(expected.clone()));
    assert_eq!(run.pages_committed, 3);
    assert_eq!(run.total_pages, 5);

    let artifact = h.artifact().unwrap();
    assert_eq!(
        artifact,
        artifact_of(&["Text of page 1", "Text of page 2", "Text of page 3"])
    );
    assert!(!artifact.contains("Page 4"));
    assert!(!artifact.contains("Page 5"));

    // Cursor equals the number of committed pages
    assert_eq!(h.queue.pending(), vec![expected]);
    assert_eq!(h.progress.committed.load(Ordering::SeqCst), 3);
    assert_eq!(h.progress.checkpoints.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn no_checkpoint_when_the_last_page_finishes() {
    let h = Harness::new(3, ScriptedModel::default());
    // The third probe would report a low budget, but the last page is never probed
    let run = match h.handler.process(&upload_event(), &low_after(3)).await.unwrap() {
        InvocationOutcome::Transcribed { run, .. } => run,
        other => panic!("unexpected outcome: {other:?}"),
    };
    assert_eq!(run.status, RunStatus::Completed);
    assert!(h.queue.pending().is_empty());
}

#[tokio::test]
async fn resumed_run_matches_single_pass() {
    let script = || ScriptedModel {
        trailing_tables: HashSet::from([2, 4]),
        leading_tables: HashSet::from([3, 4, 5]),
        ..Default::default()
    };

    let single = Harness::new(5, script());
    let response = single.handler.handle(&upload_event(), &plenty()).await;
    assert_eq!(response.status_code, 200);

    let resumed = Harness::new(5, script());
    let response = resumed.handler.handle(&upload_event(), &low_after(2)).await;
    assert_eq!(response.status_code, 200);
    let invocations = resumed
        .drain(|| Box::new(low_after(2)) as Box<dyn BudgetProbe>)
        .await;
    assert_eq!(invocations, 2);

    assert_eq!(resumed.artifact(), single.artifact());
    assert_eq!(
        resumed.artifact().unwrap(),
        artifact_of(&[
            "Text of page 1",
            "Text of page 2",
            "Text of page 3 (continued)",
            "Text of page 4",
            "Text of page 5 (continued)",
        ])
    );

    // Page 3 starts the second invocation and still gets page 2 as context
    assert_eq!(
        resumed.model.transcriptions(),
        single.model.transcriptions()
    );
    assert!(resumed
        .model
        .transcriptions()
        .contains(&(3, Some("Text of page 2".to_string()))));
    assert_eq!(resumed.queue.deleted().len(), 2);
}

#[tokio::test]
async fn continuation_without_leading_table_passes_no_context() {
    let h = Harness::new(
        6,
        ScriptedModel {
            trailing_tables: HashSet::from([4]),
            ..Default::default()
        },
    );
    h.store.insert(
        output(),
        artifact_of(&["p1", "p2", "p3", "Revenue: $1M"]),
    );

    let event = continuation_event(&checkpoint_at(4, "Revenue: $1M"), "rh-42");
    let response = h.handler.handle(&event, &plenty()).await;
    assert_eq!(response.status_code, 200, "{}", response.body);

    // The message is acknowledged and page 5 is described without carry-over
    assert_eq!(h.queue.deleted(), vec!["rh-42".to_string()]);
    let calls = h.model.calls();
    assert_eq!(calls[0], Call::Trailing(4));
    assert_eq!(calls[1], Call::Leading(5));
    assert_eq!(
        calls[2],
        Call::Transcribe {
            page: 5,
            context: None
        }
    );

    assert_eq!(
        h.artifact().unwrap(),
        artifact_of(&[
            "p1",
            "p2",
            "p3",
            "Revenue: $1M",
            "Text of page 5",
            "Text of page 6"
        ])
    );
}

#[tokio::test]
async fn counter_four_of_five_pages_transcribes_only_the_last_page() {
    let h = Harness::new(
        5,
        ScriptedModel {
            trailing_tables: HashSet::from([4]),
            ..Default::default()
        },
    );
    h.store.insert(
        output(),
        artifact_of(&["p1", "p2", "p3", "Revenue: $1M"]),
    );

    let event = continuation_event(&checkpoint_at(4, "Revenue: $1M"), "rh-5");
    let outcome = assert_ok!(h.handler.process(&event, &plenty()).await);
    let run = match outcome {
        InvocationOutcome::Transcribed { run, .. } => run,
        other => panic!("unexpected outcome: {other:?}"),
    };
    assert_eq!(run.status, RunStatus::Completed);
    assert_eq!(run.pages_committed, 1);

    assert_eq!(
        h.model.calls(),
        vec![
            Call::Trailing(4),
            Call::Leading(5),
            Call::Transcribe {
                page: 5,
                context: None
            }
        ]
    );
    assert_eq!(
        h.artifact().unwrap(),
        artifact_of(&["p1", "p2", "p3", "Revenue: $1M", "Text of page 5"])
    );
    assert!(h.queue.pending().is_empty());
}

#[tokio::test]
async fn classifier_short_circuits_without_trailing_table() {
    let h = Harness::new(3, ScriptedModel::default());
    h.handler.handle(&upload_event(), &plenty()).await;
    let leading = h
        .model
        .calls()
        .into_iter()
        .filter(|c| matches!(c, Call::Leading(_)))
        .count();
    assert_eq!(leading, 0);
}

#[tokio::test]
async fn describer_failure_leaves_last_committed_page_and_no_checkpoint() {
    let h = Harness::new(
        5,
        ScriptedModel {
            fail_on: Some(3),
            ..Default::default()
        },
    );

    let err = assert_err!(h.handler.process(&upload_event(), &plenty()).await);
    assert!(matches!(err, IngestError::ModelRejected { page: 3, .. }), "{err}");
    assert_eq!(err.status_code(), 500);

    assert_eq!(
        h.artifact().unwrap(),
        artifact_of(&["Text of page 1", "Text of page 2"])
    );
    assert!(h.queue.pending().is_empty());
}

#[tokio::test]
async fn malformed_checkpoint_is_rejected_before_any_work() {
    let h = Harness::new(3, ScriptedModel::default());
    let event = json!({"Records": [{
        "body": r#"{"source_bucket":"raw","source_key":"x.pdf","page_counter":2}"#,
        "receiptHandle": "rh-1",
    }]});

    let response = h.handler.handle(&event, &plenty()).await;
    assert_eq!(response.status_code, 400);
    assert!(response.body.contains("error"));
    assert!(h.model.calls().is_empty());
    assert!(h.artifact().is_none());
    assert!(h.queue.deleted().is_empty());
}

#[tokio::test]
async fn redelivered_checkpoint_rewinds_pages_past_its_cursor() {
    let h = Harness::new(
        5,
        ScriptedModel {
            trailing_tables: HashSet::from([4]),
            leading_tables: HashSet::from([5]),
            ..Default::default()
        },
    );
    h.store.insert(
        output(),
        artifact_of(&["Text of page 1", "Text of page 2", "Text of page 3", "| total | 9 |"]),
    );

    // Stale message: says page index 2, artifact already holds 4 pages
    let event = continuation_event(&checkpoint_at(2, "Text of page 2"), "rh-old");
    let outcome = h.handler.process(&event, &plenty()).await.unwrap();
    match outcome {
        InvocationOutcome::Transcribed { run, .. } => {
            assert_eq!(run.start_page, 2);
            assert_eq!(run.pages_committed, 3);
            assert_eq!(run.status, RunStatus::Completed);
        }
        other => panic!("unexpected outcome: {other:?}"),
    }

    assert_eq!(
        h.model.transcriptions(),
        vec![
            (3, None),
            (4, None),
            (5, Some("Text of page 4".to_string()))
        ]
    );
    assert_eq!(
        h.artifact().unwrap(),
        artifact_of(&[
            "Text of page 1",
            "Text of page 2",
            "Text of page 3",
            "Text of page 4",
            "Text of page 5 (continued)"
        ])
    );
}

#[tokio::test]
async fn page_text_containing_the_next_header_does_not_skip_a_page() {
    let toc = "Contents\n\nPage 2\nIntroduction";
    let script = || ScriptedModel {
        texts: HashMap::from([(1, toc.to_string())]),
        ..Default::default()
    };

    let single = Harness::new(3, script());
    single.handler.handle(&upload_event(), &plenty()).await;

    let resumed = Harness::new(3, script());
    let run = match resumed.handler.process(&upload_event(), &low_after(1)).await.unwrap() {
        InvocationOutcome::Transcribed { run, .. } => run,
        other => panic!("unexpected outcome: {other:?}"),
    };
    assert_eq!(run.status, RunStatus::Suspended(checkpoint_at(1, toc)));

    let invocations = resumed
        .drain(|| Box::new(plenty()) as Box<dyn BudgetProbe>)
        .await;
    assert_eq!(invocations, 1);

    let expected = artifact_of(&[toc, "Text of page 2", "Text of page 3"]);
    assert_eq!(resumed.artifact().unwrap(), expected);
    assert_eq!(resumed.artifact(), single.artifact());
    let pages: Vec<usize> = resumed.model.transcriptions().into_iter().map(|(p, _)| p).collect();
    assert_eq!(pages, vec![1, 2, 3]);
}

#[tokio::test]
async fn checkpoint_text_disagreeing_with_the_artifact_is_fatal() {
    let h = Harness::new(4, ScriptedModel::default());
    let written = artifact_of(&["Text of page 1", "Text of page 2"]);
    h.store.insert(output(), written.clone());

    let event = continuation_event(&checkpoint_at(2, "a different page"), "rh-9");
    let err = h.handler.process(&event, &plenty()).await.unwrap_err();
    assert!(matches!(err, IngestError::ArtifactMismatch { page: 2, .. }), "{err}");
    assert_eq!(err.status_code(), 500);
    assert!(h.model.calls().is_empty());
    assert_eq!(h.artifact().unwrap(), written);
}

#[tokio::test]
async fn checkpoint_past_the_artifact_is_fatal() {
    let h = Harness::new(5, ScriptedModel::default());
    h.store.insert(output(), artifact_of(&["Text of page 1"]));

    let event = continuation_event(&checkpoint_at(3, "Text of page 3"), "rh-1");
    let err = h.handler.process(&event, &plenty()).await.unwrap_err();
    assert!(matches!(
        err,
        IngestError::CheckpointAhead {
            next_page: 3,
            committed: 1,
            ..
        }
    ));
    assert!(h.model.calls().is_empty());
}

#[tokio::test]
async fn fresh_upload_replaces_a_stale_artifact() {
    let h = Harness::new(2, ScriptedModel::default());
    h.store.insert(output(), "left over from an aborted run");
    h.handler.handle(&upload_event(), &plenty()).await;
    assert_eq!(
        h.artifact().unwrap(),
        artifact_of(&["Text of page 1", "Text of page 2"])
    );
}

#[tokio::test]
async fn unsupported_media_is_415() {
    let h = Harness::new(1, ScriptedModel::default());
    let event = json!({"Records": [{"s3": {
        "bucket": {"name": "raw"},
        "object": {"key": "videos/clip.mp4"}
    }}]});
    let response = h.handler.handle(&event, &plenty()).await;
    assert_eq!(response.status_code, 415);
}

#[tokio::test]
async fn missing_source_is_404() {
    let h = Harness::new(1, ScriptedModel::default());
    let event = json!({"Records": [{"s3": {
        "bucket": {"name": "raw"},
        "object": {"key": "missing.pdf"}
    }}]});
    let response = h.handler.handle(&event, &plenty()).await;
    assert_eq!(response.status_code, 404);
    assert!(response.body.contains("missing.pdf"));
}
