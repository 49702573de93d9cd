//! Media transcription completion.
//!
//! When a transcription result lands in storage, it is joined with the frame
//! labels detected for the same video, summarised by the model, and written
//! to the output bucket as one text artifact.

use crate::error::{IngestError, ModelError};
use crate::pipeline::llm::VisionModel;
use crate::prompts::insights_prompt;
use crate::retry::{attempt_with_policy, RetryError, RetryPolicy};
use crate::storage::{ObjectLocation, ObjectStore};
use serde::Deserialize;
use std::sync::Arc;
use tracing::info;

#[derive(Debug, Deserialize)]
struct TranscriptionResult {
    results: TranscriptionResults,
}

#[derive(Debug, Deserialize)]
struct TranscriptionResults {
    transcripts: Vec<TranscriptEntry>,
}

#[derive(Debug, Deserialize)]
struct TranscriptEntry {
    transcript: String,
}

/// Extract the first transcript from a transcription result document.
pub fn parse_transcript(raw: &[u8]) -> Result<String, String> {
    let parsed: TranscriptionResult =
        serde_json::from_slice(raw).map_err(|e| format!("not a transcription result: {e}"))?;
    parsed
        .results
        .transcripts
        .into_iter()
        .next()
        .map(|t| t.transcript)
        .ok_or_else(|| "transcription result has no transcripts".to_string())
}

/// Key of the frame labels for a transcription key.
pub fn labels_key_for(transcript_key: &str) -> String {
    transcript_key.replace("transcription", "labels")
}

/// Key of the combined text artifact.
pub fn output_key_for(transcript_key: &str) -> String {
    transcript_key.replace(".json", ".txt")
}

/// Render the combined artifact.
pub fn combined_text(transcript: &str, labels: &serde_json::Value, insights: &str) -> String {
    let labels = serde_json::to_string_pretty(labels).unwrap_or_else(|_| labels.to_string());
    format!("Transcript:\n{transcript}\n\nVideo Labels:\n{labels}\n\nInsights:\n{insights}\n")
}

pub struct TranscriptSummarizer {
    model: Arc<dyn VisionModel>,
    retry: RetryPolicy,
    frames_bucket: String,
    output_bucket: String,
}

impl TranscriptSummarizer {
    pub fn new(
        model: Arc<dyn VisionModel>,
        retry: RetryPolicy,
        frames_bucket: impl Into<String>,
        output_bucket: impl Into<String>,
    ) -> Self {
        Self {
            model,
            retry,
            frames_bucket: frames_bucket.into(),
            output_bucket: output_bucket.into(),
        }
    }

    /// Summarise `source` and write the artifact. Returns where it was written.
    pub async fn summarize(
        &self,
        store: &dyn ObjectStore,
        source: &ObjectLocation,
    ) -> Result<ObjectLocation, IngestError> {
        let raw = fetch(store, source).await?;
        let transcript = parse_transcript(&raw).map_err(|detail| IngestError::ConversionFailed {
            key: source.key.clone(),
            detail,
        })?;

        let labels_loc = ObjectLocation::new(&self.frames_bucket, labels_key_for(&source.key));
        let labels_raw = fetch(store, &labels_loc).await?;
        let labels: serde_json::Value =
            serde_json::from_slice(&labels_raw).map_err(|e| IngestError::ConversionFailed {
                key: labels_loc.key.clone(),
                detail: format!("labels are not JSON: {e}"),
            })?;

        let prompt: Arc<str> = Arc::from(insights_prompt(&transcript, &labels.to_string()));
        let insights = attempt_with_policy(
            &self.retry,
            (),
            |_| {
                let model = Arc::clone(&self.model);
                let prompt = Arc::clone(&prompt);
                async move { model.complete(&prompt, None).await }
            },
            |_| None,
        )
        .await
        .map_err(|e| summary_error(&source.key, e))?;

        let target = ObjectLocation::new(&self.output_bucket, output_key_for(&source.key));
        let text = combined_text(&transcript, &labels, &insights);
        store.put(&target, text.into_bytes()).await?;
        info!("Wrote transcript summary {}", target);
        Ok(target)
    }
}

async fn fetch(store: &dyn ObjectStore, loc: &ObjectLocation) -> Result<Vec<u8>, IngestError> {
    store
        .get(loc)
        .await?
        .ok_or_else(|| IngestError::ObjectNotFound {
            bucket: loc.bucket.clone(),
            key: loc.key.clone(),
        })
}

fn summary_error(key: &str, err: RetryError<ModelError>) -> IngestError {
    IngestError::ConversionFailed {
        key: key.to_string(),
        detail: format!("insights: {err}"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::MemoryObjectStore;
    use async_trait::async_trait;
    use image::DynamicImage;
    use serde_json::json;
    use std::sync::Mutex;

    struct EchoModel {
        prompts: Mutex<Vec<String>>,
    }

    #[async_trait]
    impl VisionModel for EchoModel {
        async fn complete(
            &self,
            prompt: &str,
            image: Option<&DynamicImage>,
        ) -> Result<String, ModelError> {
            assert!(image.is_none());
            self.prompts.lock().unwrap().push(prompt.to_string());
            Ok("A cooking demo.".to_string())
        }
    }

    #[test]
    fn key_derivations() {
        assert_eq!(labels_key_for("clip_transcription.json"), "clip_labels.json");
        assert_eq!(output_key_for("clip_transcription.json"), "clip_transcription.txt");
    }

    #[test]
    fn transcript_parsing() {
        let raw = json!({"results": {"transcripts": [{"transcript": "hello there"}]}});
        assert_eq!(parse_transcript(raw.to_string().as_bytes()).unwrap(), "hello there");
        let empty = json!({"results": {"transcripts": []}});
        assert!(parse_transcript(empty.to_string().as_bytes()).is_err());
    }

    #[tokio::test]
    async fn summary_combines_transcript_labels_and_insights() {
        let store = MemoryObjectStore::new();
        let src = ObjectLocation::new("transcripts", "clip_transcription.json");
        store.insert(
            src.clone(),
            json!({"results": {"transcripts": [{"transcript": "add the flour"}]}}).to_string(),
        );
        store.insert(
            ObjectLocation::new("frames", "clip_labels.json"),
            json!([{"Name": "Bowl"}]).to_string(),
        );

        let model = Arc::new(EchoModel {
            prompts: Mutex::new(Vec::new()),
        });
        let summarizer = TranscriptSummarizer::new(model.clone(), RetryPolicy::default(), "frames", "out");
        let target = summarizer.summarize(&store, &src).await.unwrap();

        assert_eq!(target, ObjectLocation::new("out", "clip_transcription.txt"));
        let text = store.text(&target).unwrap();
        assert!(text.starts_with("Transcript:\nadd the flour\n\nVideo Labels:\n"));
        assert!(text.contains("\"Name\": \"Bowl\""));
        assert!(text.ends_with("Insights:\nA cooking demo.\n"));
        assert!(model.prompts.lock().unwrap()[0].contains("add the flour"));
    }

    #[tokio::test]
    async fn missing_labels_is_not_found() {
        let store = MemoryObjectStore::new();
        let src = ObjectLocation::new("transcripts", "clip_transcription.json");
        store.insert(
            src.clone(),
            json!({"results": {"transcripts": [{"transcript": "x"}]}}).to_string(),
        );
        let summarizer = TranscriptSummarizer::new(
            Arc::new(EchoModel {
                prompts: Mutex::new(Vec::new()),
            }),
            RetryPolicy::default(),
            "frames",
            "out",
        );
        let err = summarizer.summarize(&store, &src).await.unwrap_err();
        assert_eq!(err.status_code(), 404);
    }
}
