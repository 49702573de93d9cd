//! Page description under the retry policy.
//!
//! Every image-bearing model call goes through [`PageDescriber::ask`]:
//! transient failures back off and retry, "too large" rejections shrink the
//! image by `resize_factor` and retry at once. Whatever survives the policy
//! becomes a fatal [`IngestError`] tagged with the page number.

use crate::config::IngestConfig;
use crate::error::{IngestError, ModelError};
use crate::pipeline::encode::shrink;
use crate::pipeline::llm::VisionModel;
use crate::prompts::transcribe_prompt;
use crate::retry::{attempt_with_policy, RetryError, RetryPolicy};
use image::DynamicImage;
use std::sync::Arc;
use tracing::debug;

#[derive(Clone)]
pub struct PageDescriber {
    model: Arc<dyn VisionModel>,
    retry: RetryPolicy,
    resize_factor: f32,
}

impl PageDescriber {
    pub fn new(model: Arc<dyn VisionModel>, retry: RetryPolicy, resize_factor: f32) -> Self {
        Self {
            model,
            retry,
            resize_factor,
        }
    }

    pub fn from_config(model: Arc<dyn VisionModel>, config: &IngestConfig) -> Self {
        Self::new(model, config.retry.clone(), config.resize_factor)
    }

    /// Transcribe one page. `carry_over` is the previous page's text and is
    /// only embedded in the prompt when non-empty.
    ///
    /// `page_num` is 1-based and used for errors and logs only.
    pub async fn describe(
        &self,
        page_num: usize,
        image: &DynamicImage,
        carry_over: Option<&str>,
    ) -> Result<String, IngestError> {
        let prompt = transcribe_prompt(carry_over);
        let text = self.ask(page_num, &prompt, image).await?;
        debug!("Page {}: transcribed {} chars", page_num, text.len());
        Ok(text)
    }

    /// Send `prompt` with the page image, applying the retry policy.
    pub async fn ask(
        &self,
        page_num: usize,
        prompt: &str,
        image: &DynamicImage,
    ) -> Result<String, IngestError> {
        let prompt: Arc<str> = Arc::from(prompt);
        let factor = self.resize_factor;

        let result = attempt_with_policy(
            &self.retry,
            image.clone(),
            |img: DynamicImage| {
                let model = Arc::clone(&self.model);
                let prompt = Arc::clone(&prompt);
                async move { model.complete(&prompt, Some(&img)).await }
            },
            |img| shrink(img, factor),
        )
        .await;

        result.map_err(|e| page_error(page_num, e))
    }
}

fn page_error(page: usize, err: RetryError<ModelError>) -> IngestError {
    match err {
        RetryError::RetriesExhausted { attempts, last } => IngestError::DescribeFailed {
            page,
            attempts,
            detail: last.message,
        },
        RetryError::ResizesExhausted { resizes, last } => IngestError::ImageTooLarge {
            page,
            resizes,
            detail: last.message,
        },
        RetryError::Fatal(last) => IngestError::ModelRejected {
            page,
            detail: last.message,
        },
    }
}
