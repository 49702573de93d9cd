//! Vision-model boundary.
//!
//! [`VisionModel`] is the single call shape every stage needs: a prompt plus
//! an optional page image in, text out. Failures come back as [`ModelError`]
//! already classified, so callers never inspect provider-specific errors.
//! Retry and resize policy live above this layer, in
//! [`crate::pipeline::describe`] and [`crate::retry`].

use crate::config::IngestConfig;
use crate::error::{IngestError, ModelError};
use crate::pipeline::encode::encode_page;
use crate::retry::ErrorClass;
use async_trait::async_trait;
use edgequake_llm::{ChatMessage, CompletionOptions, LLMProvider, ProviderFactory};
use image::DynamicImage;
use std::sync::Arc;
use std::time::Instant;
use tracing::debug;

#[async_trait]
pub trait VisionModel: Send + Sync {
    /// Run one completion. `image` is attached to the user turn when present.
    async fn complete(&self, prompt: &str, image: Option<&DynamicImage>)
        -> Result<String, ModelError>;
}

/// [`VisionModel`] over an `edgequake-llm` provider.
pub struct LlmVisionModel {
    provider: Arc<dyn LLMProvider>,
    temperature: f32,
    max_tokens: usize,
}

impl LlmVisionModel {
    pub fn new(provider: Arc<dyn LLMProvider>, temperature: f32, max_tokens: usize) -> Self {
        Self {
            provider,
            temperature,
            max_tokens,
        }
    }
}

fn completion_options(temperature: f32, max_tokens: usize) -> CompletionOptions {
    CompletionOptions {
        temperature: Some(temperature),
        max_tokens: Some(max_tokens),
        ..Default::default()
    }
}

#[async_trait]
impl VisionModel for LlmVisionModel {
    async fn complete(
        &self,
        prompt: &str,
        image: Option<&DynamicImage>,
    ) -> Result<String, ModelError> {
        let message = match image {
            Some(img) => {
                let data = encode_page(img).map_err(|e| {
                    ModelError::new(ErrorClass::Fatal, format!("PNG encoding failed: {e}"))
                })?;
                ChatMessage::user_with_images(prompt, vec![data])
            }
            None => ChatMessage::user(prompt),
        };

        let start = Instant::now();
        let options = completion_options(self.temperature, self.max_tokens);
        let response = self
            .provider
            .chat(&[message], Some(&options))
            .await
            .map_err(|e| ModelError::from_message(e.to_string()))?;

        debug!(
            "{} input tokens, {} output tokens, {:?}",
            response.prompt_tokens,
            response.completion_tokens,
            start.elapsed()
        );
        Ok(response.content)
    }
}

/// Build the vision model named by the configuration.
pub fn resolve_vision_model(config: &IngestConfig) -> Result<LlmVisionModel, IngestError> {
    let provider = resolve_provider(config)?;
    Ok(LlmVisionModel::new(
        provider,
        config.temperature,
        config.max_tokens,
    ))
}

fn create_vision_provider(
    provider_name: &str,
    model: &str,
) -> Result<Arc<dyn LLMProvider>, IngestError> {
    ProviderFactory::create_llm_provider(provider_name, model).map_err(|e| {
        IngestError::ProviderNotConfigured {
            provider: provider_name.to_string(),
            hint: format!("{e}"),
        }
    })
}

/// Resolve the provider, most specific first:
///
/// 1. a pre-built `config.provider`;
/// 2. `config.provider_name` with `config.model`;
/// 3. `EDGEQUAKE_LLM_PROVIDER` + `EDGEQUAKE_MODEL` when both are set;
/// 4. `ProviderFactory::from_env` auto-detection.
fn resolve_provider(config: &IngestConfig) -> Result<Arc<dyn LLMProvider>, IngestError> {
    if let Some(ref provider) = config.provider {
        return Ok(Arc::clone(provider));
    }

    if let Some(ref name) = config.provider_name {
        let model = config.model.as_deref().unwrap_or("gpt-4.1-nano");
        return create_vision_provider(name, model);
    }

    if let (Ok(prov), Ok(model)) = (
        std::env::var("EDGEQUAKE_LLM_PROVIDER"),
        std::env::var("EDGEQUAKE_MODEL"),
    ) {
        if !prov.is_empty() && !model.is_empty() {
            return create_vision_provider(&prov, &model);
        }
    }

    let (llm_provider, _embedding) =
        ProviderFactory::from_env().map_err(|e| IngestError::ProviderNotConfigured {
            provider: "auto".to_string(),
            hint: format!(
                "No LLM provider could be auto-detected from environment.\n\
                Set OPENAI_API_KEY, ANTHROPIC_API_KEY, or configure a provider.\n\
                Error: {}",
                e
            ),
        })?;

    Ok(llm_provider)
}
