//! Completion service trait: the abstraction over LLM backends.
//!
//! The pipeline asks for two kinds of completions: free text, and structured
//! data matching a JSON schema. Retries, backoff and timeouts belong to the
//! implementation, never to callers.
//!
//! Implementations: OpenAI-compatible HTTP endpoints (OpenRouter, OpenAI, ...).

use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

use crate::error::ProviderError;

/// Which model tier to use for a call.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ModelSize {
    Small,
    #[default]
    Large,
}

/// The expected shape of a structured completion.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OutputShape {
    /// Schema name sent to the provider
    pub name: String,

    /// JSON Schema for the response object
    pub schema: serde_json::Value,
}

impl OutputShape {
    pub fn new(name: impl Into<String>, schema: serde_json::Value) -> Self {
        Self {
            name: name.into(),
            schema,
        }
    }
}

/// Prompt used when an implementation describes images on its own.
pub const DESCRIBE_IMAGES_PROMPT: &str = "Describe the image(s) in a couple of concise sentences that capture the most important elements of the image:";

/// The core CompletionService trait.
#[async_trait]
pub trait CompletionService: Send + Sync {
    /// A human-readable name for this service (e.g., "openrouter").
    fn name(&self) -> &str;

    /// Free-text completion of a single user prompt.
    async fn complete(&self, prompt: &str, size: ModelSize) -> Result<String, ProviderError>;

    /// Structured completion. Returns the raw JSON object; use
    /// [`complete_structured`] to decode into a Rust type.
    async fn complete_json(
        &self,
        prompt: &str,
        shape: &OutputShape,
        size: ModelSize,
    ) -> Result<serde_json::Value, ProviderError>;

    /// Free-text completion with images attached.
    ///
    /// Default implementation reports images as unsupported.
    async fn complete_with_images(
        &self,
        _prompt: &str,
        _image_urls: &[String],
    ) -> Result<String, ProviderError> {
        Err(ProviderError::NotConfigured(format!(
            "Completion service '{}' does not support images",
            self.name()
        )))
    }

    /// Short natural-language description of the given images.
    async fn describe_images(&self, image_urls: &[String]) -> Result<String, ProviderError> {
        if image_urls.is_empty() {
            return Err(ProviderError::Image("No images provided".into()));
        }
        self.complete_with_images(DESCRIBE_IMAGES_PROMPT, image_urls).await
    }

    /// Health check: can we reach the service?
    async fn health_check(&self) -> Result<bool, ProviderError> {
        Ok(true)
    }
}

/// Run a structured completion and decode it into `T`.
///
/// A response that does not deserialize into `T` is reported as
/// [`ProviderError::MalformedOutput`].
pub async fn complete_structured<T: DeserializeOwned>(
    service: &dyn CompletionService,
    prompt: &str,
    shape: &OutputShape,
    size: ModelSize,
) -> Result<T, ProviderError> {
    let value = service.complete_json(prompt, shape, size).await?;
    serde_json::from_value(value).map_err(|e| ProviderError::MalformedOutput {
        shape: shape.name.clone(),
        reason: e.to_string(),
    })
}
