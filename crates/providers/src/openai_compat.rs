//! OpenAI-compatible completion service.
//!
//! Works with: OpenRouter, OpenAI, Ollama, vLLM, and any endpoint exposing
//! `/v1/chat/completions`.
//!
//! Supports:
//! - Free-text completions
//! - Structured completions via `response_format: json_schema`
//! - Image attachments (fetched and inlined as base64 data URLs)

use async_trait::async_trait;
use base64::Engine;
use base64::engine::general_purpose::STANDARD as BASE64;
use serde::Deserialize;
use steward_config::ModelsConfig;
use steward_core::error::ProviderError;
use steward_core::provider::{CompletionService, ModelSize, OutputShape};
use tracing::{debug, trace, warn};

/// Image content types the vision models accept.
const SUPPORTED_IMAGE_TYPES: [&str; 4] = ["image/jpeg", "image/png", "image/gif", "image/webp"];

const DEFAULT_TIMEOUT_SECS: u64 = 120;

/// Largest image body fetched for a vision call.
pub const DEFAULT_MAX_IMAGE_BYTES: usize = 5 * 1024 * 1024;

/// Model names used per call type.
#[derive(Debug, Clone)]
pub struct ModelTiers {
    pub chat: String,
    pub small: String,
    pub large: String,
    pub vision: String,
}

impl ModelTiers {
    /// Model for a free-text completion. Large text calls go to the chat model.
    pub fn text(&self, size: ModelSize) -> &str {
        match size {
            ModelSize::Small => &self.small,
            ModelSize::Large => &self.chat,
        }
    }

    /// Model for a structured completion.
    pub fn structured(&self, size: ModelSize) -> &str {
        match size {
            ModelSize::Small => &self.small,
            ModelSize::Large => &self.large,
        }
    }
}

impl From<&ModelsConfig> for ModelTiers {
    fn from(config: &ModelsConfig) -> Self {
        Self {
            chat: config.chat.clone(),
            small: config.small.clone(),
            large: config.large.clone(),
            vision: config.vision.clone(),
        }
    }
}

impl Default for ModelTiers {
    fn default() -> Self {
        Self::from(&ModelsConfig::default())
    }
}

/// An OpenAI-compatible completion service.
pub struct OpenAiCompatProvider {
    name: String,
    base_url: String,
    api_key: String,
    models: ModelTiers,
    client: reqwest::Client,
    max_image_bytes: usize,
}

impl OpenAiCompatProvider {
    /// Create a new OpenAI-compatible provider.
    pub fn new(
        name: impl Into<String>,
        base_url: impl Into<String>,
        api_key: impl Into<String>,
    ) -> Self {
        Self {
            name: name.into(),
            base_url: base_url.into().trim_end_matches('/').to_string(),
            api_key: api_key.into(),
            models: ModelTiers::default(),
            client: build_client(DEFAULT_TIMEOUT_SECS),
            max_image_bytes: DEFAULT_MAX_IMAGE_BYTES,
        }
    }

    /// Create an OpenRouter provider (convenience constructor).
    pub fn openrouter(api_key: impl Into<String>) -> Self {
        Self::new("openrouter", "https://openrouter.ai/api/v1", api_key)
    }

    /// Create an OpenAI provider (convenience constructor).
    pub fn openai(api_key: impl Into<String>) -> Self {
        Self::new("openai", "https://api.openai.com/v1", api_key)
    }

    pub fn with_models(mut self, models: ModelTiers) -> Self {
        self.models = models;
        self
    }

    pub fn with_timeout(mut self, timeout_secs: u64) -> Self {
        self.client = build_client(timeout_secs);
        self
    }

    pub fn with_max_image_bytes(mut self, max_image_bytes: usize) -> Self {
        self.max_image_bytes = max_image_bytes;
        self
    }

    pub fn models(&self) -> &ModelTiers {
        &self.models
    }

    /// POST a chat completion body and return the first choice's content.
    async fn chat(&self, body: serde_json::Value) -> Result<String, ProviderError> {
        let url = format!("{}/chat/completions", self.base_url);

        let response = self
            .client
            .post(&url)
            .header("Authorization", format!("Bearer {}", self.api_key))
            .header("Content-Type", "application/json")
            .json(&body)
            .send()
            .await
            .map_err(map_send_error)?;

        let status = response.status().as_u16();

        if status == 429 {
            return Err(ProviderError::RateLimited {
                retry_after_secs: 5,
            });
        }

        if status == 401 || status == 403 {
            return Err(ProviderError::AuthenticationFailed(
                "Invalid API key or insufficient permissions".into(),
            ));
        }

        if status != 200 {
            let error_body = response.text().await.unwrap_or_default();
            warn!(provider = %self.name, status, body = %error_body, "Provider returned error");
            return Err(ProviderError::ApiError {
                status_code: status,
                message: error_body,
            });
        }

        let api_response: ApiResponse =
            response.json().await.map_err(|e| ProviderError::ApiError {
                status_code: 200,
                message: format!("Failed to parse response: {e}"),
            })?;

        first_choice_content(api_response)
    }

    /// Fetch every URL and keep the ones that decode as supported images.
    async fn fetch_images(&self, image_urls: &[String]) -> Vec<EncodedImage> {
        let fetches = image_urls.iter().map(|url| self.fetch_image(url));
        futures::future::join_all(fetches)
            .await
            .into_iter()
            .flatten()
            .collect()
    }

    async fn fetch_image(&self, url: &str) -> Option<EncodedImage> {
        let mut response = match self.client.get(url).send().await {
            Ok(r) if r.status().is_success() => r,
            Ok(r) => {
                warn!(url, status = r.status().as_u16(), "Image fetch failed");
                return None;
            }
            Err(e) => {
                warn!(url, error = %e, "Image fetch failed");
                return None;
            }
        };

        let header = response
            .headers()
            .get(reqwest::header::CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .unwrap_or_default()
            .to_string();

        let Some(content_type) = supported_image_type(&header) else {
            warn!(url, content_type = %header, "Unsupported image type");
            return None;
        };

        if let Some(declared) = response.content_length() {
            if declared > self.max_image_bytes as u64 {
                warn!(url, bytes = declared, limit = self.max_image_bytes, "Image too large, skipping");
                return None;
            }
        }

        // Content-Length may be absent or wrong, so the cap also applies while reading.
        let mut body = Vec::new();
        loop {
            match response.chunk().await {
                Ok(Some(chunk)) => {
                    if body.len() + chunk.len() > self.max_image_bytes {
                        warn!(url, limit = self.max_image_bytes, "Image too large, skipping");
                        return None;
                    }
                    body.extend_from_slice(&chunk);
                }
                Ok(None) => break,
                Err(e) => {
                    warn!(url, error = %e, "Failed to read image body");
                    return None;
                }
            }
        }

        Some(EncodedImage {
            content_type,
            base64: BASE64.encode(&body),
        })
    }
}

#[async_trait]
impl CompletionService for OpenAiCompatProvider {
    fn name(&self) -> &str {
        &self.name
    }

    async fn complete(&self, prompt: &str, size: ModelSize) -> Result<String, ProviderError> {
        let model = self.models.text(size);
        debug!(provider = %self.name, model, "Sending completion request");
        self.chat(text_body(model, prompt)).await
    }

    async fn complete_json(
        &self,
        prompt: &str,
        shape: &OutputShape,
        size: ModelSize,
    ) -> Result<serde_json::Value, ProviderError> {
        let model = self.models.structured(size);
        debug!(provider = %self.name, model, shape = %shape.name, "Sending structured completion request");

        let content = self.chat(structured_body(model, prompt, shape)).await?;
        trace!(content = %content, "Structured completion content");

        serde_json::from_str(&content).map_err(|e| ProviderError::MalformedOutput {
            shape: shape.name.clone(),
            reason: e.to_string(),
        })
    }

    async fn complete_with_images(
        &self,
        prompt: &str,
        image_urls: &[String],
    ) -> Result<String, ProviderError> {
        let images = self.fetch_images(image_urls).await;
        if images.is_empty() {
            return Err(ProviderError::Image("Failed to process images".into()));
        }

        let model = &self.models.vision;
        debug!(provider = %self.name, model = %model, images = images.len(), "Sending image completion request");
        self.chat(image_body(model, prompt, &images)).await
    }

    async fn health_check(&self) -> Result<bool, ProviderError> {
        let url = format!("{}/models", self.base_url);
        let response = self
            .client
            .get(&url)
            .header("Authorization", format!("Bearer {}", self.api_key))
            .send()
            .await
            .map_err(map_send_error)?;

        Ok(response.status().is_success())
    }
}

fn build_client(timeout_secs: u64) -> reqwest::Client {
    reqwest::Client::builder()
        .timeout(std::time::Duration::from_secs(timeout_secs))
        .build()
        .unwrap_or_else(|e| {
            warn!(error = %e, "Failed to build configured HTTP client, using defaults");
            reqwest::Client::new()
        })
}

fn map_send_error(e: reqwest::Error) -> ProviderError {
    if e.is_timeout() {
        ProviderError::Timeout(e.to_string())
    } else {
        ProviderError::Network(e.to_string())
    }
}

/// Normalize a Content-Type header to a supported image type.
fn supported_image_type(header: &str) -> Option<&'static str> {
    let mime = header.split(';').next().unwrap_or_default().trim();
    SUPPORTED_IMAGE_TYPES
        .iter()
        .find(|t| t.eq_ignore_ascii_case(mime))
        .copied()
}

fn text_body(model: &str, prompt: &str) -> serde_json::Value {
    serde_json::json!({
        "model": model,
        "messages": [{ "role": "user", "content": prompt }],
        "stream": false,
    })
}

fn structured_body(model: &str, prompt: &str, shape: &OutputShape) -> serde_json::Value {
    serde_json::json!({
        "model": model,
        "messages": [{ "role": "user", "content": prompt }],
        "response_format": {
            "type": "json_schema",
            "json_schema": {
                "name": shape.name,
                "schema": shape.schema,
            },
        },
        "stream": false,
    })
}

fn image_body(model: &str, prompt: &str, images: &[EncodedImage]) -> serde_json::Value {
    let mut content = vec![serde_json::json!({ "type": "text", "text": prompt })];
    content.extend(images.iter().map(|image| {
        serde_json::json!({
            "type": "image_url",
            "image_url": { "url": image.data_url() },
        })
    }));

    serde_json::json!({
        "model": model,
        "messages": [{ "role": "user", "content": content }],
        "max_tokens": 1000,
        "stream": false,
    })
}

fn first_choice_content(response: ApiResponse) -> Result<String, ProviderError> {
    response
        .choices
        .into_iter()
        .next()
        .and_then(|choice| choice.message.content)
        .filter(|content| !content.is_empty())
        .ok_or_else(|| ProviderError::ApiError {
            status_code: 200,
            message: "No content in response".into(),
        })
}

struct EncodedImage {
    content_type: &'static str,
    base64: String,
}

impl EncodedImage {
    fn data_url(&self) -> String {
        format!("data:{};base64,{}", self.content_type, self.base64)
    }
}

// --- OpenAI API types ---

#[derive(Debug, Deserialize)]
struct ApiResponse {
    #[serde(default)]
    choices: Vec<ApiChoice>,
}

#[derive(Debug, Deserialize)]
struct ApiChoice {
    message: ApiMessage,
}

#[derive(Debug, Deserialize)]
struct ApiMessage {
    #[serde(default)]
    content: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn openrouter_constructor() {
        let p = OpenAiCompatProvider::openrouter("sk-test");
        assert_eq!(p.name(), "openrouter");
        assert!(p.base_url.contains("openrouter.ai"));
    }

    #[test]
    fn trailing_slash_trimmed() {
        let p = OpenAiCompatProvider::new("custom", "http://localhost:8000/v1/", "");
        assert_eq!(p.base_url, "http://localhost:8000/v1");
    }

    #[test]
    fn model_tiers_follow_size() {
        let tiers = ModelTiers {
            chat: "chat".into(),
            small: "small".into(),
            large: "large".into(),
            vision: "vision".into(),
        };
        assert_eq!(tiers.text(ModelSize::Large), "chat");
        assert_eq!(tiers.text(ModelSize::Small), "small");
        assert_eq!(tiers.structured(ModelSize::Large), "large");
        assert_eq!(tiers.structured(ModelSize::Small), "small");
    }

    #[test]
    fn structured_body_carries_schema() {
        let shape = OutputShape::new(
            "route_decision",
            serde_json::json!({"type": "object", "required": ["selectedRoute"]}),
        );
        let body = structured_body("openai/gpt-4o", "classify", &shape);
        assert_eq!(body["response_format"]["type"], "json_schema");
        assert_eq!(body["response_format"]["json_schema"]["name"], "route_decision");
        assert_eq!(
            body["response_format"]["json_schema"]["schema"]["required"][0],
            "selectedRoute"
        );
        assert_eq!(body["messages"][0]["content"], "classify");
    }

    #[test]
    fn image_body_inlines_data_urls() {
        let images = vec![EncodedImage {
            content_type: "image/png",
            base64: "AAAA".into(),
        }];
        let body = image_body("openai/gpt-4o", "describe", &images);
        let content = &body["messages"][0]["content"];
        assert_eq!(content[0]["type"], "text");
        assert_eq!(content[1]["image_url"]["url"], "data:image/png;base64,AAAA");
        assert_eq!(body["max_tokens"], 1000);
    }

    #[test]
    fn image_types_normalized() {
        assert_eq!(supported_image_type("image/png"), Some("image/png"));
        assert_eq!(
            supported_image_type("image/JPEG; charset=binary"),
            Some("image/jpeg")
        );
        assert_eq!(supported_image_type("image/svg+xml"), None);
        assert_eq!(supported_image_type(""), None);
    }

    /// Serve one canned HTTP response on a local port and return its URL.
    async fn serve_once(head: String, body: Vec<u8>) -> String {
        use tokio::io::{AsyncReadExt, AsyncWriteExt};

        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            let (mut socket, _) = listener.accept().await.unwrap();
            let mut request = [0u8; 1024];
            let _ = socket.read(&mut request).await;
            let _ = socket.write_all(head.as_bytes()).await;
            let _ = socket.write_all(&body).await;
            let _ = socket.shutdown().await;
        });
        format!("http://{addr}/image.png")
    }

    fn png_response(declared_len: usize) -> String {
        format!(
            "HTTP/1.1 200 OK\r\nContent-Type: image/png\r\nContent-Length: {declared_len}\r\nConnection: close\r\n\r\n"
        )
    }

    #[tokio::test]
    async fn image_within_cap_is_encoded() {
        let url = serve_once(png_response(4), vec![1, 2, 3, 4]).await;
        let provider = OpenAiCompatProvider::new("custom", "http://localhost", "")
            .with_max_image_bytes(16);

        let image = provider.fetch_image(&url).await.unwrap();
        assert_eq!(image.content_type, "image/png");
        assert_eq!(image.base64, BASE64.encode([1u8, 2, 3, 4]));
    }

    #[tokio::test]
    async fn declared_oversized_image_is_skipped() {
        let url = serve_once(png_response(64), vec![0; 64]).await;
        let provider = OpenAiCompatProvider::new("custom", "http://localhost", "")
            .with_max_image_bytes(16);

        assert!(provider.fetch_image(&url).await.is_none());
    }

    #[tokio::test]
    async fn undeclared_oversized_image_is_skipped() {
        let head = "HTTP/1.1 200 OK\r\nContent-Type: image/png\r\nConnection: close\r\n\r\n".to_string();
        let url = serve_once(head, vec![0; 64]).await;
        let provider = OpenAiCompatProvider::new("custom", "http://localhost", "")
            .with_max_image_bytes(16);

        assert!(provider.fetch_image(&url).await.is_none());
    }

    #[test]
    fn default_image_cap_is_five_megabytes() {
        let provider = OpenAiCompatProvider::openrouter("sk-test");
        assert_eq!(provider.max_image_bytes, 5 * 1024 * 1024);
    }

    #[test]
    fn first_choice_content_extracted() {
        let response: ApiResponse = serde_json::from_str(
            r#"{"choices":[{"message":{"role":"assistant","content":"hello"}}]}"#,
        )
        .unwrap();
        assert_eq!(first_choice_content(response).unwrap(), "hello");
    }

    #[test]
    fn empty_choices_is_an_error() {
        let response: ApiResponse = serde_json::from_str(r#"{"choices":[]}"#).unwrap();
        assert!(matches!(
            first_choice_content(response),
            Err(ProviderError::ApiError { status_code: 200, .. })
        ));
    }

    #[tokio::test]
    async fn unreachable_images_fail_the_call() {
        let p = OpenAiCompatProvider::new("local", "http://127.0.0.1:9/v1", "").with_timeout(1);
        let err = p
            .complete_with_images("describe", &["http://127.0.0.1:9/a.png".to_string()])
            .await
            .unwrap_err();
        assert!(matches!(err, ProviderError::Image(_)));
    }
}
