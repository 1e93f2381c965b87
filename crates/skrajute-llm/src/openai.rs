//! OpenAI-compatible vision provider
//!
//! Sends one user message with a text part (the prompt) and an image part to
//! the `/chat/completions` endpoint. Works with OpenAI and with any gateway
//! that speaks the same wire format.
//!
//! # Features
//!
//! - Image by URL or inline as a `data:` URI
//! - Retry with exponential backoff on transport errors, 429 and 5xx
//! - Per-request timeout
//! - Cancellation at every await point
//!
//! # Examples
//!
//! ```no_run
//! use skrajute_llm::OpenAiVisionClient;
//!
//! let client = OpenAiVisionClient::new("https://api.openai.com/v1", "sk-...", "gpt-4o")
//!     .unwrap()
//!     .with_max_retries(2);
//! ```

use crate::LlmError;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use skrajute_domain::{TokenUsage, VisionClient, VisionResponse};
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

/// Default API endpoint
pub const DEFAULT_ENDPOINT: &str = "https://api.openai.com/v1";

/// Default timeout for one HTTP request (flyer pages are slow to analyze)
pub const DEFAULT_TIMEOUT_SECS: u64 = 120;

/// Default number of attempts per call
pub const DEFAULT_MAX_RETRIES: u32 = 3;

/// Default completion budget
pub const DEFAULT_MAX_TOKENS: u32 = 4096;

/// Vision client for OpenAI-compatible chat-completions APIs
pub struct OpenAiVisionClient {
    endpoint: String,
    api_key: String,
    model: String,
    client: reqwest::Client,
    max_retries: u32,
    max_tokens: u32,
}

#[derive(Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: Vec<ChatMessage<'a>>,
    temperature: f32,
    max_tokens: u32,
}

#[derive(Serialize)]
struct ChatMessage<'a> {
    role: &'static str,
    content: Vec<ContentPart<'a>>,
}

#[derive(Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum ContentPart<'a> {
    Text { text: &'a str },
    ImageUrl { image_url: ImageUrl<'a> },
}

#[derive(Serialize)]
struct ImageUrl<'a> {
    url: &'a str,
    detail: &'static str,
}

#[derive(Deserialize)]
struct ChatResponse {
    choices: Vec<ChatChoice>,
    #[serde(default)]
    usage: Option<ChatUsage>,
}

#[derive(Deserialize)]
struct ChatChoice {
    message: ChatResponseMessage,
}

#[derive(Deserialize)]
struct ChatResponseMessage {
    #[serde(default)]
    content: Option<String>,
}

#[derive(Deserialize)]
struct ChatUsage {
    #[serde(default)]
    prompt_tokens: u64,
    #[serde(default)]
    completion_tokens: u64,
    #[serde(default)]
    total_tokens: u64,
}

impl OpenAiVisionClient {
    /// Create a new client
    ///
    /// # Parameters
    ///
    /// - `endpoint`: API base URL including the version segment
    /// - `api_key`: Bearer token
    /// - `model`: Vision-capable model (e.g., "gpt-4o")
    ///
    /// # Errors
    ///
    /// Returns [`LlmError::Config`] if the HTTP client cannot be built.
    pub fn new(
        endpoint: impl Into<String>,
        api_key: impl Into<String>,
        model: impl Into<String>,
    ) -> Result<Self, LlmError> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(DEFAULT_TIMEOUT_SECS))
            .build()
            .map_err(|e| LlmError::Config(format!("Failed to build HTTP client: {}", e)))?;

        Ok(Self {
            endpoint: endpoint.into().trim_end_matches('/').to_string(),
            api_key: api_key.into(),
            model: model.into(),
            client,
            max_retries: DEFAULT_MAX_RETRIES,
            max_tokens: DEFAULT_MAX_TOKENS,
        })
    }

    /// Create from `OPENAI_API_KEY` (and optional `OPENAI_BASE_URL`)
    pub fn from_env(model: impl Into<String>) -> Result<Self, LlmError> {
        let api_key = std::env::var("OPENAI_API_KEY")
            .map_err(|_| LlmError::Config("OPENAI_API_KEY not set".to_string()))?;
        let endpoint =
            std::env::var("OPENAI_BASE_URL").unwrap_or_else(|_| DEFAULT_ENDPOINT.to_string());
        Self::new(endpoint, api_key, model)
    }

    /// Set the maximum number of attempts (at least one)
    pub fn with_max_retries(mut self, max_retries: u32) -> Self {
        self.max_retries = max_retries.max(1);
        self
    }

    /// Set the completion token budget
    pub fn with_max_tokens(mut self, max_tokens: u32) -> Self {
        self.max_tokens = max_tokens;
        self
    }

    async fn complete(
        &self,
        cancel: &CancellationToken,
        image_url: &str,
        prompt: &str,
    ) -> Result<VisionResponse, LlmError> {
        if cancel.is_cancelled() {
            return Err(LlmError::Cancelled);
        }

        let url = format!("{}/chat/completions", self.endpoint);
        let body = ChatRequest {
            model: &self.model,
            messages: vec![ChatMessage {
                role: "user",
                content: vec![
                    ContentPart::Text { text: prompt },
                    ContentPart::ImageUrl {
                        image_url: ImageUrl {
                            url: image_url,
                            detail: "high",
                        },
                    },
                ],
            }],
            temperature: 0.0,
            max_tokens: self.max_tokens,
        };

        // Retry logic with exponential backoff
        let mut attempts = 0;
        let mut last_error = None;

        while attempts < self.max_retries {
            let request = self
                .client
                .post(&url)
                .bearer_auth(&self.api_key)
                .json(&body)
                .send();

            let outcome = tokio::select! {
                _ = cancel.cancelled() => return Err(LlmError::Cancelled),
                outcome = request => outcome,
            };

            match outcome {
                Ok(response) => {
                    let status = response.status();
                    if status.is_success() {
                        return Self::read_response(cancel, response).await;
                    } else if status == reqwest::StatusCode::NOT_FOUND {
                        return Err(LlmError::ModelNotAvailable(self.model.clone()));
                    } else if status == reqwest::StatusCode::TOO_MANY_REQUESTS {
                        last_error = Some(LlmError::RateLimitExceeded);
                    } else if status.is_server_error() {
                        let error_text = Self::read_text(cancel, response).await?;
                        last_error = Some(LlmError::Communication(format!(
                            "HTTP {}: {}",
                            status, error_text
                        )));
                    } else {
                        let error_text = Self::read_text(cancel, response).await?;
                        return Err(LlmError::InvalidResponse(format!(
                            "HTTP {}: {}",
                            status, error_text
                        )));
                    }
                }
                Err(e) => {
                    last_error = Some(LlmError::Communication(format!("Request failed: {}", e)));
                }
            }

            attempts += 1;
            if attempts < self.max_retries {
                // Exponential backoff: 1s, 2s, 4s, etc.
                let delay = Duration::from_secs(2u64.pow(attempts - 1));
                warn!(attempt = attempts, ?delay, "Vision request failed, retrying");
                tokio::select! {
                    _ = cancel.cancelled() => return Err(LlmError::Cancelled),
                    _ = tokio::time::sleep(delay) => {}
                }
            }
        }

        Err(last_error
            .unwrap_or_else(|| LlmError::Communication("Max retries exceeded".to_string())))
    }

    async fn read_text(
        cancel: &CancellationToken,
        response: reqwest::Response,
    ) -> Result<String, LlmError> {
        tokio::select! {
            _ = cancel.cancelled() => Err(LlmError::Cancelled),
            text = response.text() => Ok(text.unwrap_or_else(|_| "Unknown error".to_string())),
        }
    }

    async fn read_response(
        cancel: &CancellationToken,
        response: reqwest::Response,
    ) -> Result<VisionResponse, LlmError> {
        let body = tokio::select! {
            _ = cancel.cancelled() => return Err(LlmError::Cancelled),
            body = response.json::<ChatResponse>() => body,
        };
        let parsed = body
            .map_err(|e| LlmError::InvalidResponse(format!("Failed to parse response: {}", e)))?;

        let content = parsed
            .choices
            .into_iter()
            .next()
            .and_then(|choice| choice.message.content)
            .ok_or_else(|| LlmError::InvalidResponse("Response has no content".to_string()))?;

        let usage = parsed
            .usage
            .map(|u| {
                let mut usage = TokenUsage::new(u.prompt_tokens, u.completion_tokens);
                if u.total_tokens > 0 {
                    usage.total_tokens = u.total_tokens;
                }
                usage
            })
            .unwrap_or_default();

        debug!(
            content_len = content.len(),
            total_tokens = usage.total_tokens,
            "Vision response received"
        );

        Ok(VisionResponse { content, usage })
    }
}

#[async_trait]
impl VisionClient for OpenAiVisionClient {
    type Error = LlmError;

    fn model_id(&self) -> &str {
        &self.model
    }

    async fn analyze_image(
        &self,
        cancel: &CancellationToken,
        image_url: &str,
        prompt: &str,
    ) -> Result<VisionResponse, Self::Error> {
        self.complete(cancel, image_url, prompt).await
    }

    async fn analyze_image_inline(
        &self,
        cancel: &CancellationToken,
        data: &str,
        mime_type: &str,
        prompt: &str,
    ) -> Result<VisionResponse, Self::Error> {
        let data_uri = format!("data:{};base64,{}", mime_type, data);
        self.complete(cancel, &data_uri, prompt).await
    }
}
