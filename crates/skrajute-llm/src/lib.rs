//! Skrajute Vision Provider Layer
//!
//! Implementations of the `VisionClient` trait from `skrajute-domain`.
//!
//! # Providers
//!
//! - `MockVisionClient`: Scripted, deterministic client for testing
//! - `OpenAiVisionClient`: OpenAI-compatible chat-completions API with image input
//!
//! # Examples
//!
//! ```
//! use skrajute_llm::MockVisionClient;
//! use skrajute_domain::VisionClient;
//! use tokio_util::sync::CancellationToken;
//!
//! # tokio_test::block_on(async {
//! let client = MockVisionClient::new("{}");
//! client.push_response(r#"{"promotions": []}"#);
//!
//! let cancel = CancellationToken::new();
//! let first = client.analyze_image(&cancel, "https://cdn/p1.jpg", "prompt").await.unwrap();
//! assert_eq!(first.content, r#"{"promotions": []}"#);
//!
//! let second = client.analyze_image(&cancel, "https://cdn/p1.jpg", "prompt").await.unwrap();
//! assert_eq!(second.content, "{}");
//! # });
//! ```

#![warn(missing_docs)]

pub mod openai;

use async_trait::async_trait;
use skrajute_domain::{TokenUsage, VisionClient, VisionResponse};
use std::collections::VecDeque;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;
use thiserror::Error;
use tokio_util::sync::CancellationToken;

pub use openai::OpenAiVisionClient;

/// Errors that can occur during vision-model calls
#[derive(Error, Debug, Clone, PartialEq)]
pub enum LlmError {
    /// Network or API communication error
    #[error("Communication error: {0}")]
    Communication(String),

    /// Invalid response from the provider
    #[error("Invalid response: {0}")]
    InvalidResponse(String),

    /// Rate limit exceeded
    #[error("Rate limit exceeded")]
    RateLimitExceeded,

    /// Model not available
    #[error("Model not available: {0}")]
    ModelNotAvailable(String),

    /// Caller cancelled the request
    #[error("Request cancelled")]
    Cancelled,

    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),

    /// Generic error
    #[error("LLM error: {0}")]
    Other(String),
}

#[derive(Debug, Clone)]
enum Scripted {
    Content(String, TokenUsage),
    Error(LlmError),
}

/// A recorded call to the mock
#[derive(Debug, Clone, PartialEq)]
pub struct RecordedCall {
    /// Image URL, or `data:` URI for inline images
    pub image: String,
    /// Prompt sent with the image
    pub prompt: String,
}

/// Scripted vision client for deterministic testing
///
/// Queued responses are returned in order; once the queue is empty every call
/// gets the default response. Clones share the queue and call log.
#[derive(Debug, Clone)]
pub struct MockVisionClient {
    model: String,
    default_response: String,
    default_usage: TokenUsage,
    queue: Arc<Mutex<VecDeque<Scripted>>>,
    calls: Arc<Mutex<Vec<RecordedCall>>>,
    latency: Option<Duration>,
}

impl MockVisionClient {
    /// Create a mock that answers every call with `response`
    pub fn new(response: impl Into<String>) -> Self {
        Self {
            model: "mock-vision".to_string(),
            default_response: response.into(),
            default_usage: TokenUsage::new(100, 50),
            queue: Arc::new(Mutex::new(VecDeque::new())),
            calls: Arc::new(Mutex::new(Vec::new())),
            latency: None,
        }
    }

    /// Set the reported model id
    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.model = model.into();
        self
    }

    /// Simulate provider latency (cancellable)
    pub fn with_latency(mut self, latency: Duration) -> Self {
        self.latency = Some(latency);
        self
    }

    /// Queue a successful response with the default usage
    pub fn push_response(&self, content: impl Into<String>) {
        self.push_response_with_usage(content, self.default_usage);
    }

    /// Queue a successful response with explicit usage
    pub fn push_response_with_usage(&self, content: impl Into<String>, usage: TokenUsage) {
        self.lock_queue()
            .push_back(Scripted::Content(content.into(), usage));
    }

    /// Queue a failed call
    pub fn push_error(&self, error: LlmError) {
        self.lock_queue().push_back(Scripted::Error(error));
    }

    /// Number of calls made so far
    pub fn call_count(&self) -> usize {
        self.calls.lock().unwrap_or_else(PoisonError::into_inner).len()
    }

    /// All calls made so far, in order
    pub fn calls(&self) -> Vec<RecordedCall> {
        self.calls.lock().unwrap_or_else(PoisonError::into_inner).clone()
    }

    fn lock_queue(&self) -> std::sync::MutexGuard<'_, VecDeque<Scripted>> {
        self.queue.lock().unwrap_or_else(PoisonError::into_inner)
    }

    async fn respond(
        &self,
        cancel: &CancellationToken,
        image: String,
        prompt: &str,
    ) -> Result<VisionResponse, LlmError> {
        if cancel.is_cancelled() {
            return Err(LlmError::Cancelled);
        }

        self.calls
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(RecordedCall {
                image,
                prompt: prompt.to_string(),
            });

        if let Some(latency) = self.latency {
            tokio::select! {
                _ = cancel.cancelled() => return Err(LlmError::Cancelled),
                _ = tokio::time::sleep(latency) => {}
            }
        }

        match self.lock_queue().pop_front() {
            Some(Scripted::Content(content, usage)) => Ok(VisionResponse { content, usage }),
            Some(Scripted::Error(error)) => Err(error),
            None => Ok(VisionResponse {
                content: self.default_response.clone(),
                usage: self.default_usage,
            }),
        }
    }
}

impl Default for MockVisionClient {
    fn default() -> Self {
        Self::new(r#"{"page_meta": {}, "promotions": []}"#)
    }
}

#[async_trait]
impl VisionClient for MockVisionClient {
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
        self.respond(cancel, image_url.to_string(), prompt).await
    }

    async fn analyze_image_inline(
        &self,
        cancel: &CancellationToken,
        data: &str,
        mime_type: &str,
        prompt: &str,
    ) -> Result<VisionResponse, Self::Error> {
        self.respond(cancel, format!("data:{};base64,{}", mime_type, data), prompt)
            .await
    }
}
