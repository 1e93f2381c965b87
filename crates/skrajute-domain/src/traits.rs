//! Trait definitions for external interactions
//!
//! These traits define the boundary between the extraction pipeline and
//! infrastructure. Implementations live in other crates (skrajute-llm).

use crate::usage::TokenUsage;
use async_trait::async_trait;
use tokio_util::sync::CancellationToken;

/// Text and token usage returned by one vision-model call
#[derive(Debug, Clone, PartialEq, Default)]
pub struct VisionResponse {
    /// Raw model output
    pub content: String,
    /// Tokens consumed by the call
    pub usage: TokenUsage,
}

/// Trait for vision-capable language model services
///
/// Implemented by the infrastructure layer (skrajute-llm). Retries and
/// transport timeouts belong to the implementation; callers treat every
/// error as terminal for that attempt.
#[async_trait]
pub trait VisionClient: Send + Sync {
    /// Error type for model calls
    type Error: std::fmt::Display + Send + Sync;

    /// Model identifier reported in usage events
    fn model_id(&self) -> &str;

    /// Analyze an image reachable by URL
    async fn analyze_image(
        &self,
        cancel: &CancellationToken,
        image_url: &str,
        prompt: &str,
    ) -> Result<VisionResponse, Self::Error>;

    /// Analyze a base64-encoded image
    async fn analyze_image_inline(
        &self,
        cancel: &CancellationToken,
        data: &str,
        mime_type: &str,
        prompt: &str,
    ) -> Result<VisionResponse, Self::Error>;
}
