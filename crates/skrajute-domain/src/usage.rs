//! Token usage accounting
//!
//! The pipeline does not track cost itself. It reports one [`UsageEvent`]
//! per model call to whatever [`UsageSink`] the host wires in.

use serde::{Deserialize, Serialize};
use std::ops::AddAssign;

/// Token counts for one or more model calls
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct TokenUsage {
    /// Input tokens (prompt plus image)
    pub prompt_tokens: u64,
    /// Output tokens
    pub completion_tokens: u64,
    /// Provider-reported total
    pub total_tokens: u64,
}

impl TokenUsage {
    /// Usage with the total derived from its parts
    pub fn new(prompt_tokens: u64, completion_tokens: u64) -> Self {
        Self {
            prompt_tokens,
            completion_tokens,
            total_tokens: prompt_tokens + completion_tokens,
        }
    }
}

impl AddAssign for TokenUsage {
    fn add_assign(&mut self, other: Self) {
        self.prompt_tokens += other.prompt_tokens;
        self.completion_tokens += other.completion_tokens;
        self.total_tokens += other.total_tokens;
    }
}

/// One model call, as reported to the cost-tracking collaborator
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UsageEvent {
    /// Model identifier
    pub model: String,
    /// Operation label ("flyer_detection")
    pub operation: String,
    /// Tokens consumed by the call
    pub usage: TokenUsage,
    /// Cost derived from the configured per-1k rates
    pub cost: f64,
    /// Whether the call returned content
    pub success: bool,
    /// Wall-clock duration in milliseconds
    pub duration_ms: u64,
}

/// Receiver of usage events
///
/// Implementations must not block; they are called inline after each model call.
pub trait UsageSink: Send + Sync {
    /// Record one model call
    fn record(&self, event: UsageEvent);
}
