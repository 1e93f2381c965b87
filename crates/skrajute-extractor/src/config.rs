//! Configuration for the Extractor

use serde::{Deserialize, Serialize};
use skrajute_domain::TokenUsage;
use std::time::Duration;

/// Configuration for the Extractor
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ExtractorConfig {
    /// Model id reported in usage events (defaults to the client's id)
    pub model_name: Option<String>,

    /// Outer guard around each model call (seconds)
    pub call_timeout_secs: u64,

    /// Delay between pages of a flyer batch (milliseconds)
    pub page_delay_ms: u64,

    /// Maximum characters kept in `PageMeta::raw_text_sample`
    pub raw_text_sample_len: usize,

    /// Cost per 1000 prompt tokens
    pub prompt_cost_per_1k: f64,

    /// Cost per 1000 completion tokens
    pub completion_cost_per_1k: f64,
}

impl ExtractorConfig {
    /// Get the call timeout as a Duration
    pub fn call_timeout(&self) -> Duration {
        Duration::from_secs(self.call_timeout_secs)
    }

    /// Get the inter-page delay as a Duration
    pub fn page_delay(&self) -> Duration {
        Duration::from_millis(self.page_delay_ms)
    }

    /// Cost of one call at the configured rates
    pub fn cost(&self, usage: &TokenUsage) -> f64 {
        usage.prompt_tokens as f64 / 1000.0 * self.prompt_cost_per_1k
            + usage.completion_tokens as f64 / 1000.0 * self.completion_cost_per_1k
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<(), String> {
        if self.call_timeout_secs == 0 {
            return Err("call_timeout_secs must be greater than 0".to_string());
        }
        if self.raw_text_sample_len == 0 {
            return Err("raw_text_sample_len must be greater than 0".to_string());
        }
        let rates = [self.prompt_cost_per_1k, self.completion_cost_per_1k];
        if rates.iter().any(|rate| rate.is_nan() || *rate < 0.0) {
            return Err("token costs must be non-negative".to_string());
        }
        if matches!(&self.model_name, Some(name) if name.trim().is_empty()) {
            return Err("model_name must not be blank".to_string());
        }
        Ok(())
    }

    /// Load configuration from TOML string
    pub fn from_toml(toml_str: &str) -> Result<Self, String> {
        toml::from_str(toml_str).map_err(|e| format!("Failed to parse TOML: {}", e))
    }

    /// Serialize configuration to TOML string
    pub fn to_toml(&self) -> Result<String, String> {
        toml::to_string_pretty(self).map_err(|e| format!("Failed to serialize to TOML: {}", e))
    }
}

impl Default for ExtractorConfig {
    fn default() -> Self {
        Self {
            model_name: None,
            call_timeout_secs: 180,
            page_delay_ms: 2_000,
            raw_text_sample_len: 200,
            prompt_cost_per_1k: 0.0025,
            completion_cost_per_1k: 0.01,
        }
    }
}
