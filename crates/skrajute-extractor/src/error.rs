//! Error types for the Extractor

use crate::parser::ParseError;
use std::fmt;
use thiserror::Error;

/// Model call within the page protocol
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Stage {
    /// Coarse module enumeration
    Detection,
    /// Per-box detail reading
    DetailFill,
    /// Single-pass fallback
    Unified,
}

impl Stage {
    /// Operation label reported in usage events
    pub fn operation(&self) -> &'static str {
        match self {
            Stage::Detection => "flyer_detection",
            Stage::DetailFill => "flyer_detail_fill",
            Stage::Unified => "flyer_unified",
        }
    }
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Stage::Detection => "detection",
            Stage::DetailFill => "detail fill",
            Stage::Unified => "unified",
        };
        f.write_str(name)
    }
}

/// Errors that can occur during extraction
///
/// Cloneable so a failed page can carry its error inside the
/// [`ExtractionResult`](crate::ExtractionResult).
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ExtractorError {
    /// Vision model or transport error
    #[error("Model error during {stage} pass: {message}")]
    Model {
        /// Pass that failed
        stage: Stage,
        /// Error reported by the client
        message: String,
    },

    /// Model call exceeded the configured timeout
    #[error("Model call timed out during {0} pass")]
    Timeout(Stage),

    /// Caller cancelled the extraction
    #[error("Extraction cancelled")]
    Cancelled,

    /// Model output could not be decoded
    #[error("Failed to parse {stage} response: {error}")]
    Parse {
        /// Pass whose response failed to parse
        stage: Stage,
        /// Parser diagnosis
        error: ParseError,
    },

    /// Unified fallback failed after the detection response was unparseable
    #[error("Unified fallback failed: {fallback}; detection response was unparseable: {detection}")]
    FallbackFailed {
        /// Why the fallback pass failed
        fallback: Box<ExtractorError>,
        /// Why the detection response could not be parsed
        detection: ParseError,
    },

    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),

    /// Prompt could not be serialized
    #[error("JSON error: {0}")]
    Json(String),
}

impl ExtractorError {
    /// True if the error came from the caller's cancellation signal
    pub fn is_cancelled(&self) -> bool {
        matches!(self, ExtractorError::Cancelled)
    }
}

impl From<serde_json::Error> for ExtractorError {
    fn from(e: serde_json::Error) -> Self {
        ExtractorError::Json(e.to_string())
    }
}
