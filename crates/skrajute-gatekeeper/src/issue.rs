//! Validation findings

use serde::{Deserialize, Serialize};
use std::fmt;

/// How much an issue matters
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    /// Informational only, never blocks
    Info,
    /// Blocks only in strict mode
    Warning,
    /// Always blocks
    Critical,
}

impl Severity {
    /// Score penalty per issue of this severity
    pub fn penalty(&self) -> f64 {
        match self {
            Severity::Critical => 0.10,
            Severity::Warning => 0.05,
            Severity::Info => 0.01,
        }
    }
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Severity::Critical => "critical",
            Severity::Warning => "warning",
            Severity::Info => "info",
        })
    }
}

/// What a validator found
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IssueKind {
    /// A required field is empty
    MissingField,
    /// Name shorter than two characters
    NameTooShort,
    /// Name longer than two hundred characters
    NameTooLong,
    /// Name has no letters from the diacritic alphabet
    NoDiacritics,
    /// Price is empty
    MissingPrice,
    /// Price is not a positive number
    InvalidPrice,
    /// Price exceeds the configured maximum
    PriceTooHigh,
    /// Unit is empty
    MissingUnit,
    /// Unit is not a canonical spelling
    InvalidUnit,
    /// Category is empty and could not be inferred
    MissingCategory,
    /// Confidence below the configured minimum
    LowConfidence,
}

/// One validator finding for one product
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Issue {
    /// Finding type
    pub kind: IssueKind,
    /// Severity
    pub severity: Severity,
    /// Field the finding is about
    pub field: String,
    /// Offending value
    pub value: String,
    /// Human-readable description
    pub description: String,
    /// How to fix it, when known
    pub suggestion: Option<String>,
    /// Position of the product in the validated batch
    pub product_index: usize,
}

impl fmt::Display for Issue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}] {}: {}", self.severity, self.field, self.description)?;
        if let Some(suggestion) = &self.suggestion {
            write!(f, " ({})", suggestion)?;
        }
        Ok(())
    }
}

/// A change applied to the working copy of a product
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Correction {
    /// Position of the product in the validated batch
    pub product_index: usize,
    /// Corrected field
    pub field: String,
    /// Value before the change
    pub original: String,
    /// Value after the change
    pub corrected: String,
    /// Why the value changed
    pub reason: String,
}
