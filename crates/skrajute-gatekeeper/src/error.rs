//! Gatekeeper error types

use thiserror::Error;

/// Errors that can occur during gatekeeper operations
#[derive(Error, Debug, Clone, PartialEq)]
pub enum GatekeeperError {
    /// Invalid validation settings
    #[error("Configuration error: {0}")]
    Config(String),

    /// Required-field list names a field products do not have
    #[error("Unknown product field: {0}")]
    UnknownField(String),
}
