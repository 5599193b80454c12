//! Error types for the rule engine

use thiserror::Error;

/// Result type for rule engine operations
pub type Result<T> = std::result::Result<T, Error>;

/// Rule engine errors
#[derive(Error, Debug)]
pub enum Error {
    /// Malformed input (caller's fault)
    #[error("Validation error: {0}")]
    Validation(String),

    /// Rule or cost-center data inconsistency
    #[error("Configuration error: {0}")]
    Configuration(String),

    /// Referenced entity missing
    #[error("Not found: {0}")]
    NotFound(String),

    /// Actor lacks the capability for this mutation
    #[error("Unauthorized: {0}")]
    Unauthorized(String),
}
