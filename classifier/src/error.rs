//! Error types for the orchestrator

use thiserror::Error;

/// Result type for orchestrator operations
pub type Result<T> = std::result::Result<T, Error>;

/// Orchestrator errors.
///
/// Component errors pass through unchanged so callers keep the detail
/// (which budget limit, which signature field) they need to act on.
#[derive(Error, Debug)]
pub enum Error {
    /// Rule evaluation or rule/cost-center storage error
    #[error(transparent)]
    Rule(#[from] rule_engine::Error),

    /// Budget ledger error (including hard-limit rejection)
    #[error(transparent)]
    Budget(#[from] budget_ledger::Error),

    /// Payment reconciliation error
    #[error(transparent)]
    Payment(#[from] payment_reconciler::Error),

    /// Referenced transaction missing
    #[error("Transaction not found: {0}")]
    NotFound(String),

    /// Operation conflicts with current transaction state (e.g. voided)
    #[error("Conflict: {0}")]
    Conflict(String),

    /// Invalid input
    #[error("Validation error: {0}")]
    Validation(String),

    /// Actor lacks the required capability
    #[error("Unauthorized: {0}")]
    Unauthorized(String),

    /// Invalid configuration
    #[error("Configuration error: {0}")]
    Config(String),
}
