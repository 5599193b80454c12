//! Error types for payment reconciliation

use thiserror::Error;

/// Result type for reconciliation operations
pub type Result<T> = std::result::Result<T, Error>;

/// Payment reconciler errors
#[derive(Error, Debug)]
pub enum Error {
    /// Malformed payload (caller's fault)
    #[error("Validation error: {0}")]
    Validation(String),

    /// Referenced invoice missing; the event stays `Verified` and is
    /// eligible for manual retry
    #[error("Invoice not found: {0}")]
    InvoiceNotFound(String),

    /// Referenced payment event missing
    #[error("Payment event not found: {0}")]
    EventNotFound(String),

    /// Disallowed event status transition (the event log is forward-only)
    #[error("Invalid transition: {0}")]
    InvalidTransition(String),

    /// Invalid reconciler configuration (e.g. empty webhook secret)
    #[error("Configuration error: {0}")]
    Config(String),
}
