//! Error types for the budget ledger

use rust_decimal::Decimal;
use thiserror::Error;
use uuid::Uuid;

/// Result type for budget operations
pub type Result<T> = std::result::Result<T, Error>;

/// Budget ledger errors
#[derive(Error, Debug)]
pub enum Error {
    /// Hard-limit breach; surfaced to the caller for an approval
    /// decision, never silently absorbed
    #[error(
        "Budget {budget_id} exceeded: consumed {consumed} + attempted {attempted} > allocated {allocated}"
    )]
    BudgetExceeded {
        /// Budget whose limit would be breached
        budget_id: Uuid,
        /// Current allocation
        allocated: Decimal,
        /// Already consumed
        consumed: Decimal,
        /// Amount the caller tried to post
        attempted: Decimal,
    },

    /// A cost center may have at most one active budget covering any
    /// given date
    #[error("Budget period overlap: {0}")]
    PeriodOverlap(String),

    /// Malformed period (e.g. start after end)
    #[error("Invalid period: {0}")]
    InvalidPeriod(String),

    /// Malformed amount (non-positive consumption, negative allocation)
    #[error("Invalid amount: {0}")]
    InvalidAmount(String),

    /// Disallowed status transition
    #[error("Invalid transition: {0}")]
    InvalidTransition(String),

    /// Referenced budget missing
    #[error("Not found: {0}")]
    NotFound(String),

    /// Actor lacks the capability for this mutation
    #[error("Unauthorized: {0}")]
    Unauthorized(String),
}
