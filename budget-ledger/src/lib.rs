//! Budget ledger
//!
//! Tracks allocated and consumed amounts per cost center and budget
//! period, answers utilization queries and enforces soft/hard limits.
//! Allocation changes live in an append-only revision log which is the
//! source of truth for the allocated amount.

#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod error;
pub mod ledger;
pub mod types;

pub use error::{Error, Result};
pub use ledger::BudgetLedger;
pub use types::*;
