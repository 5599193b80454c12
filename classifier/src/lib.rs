//! Transaction classifier
//!
//! Orchestrates the budget-control core: runs the rule matcher over new
//! and amended transactions, books the consumption against the budget
//! ledger, and feeds payment-gateway confirmations through the
//! reconciler. Either the full classify-and-book sequence commits or
//! none of it does.

#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod config;
pub mod error;
pub mod orchestrator;
pub mod store;
pub mod types;

pub use config::ClassifierConfig;
pub use error::{Error, Result};
pub use orchestrator::TransactionClassifier;
pub use store::TransactionStore;
pub use types::*;
