//! Analytical rule engine
//!
//! Rule-based auto-classification of financial transactions to cost
//! centers and analytical accounts. Rules are ordered predicates over a
//! read-only transaction snapshot; the first full match wins.

#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod error;
pub mod matcher;
pub mod store;
pub mod types;

pub use error::{Error, Result};
pub use matcher::RuleMatcher;
pub use store::{CachedRuleStore, InMemoryRuleStore, RuleStore};
pub use types::*;
