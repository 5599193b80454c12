//! Payment reconciler
//!
//! Verifies inbound payment-gateway confirmations (keyed-hash signature
//! check), maps them to internal invoices and applies them exactly
//! once. The `(gateway_order_id, gateway_payment_id)` pair is the
//! idempotency key: at most one confirmation per key reaches `Applied`,
//! including under concurrent replay.

#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod error;
pub mod reconciler;
pub mod signature;
pub mod types;

pub use error::{Error, Result};
pub use reconciler::{InvoiceStore, PaymentReconciler, ReconcilerConfig};
pub use signature::{generate_secret, sign_payload, verify_signature};
pub use types::*;
