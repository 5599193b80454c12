//! Core types for payment reconciliation

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Payment event lifecycle.
///
/// `pending → {verified, rejected}`, `verified → {applied, rejected}`.
/// `applied` and `rejected` are terminal; rejected events are never
/// retried automatically.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum PaymentEventStatus {
    /// Received, signature not yet checked
    Pending,
    /// Signature check passed; awaiting invoice-side processing
    Verified,
    /// Terminal failure (invalid signature, amount mismatch, already
    /// settled, duplicate)
    Rejected,
    /// Invoice updated; terminal
    Applied,
}

impl PaymentEventStatus {
    /// Whether a transition to `next` is allowed
    pub fn can_transition(self, next: PaymentEventStatus) -> bool {
        use PaymentEventStatus::*;
        matches!(
            (self, next),
            (Pending, Verified) | (Pending, Rejected) | (Verified, Applied) | (Verified, Rejected)
        )
    }
}

/// Idempotency key of a gateway confirmation
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct IdempotencyKey {
    /// Gateway order id (opaque)
    pub order_id: String,

    /// Gateway payment id (opaque)
    pub payment_id: String,
}

/// A recorded gateway confirmation.
///
/// Events are an append-only audit trail: rows are never deleted and
/// status only moves forward.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PaymentEvent {
    /// Event ID (time-ordered)
    pub id: Uuid,

    /// Gateway order id
    pub gateway_order_id: String,

    /// Gateway payment id
    pub gateway_payment_id: String,

    /// Signature string as received
    pub gateway_signature: String,

    /// Internal invoice the payment settles
    pub invoice_id: Uuid,

    /// Confirmed amount
    pub amount: Decimal,

    /// Lifecycle status
    pub status: PaymentEventStatus,

    /// Why the event was rejected, when it was
    pub reject_reason: Option<String>,

    /// Webhook receipt time
    pub received_at: DateTime<Utc>,
}

impl PaymentEvent {
    /// This event's idempotency key
    pub fn idempotency_key(&self) -> IdempotencyKey {
        IdempotencyKey {
            order_id: self.gateway_order_id.clone(),
            payment_id: self.gateway_payment_id.clone(),
        }
    }
}

/// Inbound webhook body (JSON)
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConfirmationPayload {
    /// Gateway order id
    pub gateway_order_id: String,

    /// Gateway payment id
    pub gateway_payment_id: String,

    /// Internal invoice id
    pub invoice_id: Uuid,

    /// Confirmed amount
    pub amount: Decimal,
}

impl ConfirmationPayload {
    /// Canonical string the gateway signs.
    ///
    /// Includes the amount so that a tampered amount fails verification
    /// even when the rest of the payload is intact.
    pub fn canonical_string(&self) -> String {
        format!(
            "{}|{}|{}",
            self.gateway_order_id, self.gateway_payment_id, self.amount
        )
    }
}

/// Invoice settlement status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum InvoicePaymentStatus {
    /// Nothing paid yet
    Unpaid,
    /// Partially paid
    Partial,
    /// Fully settled
    Paid,
}

/// Read view of an invoice as the reconciler needs it
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InvoiceView {
    /// Invoice ID
    pub id: Uuid,

    /// Total invoiced amount
    pub total: Decimal,

    /// Amount paid so far
    pub paid: Decimal,

    /// Settlement status
    pub status: InvoicePaymentStatus,
}

impl InvoiceView {
    /// Outstanding balance
    pub fn outstanding(&self) -> Decimal {
        self.total - self.paid
    }
}

/// Outcome of processing a confirmation
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum PaymentOutcome {
    /// The confirmation was applied to the invoice
    Applied {
        /// Event that was applied
        event_id: Uuid,
        /// Invoice status after application
        invoice_status: InvoicePaymentStatus,
    },

    /// The idempotency key was already applied; the committed result is
    /// returned instead of an error
    AlreadyApplied {
        /// Event that holds the committed application
        event_id: Uuid,
        /// Current invoice status
        invoice_status: InvoicePaymentStatus,
    },

    /// Terminal rejection
    Rejected {
        /// Event that was rejected
        event_id: Uuid,
        /// Reason, suitable for the caller
        reason: String,
    },
}
