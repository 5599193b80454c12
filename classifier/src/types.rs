//! Transaction types as the orchestrator sees them
//!
//! A transaction here is the core's abstraction over invoices, bills
//! and orders: the external document subsystem owns the full records,
//! the core only carries what classification, budgeting and payment
//! settlement need.

use budget_ledger::ConsumptionOutcome;
use chrono::NaiveDate;
use payment_reconciler::InvoicePaymentStatus;
use rule_engine::{AnalyticalAccountId, CostCenterId, TransactionSnapshot};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Direction of a transaction
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TransactionKind {
    /// Outbound invoice (revenue)
    Sale,
    /// Inbound bill (spend)
    Purchase,
}

/// How a transaction's classification was assigned.
///
/// `Manual` is sticky: the matcher never overwrites a human assignment.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ClassificationSource {
    /// Assigned by the rule matcher
    Auto,
    /// Assigned by a human
    Manual,
}

/// Input for a new or amended transaction, as supplied by the document
/// subsystem
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TransactionDraft {
    /// Sale or purchase
    pub kind: TransactionKind,

    /// Line-item total, already priced
    pub amount: Decimal,

    /// Counterpart/contact type (e.g. "VENDOR", "CUSTOMER")
    pub counterpart_type: String,

    /// Product category, when known
    pub product_category: Option<String>,

    /// Free-text tags
    pub tags: Vec<String>,

    /// Free-text description
    pub description: Option<String>,

    /// Accounting date; selects the budget period
    pub occurred_at: NaiveDate,
}

/// A transaction under the orchestrator's management
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Transaction {
    /// Transaction ID (doubles as the invoice id for payments)
    pub id: Uuid,

    /// Sale or purchase
    pub kind: TransactionKind,

    /// Line-item total
    pub amount: Decimal,

    /// Counterpart/contact type
    pub counterpart_type: String,

    /// Product category, when known
    pub product_category: Option<String>,

    /// Free-text tags
    pub tags: Vec<String>,

    /// Free-text description
    pub description: Option<String>,

    /// Accounting date
    pub occurred_at: NaiveDate,

    /// Assigned cost center, once classified
    pub cost_center_id: Option<CostCenterId>,

    /// Assigned analytical account, once classified
    pub analytical_account_id: Option<AnalyticalAccountId>,

    /// How the classification was assigned, once classified
    pub classification_source: Option<ClassificationSource>,

    /// Voided transactions keep their row but accept no further
    /// processing
    pub voided: bool,

    /// Amount settled by applied payments
    pub paid: Decimal,

    /// Settlement status
    pub payment_status: InvoicePaymentStatus,
}

impl Transaction {
    /// Build a fresh transaction from a draft
    pub fn from_draft(id: Uuid, draft: TransactionDraft) -> Self {
        Self {
            id,
            kind: draft.kind,
            amount: draft.amount,
            counterpart_type: draft.counterpart_type,
            product_category: draft.product_category,
            tags: draft.tags,
            description: draft.description,
            occurred_at: draft.occurred_at,
            cost_center_id: None,
            analytical_account_id: None,
            classification_source: None,
            voided: false,
            paid: Decimal::ZERO,
            payment_status: InvoicePaymentStatus::Unpaid,
        }
    }

    /// The attribute snapshot the rule matcher evaluates
    pub fn snapshot(&self) -> TransactionSnapshot {
        TransactionSnapshot {
            amount: self.amount,
            counterpart_type: self.counterpart_type.clone(),
            product_category: self.product_category.clone(),
            tags: self.tags.clone(),
            description: self.description.clone(),
        }
    }

    /// Whether the transaction carries a classification
    pub fn is_classified(&self) -> bool {
        self.cost_center_id.is_some()
    }
}

/// Outcome of classify-and-book
#[derive(Debug, Clone)]
pub enum BookingOutcome {
    /// Classified and consumption booked
    Classified {
        /// The persisted transaction
        transaction: Transaction,
        /// How the ledger absorbed the amount
        consumption: ConsumptionOutcome,
    },

    /// No rule matched; awaiting manual classification
    Pending {
        /// The persisted, unclassified transaction
        transaction: Transaction,
    },
}

impl BookingOutcome {
    /// The transaction in either arm
    pub fn transaction(&self) -> &Transaction {
        match self {
            BookingOutcome::Classified { transaction, .. } => transaction,
            BookingOutcome::Pending { transaction } => transaction,
        }
    }
}
