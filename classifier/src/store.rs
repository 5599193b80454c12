//! Transaction storage
//!
//! Each transaction lives in its own map cell, so payment application
//! and amendments against the same transaction serialize while
//! unrelated transactions proceed concurrently. The store doubles as
//! the reconciler's invoice view: a transaction's id is its invoice id.

use crate::types::Transaction;
use dashmap::DashMap;
use payment_reconciler::{InvoicePaymentStatus, InvoiceStore, InvoiceView};
use rust_decimal::Decimal;
use uuid::Uuid;

/// Settlement status for a paid-vs-total pair
pub(crate) fn settlement_status(total: Decimal, paid: Decimal) -> InvoicePaymentStatus {
    if paid <= Decimal::ZERO {
        InvoicePaymentStatus::Unpaid
    } else if paid >= total {
        InvoicePaymentStatus::Paid
    } else {
        InvoicePaymentStatus::Partial
    }
}

/// In-memory authoritative store for transactions
pub struct TransactionStore {
    transactions: DashMap<Uuid, Transaction>,
}

impl Default for TransactionStore {
    fn default() -> Self {
        Self::new()
    }
}

impl TransactionStore {
    /// Create an empty store
    pub fn new() -> Self {
        Self {
            transactions: DashMap::new(),
        }
    }

    /// Get a transaction by id
    pub fn get(&self, id: Uuid) -> Option<Transaction> {
        self.transactions.get(&id).map(|t| t.clone())
    }

    /// Insert or replace a transaction
    pub fn put(&self, transaction: Transaction) {
        self.transactions.insert(transaction.id, transaction);
    }

    /// Run `f` with exclusive access to a transaction's cell.
    ///
    /// The guard is held for the duration of `f`: document mutations
    /// and payment application against the same transaction serialize,
    /// so neither can overwrite the other's fields with a stale copy.
    pub fn with_mut<R>(&self, id: Uuid, f: impl FnOnce(&mut Transaction) -> R) -> Option<R> {
        self.transactions.get_mut(&id).map(|mut tx| f(tx.value_mut()))
    }

    /// Number of stored transactions
    pub fn len(&self) -> usize {
        self.transactions.len()
    }

    /// Whether the store is empty
    pub fn is_empty(&self) -> bool {
        self.transactions.is_empty()
    }
}

impl InvoiceStore for TransactionStore {
    fn invoice(&self, id: &Uuid) -> Option<InvoiceView> {
        self.transactions.get(id).and_then(|t| {
            if t.voided {
                return None;
            }
            Some(InvoiceView {
                id: t.id,
                total: t.amount,
                paid: t.paid,
                status: t.payment_status,
            })
        })
    }

    fn apply_payment(
        &self,
        id: &Uuid,
        amount: Decimal,
    ) -> payment_reconciler::Result<InvoicePaymentStatus> {
        let mut tx = self
            .transactions
            .get_mut(id)
            .ok_or_else(|| payment_reconciler::Error::InvoiceNotFound(id.to_string()))?;
        if tx.voided {
            return Err(payment_reconciler::Error::InvoiceNotFound(id.to_string()));
        }
        // Re-check under the cell guard; the reconciler's pre-check may
        // be stale by the time this runs.
        if amount > tx.amount - tx.paid {
            return Err(payment_reconciler::Error::Validation(format!(
                "payment of {} exceeds outstanding balance {}",
                amount,
                tx.amount - tx.paid
            )));
        }

        tx.paid += amount;
        tx.payment_status = settlement_status(tx.amount, tx.paid);
        Ok(tx.payment_status)
    }
}
