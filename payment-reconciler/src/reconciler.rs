//! Confirmation processing and exactly-once application
//!
//! The idempotency check and the invoice update happen under the
//! key's map-entry guard: a concurrent duplicate confirmation loses the
//! race and is resolved by returning the already committed result, not
//! by failing.

use crate::error::{Error, Result};
use crate::signature::verify_signature;
use crate::types::{
    ConfirmationPayload, IdempotencyKey, InvoicePaymentStatus, InvoiceView, PaymentEvent,
    PaymentEventStatus, PaymentOutcome,
};
use chrono::Utc;
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use rust_decimal::Decimal;
use std::sync::Arc;
use tracing::{info, warn};
use uuid::Uuid;

/// Reconciler policy knobs
#[derive(Debug, Clone)]
pub struct ReconcilerConfig {
    /// Accept confirmations below the outstanding balance, moving the
    /// invoice to `Partial`. When disabled, any amount other than the
    /// exact outstanding balance is rejected.
    pub allow_partial_payments: bool,
}

impl Default for ReconcilerConfig {
    fn default() -> Self {
        Self {
            allow_partial_payments: true,
        }
    }
}

/// Invoice seam the reconciler applies payments through.
///
/// `apply_payment` must re-validate the amount against the outstanding
/// balance under its own guard — the reconciler serializes per
/// idempotency key, not per invoice.
pub trait InvoiceStore: Send + Sync {
    /// Read view of an invoice
    fn invoice(&self, id: &Uuid) -> Option<InvoiceView>;

    /// Apply a payment and return the new settlement status
    fn apply_payment(&self, id: &Uuid, amount: Decimal) -> Result<InvoicePaymentStatus>;
}

/// Verifies and idempotently applies gateway confirmations
pub struct PaymentReconciler {
    secret: Vec<u8>,
    config: ReconcilerConfig,
    invoices: Arc<dyn InvoiceStore>,
    /// Append-only event log; rows are never removed
    events: DashMap<Uuid, PaymentEvent>,
    /// Idempotency key -> event that applied it
    applied: DashMap<IdempotencyKey, Uuid>,
}

impl PaymentReconciler {
    /// Create a reconciler with the gateway webhook secret
    pub fn new(
        secret: impl Into<Vec<u8>>,
        config: ReconcilerConfig,
        invoices: Arc<dyn InvoiceStore>,
    ) -> Result<Self> {
        let secret = secret.into();
        if secret.is_empty() {
            return Err(Error::Config("webhook secret must not be empty".to_string()));
        }
        Ok(Self {
            secret,
            config,
            invoices,
            events: DashMap::new(),
            applied: DashMap::new(),
        })
    }

    /// Record an inbound confirmation and verify its signature.
    ///
    /// A failed verification rejects the event immediately with no
    /// further side effects and is logged as a potential security
    /// event.
    pub async fn receive(&self, raw_payload: &str, signature: &str) -> Result<PaymentEvent> {
        let payload: ConfirmationPayload = serde_json::from_str(raw_payload)
            .map_err(|e| Error::Validation(format!("malformed confirmation payload: {}", e)))?;
        if payload.amount <= Decimal::ZERO {
            return Err(Error::Validation(
                "confirmation amount must be positive".to_string(),
            ));
        }

        let mut event = PaymentEvent {
            id: Uuid::now_v7(),
            gateway_order_id: payload.gateway_order_id.clone(),
            gateway_payment_id: payload.gateway_payment_id.clone(),
            gateway_signature: signature.to_string(),
            invoice_id: payload.invoice_id,
            amount: payload.amount,
            status: PaymentEventStatus::Pending,
            reject_reason: None,
            received_at: Utc::now(),
        };

        if verify_signature(&payload.canonical_string(), signature, &self.secret) {
            event.status = PaymentEventStatus::Verified;
        } else {
            event.status = PaymentEventStatus::Rejected;
            event.reject_reason = Some("invalid signature".to_string());
            warn!(
                "Signature verification failed for gateway order {} payment {} (possible tampering)",
                event.gateway_order_id, event.gateway_payment_id
            );
        }

        self.events.insert(event.id, event.clone());
        Ok(event)
    }

    /// Apply a verified confirmation to its invoice, exactly once.
    pub async fn reconcile(&self, event_id: Uuid) -> Result<PaymentOutcome> {
        let event = self
            .event(event_id)
            .ok_or_else(|| Error::EventNotFound(event_id.to_string()))?;

        match event.status {
            PaymentEventStatus::Rejected => {
                return Ok(PaymentOutcome::Rejected {
                    event_id,
                    reason: event
                        .reject_reason
                        .unwrap_or_else(|| "rejected".to_string()),
                });
            }
            PaymentEventStatus::Applied => {
                return self.already_applied(event_id, &event);
            }
            PaymentEventStatus::Pending => {
                return Err(Error::Validation(
                    "confirmation has not been verified".to_string(),
                ));
            }
            PaymentEventStatus::Verified => {}
        }

        let key = event.idempotency_key();
        match self.applied.entry(key) {
            Entry::Occupied(entry) => {
                let winner = *entry.get();
                drop(entry);
                // Duplicate confirmation: terminal for this event, but
                // the caller gets the committed result.
                if winner != event_id {
                    self.set_status(
                        event_id,
                        PaymentEventStatus::Rejected,
                        Some(format!("duplicate of applied event {}", winner)),
                    )?;
                    info!(
                        "Duplicate confirmation for order {} payment {}, returning applied event {}",
                        event.gateway_order_id, event.gateway_payment_id, winner
                    );
                }
                self.already_applied(winner, &event)
            }
            Entry::Vacant(reservation) => {
                let invoice = self
                    .invoices
                    .invoice(&event.invoice_id)
                    .ok_or_else(|| Error::InvoiceNotFound(event.invoice_id.to_string()))?;

                if invoice.status == InvoicePaymentStatus::Paid {
                    drop(reservation);
                    return self.reject(event_id, "already settled");
                }

                let outstanding = invoice.outstanding();
                let mismatch = event.amount > outstanding
                    || (!self.config.allow_partial_payments && event.amount != outstanding);
                if mismatch {
                    drop(reservation);
                    return self.reject(event_id, "amount mismatch");
                }

                // The reservation guard is held across the invoice
                // write: a concurrent duplicate blocks on this key and
                // lands in the occupied arm.
                let invoice_status = match self.invoices.apply_payment(&event.invoice_id, event.amount)
                {
                    Ok(status) => status,
                    Err(Error::Validation(_)) => {
                        // Lost an invoice-level race to another payment
                        // key; the balance no longer accepts the amount.
                        drop(reservation);
                        return self.reject(event_id, "amount mismatch");
                    }
                    Err(e) => return Err(e),
                };
                reservation.insert(event_id);
                self.set_status(event_id, PaymentEventStatus::Applied, None)?;

                info!(
                    "Applied confirmation {} for invoice {} (amount {}, invoice now {:?})",
                    event_id, event.invoice_id, event.amount, invoice_status
                );
                Ok(PaymentOutcome::Applied {
                    event_id,
                    invoice_status,
                })
            }
        }
    }

    /// Receive and reconcile in one step — the webhook entry point.
    pub async fn confirm(&self, raw_payload: &str, signature: &str) -> Result<PaymentOutcome> {
        let event = self.receive(raw_payload, signature).await?;
        if event.status == PaymentEventStatus::Rejected {
            return Ok(PaymentOutcome::Rejected {
                event_id: event.id,
                reason: event
                    .reject_reason
                    .unwrap_or_else(|| "rejected".to_string()),
            });
        }
        self.reconcile(event.id).await
    }

    /// Get an event by id
    pub fn event(&self, id: Uuid) -> Option<PaymentEvent> {
        self.events.get(&id).map(|e| e.clone())
    }

    /// All events recorded for an invoice, in receipt order
    pub fn events_for_invoice(&self, invoice_id: Uuid) -> Vec<PaymentEvent> {
        let mut events: Vec<PaymentEvent> = self
            .events
            .iter()
            .filter(|e| e.invoice_id == invoice_id)
            .map(|e| e.clone())
            .collect();
        events.sort_by_key(|e| e.id);
        events
    }

    fn already_applied(&self, applied_event_id: Uuid, event: &PaymentEvent) -> Result<PaymentOutcome> {
        let invoice_status = self
            .invoices
            .invoice(&event.invoice_id)
            .map(|i| i.status)
            .ok_or_else(|| Error::InvoiceNotFound(event.invoice_id.to_string()))?;
        Ok(PaymentOutcome::AlreadyApplied {
            event_id: applied_event_id,
            invoice_status,
        })
    }

    fn reject(&self, event_id: Uuid, reason: &str) -> Result<PaymentOutcome> {
        self.set_status(
            event_id,
            PaymentEventStatus::Rejected,
            Some(reason.to_string()),
        )?;
        warn!("Confirmation {} rejected: {}", event_id, reason);
        Ok(PaymentOutcome::Rejected {
            event_id,
            reason: reason.to_string(),
        })
    }

    fn set_status(
        &self,
        event_id: Uuid,
        status: PaymentEventStatus,
        reason: Option<String>,
    ) -> Result<()> {
        let mut event = self
            .events
            .get_mut(&event_id)
            .ok_or_else(|| Error::EventNotFound(event_id.to_string()))?;
        if !event.status.can_transition(status) {
            return Err(Error::InvalidTransition(format!(
                "event {} cannot move {:?} -> {:?}",
                event_id, event.status, status
            )));
        }
        event.status = status;
        event.reject_reason = reason;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::signature::sign_payload;
    use parking_lot::Mutex;
    use std::collections::HashMap;

    const SECRET: &[u8] = b"webhook-test-secret";

    struct MemoryInvoiceStore {
        invoices: Mutex<HashMap<Uuid, InvoiceView>>,
    }

    impl MemoryInvoiceStore {
        fn with_invoice(total: i64) -> (Arc<Self>, Uuid) {
            let id = Uuid::new_v4();
            let invoice = InvoiceView {
                id,
                total: Decimal::from(total),
                paid: Decimal::ZERO,
                status: InvoicePaymentStatus::Unpaid,
            };
            let store = Arc::new(Self {
                invoices: Mutex::new(HashMap::from([(id, invoice)])),
            });
            (store, id)
        }
    }

    impl InvoiceStore for MemoryInvoiceStore {
        fn invoice(&self, id: &Uuid) -> Option<InvoiceView> {
            self.invoices.lock().get(id).cloned()
        }

        fn apply_payment(&self, id: &Uuid, amount: Decimal) -> Result<InvoicePaymentStatus> {
            let mut invoices = self.invoices.lock();
            let invoice = invoices
                .get_mut(id)
                .ok_or_else(|| Error::InvoiceNotFound(id.to_string()))?;
            if amount > invoice.outstanding() {
                return Err(Error::Validation("amount exceeds outstanding".to_string()));
            }
            invoice.paid += amount;
            invoice.status = if invoice.paid >= invoice.total {
                InvoicePaymentStatus::Paid
            } else {
                InvoicePaymentStatus::Partial
            };
            Ok(invoice.status)
        }
    }

    fn signed_payload(invoice_id: Uuid, order: &str, payment: &str, amount: i64) -> (String, String) {
        let payload = ConfirmationPayload {
            gateway_order_id: order.to_string(),
            gateway_payment_id: payment.to_string(),
            invoice_id,
            amount: Decimal::from(amount),
        };
        let raw = serde_json::to_string(&payload).unwrap();
        let signature = sign_payload(&payload.canonical_string(), SECRET);
        (raw, signature)
    }

    fn reconciler(store: Arc<MemoryInvoiceStore>) -> PaymentReconciler {
        PaymentReconciler::new(SECRET, ReconcilerConfig::default(), store).unwrap()
    }

    #[tokio::test]
    async fn test_exact_payment_settles_invoice() {
        let (store, invoice_id) = MemoryInvoiceStore::with_invoice(500);
        let reconciler = reconciler(store.clone());

        let (raw, sig) = signed_payload(invoice_id, "order_1", "pay_1", 500);
        let outcome = reconciler.confirm(&raw, &sig).await.unwrap();

        match outcome {
            PaymentOutcome::Applied { invoice_status, .. } => {
                assert_eq!(invoice_status, InvoicePaymentStatus::Paid);
            }
            other => panic!("unexpected outcome: {:?}", other),
        }
        assert_eq!(
            store.invoice(&invoice_id).unwrap().status,
            InvoicePaymentStatus::Paid
        );
    }

    #[tokio::test]
    async fn test_partial_payment_transitions_to_partial() {
        let (store, invoice_id) = MemoryInvoiceStore::with_invoice(1_000);
        let reconciler = reconciler(store);

        let (raw, sig) = signed_payload(invoice_id, "order_1", "pay_1", 400);
        let outcome = reconciler.confirm(&raw, &sig).await.unwrap();
        assert!(matches!(
            outcome,
            PaymentOutcome::Applied {
                invoice_status: InvoicePaymentStatus::Partial,
                ..
            }
        ));
    }

    #[tokio::test]
    async fn test_partial_rejected_when_disabled() {
        let (store, invoice_id) = MemoryInvoiceStore::with_invoice(1_000);
        let reconciler = PaymentReconciler::new(
            SECRET,
            ReconcilerConfig {
                allow_partial_payments: false,
            },
            store,
        )
        .unwrap();

        let (raw, sig) = signed_payload(invoice_id, "order_1", "pay_1", 400);
        let outcome = reconciler.confirm(&raw, &sig).await.unwrap();
        match outcome {
            PaymentOutcome::Rejected { reason, .. } => assert_eq!(reason, "amount mismatch"),
            other => panic!("unexpected outcome: {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_overpayment_rejected() {
        let (store, invoice_id) = MemoryInvoiceStore::with_invoice(500);
        let reconciler = reconciler(store.clone());

        let (raw, sig) = signed_payload(invoice_id, "order_1", "pay_1", 600);
        let outcome = reconciler.confirm(&raw, &sig).await.unwrap();
        assert!(matches!(
            outcome,
            PaymentOutcome::Rejected { ref reason, .. } if reason == "amount mismatch"
        ));
        assert_eq!(store.invoice(&invoice_id).unwrap().paid, Decimal::ZERO);
    }

    #[tokio::test]
    async fn test_invalid_signature_rejected_without_side_effects() {
        let (store, invoice_id) = MemoryInvoiceStore::with_invoice(500);
        let reconciler = reconciler(store.clone());

        let payload = ConfirmationPayload {
            gateway_order_id: "order_1".to_string(),
            gateway_payment_id: "pay_1".to_string(),
            invoice_id,
            amount: Decimal::from(500),
        };
        let raw = serde_json::to_string(&payload).unwrap();
        // Signature computed over a tampered amount.
        let sig = sign_payload("order_1|pay_1|999", SECRET);

        let outcome = reconciler.confirm(&raw, &sig).await.unwrap();
        match outcome {
            PaymentOutcome::Rejected { reason, .. } => assert_eq!(reason, "invalid signature"),
            other => panic!("unexpected outcome: {:?}", other),
        }
        assert_eq!(store.invoice(&invoice_id).unwrap().paid, Decimal::ZERO);
    }

    #[tokio::test]
    async fn test_missing_invoice_keeps_event_verified() {
        let (store, _) = MemoryInvoiceStore::with_invoice(500);
        let reconciler = reconciler(store);

        let (raw, sig) = signed_payload(Uuid::new_v4(), "order_1", "pay_1", 500);
        let event = reconciler.receive(&raw, &sig).await.unwrap();
        assert_eq!(event.status, PaymentEventStatus::Verified);

        let result = reconciler.reconcile(event.id).await;
        assert!(matches!(result, Err(Error::InvoiceNotFound(_))));

        // Eligible for manual retry: still Verified, not Rejected.
        assert_eq!(
            reconciler.event(event.id).unwrap().status,
            PaymentEventStatus::Verified
        );
    }

    #[tokio::test]
    async fn test_replay_returns_existing_result() {
        let (store, invoice_id) = MemoryInvoiceStore::with_invoice(500);
        let reconciler = reconciler(store.clone());

        let (raw, sig) = signed_payload(invoice_id, "order_1", "pay_1", 500);
        let first = reconciler.confirm(&raw, &sig).await.unwrap();
        let applied_id = match first {
            PaymentOutcome::Applied { event_id, .. } => event_id,
            other => panic!("unexpected outcome: {:?}", other),
        };

        // Same key replayed: short-circuits to the committed result.
        let second = reconciler.confirm(&raw, &sig).await.unwrap();
        match second {
            PaymentOutcome::AlreadyApplied {
                event_id,
                invoice_status,
            } => {
                assert_eq!(event_id, applied_id);
                assert_eq!(invoice_status, InvoicePaymentStatus::Paid);
            }
            other => panic!("unexpected outcome: {:?}", other),
        }

        // Exactly one invoice state transition.
        assert_eq!(store.invoice(&invoice_id).unwrap().paid, Decimal::from(500));
    }

    #[tokio::test]
    async fn test_concurrent_replay_applies_exactly_once() {
        let (store, invoice_id) = MemoryInvoiceStore::with_invoice(500);
        let reconciler = Arc::new(reconciler(store.clone()));

        let (raw, sig) = signed_payload(invoice_id, "order_1", "pay_1", 500);

        let mut handles = Vec::new();
        for _ in 0..8 {
            let reconciler = reconciler.clone();
            let raw = raw.clone();
            let sig = sig.clone();
            handles.push(tokio::spawn(async move {
                reconciler.confirm(&raw, &sig).await.unwrap()
            }));
        }

        let mut applied = 0;
        for handle in handles {
            match handle.await.unwrap() {
                PaymentOutcome::Applied { .. } => applied += 1,
                PaymentOutcome::AlreadyApplied { .. } => {}
                other => panic!("unexpected outcome: {:?}", other),
            }
        }

        assert_eq!(applied, 1);
        assert_eq!(store.invoice(&invoice_id).unwrap().paid, Decimal::from(500));

        // Exactly one event in the log reached Applied.
        let applied_events = reconciler
            .events_for_invoice(invoice_id)
            .into_iter()
            .filter(|e| e.status == PaymentEventStatus::Applied)
            .count();
        assert_eq!(applied_events, 1);
    }

    #[tokio::test]
    async fn test_second_payment_after_settlement_rejected() {
        let (store, invoice_id) = MemoryInvoiceStore::with_invoice(500);
        let reconciler = reconciler(store);

        let (raw, sig) = signed_payload(invoice_id, "order_1", "pay_1", 500);
        reconciler.confirm(&raw, &sig).await.unwrap();

        // A different payment against a settled invoice.
        let (raw, sig) = signed_payload(invoice_id, "order_2", "pay_2", 500);
        let outcome = reconciler.confirm(&raw, &sig).await.unwrap();
        match outcome {
            PaymentOutcome::Rejected { reason, .. } => assert_eq!(reason, "already settled"),
            other => panic!("unexpected outcome: {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_malformed_payload_is_validation_error() {
        let (store, _) = MemoryInvoiceStore::with_invoice(500);
        let reconciler = reconciler(store);

        let result = reconciler.receive("{not json", "sig").await;
        assert!(matches!(result, Err(Error::Validation(_))));
    }

    #[test]
    fn test_empty_secret_rejected() {
        let (store, _) = MemoryInvoiceStore::with_invoice(500);
        let result = PaymentReconciler::new(Vec::new(), ReconcilerConfig::default(), store);
        assert!(matches!(result, Err(Error::Config(_))));
    }
}
