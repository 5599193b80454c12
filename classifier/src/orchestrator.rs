//! Classify-and-book orchestration
//!
//! Ties the rule matcher, the budget ledger and the payment reconciler
//! together. Ordering discipline: the budget write happens before the
//! transaction is persisted or updated, so a hard-limit rejection (or a
//! cancelled request) leaves no partial state behind.

use crate::config::ClassifierConfig;
use crate::error::{Error, Result};
use crate::store::{settlement_status, TransactionStore};
use crate::types::{BookingOutcome, ClassificationSource, Transaction, TransactionDraft};
use budget_ledger::{BudgetLedger, ConsumptionOutcome, UtilizationSnapshot};
use chrono::NaiveDate;
use payment_reconciler::{PaymentEvent, PaymentOutcome, PaymentReconciler, ReconcilerConfig};
use rule_engine::{
    Actor, AnalyticalAccountId, CachedRuleStore, CostCenterId, EntityStatus, InMemoryRuleStore,
    MatchOutcome, RuleMatcher, RuleStore,
};
use rust_decimal::Decimal;
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};
use uuid::Uuid;

/// Entry point of the budget-control core.
///
/// Holds the rule store, the budget ledger, the transaction store and
/// the payment reconciler, and exposes the operations collaborators
/// call: classify-and-book, amend, reclassify, void, utilization
/// reporting and payment confirmation intake.
pub struct TransactionClassifier {
    rules: Arc<CachedRuleStore>,
    matcher: RuleMatcher,
    ledger: Arc<BudgetLedger>,
    transactions: Arc<TransactionStore>,
    reconciler: PaymentReconciler,
}

impl TransactionClassifier {
    /// Build the core from configuration
    pub fn new(config: ClassifierConfig) -> Result<Self> {
        config.validate()?;

        let rule_store = Arc::new(InMemoryRuleStore::new());
        let rules = Arc::new(CachedRuleStore::new(
            rule_store,
            Duration::from_millis(config.rule_cache_ttl_ms),
        ));
        let matcher = RuleMatcher::new(rules.clone() as Arc<dyn rule_engine::RuleStore>);
        let transactions = Arc::new(TransactionStore::new());
        let reconciler = PaymentReconciler::new(
            config.gateway_secret.as_bytes(),
            ReconcilerConfig {
                allow_partial_payments: config.allow_partial_payments,
            },
            transactions.clone() as Arc<dyn payment_reconciler::InvoiceStore>,
        )?;

        Ok(Self {
            rules,
            matcher,
            ledger: Arc::new(BudgetLedger::new()),
            transactions,
            reconciler,
        })
    }

    /// Rule and cost-center store (admin mutations go through
    /// [`CachedRuleStore::inner`])
    pub fn rules(&self) -> &Arc<CachedRuleStore> {
        &self.rules
    }

    /// Budget ledger (budget administration and reporting)
    pub fn ledger(&self) -> &Arc<BudgetLedger> {
        &self.ledger
    }

    /// Transaction store
    pub fn transactions(&self) -> &Arc<TransactionStore> {
        &self.transactions
    }

    /// Classify a new transaction and book its consumption.
    ///
    /// The consumption write precedes persistence: when a hard budget
    /// limit rejects the amount, the error propagates and the
    /// transaction is not stored. An unclassified transaction is stored
    /// with empty classification fields and waits for a manual
    /// assignment.
    pub async fn classify_and_book(&self, draft: TransactionDraft) -> Result<BookingOutcome> {
        if draft.amount <= Decimal::ZERO {
            return Err(Error::Validation(
                "transaction amount must be positive".to_string(),
            ));
        }

        let mut transaction = Transaction::from_draft(Uuid::now_v7(), draft);

        match self.matcher.classify(&transaction.snapshot())? {
            MatchOutcome::Classified(classification) => {
                let consumption = self.ledger.record_consumption(
                    &classification.cost_center_id,
                    transaction.occurred_at,
                    transaction.amount,
                )?;

                transaction.cost_center_id = Some(classification.cost_center_id);
                transaction.analytical_account_id = Some(classification.analytical_account_id);
                transaction.classification_source = Some(ClassificationSource::Auto);
                self.transactions.put(transaction.clone());

                info!(
                    "Transaction {} classified to {} by rule {}",
                    transaction.id,
                    transaction
                        .cost_center_id
                        .as_ref()
                        .map(|c| c.as_str())
                        .unwrap_or(""),
                    classification.rule_id
                );
                Ok(BookingOutcome::Classified {
                    transaction,
                    consumption,
                })
            }
            MatchOutcome::Unclassified => {
                self.transactions.put(transaction.clone());
                info!(
                    "Transaction {} unclassified, awaiting manual assignment",
                    transaction.id
                );
                Ok(BookingOutcome::Pending { transaction })
            }
        }
    }

    /// Amend a transaction's attributes.
    ///
    /// Runs under the transaction's cell guard, so a concurrently
    /// applied payment cannot be overwritten by a stale write-back.
    /// Previous consumption is reversed, then the matcher re-runs —
    /// unless the classification was assigned manually, which is never
    /// overwritten. If re-booking fails (hard limit), the previous
    /// consumption is restored and the transaction is left untouched.
    pub async fn amend(&self, id: Uuid, amended: TransactionDraft) -> Result<BookingOutcome> {
        if amended.amount <= Decimal::ZERO {
            return Err(Error::Validation(
                "transaction amount must be positive".to_string(),
            ));
        }

        self.transactions
            .with_mut(id, |tx| self.amend_in_cell(tx, amended))
            .ok_or_else(|| Error::NotFound(format!("transaction {}", id)))?
    }

    fn amend_in_cell(&self, tx: &mut Transaction, amended: TransactionDraft) -> Result<BookingOutcome> {
        if tx.voided {
            return Err(Error::Conflict(format!(
                "transaction {} is voided and cannot be amended",
                tx.id
            )));
        }

        let previous = tx.clone();
        if let Some(cost_center_id) = &previous.cost_center_id {
            self.ledger.reverse_consumption(
                cost_center_id,
                previous.occurred_at,
                previous.amount,
            )?;
        }

        let mut updated = previous.clone();
        updated.kind = amended.kind;
        updated.amount = amended.amount;
        updated.counterpart_type = amended.counterpart_type;
        updated.product_category = amended.product_category;
        updated.tags = amended.tags;
        updated.description = amended.description;
        updated.occurred_at = amended.occurred_at;

        match self.rebook(&mut updated) {
            Ok(consumption) => {
                // Settlement fields belong to the payment path; the
                // cell guard keeps `paid` stable, only the status needs
                // recomputing against the new total.
                updated.payment_status = settlement_status(updated.amount, updated.paid);
                *tx = updated;
                Ok(match consumption {
                    Some(consumption) => BookingOutcome::Classified {
                        transaction: tx.clone(),
                        consumption,
                    },
                    None => BookingOutcome::Pending {
                        transaction: tx.clone(),
                    },
                })
            }
            Err(e) => {
                self.restore_consumption(&previous);
                Err(e)
            }
        }
    }

    /// Book consumption for an amended transaction, honoring a manual
    /// classification. `None` means no rule matched.
    fn rebook(&self, updated: &mut Transaction) -> Result<Option<ConsumptionOutcome>> {
        if updated.classification_source == Some(ClassificationSource::Manual) {
            // cost_center_id is always set for manual classifications
            let cost_center_id = updated
                .cost_center_id
                .clone()
                .ok_or_else(|| Error::Conflict("manual classification lost its cost center".to_string()))?;
            let consumption = self.ledger.record_consumption(
                &cost_center_id,
                updated.occurred_at,
                updated.amount,
            )?;
            return Ok(Some(consumption));
        }

        match self.matcher.classify(&updated.snapshot())? {
            MatchOutcome::Classified(classification) => {
                let consumption = self.ledger.record_consumption(
                    &classification.cost_center_id,
                    updated.occurred_at,
                    updated.amount,
                )?;
                updated.cost_center_id = Some(classification.cost_center_id);
                updated.analytical_account_id = Some(classification.analytical_account_id);
                updated.classification_source = Some(ClassificationSource::Auto);
                Ok(Some(consumption))
            }
            MatchOutcome::Unclassified => {
                updated.cost_center_id = None;
                updated.analytical_account_id = None;
                updated.classification_source = None;
                Ok(None)
            }
        }
    }

    /// Re-apply a transaction's previous consumption after a failed
    /// amendment. The reversal just freed this exact amount, so this is
    /// expected to succeed; a failure is logged and swallowed so the
    /// original error reaches the caller.
    fn restore_consumption(&self, previous: &Transaction) {
        if let Some(cost_center_id) = &previous.cost_center_id {
            if let Err(e) = self.ledger.record_consumption(
                cost_center_id,
                previous.occurred_at,
                previous.amount,
            ) {
                warn!(
                    "Failed to restore consumption for transaction {}: {}",
                    previous.id, e
                );
            }
        }
    }

    /// Manually assign a cost center and analytical account.
    ///
    /// Requires an administrator. Sets the classification source to
    /// `Manual`; the matcher never overrides it afterwards.
    pub async fn reclassify(
        &self,
        id: Uuid,
        cost_center_id: CostCenterId,
        analytical_account_id: AnalyticalAccountId,
        actor: &Actor,
    ) -> Result<Transaction> {
        if !actor.is_admin {
            return Err(Error::Unauthorized(format!(
                "actor {} may not reclassify transactions",
                actor.id
            )));
        }

        let cost_center = self
            .rules
            .cost_center(&cost_center_id)
            .ok_or_else(|| Error::Validation(format!("unknown cost center {}", cost_center_id)))?;
        if cost_center.status != EntityStatus::Active {
            return Err(Error::Validation(format!(
                "cost center {} is inactive",
                cost_center_id
            )));
        }

        let updated = self
            .transactions
            .with_mut(id, |tx: &mut Transaction| -> Result<Transaction> {
                if tx.voided {
                    return Err(Error::Conflict(format!(
                        "transaction {} is voided and cannot be reclassified",
                        id
                    )));
                }

                let previous = tx.clone();
                if let Some(old_cc) = &previous.cost_center_id {
                    self.ledger
                        .reverse_consumption(old_cc, previous.occurred_at, previous.amount)?;
                }

                if let Err(e) = self.ledger.record_consumption(
                    &cost_center_id,
                    previous.occurred_at,
                    previous.amount,
                ) {
                    self.restore_consumption(&previous);
                    return Err(e.into());
                }

                tx.cost_center_id = Some(cost_center_id.clone());
                tx.analytical_account_id = Some(analytical_account_id.clone());
                tx.classification_source = Some(ClassificationSource::Manual);
                Ok(tx.clone())
            })
            .ok_or_else(|| Error::NotFound(format!("transaction {}", id)))??;

        info!(
            "Transaction {} manually classified to {} by {}",
            id, cost_center_id, actor.id
        );
        Ok(updated)
    }

    /// Void a transaction, reversing its booked consumption.
    ///
    /// The void claim and the flag write happen under the cell guard,
    /// so two concurrent voids cannot both reverse the consumption.
    pub async fn void(&self, id: Uuid) -> Result<Transaction> {
        let voided = self
            .transactions
            .with_mut(id, |tx: &mut Transaction| -> Result<Transaction> {
                if tx.voided {
                    return Err(Error::Conflict(format!(
                        "transaction {} is already voided",
                        id
                    )));
                }

                if let Some(cost_center_id) = &tx.cost_center_id {
                    self.ledger
                        .reverse_consumption(cost_center_id, tx.occurred_at, tx.amount)?;
                }

                tx.voided = true;
                Ok(tx.clone())
            })
            .ok_or_else(|| Error::NotFound(format!("transaction {}", id)))??;

        info!("Transaction {} voided", id);
        Ok(voided)
    }

    /// Utilization of the active budget covering `period_date`
    pub fn budget_utilization(
        &self,
        cost_center_id: &CostCenterId,
        period_date: NaiveDate,
    ) -> Result<UtilizationSnapshot> {
        Ok(self.ledger.utilization(cost_center_id, period_date)?)
    }

    /// Process an inbound gateway confirmation.
    ///
    /// Settlement only moves the invoice's payment status; consumption
    /// stays where document creation booked it, so nothing is
    /// double-counted.
    pub async fn receive_payment_confirmation(
        &self,
        raw_payload: &str,
        signature: &str,
    ) -> Result<PaymentOutcome> {
        Ok(self.reconciler.confirm(raw_payload, signature).await?)
    }

    /// A recorded payment event, by id
    pub fn payment_event(&self, event_id: Uuid) -> Option<PaymentEvent> {
        self.reconciler.event(event_id)
    }

    /// The payment audit trail of a transaction
    pub fn payment_events(&self, transaction_id: Uuid) -> Vec<PaymentEvent> {
        self.reconciler.events_for_invoice(transaction_id)
    }

    /// Running unbudgeted spend of a cost center (reported, never
    /// blocked)
    pub fn unbudgeted_spend(&self, cost_center_id: &CostCenterId) -> Decimal {
        self.ledger.unbudgeted_spend(cost_center_id)
    }
}
