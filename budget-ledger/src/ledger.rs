//! Budget consumption tracking
//!
//! Each budget lives in its own map cell; the exceeded-check and the
//! consumption write happen under the cell guard so concurrent postings
//! against the same budget serialize while unrelated budgets proceed
//! concurrently.

use crate::error::{Error, Result};
use crate::types::{
    Budget, BudgetDraft, BudgetRevision, BudgetStatus, ConsumptionOutcome, EnforcementPolicy,
    UtilizationSnapshot,
};
use chrono::{NaiveDate, Utc};
use dashmap::DashMap;
use parking_lot::{Mutex, RwLock};
use rule_engine::{Actor, CostCenterId};
use rust_decimal::Decimal;
use tracing::{info, warn};
use uuid::Uuid;

struct BudgetCell {
    budget: Budget,
    /// Cached sum of the revision log; the log stays the source of
    /// truth (see `allocation_from_revisions`)
    allocated: Decimal,
    consumed: Decimal,
}

/// Tracks allocation and consumption per cost-center budget
pub struct BudgetLedger {
    cells: DashMap<Uuid, BudgetCell>,
    by_cost_center: DashMap<CostCenterId, Vec<Uuid>>,
    /// Append-only audit trail of allocation changes
    revisions: RwLock<Vec<BudgetRevision>>,
    unbudgeted: DashMap<CostCenterId, Decimal>,
    /// Serializes rare administrative mutations (create / activate /
    /// close) so the one-active-budget-per-period invariant cannot be
    /// raced. Consumption postings never take this lock.
    admin_lock: Mutex<()>,
}

impl Default for BudgetLedger {
    fn default() -> Self {
        Self::new()
    }
}

impl BudgetLedger {
    /// Create an empty ledger
    pub fn new() -> Self {
        Self {
            cells: DashMap::new(),
            by_cost_center: DashMap::new(),
            revisions: RwLock::new(Vec::new()),
            unbudgeted: DashMap::new(),
            admin_lock: Mutex::new(()),
        }
    }

    fn require_admin(actor: &Actor, action: &str) -> Result<()> {
        if !actor.is_admin {
            return Err(Error::Unauthorized(format!(
                "actor {} may not {}",
                actor.id, action
            )));
        }
        Ok(())
    }

    fn budget_ids(&self, cost_center_id: &CostCenterId) -> Vec<Uuid> {
        self.by_cost_center
            .get(cost_center_id)
            .map(|ids| ids.clone())
            .unwrap_or_default()
    }

    fn append_revision(
        &self,
        budget_id: Uuid,
        amount_delta: Decimal,
        reason: impl Into<String>,
        revised_by: &str,
    ) {
        self.revisions.write().push(BudgetRevision {
            id: Uuid::now_v7(),
            budget_id,
            amount_delta,
            reason: reason.into(),
            revised_by: revised_by.to_string(),
            timestamp: Utc::now(),
        });
    }

    /// Check that no *active* budget of the cost center overlaps the
    /// given period. `exclude` skips the budget being mutated.
    fn check_no_active_overlap(
        &self,
        cost_center_id: &CostCenterId,
        start: NaiveDate,
        end: NaiveDate,
        exclude: Option<Uuid>,
    ) -> Result<()> {
        for id in self.budget_ids(cost_center_id) {
            if Some(id) == exclude {
                continue;
            }
            if let Some(cell) = self.cells.get(&id) {
                if cell.budget.status == BudgetStatus::Active && cell.budget.overlaps(start, end) {
                    return Err(Error::PeriodOverlap(format!(
                        "cost center {} already has active budget {} covering {}..={}",
                        cost_center_id, id, cell.budget.period_start, cell.budget.period_end
                    )));
                }
            }
        }
        Ok(())
    }

    /// Create a budget in `Draft` status.
    ///
    /// The initial allocation is recorded as the first revision.
    /// Creation is rejected when an active budget of the same cost
    /// center already overlaps the period.
    pub fn create_budget(&self, draft: BudgetDraft, actor: &Actor) -> Result<Budget> {
        Self::require_admin(actor, "create budgets")?;

        if draft.period_start > draft.period_end {
            return Err(Error::InvalidPeriod(format!(
                "period start {} is after end {}",
                draft.period_start, draft.period_end
            )));
        }
        if draft.initial_allocation < Decimal::ZERO {
            return Err(Error::InvalidAmount(
                "initial allocation must not be negative".to_string(),
            ));
        }

        let _guard = self.admin_lock.lock();
        self.check_no_active_overlap(
            &draft.cost_center_id,
            draft.period_start,
            draft.period_end,
            None,
        )?;

        let budget = Budget {
            id: Uuid::now_v7(),
            cost_center_id: draft.cost_center_id.clone(),
            period_start: draft.period_start,
            period_end: draft.period_end,
            status: BudgetStatus::Draft,
            enforcement: draft.enforcement,
            created_at: Utc::now(),
        };

        if draft.initial_allocation > Decimal::ZERO {
            self.append_revision(
                budget.id,
                draft.initial_allocation,
                "initial allocation",
                &actor.id,
            );
        }

        self.cells.insert(
            budget.id,
            BudgetCell {
                budget: budget.clone(),
                allocated: draft.initial_allocation,
                consumed: Decimal::ZERO,
            },
        );
        self.by_cost_center
            .entry(draft.cost_center_id)
            .or_default()
            .push(budget.id);

        info!(
            "Budget {} created for {} ({}..={}) by {}",
            budget.id, budget.cost_center_id, budget.period_start, budget.period_end, actor.id
        );
        Ok(budget)
    }

    /// Transition a budget from `Draft` to `Active`.
    ///
    /// Re-checks the overlap invariant: a cost center may have at most
    /// one active budget covering any given date.
    pub fn activate(&self, budget_id: Uuid, actor: &Actor) -> Result<()> {
        Self::require_admin(actor, "activate budgets")?;

        let _guard = self.admin_lock.lock();
        let (cost_center_id, start, end) = {
            let cell = self
                .cells
                .get(&budget_id)
                .ok_or_else(|| Error::NotFound(format!("budget {}", budget_id)))?;
            if cell.budget.status != BudgetStatus::Draft {
                return Err(Error::InvalidTransition(format!(
                    "budget {} is {:?}, only Draft budgets can be activated",
                    budget_id, cell.budget.status
                )));
            }
            (
                cell.budget.cost_center_id.clone(),
                cell.budget.period_start,
                cell.budget.period_end,
            )
        };

        self.check_no_active_overlap(&cost_center_id, start, end, Some(budget_id))?;

        if let Some(mut cell) = self.cells.get_mut(&budget_id) {
            cell.budget.status = BudgetStatus::Active;
        }
        Ok(())
    }

    /// Transition a budget from `Active` to `Closed`
    pub fn close(&self, budget_id: Uuid, actor: &Actor) -> Result<()> {
        Self::require_admin(actor, "close budgets")?;

        let _guard = self.admin_lock.lock();
        let mut cell = self
            .cells
            .get_mut(&budget_id)
            .ok_or_else(|| Error::NotFound(format!("budget {}", budget_id)))?;
        if cell.budget.status != BudgetStatus::Active {
            return Err(Error::InvalidTransition(format!(
                "budget {} is {:?}, only Active budgets can be closed",
                budget_id, cell.budget.status
            )));
        }
        cell.budget.status = BudgetStatus::Closed;
        Ok(())
    }

    /// Change a budget's allocation by appending a revision.
    ///
    /// The resulting allocation must not be negative; it may drop below
    /// the consumed amount, which shows up as over-allocation in
    /// utilization reports.
    pub fn revise_allocation(
        &self,
        budget_id: Uuid,
        amount_delta: Decimal,
        reason: impl Into<String>,
        actor: &Actor,
    ) -> Result<UtilizationSnapshot> {
        Self::require_admin(actor, "revise budgets")?;

        let mut cell = self
            .cells
            .get_mut(&budget_id)
            .ok_or_else(|| Error::NotFound(format!("budget {}", budget_id)))?;

        let new_allocated = cell.allocated + amount_delta;
        if new_allocated < Decimal::ZERO {
            return Err(Error::InvalidAmount(format!(
                "revision of {} would make allocation negative ({})",
                amount_delta, new_allocated
            )));
        }

        // Revision append and cache update happen under the cell guard.
        self.append_revision(budget_id, amount_delta, reason, &actor.id);
        cell.allocated = new_allocated;

        Ok(UtilizationSnapshot::compute(
            budget_id,
            cell.budget.cost_center_id.clone(),
            cell.allocated,
            cell.consumed,
        ))
    }

    /// Post consumption against the active budget covering
    /// `period_date`.
    ///
    /// With no covering active budget the amount is tracked as
    /// unbudgeted spend: reported, never blocked. Hard-limit budgets
    /// reject a posting that would push consumed past allocated; the
    /// check and the write are atomic per budget.
    pub fn record_consumption(
        &self,
        cost_center_id: &CostCenterId,
        period_date: NaiveDate,
        amount: Decimal,
    ) -> Result<ConsumptionOutcome> {
        if amount <= Decimal::ZERO {
            return Err(Error::InvalidAmount(
                "consumption amount must be positive".to_string(),
            ));
        }

        for id in self.budget_ids(cost_center_id) {
            if let Some(mut cell) = self.cells.get_mut(&id) {
                if cell.budget.status != BudgetStatus::Active || !cell.budget.covers(period_date) {
                    continue;
                }

                let new_consumed = cell.consumed + amount;
                if cell.budget.enforcement == EnforcementPolicy::Hard
                    && new_consumed > cell.allocated
                {
                    return Err(Error::BudgetExceeded {
                        budget_id: id,
                        allocated: cell.allocated,
                        consumed: cell.consumed,
                        attempted: amount,
                    });
                }

                cell.consumed = new_consumed;
                let over_allocated = cell.consumed > cell.allocated;
                if over_allocated {
                    warn!(
                        "Budget {} over allocation: consumed {} > allocated {}",
                        id, cell.consumed, cell.allocated
                    );
                }

                return Ok(ConsumptionOutcome::Booked {
                    utilization: UtilizationSnapshot::compute(
                        id,
                        cell.budget.cost_center_id.clone(),
                        cell.allocated,
                        cell.consumed,
                    ),
                    over_allocated,
                });
            }
        }

        let total = {
            let mut entry = self
                .unbudgeted
                .entry(cost_center_id.clone())
                .or_insert(Decimal::ZERO);
            *entry += amount;
            *entry
        };
        warn!(
            "Unbudgeted spend of {} for cost center {} on {} (total {})",
            amount, cost_center_id, period_date, total
        );

        Ok(ConsumptionOutcome::Unbudgeted {
            cost_center_id: cost_center_id.clone(),
            total,
        })
    }

    /// Reverse previously recorded consumption (voided or reclassified
    /// transaction).
    ///
    /// Symmetric to [`record_consumption`](Self::record_consumption):
    /// applying then reversing the same amount is a no-op on the
    /// consumed total.
    pub fn reverse_consumption(
        &self,
        cost_center_id: &CostCenterId,
        period_date: NaiveDate,
        amount: Decimal,
    ) -> Result<()> {
        if amount <= Decimal::ZERO {
            return Err(Error::InvalidAmount(
                "reversal amount must be positive".to_string(),
            ));
        }

        for id in self.budget_ids(cost_center_id) {
            if let Some(mut cell) = self.cells.get_mut(&id) {
                if cell.budget.status != BudgetStatus::Active || !cell.budget.covers(period_date) {
                    continue;
                }
                cell.consumed -= amount;
                return Ok(());
            }
        }

        let mut entry = self
            .unbudgeted
            .entry(cost_center_id.clone())
            .or_insert(Decimal::ZERO);
        *entry -= amount;
        Ok(())
    }

    /// Utilization of the active budget covering `period_date`
    pub fn utilization(
        &self,
        cost_center_id: &CostCenterId,
        period_date: NaiveDate,
    ) -> Result<UtilizationSnapshot> {
        for id in self.budget_ids(cost_center_id) {
            if let Some(cell) = self.cells.get(&id) {
                if cell.budget.status == BudgetStatus::Active && cell.budget.covers(period_date) {
                    return Ok(UtilizationSnapshot::compute(
                        id,
                        cell.budget.cost_center_id.clone(),
                        cell.allocated,
                        cell.consumed,
                    ));
                }
            }
        }
        Err(Error::NotFound(format!(
            "no active budget for cost center {} covering {}",
            cost_center_id, period_date
        )))
    }

    /// Get a budget by id
    pub fn budget(&self, budget_id: Uuid) -> Option<Budget> {
        self.cells.get(&budget_id).map(|cell| cell.budget.clone())
    }

    /// The revision log of a budget, in append order
    pub fn revisions(&self, budget_id: Uuid) -> Vec<BudgetRevision> {
        self.revisions
            .read()
            .iter()
            .filter(|r| r.budget_id == budget_id)
            .cloned()
            .collect()
    }

    /// Allocation derived from the revision log (source of truth)
    pub fn allocation_from_revisions(&self, budget_id: Uuid) -> Decimal {
        self.revisions
            .read()
            .iter()
            .filter(|r| r.budget_id == budget_id)
            .map(|r| r.amount_delta)
            .sum()
    }

    /// True when the cached allocation matches the revision log.
    ///
    /// Used by tests to guard against silent drift between the two.
    pub fn allocation_invariant_holds(&self, budget_id: Uuid) -> bool {
        match self.cells.get(&budget_id) {
            Some(cell) => cell.allocated == self.allocation_from_revisions(budget_id),
            None => false,
        }
    }

    /// Running unbudgeted spend total for a cost center
    pub fn unbudgeted_spend(&self, cost_center_id: &CostCenterId) -> Decimal {
        self.unbudgeted
            .get(cost_center_id)
            .map(|v| *v)
            .unwrap_or(Decimal::ZERO)
    }
}
