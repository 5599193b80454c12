//! Core types for budget tracking

use chrono::{DateTime, NaiveDate, Utc};
use rule_engine::CostCenterId;
use rust_decimal::prelude::ToPrimitive;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Budget lifecycle status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum BudgetStatus {
    /// Created but not yet enforced
    Draft,
    /// Enforced; consumption is tracked against it
    Active,
    /// Period finished; no further consumption
    Closed,
}

/// How an over-allocation is handled
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum EnforcementPolicy {
    /// Always allow; emit a warning signal when consumed exceeds
    /// allocated
    Soft,
    /// Reject consumption that would exceed the allocation; the caller
    /// (typically an approval workflow) must override or downsize
    Hard,
}

/// Input for creating a budget
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BudgetDraft {
    /// Cost center the budget covers
    pub cost_center_id: CostCenterId,

    /// First day of the period (inclusive)
    pub period_start: NaiveDate,

    /// Last day of the period (inclusive)
    pub period_end: NaiveDate,

    /// Initial allocation, recorded as the first revision
    pub initial_allocation: Decimal,

    /// Enforcement policy
    pub enforcement: EnforcementPolicy,
}

/// A budget for one cost center over one period.
///
/// The allocated amount is not stored here: it is derived from the
/// revision log (see [`BudgetRevision`]).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Budget {
    /// Budget ID
    pub id: Uuid,

    /// Cost center the budget covers
    pub cost_center_id: CostCenterId,

    /// First day of the period (inclusive)
    pub period_start: NaiveDate,

    /// Last day of the period (inclusive)
    pub period_end: NaiveDate,

    /// Lifecycle status
    pub status: BudgetStatus,

    /// Enforcement policy
    pub enforcement: EnforcementPolicy,

    /// Creation timestamp
    pub created_at: DateTime<Utc>,
}

impl Budget {
    /// True when `date` falls within the budget period
    pub fn covers(&self, date: NaiveDate) -> bool {
        date >= self.period_start && date <= self.period_end
    }

    /// True when two periods share at least one day
    pub fn overlaps(&self, other_start: NaiveDate, other_end: NaiveDate) -> bool {
        self.period_start <= other_end && other_start <= self.period_end
    }
}

/// Append-only record of an allocation change.
///
/// The current allocated amount of a budget equals the sum of its
/// revision deltas; revisions are never mutated or deleted.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BudgetRevision {
    /// Revision ID (time-ordered)
    pub id: Uuid,

    /// Budget the revision belongs to
    pub budget_id: Uuid,

    /// Signed change to the allocation
    pub amount_delta: Decimal,

    /// Why the allocation changed
    pub reason: String,

    /// Actor who made the change
    pub revised_by: String,

    /// When the change was made
    pub timestamp: DateTime<Utc>,
}

/// Point-in-time utilization of a budget
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UtilizationSnapshot {
    /// Budget the snapshot describes
    pub budget_id: Uuid,

    /// Cost center the budget covers
    pub cost_center_id: CostCenterId,

    /// Current allocation (sum of revisions)
    pub allocated: Decimal,

    /// Consumed so far
    pub consumed: Decimal,

    /// Allocated minus consumed (negative when over-allocated)
    pub remaining: Decimal,

    /// Consumed as a fraction of allocated, in percent
    pub percent: f64,
}

impl UtilizationSnapshot {
    /// Build a snapshot from raw amounts
    pub fn compute(
        budget_id: Uuid,
        cost_center_id: CostCenterId,
        allocated: Decimal,
        consumed: Decimal,
    ) -> Self {
        let percent = if allocated == Decimal::ZERO {
            0.0
        } else {
            (consumed / allocated).to_f64().unwrap_or(0.0) * 100.0
        };

        Self {
            budget_id,
            cost_center_id,
            allocated,
            consumed,
            remaining: allocated - consumed,
            percent,
        }
    }
}

/// Outcome of posting consumption
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum ConsumptionOutcome {
    /// Booked against an active budget
    Booked {
        /// Utilization after the posting
        utilization: UtilizationSnapshot,
        /// True when a soft-limit budget is now over its allocation
        over_allocated: bool,
    },

    /// No active budget covers the date; tracked but not blocked
    Unbudgeted {
        /// Cost center the spend belongs to
        cost_center_id: CostCenterId,
        /// Running unbudgeted total for the cost center
        total: Decimal,
    },
}

#[cfg(test)]
mod tests {
    use super::*;

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    #[test]
    fn test_period_covers_inclusive() {
        let budget = Budget {
            id: Uuid::new_v4(),
            cost_center_id: CostCenterId::new("CC"),
            period_start: date(2026, 1, 1),
            period_end: date(2026, 3, 31),
            status: BudgetStatus::Active,
            enforcement: EnforcementPolicy::Hard,
            created_at: Utc::now(),
        };

        assert!(budget.covers(date(2026, 1, 1)));
        assert!(budget.covers(date(2026, 3, 31)));
        assert!(!budget.covers(date(2025, 12, 31)));
        assert!(!budget.covers(date(2026, 4, 1)));
    }

    #[test]
    fn test_overlap_detection() {
        let budget = Budget {
            id: Uuid::new_v4(),
            cost_center_id: CostCenterId::new("CC"),
            period_start: date(2026, 1, 1),
            period_end: date(2026, 3, 31),
            status: BudgetStatus::Active,
            enforcement: EnforcementPolicy::Hard,
            created_at: Utc::now(),
        };

        assert!(budget.overlaps(date(2026, 3, 31), date(2026, 6, 30)));
        assert!(budget.overlaps(date(2025, 12, 1), date(2026, 1, 1)));
        assert!(!budget.overlaps(date(2026, 4, 1), date(2026, 6, 30)));
    }

    #[test]
    fn test_utilization_percent() {
        let snapshot = UtilizationSnapshot::compute(
            Uuid::new_v4(),
            CostCenterId::new("CC"),
            Decimal::from(10_000),
            Decimal::from(2_500),
        );
        assert_eq!(snapshot.remaining, Decimal::from(7_500));
        assert!((snapshot.percent - 25.0).abs() < f64::EPSILON);
    }

    #[test]
    fn test_utilization_zero_allocation() {
        let snapshot = UtilizationSnapshot::compute(
            Uuid::new_v4(),
            CostCenterId::new("CC"),
            Decimal::ZERO,
            Decimal::from(100),
        );
        assert_eq!(snapshot.percent, 0.0);
        assert_eq!(snapshot.remaining, Decimal::from(-100));
    }
}
