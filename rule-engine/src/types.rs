//! Core types for analytical classification

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Cost center identifier
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct CostCenterId(String);

impl CostCenterId {
    /// Create new cost center ID
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Get as string
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for CostCenterId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Analytical account identifier (management-reporting tag, distinct
/// from the cost center)
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct AnalyticalAccountId(String);

impl AnalyticalAccountId {
    /// Create new analytical account ID
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Get as string
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for AnalyticalAccountId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Lifecycle status shared by rules and cost centers.
///
/// There is no hard delete: retirement is a transition to `Inactive`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum EntityStatus {
    /// In use
    Active,
    /// Soft-deleted; never evaluated or assignable
    Inactive,
}

/// An organizational unit against which spend and budgets are tracked
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CostCenter {
    /// Identifier
    pub id: CostCenterId,

    /// Display name
    pub name: String,

    /// Active / soft-deleted
    pub status: EntityStatus,
}

/// Text fields of a transaction snapshot a condition can inspect
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TextField {
    /// Counterpart/contact type (e.g. "VENDOR", "CUSTOMER")
    CounterpartType,
    /// Product category, when present
    ProductCategory,
    /// Free-text description, when present
    Description,
}

/// A single predicate over a transaction snapshot.
///
/// Conditions are a closed set of kinds so the matcher stays
/// exhaustively checkable. All text comparisons are case-insensitive;
/// numeric bounds are inclusive.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum Condition {
    /// Amount within `[min, max]`; either bound may be open
    AmountRange {
        /// Inclusive lower bound
        min: Option<Decimal>,
        /// Inclusive upper bound
        max: Option<Decimal>,
    },

    /// Exact (case-insensitive) match on a text field
    FieldEquals {
        /// Field to inspect
        field: TextField,
        /// Expected value
        value: String,
    },

    /// Case-insensitive substring match on a text field
    FieldContains {
        /// Field to inspect
        field: TextField,
        /// Substring to look for
        value: String,
    },

    /// Exact-tag match against the snapshot's tag list
    TagMatch {
        /// Tag to look for (case-insensitive)
        tag: String,
    },
}

impl Condition {
    /// Evaluate this condition against a snapshot
    pub fn matches(&self, snapshot: &TransactionSnapshot) -> bool {
        match self {
            Condition::AmountRange { min, max } => {
                if let Some(min) = min {
                    if snapshot.amount < *min {
                        return false;
                    }
                }
                if let Some(max) = max {
                    if snapshot.amount > *max {
                        return false;
                    }
                }
                true
            }
            Condition::FieldEquals { field, value } => match snapshot.text_field(*field) {
                Some(actual) => actual.eq_ignore_ascii_case(value),
                None => false,
            },
            Condition::FieldContains { field, value } => match snapshot.text_field(*field) {
                Some(actual) => actual.to_lowercase().contains(&value.to_lowercase()),
                None => false,
            },
            Condition::TagMatch { tag } => snapshot
                .tags
                .iter()
                .any(|t| t.eq_ignore_ascii_case(tag)),
        }
    }

    /// Validate internal consistency (e.g. inverted bounds)
    pub fn validate(&self) -> crate::Result<()> {
        match self {
            Condition::AmountRange {
                min: Some(min),
                max: Some(max),
            } if min > max => Err(crate::Error::Validation(format!(
                "amount range lower bound {} exceeds upper bound {}",
                min, max
            ))),
            Condition::FieldEquals { value, .. } | Condition::FieldContains { value, .. }
                if value.is_empty() =>
            {
                Err(crate::Error::Validation(
                    "text condition value must not be empty".to_string(),
                ))
            }
            Condition::TagMatch { tag } if tag.is_empty() => Err(crate::Error::Validation(
                "tag condition must not be empty".to_string(),
            )),
            _ => Ok(()),
        }
    }
}

/// Classification target of a rule
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClassificationTarget {
    /// Cost center to assign
    pub cost_center_id: CostCenterId,

    /// Analytical account to assign
    pub analytical_account_id: AnalyticalAccountId,
}

/// A condition-action pair that auto-assigns a cost center and
/// analytical account to a transaction
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AnalyticalRule {
    /// Rule ID
    pub id: Uuid,

    /// Display name
    pub name: String,

    /// Evaluation priority; lower is evaluated first. Priorities need
    /// not be unique — creation time breaks ties.
    pub priority: i32,

    /// Predicates combined with AND semantics
    pub conditions: Vec<Condition>,

    /// Target assigned when every condition matches
    pub target: ClassificationTarget,

    /// Active / inactive (inactive rules are never evaluated)
    pub status: EntityStatus,

    /// Creation timestamp (tie-break for equal priorities)
    pub created_at: DateTime<Utc>,
}

impl AnalyticalRule {
    /// True when every condition matches the snapshot.
    ///
    /// A rule with no conditions is a catch-all.
    pub fn matches(&self, snapshot: &TransactionSnapshot) -> bool {
        self.conditions.iter().all(|c| c.matches(snapshot))
    }
}

/// Read-only snapshot of the transaction attributes needed for
/// predicate evaluation
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TransactionSnapshot {
    /// Transaction amount
    pub amount: Decimal,

    /// Counterpart/contact type (e.g. "VENDOR", "CUSTOMER")
    pub counterpart_type: String,

    /// Product category, when known
    pub product_category: Option<String>,

    /// Free-text tags
    pub tags: Vec<String>,

    /// Free-text description
    pub description: Option<String>,
}

impl TransactionSnapshot {
    fn text_field(&self, field: TextField) -> Option<&str> {
        match field {
            TextField::CounterpartType => Some(self.counterpart_type.as_str()),
            TextField::ProductCategory => self.product_category.as_deref(),
            TextField::Description => self.description.as_deref(),
        }
    }
}

/// A successful classification
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Classification {
    /// Rule that produced the classification
    pub rule_id: Uuid,

    /// Assigned cost center
    pub cost_center_id: CostCenterId,

    /// Assigned analytical account
    pub analytical_account_id: AnalyticalAccountId,
}

/// Outcome of a matcher evaluation
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum MatchOutcome {
    /// The first fully-matching rule's target
    Classified(Classification),

    /// No active rule matched
    Unclassified,
}

/// Acting user, reduced to the capability the core actually checks
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Actor {
    /// Stable identifier of the acting user
    pub id: String,

    /// Whether the actor may mutate rules, cost centers and budgets
    pub is_admin: bool,
}

impl Actor {
    /// An administrator
    pub fn admin(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            is_admin: true,
        }
    }

    /// A regular user
    pub fn user(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            is_admin: false,
        }
    }
}
