//! First-match rule evaluation
//!
//! Deterministic order: `(priority asc, created_at asc)`. Evaluation is
//! pure over the snapshot and the current rule set, so it is safe to
//! call repeatedly and in parallel for different transactions.

use crate::store::RuleStore;
use crate::types::{Classification, EntityStatus, MatchOutcome, TransactionSnapshot};
use std::sync::Arc;
use tracing::warn;

/// Evaluates the active rule set against transaction snapshots
pub struct RuleMatcher {
    store: Arc<dyn RuleStore>,
}

impl RuleMatcher {
    /// Create a matcher over a rule store
    pub fn new(store: Arc<dyn RuleStore>) -> Self {
        Self { store }
    }

    /// Classify a transaction snapshot.
    ///
    /// Returns the target of the first rule whose conditions all match,
    /// or [`MatchOutcome::Unclassified`] when none does. A rule whose
    /// target cost center is missing or inactive is a configuration
    /// inconsistency: it is skipped with a warning rather than failing
    /// the whole evaluation.
    pub fn classify(&self, snapshot: &TransactionSnapshot) -> crate::Result<MatchOutcome> {
        let mut rules = self.store.active_rules();
        rules.sort_by(|a, b| {
            a.priority
                .cmp(&b.priority)
                .then(a.created_at.cmp(&b.created_at))
        });

        for rule in &rules {
            match self.store.cost_center(&rule.target.cost_center_id) {
                Some(cc) if cc.status == EntityStatus::Active => {}
                Some(_) => {
                    warn!(
                        "Rule {} ({}) targets inactive cost center {}, skipping",
                        rule.name, rule.id, rule.target.cost_center_id
                    );
                    continue;
                }
                None => {
                    warn!(
                        "Rule {} ({}) targets missing cost center {}, skipping",
                        rule.name, rule.id, rule.target.cost_center_id
                    );
                    continue;
                }
            }

            if rule.matches(snapshot) {
                return Ok(MatchOutcome::Classified(Classification {
                    rule_id: rule.id,
                    cost_center_id: rule.target.cost_center_id.clone(),
                    analytical_account_id: rule.target.analytical_account_id.clone(),
                }));
            }
        }

        Ok(MatchOutcome::Unclassified)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::InMemoryRuleStore;
    use crate::types::{
        Actor, AnalyticalAccountId, ClassificationTarget, Condition, CostCenter, CostCenterId,
        TextField,
    };
    use rust_decimal::Decimal;

    fn snapshot(amount: i64, counterpart: &str) -> TransactionSnapshot {
        TransactionSnapshot {
            amount: Decimal::from(amount),
            counterpart_type: counterpart.to_string(),
            product_category: None,
            tags: vec![],
            description: None,
        }
    }

    fn target(cc: &str, account: &str) -> ClassificationTarget {
        ClassificationTarget {
            cost_center_id: CostCenterId::new(cc),
            analytical_account_id: AnalyticalAccountId::new(account),
        }
    }

    fn setup() -> (Arc<InMemoryRuleStore>, Actor) {
        let store = Arc::new(InMemoryRuleStore::new());
        let admin = Actor::admin("admin");
        for cc in ["Procurement", "General"] {
            store
                .upsert_cost_center(
                    CostCenter {
                        id: CostCenterId::new(cc),
                        name: cc.to_string(),
                        status: crate::types::EntityStatus::Active,
                    },
                    &admin,
                )
                .unwrap();
        }
        (store, admin)
    }

    #[test]
    fn test_first_matching_rule_wins_by_priority() {
        let (store, admin) = setup();

        // Rule A: priority 1, matches contact type VENDOR
        store
            .create_rule(
                "vendor spend",
                1,
                vec![Condition::FieldEquals {
                    field: TextField::CounterpartType,
                    value: "VENDOR".to_string(),
                }],
                target("Procurement", "AA-PROC"),
                &admin,
            )
            .unwrap();

        // Rule B: priority 2, matches any positive amount
        store
            .create_rule(
                "catch-all",
                2,
                vec![Condition::AmountRange {
                    min: Some(Decimal::ZERO),
                    max: None,
                }],
                target("General", "AA-GEN"),
                &admin,
            )
            .unwrap();

        let matcher = RuleMatcher::new(store);

        // Vendor transaction of 500: both rules match, A wins
        match matcher.classify(&snapshot(500, "VENDOR")).unwrap() {
            MatchOutcome::Classified(c) => {
                assert_eq!(c.cost_center_id, CostCenterId::new("Procurement"));
            }
            MatchOutcome::Unclassified => panic!("expected classification"),
        }

        // Non-vendor transaction falls through to the catch-all
        match matcher.classify(&snapshot(500, "CUSTOMER")).unwrap() {
            MatchOutcome::Classified(c) => {
                assert_eq!(c.cost_center_id, CostCenterId::new("General"));
            }
            MatchOutcome::Unclassified => panic!("expected classification"),
        }
    }

    #[test]
    fn test_equal_priority_breaks_ties_by_creation_order() {
        let (store, admin) = setup();

        let first = store
            .create_rule("first", 5, vec![], target("Procurement", "AA-1"), &admin)
            .unwrap();
        let _second = store
            .create_rule("second", 5, vec![], target("General", "AA-2"), &admin)
            .unwrap();

        let matcher = RuleMatcher::new(store);
        match matcher.classify(&snapshot(10, "VENDOR")).unwrap() {
            MatchOutcome::Classified(c) => assert_eq!(c.rule_id, first.id),
            MatchOutcome::Unclassified => panic!("expected classification"),
        }
    }

    #[test]
    fn test_no_match_is_unclassified() {
        let (store, admin) = setup();
        store
            .create_rule(
                "vendors only",
                1,
                vec![Condition::FieldEquals {
                    field: TextField::CounterpartType,
                    value: "VENDOR".to_string(),
                }],
                target("Procurement", "AA-1"),
                &admin,
            )
            .unwrap();

        let matcher = RuleMatcher::new(store);
        assert_eq!(
            matcher.classify(&snapshot(10, "CUSTOMER")).unwrap(),
            MatchOutcome::Unclassified
        );
    }

    #[test]
    fn test_rule_targeting_inactive_cost_center_is_skipped() {
        let (store, admin) = setup();

        store
            .create_rule("stale", 1, vec![], target("Procurement", "AA-1"), &admin)
            .unwrap();
        store
            .create_rule("fallback", 2, vec![], target("General", "AA-2"), &admin)
            .unwrap();

        store
            .deactivate_cost_center(&CostCenterId::new("Procurement"), &admin)
            .unwrap();

        // The stale rule degrades to a skip; evaluation continues.
        let matcher = RuleMatcher::new(store);
        match matcher.classify(&snapshot(10, "VENDOR")).unwrap() {
            MatchOutcome::Classified(c) => {
                assert_eq!(c.cost_center_id, CostCenterId::new("General"));
            }
            MatchOutcome::Unclassified => panic!("expected fallback classification"),
        }
    }

    #[test]
    fn test_and_semantics_require_every_condition() {
        let (store, admin) = setup();
        store
            .create_rule(
                "big vendor spend",
                1,
                vec![
                    Condition::FieldEquals {
                        field: TextField::CounterpartType,
                        value: "VENDOR".to_string(),
                    },
                    Condition::AmountRange {
                        min: Some(Decimal::from(1000)),
                        max: None,
                    },
                ],
                target("Procurement", "AA-1"),
                &admin,
            )
            .unwrap();

        let matcher = RuleMatcher::new(store);
        assert_eq!(
            matcher.classify(&snapshot(500, "VENDOR")).unwrap(),
            MatchOutcome::Unclassified
        );
        assert!(matches!(
            matcher.classify(&snapshot(1500, "VENDOR")).unwrap(),
            MatchOutcome::Classified(_)
        ));
    }
}
