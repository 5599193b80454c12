//! Rule and cost-center storage
//!
//! Rules and cost centers are read-mostly: the matcher evaluates them
//! on every transaction while an administrator edits them rarely.
//! [`InMemoryRuleStore`] is the authoritative store; [`CachedRuleStore`]
//! layers a short-TTL snapshot on top, invalidated on every mutation.

use crate::error::{Error, Result};
use crate::types::{
    Actor, AnalyticalRule, ClassificationTarget, Condition, CostCenter, CostCenterId, EntityStatus,
};
use chrono::Utc;
use parking_lot::RwLock;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::info;
use uuid::Uuid;

/// Read seam the matcher evaluates against
pub trait RuleStore: Send + Sync {
    /// All active rules, unordered (the matcher sorts)
    fn active_rules(&self) -> Vec<AnalyticalRule>;

    /// Look up a cost center by id
    fn cost_center(&self, id: &CostCenterId) -> Option<CostCenter>;
}

/// In-memory authoritative store for rules and cost centers.
///
/// Mutations require an administrator and bump a generation counter so
/// layered caches can detect staleness without a write callback.
pub struct InMemoryRuleStore {
    rules: RwLock<HashMap<Uuid, AnalyticalRule>>,
    cost_centers: RwLock<HashMap<CostCenterId, CostCenter>>,
    generation: AtomicU64,
}

impl Default for InMemoryRuleStore {
    fn default() -> Self {
        Self::new()
    }
}

impl InMemoryRuleStore {
    /// Create an empty store
    pub fn new() -> Self {
        Self {
            rules: RwLock::new(HashMap::new()),
            cost_centers: RwLock::new(HashMap::new()),
            generation: AtomicU64::new(0),
        }
    }

    /// Current mutation generation
    pub fn generation(&self) -> u64 {
        self.generation.load(Ordering::Acquire)
    }

    fn bump_generation(&self) {
        self.generation.fetch_add(1, Ordering::Release);
    }

    fn require_admin(&self, actor: &Actor, action: &str) -> Result<()> {
        if !actor.is_admin {
            return Err(Error::Unauthorized(format!(
                "actor {} may not {}",
                actor.id, action
            )));
        }
        Ok(())
    }

    /// Create or replace a cost center
    pub fn upsert_cost_center(&self, cost_center: CostCenter, actor: &Actor) -> Result<()> {
        self.require_admin(actor, "manage cost centers")?;
        if cost_center.name.is_empty() {
            return Err(Error::Validation(
                "cost center name must not be empty".to_string(),
            ));
        }

        self.cost_centers
            .write()
            .insert(cost_center.id.clone(), cost_center);
        self.bump_generation();
        Ok(())
    }

    /// Soft-delete a cost center.
    ///
    /// Cost centers are never hard-deleted while referenced by rules,
    /// budgets or classified transactions; retirement is a status
    /// transition and the matcher skips rules targeting it.
    pub fn deactivate_cost_center(&self, id: &CostCenterId, actor: &Actor) -> Result<()> {
        self.require_admin(actor, "manage cost centers")?;

        let mut cost_centers = self.cost_centers.write();
        let cc = cost_centers
            .get_mut(id)
            .ok_or_else(|| Error::NotFound(format!("cost center {}", id)))?;
        cc.status = EntityStatus::Inactive;
        drop(cost_centers);

        self.bump_generation();
        info!("Cost center {} deactivated by {}", id, actor.id);
        Ok(())
    }

    /// Create a new analytical rule
    pub fn create_rule(
        &self,
        name: impl Into<String>,
        priority: i32,
        conditions: Vec<Condition>,
        target: ClassificationTarget,
        actor: &Actor,
    ) -> Result<AnalyticalRule> {
        self.require_admin(actor, "manage rules")?;

        let name = name.into();
        if name.is_empty() {
            return Err(Error::Validation("rule name must not be empty".to_string()));
        }
        for condition in &conditions {
            condition.validate()?;
        }
        match self.cost_center(&target.cost_center_id) {
            Some(cc) if cc.status == EntityStatus::Active => {}
            Some(_) => {
                return Err(Error::Configuration(format!(
                    "cost center {} is inactive and cannot be targeted",
                    target.cost_center_id
                )));
            }
            None => {
                return Err(Error::NotFound(format!(
                    "cost center {}",
                    target.cost_center_id
                )));
            }
        }

        let rule = AnalyticalRule {
            id: Uuid::now_v7(),
            name,
            priority,
            conditions,
            target,
            status: EntityStatus::Active,
            created_at: Utc::now(),
        };

        self.rules.write().insert(rule.id, rule.clone());
        self.bump_generation();
        info!("Rule {} ({}) created by {}", rule.name, rule.id, actor.id);
        Ok(rule)
    }

    /// Activate or deactivate a rule
    pub fn set_rule_status(&self, id: Uuid, status: EntityStatus, actor: &Actor) -> Result<()> {
        self.require_admin(actor, "manage rules")?;

        let mut rules = self.rules.write();
        let rule = rules
            .get_mut(&id)
            .ok_or_else(|| Error::NotFound(format!("rule {}", id)))?;
        rule.status = status;
        drop(rules);

        self.bump_generation();
        Ok(())
    }

    /// Get a rule by id
    pub fn rule(&self, id: Uuid) -> Option<AnalyticalRule> {
        self.rules.read().get(&id).cloned()
    }
}

impl RuleStore for InMemoryRuleStore {
    fn active_rules(&self) -> Vec<AnalyticalRule> {
        self.rules
            .read()
            .values()
            .filter(|r| r.status == EntityStatus::Active)
            .cloned()
            .collect()
    }

    fn cost_center(&self, id: &CostCenterId) -> Option<CostCenter> {
        self.cost_centers.read().get(id).cloned()
    }
}

struct CacheEntry {
    rules: Arc<Vec<AnalyticalRule>>,
    generation: u64,
    fetched_at: Instant,
}

/// Short-TTL snapshot cache over the active rule set.
///
/// Budget rows are write-hot and must never be cached across requests;
/// rules are the opposite, so the matcher reads them through this layer.
/// A snapshot is reused until it ages past the TTL or a mutation bumps
/// the store generation.
pub struct CachedRuleStore {
    inner: Arc<InMemoryRuleStore>,
    ttl: Duration,
    entry: RwLock<Option<CacheEntry>>,
}

impl CachedRuleStore {
    /// Wrap a store with the given snapshot TTL
    pub fn new(inner: Arc<InMemoryRuleStore>, ttl: Duration) -> Self {
        Self {
            inner,
            ttl,
            entry: RwLock::new(None),
        }
    }

    /// The underlying authoritative store (for admin mutations)
    pub fn inner(&self) -> &Arc<InMemoryRuleStore> {
        &self.inner
    }

    fn snapshot(&self) -> Arc<Vec<AnalyticalRule>> {
        let generation = self.inner.generation();

        if let Some(entry) = self.entry.read().as_ref() {
            if entry.generation == generation && entry.fetched_at.elapsed() < self.ttl {
                return entry.rules.clone();
            }
        }

        let rules = Arc::new(self.inner.active_rules());
        *self.entry.write() = Some(CacheEntry {
            rules: rules.clone(),
            generation,
            fetched_at: Instant::now(),
        });
        rules
    }
}

impl RuleStore for CachedRuleStore {
    fn active_rules(&self) -> Vec<AnalyticalRule> {
        self.snapshot().as_ref().clone()
    }

    fn cost_center(&self, id: &CostCenterId) -> Option<CostCenter> {
        self.inner.cost_center(id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::AnalyticalAccountId;

    fn target(cc: &str) -> ClassificationTarget {
        ClassificationTarget {
            cost_center_id: CostCenterId::new(cc),
            analytical_account_id: AnalyticalAccountId::new("AA-1"),
        }
    }

    fn store_with_cc(cc: &str) -> InMemoryRuleStore {
        let store = InMemoryRuleStore::new();
        store
            .upsert_cost_center(
                CostCenter {
                    id: CostCenterId::new(cc),
                    name: cc.to_string(),
                    status: EntityStatus::Active,
                },
                &Actor::admin("admin"),
            )
            .unwrap();
        store
    }

    #[test]
    fn test_non_admin_cannot_mutate() {
        let store = store_with_cc("CC-1");
        let user = Actor::user("intern");

        let result = store.create_rule("r", 1, vec![], target("CC-1"), &user);
        assert!(matches!(result, Err(Error::Unauthorized(_))));

        let result = store.deactivate_cost_center(&CostCenterId::new("CC-1"), &user);
        assert!(matches!(result, Err(Error::Unauthorized(_))));
    }

    #[test]
    fn test_rule_requires_existing_cost_center() {
        let store = store_with_cc("CC-1");
        let result = store.create_rule("r", 1, vec![], target("CC-MISSING"), &Actor::admin("a"));
        assert!(matches!(result, Err(Error::NotFound(_))));
    }

    #[test]
    fn test_rule_cannot_target_inactive_cost_center() {
        let store = store_with_cc("CC-1");
        let admin = Actor::admin("a");
        store
            .deactivate_cost_center(&CostCenterId::new("CC-1"), &admin)
            .unwrap();

        let result = store.create_rule("r", 1, vec![], target("CC-1"), &admin);
        assert!(matches!(result, Err(Error::Configuration(_))));
    }

    #[test]
    fn test_inactive_rules_not_listed() {
        let store = store_with_cc("CC-1");
        let admin = Actor::admin("a");
        let rule = store
            .create_rule("r", 1, vec![], target("CC-1"), &admin)
            .unwrap();
        assert_eq!(store.active_rules().len(), 1);

        store
            .set_rule_status(rule.id, EntityStatus::Inactive, &admin)
            .unwrap();
        assert!(store.active_rules().is_empty());
    }

    #[test]
    fn test_cache_invalidated_on_write() {
        let inner = Arc::new(store_with_cc("CC-1"));
        let cached = CachedRuleStore::new(inner.clone(), Duration::from_secs(3600));
        let admin = Actor::admin("a");

        assert!(cached.active_rules().is_empty());

        // A mutation must be visible through the cache immediately,
        // even within the TTL.
        inner
            .create_rule("r", 1, vec![], target("CC-1"), &admin)
            .unwrap();
        assert_eq!(cached.active_rules().len(), 1);
    }

    #[test]
    fn test_cache_serves_snapshot_within_ttl() {
        let inner = Arc::new(store_with_cc("CC-1"));
        let admin = Actor::admin("a");
        inner
            .create_rule("r", 1, vec![], target("CC-1"), &admin)
            .unwrap();

        let cached = CachedRuleStore::new(inner, Duration::from_secs(3600));
        let first = cached.active_rules();
        let second = cached.active_rules();
        assert_eq!(first.len(), second.len());
    }
}
