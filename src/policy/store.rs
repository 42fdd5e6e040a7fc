// src/policy/store.rs

use std::collections::BTreeMap;
use std::sync::{Mutex, RwLock};

use chrono::{DateTime, Utc};
use tracing::{debug, info};

use crate::errors::{Result, SweepError};
use crate::policy::model::{NewPolicy, Policy, PolicyId};
use crate::policy::validate::validate_policy;
use crate::store::DocumentStore;
use crate::sync::{lock, read, write};

/// CRUD over policy definitions with write-through persistence.
///
/// Every mutation is validated, persisted, and only then made visible; a
/// failed save leaves the in-memory view untouched.
pub struct PolicyStore {
    policies: RwLock<BTreeMap<PolicyId, Policy>>,
    storage: Mutex<Box<dyn DocumentStore<Policy>>>,
}

impl std::fmt::Debug for PolicyStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PolicyStore")
            .field("policies", &read(&self.policies).len())
            .finish_non_exhaustive()
    }
}

impl PolicyStore {
    /// Open the store, loading whatever the backing storage already holds.
    pub fn open(storage: Box<dyn DocumentStore<Policy>>) -> Result<Self> {
        let loaded = storage.load_all()?;
        let policies: BTreeMap<PolicyId, Policy> =
            loaded.into_iter().map(|p| (p.id.clone(), p)).collect();
        debug!(count = policies.len(), "policy store opened");

        Ok(Self {
            policies: RwLock::new(policies),
            storage: Mutex::new(storage),
        })
    }

    /// Create a new policy. Fails with `ValidationError` on malformed input or
    /// an id collision.
    pub fn create(&self, draft: NewPolicy, now: DateTime<Utc>) -> Result<Policy> {
        validate_policy(&draft)?;

        let mut policies = write(&self.policies);
        if policies.contains_key(&draft.id) {
            return Err(SweepError::ValidationError(format!(
                "policy id '{}' already exists",
                draft.id
            )));
        }

        let policy = draft.into_policy(now);
        let mut next = policies.clone();
        next.insert(policy.id.clone(), policy.clone());
        self.persist(&next)?;
        *policies = next;

        info!(policy_id = %policy.id, priority = policy.priority, "policy created");
        Ok(policy)
    }

    /// Create the policy, or replace its definition if the id already exists.
    ///
    /// Used when seeding from the config file on every start.
    pub fn upsert(&self, draft: NewPolicy, now: DateTime<Utc>) -> Result<Policy> {
        if read(&self.policies).contains_key(&draft.id) {
            let id = draft.id.clone();
            self.update(&id, draft, now)
        } else {
            self.create(draft, now)
        }
    }

    pub fn get(&self, id: &str) -> Result<Policy> {
        read(&self.policies)
            .get(id)
            .cloned()
            .ok_or_else(|| SweepError::policy_not_found(id))
    }

    pub fn contains(&self, id: &str) -> bool {
        read(&self.policies).contains_key(id)
    }

    /// All policies, ascending priority number, then id.
    pub fn list(&self) -> Vec<Policy> {
        let mut all: Vec<Policy> = read(&self.policies).values().cloned().collect();
        all.sort_by(|a, b| a.priority.cmp(&b.priority).then_with(|| a.id.cmp(&b.id)));
        all
    }

    /// Enabled policies in evaluation order.
    pub fn list_enabled(&self) -> Vec<Policy> {
        self.list().into_iter().filter(|p| p.enabled).collect()
    }

    /// Replace a policy's definition. `created_at` is preserved.
    pub fn update(&self, id: &str, draft: NewPolicy, now: DateTime<Utc>) -> Result<Policy> {
        if draft.id != id {
            return Err(SweepError::ValidationError(format!(
                "policy id cannot change on update ('{id}' -> '{}')",
                draft.id
            )));
        }
        validate_policy(&draft)?;

        self.modify(id, now, |p| {
            p.name = draft.name;
            p.enabled = draft.enabled;
            p.priority = draft.priority;
            p.criteria = draft.criteria;
            p.action = draft.action;
            p.safety = draft.safety;
        })
    }

    pub fn set_enabled(&self, id: &str, enabled: bool, now: DateTime<Utc>) -> Result<Policy> {
        self.modify(id, now, |p| p.enabled = enabled)
    }

    pub fn set_priority(&self, id: &str, priority: u32, now: DateTime<Utc>) -> Result<Policy> {
        self.modify(id, now, |p| p.priority = priority)
    }

    pub fn delete(&self, id: &str) -> Result<Policy> {
        let mut policies = write(&self.policies);
        let mut next = policies.clone();
        let removed = next
            .remove(id)
            .ok_or_else(|| SweepError::policy_not_found(id))?;
        self.persist(&next)?;
        *policies = next;

        info!(policy_id = %id, "policy deleted");
        Ok(removed)
    }

    fn modify<F>(&self, id: &str, now: DateTime<Utc>, apply: F) -> Result<Policy>
    where
        F: FnOnce(&mut Policy),
    {
        let mut policies = write(&self.policies);
        let mut next = policies.clone();
        let policy = next
            .get_mut(id)
            .ok_or_else(|| SweepError::policy_not_found(id))?;
        apply(policy);
        policy.updated_at = now;
        let updated = policy.clone();

        self.persist(&next)?;
        *policies = next;

        debug!(
            policy_id = %id,
            enabled = updated.enabled,
            priority = updated.priority,
            "policy updated"
        );
        Ok(updated)
    }

    fn persist(&self, policies: &BTreeMap<PolicyId, Policy>) -> Result<()> {
        let items: Vec<Policy> = policies.values().cloned().collect();
        lock(&self.storage).save_all(&items)
    }
}
