// src/policy/model.rs

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

use crate::store::SearchCriteria;
use crate::types::Importance;

pub type PolicyId = String;

/// A stored cleanup policy.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Policy {
    pub id: PolicyId,
    pub name: String,
    pub enabled: bool,
    /// Lower number = evaluated first and wins conflicts on shared records.
    pub priority: u32,
    pub criteria: PolicyCriteria,
    pub action: CleanupAction,
    pub safety: SafetyConfig,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Operator-supplied policy definition, before timestamps are assigned.
///
/// This is also the shape of a `[policy.<id>]` block in the config file,
/// minus the `id` (which comes from the table key there).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NewPolicy {
    #[serde(default)]
    pub id: PolicyId,
    pub name: String,
    #[serde(default = "default_enabled")]
    pub enabled: bool,
    #[serde(default = "default_priority")]
    pub priority: u32,
    pub criteria: PolicyCriteria,
    pub action: CleanupAction,
    #[serde(default)]
    pub safety: SafetyConfig,
}

fn default_enabled() -> bool {
    true
}

fn default_priority() -> u32 {
    100
}

impl NewPolicy {
    pub fn into_policy(self, now: DateTime<Utc>) -> Policy {
        Policy {
            id: self.id,
            name: self.name,
            enabled: self.enabled,
            priority: self.priority,
            criteria: self.criteria,
            action: self.action,
            safety: self.safety,
            created_at: now,
            updated_at: now,
        }
    }
}

impl From<&Policy> for NewPolicy {
    fn from(p: &Policy) -> Self {
        Self {
            id: p.id.clone(),
            name: p.name.clone(),
            enabled: p.enabled,
            priority: p.priority,
            criteria: p.criteria.clone(),
            action: p.action,
            safety: p.safety.clone(),
        }
    }
}

/// Named predicates, ANDed together. Absent predicates impose no constraint.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct PolicyCriteria {
    /// Record age >= N days.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub age_days_min: Option<u32>,
    /// Importance <= level (low < medium < high).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub importance_level_max: Option<Importance>,
    /// Spam score >= N.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub spam_score_min: Option<f64>,
    /// Promotional score >= N.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub promotional_score_min: Option<f64>,
}

impl PolicyCriteria {
    pub fn is_empty(&self) -> bool {
        self.age_days_min.is_none()
            && self.importance_level_max.is_none()
            && self.spam_score_min.is_none()
            && self.promotional_score_min.is_none()
    }

    /// Translate into the store's conjunctive query, anchored at `now`.
    ///
    /// An age reaching past the representable range clamps to the earliest
    /// instant, so it matches nothing rather than overflowing.
    pub fn to_search_criteria(&self, now: DateTime<Utc>) -> SearchCriteria {
        SearchCriteria {
            received_before: self.age_days_min.map(|days| {
                Duration::try_days(i64::from(days))
                    .and_then(|age| now.checked_sub_signed(age))
                    .unwrap_or(DateTime::<Utc>::MIN_UTC)
            }),
            importance_max: self.importance_level_max,
            spam_score_min: self.spam_score_min,
            promotional_score_min: self.promotional_score_min,
            ..SearchCriteria::default()
        }
    }
}

/// What a policy does to its matched records.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum CleanupAction {
    Delete,
    Archive,
}

impl CleanupAction {
    pub fn kind(&self) -> ActionKind {
        match self {
            CleanupAction::Delete => ActionKind::Delete,
            CleanupAction::Archive => ActionKind::Archive,
        }
    }
}

/// Registry key for action handlers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ActionKind {
    Delete,
    Archive,
}

impl std::fmt::Display for ActionKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ActionKind::Delete => f.write_str("delete"),
            ActionKind::Archive => f.write_str("archive"),
        }
    }
}

/// Ceiling on what a single execution of the policy may do.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct SafetyConfig {
    #[serde(default = "default_max_emails_per_run")]
    pub max_emails_per_run: usize,
    /// Drop `high` importance records after matching, whatever the criteria.
    #[serde(default = "default_preserve_important")]
    pub preserve_important: bool,
    #[serde(default)]
    pub require_confirmation: bool,
    /// Refuse destructive runs until a dry run has completed once.
    #[serde(default)]
    pub dry_run_first: bool,
}

fn default_max_emails_per_run() -> usize {
    100
}

fn default_preserve_important() -> bool {
    true
}

impl Default for SafetyConfig {
    fn default() -> Self {
        Self {
            max_emails_per_run: default_max_emails_per_run(),
            preserve_important: default_preserve_important(),
            require_confirmation: false,
            dry_run_first: false,
        }
    }
}
