// src/policy/engine.rs

//! Policy evaluation against the record store.

use std::collections::HashSet;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use tracing::{debug, info};

use crate::automation::Clock;
use crate::errors::{Result, SweepError};
use crate::policy::model::{CleanupAction, NewPolicy, Policy, PolicyId};
use crate::policy::store::PolicyStore;
use crate::store::RecordStore;
use crate::types::Importance;

/// One matched record, with the size needed to report freed storage.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Candidate {
    pub record_id: String,
    pub size_bytes: u64,
}

/// Records matched by one policy at one point in time.
///
/// Never persisted; lives for a single evaluate → execute cycle.
#[derive(Debug, Clone)]
pub struct CandidateSet {
    pub policy_id: PolicyId,
    /// Oldest first; this is also the batch order.
    pub candidates: Vec<Candidate>,
    /// Records the criteria query returned, before any filtering.
    pub matched: usize,
    /// Records dropped by `preserve_important`.
    pub protected_removed: usize,
    /// Records dropped because another active job already claimed them.
    pub claimed_removed: usize,
    /// Whether the set was capped below the number of eligible records.
    pub truncated: bool,
    /// The cap that was applied.
    pub limit: usize,
    /// `false` when produced by [`PolicyEngine::evaluate_for_testing`] for a
    /// disabled policy.
    pub policy_enabled: bool,
    pub evaluated_at: DateTime<Utc>,
}

impl CandidateSet {
    pub fn len(&self) -> usize {
        self.candidates.len()
    }

    pub fn is_empty(&self) -> bool {
        self.candidates.is_empty()
    }

    pub fn record_ids(&self) -> Vec<String> {
        self.candidates.iter().map(|c| c.record_id.clone()).collect()
    }

    pub fn total_bytes(&self) -> u64 {
        self.candidates.iter().map(|c| c.size_bytes).sum()
    }
}

/// Per-run knobs for an evaluation.
#[derive(Debug, Clone, Default)]
pub struct EvaluationOptions {
    /// Run-level override; the effective cap is the smaller of this and
    /// `safety.max_emails_per_run`.
    pub max_emails: Option<usize>,
    /// Record ids that must not appear in the result (claimed elsewhere).
    pub exclude: HashSet<String>,
}

/// Evaluates policy criteria into candidate sets and owns policy creation.
pub struct PolicyEngine {
    policies: Arc<PolicyStore>,
    records: Arc<dyn RecordStore>,
    clock: Arc<dyn Clock>,
}

impl std::fmt::Debug for PolicyEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PolicyEngine")
            .field("policies", &self.policies)
            .field("clock", &self.clock)
            .finish_non_exhaustive()
    }
}

impl PolicyEngine {
    pub fn new(
        policies: Arc<PolicyStore>,
        records: Arc<dyn RecordStore>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            policies,
            records,
            clock,
        }
    }

    pub fn policies(&self) -> &Arc<PolicyStore> {
        &self.policies
    }

    pub fn records(&self) -> &Arc<dyn RecordStore> {
        &self.records
    }

    pub fn clock(&self) -> &Arc<dyn Clock> {
        &self.clock
    }

    /// Validate and store a new policy.
    pub fn create_policy(&self, policy: NewPolicy) -> Result<Policy> {
        self.policies.create(policy, self.clock.now())
    }

    /// Evaluate an enabled policy. Disabled policies fail with
    /// `PolicyDisabled` so that triggered runs can never pick them up.
    pub async fn evaluate_emails_for_cleanup(&self, policy_id: &str) -> Result<CandidateSet> {
        let policy = self.policies.get(policy_id)?;
        if !policy.enabled {
            return Err(SweepError::PolicyDisabled(policy.id));
        }
        self.evaluate_with(&policy, &EvaluationOptions::default())
            .await
    }

    /// Evaluate a policy regardless of its `enabled` flag, for previews and
    /// tests. The result carries `policy_enabled` so callers can tell.
    pub async fn evaluate_for_testing(&self, policy_id: &str) -> Result<CandidateSet> {
        let policy = self.policies.get(policy_id)?;
        self.evaluate_with(&policy, &EvaluationOptions::default())
            .await
    }

    /// Shared evaluation core.
    ///
    /// 1. One conjunctive store query built from the criteria, oldest first.
    /// 2. Drop records claimed by other jobs.
    /// 3. `preserve_important` removes every `high` record, after matching.
    /// 4. Cap at `min(max_emails_per_run, options.max_emails)`, keeping the
    ///    oldest-first prefix.
    pub async fn evaluate_with(
        &self,
        policy: &Policy,
        options: &EvaluationOptions,
    ) -> Result<CandidateSet> {
        let now = self.clock.now();
        let mut query = policy.criteria.to_search_criteria(now);
        query.exclude_archived = matches!(policy.action, CleanupAction::Archive);

        let hits = self.records.search(&query).await?;
        let matched = hits.len();

        let mut claimed_removed = 0;
        let mut protected_removed = 0;
        let mut eligible = Vec::with_capacity(hits.len());

        for record in hits {
            if options.exclude.contains(&record.id) {
                claimed_removed += 1;
                continue;
            }
            if policy.safety.preserve_important && record.importance == Importance::High {
                protected_removed += 1;
                continue;
            }
            eligible.push(Candidate {
                record_id: record.id,
                size_bytes: record.size_bytes,
            });
        }

        let limit = match options.max_emails {
            Some(run_max) => run_max.min(policy.safety.max_emails_per_run),
            None => policy.safety.max_emails_per_run,
        };
        let truncated = eligible.len() > limit;
        eligible.truncate(limit);

        if truncated {
            info!(
                policy_id = %policy.id,
                limit,
                "candidate set capped; run will not be exhaustive"
            );
        }
        debug!(
            policy_id = %policy.id,
            matched,
            claimed_removed,
            protected_removed,
            candidates = eligible.len(),
            "policy evaluated"
        );

        Ok(CandidateSet {
            policy_id: policy.id.clone(),
            candidates: eligible,
            matched,
            protected_removed,
            claimed_removed,
            truncated,
            limit,
            policy_enabled: policy.enabled,
            evaluated_at: now,
        })
    }
}
