// src/policy/validate.rs

use std::sync::LazyLock;

use regex::Regex;

use crate::errors::{Result, SweepError};
use crate::policy::model::{NewPolicy, PolicyCriteria, SafetyConfig};

/// Upper bound for `criteria.age_days_min` (about a century).
pub const MAX_AGE_DAYS: u32 = 36_500;

static POLICY_ID: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^[A-Za-z0-9_.-]+$").unwrap_or_else(|e| panic!("invalid policy id regex: {e}"))
});

/// Structural validation of a policy definition.
///
/// This checks:
/// - the id is non-empty and only uses `[A-Za-z0-9_.-]`
/// - the name is non-empty
/// - the criteria contain at least one predicate, with scores in `[0, 1]`
///   and `age_days_min <= MAX_AGE_DAYS`
/// - `safety.max_emails_per_run >= 1`
///
/// It does **not** check for id collisions; that is the store's job.
pub fn validate_policy(policy: &NewPolicy) -> Result<()> {
    validate_id(&policy.id)?;

    if policy.name.trim().is_empty() {
        return Err(SweepError::ValidationError(format!(
            "policy '{}' must have a non-empty name",
            policy.id
        )));
    }

    validate_criteria(&policy.id, &policy.criteria)?;
    validate_safety(&policy.id, &policy.safety)?;
    Ok(())
}

fn validate_id(id: &str) -> Result<()> {
    if id.is_empty() {
        return Err(SweepError::ValidationError(
            "policy id must not be empty".to_string(),
        ));
    }
    if !POLICY_ID.is_match(id) {
        return Err(SweepError::ValidationError(format!(
            "policy id '{id}' may only contain letters, digits, '_', '.' and '-'"
        )));
    }
    Ok(())
}

fn validate_criteria(id: &str, criteria: &PolicyCriteria) -> Result<()> {
    // A policy without predicates would match the whole mailbox.
    if criteria.is_empty() {
        return Err(SweepError::ValidationError(format!(
            "policy '{id}' criteria must contain at least one predicate"
        )));
    }

    if let Some(days) = criteria.age_days_min {
        if days > MAX_AGE_DAYS {
            return Err(SweepError::ValidationError(format!(
                "policy '{id}' criteria.age_days_min must be <= {MAX_AGE_DAYS} (got {days})"
            )));
        }
    }

    for (field, value) in [
        ("spam_score_min", criteria.spam_score_min),
        ("promotional_score_min", criteria.promotional_score_min),
    ] {
        if let Some(v) = value {
            if !(0.0..=1.0).contains(&v) {
                return Err(SweepError::ValidationError(format!(
                    "policy '{id}' criteria.{field} must be within [0, 1] (got {v})"
                )));
            }
        }
    }

    Ok(())
}

fn validate_safety(id: &str, safety: &SafetyConfig) -> Result<()> {
    if safety.max_emails_per_run == 0 {
        return Err(SweepError::ValidationError(format!(
            "policy '{id}' safety.max_emails_per_run must be >= 1 (got 0)"
        )));
    }
    Ok(())
}
