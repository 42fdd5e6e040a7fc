// src/config/validate.rs

use std::collections::BTreeSet;
use std::time::Duration;

use chrono::NaiveTime;

use crate::config::model::{
    AutomationConfig, ConfigFile, ContinuousCleanupConfig, EventTriggersConfig, PeakHours,
    ProcessingSection, RawAutomationConfig, RawConfigFile, RawContinuousCleanup, RawPeakHours,
};
use crate::errors::{Result, SweepError};
use crate::policy::{validate_policy, NewPolicy};

impl TryFrom<RawConfigFile> for ConfigFile {
    type Error = SweepError;

    fn try_from(raw: RawConfigFile) -> std::result::Result<Self, Self::Error> {
        let policies = collect_policies(raw.policy)?;
        validate_processing(&raw.processing)?;

        let automation = AutomationConfig::try_from(RawAutomationConfig {
            continuous_cleanup: raw.continuous_cleanup,
            event_triggers: raw.event_triggers,
        })?;

        let known: BTreeSet<&str> = policies.iter().map(|p| p.id.as_str()).collect();
        automation.check_policy_refs(|id| known.contains(id))?;

        Ok(ConfigFile::new_unchecked(
            automation,
            raw.processing,
            raw.storage,
            policies,
        ))
    }
}

impl TryFrom<RawAutomationConfig> for AutomationConfig {
    type Error = SweepError;

    fn try_from(raw: RawAutomationConfig) -> std::result::Result<Self, Self::Error> {
        let continuous_cleanup = validate_continuous(raw.continuous_cleanup)?;
        validate_triggers(&raw.event_triggers)?;
        Ok(AutomationConfig {
            continuous_cleanup,
            event_triggers: raw.event_triggers,
        })
    }
}

impl AutomationConfig {
    /// Reject the config if any trigger block names a policy for which
    /// `exists` returns false.
    pub fn check_policy_refs(&self, exists: impl Fn(&str) -> bool) -> Result<()> {
        for id in self.event_triggers.referenced_policies() {
            if !exists(id) {
                return Err(SweepError::ValidationError(format!(
                    "[event_triggers] references unknown policy '{id}'"
                )));
            }
        }
        Ok(())
    }
}

/// Assign ids from the `[policy.<id>]` keys and validate every block.
fn collect_policies(
    table: std::collections::BTreeMap<String, NewPolicy>,
) -> Result<Vec<NewPolicy>> {
    let mut out = Vec::with_capacity(table.len());
    for (key, mut policy) in table {
        if !policy.id.is_empty() && policy.id != key {
            return Err(SweepError::ValidationError(format!(
                "[policy.{key}] sets a different id '{}'",
                policy.id
            )));
        }
        policy.id = key;
        validate_policy(&policy)?;
        out.push(policy);
    }
    Ok(out)
}

fn validate_processing(p: &ProcessingSection) -> Result<()> {
    if p.default_batch_size == 0 {
        return Err(SweepError::ValidationError(
            "[processing].default_batch_size must be >= 1 (got 0)".to_string(),
        ));
    }
    if p.max_batch_attempts == 0 {
        return Err(SweepError::ValidationError(
            "[processing].max_batch_attempts must be >= 1 (got 0)".to_string(),
        ));
    }
    Ok(())
}

fn validate_continuous(raw: RawContinuousCleanup) -> Result<ContinuousCleanupConfig> {
    if raw.target_emails_per_minute == 0 {
        return Err(SweepError::ValidationError(
            "[continuous_cleanup].target_emails_per_minute must be >= 1 (got 0)".to_string(),
        ));
    }
    if raw.max_concurrent_operations == 0 {
        return Err(SweepError::ValidationError(
            "[continuous_cleanup].max_concurrent_operations must be >= 1 (got 0)".to_string(),
        ));
    }
    if raw.tick_interval_secs == 0 {
        return Err(SweepError::ValidationError(
            "[continuous_cleanup].tick_interval_secs must be >= 1 (got 0)".to_string(),
        ));
    }

    Ok(ContinuousCleanupConfig {
        enabled: raw.enabled,
        target_emails_per_minute: raw.target_emails_per_minute,
        max_concurrent_operations: raw.max_concurrent_operations,
        pause_during_peak_hours: raw.pause_during_peak_hours,
        tick_interval: Duration::from_secs(raw.tick_interval_secs),
        peak_hours: parse_peak_hours(&raw.peak_hours)?,
    })
}

fn parse_peak_hours(raw: &RawPeakHours) -> Result<PeakHours> {
    let start = parse_hhmm("start", &raw.start)?;
    let end = parse_hhmm("end", &raw.end)?;
    if start == end {
        return Err(SweepError::ValidationError(format!(
            "[continuous_cleanup].peak_hours start and end are both {}; the window would be empty",
            raw.start
        )));
    }
    // Anything beyond +-24h is certainly a typo.
    if raw.utc_offset_minutes.abs() >= 24 * 60 {
        return Err(SweepError::ValidationError(format!(
            "[continuous_cleanup].peak_hours.utc_offset_minutes out of range (got {})",
            raw.utc_offset_minutes
        )));
    }
    Ok(PeakHours {
        start,
        end,
        utc_offset_minutes: raw.utc_offset_minutes,
    })
}

fn parse_hhmm(field: &str, value: &str) -> Result<NaiveTime> {
    NaiveTime::parse_from_str(value.trim(), "%H:%M").map_err(|e| {
        SweepError::ValidationError(format!(
            "[continuous_cleanup].peak_hours.{field} must be HH:MM (got '{value}': {e})"
        ))
    })
}

fn validate_triggers(t: &EventTriggersConfig) -> Result<()> {
    if t.sample_interval_secs == 0 {
        return Err(SweepError::ValidationError(
            "[event_triggers].sample_interval_secs must be >= 1 (got 0)".to_string(),
        ));
    }

    let s = &t.storage_threshold;
    for (field, v) in [
        ("warning_threshold_percent", s.warning_threshold_percent),
        ("critical_threshold_percent", s.critical_threshold_percent),
    ] {
        if !(v > 0.0 && v <= 100.0) {
            return Err(SweepError::ValidationError(format!(
                "[event_triggers.storage_threshold].{field} must be within (0, 100] (got {v})"
            )));
        }
    }
    if s.warning_threshold_percent >= s.critical_threshold_percent {
        return Err(SweepError::ValidationError(format!(
            "[event_triggers.storage_threshold] warning ({}) must be below critical ({})",
            s.warning_threshold_percent, s.critical_threshold_percent
        )));
    }
    if s.quota_bytes == Some(0) {
        return Err(SweepError::ValidationError(
            "[event_triggers.storage_threshold].quota_bytes must be >= 1 (got 0)".to_string(),
        ));
    }

    let p = &t.performance_threshold;
    if !(p.query_time_threshold_ms > 0.0) {
        return Err(SweepError::ValidationError(format!(
            "[event_triggers.performance_threshold].query_time_threshold_ms must be > 0 (got {})",
            p.query_time_threshold_ms
        )));
    }
    if !(0.0..=1.0).contains(&p.cache_hit_rate_threshold) {
        return Err(SweepError::ValidationError(format!(
            "[event_triggers.performance_threshold].cache_hit_rate_threshold must be within [0, 1] (got {})",
            p.cache_hit_rate_threshold
        )));
    }

    if t.email_volume_threshold.daily_email_threshold == 0 {
        return Err(SweepError::ValidationError(
            "[event_triggers.email_volume_threshold].daily_email_threshold must be >= 1 (got 0)"
                .to_string(),
        ));
    }

    Ok(())
}
