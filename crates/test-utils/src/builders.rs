#![allow(dead_code)]

use chrono::Duration;
use mailsweep::config::{
    AutomationConfig, RawAutomationConfig, RawPeakHours,
};
use mailsweep::policy::{CleanupAction, NewPolicy, PolicyCriteria, SafetyConfig};
use mailsweep::store::EmailRecord;
use mailsweep::types::Importance;

use crate::test_now;

/// Builder for `NewPolicy`.
///
/// Defaults: enabled, priority 100, delete action, no criteria,
/// `max_emails_per_run = 100`, `preserve_important = true`.
pub struct PolicyBuilder {
    policy: NewPolicy,
}

impl PolicyBuilder {
    pub fn new(id: &str) -> Self {
        Self {
            policy: NewPolicy {
                id: id.to_string(),
                name: format!("policy {id}"),
                enabled: true,
                priority: 100,
                criteria: PolicyCriteria::default(),
                action: CleanupAction::Delete,
                safety: SafetyConfig::default(),
            },
        }
    }

    pub fn name(mut self, name: &str) -> Self {
        self.policy.name = name.to_string();
        self
    }

    pub fn priority(mut self, priority: u32) -> Self {
        self.policy.priority = priority;
        self
    }

    pub fn disabled(mut self) -> Self {
        self.policy.enabled = false;
        self
    }

    pub fn age_days_min(mut self, days: u32) -> Self {
        self.policy.criteria.age_days_min = Some(days);
        self
    }

    pub fn spam_score_min(mut self, score: f64) -> Self {
        self.policy.criteria.spam_score_min = Some(score);
        self
    }

    pub fn promotional_score_min(mut self, score: f64) -> Self {
        self.policy.criteria.promotional_score_min = Some(score);
        self
    }

    pub fn importance_max(mut self, level: Importance) -> Self {
        self.policy.criteria.importance_level_max = Some(level);
        self
    }

    pub fn archive(mut self) -> Self {
        self.policy.action = CleanupAction::Archive;
        self
    }

    pub fn max_emails(mut self, n: usize) -> Self {
        self.policy.safety.max_emails_per_run = n;
        self
    }

    pub fn preserve_important(mut self, on: bool) -> Self {
        self.policy.safety.preserve_important = on;
        self
    }

    pub fn require_confirmation(mut self) -> Self {
        self.policy.safety.require_confirmation = true;
        self
    }

    pub fn dry_run_first(mut self) -> Self {
        self.policy.safety.dry_run_first = true;
        self
    }

    pub fn build(self) -> NewPolicy {
        self.policy
    }
}

/// Builder for `EmailRecord`, with ages relative to [`test_now`].
///
/// Defaults: received 1 day ago, medium importance, zero scores, 1 KiB.
pub struct RecordBuilder {
    record: EmailRecord,
}

impl RecordBuilder {
    pub fn new(id: &str) -> Self {
        Self {
            record: EmailRecord {
                id: id.to_string(),
                received_at: test_now() - Duration::days(1),
                importance: Importance::Medium,
                spam_score: 0.0,
                promotional_score: 0.0,
                size_bytes: 1024,
                archived: false,
                deleted: false,
            },
        }
    }

    pub fn aged_days(mut self, days: i64) -> Self {
        self.record.received_at = test_now() - Duration::days(days);
        self
    }

    pub fn aged_hours(mut self, hours: i64) -> Self {
        self.record.received_at = test_now() - Duration::hours(hours);
        self
    }

    pub fn spam(mut self, score: f64) -> Self {
        self.record.spam_score = score;
        self
    }

    pub fn promotional(mut self, score: f64) -> Self {
        self.record.promotional_score = score;
        self
    }

    pub fn importance(mut self, level: Importance) -> Self {
        self.record.importance = level;
        self
    }

    pub fn size(mut self, bytes: u64) -> Self {
        self.record.size_bytes = bytes;
        self
    }

    pub fn archived(mut self) -> Self {
        self.record.archived = true;
        self
    }

    pub fn build(self) -> EmailRecord {
        self.record
    }
}

/// `count` spam records named `{prefix}-{i}`, aged `40 + i` days so the
/// oldest-first order is `{prefix}-{count-1}` down to `{prefix}-0`.
pub fn spam_records(prefix: &str, count: usize) -> Vec<EmailRecord> {
    (0..count)
        .map(|i| {
            RecordBuilder::new(&format!("{prefix}-{i}"))
                .aged_days(40 + i as i64)
                .spam(0.9)
                .build()
        })
        .collect()
}

/// Builder for the hot-swappable automation config.
///
/// Starts from the serde defaults: continuous cleanup off, every trigger
/// block off.
pub struct AutomationConfigBuilder {
    raw: RawAutomationConfig,
}

impl AutomationConfigBuilder {
    pub fn new() -> Self {
        Self {
            raw: RawAutomationConfig::default(),
        }
    }

    pub fn continuous(mut self, per_minute: usize, max_concurrent: usize) -> Self {
        let cc = &mut self.raw.continuous_cleanup;
        cc.enabled = true;
        cc.target_emails_per_minute = per_minute;
        cc.max_concurrent_operations = max_concurrent;
        self
    }

    pub fn peak_hours(mut self, start: &str, end: &str) -> Self {
        let cc = &mut self.raw.continuous_cleanup;
        cc.pause_during_peak_hours = true;
        cc.peak_hours = RawPeakHours {
            start: start.to_string(),
            end: end.to_string(),
            utc_offset_minutes: 0,
        };
        self
    }

    pub fn storage_trigger(
        mut self,
        warning: f64,
        critical: f64,
        warning_policies: &[&str],
        critical_policies: &[&str],
    ) -> Self {
        let s = &mut self.raw.event_triggers.storage_threshold;
        s.enabled = true;
        s.warning_threshold_percent = warning;
        s.critical_threshold_percent = critical;
        s.warning_policies = warning_policies.iter().map(|p| p.to_string()).collect();
        s.critical_policies = critical_policies.iter().map(|p| p.to_string()).collect();
        self
    }

    pub fn quota_bytes(mut self, quota: u64) -> Self {
        self.raw.event_triggers.storage_threshold.quota_bytes = Some(quota);
        self
    }

    pub fn performance_trigger(mut self, latency_ms: f64, hit_rate: f64, policies: &[&str]) -> Self {
        let p = &mut self.raw.event_triggers.performance_threshold;
        p.enabled = true;
        p.query_time_threshold_ms = latency_ms;
        p.cache_hit_rate_threshold = hit_rate;
        p.policies = policies.iter().map(|p| p.to_string()).collect();
        self
    }

    pub fn volume_trigger(mut self, daily: usize, policies: &[&str]) -> Self {
        let v = &mut self.raw.event_triggers.email_volume_threshold;
        v.enabled = true;
        v.daily_email_threshold = daily;
        v.policies = policies.iter().map(|p| p.to_string()).collect();
        self
    }

    pub fn build_raw(self) -> RawAutomationConfig {
        self.raw
    }

    pub fn build(self) -> AutomationConfig {
        AutomationConfig::try_from(self.raw).expect("Failed to build valid automation config")
    }
}

impl Default for AutomationConfigBuilder {
    fn default() -> Self {
        Self::new()
    }
}
