// src/config/model.rs

use std::collections::BTreeMap;
use std::path::PathBuf;
use std::time::Duration;

use chrono::{DateTime, NaiveTime, Utc};
use serde::{Deserialize, Serialize};

use crate::policy::{NewPolicy, PolicyId};
use crate::types::StorageMode;

/// Top-level configuration as read from a TOML file.
///
/// ```toml
/// [continuous_cleanup]
/// enabled = true
/// target_emails_per_minute = 120
/// max_concurrent_operations = 2
/// pause_during_peak_hours = true
/// peak_hours = { start = "09:00", end = "17:00" }
///
/// [event_triggers.storage_threshold]
/// enabled = true
/// warning_threshold_percent = 80.0
/// critical_threshold_percent = 95.0
/// quota_bytes = 10737418240
/// critical_policies = ["old-spam"]
///
/// [policy.old-spam]
/// name = "Old spam"
/// priority = 10
/// criteria = { age_days_min = 30, spam_score_min = 0.8 }
/// action = { type = "delete" }
/// ```
///
/// All sections are optional and have reasonable defaults.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct RawConfigFile {
    #[serde(default)]
    pub continuous_cleanup: RawContinuousCleanup,

    #[serde(default)]
    pub event_triggers: EventTriggersConfig,

    #[serde(default)]
    pub processing: ProcessingSection,

    #[serde(default)]
    pub storage: StorageSection,

    /// Policies seeded into the policy store on every start, keyed by id.
    #[serde(default)]
    pub policy: BTreeMap<PolicyId, NewPolicy>,
}

/// Validated configuration. Only constructible through
/// `ConfigFile::try_from(RawConfigFile)`.
#[derive(Debug, Clone)]
pub struct ConfigFile {
    pub automation: AutomationConfig,
    pub processing: ProcessingSection,
    pub storage: StorageSection,
    pub policies: Vec<NewPolicy>,
}

impl ConfigFile {
    pub(crate) fn new_unchecked(
        automation: AutomationConfig,
        processing: ProcessingSection,
        storage: StorageSection,
        policies: Vec<NewPolicy>,
    ) -> Self {
        Self {
            automation,
            processing,
            storage,
            policies,
        }
    }
}

/// The hot-swappable part of the configuration, as submitted to
/// `update_configuration` or read from the file.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct RawAutomationConfig {
    #[serde(default)]
    pub continuous_cleanup: RawContinuousCleanup,
    #[serde(default)]
    pub event_triggers: EventTriggersConfig,
}

/// Validated automation config. Readers always get a whole snapshot of this
/// through `ConfigHandle`.
#[derive(Debug, Clone, PartialEq)]
pub struct AutomationConfig {
    pub continuous_cleanup: ContinuousCleanupConfig,
    pub event_triggers: EventTriggersConfig,
}

impl Default for AutomationConfig {
    fn default() -> Self {
        Self {
            continuous_cleanup: ContinuousCleanupConfig::default(),
            event_triggers: EventTriggersConfig::default(),
        }
    }
}

/// `[continuous_cleanup]` as written in TOML.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct RawContinuousCleanup {
    #[serde(default)]
    pub enabled: bool,

    #[serde(default = "default_target_emails_per_minute")]
    pub target_emails_per_minute: usize,

    /// Ceiling on scheduler-spawned jobs that are pending or running.
    #[serde(default = "default_max_concurrent_operations")]
    pub max_concurrent_operations: usize,

    #[serde(default)]
    pub pause_during_peak_hours: bool,

    #[serde(default = "default_tick_interval_secs")]
    pub tick_interval_secs: u64,

    #[serde(default)]
    pub peak_hours: RawPeakHours,
}

fn default_target_emails_per_minute() -> usize {
    60
}

fn default_max_concurrent_operations() -> usize {
    1
}

fn default_tick_interval_secs() -> u64 {
    60
}

impl Default for RawContinuousCleanup {
    fn default() -> Self {
        Self {
            enabled: false,
            target_emails_per_minute: default_target_emails_per_minute(),
            max_concurrent_operations: default_max_concurrent_operations(),
            pause_during_peak_hours: false,
            tick_interval_secs: default_tick_interval_secs(),
            peak_hours: RawPeakHours::default(),
        }
    }
}

/// `peak_hours = { start = "HH:MM", end = "HH:MM", utc_offset_minutes = 0 }`.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct RawPeakHours {
    pub start: String,
    pub end: String,
    /// Fixed offset of the mailbox owner's local time from UTC.
    #[serde(default)]
    pub utc_offset_minutes: i32,
}

impl Default for RawPeakHours {
    fn default() -> Self {
        Self {
            start: "09:00".to_string(),
            end: "17:00".to_string(),
            utc_offset_minutes: 0,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct ContinuousCleanupConfig {
    pub enabled: bool,
    pub target_emails_per_minute: usize,
    pub max_concurrent_operations: usize,
    pub pause_during_peak_hours: bool,
    pub tick_interval: Duration,
    pub peak_hours: PeakHours,
}

impl Default for ContinuousCleanupConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            target_emails_per_minute: default_target_emails_per_minute(),
            max_concurrent_operations: default_max_concurrent_operations(),
            pause_during_peak_hours: false,
            tick_interval: Duration::from_secs(default_tick_interval_secs()),
            peak_hours: PeakHours::default(),
        }
    }
}

/// Daily local-time window. A window whose start is after its end wraps past
/// midnight (e.g. 22:00-06:00).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PeakHours {
    pub start: NaiveTime,
    pub end: NaiveTime,
    pub utc_offset_minutes: i32,
}

impl Default for PeakHours {
    fn default() -> Self {
        Self {
            start: NaiveTime::from_hms_opt(9, 0, 0).unwrap_or(NaiveTime::MIN),
            end: NaiveTime::from_hms_opt(17, 0, 0).unwrap_or(NaiveTime::MIN),
            utc_offset_minutes: 0,
        }
    }
}

impl PeakHours {
    /// Whether `now` falls inside the window. Start is inclusive, end is
    /// exclusive.
    pub fn contains(&self, now: DateTime<Utc>) -> bool {
        let local = now + chrono::Duration::minutes(i64::from(self.utc_offset_minutes));
        let t = local.time();
        if self.start < self.end {
            self.start <= t && t < self.end
        } else {
            t >= self.start || t < self.end
        }
    }
}

/// `[event_triggers]`. Holds no derived values, so the TOML shape is also the
/// validated shape.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct EventTriggersConfig {
    #[serde(default = "default_sample_interval_secs")]
    pub sample_interval_secs: u64,

    #[serde(default)]
    pub storage_threshold: StorageThreshold,

    #[serde(default)]
    pub performance_threshold: PerformanceThreshold,

    #[serde(default)]
    pub email_volume_threshold: VolumeThreshold,
}

fn default_sample_interval_secs() -> u64 {
    30
}

impl Default for EventTriggersConfig {
    fn default() -> Self {
        Self {
            sample_interval_secs: default_sample_interval_secs(),
            storage_threshold: StorageThreshold::default(),
            performance_threshold: PerformanceThreshold::default(),
            email_volume_threshold: VolumeThreshold::default(),
        }
    }
}

impl EventTriggersConfig {
    pub fn sample_interval(&self) -> Duration {
        Duration::from_secs(self.sample_interval_secs)
    }

    /// Every policy id any trigger block refers to.
    pub fn referenced_policies(&self) -> impl Iterator<Item = &PolicyId> {
        self.storage_threshold
            .warning_policies
            .iter()
            .chain(&self.storage_threshold.critical_policies)
            .chain(&self.performance_threshold.policies)
            .chain(&self.email_volume_threshold.policies)
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct StorageThreshold {
    #[serde(default)]
    pub enabled: bool,
    #[serde(default = "default_warning_percent")]
    pub warning_threshold_percent: f64,
    #[serde(default = "default_critical_percent")]
    pub critical_threshold_percent: f64,
    /// Mailbox capacity the utilisation percentage is computed against.
    #[serde(default)]
    pub quota_bytes: Option<u64>,
    #[serde(default)]
    pub warning_policies: Vec<PolicyId>,
    #[serde(default)]
    pub critical_policies: Vec<PolicyId>,
}

fn default_warning_percent() -> f64 {
    80.0
}

fn default_critical_percent() -> f64 {
    95.0
}

impl Default for StorageThreshold {
    fn default() -> Self {
        Self {
            enabled: false,
            warning_threshold_percent: default_warning_percent(),
            critical_threshold_percent: default_critical_percent(),
            quota_bytes: None,
            warning_policies: Vec::new(),
            critical_policies: Vec::new(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct PerformanceThreshold {
    #[serde(default)]
    pub enabled: bool,
    /// Breached when query latency goes above this.
    #[serde(default = "default_query_time_ms")]
    pub query_time_threshold_ms: f64,
    /// Breached when the cache hit rate drops below this.
    #[serde(default = "default_cache_hit_rate")]
    pub cache_hit_rate_threshold: f64,
    #[serde(default)]
    pub policies: Vec<PolicyId>,
}

fn default_query_time_ms() -> f64 {
    1000.0
}

fn default_cache_hit_rate() -> f64 {
    0.5
}

impl Default for PerformanceThreshold {
    fn default() -> Self {
        Self {
            enabled: false,
            query_time_threshold_ms: default_query_time_ms(),
            cache_hit_rate_threshold: default_cache_hit_rate(),
            policies: Vec::new(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct VolumeThreshold {
    #[serde(default)]
    pub enabled: bool,
    /// Records received in the last 24 hours.
    #[serde(default = "default_daily_threshold")]
    pub daily_email_threshold: usize,
    #[serde(default)]
    pub policies: Vec<PolicyId>,
}

fn default_daily_threshold() -> usize {
    10_000
}

impl Default for VolumeThreshold {
    fn default() -> Self {
        Self {
            enabled: false,
            daily_email_threshold: default_daily_threshold(),
            policies: Vec::new(),
        }
    }
}

/// `[processing]`: job execution knobs that are fixed for the process
/// lifetime.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct ProcessingSection {
    #[serde(default = "default_batch_size")]
    pub default_batch_size: usize,
    /// Attempts per batch before it is recorded as failed.
    #[serde(default = "default_max_batch_attempts")]
    pub max_batch_attempts: u32,
    /// Linear backoff step between attempts.
    #[serde(default = "default_retry_backoff_ms")]
    pub retry_backoff_ms: u64,
    #[serde(default = "default_shutdown_timeout_secs")]
    pub shutdown_timeout_secs: u64,
}

fn default_batch_size() -> usize {
    50
}

fn default_max_batch_attempts() -> u32 {
    3
}

fn default_retry_backoff_ms() -> u64 {
    200
}

fn default_shutdown_timeout_secs() -> u64 {
    30
}

impl Default for ProcessingSection {
    fn default() -> Self {
        Self {
            default_batch_size: default_batch_size(),
            max_batch_attempts: default_max_batch_attempts(),
            retry_backoff_ms: default_retry_backoff_ms(),
            shutdown_timeout_secs: default_shutdown_timeout_secs(),
        }
    }
}

impl ProcessingSection {
    pub fn retry_backoff(&self, attempt: u32) -> Duration {
        Duration::from_millis(self.retry_backoff_ms.saturating_mul(u64::from(attempt)))
    }

    pub fn shutdown_timeout(&self) -> Duration {
        Duration::from_secs(self.shutdown_timeout_secs)
    }
}

/// `[storage]`: where policies and jobs live.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct StorageSection {
    #[serde(default)]
    pub mode: StorageMode,
    #[serde(default = "default_state_dir")]
    pub state_dir: PathBuf,
}

fn default_state_dir() -> PathBuf {
    PathBuf::from(".mailsweep")
}

impl Default for StorageSection {
    fn default() -> Self {
        Self {
            mode: StorageMode::default(),
            state_dir: default_state_dir(),
        }
    }
}
