// tests/event_triggers.rs

mod common;
use crate::common::{init_tracing, test_now, wait_for_terminal, TestResult};

use std::sync::Arc;

use mailsweep::automation::{
    Clock, EventTriggerMonitor, ManualClock, SignalSample, SignalSource, StoreSignalSource,
    ThresholdKind,
};
use mailsweep::config::EventTriggersConfig;
use mailsweep::jobs::{JobFilter, JobStatus, JobType, TriggerSource};
use mailsweep::store::{MemoryRecordStore, RecordStore};
use mailsweep_test_utils::builders::{
    spam_records, AutomationConfigBuilder, PolicyBuilder, RecordBuilder,
};
use mailsweep_test_utils::harness::TestHarness;

fn storage(pct: f64) -> SignalSample {
    SignalSample {
        storage_used_percent: Some(pct),
        ..SignalSample::default()
    }
}

fn storage_config() -> EventTriggersConfig {
    AutomationConfigBuilder::new()
        .storage_trigger(80.0, 95.0, &["trim"], &["purge"])
        .build()
        .event_triggers
}

fn kinds(fired: &[mailsweep::automation::FiredTrigger]) -> Vec<ThresholdKind> {
    fired.iter().map(|t| t.kind).collect()
}

#[test]
fn sustained_breach_fires_once_and_re_arms_after_recovery() {
    let config = storage_config();
    let mut monitor = EventTriggerMonitor::new();

    let first = monitor.evaluate(&config, &storage(96.0));
    assert_eq!(kinds(&first), vec![ThresholdKind::StorageCritical]);
    assert_eq!(first[0].policies, vec!["purge".to_string()]);

    for pct in [97.0, 98.0, 99.0] {
        assert!(monitor.evaluate(&config, &storage(pct)).is_empty());
    }

    assert!(monitor.evaluate(&config, &storage(50.0)).is_empty());
    assert!(!monitor.is_latched(ThresholdKind::StorageCritical));

    let again = monitor.evaluate(&config, &storage(96.0));
    assert_eq!(kinds(&again), vec![ThresholdKind::StorageCritical]);
}

#[test]
fn warning_then_critical_then_back_to_warning() {
    let config = storage_config();
    let mut monitor = EventTriggerMonitor::new();

    let warn = monitor.evaluate(&config, &storage(85.0));
    assert_eq!(kinds(&warn), vec![ThresholdKind::StorageWarning]);
    assert_eq!(warn[0].policies, vec!["trim".to_string()]);

    let crit = monitor.evaluate(&config, &storage(96.0));
    assert_eq!(kinds(&crit), vec![ThresholdKind::StorageCritical]);

    // Falling back to warning level re-arms critical but warning is already
    // latched.
    assert!(monitor.evaluate(&config, &storage(90.0)).is_empty());
    assert!(monitor.is_latched(ThresholdKind::StorageWarning));
    assert!(!monitor.is_latched(ThresholdKind::StorageCritical));
}

#[test]
fn straight_to_critical_latches_warning_silently() {
    let config = storage_config();
    let mut monitor = EventTriggerMonitor::new();

    monitor.evaluate(&config, &storage(99.0));
    assert!(monitor.is_latched(ThresholdKind::StorageWarning));
    assert!(monitor.evaluate(&config, &storage(85.0)).is_empty());
}

#[test]
fn thresholds_are_inclusive_for_storage() {
    let config = storage_config();
    let mut monitor = EventTriggerMonitor::new();

    assert!(monitor.evaluate(&config, &storage(79.9)).is_empty());
    assert_eq!(
        kinds(&monitor.evaluate(&config, &storage(80.0))),
        vec![ThresholdKind::StorageWarning]
    );
    assert_eq!(
        kinds(&monitor.evaluate(&config, &storage(95.0))),
        vec![ThresholdKind::StorageCritical]
    );
}

#[test]
fn missing_readings_keep_the_latch() {
    let config = storage_config();
    let mut monitor = EventTriggerMonitor::new();

    monitor.evaluate(&config, &storage(96.0));
    assert!(monitor.evaluate(&config, &SignalSample::default()).is_empty());
    assert!(monitor.is_latched(ThresholdKind::StorageCritical));
    assert!(monitor.evaluate(&config, &storage(96.0)).is_empty());
}

#[test]
fn disabling_a_block_clears_its_latches() {
    let config = storage_config();
    let mut monitor = EventTriggerMonitor::new();
    monitor.evaluate(&config, &storage(96.0));

    let off = EventTriggersConfig::default();
    assert!(monitor.evaluate(&off, &storage(96.0)).is_empty());
    assert!(!monitor.is_latched(ThresholdKind::StorageCritical));
    assert!(!monitor.is_latched(ThresholdKind::StorageWarning));

    let fired = monitor.evaluate(&config, &storage(96.0));
    assert_eq!(kinds(&fired), vec![ThresholdKind::StorageCritical]);
}

#[test]
fn performance_fires_on_latency_or_hit_rate_under_one_latch() {
    let config = AutomationConfigBuilder::new()
        .performance_trigger(500.0, 0.8, &["reindex"])
        .build()
        .event_triggers;
    let mut monitor = EventTriggerMonitor::new();

    let healthy = SignalSample {
        query_latency_ms: Some(500.0),
        cache_hit_rate: Some(0.8),
        ..SignalSample::default()
    };
    assert!(monitor.evaluate(&config, &healthy).is_empty());

    let slow = SignalSample {
        query_latency_ms: Some(501.0),
        ..healthy
    };
    let fired = monitor.evaluate(&config, &slow);
    assert_eq!(kinds(&fired), vec![ThresholdKind::Performance]);
    assert_eq!(fired[0].policies, vec!["reindex".to_string()]);

    // Latency recovers while the cache goes cold: still the same breach.
    let cold = SignalSample {
        cache_hit_rate: Some(0.5),
        ..healthy
    };
    assert!(monitor.evaluate(&config, &cold).is_empty());

    assert!(monitor.evaluate(&config, &healthy).is_empty());
    assert_eq!(
        kinds(&monitor.evaluate(&config, &cold)),
        vec![ThresholdKind::Performance]
    );
}

#[test]
fn volume_fires_at_the_daily_threshold() {
    let config = AutomationConfigBuilder::new()
        .volume_trigger(100, &["bulk"])
        .build()
        .event_triggers;
    let mut monitor = EventTriggerMonitor::new();

    let volume = |n| SignalSample {
        daily_email_volume: Some(n),
        ..SignalSample::default()
    };
    assert!(monitor.evaluate(&config, &volume(99)).is_empty());
    assert_eq!(
        kinds(&monitor.evaluate(&config, &volume(100))),
        vec![ThresholdKind::EmailVolume]
    );
    assert!(monitor.evaluate(&config, &volume(500)).is_empty());
}

#[tokio::test]
async fn sustained_critical_storage_enqueues_exactly_one_event_job() -> TestResult {
    init_tracing();

    let h = TestHarness::builder()
        .config(
            AutomationConfigBuilder::new()
                .storage_trigger(80.0, 95.0, &["trim"], &["purge"])
                .build(),
        )
        .records(spam_records("s", 3))
        .policy(PolicyBuilder::new("purge").spam_score_min(0.5).build())
        .policy(PolicyBuilder::new("trim").age_days_min(365).build())
        .build()?;

    let mut jobs = Vec::new();
    for pct in [96.0, 97.0, 98.0, 99.0] {
        h.set_signals(storage(pct));
        jobs.extend(h.service.sample_signals().await?);
    }
    assert_eq!(jobs.len(), 1);

    let job = wait_for_terminal(&h.service, &jobs[0]).await;
    assert_eq!(job.job_type, JobType::EventCleanup);
    assert_eq!(job.policy_id(), "purge");
    assert_eq!(
        job.request_params.trigger,
        TriggerSource::Event(ThresholdKind::StorageCritical)
    );
    assert_eq!(job.status, JobStatus::Completed);
    assert_eq!(job.results.map(|r| r.emails_deleted), Some(3));

    let events = h.service.list_jobs(&JobFilter {
        job_type: Some(JobType::EventCleanup),
        ..JobFilter::default()
    });
    assert_eq!(events.len(), 1);
    assert_eq!(
        h.service.status().latched_thresholds,
        vec![ThresholdKind::StorageWarning, ThresholdKind::StorageCritical]
    );
    Ok(())
}

#[tokio::test]
async fn event_jobs_ignore_the_scheduler_rate_limit() -> TestResult {
    init_tracing();

    let h = TestHarness::builder()
        .config(
            AutomationConfigBuilder::new()
                .continuous(1, 1)
                .volume_trigger(10, &["spam"])
                .build(),
        )
        .records(spam_records("s", 4))
        .policy(PolicyBuilder::new("spam").spam_score_min(0.5).build())
        .build()?;

    h.set_signals(SignalSample {
        daily_email_volume: Some(50),
        ..SignalSample::default()
    });
    let jobs = h.service.sample_signals().await?;
    assert_eq!(jobs.len(), 1);

    let job = wait_for_terminal(&h.service, &jobs[0]).await;
    assert_eq!(job.results.map(|r| r.emails_processed), Some(4));
    assert_eq!(h.service.status().scheduler_rate_used, 0);
    Ok(())
}

#[tokio::test]
async fn an_event_with_nothing_to_clean_still_records_a_job() -> TestResult {
    init_tracing();

    let h = TestHarness::builder()
        .config(
            AutomationConfigBuilder::new()
                .volume_trigger(10, &["old"])
                .build(),
        )
        .records(spam_records("s", 2))
        .policy(PolicyBuilder::new("old").age_days_min(3650).build())
        .build()?;

    h.set_signals(SignalSample {
        daily_email_volume: Some(11),
        ..SignalSample::default()
    });
    let jobs = h.service.sample_signals().await?;
    assert_eq!(jobs.len(), 1);

    let job = wait_for_terminal(&h.service, &jobs[0]).await;
    let result = job.results.expect("completed");
    assert!(result.success);
    assert_eq!(result.emails_processed, 0);
    assert_eq!(h.backend.call_count(), 0);
    Ok(())
}

#[tokio::test]
async fn events_skip_policies_that_need_confirmation_or_are_disabled() -> TestResult {
    init_tracing();

    let h = TestHarness::builder()
        .config(
            AutomationConfigBuilder::new()
                .volume_trigger(10, &["careful", "paused", "spam"])
                .build(),
        )
        .records(spam_records("s", 2))
        .policy(
            PolicyBuilder::new("careful")
                .spam_score_min(0.5)
                .require_confirmation()
                .build(),
        )
        .policy(PolicyBuilder::new("paused").spam_score_min(0.5).disabled().build())
        .policy(PolicyBuilder::new("spam").spam_score_min(0.5).build())
        .build()?;

    h.set_signals(SignalSample {
        daily_email_volume: Some(11),
        ..SignalSample::default()
    });
    let jobs = h.service.sample_signals().await?;
    assert_eq!(jobs.len(), 1);

    let job = wait_for_terminal(&h.service, &jobs[0]).await;
    assert_eq!(job.policy_id(), "spam");
    assert_eq!(job.status, JobStatus::Completed);
    assert_eq!(h.service.list_jobs(&JobFilter::default()).len(), 1);
    Ok(())
}

#[tokio::test]
async fn store_signals_report_usage_and_daily_volume() -> TestResult {
    init_tracing();

    let mut records = vec![
        RecordBuilder::new("recent-1").aged_hours(2).size(2048).build(),
        RecordBuilder::new("recent-2").aged_hours(23).size(2048).build(),
        RecordBuilder::new("older").aged_hours(30).size(2048).build(),
    ];
    let mut gone = RecordBuilder::new("gone").aged_hours(1).size(4096).build();
    gone.deleted = true;
    records.push(gone);

    let store: Arc<dyn RecordStore> = Arc::new(MemoryRecordStore::with_records(records));
    let clock: Arc<dyn Clock> = Arc::new(ManualClock::new(test_now()));
    let source = StoreSignalSource::new(store, clock);

    let config = AutomationConfigBuilder::new()
        .storage_trigger(80.0, 95.0, &[], &[])
        .quota_bytes(8192)
        .build()
        .event_triggers;
    let sample = source.sample(&config).await?;

    // Soft-deleted records no longer count.
    assert_eq!(sample.storage_used_percent, Some(75.0));
    assert_eq!(sample.daily_email_volume, Some(2));
    assert!(sample.query_latency_ms.is_some());
    assert!(sample.cache_hit_rate.is_none());

    let no_quota = EventTriggersConfig::default();
    assert!(source.sample(&no_quota).await?.storage_used_percent.is_none());
    Ok(())
}
