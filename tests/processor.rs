// tests/processor.rs

mod common;
use crate::common::{init_tracing, TestResult};

use mailsweep::engine::ManualCleanupOptions;
use mailsweep::errors::SweepError;
use mailsweep::jobs::{FailureKind, JobErrorKind, JobStatus};
use mailsweep::store::RecordStore;
use mailsweep_test_utils::builders::{spam_records, PolicyBuilder, RecordBuilder};
use mailsweep_test_utils::harness::TestHarness;

fn spam_policy(id: &str) -> PolicyBuilder {
    PolicyBuilder::new(id).spam_score_min(0.5)
}

#[tokio::test]
async fn runs_in_batches_oldest_first() -> TestResult {
    init_tracing();

    let h = TestHarness::builder()
        .batch_size(3)
        .records(spam_records("s", 7))
        .policy(spam_policy("p").build())
        .build()?;

    let job_id = h
        .service
        .trigger_manual_cleanup("p", ManualCleanupOptions::default())
        .await?;
    let result = h.service.process_cleanup_job(&job_id).await?;

    let sizes: Vec<usize> = h.backend.calls().iter().map(|c| c.record_ids.len()).collect();
    assert_eq!(sizes, vec![3, 3, 1]);
    assert_eq!(
        h.backend.touched_ids(),
        (0..7).rev().map(|i| format!("s-{i}")).collect::<Vec<_>>()
    );

    assert!(result.success);
    assert_eq!(result.batches_total, 3);
    assert_eq!(result.emails_processed, 7);
    assert_eq!(result.emails_deleted, 7);
    assert_eq!(result.storage_freed, 7 * 1024);

    let job = h.service.get_job(&job_id)?;
    assert_eq!(job.status, JobStatus::Completed);
    assert_eq!(job.results, Some(result));
    let progress = job.progress.expect("progress recorded");
    assert_eq!((progress.batches_done, progress.batches_total), (3, 3));
    Ok(())
}

#[tokio::test]
async fn request_batch_size_overrides_the_default() -> TestResult {
    init_tracing();

    let h = TestHarness::builder()
        .batch_size(50)
        .records(spam_records("s", 5))
        .policy(spam_policy("p").build())
        .build()?;

    let job_id = h
        .service
        .trigger_manual_cleanup(
            "p",
            ManualCleanupOptions {
                batch_size: Some(2),
                ..ManualCleanupOptions::default()
            },
        )
        .await?;
    h.service.process_cleanup_job(&job_id).await?;

    assert_eq!(h.backend.call_count(), 3);
    Ok(())
}

#[tokio::test]
async fn dry_runs_never_touch_the_backend_and_are_repeatable() -> TestResult {
    init_tracing();

    let h = TestHarness::builder()
        .records(spam_records("s", 4))
        .policy(spam_policy("p").build())
        .build()?;

    let preview = ManualCleanupOptions {
        dry_run: true,
        ..ManualCleanupOptions::default()
    };

    let first = h.service.trigger_manual_cleanup("p", preview.clone()).await?;
    let first = h.service.process_cleanup_job(&first).await?;
    let second = h.service.trigger_manual_cleanup("p", preview).await?;
    let second = h.service.process_cleanup_job(&second).await?;

    assert_eq!(h.backend.call_count(), 0);
    assert!(first.dry_run && !first.forced_dry_run);
    assert_eq!(first.emails_processed, 4);
    assert_eq!(first.emails_deleted, 4);
    assert_eq!(first.storage_freed, 4 * 1024);
    assert_eq!(first, second);
    assert!(h.record("s-0").is_some_and(|r| !r.deleted));
    Ok(())
}

#[tokio::test]
async fn confirmation_is_required_for_destructive_runs_only() -> TestResult {
    init_tracing();

    let h = TestHarness::builder()
        .records(spam_records("s", 2))
        .policy(spam_policy("careful").require_confirmation().build())
        .build()?;

    let unconfirmed = h
        .service
        .trigger_manual_cleanup("careful", ManualCleanupOptions::default())
        .await?;
    let err = h
        .service
        .process_cleanup_job(&unconfirmed)
        .await
        .expect_err("unconfirmed run must fail");
    assert!(matches!(err, SweepError::ConfirmationRequired(_)));
    let job = h.service.get_job(&unconfirmed)?;
    assert_eq!(job.status, JobStatus::Failed);
    assert_eq!(
        job.error_details.map(|d| d.kind),
        Some(FailureKind::ConfirmationRequired)
    );
    assert_eq!(h.backend.call_count(), 0);

    let preview = h
        .service
        .trigger_manual_cleanup(
            "careful",
            ManualCleanupOptions {
                dry_run: true,
                ..ManualCleanupOptions::default()
            },
        )
        .await?;
    assert!(h.service.process_cleanup_job(&preview).await?.dry_run);

    let confirmed = h
        .service
        .trigger_manual_cleanup(
            "careful",
            ManualCleanupOptions {
                confirmed: true,
                ..ManualCleanupOptions::default()
            },
        )
        .await?;
    let result = h.service.process_cleanup_job(&confirmed).await?;
    assert_eq!(result.emails_deleted, 2);
    Ok(())
}

#[tokio::test]
async fn per_record_failures_complete_the_job_with_errors() -> TestResult {
    init_tracing();

    let h = TestHarness::builder()
        .records(spam_records("s", 4))
        .policy(spam_policy("p").build())
        .build()?;
    h.backend.fail_records(&["s-1"]);

    let job_id = h
        .service
        .trigger_manual_cleanup("p", ManualCleanupOptions::default())
        .await?;
    let result = h.service.process_cleanup_job(&job_id).await?;

    assert!(!result.success);
    assert_eq!(result.emails_processed, 4);
    assert_eq!(result.emails_deleted, 3);
    assert_eq!(result.storage_freed, 3 * 1024);
    assert_eq!(result.errors.len(), 1);
    assert_eq!(result.errors[0].kind, JobErrorKind::PartialBatchFailure);
    assert_eq!(result.errors[0].record_id.as_deref(), Some("s-1"));

    assert_eq!(h.service.get_job(&job_id)?.status, JobStatus::Completed);
    assert!(h.record("s-1").is_some_and(|r| !r.deleted));
    assert!(h.record("s-0").is_some_and(|r| r.deleted));
    Ok(())
}

#[tokio::test]
async fn transient_backend_failures_are_retried() -> TestResult {
    init_tracing();

    let h = TestHarness::builder()
        .records(spam_records("s", 2))
        .policy(spam_policy("p").build())
        .build()?;
    h.backend.fail_next_calls(2);

    let job_id = h
        .service
        .trigger_manual_cleanup("p", ManualCleanupOptions::default())
        .await?;
    let result = h.service.process_cleanup_job(&job_id).await?;

    assert_eq!(h.backend.call_count(), 3);
    assert!(result.success);
    assert_eq!(result.emails_deleted, 2);
    Ok(())
}

#[tokio::test]
async fn a_batch_that_exhausts_its_attempts_is_reported_and_the_rest_run() -> TestResult {
    init_tracing();

    let h = TestHarness::builder()
        .batch_size(2)
        .records(spam_records("s", 4))
        .policy(spam_policy("p").build())
        .build()?;
    // Default is three attempts per batch: the whole first batch fails.
    h.backend.fail_next_calls(3);

    let job_id = h
        .service
        .trigger_manual_cleanup("p", ManualCleanupOptions::default())
        .await?;
    let result = h.service.process_cleanup_job(&job_id).await?;

    assert_eq!(h.backend.call_count(), 4);
    assert!(!result.success);
    assert_eq!(result.batches_failed, 1);
    assert_eq!(result.emails_deleted, 2);
    assert_eq!(result.errors.len(), 1);
    assert_eq!(result.errors[0].kind, JobErrorKind::BackendError);
    assert_eq!(result.errors[0].batch, 0);

    // The oldest two were in the failed batch.
    assert!(h.record("s-3").is_some_and(|r| !r.deleted));
    assert!(h.record("s-0").is_some_and(|r| r.deleted));
    Ok(())
}

#[tokio::test]
async fn an_unreachable_backend_fails_the_job() -> TestResult {
    init_tracing();

    let h = TestHarness::builder()
        .batch_size(2)
        .records(spam_records("s", 3))
        .policy(spam_policy("p").build())
        .build()?;
    h.backend.fail_always(true);

    let job_id = h
        .service
        .trigger_manual_cleanup("p", ManualCleanupOptions::default())
        .await?;
    let err = h
        .service
        .process_cleanup_job(&job_id)
        .await
        .expect_err("every batch failed");
    assert!(matches!(err, SweepError::BackendError(_)));

    let job = h.service.get_job(&job_id)?;
    assert_eq!(job.status, JobStatus::Failed);
    assert!(job.results.is_none());
    let details = job.error_details.expect("failure details");
    assert_eq!(details.kind, FailureKind::BackendUnavailable);
    let partial = details.partial.expect("partial results");
    assert_eq!(partial.batches_failed, 2);
    assert_eq!(partial.emails_deleted, 0);
    Ok(())
}

#[tokio::test]
async fn policy_changes_after_enqueue_are_seen_at_processing_time() -> TestResult {
    init_tracing();

    let h = TestHarness::builder()
        .records(spam_records("s", 2))
        .policy(spam_policy("gone").build())
        .policy(spam_policy("paused").priority(200).build())
        .build()?;

    let gone = h
        .service
        .trigger_manual_cleanup("gone", ManualCleanupOptions::default())
        .await?;
    h.service.policies().delete("gone")?;
    let err = h.service.process_cleanup_job(&gone).await.expect_err("policy deleted");
    assert!(matches!(err, SweepError::NotFound { .. }));
    assert_eq!(
        h.service.get_job(&gone)?.error_details.map(|d| d.kind),
        Some(FailureKind::PolicyMissing)
    );

    let paused = h
        .service
        .trigger_manual_cleanup("paused", ManualCleanupOptions::default())
        .await?;
    h.service
        .policies()
        .set_enabled("paused", false, mailsweep_test_utils::test_now())?;
    let err = h.service.process_cleanup_job(&paused).await.expect_err("policy disabled");
    assert!(matches!(err, SweepError::PolicyDisabled(_)));
    assert_eq!(
        h.service.get_job(&paused)?.error_details.map(|d| d.kind),
        Some(FailureKind::PolicyDisabled)
    );

    assert_eq!(h.backend.call_count(), 0);
    Ok(())
}

#[tokio::test]
async fn dry_run_first_forces_a_preview_before_the_first_real_run() -> TestResult {
    init_tracing();

    let h = TestHarness::builder()
        .records(spam_records("s", 3))
        .policy(spam_policy("new").dry_run_first().build())
        .build()?;

    let first = h
        .service
        .trigger_manual_cleanup("new", ManualCleanupOptions::default())
        .await?;
    let first = h.service.process_cleanup_job(&first).await?;
    assert!(first.dry_run && first.forced_dry_run);
    assert_eq!(h.backend.call_count(), 0);

    let second = h
        .service
        .trigger_manual_cleanup("new", ManualCleanupOptions::default())
        .await?;
    let second = h.service.process_cleanup_job(&second).await?;
    assert!(!second.dry_run);
    assert_eq!(second.emails_deleted, 3);
    Ok(())
}

#[tokio::test]
async fn a_job_is_processed_at_most_once() -> TestResult {
    init_tracing();

    let h = TestHarness::builder()
        .records(spam_records("s", 2))
        .policy(spam_policy("p").build())
        .build()?;

    let job_id = h
        .service
        .trigger_manual_cleanup("p", ManualCleanupOptions::default())
        .await?;

    let (a, b) = tokio::join!(
        h.service.process_cleanup_job(&job_id),
        h.service.process_cleanup_job(&job_id)
    );
    let oks = [a.is_ok(), b.is_ok()].into_iter().filter(|ok| *ok).count();
    assert_eq!(oks, 1);
    let loser = if a.is_ok() { b } else { a };
    assert!(matches!(loser, Err(SweepError::InvalidTransition { .. })));

    let again = h.service.process_cleanup_job(&job_id).await;
    assert!(matches!(
        again,
        Err(SweepError::InvalidTransition {
            from: JobStatus::Completed,
            ..
        })
    ));
    assert_eq!(h.backend.touched_ids().len(), 2);
    Ok(())
}

#[tokio::test]
async fn candidates_are_re_resolved_when_the_job_runs() -> TestResult {
    init_tracing();

    let h = TestHarness::builder()
        .records(spam_records("s", 2))
        .policy(spam_policy("p").build())
        .build()?;

    let job_id = h
        .service
        .trigger_manual_cleanup("p", ManualCleanupOptions::default())
        .await?;
    h.records
        .bulk_upsert(vec![RecordBuilder::new("late").aged_days(10).spam(0.99).build()])
        .await?;

    let result = h.service.process_cleanup_job(&job_id).await?;
    assert_eq!(result.emails_processed, 3);
    assert!(h.record("late").is_some_and(|r| r.deleted));
    Ok(())
}

#[tokio::test]
async fn run_level_max_emails_caps_below_the_policy_limit() -> TestResult {
    init_tracing();

    let h = TestHarness::builder()
        .records(spam_records("s", 5))
        .policy(spam_policy("p").max_emails(4).build())
        .build()?;

    let job_id = h
        .service
        .trigger_manual_cleanup(
            "p",
            ManualCleanupOptions {
                max_emails: Some(2),
                ..ManualCleanupOptions::default()
            },
        )
        .await?;
    let result = h.service.process_cleanup_job(&job_id).await?;

    assert_eq!(result.emails_processed, 2);
    assert!(result.truncated);
    assert_eq!(result.matched, 5);
    assert_eq!(h.backend.touched_ids(), vec!["s-4".to_string(), "s-3".to_string()]);
    Ok(())
}
