// tests/job_queue.rs

mod common;
use crate::common::{init_tracing, test_now, with_timeout, TestResult};

use std::sync::Arc;

use mailsweep::automation::ManualClock;
use mailsweep::errors::SweepError;
use mailsweep::jobs::{
    CleanupParams, FailureKind, Job, JobFilter, JobPatch, JobProgress, JobQueue, JobResult,
    JobStatus, JobType, TriggerSource,
};
use mailsweep::store::MemoryDocumentStore;

fn queue() -> JobQueue {
    JobQueue::open(
        Box::new(MemoryDocumentStore::<Job>::new()),
        Arc::new(ManualClock::new(test_now())),
    )
    .expect("memory queue opens")
}

fn params(policy_id: &str) -> CleanupParams {
    CleanupParams {
        policy_id: policy_id.to_string(),
        dry_run: false,
        max_emails: None,
        batch_size: None,
        confirmed: false,
        trigger: TriggerSource::Manual,
    }
}

fn done() -> JobPatch {
    JobPatch::completed(JobResult {
        success: true,
        ..JobResult::default()
    })
}

#[test]
fn enqueue_creates_a_pending_job_with_only_created_at_set() -> TestResult {
    init_tracing();
    let q = queue();

    let id = q.enqueue(JobType::ManualCleanup, params("p"))?;
    let job = q.get(&id)?;

    assert_eq!(job.status, JobStatus::Pending);
    assert_eq!(job.job_type, JobType::ManualCleanup);
    assert_eq!(job.created_at, test_now());
    assert!(job.started_at.is_none());
    assert!(job.completed_at.is_none());
    assert!(job.results.is_none() && job.error_details.is_none());
    Ok(())
}

#[test]
fn legal_path_sets_timestamps_and_exactly_one_outcome() -> TestResult {
    init_tracing();
    let q = queue();

    let ok = q.enqueue(JobType::ManualCleanup, params("p"))?;
    let running = q.claim(&ok)?;
    assert_eq!(running.status, JobStatus::InProgress);
    assert!(running.started_at.is_some());
    assert!(running.completed_at.is_none());

    let finished = q.transition(&ok, JobStatus::Completed, done())?;
    assert!(finished.completed_at.is_some());
    assert!(finished.results.is_some());
    assert!(finished.error_details.is_none());

    let bad = q.enqueue(JobType::ManualCleanup, params("p"))?;
    q.claim(&bad)?;
    let failed = q.transition(
        &bad,
        JobStatus::Failed,
        JobPatch::failed(FailureKind::PolicyMissing, "gone", None),
    )?;
    assert!(failed.results.is_none());
    assert_eq!(
        failed.error_details.map(|e| e.kind),
        Some(FailureKind::PolicyMissing)
    );
    Ok(())
}

#[test]
fn illegal_transitions_are_rejected_and_leave_the_job_unchanged() -> TestResult {
    init_tracing();
    let q = queue();
    let id = q.enqueue(JobType::ManualCleanup, params("p"))?;

    // Skipping IN_PROGRESS.
    let err = q.transition(&id, JobStatus::Completed, done()).unwrap_err();
    assert!(matches!(
        err,
        SweepError::InvalidTransition {
            from: JobStatus::Pending,
            to: JobStatus::Completed,
            ..
        }
    ));
    assert_eq!(q.get(&id)?.status, JobStatus::Pending);

    q.claim(&id)?;
    q.transition(&id, JobStatus::Completed, done())?;
    let before = q.get(&id)?;

    // Terminal jobs are immutable.
    for next in [JobStatus::Pending, JobStatus::InProgress, JobStatus::Failed, JobStatus::Completed] {
        let err = q
            .transition(
                &id,
                next,
                JobPatch::failed(FailureKind::Cancelled, "late", None),
            )
            .unwrap_err();
        assert!(matches!(err, SweepError::InvalidTransition { .. }));
    }
    assert_eq!(q.get(&id)?, before);
    Ok(())
}

#[test]
fn terminal_transitions_require_the_matching_payload() -> TestResult {
    init_tracing();
    let q = queue();
    let id = q.enqueue(JobType::ManualCleanup, params("p"))?;
    q.claim(&id)?;

    let err = q
        .transition(&id, JobStatus::Completed, JobPatch::default())
        .unwrap_err();
    assert!(matches!(err, SweepError::ValidationError(_)));

    let err = q.transition(&id, JobStatus::Failed, done()).unwrap_err();
    assert!(matches!(err, SweepError::ValidationError(_)));

    assert_eq!(q.get(&id)?.status, JobStatus::InProgress);
    Ok(())
}

#[test]
fn unknown_job_is_not_found() {
    init_tracing();
    let q = queue();
    assert!(matches!(
        q.get("missing"),
        Err(SweepError::NotFound { kind: "job", .. })
    ));
    assert!(matches!(
        q.claim("missing"),
        Err(SweepError::NotFound { .. })
    ));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_claims_have_exactly_one_winner() -> TestResult {
    init_tracing();
    let q = Arc::new(queue());
    let id = q.enqueue(JobType::ScheduledCleanup, params("p"))?;

    let mut handles = Vec::new();
    for _ in 0..16 {
        let q = Arc::clone(&q);
        let id = id.clone();
        handles.push(tokio::spawn(async move { q.claim(&id).is_ok() }));
    }

    let mut winners = 0;
    for h in handles {
        if with_timeout(h).await? {
            winners += 1;
        }
    }

    assert_eq!(winners, 1);
    assert_eq!(q.get(&id)?.status, JobStatus::InProgress);
    Ok(())
}

#[test]
fn progress_is_only_recorded_while_in_progress() -> TestResult {
    init_tracing();
    let q = queue();
    let id = q.enqueue(JobType::ManualCleanup, params("p"))?;

    let progress = JobProgress {
        batches_total: 2,
        batches_done: 1,
        emails_processed: 50,
    };
    assert!(q.update_progress(&id, progress).is_err());

    q.claim(&id)?;
    q.update_progress(&id, progress)?;
    assert_eq!(q.get(&id)?.progress, Some(progress));
    Ok(())
}

#[test]
fn reconcile_marks_in_progress_jobs_interrupted_with_partial_results() -> TestResult {
    init_tracing();
    let q = queue();

    let stuck = q.enqueue(JobType::ScheduledCleanup, params("p"))?;
    q.claim(&stuck)?;
    q.update_progress(
        &stuck,
        JobProgress {
            batches_total: 4,
            batches_done: 2,
            emails_processed: 100,
        },
    )?;
    let waiting = q.enqueue(JobType::ScheduledCleanup, params("p"))?;

    let reconciled = q.reconcile_interrupted()?;
    assert_eq!(reconciled, vec![stuck.clone()]);

    let job = q.get(&stuck)?;
    assert_eq!(job.status, JobStatus::Failed);
    let details = job.error_details.expect("failed job has details");
    assert_eq!(details.kind, FailureKind::Interrupted);
    assert_eq!(details.partial.map(|p| p.emails_processed), Some(100));

    // Pending jobs are left for re-dispatch.
    assert_eq!(q.get(&waiting)?.status, JobStatus::Pending);
    Ok(())
}

#[test]
fn filters_counts_and_close() -> TestResult {
    init_tracing();
    let q = queue();

    let a = q.enqueue(JobType::ScheduledCleanup, params("a"))?;
    q.enqueue(JobType::ScheduledCleanup, params("b"))?;
    q.enqueue(JobType::EventCleanup, params("a"))?;
    q.claim(&a)?;

    assert_eq!(q.count_active(JobType::ScheduledCleanup), 2);
    assert_eq!(q.count_active(JobType::EventCleanup), 1);
    assert_eq!(q.count_active(JobType::ManualCleanup), 0);

    let for_a = q.list(&JobFilter {
        policy_id: Some("a".to_string()),
        ..JobFilter::default()
    });
    assert_eq!(for_a.len(), 2);

    let running = q.list(&JobFilter {
        status: Some(JobStatus::InProgress),
        ..JobFilter::default()
    });
    assert_eq!(running.len(), 1);
    assert_eq!(running[0].job_id, a);

    q.close();
    assert!(q.is_closed());
    assert!(matches!(
        q.enqueue(JobType::ManualCleanup, params("a")),
        Err(SweepError::QueueClosed)
    ));

    // Existing jobs can still finish after close.
    q.transition(&a, JobStatus::Completed, done())?;
    Ok(())
}
