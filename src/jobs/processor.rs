// src/jobs/processor.rs

//! Executes one claimed job in batches.

use std::collections::HashSet;
use std::sync::Arc;

use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::action::{ActionBackend, ActionOptions, ActionOutcome, ActionRegistry};
use crate::config::ProcessingSection;
use crate::engine::ClaimRegistry;
use crate::errors::{Result, SweepError};
use crate::jobs::model::{
    FailureKind, Job, JobError, JobErrorKind, JobPatch, JobProgress, JobResult, JobStatus,
};
use crate::jobs::queue::JobQueue;
use crate::policy::{ActionKind, Candidate, EvaluationOptions, Policy, PolicyEngine};

/// Why a claimed job could not complete.
struct Failure {
    kind: FailureKind,
    error: SweepError,
    partial: Option<JobResult>,
}

impl Failure {
    fn new(kind: FailureKind, error: SweepError) -> Self {
        Self {
            kind,
            error,
            partial: None,
        }
    }

    fn with_partial(mut self, partial: JobResult) -> Self {
        self.partial = Some(partial);
        self
    }
}

/// Consumes queued jobs.
///
/// The processor is the only component that calls an [`ActionBackend`].
/// Every run re-evaluates the job's policy instead of trusting any earlier
/// candidate set.
pub struct JobProcessor {
    queue: Arc<JobQueue>,
    engine: Arc<PolicyEngine>,
    actions: ActionRegistry,
    claims: Arc<ClaimRegistry>,
    processing: ProcessingSection,
}

impl std::fmt::Debug for JobProcessor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("JobProcessor")
            .field("actions", &self.actions)
            .field("processing", &self.processing)
            .finish_non_exhaustive()
    }
}

impl JobProcessor {
    pub fn new(
        queue: Arc<JobQueue>,
        engine: Arc<PolicyEngine>,
        actions: ActionRegistry,
        claims: Arc<ClaimRegistry>,
        processing: ProcessingSection,
    ) -> Self {
        Self {
            queue,
            engine,
            actions,
            claims,
            processing,
        }
    }

    pub fn queue(&self) -> &Arc<JobQueue> {
        &self.queue
    }

    /// Claim and run a pending job to a terminal state.
    ///
    /// A job that is not `Pending` (already claimed by another caller, or
    /// finished) yields `InvalidTransition` and is left untouched. Otherwise
    /// the job always ends `Completed` or `Failed`; for `Failed` the matching
    /// error is also returned.
    pub async fn process(&self, job_id: &str, cancel: &CancellationToken) -> Result<JobResult> {
        let job = self.queue.claim(job_id)?;
        info!(job_id = %job_id, policy_id = %job.policy_id(), job_type = ?job.job_type, "job started");

        let outcome = self.execute(&job, cancel).await;
        self.claims.release(job_id);

        match outcome {
            Ok(result) => {
                self.queue
                    .transition(job_id, JobStatus::Completed, JobPatch::completed(result.clone()))?;
                info!(
                    job_id = %job_id,
                    policy_id = %job.policy_id(),
                    emails_processed = result.emails_processed,
                    emails_deleted = result.emails_deleted,
                    emails_archived = result.emails_archived,
                    errors = result.errors.len(),
                    dry_run = result.dry_run,
                    "job completed"
                );
                Ok(result)
            }
            Err(failure) => {
                warn!(
                    job_id = %job_id,
                    policy_id = %job.policy_id(),
                    kind = ?failure.kind,
                    error = %failure.error,
                    "job failed"
                );
                self.queue.transition(
                    job_id,
                    JobStatus::Failed,
                    JobPatch::failed(failure.kind, failure.error.to_string(), failure.partial),
                )?;
                Err(failure.error)
            }
        }
    }

    async fn execute(&self, job: &Job, cancel: &CancellationToken) -> std::result::Result<JobResult, Failure> {
        let params = &job.request_params;

        let policy = self
            .engine
            .policies()
            .get(&params.policy_id)
            .map_err(|e| Failure::new(FailureKind::PolicyMissing, e))?;

        if !policy.enabled && !params.dry_run {
            return Err(Failure::new(
                FailureKind::PolicyDisabled,
                SweepError::PolicyDisabled(policy.id.clone()),
            ));
        }

        let mut dry_run = params.dry_run;
        let mut forced_dry_run = false;
        if !dry_run && policy.safety.dry_run_first && !self.queue.has_completed_dry_run(&policy.id) {
            info!(policy_id = %policy.id, "no completed dry run yet; running as dry run");
            dry_run = true;
            forced_dry_run = true;
        }

        if !dry_run && policy.safety.require_confirmation && !params.confirmed {
            return Err(Failure::new(
                FailureKind::ConfirmationRequired,
                SweepError::ConfirmationRequired(policy.id.clone()),
            ));
        }

        let kind = policy.action.kind();
        let backend = if dry_run {
            None
        } else {
            Some(
                self.actions
                    .handler(kind)
                    .map_err(|e| Failure::new(FailureKind::NoBackend, e))?,
            )
        };

        let set = {
            let _guard = self.claims.exclusive().await;
            let options = EvaluationOptions {
                max_emails: params.max_emails,
                exclude: self.claims.claimed_by_others(Some(&job.job_id)),
            };
            let set = self
                .engine
                .evaluate_with(&policy, &options)
                .await
                .map_err(|e| Failure::new(FailureKind::StoreUnavailable, e))?;
            if !dry_run {
                self.claims.claim(&job.job_id, set.record_ids());
            }
            set
        };

        let batch_size = params
            .batch_size
            .unwrap_or(self.processing.default_batch_size)
            .max(1);
        let batches: Vec<&[Candidate]> = set.candidates.chunks(batch_size).collect();

        let mut result = JobResult {
            dry_run,
            forced_dry_run,
            truncated: set.truncated,
            matched: set.matched,
            batches_total: batches.len(),
            ..JobResult::default()
        };

        let Some(backend) = backend else {
            // Would-be results; no backend call.
            result.success = true;
            result.emails_processed = set.len();
            result.storage_freed = set.total_bytes();
            match kind {
                ActionKind::Delete => result.emails_deleted = set.len(),
                ActionKind::Archive => result.emails_archived = set.len(),
            }
            debug!(job_id = %job.job_id, candidates = set.len(), "dry run evaluated");
            return Ok(result);
        };

        self.record_progress(&job.job_id, &result, 0);

        for (index, batch) in batches.iter().enumerate() {
            if cancel.is_cancelled() {
                return Err(Failure::new(
                    FailureKind::Cancelled,
                    SweepError::Cancelled(job.job_id.clone()),
                )
                .with_partial(result));
            }

            let options = ActionOptions {
                job_id: job.job_id.clone(),
                policy_id: policy.id.clone(),
                batch_index: index,
            };
            match self.run_batch(backend.as_ref(), kind, batch, options).await {
                Ok(outcome) => apply_outcome(&mut result, kind, index, batch, outcome),
                Err(e) => {
                    result.batches_failed += 1;
                    result.errors.push(JobError {
                        kind: JobErrorKind::BackendError,
                        batch: index,
                        record_id: None,
                        message: e.to_string(),
                    });
                }
            }

            self.record_progress(&job.job_id, &result, index + 1);
        }

        if result.batches_total > 0 && result.batches_failed == result.batches_total {
            let message = format!(
                "all {} batches failed for policy '{}'",
                result.batches_total, policy.id
            );
            return Err(
                Failure::new(FailureKind::BackendUnavailable, SweepError::BackendError(message))
                    .with_partial(result),
            );
        }

        result.success = result.batches_failed == 0 && result.errors.is_empty();
        Ok(result)
    }

    /// One backend call, retried on `Err` with linear backoff.
    async fn run_batch(
        &self,
        backend: &dyn ActionBackend,
        kind: ActionKind,
        batch: &[Candidate],
        options: ActionOptions,
    ) -> Result<ActionOutcome> {
        let ids: Vec<String> = batch.iter().map(|c| c.record_id.clone()).collect();
        let max_attempts = self.processing.max_batch_attempts.max(1);

        let mut attempt = 1;
        loop {
            match backend.execute(kind, ids.clone(), options.clone()).await {
                Ok(outcome) => return Ok(outcome),
                Err(e) if attempt < max_attempts => {
                    warn!(
                        job_id = %options.job_id,
                        batch = options.batch_index,
                        attempt,
                        error = %e,
                        "batch failed; retrying"
                    );
                    tokio::time::sleep(self.processing.retry_backoff(attempt)).await;
                    attempt += 1;
                }
                Err(e) => {
                    warn!(
                        job_id = %options.job_id,
                        batch = options.batch_index,
                        attempts = attempt,
                        error = %e,
                        "batch failed after all attempts"
                    );
                    return Err(e);
                }
            }
        }
    }

    fn record_progress(&self, job_id: &str, result: &JobResult, batches_done: usize) {
        let progress = JobProgress {
            batches_total: result.batches_total,
            batches_done,
            emails_processed: result.emails_processed,
        };
        if let Err(e) = self.queue.update_progress(job_id, progress) {
            warn!(job_id = %job_id, error = %e, "could not record job progress");
        }
    }
}

fn apply_outcome(
    result: &mut JobResult,
    kind: ActionKind,
    index: usize,
    batch: &[Candidate],
    outcome: ActionOutcome,
) {
    let failed: HashSet<&str> = outcome.errors.iter().map(|e| e.record_id.as_str()).collect();
    let freed: u64 = batch
        .iter()
        .filter(|c| !failed.contains(c.record_id.as_str()))
        .map(|c| c.size_bytes)
        .sum();

    result.emails_processed += batch.len();
    match kind {
        ActionKind::Delete => result.emails_deleted += outcome.affected_count,
        ActionKind::Archive => result.emails_archived += outcome.affected_count,
    }
    result.storage_freed += freed;

    debug!(
        batch = index,
        affected = outcome.affected_count,
        errors = outcome.errors.len(),
        "batch applied"
    );
    result
        .errors
        .extend(outcome.errors.into_iter().map(|e| JobError::from_record(index, e)));
}

/// Whether a policy may be picked by an unattended trigger.
pub fn runs_unattended(policy: &Policy) -> bool {
    policy.enabled && !policy.safety.require_confirmation
}
