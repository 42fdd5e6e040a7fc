// src/engine/pipeline.rs

use std::sync::Arc;

use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use crate::engine::claims::ClaimRegistry;
use crate::errors::{Result, SweepError};
use crate::jobs::{CleanupParams, JobId, JobProcessor, JobQueue, JobResult, TriggerSource};
use crate::policy::{EvaluationOptions, PolicyEngine, PolicyId};

/// A request to run one policy, from any trigger source.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CleanupRequest {
    pub policy_id: PolicyId,
    pub trigger: TriggerSource,
    pub dry_run: bool,
    pub max_emails: Option<usize>,
    pub batch_size: Option<usize>,
    pub confirmed: bool,
}

impl CleanupRequest {
    pub fn new(policy_id: impl Into<PolicyId>, trigger: TriggerSource) -> Self {
        Self {
            policy_id: policy_id.into(),
            trigger,
            dry_run: false,
            max_emails: None,
            batch_size: None,
            confirmed: false,
        }
    }

    fn into_params(self) -> CleanupParams {
        CleanupParams {
            policy_id: self.policy_id,
            dry_run: self.dry_run,
            max_emails: self.max_emails,
            batch_size: self.batch_size,
            confirmed: self.confirmed,
            trigger: self.trigger,
        }
    }
}

/// A job created by the pipeline.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Submitted {
    pub job_id: JobId,
    /// Records matched for the job at submission.
    pub candidates: usize,
}

/// The one path every trigger takes: evaluate, enqueue, process.
///
/// Submissions are serialized with every other evaluate-then-claim sequence,
/// so the evaluation of one request and the claim of its records happen
/// before the next request is evaluated. With callers submitting in
/// ascending priority order, a record always ends up with the
/// highest-precedence policy that matched it.
///
/// Scheduler and event jobs are dispatched right after submission and claim
/// their records here. Manual jobs wait for an explicit process call, so
/// they claim only once the processor picks them up.
pub struct CleanupPipeline {
    engine: Arc<PolicyEngine>,
    queue: Arc<JobQueue>,
    processor: Arc<JobProcessor>,
    claims: Arc<ClaimRegistry>,
}

impl std::fmt::Debug for CleanupPipeline {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CleanupPipeline")
            .field("claims", &self.claims)
            .finish_non_exhaustive()
    }
}

impl CleanupPipeline {
    pub fn new(
        engine: Arc<PolicyEngine>,
        queue: Arc<JobQueue>,
        processor: Arc<JobProcessor>,
        claims: Arc<ClaimRegistry>,
    ) -> Self {
        Self {
            engine,
            queue,
            processor,
            claims,
        }
    }

    pub fn claims(&self) -> &Arc<ClaimRegistry> {
        &self.claims
    }

    /// Evaluate and enqueue, even if nothing matches (the job is the audit
    /// record of the trigger).
    pub async fn submit(&self, request: CleanupRequest) -> Result<Submitted> {
        let submitted = self.submit_inner(request, false).await?;
        submitted.ok_or_else(|| SweepError::Other(anyhow::anyhow!("submission produced no job")))
    }

    /// Evaluate and enqueue only if the policy currently matches something.
    pub async fn submit_if_matching(&self, request: CleanupRequest) -> Result<Option<Submitted>> {
        self.submit_inner(request, true).await
    }

    /// Run a pending job to completion.
    pub async fn run(&self, job_id: &str, cancel: &CancellationToken) -> Result<JobResult> {
        self.processor.process(job_id, cancel).await
    }

    async fn submit_inner(&self, request: CleanupRequest, skip_empty: bool) -> Result<Option<Submitted>> {
        let _guard = self.claims.exclusive().await;

        let policy = self.engine.policies().get(&request.policy_id)?;
        if !policy.enabled && !request.dry_run {
            return Err(SweepError::PolicyDisabled(policy.id));
        }

        let options = EvaluationOptions {
            max_emails: request.max_emails,
            exclude: self.claims.claimed_by_others(None),
        };
        let set = self.engine.evaluate_with(&policy, &options).await?;

        if skip_empty && set.is_empty() {
            debug!(policy_id = %policy.id, claimed_removed = set.claimed_removed, "nothing to do");
            return Ok(None);
        }

        let reserve = !request.dry_run && request.trigger != TriggerSource::Manual;
        let job_type = request.trigger.job_type();
        let job_id = self.queue.enqueue(job_type, request.into_params())?;
        if reserve {
            self.claims.claim(&job_id, set.record_ids());
        }

        info!(
            job_id = %job_id,
            policy_id = %policy.id,
            candidates = set.len(),
            truncated = set.truncated,
            "cleanup request submitted"
        );
        Ok(Some(Submitted {
            job_id,
            candidates: set.len(),
        }))
    }
}
