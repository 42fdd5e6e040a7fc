// src/jobs/queue.rs

//! Durable job state machine.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use chrono::{DateTime, Utc};
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::automation::Clock;
use crate::errors::{Result, SweepError};
use crate::jobs::model::{
    CleanupParams, FailureKind, Job, JobFilter, JobId, JobPatch, JobProgress, JobResult, JobStatus,
    JobType,
};
use crate::store::DocumentStore;
use crate::sync::lock;

struct QueueState {
    jobs: HashMap<JobId, Job>,
    closed: bool,
}

/// Durable queue of jobs with atomic, validated state transitions.
///
/// All transitions for all jobs go through one mutex, so the check of the
/// current status and the write of the next one can never interleave with
/// another caller. That is what makes [`JobQueue::claim`] safe to race: only
/// one caller can move a job out of `Pending`.
pub struct JobQueue {
    state: Mutex<QueueState>,
    storage: Mutex<Box<dyn DocumentStore<Job>>>,
    clock: Arc<dyn Clock>,
}

impl std::fmt::Debug for JobQueue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let state = lock(&self.state);
        f.debug_struct("JobQueue")
            .field("jobs", &state.jobs.len())
            .field("closed", &state.closed)
            .finish_non_exhaustive()
    }
}

impl JobQueue {
    pub fn open(storage: Box<dyn DocumentStore<Job>>, clock: Arc<dyn Clock>) -> Result<Self> {
        let loaded = storage.load_all()?;
        let jobs: HashMap<JobId, Job> = loaded.into_iter().map(|j| (j.job_id.clone(), j)).collect();
        debug!(count = jobs.len(), "job queue opened");

        Ok(Self {
            state: Mutex::new(QueueState {
                jobs,
                closed: false,
            }),
            storage: Mutex::new(storage),
            clock,
        })
    }

    /// Create a new job in `Pending`.
    pub fn enqueue(&self, job_type: JobType, request_params: CleanupParams) -> Result<JobId> {
        let mut state = lock(&self.state);
        if state.closed {
            return Err(SweepError::QueueClosed);
        }

        let job = Job {
            job_id: Uuid::new_v4().to_string(),
            job_type,
            status: JobStatus::Pending,
            request_params,
            progress: None,
            results: None,
            error_details: None,
            created_at: self.clock.now(),
            started_at: None,
            completed_at: None,
        };
        let job_id = job.job_id.clone();
        let policy_id = job.request_params.policy_id.clone();

        self.commit(&mut state, job)?;
        info!(job_id = %job_id, ?job_type, policy_id = %policy_id, "job enqueued");
        Ok(job_id)
    }

    /// Move a job to `next`, applying `patch`.
    ///
    /// Only `Pending -> InProgress` and `InProgress -> {Completed, Failed}` are
    /// accepted; anything else is `InvalidTransition`. A completed job must
    /// carry results and a failed job must carry error details, never both.
    pub fn transition(&self, job_id: &str, next: JobStatus, patch: JobPatch) -> Result<Job> {
        let mut state = lock(&self.state);
        let current = state
            .jobs
            .get(job_id)
            .ok_or_else(|| SweepError::job_not_found(job_id))?;

        if !current.status.can_transition_to(next) {
            return Err(SweepError::InvalidTransition {
                job_id: job_id.to_string(),
                from: current.status,
                to: next,
            });
        }

        match next {
            JobStatus::Completed if patch.results.is_none() || patch.error_details.is_some() => {
                return Err(SweepError::ValidationError(format!(
                    "job {job_id}: COMPLETED requires results and no error details"
                )));
            }
            JobStatus::Failed if patch.error_details.is_none() || patch.results.is_some() => {
                return Err(SweepError::ValidationError(format!(
                    "job {job_id}: FAILED requires error details and no results"
                )));
            }
            _ => {}
        }

        let now = self.clock.now();
        let from = current.status;
        let mut job = current.clone();
        job.status = next;
        if patch.progress.is_some() {
            job.progress = patch.progress;
        }
        match next {
            JobStatus::InProgress => job.started_at = Some(now),
            JobStatus::Completed => {
                job.results = patch.results;
                job.completed_at = Some(now);
            }
            JobStatus::Failed => {
                job.error_details = patch.error_details;
                job.completed_at = Some(now);
            }
            JobStatus::Pending => {}
        }

        self.commit(&mut state, job.clone())?;
        debug!(job_id = %job_id, ?from, to = ?next, "job transitioned");
        Ok(job)
    }

    /// Atomically take ownership of a pending job (`Pending -> InProgress`).
    ///
    /// A second caller racing for the same job gets `InvalidTransition`.
    pub fn claim(&self, job_id: &str) -> Result<Job> {
        self.transition(job_id, JobStatus::InProgress, JobPatch::default())
    }

    /// Record progress on a running job.
    pub fn update_progress(&self, job_id: &str, progress: JobProgress) -> Result<()> {
        let mut state = lock(&self.state);
        let current = state
            .jobs
            .get(job_id)
            .ok_or_else(|| SweepError::job_not_found(job_id))?;

        if current.status != JobStatus::InProgress {
            return Err(SweepError::InvalidTransition {
                job_id: job_id.to_string(),
                from: current.status,
                to: JobStatus::InProgress,
            });
        }

        let mut job = current.clone();
        job.progress = Some(progress);
        self.commit(&mut state, job)
    }

    pub fn get(&self, job_id: &str) -> Result<Job> {
        lock(&self.state)
            .jobs
            .get(job_id)
            .cloned()
            .ok_or_else(|| SweepError::job_not_found(job_id))
    }

    /// Jobs matching `filter`, oldest first.
    pub fn list(&self, filter: &JobFilter) -> Vec<Job> {
        let mut jobs: Vec<Job> = lock(&self.state)
            .jobs
            .values()
            .filter(|j| filter.matches(j))
            .cloned()
            .collect();
        jobs.sort_by(|a, b| {
            a.created_at
                .cmp(&b.created_at)
                .then_with(|| a.job_id.cmp(&b.job_id))
        });
        jobs
    }

    /// Number of `Pending` or `InProgress` jobs of the given type.
    pub fn count_active(&self, job_type: JobType) -> usize {
        lock(&self.state)
            .jobs
            .values()
            .filter(|j| j.job_type == job_type && j.status.is_active())
            .count()
    }

    /// Jobs of `job_type` created at or after `since`.
    pub fn created_since(&self, job_type: JobType, since: DateTime<Utc>) -> Vec<Job> {
        let filter = JobFilter {
            job_type: Some(job_type),
            ..JobFilter::default()
        };
        self.list(&filter)
            .into_iter()
            .filter(|j| j.created_at >= since)
            .collect()
    }

    /// Whether the policy has ever completed a dry run.
    pub fn has_completed_dry_run(&self, policy_id: &str) -> bool {
        lock(&self.state).jobs.values().any(|j| {
            j.status == JobStatus::Completed
                && j.policy_id() == policy_id
                && j.results.as_ref().is_some_and(|r| r.dry_run)
        })
    }

    /// Mark every job left `InProgress` by a previous process as `Failed`
    /// with an `interrupted` reason. Returns the affected job ids.
    pub fn reconcile_interrupted(&self) -> Result<Vec<JobId>> {
        let stuck: Vec<JobId> = self
            .list(&JobFilter {
                status: Some(JobStatus::InProgress),
                ..JobFilter::default()
            })
            .into_iter()
            .map(|j| j.job_id)
            .collect();

        for job_id in &stuck {
            let job = self.get(job_id)?;
            let partial = job.progress.map(|p| JobResult {
                emails_processed: p.emails_processed,
                batches_total: p.batches_total,
                ..Default::default()
            });
            warn!(job_id = %job_id, policy_id = %job.policy_id(), "reconciling interrupted job");
            self.transition(
                job_id,
                JobStatus::Failed,
                JobPatch::failed(
                    FailureKind::Interrupted,
                    "job was still in progress when the previous process stopped",
                    partial,
                ),
            )?;
        }

        Ok(stuck)
    }

    /// Reject further enqueues. Transitions of existing jobs keep working so
    /// in-flight processors can still finish.
    pub fn close(&self) {
        let mut state = lock(&self.state);
        if !state.closed {
            state.closed = true;
            info!(jobs = state.jobs.len(), "job queue closed");
        }
    }

    pub fn is_closed(&self) -> bool {
        lock(&self.state).closed
    }

    /// Persist the updated job, then make it visible.
    fn commit(&self, state: &mut QueueState, job: Job) -> Result<()> {
        let mut items: Vec<Job> = state
            .jobs
            .values()
            .filter(|j| j.job_id != job.job_id)
            .cloned()
            .collect();
        items.push(job.clone());
        lock(&self.storage).save_all(&items)?;

        state.jobs.insert(job.job_id.clone(), job);
        Ok(())
    }
}
