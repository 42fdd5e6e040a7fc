// src/jobs/model.rs

//! Job records and their state machine.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::action::RecordError;
use crate::automation::ThresholdKind;
use crate::policy::PolicyId;

pub type JobId = String;

/// Lifecycle state of a job.
///
/// Legal transitions: `Pending -> InProgress -> {Completed, Failed}`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum JobStatus {
    Pending,
    InProgress,
    Completed,
    Failed,
}

impl JobStatus {
    pub fn is_terminal(self) -> bool {
        matches!(self, JobStatus::Completed | JobStatus::Failed)
    }

    pub fn is_active(self) -> bool {
        !self.is_terminal()
    }

    pub fn can_transition_to(self, next: JobStatus) -> bool {
        matches!(
            (self, next),
            (JobStatus::Pending, JobStatus::InProgress)
                | (JobStatus::InProgress, JobStatus::Completed)
                | (JobStatus::InProgress, JobStatus::Failed)
        )
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobType {
    ManualCleanup,
    ScheduledCleanup,
    EventCleanup,
}

/// What produced the cleanup request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "source", content = "threshold", rename_all = "snake_case")]
pub enum TriggerSource {
    Manual,
    Scheduler,
    Event(ThresholdKind),
}

impl TriggerSource {
    pub fn job_type(self) -> JobType {
        match self {
            TriggerSource::Manual => JobType::ManualCleanup,
            TriggerSource::Scheduler => JobType::ScheduledCleanup,
            TriggerSource::Event(_) => JobType::EventCleanup,
        }
    }
}

/// Request parameters bound to a job at creation time.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CleanupParams {
    pub policy_id: PolicyId,
    #[serde(default)]
    pub dry_run: bool,
    #[serde(default)]
    pub max_emails: Option<usize>,
    #[serde(default)]
    pub batch_size: Option<usize>,
    /// Explicit operator confirmation for `require_confirmation` policies.
    #[serde(default)]
    pub confirmed: bool,
    pub trigger: TriggerSource,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct JobProgress {
    pub batches_total: usize,
    pub batches_done: usize,
    pub emails_processed: usize,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobErrorKind {
    /// The backend call for a whole batch failed after all retries.
    BackendError,
    /// A single record inside an otherwise successful batch.
    PartialBatchFailure,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct JobError {
    pub kind: JobErrorKind,
    pub batch: usize,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub record_id: Option<String>,
    pub message: String,
}

impl JobError {
    pub fn from_record(batch: usize, err: RecordError) -> Self {
        Self {
            kind: JobErrorKind::PartialBatchFailure,
            batch,
            record_id: Some(err.record_id),
            message: err.message,
        }
    }
}

/// Outcome of processing one job.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct JobResult {
    pub success: bool,
    pub emails_processed: usize,
    pub emails_deleted: usize,
    #[serde(default)]
    pub emails_archived: usize,
    pub storage_freed: u64,
    #[serde(default)]
    pub errors: Vec<JobError>,
    #[serde(default)]
    pub dry_run: bool,
    /// A destructive request downgraded by `dry_run_first`.
    #[serde(default)]
    pub forced_dry_run: bool,
    /// The candidate set was capped.
    #[serde(default)]
    pub truncated: bool,
    #[serde(default)]
    pub matched: usize,
    #[serde(default)]
    pub batches_total: usize,
    #[serde(default)]
    pub batches_failed: usize,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureKind {
    /// Left IN_PROGRESS by a previous process.
    Interrupted,
    /// Stopped between batches by shutdown.
    Cancelled,
    PolicyMissing,
    PolicyDisabled,
    ConfirmationRequired,
    NoBackend,
    /// Every batch failed after all retries; nothing was applied.
    BackendUnavailable,
    StoreUnavailable,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorDetails {
    pub kind: FailureKind,
    pub message: String,
    /// Work already applied before the failure, if any.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub partial: Option<JobResult>,
}

/// Durable unit of work: one policy's action over one candidate set.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Job {
    pub job_id: JobId,
    pub job_type: JobType,
    pub status: JobStatus,
    pub request_params: CleanupParams,
    #[serde(default)]
    pub progress: Option<JobProgress>,
    #[serde(default)]
    pub results: Option<JobResult>,
    #[serde(default)]
    pub error_details: Option<ErrorDetails>,
    pub created_at: DateTime<Utc>,
    #[serde(default)]
    pub started_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub completed_at: Option<DateTime<Utc>>,
}

impl Job {
    pub fn policy_id(&self) -> &str {
        &self.request_params.policy_id
    }
}

/// Fields written alongside a status transition.
#[derive(Debug, Clone, Default)]
pub struct JobPatch {
    pub progress: Option<JobProgress>,
    pub results: Option<JobResult>,
    pub error_details: Option<ErrorDetails>,
}

impl JobPatch {
    pub fn completed(results: JobResult) -> Self {
        Self {
            results: Some(results),
            ..Self::default()
        }
    }

    pub fn failed(kind: FailureKind, message: impl Into<String>, partial: Option<JobResult>) -> Self {
        Self {
            error_details: Some(ErrorDetails {
                kind,
                message: message.into(),
                partial,
            }),
            ..Self::default()
        }
    }
}

/// Filter for [`crate::jobs::JobQueue::list`]. Empty fields match anything.
#[derive(Debug, Clone, Default)]
pub struct JobFilter {
    pub status: Option<JobStatus>,
    pub job_type: Option<JobType>,
    pub policy_id: Option<PolicyId>,
}

impl JobFilter {
    pub fn matches(&self, job: &Job) -> bool {
        self.status.is_none_or(|s| s == job.status)
            && self.job_type.is_none_or(|t| t == job.job_type)
            && self
                .policy_id
                .as_deref()
                .is_none_or(|p| p == job.policy_id())
    }
}
