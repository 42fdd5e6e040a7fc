// src/errors.rs

//! Crate-wide error type and result alias.

use thiserror::Error;

use crate::jobs::JobStatus;

#[derive(Error, Debug)]
pub enum SweepError {
    /// Malformed policy or configuration; rejected before any state change.
    #[error("Validation error: {0}")]
    ValidationError(String),

    #[error("{kind} not found: {id}")]
    NotFound { kind: &'static str, id: String },

    #[error("Policy is disabled: {0}")]
    PolicyDisabled(String),

    #[error("Policy '{0}' requires confirmation before it can run")]
    ConfirmationRequired(String),

    /// Job state machine violation. Never retried.
    #[error("Invalid transition for job {job_id}: {from:?} -> {to:?}")]
    InvalidTransition {
        job_id: String,
        from: JobStatus,
        to: JobStatus,
    },

    #[error("Action backend error: {0}")]
    BackendError(String),

    #[error("Record store error: {0}")]
    StoreError(String),

    #[error("Job {0} was cancelled before all batches ran")]
    Cancelled(String),

    #[error("Job queue is closed")]
    QueueClosed,

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("TOML parsing error: {0}")]
    TomlError(#[from] toml::de::Error),

    #[error("JSON error: {0}")]
    JsonError(#[from] serde_json::Error),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl SweepError {
    pub fn policy_not_found(id: impl Into<String>) -> Self {
        SweepError::NotFound {
            kind: "policy",
            id: id.into(),
        }
    }

    pub fn job_not_found(id: impl Into<String>) -> Self {
        SweepError::NotFound {
            kind: "job",
            id: id.into(),
        }
    }
}

pub use anyhow::Error;
pub type Result<T> = std::result::Result<T, SweepError>;
