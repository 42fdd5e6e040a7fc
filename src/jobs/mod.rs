// src/jobs/mod.rs

//! Durable jobs and their execution.
//!
//! - [`model`] is the job record and its state machine.
//! - [`queue`] is the persisted queue with atomic transitions.
//! - [`processor`] runs a claimed job's action in batches.

pub mod model;
pub mod processor;
pub mod queue;

pub use model::{
    CleanupParams, ErrorDetails, FailureKind, Job, JobError, JobErrorKind, JobFilter, JobId,
    JobPatch, JobProgress, JobResult, JobStatus, JobType, TriggerSource,
};
pub use processor::{runs_unattended, JobProcessor};
pub use queue::JobQueue;
