// src/engine/claims.rs

//! Record ownership across concurrently active jobs.

use std::collections::{HashMap, HashSet};
use std::sync::Mutex;

use tokio::sync::{Mutex as AsyncMutex, MutexGuard as AsyncMutexGuard};
use tracing::debug;

use crate::jobs::JobId;
use crate::sync::lock;

/// Which active job currently owns which record ids.
///
/// A record claimed by one active job is excluded from every other job's
/// candidate set until the owner releases it. Because requests are evaluated
/// in ascending priority order, the first (highest-precedence) policy to
/// match a record keeps it.
///
/// Only jobs that are about to run or are running hold claims. A job parked
/// in `Pending` and every dry run leave the records free for others.
#[derive(Debug, Default)]
pub struct ClaimRegistry {
    by_job: Mutex<HashMap<JobId, HashSet<String>>>,
    evaluation: AsyncMutex<()>,
}

impl ClaimRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Serializes evaluate-then-claim sequences. Hold the guard from reading
    /// [`ClaimRegistry::claimed_by_others`] until the matching
    /// [`ClaimRegistry::claim`].
    pub async fn exclusive(&self) -> AsyncMutexGuard<'_, ()> {
        self.evaluation.lock().await
    }

    /// Record ids claimed by any job other than `job_id`.
    pub fn claimed_by_others(&self, job_id: Option<&str>) -> HashSet<String> {
        lock(&self.by_job)
            .iter()
            .filter(|(owner, _)| Some(owner.as_str()) != job_id)
            .flat_map(|(_, ids)| ids.iter().cloned())
            .collect()
    }

    /// Replace the claim held by `job_id`.
    pub fn claim(&self, job_id: &str, record_ids: impl IntoIterator<Item = String>) {
        let ids: HashSet<String> = record_ids.into_iter().collect();
        debug!(job_id = %job_id, records = ids.len(), "records claimed");
        lock(&self.by_job).insert(job_id.to_string(), ids);
    }

    pub fn release(&self, job_id: &str) {
        if lock(&self.by_job).remove(job_id).is_some() {
            debug!(job_id = %job_id, "claim released");
        }
    }

    pub fn active_claims(&self) -> usize {
        lock(&self.by_job).len()
    }
}
