// src/action/backend.rs

//! Pluggable action backend abstraction.
//!
//! The job processor talks to an `ActionBackend` for every destructive side
//! effect; nothing else in the crate mutates mail records.
//!
//! - `StoreActionBackend` applies deletes/archives as soft flags through the
//!   record store's `bulk_upsert`.
//! - Tests provide their own backend that records calls and injects failures.

use std::collections::HashMap;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::errors::Result;
use crate::policy::ActionKind;
use crate::store::RecordStore;
use crate::types::BoxFuture;

/// Per-call options passed through to the backend.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ActionOptions {
    pub job_id: String,
    pub policy_id: String,
    pub batch_index: usize,
}

/// A single record the backend could not act on.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RecordError {
    pub record_id: String,
    pub message: String,
}

/// Result of one backend call (one batch).
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ActionOutcome {
    pub success: bool,
    pub affected_count: usize,
    pub errors: Vec<RecordError>,
}

/// Trait abstracting how an action is applied to a batch of records.
///
/// An `Err` return means the whole call failed (backend unreachable or
/// erroring) and may be retried; per-record problems belong in
/// `ActionOutcome::errors`.
pub trait ActionBackend: Send + Sync {
    fn execute(
        &self,
        kind: ActionKind,
        record_ids: Vec<String>,
        options: ActionOptions,
    ) -> BoxFuture<'_, Result<ActionOutcome>>;
}

/// Backend that applies actions to a [`RecordStore`] by flagging records.
pub struct StoreActionBackend {
    records: Arc<dyn RecordStore>,
}

impl StoreActionBackend {
    pub fn new(records: Arc<dyn RecordStore>) -> Self {
        Self { records }
    }
}

impl ActionBackend for StoreActionBackend {
    fn execute(
        &self,
        kind: ActionKind,
        record_ids: Vec<String>,
        options: ActionOptions,
    ) -> BoxFuture<'_, Result<ActionOutcome>> {
        Box::pin(async move {
            let live = self.records.get_many(&record_ids).await?;
            let mut by_id: HashMap<String, _> =
                live.into_iter().map(|r| (r.id.clone(), r)).collect();

            let mut updated = Vec::with_capacity(record_ids.len());
            let mut errors = Vec::new();

            for id in record_ids {
                match by_id.remove(&id) {
                    Some(mut record) => {
                        match kind {
                            ActionKind::Delete => record.deleted = true,
                            ActionKind::Archive => record.archived = true,
                        }
                        updated.push(record);
                    }
                    None => errors.push(RecordError {
                        record_id: id,
                        message: "record not found or already deleted".to_string(),
                    }),
                }
            }

            let affected_count = self.records.bulk_upsert(updated).await?;
            debug!(
                job_id = %options.job_id,
                batch = options.batch_index,
                action = %kind,
                affected_count,
                errors = errors.len(),
                "store backend applied batch"
            );

            Ok(ActionOutcome {
                success: errors.is_empty(),
                affected_count,
                errors,
            })
        })
    }
}
