// src/store/record.rs

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::types::Importance;

/// One message in the mailbox index, as far as lifecycle cleanup cares.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EmailRecord {
    pub id: String,
    pub received_at: DateTime<Utc>,
    #[serde(default)]
    pub importance: Importance,
    #[serde(default)]
    pub spam_score: f64,
    #[serde(default)]
    pub promotional_score: f64,
    #[serde(default)]
    pub size_bytes: u64,
    #[serde(default)]
    pub archived: bool,
    /// Soft-delete marker; deleted records never match a search.
    #[serde(default)]
    pub deleted: bool,
}

impl EmailRecord {
    /// Whole days elapsed since the record was received.
    pub fn age_days(&self, now: DateTime<Utc>) -> i64 {
        (now - self.received_at).num_days()
    }
}

/// Conjunctive query over [`EmailRecord`]s. `None` fields impose no
/// constraint.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SearchCriteria {
    /// Inclusive upper bound on `received_at` (i.e. "age >= N days").
    pub received_before: Option<DateTime<Utc>>,
    /// Inclusive lower bound on `received_at`.
    pub received_after: Option<DateTime<Utc>>,
    /// Ordinal `<=` bound on importance.
    pub importance_max: Option<Importance>,
    /// `spam_score >= N`.
    pub spam_score_min: Option<f64>,
    /// `promotional_score >= N`.
    pub promotional_score_min: Option<f64>,
    /// Skip records that are already archived.
    pub exclude_archived: bool,
}

impl SearchCriteria {
    pub fn matches(&self, record: &EmailRecord) -> bool {
        if record.deleted {
            return false;
        }
        if self.exclude_archived && record.archived {
            return false;
        }
        if let Some(before) = self.received_before {
            if record.received_at > before {
                return false;
            }
        }
        if let Some(after) = self.received_after {
            if record.received_at < after {
                return false;
            }
        }
        if let Some(max) = self.importance_max {
            if record.importance > max {
                return false;
            }
        }
        if let Some(min) = self.spam_score_min {
            if record.spam_score < min {
                return false;
            }
        }
        if let Some(min) = self.promotional_score_min {
            if record.promotional_score < min {
                return false;
            }
        }
        true
    }
}

/// Aggregate size of the live records in a store.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct StoreUsage {
    pub total_records: u64,
    pub total_bytes: u64,
}
