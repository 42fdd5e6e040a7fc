// src/automation/triggers.rs

//! Edge-triggered threshold detection.

use std::collections::HashSet;
use std::fmt;

use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::automation::signals::SignalSample;
use crate::config::EventTriggersConfig;
use crate::policy::PolicyId;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ThresholdKind {
    StorageWarning,
    StorageCritical,
    Performance,
    EmailVolume,
}

impl fmt::Display for ThresholdKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ThresholdKind::StorageWarning => "storage_warning",
            ThresholdKind::StorageCritical => "storage_critical",
            ThresholdKind::Performance => "performance",
            ThresholdKind::EmailVolume => "email_volume",
        };
        f.write_str(s)
    }
}

/// A threshold that was crossed by the latest sample, with the policies to run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FiredTrigger {
    pub kind: ThresholdKind,
    pub policies: Vec<PolicyId>,
}

/// Turns signal samples into threshold crossings.
///
/// Each [`ThresholdKind`] fires once when its signal crosses into breach and
/// then stays latched until a sample shows the signal back below threshold.
/// Missing readings leave the latch as it was.
///
/// Crossing rules:
/// - storage: `used_percent >= warning` / `>= critical`. A critical crossing
///   also latches warning without firing it, so falling from critical to
///   warning level does not fire warning policies.
/// - performance: latency `>` its threshold, or cache hit rate `<` its
///   threshold. Both feed one latch.
/// - volume: `daily_email_volume >= daily_email_threshold`.
///
/// Disabling a block clears its latches.
#[derive(Debug, Default)]
pub struct EventTriggerMonitor {
    latched: HashSet<ThresholdKind>,
}

impl EventTriggerMonitor {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_latched(&self, kind: ThresholdKind) -> bool {
        self.latched.contains(&kind)
    }

    pub fn evaluate(
        &mut self,
        config: &EventTriggersConfig,
        sample: &SignalSample,
    ) -> Vec<FiredTrigger> {
        let mut fired = Vec::new();

        let storage = &config.storage_threshold;
        if !storage.enabled {
            self.release(ThresholdKind::StorageWarning);
            self.release(ThresholdKind::StorageCritical);
        } else if let Some(pct) = sample.storage_used_percent {
            if pct >= storage.critical_threshold_percent {
                self.latched.insert(ThresholdKind::StorageWarning);
                if self.latch(ThresholdKind::StorageCritical) {
                    fired.push(FiredTrigger {
                        kind: ThresholdKind::StorageCritical,
                        policies: storage.critical_policies.clone(),
                    });
                }
            } else if pct >= storage.warning_threshold_percent {
                self.release(ThresholdKind::StorageCritical);
                if self.latch(ThresholdKind::StorageWarning) {
                    fired.push(FiredTrigger {
                        kind: ThresholdKind::StorageWarning,
                        policies: storage.warning_policies.clone(),
                    });
                }
            } else {
                self.release(ThresholdKind::StorageWarning);
                self.release(ThresholdKind::StorageCritical);
            }
        }

        let perf = &config.performance_threshold;
        if !perf.enabled {
            self.release(ThresholdKind::Performance);
        } else {
            let slow = sample
                .query_latency_ms
                .map(|ms| ms > perf.query_time_threshold_ms);
            let cold = sample
                .cache_hit_rate
                .map(|rate| rate < perf.cache_hit_rate_threshold);
            if let Some(breached) = combine(slow, cold) {
                self.edge(ThresholdKind::Performance, breached, &perf.policies, &mut fired);
            }
        }

        let volume = &config.email_volume_threshold;
        if !volume.enabled {
            self.release(ThresholdKind::EmailVolume);
        } else if let Some(n) = sample.daily_email_volume {
            let breached = n >= volume.daily_email_threshold;
            self.edge(ThresholdKind::EmailVolume, breached, &volume.policies, &mut fired);
        }

        for t in &fired {
            info!(threshold = %t.kind, policies = ?t.policies, "threshold crossed");
        }
        fired
    }

    fn edge(
        &mut self,
        kind: ThresholdKind,
        breached: bool,
        policies: &[PolicyId],
        fired: &mut Vec<FiredTrigger>,
    ) {
        if !breached {
            self.release(kind);
        } else if self.latch(kind) {
            fired.push(FiredTrigger {
                kind,
                policies: policies.to_vec(),
            });
        }
    }

    /// Returns true if the latch was newly set.
    fn latch(&mut self, kind: ThresholdKind) -> bool {
        self.latched.insert(kind)
    }

    fn release(&mut self, kind: ThresholdKind) {
        if self.latched.remove(&kind) {
            debug!(threshold = %kind, "threshold re-armed");
        }
    }
}

/// Either reading in breach counts; no readings at all means "unknown".
fn combine(a: Option<bool>, b: Option<bool>) -> Option<bool> {
    match (a, b) {
        (None, None) => None,
        (a, b) => Some(a.unwrap_or(false) || b.unwrap_or(false)),
    }
}
