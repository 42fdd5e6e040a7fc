// src/automation/signals.rs

//! Signal sources sampled by the event trigger loop.

use std::sync::{Arc, Mutex};
use std::time::Instant;

use chrono::Duration;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::automation::Clock;
use crate::config::EventTriggersConfig;
use crate::errors::Result;
use crate::store::{RecordStore, SearchCriteria};
use crate::sync::lock;
use crate::types::BoxFuture;

/// One reading of every signal. `None` means the source has no value for it.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct SignalSample {
    pub storage_used_percent: Option<f64>,
    pub query_latency_ms: Option<f64>,
    pub cache_hit_rate: Option<f64>,
    pub daily_email_volume: Option<usize>,
}

pub trait SignalSource: Send + Sync {
    fn sample<'a>(&'a self, config: &'a EventTriggersConfig) -> BoxFuture<'a, Result<SignalSample>>;
}

/// Returns whatever sample was last set. Used to feed readings by hand.
#[derive(Debug, Default)]
pub struct StaticSignalSource {
    current: Mutex<SignalSample>,
}

impl StaticSignalSource {
    pub fn new(sample: SignalSample) -> Self {
        Self {
            current: Mutex::new(sample),
        }
    }

    pub fn set(&self, sample: SignalSample) {
        *lock(&self.current) = sample;
    }
}

impl SignalSource for StaticSignalSource {
    fn sample<'a>(&'a self, _config: &'a EventTriggersConfig) -> BoxFuture<'a, Result<SignalSample>> {
        let sample = *lock(&self.current);
        Box::pin(async move { Ok(sample) })
    }
}

/// Derives signals from the record store itself.
///
/// - storage: live bytes over `storage_threshold.quota_bytes` (no quota, no
///   reading)
/// - volume: records received in the last 24 hours
/// - latency: wall time of that volume count
///
/// The store exposes no cache statistics, so `cache_hit_rate` is never set.
pub struct StoreSignalSource {
    records: Arc<dyn RecordStore>,
    clock: Arc<dyn Clock>,
}

impl StoreSignalSource {
    pub fn new(records: Arc<dyn RecordStore>, clock: Arc<dyn Clock>) -> Self {
        Self { records, clock }
    }
}

impl SignalSource for StoreSignalSource {
    fn sample<'a>(&'a self, config: &'a EventTriggersConfig) -> BoxFuture<'a, Result<SignalSample>> {
        Box::pin(async move {
            let usage = self.records.usage().await?;
            let storage_used_percent = config
                .storage_threshold
                .quota_bytes
                .filter(|q| *q > 0)
                .map(|quota| usage.total_bytes as f64 / quota as f64 * 100.0);

            let since = self.clock.now() - Duration::hours(24);
            let query = SearchCriteria {
                received_after: Some(since),
                ..SearchCriteria::default()
            };
            let started = Instant::now();
            let daily = self.records.count(&query).await?;
            let latency_ms = started.elapsed().as_secs_f64() * 1000.0;

            let sample = SignalSample {
                storage_used_percent,
                query_latency_ms: Some(latency_ms),
                cache_hit_rate: None,
                daily_email_volume: Some(daily),
            };
            debug!(?sample, "signals sampled from record store");
            Ok(sample)
        })
    }
}
