// src/automation/scheduler.rs

use std::sync::Mutex;

use chrono::{DateTime, Duration, Utc};
use tracing::{debug, info};

use crate::automation::rate::RateWindow;
use crate::config::ContinuousCleanupConfig;
use crate::jobs::{Job, JobFilter, JobQueue, JobType};
use crate::sync::lock;

/// Decision for one scheduler tick.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TickPlan {
    /// `continuous_cleanup.enabled` is false.
    Disabled,
    /// Inside the configured peak hours.
    PeakHours,
    /// `max_concurrent_operations` scheduled jobs are already active.
    ConcurrencyCap { active: usize, max: usize },
    /// The rolling minute has no allowance left.
    RateExhausted,
    /// Dispatch at most `budget` emails this tick.
    Run { budget: usize },
}

/// Rate and concurrency bookkeeping for the continuous cleanup loop.
///
/// Holds only the rolling rate window; the active job count is always read
/// from the queue. [`AutomationScheduler::rebuild`] restores the window from
/// stored jobs after a restart.
#[derive(Debug, Default)]
pub struct AutomationScheduler {
    rate: Mutex<RateWindow>,
}

impl AutomationScheduler {
    pub fn new() -> Self {
        Self::default()
    }

    /// Decide what this tick may do. `active` is the number of pending or
    /// running scheduled jobs.
    pub fn plan(&self, config: &ContinuousCleanupConfig, now: DateTime<Utc>, active: usize) -> TickPlan {
        if !config.enabled {
            return TickPlan::Disabled;
        }
        if config.pause_during_peak_hours && config.peak_hours.contains(now) {
            return TickPlan::PeakHours;
        }
        if active >= config.max_concurrent_operations {
            return TickPlan::ConcurrencyCap {
                active,
                max: config.max_concurrent_operations,
            };
        }

        let budget = lock(&self.rate).remaining(now, config.target_emails_per_minute);
        if budget == 0 {
            return TickPlan::RateExhausted;
        }
        TickPlan::Run { budget }
    }

    pub fn record_dispatch(&self, at: DateTime<Utc>, emails: usize) {
        lock(&self.rate).record(at, emails);
        debug!(emails, "scheduler dispatch recorded");
    }

    /// Emails dispatched in the minute ending at `now`.
    pub fn used(&self, now: DateTime<Utc>) -> usize {
        lock(&self.rate).used(now)
    }

    /// Reset the rate window from scheduled jobs created in the last minute.
    /// Returns how many jobs were counted.
    pub fn rebuild(&self, queue: &JobQueue, now: DateTime<Utc>) -> usize {
        let recent = queue.created_since(JobType::ScheduledCleanup, now - Duration::seconds(60));

        let mut rate = lock(&self.rate);
        rate.clear();
        for job in &recent {
            rate.record(job.created_at, dispatched_emails(job));
        }

        let active = queue
            .list(&JobFilter {
                job_type: Some(JobType::ScheduledCleanup),
                ..JobFilter::default()
            })
            .iter()
            .filter(|j| j.status.is_active())
            .count();
        info!(recent = recent.len(), active, "scheduler state rebuilt from job queue");
        recent.len()
    }
}

/// Best known email count for a stored scheduled job.
fn dispatched_emails(job: &Job) -> usize {
    if let Some(results) = &job.results {
        return results.emails_processed;
    }
    if let Some(partial) = job.error_details.as_ref().and_then(|e| e.partial.as_ref()) {
        return partial.emails_processed;
    }
    job.request_params.max_emails.unwrap_or(0)
}
