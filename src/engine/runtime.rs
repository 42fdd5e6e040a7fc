// src/engine/runtime.rs

use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use serde::Serialize;
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;
use tracing::{debug, info, warn};

use crate::action::ActionRegistry;
use crate::automation::{
    AutomationScheduler, Clock, EventTriggerMonitor, SignalSource, ThresholdKind, TickPlan,
};
use crate::config::{
    AutomationConfig, ConfigHandle, ConfigSnapshot, ProcessingSection, RawAutomationConfig,
};
use crate::engine::claims::ClaimRegistry;
use crate::engine::pipeline::{CleanupPipeline, CleanupRequest};
use crate::errors::Result;
use crate::jobs::{
    runs_unattended, Job, JobFilter, JobId, JobProcessor, JobQueue, JobResult, JobStatus,
    JobType, TriggerSource,
};
use crate::policy::{NewPolicy, Policy, PolicyEngine, PolicyId, PolicyStore};
use crate::store::{DocumentStore, RecordStore};
use crate::sync::lock;

/// External collaborators and persistence backends the service is built on.
pub struct ServiceDeps {
    pub records: Arc<dyn RecordStore>,
    pub actions: ActionRegistry,
    pub signals: Arc<dyn SignalSource>,
    pub clock: Arc<dyn Clock>,
    pub policy_storage: Box<dyn DocumentStore<Policy>>,
    pub job_storage: Box<dyn DocumentStore<Job>>,
}

/// Options for [`AutomationService::trigger_manual_cleanup`].
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ManualCleanupOptions {
    pub dry_run: bool,
    pub max_emails: Option<usize>,
    pub batch_size: Option<usize>,
    /// Operator confirmation for `require_confirmation` policies.
    pub confirmed: bool,
}

/// What one scheduler tick did.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TickOutcome {
    /// The tick was suppressed before any policy was evaluated.
    Skipped(TickPlan),
    /// No eligible policy matched anything.
    Idle,
    Dispatched {
        job_id: JobId,
        policy_id: PolicyId,
        emails: usize,
    },
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ServiceStatus {
    pub config_version: u64,
    pub continuous_cleanup_enabled: bool,
    pub pending_jobs: usize,
    pub in_progress_jobs: usize,
    pub active_scheduled_jobs: usize,
    /// Emails dispatched by the scheduler in the last minute.
    pub scheduler_rate_used: usize,
    pub latched_thresholds: Vec<ThresholdKind>,
    pub shutting_down: bool,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ShutdownReport {
    /// Every tracked task finished before the timeout.
    pub drained: bool,
    /// Jobs left `InProgress`; the next start marks them interrupted.
    pub still_running: Vec<JobId>,
}

/// Process-wide automation service.
///
/// Owns the live config, the job queue, the pipeline and the two background
/// loops (continuous cleanup and event sampling). All trigger sources end up
/// in the same [`CleanupPipeline`].
pub struct AutomationService {
    config: ConfigHandle,
    processing: ProcessingSection,
    clock: Arc<dyn Clock>,
    engine: Arc<PolicyEngine>,
    queue: Arc<JobQueue>,
    pipeline: CleanupPipeline,
    scheduler: AutomationScheduler,
    monitor: Mutex<EventTriggerMonitor>,
    signals: Arc<dyn SignalSource>,
    tracker: TaskTracker,
    /// Stops the background loops.
    stop_loops: CancellationToken,
    /// Asks running jobs to stop at the next batch boundary.
    cancel_jobs: CancellationToken,
    initialized: AtomicBool,
}

impl fmt::Debug for AutomationService {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AutomationService")
            .field("config_version", &self.config.current().version)
            .field("queue", &self.queue)
            .field("pipeline", &self.pipeline)
            .finish_non_exhaustive()
    }
}

impl AutomationService {
    pub fn new(
        automation: AutomationConfig,
        processing: ProcessingSection,
        deps: ServiceDeps,
    ) -> Result<Arc<Self>> {
        let policies = Arc::new(PolicyStore::open(deps.policy_storage)?);
        let queue = Arc::new(JobQueue::open(deps.job_storage, Arc::clone(&deps.clock))?);
        let engine = Arc::new(PolicyEngine::new(
            policies,
            deps.records,
            Arc::clone(&deps.clock),
        ));
        let claims = Arc::new(ClaimRegistry::new());
        let processor = Arc::new(JobProcessor::new(
            Arc::clone(&queue),
            Arc::clone(&engine),
            deps.actions,
            Arc::clone(&claims),
            processing.clone(),
        ));
        let pipeline = CleanupPipeline::new(
            Arc::clone(&engine),
            Arc::clone(&queue),
            processor,
            claims,
        );

        Ok(Arc::new(Self {
            config: ConfigHandle::new(automation),
            processing,
            clock: deps.clock,
            engine,
            queue,
            pipeline,
            scheduler: AutomationScheduler::new(),
            monitor: Mutex::new(EventTriggerMonitor::new()),
            signals: deps.signals,
            tracker: TaskTracker::new(),
            stop_loops: CancellationToken::new(),
            cancel_jobs: CancellationToken::new(),
            initialized: AtomicBool::new(false),
        }))
    }

    pub fn engine(&self) -> &Arc<PolicyEngine> {
        &self.engine
    }

    pub fn policies(&self) -> &Arc<PolicyStore> {
        self.engine.policies()
    }

    pub fn queue(&self) -> &Arc<JobQueue> {
        &self.queue
    }

    pub fn config(&self) -> Arc<ConfigSnapshot> {
        self.config.current()
    }

    /// Create or refresh policies from the config file.
    pub fn seed_policies(&self, policies: Vec<NewPolicy>) -> Result<usize> {
        let now = self.clock.now();
        let count = policies.len();
        for policy in policies {
            self.policies().upsert(policy, now)?;
        }
        debug!(count, "policies seeded");
        Ok(count)
    }

    /// Bring the service to a consistent state from the job queue.
    ///
    /// Safe to call repeatedly. The first call marks jobs left `InProgress`
    /// by a previous process as interrupted and re-dispatches pending
    /// scheduled and event jobs. Every call rebuilds the scheduler's rate
    /// window from the queue.
    pub fn initialize(self: &Arc<Self>) -> Result<()> {
        let first = !self.initialized.swap(true, Ordering::SeqCst);

        if first {
            let interrupted = self.queue.reconcile_interrupted()?;
            if !interrupted.is_empty() {
                warn!(count = interrupted.len(), "marked interrupted jobs as failed");
            }
        }

        self.scheduler.rebuild(&self.queue, self.clock.now());

        if first {
            let pending = self.queue.list(&JobFilter {
                status: Some(JobStatus::Pending),
                ..JobFilter::default()
            });
            for job in pending {
                if job.job_type != JobType::ManualCleanup {
                    info!(job_id = %job.job_id, "re-dispatching pending job");
                    self.dispatch(job.job_id);
                }
            }
        }

        info!("automation service initialized");
        Ok(())
    }

    /// Initialize, then spawn the scheduler and signal loops.
    pub fn start(self: &Arc<Self>) -> Result<()> {
        self.initialize()?;

        let this = Arc::clone(self);
        self.tracker.spawn(async move { this.scheduler_loop().await });

        let this = Arc::clone(self);
        self.tracker.spawn(async move { this.monitor_loop().await });

        info!("automation loops started");
        Ok(())
    }

    async fn scheduler_loop(self: Arc<Self>) {
        loop {
            let interval = self.config.current().config.continuous_cleanup.tick_interval;
            tokio::select! {
                _ = self.stop_loops.cancelled() => break,
                _ = tokio::time::sleep(interval) => {}
            }
            if let Err(e) = self.run_scheduler_tick().await {
                warn!(error = %e, "scheduler tick failed");
            }
        }
        debug!("scheduler loop stopped");
    }

    async fn monitor_loop(self: Arc<Self>) {
        loop {
            let interval = self.config.current().config.event_triggers.sample_interval();
            tokio::select! {
                _ = self.stop_loops.cancelled() => break,
                _ = tokio::time::sleep(interval) => {}
            }
            if let Err(e) = self.sample_signals().await {
                warn!(error = %e, "signal sampling failed");
            }
        }
        debug!("monitor loop stopped");
    }

    /// One continuous-cleanup tick against the current config.
    ///
    /// Picks the first enabled policy, in ascending priority order, that
    /// matches anything within the remaining rate budget. Policies that need
    /// operator confirmation are never picked.
    pub async fn run_scheduler_tick(self: &Arc<Self>) -> Result<TickOutcome> {
        let snapshot = self.config.current();
        let now = self.clock.now();
        let active = self.queue.count_active(JobType::ScheduledCleanup);

        let budget = match self
            .scheduler
            .plan(&snapshot.config.continuous_cleanup, now, active)
        {
            TickPlan::Run { budget } => budget,
            other => {
                debug!(plan = ?other, "scheduler tick skipped");
                return Ok(TickOutcome::Skipped(other));
            }
        };

        for policy in self.policies().list_enabled() {
            if !runs_unattended(&policy) {
                continue;
            }
            let request = CleanupRequest {
                max_emails: Some(budget),
                ..CleanupRequest::new(policy.id.clone(), TriggerSource::Scheduler)
            };
            match self.pipeline.submit_if_matching(request).await {
                Ok(Some(submitted)) => {
                    self.scheduler.record_dispatch(now, submitted.candidates);
                    self.dispatch(submitted.job_id.clone());
                    return Ok(TickOutcome::Dispatched {
                        job_id: submitted.job_id,
                        policy_id: policy.id,
                        emails: submitted.candidates,
                    });
                }
                Ok(None) => {}
                Err(e) => warn!(policy_id = %policy.id, error = %e, "scheduled evaluation failed"),
            }
        }

        Ok(TickOutcome::Idle)
    }

    /// Sample signals once and enqueue jobs for every newly crossed
    /// threshold. Bypasses the scheduler's rate limit. Like scheduled runs,
    /// event runs skip disabled policies and those needing confirmation.
    pub async fn sample_signals(self: &Arc<Self>) -> Result<Vec<JobId>> {
        let snapshot = self.config.current();
        let triggers = &snapshot.config.event_triggers;
        let sample = self.signals.sample(triggers).await?;
        let fired = lock(&self.monitor).evaluate(triggers, &sample);

        let mut jobs = Vec::new();
        for trigger in fired {
            for policy_id in trigger.policies {
                match self.policies().get(&policy_id) {
                    Ok(policy) if runs_unattended(&policy) => {}
                    Ok(_) => {
                        debug!(
                            policy_id = %policy_id,
                            threshold = %trigger.kind,
                            "policy not eligible for unattended runs; skipped"
                        );
                        continue;
                    }
                    Err(e) => {
                        warn!(policy_id = %policy_id, error = %e, "event-triggered policy missing");
                        continue;
                    }
                }
                let request =
                    CleanupRequest::new(policy_id.clone(), TriggerSource::Event(trigger.kind));
                match self.pipeline.submit(request).await {
                    Ok(submitted) => {
                        self.dispatch(submitted.job_id.clone());
                        jobs.push(submitted.job_id);
                    }
                    Err(e) => warn!(
                        policy_id = %policy_id,
                        threshold = %trigger.kind,
                        error = %e,
                        "event-triggered cleanup not enqueued"
                    ),
                }
            }
        }
        Ok(jobs)
    }

    /// Validate and swap in a new automation config. On any error the
    /// current config stays in place untouched.
    pub fn update_configuration(&self, raw: RawAutomationConfig) -> Result<u64> {
        let config = AutomationConfig::try_from(raw)?;
        let policies = self.policies();
        config.check_policy_refs(|id| policies.contains(id))?;
        Ok(self.config.replace(config))
    }

    /// Enqueue a manual run. The job stays `Pending` until
    /// [`AutomationService::process_cleanup_job`] is called for it.
    pub async fn trigger_manual_cleanup(
        &self,
        policy_id: &str,
        options: ManualCleanupOptions,
    ) -> Result<JobId> {
        let request = CleanupRequest {
            policy_id: policy_id.to_string(),
            trigger: TriggerSource::Manual,
            dry_run: options.dry_run,
            max_emails: options.max_emails,
            batch_size: options.batch_size,
            confirmed: options.confirmed,
        };
        let submitted = self.pipeline.submit(request).await?;
        Ok(submitted.job_id)
    }

    /// Process a pending job on the caller's task. Tracked, so shutdown waits
    /// for it.
    pub async fn process_cleanup_job(&self, job_id: &str) -> Result<JobResult> {
        self.tracker
            .track_future(self.pipeline.run(job_id, &self.cancel_jobs))
            .await
    }

    pub fn get_job(&self, job_id: &str) -> Result<Job> {
        self.queue.get(job_id)
    }

    pub fn list_jobs(&self, filter: &JobFilter) -> Vec<Job> {
        self.queue.list(filter)
    }

    pub fn status(&self) -> ServiceStatus {
        let snapshot = self.config.current();
        let count = |status| {
            self.queue
                .list(&JobFilter {
                    status: Some(status),
                    ..JobFilter::default()
                })
                .len()
        };
        let monitor = lock(&self.monitor);
        let latched_thresholds = [
            ThresholdKind::StorageWarning,
            ThresholdKind::StorageCritical,
            ThresholdKind::Performance,
            ThresholdKind::EmailVolume,
        ]
        .into_iter()
        .filter(|k| monitor.is_latched(*k))
        .collect();

        ServiceStatus {
            config_version: snapshot.version,
            continuous_cleanup_enabled: snapshot.config.continuous_cleanup.enabled,
            pending_jobs: count(JobStatus::Pending),
            in_progress_jobs: count(JobStatus::InProgress),
            active_scheduled_jobs: self.queue.count_active(JobType::ScheduledCleanup),
            scheduler_rate_used: self.scheduler.used(self.clock.now()),
            latched_thresholds,
            shutting_down: self.stop_loops.is_cancelled(),
        }
    }

    /// Stop the loops, wait up to `timeout` for tracked jobs, then close the
    /// queue.
    ///
    /// Jobs still running at the timeout are asked to stop at their next
    /// batch boundary; any that are mid-batch when the process exits stay
    /// `InProgress` for the next start to reconcile.
    pub async fn shutdown(&self, timeout: Duration) -> ShutdownReport {
        info!(?timeout, "shutting down automation service");
        self.stop_loops.cancel();
        self.tracker.close();

        let drained = tokio::time::timeout(timeout, self.tracker.wait())
            .await
            .is_ok();
        if !drained {
            warn!(?timeout, "jobs still running at shutdown timeout; cancelling");
            self.cancel_jobs.cancel();
        }

        self.queue.close();

        let still_running: Vec<JobId> = self
            .queue
            .list(&JobFilter {
                status: Some(JobStatus::InProgress),
                ..JobFilter::default()
            })
            .into_iter()
            .map(|j| j.job_id)
            .collect();
        info!(drained, still_running = still_running.len(), "automation service stopped");

        ShutdownReport {
            drained,
            still_running,
        }
    }

    /// Shutdown with the configured `[processing].shutdown_timeout_secs`.
    pub async fn shutdown_default(&self) -> ShutdownReport {
        self.shutdown(self.processing.shutdown_timeout()).await
    }

    fn dispatch(self: &Arc<Self>, job_id: JobId) {
        let this = Arc::clone(self);
        self.tracker.spawn(async move {
            if let Err(e) = this.pipeline.run(&job_id, &this.cancel_jobs).await {
                warn!(job_id = %job_id, error = %e, "dispatched job did not complete");
            }
        });
    }
}
