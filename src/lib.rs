// src/lib.rs

pub mod action;
pub mod automation;
pub mod cli;
pub mod config;
pub mod engine;
pub mod errors;
pub mod jobs;
pub mod logging;
pub mod policy;
pub mod store;
pub mod types;

mod sync;

use std::sync::Arc;

use anyhow::Result;
use tracing::{debug, info, warn};

use crate::action::{ActionRegistry, StoreActionBackend};
use crate::automation::{Clock, StoreSignalSource, SystemClock};
use crate::cli::CliArgs;
use crate::config::loader::load_and_validate;
use crate::config::model::ConfigFile;
use crate::engine::{AutomationService, ManualCleanupOptions, ServiceDeps};
use crate::store::{open_document_store, MemoryRecordStore};

/// High-level entry point used by `main.rs`.
///
/// This wires together:
/// - config loading
/// - the record store (a JSON mailbox snapshot, or empty)
/// - policy and job persistence per `[storage]`
/// - the automation service
/// - Ctrl-C handling
pub async fn run(args: CliArgs) -> Result<()> {
    let cfg = load_and_validate(&args.config)?;

    if args.dry_run {
        print_dry_run(&cfg);
        return Ok(());
    }

    let records = Arc::new(match &args.records {
        Some(path) => MemoryRecordStore::load_json(path)?,
        None => MemoryRecordStore::new(),
    });

    let clock: Arc<dyn Clock> = Arc::new(SystemClock);
    let state_dir = &cfg.storage.state_dir;
    let deps = ServiceDeps {
        records: records.clone(),
        actions: ActionRegistry::with_backend_for_all(Arc::new(StoreActionBackend::new(
            records.clone(),
        ))),
        signals: Arc::new(StoreSignalSource::new(records.clone(), Arc::clone(&clock))),
        clock,
        policy_storage: open_document_store(cfg.storage.mode, state_dir, "policies"),
        job_storage: open_document_store(cfg.storage.mode, state_dir, "jobs"),
    };

    let service = AutomationService::new(cfg.automation.clone(), cfg.processing.clone(), deps)?;
    service.seed_policies(cfg.policies.clone())?;

    let outcome = if let Some(policy_id) = &args.trigger {
        run_manual(&service, policy_id, &args).await
    } else if args.once {
        run_once(&service).await
    } else {
        run_until_ctrl_c(&service).await
    };

    if let Some(path) = &args.records {
        records.save_json(path)?;
        debug!(?path, "mailbox snapshot written back");
    }
    outcome
}

async fn run_manual(service: &Arc<AutomationService>, policy_id: &str, args: &CliArgs) -> Result<()> {
    service.initialize()?;

    let options = ManualCleanupOptions {
        dry_run: args.preview,
        max_emails: args.max_emails,
        batch_size: args.batch_size,
        confirmed: args.confirm,
    };
    let job_id = service.trigger_manual_cleanup(policy_id, options).await?;
    let processed = service.process_cleanup_job(&job_id).await;

    // Print the full job either way so a failure still shows its details.
    let job = service.get_job(&job_id)?;
    println!("{}", serde_json::to_string_pretty(&job)?);

    service.shutdown_default().await;
    processed?;
    Ok(())
}

async fn run_once(service: &Arc<AutomationService>) -> Result<()> {
    service.initialize()?;

    let tick = service.run_scheduler_tick().await?;
    info!(?tick, "scheduler tick finished");

    let jobs = service.sample_signals().await?;
    info!(jobs = jobs.len(), "signal sample finished");

    let report = service.shutdown_default().await;
    if !report.drained {
        warn!(still_running = ?report.still_running, "shutdown timed out");
    }
    println!("{}", serde_json::to_string_pretty(&service.status())?);
    Ok(())
}

async fn run_until_ctrl_c(service: &Arc<AutomationService>) -> Result<()> {
    service.start()?;
    info!("running; press Ctrl-C to stop");

    tokio::signal::ctrl_c().await?;
    info!("Ctrl-C received");

    let report = service.shutdown_default().await;
    if !report.drained {
        warn!(still_running = ?report.still_running, "shutdown timed out");
    }
    Ok(())
}

/// Simple dry-run output: print the automation config and every policy.
fn print_dry_run(cfg: &ConfigFile) {
    let cc = &cfg.automation.continuous_cleanup;
    let et = &cfg.automation.event_triggers;

    println!("mailsweep dry-run");
    println!("  continuous_cleanup.enabled = {}", cc.enabled);
    println!(
        "  continuous_cleanup.target_emails_per_minute = {}",
        cc.target_emails_per_minute
    );
    println!(
        "  continuous_cleanup.max_concurrent_operations = {}",
        cc.max_concurrent_operations
    );
    if cc.pause_during_peak_hours {
        println!(
            "  continuous_cleanup.peak_hours = {}-{} (UTC{:+} min)",
            cc.peak_hours.start.format("%H:%M"),
            cc.peak_hours.end.format("%H:%M"),
            cc.peak_hours.utc_offset_minutes
        );
    }
    println!(
        "  event_triggers: storage={} performance={} volume={}",
        et.storage_threshold.enabled,
        et.performance_threshold.enabled,
        et.email_volume_threshold.enabled
    );
    println!(
        "  storage = {:?} ({})",
        cfg.storage.mode,
        cfg.storage.state_dir.display()
    );
    println!();

    let mut policies = cfg.policies.clone();
    policies.sort_by(|a, b| a.priority.cmp(&b.priority).then_with(|| a.id.cmp(&b.id)));

    println!("policies ({}):", policies.len());
    for policy in &policies {
        println!("  - {} (priority {})", policy.id, policy.priority);
        println!("      name: {}", policy.name);
        if !policy.enabled {
            println!("      enabled: false");
        }
        println!("      action: {}", policy.action.kind());
        println!("      criteria: {:?}", policy.criteria);
        let s = &policy.safety;
        println!(
            "      safety: max_emails_per_run={} preserve_important={} require_confirmation={} dry_run_first={}",
            s.max_emails_per_run, s.preserve_important, s.require_confirmation, s.dry_run_first
        );
    }

    debug!("dry-run complete (no execution)");
}
