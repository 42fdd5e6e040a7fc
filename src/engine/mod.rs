// src/engine/mod.rs

//! Orchestration engine for mailsweep.
//!
//! This module ties together:
//! - record claims shared by concurrently active jobs ([`claims`])
//! - the single evaluate -> enqueue -> process path every trigger uses
//!   ([`pipeline`])
//! - the long-running service that owns the live config, the scheduler and
//!   event loops, and graceful shutdown ([`runtime`])

pub mod claims;
pub mod pipeline;
pub mod runtime;

pub use claims::ClaimRegistry;
pub use pipeline::{CleanupPipeline, CleanupRequest, Submitted};
pub use runtime::{
    AutomationService, ManualCleanupOptions, ServiceDeps, ServiceStatus, ShutdownReport,
    TickOutcome,
};
