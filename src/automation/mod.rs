// src/automation/mod.rs

//! Unattended triggering: the continuous cleanup loop and event thresholds.
//!
//! - [`clock`] abstracts wall-clock time.
//! - [`rate`] is the rolling per-minute dispatch window.
//! - [`scheduler`] decides what each continuous-cleanup tick may do.
//! - [`signals`] samples storage, performance and volume signals.
//! - [`triggers`] turns samples into edge-triggered threshold crossings.

pub mod clock;
pub mod rate;
pub mod scheduler;
pub mod signals;
pub mod triggers;

pub use clock::{Clock, ManualClock, SystemClock};
pub use rate::RateWindow;
pub use scheduler::{AutomationScheduler, TickPlan};
pub use signals::{SignalSample, SignalSource, StaticSignalSource, StoreSignalSource};
pub use triggers::{EventTriggerMonitor, FiredTrigger, ThresholdKind};
