// src/config/mod.rs

//! Configuration loading and validation for mailsweep.
//!
//! Responsibilities:
//! - Define the TOML-backed data model (`model.rs`).
//! - Load a config file from disk (`loader.rs`).
//! - Validate everything before it is used (`validate.rs`).
//! - Hold the live, hot-swappable automation config (`handle.rs`).

pub mod handle;
pub mod loader;
pub mod model;
pub mod validate;

pub use handle::{ConfigHandle, ConfigSnapshot};
pub use loader::{default_config_path, load_and_validate, load_from_path};
pub use model::{
    AutomationConfig, ConfigFile, ContinuousCleanupConfig, EventTriggersConfig, PeakHours,
    PerformanceThreshold, ProcessingSection, RawAutomationConfig, RawConfigFile,
    RawContinuousCleanup, RawPeakHours, StorageSection, StorageThreshold, VolumeThreshold,
};
