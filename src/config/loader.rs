// src/config/loader.rs

use std::fs;
use std::path::{Path, PathBuf};

use tracing::debug;

use crate::config::model::{ConfigFile, RawConfigFile};
use crate::errors::Result;

/// Load a configuration file from a given path and return the raw
/// `RawConfigFile`.
///
/// This only performs TOML deserialization (unknown keys are rejected here);
/// semantic validation is left to [`load_and_validate`].
pub fn load_from_path(path: impl AsRef<Path>) -> Result<RawConfigFile> {
    let path = path.as_ref();
    let contents = fs::read_to_string(path)?;

    let config: RawConfigFile = toml::from_str(&contents)?;
    debug!(?path, policies = config.policy.len(), "config file parsed");

    Ok(config)
}

/// Load a configuration file from path and validate it.
///
/// - Reads TOML.
/// - Applies defaults (handled by `serde` default functions).
/// - Checks rates, peak hours, threshold ranges, every `[policy.<id>]` block
///   and every policy id a trigger block refers to.
///
/// Any failure rejects the whole file.
pub fn load_and_validate(path: impl AsRef<Path>) -> Result<ConfigFile> {
    let raw_config = load_from_path(&path)?;
    let config = ConfigFile::try_from(raw_config)?;
    Ok(config)
}

/// `Mailsweep.toml` in the current working directory.
pub fn default_config_path() -> PathBuf {
    PathBuf::from("Mailsweep.toml")
}
