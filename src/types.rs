use std::fmt;
use std::future::Future;
use std::pin::Pin;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// Boxed, sendable future used at the async trait seams (record store,
/// action backend, signal sources).
pub type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

/// Importance level of a mail record.
///
/// The declaration order is the ordinal order used by `importance_level_max`
/// comparisons: `Low < Medium < High`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Importance {
    Low,
    Medium,
    High,
}

impl Default for Importance {
    fn default() -> Self {
        Importance::Medium
    }
}

impl fmt::Display for Importance {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Importance::Low => "low",
            Importance::Medium => "medium",
            Importance::High => "high",
        };
        f.write_str(s)
    }
}

impl FromStr for Importance {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "low" => Ok(Importance::Low),
            "medium" => Ok(Importance::Medium),
            "high" => Ok(Importance::High),
            other => Err(format!(
                "invalid importance level: {other} (expected \"low\", \"medium\" or \"high\")"
            )),
        }
    }
}

/// Where policies and jobs are persisted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StorageMode {
    /// JSON documents under `[storage].state_dir`.
    File,
    /// In memory only (lost on restart).
    Memory,
}

impl Default for StorageMode {
    fn default() -> Self {
        StorageMode::Memory
    }
}
