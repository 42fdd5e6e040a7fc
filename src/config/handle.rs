// src/config/handle.rs

use std::sync::Arc;

use arc_swap::ArcSwap;
use tracing::info;

use crate::config::model::AutomationConfig;

/// One immutable, versioned view of the automation config.
#[derive(Debug, Clone, PartialEq)]
pub struct ConfigSnapshot {
    pub version: u64,
    pub config: AutomationConfig,
}

/// Process-wide automation config, replaced wholesale.
///
/// Readers call [`ConfigHandle::current`] once per decision and keep the
/// returned `Arc` for the whole decision; a concurrent replace never changes
/// what they already hold.
#[derive(Debug)]
pub struct ConfigHandle {
    inner: ArcSwap<ConfigSnapshot>,
}

impl ConfigHandle {
    pub fn new(config: AutomationConfig) -> Self {
        Self {
            inner: ArcSwap::from_pointee(ConfigSnapshot { version: 1, config }),
        }
    }

    pub fn current(&self) -> Arc<ConfigSnapshot> {
        self.inner.load_full()
    }

    /// Swap in an already validated config. Returns the new version.
    pub fn replace(&self, config: AutomationConfig) -> u64 {
        let previous = self.inner.rcu(|cur| ConfigSnapshot {
            version: cur.version + 1,
            config: config.clone(),
        });
        let version = previous.version + 1;
        info!(version, "automation config replaced");
        version
    }
}
