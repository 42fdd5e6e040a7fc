// src/action/registry.rs

use std::collections::BTreeMap;
use std::sync::Arc;

use crate::action::backend::ActionBackend;
use crate::errors::{Result, SweepError};
use crate::policy::ActionKind;

/// Maps each action variant to the backend that performs it.
///
/// New action kinds are added here, not in the policy engine or processor.
#[derive(Default, Clone)]
pub struct ActionRegistry {
    handlers: BTreeMap<ActionKind, Arc<dyn ActionBackend>>,
}

impl std::fmt::Debug for ActionRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ActionRegistry")
            .field("kinds", &self.handlers.keys().collect::<Vec<_>>())
            .finish()
    }
}

impl ActionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register one backend for every known action kind.
    pub fn with_backend_for_all(backend: Arc<dyn ActionBackend>) -> Self {
        let mut registry = Self::new();
        registry.register(ActionKind::Delete, Arc::clone(&backend));
        registry.register(ActionKind::Archive, backend);
        registry
    }

    pub fn register(&mut self, kind: ActionKind, backend: Arc<dyn ActionBackend>) {
        self.handlers.insert(kind, backend);
    }

    pub fn handler(&self, kind: ActionKind) -> Result<Arc<dyn ActionBackend>> {
        self.handlers.get(&kind).cloned().ok_or_else(|| {
            SweepError::BackendError(format!("no backend registered for action '{kind}'"))
        })
    }
}
