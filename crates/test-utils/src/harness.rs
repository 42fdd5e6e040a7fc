#![allow(dead_code)]

use std::sync::Arc;

use mailsweep::action::{ActionBackend, ActionRegistry, StoreActionBackend};
use mailsweep::automation::{Clock, ManualClock, SignalSample, StaticSignalSource};
use mailsweep::config::{AutomationConfig, ProcessingSection};
use mailsweep::engine::{AutomationService, ServiceDeps};
use mailsweep::errors::Result;
use mailsweep::jobs::Job;
use mailsweep::policy::{NewPolicy, Policy};
use mailsweep::store::{DocumentStore, EmailRecord, MemoryDocumentStore, MemoryRecordStore};

use crate::fake_backend::RecordingBackend;
use crate::test_now;

/// A fully wired service over in-memory stores, a manual clock, a static
/// signal source and a recording backend that really applies actions to the
/// record store.
pub struct TestHarness {
    pub clock: Arc<ManualClock>,
    pub records: Arc<MemoryRecordStore>,
    pub backend: Arc<RecordingBackend>,
    pub signals: Arc<StaticSignalSource>,
    pub service: Arc<AutomationService>,
}

impl TestHarness {
    pub fn builder() -> HarnessBuilder {
        HarnessBuilder::new()
    }

    /// Feed the next signal reading.
    pub fn set_signals(&self, sample: SignalSample) {
        self.signals.set(sample);
    }

    pub fn record(&self, id: &str) -> Option<EmailRecord> {
        self.records.get(id)
    }
}

pub struct HarnessBuilder {
    automation: AutomationConfig,
    processing: ProcessingSection,
    records: Vec<EmailRecord>,
    policies: Vec<NewPolicy>,
    policy_storage: Option<Box<dyn DocumentStore<Policy>>>,
    job_storage: Option<Box<dyn DocumentStore<Job>>>,
    clock: Option<Arc<ManualClock>>,
}

impl HarnessBuilder {
    pub fn new() -> Self {
        Self {
            automation: AutomationConfig::default(),
            processing: ProcessingSection {
                retry_backoff_ms: 1,
                shutdown_timeout_secs: 5,
                ..ProcessingSection::default()
            },
            records: Vec::new(),
            policies: Vec::new(),
            policy_storage: None,
            job_storage: None,
            clock: None,
        }
    }

    pub fn config(mut self, automation: AutomationConfig) -> Self {
        self.automation = automation;
        self
    }

    pub fn processing(mut self, processing: ProcessingSection) -> Self {
        self.processing = processing;
        self
    }

    pub fn batch_size(mut self, n: usize) -> Self {
        self.processing.default_batch_size = n;
        self
    }

    pub fn records(mut self, records: impl IntoIterator<Item = EmailRecord>) -> Self {
        self.records.extend(records);
        self
    }

    pub fn policy(mut self, policy: NewPolicy) -> Self {
        self.policies.push(policy);
        self
    }

    pub fn policy_storage(mut self, storage: Box<dyn DocumentStore<Policy>>) -> Self {
        self.policy_storage = Some(storage);
        self
    }

    pub fn job_storage(mut self, storage: Box<dyn DocumentStore<Job>>) -> Self {
        self.job_storage = Some(storage);
        self
    }

    pub fn clock(mut self, clock: Arc<ManualClock>) -> Self {
        self.clock = Some(clock);
        self
    }

    pub fn build(self) -> Result<TestHarness> {
        let clock = self
            .clock
            .unwrap_or_else(|| Arc::new(ManualClock::new(test_now())));
        let records = Arc::new(MemoryRecordStore::with_records(self.records));
        let store_backend: Arc<dyn ActionBackend> =
            Arc::new(StoreActionBackend::new(records.clone()));
        let backend = Arc::new(RecordingBackend::wrapping(store_backend));
        let signals = Arc::new(StaticSignalSource::default());

        let deps = ServiceDeps {
            records: records.clone(),
            actions: ActionRegistry::with_backend_for_all(backend.clone()),
            signals: signals.clone(),
            clock: clock.clone() as Arc<dyn Clock>,
            policy_storage: self
                .policy_storage
                .unwrap_or_else(|| Box::new(MemoryDocumentStore::<Policy>::new())),
            job_storage: self
                .job_storage
                .unwrap_or_else(|| Box::new(MemoryDocumentStore::<Job>::new())),
        };

        let service = AutomationService::new(self.automation, self.processing, deps)?;
        for policy in self.policies {
            service.engine().create_policy(policy)?;
        }

        Ok(TestHarness {
            clock,
            records,
            backend,
            signals,
            service,
        })
    }
}

impl Default for HarnessBuilder {
    fn default() -> Self {
        Self::new()
    }
}
