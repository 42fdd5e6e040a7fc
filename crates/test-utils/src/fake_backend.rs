use std::collections::HashSet;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use mailsweep::action::{ActionBackend, ActionOptions, ActionOutcome, RecordError};
use mailsweep::errors::{Result, SweepError};
use mailsweep::policy::ActionKind;
use mailsweep::types::BoxFuture;

/// One call the processor made.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecordedCall {
    pub kind: ActionKind,
    pub record_ids: Vec<String>,
    pub options: ActionOptions,
}

#[derive(Default)]
struct Faults {
    /// Fail this many upcoming calls outright.
    fail_next: usize,
    fail_always: bool,
    /// Report these ids as per-record errors.
    bad_records: HashSet<String>,
    delay: Option<Duration>,
}

/// A fake action backend that:
/// - records every call
/// - can fail whole calls or single records on demand
/// - forwards the remaining records to an inner backend, if one is given.
pub struct RecordingBackend {
    inner: Option<Arc<dyn ActionBackend>>,
    calls: Mutex<Vec<RecordedCall>>,
    faults: Mutex<Faults>,
}

impl RecordingBackend {
    /// Records calls and reports every record as affected.
    pub fn new() -> Self {
        Self {
            inner: None,
            calls: Mutex::new(Vec::new()),
            faults: Mutex::new(Faults::default()),
        }
    }

    /// Records calls, then applies them through `inner`.
    pub fn wrapping(inner: Arc<dyn ActionBackend>) -> Self {
        Self {
            inner: Some(inner),
            ..Self::new()
        }
    }

    pub fn calls(&self) -> Vec<RecordedCall> {
        self.calls.lock().unwrap().clone()
    }

    pub fn call_count(&self) -> usize {
        self.calls.lock().unwrap().len()
    }

    /// Every record id passed to the backend, in call order.
    pub fn touched_ids(&self) -> Vec<String> {
        self.calls()
            .into_iter()
            .flat_map(|c| c.record_ids)
            .collect()
    }

    pub fn fail_next_calls(&self, n: usize) {
        self.faults.lock().unwrap().fail_next = n;
    }

    pub fn fail_always(&self, on: bool) {
        self.faults.lock().unwrap().fail_always = on;
    }

    pub fn fail_records(&self, ids: &[&str]) {
        let mut faults = self.faults.lock().unwrap();
        faults.bad_records = ids.iter().map(|s| s.to_string()).collect();
    }

    pub fn set_delay(&self, delay: Duration) {
        self.faults.lock().unwrap().delay = Some(delay);
    }
}

impl Default for RecordingBackend {
    fn default() -> Self {
        Self::new()
    }
}

impl ActionBackend for RecordingBackend {
    fn execute(
        &self,
        kind: ActionKind,
        record_ids: Vec<String>,
        options: ActionOptions,
    ) -> BoxFuture<'_, Result<ActionOutcome>> {
        self.calls.lock().unwrap().push(RecordedCall {
            kind,
            record_ids: record_ids.clone(),
            options: options.clone(),
        });

        let (fail, bad, delay) = {
            let mut faults = self.faults.lock().unwrap();
            let fail = if faults.fail_always {
                true
            } else if faults.fail_next > 0 {
                faults.fail_next -= 1;
                true
            } else {
                false
            };
            (fail, faults.bad_records.clone(), faults.delay)
        };

        Box::pin(async move {
            if let Some(d) = delay {
                tokio::time::sleep(d).await;
            }
            if fail {
                return Err(SweepError::BackendError("injected backend failure".to_string()));
            }

            let (bad_ids, good_ids): (Vec<String>, Vec<String>) =
                record_ids.into_iter().partition(|id| bad.contains(id));
            let mut errors: Vec<RecordError> = bad_ids
                .into_iter()
                .map(|record_id| RecordError {
                    record_id,
                    message: "injected record failure".to_string(),
                })
                .collect();

            let affected_count = match &self.inner {
                Some(inner) => {
                    let outcome = inner.execute(kind, good_ids, options).await?;
                    errors.extend(outcome.errors);
                    outcome.affected_count
                }
                None => good_ids.len(),
            };

            Ok(ActionOutcome {
                success: errors.is_empty(),
                affected_count,
                errors,
            })
        })
    }
}
