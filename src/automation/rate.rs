// src/automation/rate.rs

use std::collections::VecDeque;

use chrono::{DateTime, Duration, Utc};

/// Rolling window of dispatched email counts.
///
/// Each entry is `(when, emails)`; entries older than the window are dropped
/// lazily whenever the window is read.
#[derive(Debug, Clone)]
pub struct RateWindow {
    span: Duration,
    entries: VecDeque<(DateTime<Utc>, usize)>,
}

impl Default for RateWindow {
    fn default() -> Self {
        Self::per_minute()
    }
}

impl RateWindow {
    pub fn new(span: Duration) -> Self {
        Self {
            span,
            entries: VecDeque::new(),
        }
    }

    pub fn per_minute() -> Self {
        Self::new(Duration::seconds(60))
    }

    /// Record `emails` dispatched at `at`. Zero-sized dispatches are ignored.
    ///
    /// Entries are kept in timestamp order even if `at` is earlier than the
    /// latest entry (as happens when rebuilding from stored jobs).
    pub fn record(&mut self, at: DateTime<Utc>, emails: usize) {
        if emails == 0 {
            return;
        }
        let pos = self.entries.partition_point(|(t, _)| *t <= at);
        self.entries.insert(pos, (at, emails));
    }

    /// Emails dispatched within the window ending at `now`.
    pub fn used(&mut self, now: DateTime<Utc>) -> usize {
        self.prune(now);
        self.entries.iter().map(|(_, n)| n).sum()
    }

    /// What is left of `limit` for the window ending at `now`.
    pub fn remaining(&mut self, now: DateTime<Utc>, limit: usize) -> usize {
        limit.saturating_sub(self.used(now))
    }

    pub fn clear(&mut self) {
        self.entries.clear();
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    fn prune(&mut self, now: DateTime<Utc>) {
        let cutoff = now - self.span;
        while let Some((at, _)) = self.entries.front() {
            if *at > cutoff {
                break;
            }
            self.entries.pop_front();
        }
    }
}

