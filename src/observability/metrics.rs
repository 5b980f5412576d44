//! Submission counters
//!
//! - Counters only, monotonic, reset only on process start
//! - Relaxed atomics; exact totals, no cross-counter consistency

use std::sync::atomic::{AtomicU64, Ordering};

use serde::Serialize;

/// Operational counters for the submission pipeline
#[derive(Debug, Default)]
pub struct SubmitMetrics {
    submissions_started: AtomicU64,
    submissions_completed: AtomicU64,
    submissions_short_circuited: AtomicU64,
    submissions_denied: AtomicU64,
    submissions_invalid: AtomicU64,
    submissions_failed: AtomicU64,
    entries_persisted: AtomicU64,
    pre_events_fired: AtomicU64,
    post_events_fired: AtomicU64,
}

/// Point-in-time copy of every counter
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct MetricsSnapshot {
    pub submissions_started: u64,
    pub submissions_completed: u64,
    pub submissions_short_circuited: u64,
    pub submissions_denied: u64,
    pub submissions_invalid: u64,
    pub submissions_failed: u64,
    pub entries_persisted: u64,
    pub pre_events_fired: u64,
    pub post_events_fired: u64,
}

impl SubmitMetrics {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn increment_started(&self) {
        self.submissions_started.fetch_add(1, Ordering::Relaxed);
    }

    pub fn increment_completed(&self) {
        self.submissions_completed.fetch_add(1, Ordering::Relaxed);
    }

    pub fn increment_short_circuited(&self) {
        self.submissions_short_circuited.fetch_add(1, Ordering::Relaxed);
    }

    pub fn increment_denied(&self) {
        self.submissions_denied.fetch_add(1, Ordering::Relaxed);
    }

    pub fn increment_invalid(&self) {
        self.submissions_invalid.fetch_add(1, Ordering::Relaxed);
    }

    /// Failures other than denial and validation
    pub fn increment_failed(&self) {
        self.submissions_failed.fetch_add(1, Ordering::Relaxed);
    }

    pub fn add_entries_persisted(&self, count: u64) {
        self.entries_persisted.fetch_add(count, Ordering::Relaxed);
    }

    pub fn increment_pre_events(&self) {
        self.pre_events_fired.fetch_add(1, Ordering::Relaxed);
    }

    pub fn increment_post_events(&self) {
        self.post_events_fired.fetch_add(1, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            submissions_started: self.submissions_started.load(Ordering::Relaxed),
            submissions_completed: self.submissions_completed.load(Ordering::Relaxed),
            submissions_short_circuited: self.submissions_short_circuited.load(Ordering::Relaxed),
            submissions_denied: self.submissions_denied.load(Ordering::Relaxed),
            submissions_invalid: self.submissions_invalid.load(Ordering::Relaxed),
            submissions_failed: self.submissions_failed.load(Ordering::Relaxed),
            entries_persisted: self.entries_persisted.load(Ordering::Relaxed),
            pre_events_fired: self.pre_events_fired.load(Ordering::Relaxed),
            post_events_fired: self.post_events_fired.load(Ordering::Relaxed),
        }
    }
}
