//! Failure diagnostics.
//!
//! Process-wide counter over every validation or dispatch failure. Never
//! reset during a session and never consulted for control flow.

use std::sync::{
    atomic::{AtomicU64, Ordering},
    Mutex,
};

use chrono::{DateTime, Utc};
use tracing::debug;

#[derive(Debug, Clone, PartialEq)]
pub struct FailureRecord {
    pub at: DateTime<Utc>,
    pub reason: String,
}

#[derive(Debug, Clone, Default)]
pub struct FailureSnapshot {
    pub count: u64,
    pub last: Option<FailureRecord>,
}

#[derive(Default)]
pub struct FailureStat {
    count: AtomicU64,
    last: Mutex<Option<FailureRecord>>,
}

impl FailureStat {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record(&self, reason: &str) {
        let count = self.count.fetch_add(1, Ordering::SeqCst) + 1;
        debug!(count, reason, "pipeline failure recorded");
        let mut last = self.last.lock().unwrap_or_else(|e| e.into_inner());
        *last = Some(FailureRecord {
            at: Utc::now(),
            reason: reason.to_string(),
        });
    }

    pub fn count(&self) -> u64 {
        self.count.load(Ordering::SeqCst)
    }

    pub fn snapshot(&self) -> FailureSnapshot {
        FailureSnapshot {
            count: self.count(),
            last: self
                .last
                .lock()
                .unwrap_or_else(|e| e.into_inner())
                .clone(),
        }
    }
}
