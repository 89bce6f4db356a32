//! The invocation registry: the observability record of every `invoke`
//! dispatched through the world, independent of the event log.

use chrono::{DateTime, Utc};
use parking_lot::Mutex;

/// One recorded invocation (spec.md §3.1 "Invocation record").
#[derive(Debug, Clone)]
pub struct InvocationRecord {
    pub event_number: u64,
    pub invoker: String,
    pub target: String,
    pub method: String,
    pub success: bool,
    pub duration_ms: f64,
    pub error_kind: Option<String>,
    pub timestamp: DateTime<Utc>,
}

/// Append-only log of invocations, bounded so a long-running world doesn't
/// grow this unboundedly; the oldest entries are dropped once the cap is
/// reached.
pub struct InvocationRegistry {
    records: Mutex<Vec<InvocationRecord>>,
    capacity: usize,
}

impl InvocationRegistry {
    pub fn new(capacity: usize) -> Self {
        Self {
            records: Mutex::new(Vec::new()),
            capacity,
        }
    }

    #[allow(clippy::too_many_arguments)]
    pub fn record(
        &self,
        event_number: u64,
        invoker: impl Into<String>,
        target: impl Into<String>,
        method: impl Into<String>,
        success: bool,
        duration_ms: f64,
        error_kind: Option<String>,
    ) {
        let mut records = self.records.lock();
        if records.len() >= self.capacity {
            records.remove(0);
        }
        records.push(InvocationRecord {
            event_number,
            invoker: invoker.into(),
            target: target.into(),
            method: method.into(),
            success,
            duration_ms,
            error_kind,
            timestamp: Utc::now(),
        });
    }

    pub fn recent(&self, n: usize) -> Vec<InvocationRecord> {
        let records = self.records.lock();
        let start = records.len().saturating_sub(n);
        records[start..].to_vec()
    }

    pub fn len(&self) -> usize {
        self.records.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl Default for InvocationRegistry {
    fn default() -> Self {
        Self::new(10_000)
    }
}
