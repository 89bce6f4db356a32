//! Per-resource administrator quotas: a hard ceiling on a principal's
//! cumulative consumption of a resource, distinct from `kernel-ledger`'s
//! self-refilling rolling-window rate tracker. A quota is set once by the
//! host and only ever consumed down; nothing refills it automatically.

use std::collections::HashMap;

use parking_lot::Mutex;

#[derive(Debug, Default)]
struct QuotaState {
    limits: HashMap<(String, String), f64>,
    usage: HashMap<(String, String), f64>,
}

/// Tracks `(principal, resource) -> (limit, usage)` pairs.
#[derive(Debug, Default)]
pub struct QuotaTracker {
    state: Mutex<QuotaState>,
}

impl QuotaTracker {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_quota(&self, principal_id: &str, resource: &str, amount: f64) {
        let key = (principal_id.to_string(), resource.to_string());
        self.state.lock().limits.insert(key, amount.max(0.0));
    }

    pub fn get_quota(&self, principal_id: &str, resource: &str) -> f64 {
        let key = (principal_id.to_string(), resource.to_string());
        self.state.lock().limits.get(&key).copied().unwrap_or(0.0)
    }

    pub fn get_usage(&self, principal_id: &str, resource: &str) -> f64 {
        let key = (principal_id.to_string(), resource.to_string());
        self.state.lock().usage.get(&key).copied().unwrap_or(0.0)
    }

    /// Records `amount` of usage against the quota, iff doing so would not
    /// push cumulative usage past the configured limit. A principal with no
    /// quota configured has limit zero, so any positive consumption fails.
    pub fn consume(&self, principal_id: &str, resource: &str, amount: f64) -> bool {
        let key = (principal_id.to_string(), resource.to_string());
        let mut state = self.state.lock();
        let limit = state.limits.get(&key).copied().unwrap_or(0.0);
        let used = state.usage.get(&key).copied().unwrap_or(0.0);
        if used + amount > limit {
            return false;
        }
        state.usage.insert(key, used + amount);
        true
    }

    pub fn available_capacity(&self, principal_id: &str, resource: &str) -> f64 {
        let quota = self.get_quota(principal_id, resource);
        let usage = self.get_usage(principal_id, resource);
        (quota - usage).max(0.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn consume_respects_configured_limit() {
        let tracker = QuotaTracker::new();
        tracker.set_quota("alice", "disk_bytes", 100.0);
        assert!(tracker.consume("alice", "disk_bytes", 60.0));
        assert!(tracker.consume("alice", "disk_bytes", 40.0));
        assert!(!tracker.consume("alice", "disk_bytes", 1.0));
        assert_eq!(tracker.available_capacity("alice", "disk_bytes"), 0.0);
    }

    #[test]
    fn unconfigured_quota_denies_any_consumption() {
        let tracker = QuotaTracker::new();
        assert!(!tracker.consume("bob", "disk_bytes", 1.0));
        assert_eq!(tracker.get_quota("bob", "disk_bytes"), 0.0);
    }
}
