//! A short-lived cache of permission decisions, keyed so that any change to
//! the artifact being checked (or to the executable contract guarding it)
//! invalidates the entry automatically.

use std::time::{Duration, Instant};

use dashmap::DashMap;
use kernel_core::PermissionAction;

use crate::permission::PermissionResult;

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
struct CacheKey {
    target_id: String,
    action: PermissionAction,
    caller: String,
    /// The target artifact's `version` and, for executable contracts, the
    /// contract artifact's `version` concatenated in. Either one changing
    /// invalidates every cached decision that depended on it.
    version_fingerprint: String,
}

struct CacheEntry {
    result: PermissionResult,
    expires_at: Instant,
}

/// TTL cache for permission decisions. Default TTL is short — this exists
/// to absorb bursts of identical checks within a single logical tick, not
/// to serve stale decisions across artifact edits.
pub struct PermissionCache {
    entries: DashMap<CacheKey, CacheEntry>,
    ttl: Duration,
}

impl PermissionCache {
    pub fn new(ttl: Duration) -> Self {
        Self {
            entries: DashMap::new(),
            ttl,
        }
    }

    pub fn get(
        &self,
        target_id: &str,
        action: PermissionAction,
        caller: &str,
        version_fingerprint: &str,
    ) -> Option<PermissionResult> {
        let key = CacheKey {
            target_id: target_id.to_string(),
            action,
            caller: caller.to_string(),
            version_fingerprint: version_fingerprint.to_string(),
        };
        let entry = self.entries.get(&key)?;
        if Instant::now() >= entry.expires_at {
            drop(entry);
            self.entries.remove(&key);
            return None;
        }
        Some(entry.result.clone())
    }

    pub fn put(
        &self,
        target_id: &str,
        action: PermissionAction,
        caller: &str,
        version_fingerprint: &str,
        result: PermissionResult,
    ) {
        let key = CacheKey {
            target_id: target_id.to_string(),
            action,
            caller: caller.to_string(),
            version_fingerprint: version_fingerprint.to_string(),
        };
        self.entries.insert(
            key,
            CacheEntry {
                result,
                expires_at: Instant::now() + self.ttl,
            },
        );
    }

    /// Drops every entry for `target_id`, used when the target artifact is
    /// edited, deleted, or has its ownership transferred outside the normal
    /// version-bump path.
    pub fn invalidate(&self, target_id: &str) {
        self.entries.retain(|key, _| key.target_id != target_id);
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
