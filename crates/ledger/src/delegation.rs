//! Charge delegation: a pre-authorization by principal A that principal B
//! may cause A to be debited, within per-call and per-window caps.

use std::collections::HashMap;
use std::time::{Duration, Instant};

use parking_lot::Mutex;

/// A grant by `grantor` letting `grantee` charge scrip/resources back to
/// `grantor`, bounded per call and per rolling window.
#[derive(Debug, Clone)]
pub struct DelegationGrant {
    pub grantor: String,
    pub grantee: String,
    pub max_per_call: u64,
    pub max_per_window: u64,
    pub window: Duration,
}

#[derive(Debug)]
struct GrantState {
    grant: DelegationGrant,
    spent_in_window: Vec<(Instant, u64)>,
}

impl GrantState {
    fn window_spend(&mut self, now: Instant) -> u64 {
        self.spent_in_window
            .retain(|(ts, _)| now.duration_since(*ts) <= self.grant.window);
        self.spent_in_window.iter().map(|(_, amt)| *amt).sum()
    }
}

/// Registry of outstanding delegation grants, keyed by `(grantor, grantee)`.
#[derive(Debug, Default)]
pub struct DelegationRegistry {
    grants: Mutex<HashMap<(String, String), GrantState>>,
}

impl DelegationRegistry {
    pub fn new() -> Self {
        Self {
            grants: Mutex::new(HashMap::new()),
        }
    }

    pub fn grant(&self, grant: DelegationGrant) {
        let key = (grant.grantor.clone(), grant.grantee.clone());
        self.grants.lock().insert(
            key,
            GrantState {
                grant,
                spent_in_window: Vec::new(),
            },
        );
    }

    pub fn revoke(&self, grantor: &str, grantee: &str) {
        self.grants
            .lock()
            .remove(&(grantor.to_string(), grantee.to_string()));
    }

    /// Checks and records `amount` against the grant from `grantor` to
    /// `grantee`. Returns `true` iff the call is within both the per-call
    /// and per-window caps, recording the spend on success.
    pub fn try_charge(&self, grantor: &str, grantee: &str, amount: u64) -> bool {
        let key = (grantor.to_string(), grantee.to_string());
        let mut grants = self.grants.lock();
        let Some(state) = grants.get_mut(&key) else {
            return false;
        };
        if amount > state.grant.max_per_call {
            return false;
        }
        let now = Instant::now();
        let spent = state.window_spend(now);
        if spent + amount > state.grant.max_per_window {
            return false;
        }
        state.spent_in_window.push((now, amount));
        true
    }
}
