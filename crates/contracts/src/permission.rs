//! The decision type every contract returns.

use std::collections::HashMap;
use std::sync::Arc;

use kernel_ledger::Ledger;
use serde_json::Value;

/// Result of a permission check. Three separate concerns live here:
/// access control (`allowed`/`reason`), scrip economics (`scrip_*`), and
/// real-resource attribution (`resource_payer`).
#[derive(Debug, Clone, Default)]
pub struct PermissionResult {
    pub allowed: bool,
    pub reason: String,
    pub scrip_cost: u64,
    pub scrip_payer: Option<String>,
    pub scrip_recipient: Option<String>,
    pub resource_payer: Option<String>,
    pub state_updates: Option<HashMap<String, Value>>,
    pub conditions: Option<HashMap<String, Value>>,
}

impl PermissionResult {
    pub fn allow(reason: impl Into<String>) -> Self {
        Self {
            allowed: true,
            reason: reason.into(),
            ..Default::default()
        }
    }

    pub fn deny(reason: impl Into<String>) -> Self {
        Self {
            allowed: false,
            reason: reason.into(),
            ..Default::default()
        }
    }

    pub fn with_scrip_recipient(mut self, recipient: Option<String>) -> Self {
        self.scrip_recipient = recipient;
        self
    }

    pub fn with_condition(mut self, key: &str, value: Value) -> Self {
        self.conditions
            .get_or_insert_with(HashMap::new)
            .insert(key.to_string(), value);
        self
    }
}

/// A read-only view over the ledger, handed to contract code so it can
/// consult balances without being able to mutate funds. Holds an `Arc`
/// rather than a borrow so it can be moved into the `'static` closures the
/// sandbox registers as native functions.
#[derive(Clone)]
pub struct ReadOnlyLedger {
    ledger: Arc<Ledger>,
}

impl ReadOnlyLedger {
    pub fn new(ledger: Arc<Ledger>) -> Self {
        Self { ledger }
    }

    pub fn get_scrip(&self, principal_id: &str) -> i64 {
        self.ledger.get_scrip(principal_id)
    }

    pub fn can_afford_scrip(&self, principal_id: &str, amount: i64) -> bool {
        self.ledger.can_afford_scrip(principal_id, amount)
    }

    /// Converts the exact decimal balance to `f64` via a string round-trip
    /// rather than a lossy numeric cast, so the float-API surface never
    /// drifts from the ledger's exact value.
    pub fn get_resource(&self, principal_id: &str, resource: &str) -> f64 {
        self.ledger
            .get_resource(principal_id, resource)
            .to_string()
            .parse()
            .unwrap_or(0.0)
    }
}
