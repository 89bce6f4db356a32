//! The universal artifact record.

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// A single artifact: data, code, an agent, a contract, a genesis proxy —
/// everything in the world is one of these, distinguished only by `kind`
/// and which optional fields are populated.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Artifact {
    pub id: String,
    pub kind: String,
    pub content: String,

    /// Informational only — never used for authorization.
    pub created_by: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,

    pub executable: bool,
    pub code: String,
    pub price: u64,
    pub access_contract_id: Option<String>,

    /// Authorization-relevant fields (`writer`, `principal`, custom).
    pub state: HashMap<String, Value>,
    /// Non-authorization annotations. Reserved keys are rejected on update.
    pub metadata: HashMap<String, Value>,

    pub capabilities: Vec<String>,
    pub has_standing: bool,
    pub has_loop: bool,

    pub deleted: bool,
    pub deleted_at: Option<DateTime<Utc>>,
    pub deleted_by: Option<String>,

    pub kernel_protected: bool,

    /// Optional dispatch table for kernel-provided genesis proxies. Holds
    /// the supported method names; actual dispatch logic lives with the
    /// host's genesis catalog, out of scope for this crate.
    pub genesis_methods: Option<Vec<String>>,

    /// Bumped whenever `code` changes on an executable artifact. Used as
    /// a contract-cache key component.
    pub version: String,

    /// Top-level entry points the sandbox validator found in `code`
    /// (`run`, `handle_request`, `check_permission`, `describe`, ...).
    /// Populated by the `CodeValidator` at write time; empty for
    /// non-executable artifacts.
    pub entry_points: Vec<String>,
}

impl Artifact {
    pub fn is_live(&self) -> bool {
        !self.deleted
    }

    pub fn state_field(&self, key: &str) -> Option<&Value> {
        self.state.get(key)
    }

    /// Merges `updates` into `state` field-wise: new keys added, existing
    /// keys overwritten, unrelated keys preserved.
    pub fn merge_state(&mut self, updates: HashMap<String, Value>) {
        for (key, value) in updates {
            self.state.insert(key, value);
        }
    }

    /// `true` for artifacts that define a top-level `handle_request` entry
    /// point rather than (or in addition to) `run` — used by the
    /// permission checker's gatekeeper-skip rule.
    pub fn defines_handle_request(&self) -> bool {
        self.entry_points.iter().any(|e| e == "handle_request")
    }

    pub fn defines_check_permission(&self) -> bool {
        self.entry_points.iter().any(|e| e == "check_permission")
    }
}
