//! The minimal context assembled for every permission check.

use std::collections::HashMap;

use serde_json::Value;

#[derive(Debug, Clone)]
pub struct PermissionContext {
    /// The authoritative auth fields (`writer`, `principal`, custom).
    state: HashMap<String, Value>,
    /// Non-authorization annotations.
    metadata: HashMap<String, Value>,
    /// Informational only — contracts may read it but must never use it
    /// for authorization decisions.
    pub target_created_by: String,
    /// Present for `invoke` only.
    pub method: Option<String>,
    pub args: Option<Vec<Value>>,
}

impl PermissionContext {
    pub fn new(
        state: HashMap<String, Value>,
        metadata: HashMap<String, Value>,
        target_created_by: String,
    ) -> Self {
        Self {
            state,
            metadata,
            target_created_by,
            method: None,
            args: None,
        }
    }

    pub fn with_invoke(mut self, method: impl Into<String>, args: Vec<Value>) -> Self {
        self.method = Some(method.into());
        self.args = Some(args);
        self
    }

    pub fn state_field(&self, key: &str) -> Option<&Value> {
        self.state.get(key)
    }

    pub fn metadata_field(&self, key: &str) -> Option<&Value> {
        self.metadata.get(key)
    }

    pub fn state(&self) -> &HashMap<String, Value> {
        &self.state
    }

    pub fn metadata(&self) -> &HashMap<String, Value> {
        &self.metadata
    }
}
