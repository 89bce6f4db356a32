//! The external capability mechanism (spec §6): one dispatch surface for
//! every real-money service a host wires in, rather than a bespoke kernel
//! primitive per API. Distinct from [`kernel_vm::CapabilityManager`], which
//! gates whether a *principal* holds a named capability flag during
//! execution — this module is about *which external service* a call
//! reaches and how its spend is budgeted.

use std::collections::HashMap;

use kernel_core::KernelError;
use parking_lot::Mutex;
use serde_json::Value;

/// Static configuration for one named external capability.
#[derive(Debug, Clone)]
pub struct CapabilityConfig {
    pub enabled: bool,
    /// A reference to where the real secret lives (env var name, vault
    /// path); the kernel never holds the literal key.
    pub api_key_ref: Option<String>,
    pub budget_limit: f64,
    pub current_spend: f64,
}

impl CapabilityConfig {
    pub fn new(budget_limit: f64) -> Self {
        Self {
            enabled: true,
            api_key_ref: None,
            budget_limit,
            current_spend: 0.0,
        }
    }
}

#[derive(Debug, Clone)]
pub struct CapabilityResponse {
    pub success: bool,
    pub result: Option<Value>,
    pub error: Option<String>,
}

/// Executes one dispatched request against a named external capability.
pub trait CapabilityHandler: Send + Sync {
    fn handle(&self, request: Value) -> Result<Value, KernelError>;
}

/// The one mechanism for all real-money services, keyed by capability name.
#[derive(Default)]
pub struct ExternalCapabilityManager {
    configs: Mutex<HashMap<String, CapabilityConfig>>,
    handlers: HashMap<String, Box<dyn CapabilityHandler>>,
}

impl ExternalCapabilityManager {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(
        &mut self,
        name: impl Into<String>,
        config: CapabilityConfig,
        handler: Box<dyn CapabilityHandler>,
    ) {
        let name = name.into();
        self.configs.lock().insert(name.clone(), config);
        self.handlers.insert(name, handler);
    }

    /// Dispatches `request` to the handler registered under `name`, after
    /// confirming the capability is enabled. Callers that want to meter
    /// spend call [`Self::record_spend`] with the handler's reported cost.
    pub fn dispatch(&self, name: &str, request: Value) -> Result<CapabilityResponse, KernelError> {
        let enabled = self
            .configs
            .lock()
            .get(name)
            .map(|c| c.enabled)
            .unwrap_or(false);
        if !enabled {
            return Ok(CapabilityResponse {
                success: false,
                result: None,
                error: Some(format!("capability {name} is not enabled")),
            });
        }
        let Some(handler) = self.handlers.get(name) else {
            return Ok(CapabilityResponse {
                success: false,
                result: None,
                error: Some(format!("no handler registered for capability {name}")),
            });
        };
        match handler.handle(request) {
            Ok(result) => Ok(CapabilityResponse {
                success: true,
                result: Some(result),
                error: None,
            }),
            Err(err) => Ok(CapabilityResponse {
                success: false,
                result: None,
                error: Some(err.to_string()),
            }),
        }
    }

    /// Records `cost` against a capability's budget. Fails with
    /// `QuotaExceeded` if doing so would exceed `budget_limit`, leaving the
    /// recorded spend untouched.
    pub fn record_spend(&self, name: &str, cost: f64) -> Result<(), KernelError> {
        let mut configs = self.configs.lock();
        let Some(config) = configs.get_mut(name) else {
            return Err(KernelError::not_found(format!("capability {name}")));
        };
        if config.current_spend + cost > config.budget_limit {
            return Err(KernelError::QuotaExceeded {
                resource: name.to_string(),
                required: cost.to_string(),
                available: (config.budget_limit - config.current_spend).to_string(),
            });
        }
        config.current_spend += cost;
        Ok(())
    }

    pub fn current_spend(&self, name: &str) -> Option<f64> {
        self.configs.lock().get(name).map(|c| c.current_spend)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct EchoHandler;

    impl CapabilityHandler for EchoHandler {
        fn handle(&self, request: Value) -> Result<Value, KernelError> {
            Ok(request)
        }
    }

    #[test]
    fn disabled_capability_fails_without_invoking_handler() {
        let mut manager = ExternalCapabilityManager::new();
        let mut config = CapabilityConfig::new(100.0);
        config.enabled = false;
        manager.register("web_search", config, Box::new(EchoHandler));
        let response = manager.dispatch("web_search", Value::Null).unwrap();
        assert!(!response.success);
    }

    #[test]
    fn enabled_capability_dispatches_to_handler() {
        let mut manager = ExternalCapabilityManager::new();
        manager.register("web_search", CapabilityConfig::new(100.0), Box::new(EchoHandler));
        let response = manager
            .dispatch("web_search", Value::String("query".into()))
            .unwrap();
        assert!(response.success);
        assert_eq!(response.result, Some(Value::String("query".into())));
    }

    #[test]
    fn spend_beyond_budget_is_rejected() {
        let mut manager = ExternalCapabilityManager::new();
        manager.register("web_search", CapabilityConfig::new(10.0), Box::new(EchoHandler));
        manager.record_spend("web_search", 6.0).unwrap();
        let err = manager.record_spend("web_search", 5.0).unwrap_err();
        assert!(matches!(err, KernelError::QuotaExceeded { .. }));
        assert_eq!(manager.current_spend("web_search"), Some(6.0));
    }
}
