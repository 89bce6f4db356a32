//! World configuration, TOML-loadable, mirroring the corpus's dedicated
//! config-crate pattern (a serde-derived struct with sane defaults rather
//! than scattering tunables across call sites).

use std::path::Path;
use std::time::Duration;

use kernel_core::constants::{DEFAULT_MAX_CONTRACT_DEPTH, DEFAULT_MAX_INVOKE_DEPTH};
use kernel_core::KernelError;
use serde::{Deserialize, Serialize};

/// Tunables the core leaves to the host. Every field has a default so a
/// host can load a partial TOML document and still get a valid config.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct WorldConfig {
    pub max_invoke_depth: u32,
    pub max_contract_depth: u32,
    /// Kernel contract id used when an `access_contract_id` is dangling.
    pub dangling_fallback_contract: String,
    pub contract_timeout_ms: u64,
    pub contract_timeout_llm_ms: u64,
    pub executor_timeout_ms: u64,
    pub executor_timeout_llm_ms: u64,
    /// Minimum price paid at auction when only one submission is present.
    pub mint_minimum_bid: i64,
    /// Divisor applied to a winning artifact's score to compute minted scrip.
    pub mint_ratio: u64,
    pub ubi_enabled: bool,
    /// Cap on the invocation registry's retained history.
    pub invocation_registry_capacity: usize,
}

impl Default for WorldConfig {
    fn default() -> Self {
        Self {
            max_invoke_depth: DEFAULT_MAX_INVOKE_DEPTH,
            max_contract_depth: DEFAULT_MAX_CONTRACT_DEPTH,
            dangling_fallback_contract: kernel_core::constants::DEFAULT_DANGLING_FALLBACK.to_string(),
            contract_timeout_ms: 500,
            contract_timeout_llm_ms: 30_000,
            executor_timeout_ms: 500,
            executor_timeout_llm_ms: 30_000,
            mint_minimum_bid: 1,
            mint_ratio: 10,
            ubi_enabled: true,
            invocation_registry_capacity: 10_000,
        }
    }
}

impl WorldConfig {
    pub fn from_toml_str(source: &str) -> Result<Self, KernelError> {
        toml::from_str(source).map_err(|e| KernelError::invalid_argument(e.to_string()))
    }

    pub fn load(path: impl AsRef<Path>) -> Result<Self, KernelError> {
        let contents = std::fs::read_to_string(path)
            .map_err(|e| KernelError::invalid_argument(e.to_string()))?;
        Self::from_toml_str(&contents)
    }

    pub fn contract_timeout(&self) -> Duration {
        Duration::from_millis(self.contract_timeout_ms)
    }

    pub fn executor_timeout(&self) -> Duration {
        Duration::from_millis(self.executor_timeout_ms)
    }
}
