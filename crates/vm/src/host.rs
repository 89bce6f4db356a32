//! The seam between a running artifact's code and the rest of the kernel.
//!
//! `kernel-vm` executes artifact code but has no notion of how artifacts
//! are authorized, invoked recursively, or billed — that orchestration
//! lives in the host crate (`kernel-world`). An [`ExecutionHost`]
//! implementation is handed to the executor so injected syscalls can reach
//! back out without `kernel-vm` depending on its own caller.

use async_trait::async_trait;
use kernel_core::KernelError;
use serde_json::Value;

/// Callbacks an executing artifact's code can reach through the injected
/// `invoke`, `read_artifact`, `kernel_query`, `pay`, `get_balance`, and
/// `syscall_llm` functions.
#[async_trait]
pub trait ExecutionHost: Send + Sync {
    /// Performs a full permission-checked read of another artifact.
    async fn read_artifact(&self, caller: &str, target_id: &str) -> Result<Value, KernelError>;

    /// Performs a full permission-checked, depth-bounded invocation of
    /// another artifact's `handle_request`/`run` entry point. `depth` is
    /// the current recursion depth as seen by the caller, incremented by
    /// the host before the nested execution begins.
    async fn invoke(
        &self,
        caller: &str,
        target_id: &str,
        method: &str,
        args: Vec<Value>,
        depth: u32,
    ) -> Result<Value, KernelError>;

    /// Read-only introspection queries that don't go through the contract
    /// system (e.g. `exists`, `list_by_creator`).
    async fn kernel_query(&self, caller: &str, query: &str, args: Vec<Value>) -> Result<Value, KernelError>;

    /// Scrip transfer initiated from within running code.
    async fn pay(&self, payer: &str, recipient: &str, amount: i64) -> Result<(), KernelError>;

    fn get_scrip_balance(&self, principal_id: &str) -> i64;

    fn get_resource_balance(&self, principal_id: &str, resource: &str) -> f64;

    /// Whether `principal_id` currently holds the `can_call_llm` capability.
    fn can_call_llm(&self, principal_id: &str) -> bool;

    /// Routes a prompt to the configured [`LlmProvider`], metering the
    /// caller's llm budget. Fails with `NotAuthorized` if the capability
    /// check above would have failed.
    async fn syscall_llm(&self, caller: &str, prompt: String) -> Result<String, KernelError>;
}

/// Abstraction over whatever backs `syscall_llm` — a real provider in
/// production, a canned-response stub in tests.
#[async_trait]
pub trait LlmProvider: Send + Sync {
    async fn complete(&self, prompt: &str) -> Result<String, KernelError>;
}

/// A provider that always returns a fixed string, for hosts and tests that
/// don't want to wire up a real completion backend.
pub struct EchoLlmProvider;

#[async_trait]
impl LlmProvider for EchoLlmProvider {
    async fn complete(&self, prompt: &str) -> Result<String, KernelError> {
        Ok(format!("echo: {prompt}"))
    }
}

/// Tracks which capability-gated syscalls a principal may use, and any
/// per-resource quotas layered on top of the ledger's own balances.
pub trait CapabilityManager: Send + Sync {
    fn has_capability(&self, principal_id: &str, capability: &str) -> bool;

    /// `None` means no quota is configured (unlimited, subject only to the
    /// ledger's actual balance).
    fn resource_quota(&self, principal_id: &str, resource: &str) -> Option<f64>;
}

/// A capability manager with no restrictions — every principal has every
/// capability and no quota is ever enforced. Useful as a default for hosts
/// that layer their own policy in front of the executor.
#[derive(Debug, Default)]
pub struct PermissiveCapabilityManager;

impl CapabilityManager for PermissiveCapabilityManager {
    fn has_capability(&self, _principal_id: &str, _capability: &str) -> bool {
        true
    }

    fn resource_quota(&self, _principal_id: &str, _resource: &str) -> Option<f64> {
        None
    }
}
