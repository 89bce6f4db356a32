//! Resolves an artifact's `access_contract_id` to something that can answer
//! `check_permission`, and layers a decision cache on top.

use std::sync::Arc;

use dashmap::DashMap;
use kernel_core::PermissionAction;
use kernel_ledger::Ledger;
use kernel_store::{Artifact, ArtifactStore};
use serde_json::Value;

use crate::cache::PermissionCache;
use crate::context::PermissionContext;
use crate::executable::ExecutableContract;
use crate::kernel_contracts::KernelContractKind;
use crate::permission::PermissionResult;

/// What happens when `access_contract_id` names nothing resolvable: no id
/// set, the id belongs to neither a kernel contract nor a live executable
/// artifact, or the referenced artifact doesn't define `check_permission`.
#[derive(Debug, Clone, Copy)]
pub enum DanglingPolicy {
    /// Evaluate the target as if it used this built-in contract instead.
    Fallback(KernelContractKind),
    /// Deny every action unconditionally.
    DenyAll,
}

impl Default for DanglingPolicy {
    fn default() -> Self {
        Self::Fallback(KernelContractKind::Freeware)
    }
}

pub struct ContractEngine {
    store: Arc<ArtifactStore>,
    cache: PermissionCache,
    compiled: DashMap<String, ExecutableContract>,
    dangling_policy: DanglingPolicy,
}

impl ContractEngine {
    pub fn new(store: Arc<ArtifactStore>, cache: PermissionCache, dangling_policy: DanglingPolicy) -> Self {
        Self {
            store,
            cache,
            compiled: DashMap::new(),
            dangling_policy,
        }
    }

    /// Evaluates the permission check for `target`, consulting the cache
    /// first and writing the result back keyed on the target's version.
    pub async fn check_permission(
        &self,
        caller: &str,
        action: PermissionAction,
        target: &Artifact,
        context: &PermissionContext,
        ledger: Arc<Ledger>,
    ) -> PermissionResult {
        if let Some(cached) = self.cache.get(&target.id, action, caller, &target.version) {
            return cached;
        }

        let mut result = self
            .resolve_and_check(caller, action, target, context, ledger)
            .await;

        // An artifact's own `price` (spec §3.1: "charged per successful
        // invocation, routed per contract") is a kernel-level default, not
        // something contract code has to know to apply itself — a contract
        // that already named its own `scrip_cost` keeps it; one that didn't
        // (the common case for the built-in freeware family, whose
        // `scrip_recipient` is already the writer) falls back to the
        // artifact's listed price.
        if result.allowed
            && action == PermissionAction::Invoke
            && result.scrip_cost == 0
            && target.price > 0
        {
            result.scrip_cost = target.price;
        }

        self.cache
            .put(&target.id, action, caller, &target.version, result.clone());
        result
    }

    async fn resolve_and_check(
        &self,
        caller: &str,
        action: PermissionAction,
        target: &Artifact,
        context: &PermissionContext,
        ledger: Arc<Ledger>,
    ) -> PermissionResult {
        let Some(contract_id) = target.access_contract_id.as_deref() else {
            return self.dangling(caller, action, target, context, "no access_contract_id set");
        };

        if let Some(kind) = KernelContractKind::from_id(contract_id) {
            return kind.check_permission(caller, action, &target.id, context);
        }

        let Some(contract_artifact) = self.store.get(contract_id) else {
            return self.dangling(
                caller,
                action,
                target,
                context,
                "access_contract_id does not resolve to any artifact",
            );
        };
        if !contract_artifact.is_live() {
            return self.dangling(caller, action, target, context, "contract artifact is deleted");
        }
        if !contract_artifact.defines_check_permission() {
            return self.dangling(
                caller,
                action,
                target,
                context,
                "contract artifact does not define check_permission",
            );
        }

        match self.get_or_compile(&contract_artifact) {
            Ok(executable) => {
                executable
                    .check_permission(caller, action, &target.id, context, ledger)
                    .await
            }
            Err(err) => self.dangling(
                caller,
                action,
                target,
                context,
                &format!("contract failed to compile: {err}"),
            ),
        }
    }

    fn get_or_compile(&self, contract_artifact: &Artifact) -> Result<ExecutableContract, kernel_core::KernelError> {
        if let Some(existing) = self.compiled.get(&contract_artifact.id) {
            if existing.version == contract_artifact.version {
                return Ok(existing.clone());
            }
        }
        let can_call_llm = contract_artifact
            .capabilities
            .iter()
            .any(|c| c == "can_call_llm");
        let compiled = ExecutableContract::compile(
            contract_artifact.id.clone(),
            contract_artifact.version.clone(),
            &contract_artifact.code,
            can_call_llm,
        )?;
        self.compiled
            .insert(contract_artifact.id.clone(), compiled.clone());
        Ok(compiled)
    }

    fn dangling(
        &self,
        caller: &str,
        action: PermissionAction,
        target: &Artifact,
        context: &PermissionContext,
        reason: &str,
    ) -> PermissionResult {
        let result = match self.dangling_policy {
            DanglingPolicy::DenyAll => PermissionResult::deny(reason.to_string()),
            DanglingPolicy::Fallback(kind) => kind.check_permission(caller, action, &target.id, context),
        };
        result.with_condition("dangling_contract_reason", Value::String(reason.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use kernel_core::IdRegistry;
    use kernel_store::{PermissiveValidator, WriteRequest};
    use std::collections::HashMap;

    fn engine_with_store() -> (ContractEngine, Arc<ArtifactStore>) {
        let registry = Arc::new(IdRegistry::new());
        let store = Arc::new(ArtifactStore::new(registry, Arc::new(PermissiveValidator)));
        let cache = PermissionCache::new(std::time::Duration::from_secs(60));
        let engine = ContractEngine::new(store.clone(), cache, DanglingPolicy::default());
        (engine, store)
    }

    #[tokio::test]
    async fn dangling_contract_falls_back_to_freeware() {
        let (engine, store) = engine_with_store();
        let artifact = store
            .write(WriteRequest {
                created_by: "alice".into(),
                access_contract_id: Some("nonexistent-contract".into()),
                ..Default::default()
            })
            .unwrap();
        let ctx = PermissionContext::new(HashMap::new(), HashMap::new(), "alice".into());
        let ledger = Arc::new(Ledger::new());
        let result = engine
            .check_permission("bob", PermissionAction::Read, &artifact, &ctx, ledger)
            .await;
        assert!(result.allowed);
        assert!(result.conditions.is_some());
    }

    #[tokio::test]
    async fn executable_contract_artifact_is_compiled_and_consulted() {
        let (engine, store) = engine_with_store();
        let contract_artifact = store
            .write(WriteRequest {
                created_by: "sys".into(),
                executable: true,
                code: r#"
                    fn check_permission(caller, action, target, context) {
                        #{ allowed: caller == "alice" }
                    }
                "#
                .into(),
                ..Default::default()
            })
            .unwrap();
        let target = store
            .write(WriteRequest {
                created_by: "alice".into(),
                access_contract_id: Some(contract_artifact.id.clone()),
                ..Default::default()
            })
            .unwrap();
        let ctx = PermissionContext::new(HashMap::new(), HashMap::new(), "alice".into());
        let ledger = Arc::new(Ledger::new());

        let allowed = engine
            .check_permission("alice", PermissionAction::Read, &target, &ctx, ledger.clone())
            .await;
        assert!(allowed.allowed);

        let denied = engine
            .check_permission("mallory", PermissionAction::Read, &target, &ctx, ledger)
            .await;
        assert!(!denied.allowed);
    }

    #[tokio::test]
    async fn cache_hit_avoids_recompilation_until_version_changes() {
        let (engine, store) = engine_with_store();
        let contract_artifact = store
            .write(WriteRequest {
                created_by: "sys".into(),
                executable: true,
                code: r#"
                    fn check_permission(caller, action, target, context) {
                        #{ allowed: true }
                    }
                "#
                .into(),
                ..Default::default()
            })
            .unwrap();
        let target = store
            .write(WriteRequest {
                created_by: "alice".into(),
                access_contract_id: Some(contract_artifact.id.clone()),
                ..Default::default()
            })
            .unwrap();
        let ctx = PermissionContext::new(HashMap::new(), HashMap::new(), "alice".into());
        let ledger = Arc::new(Ledger::new());

        let first = engine
            .check_permission("anyone", PermissionAction::Read, &target, &ctx, ledger.clone())
            .await;
        assert!(first.allowed);
        assert_eq!(engine.cache.len(), 1);

        let second = engine
            .check_permission("anyone", PermissionAction::Read, &target, &ctx, ledger)
            .await;
        assert!(second.allowed);
        assert_eq!(engine.cache.len(), 1);
    }

    #[tokio::test]
    async fn priced_freeware_invoke_defaults_scrip_cost_to_artifact_price() {
        use kernel_core::constants::KERNEL_CONTRACT_FREEWARE;

        let (engine, store) = engine_with_store();
        let target = store
            .write(WriteRequest {
                created_by: "alice".into(),
                executable: true,
                code: "fn run(args) { 42 }".into(),
                price: 25,
                access_contract_id: Some(KERNEL_CONTRACT_FREEWARE.to_string()),
                ..Default::default()
            })
            .unwrap();
        let ctx = PermissionContext::new(target.state.clone(), HashMap::new(), "alice".into())
            .with_invoke("run".to_string(), vec![]);
        let ledger = Arc::new(Ledger::new());

        let decision = engine
            .check_permission("bob", PermissionAction::Invoke, &target, &ctx, ledger)
            .await;
        assert!(decision.allowed);
        assert_eq!(decision.scrip_cost, 25);
        assert_eq!(decision.scrip_recipient.as_deref(), Some("alice"));
    }

    #[tokio::test]
    async fn executable_contract_custom_scrip_cost_overrides_artifact_price() {
        let (engine, store) = engine_with_store();
        let contract_artifact = store
            .write(WriteRequest {
                created_by: "sys".into(),
                executable: true,
                code: r#"
                    fn check_permission(caller, action, target, context) {
                        #{ allowed: true, scrip_cost: 5 }
                    }
                "#
                .into(),
                ..Default::default()
            })
            .unwrap();
        let target = store
            .write(WriteRequest {
                created_by: "alice".into(),
                executable: true,
                code: "fn run(args) { 1 }".into(),
                price: 25,
                access_contract_id: Some(contract_artifact.id.clone()),
                ..Default::default()
            })
            .unwrap();
        let ctx = PermissionContext::new(HashMap::new(), HashMap::new(), "alice".into())
            .with_invoke("run".to_string(), vec![]);
        let ledger = Arc::new(Ledger::new());

        let decision = engine
            .check_permission("bob", PermissionAction::Invoke, &target, &ctx, ledger)
            .await;
        assert!(decision.allowed);
        assert_eq!(decision.scrip_cost, 5);
    }
}
