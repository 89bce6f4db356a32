//! The World: the single process-level object binding the ID registry,
//! ledger, artifact store, contract engine, and action executor, and
//! exposing the action-intent dispatcher every principal's request goes
//! through.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Weak};
use std::time::Duration;

use async_trait::async_trait;
use dashmap::{DashMap, DashSet};
use kernel_contracts::{
    ContractEngine, DanglingPolicy, KernelContractKind, PermissionCache, PermissionContext,
    PermissionResult,
};
use kernel_core::{
    Event, EventLogger, EventType, IdRegistry, KernelError, PermissionAction,
};
use kernel_ledger::{DelegationRegistry, Ledger};
use kernel_store::{Artifact, ArtifactStore, WriteRequest};
use kernel_vm::{
    ActionExecutor, CapabilityManager as VmCapabilityManager, ExecutionHost, RhaiCodeValidator,
};
use serde_json::Value;

use crate::action::{ActionIntent, ActionResult};
use crate::collaborators::{LlmMessage, LlmProvider, NullLlmProvider};
use crate::config::WorldConfig;
use crate::invocation_registry::InvocationRegistry;
use crate::mint::{MintAuction, MintAuctionResult, MintScorer, MintSubmission, NullMintScorer};
use crate::quota::QuotaTracker;

/// The decimal resource `can_call_llm`/agent-freeze checks are keyed on —
/// a principal's remaining funded LLM allowance, debited by `syscall_llm`
/// and doubling as the "frozen" signal when it runs out.
const LLM_BUDGET_RESOURCE: &str = "llm_budget";

/// The World itself: everything C1–C6 need to cooperate, plus the
/// world-level state spec.md §4.7 names (event counter, invocation
/// registry, mint auction, per-principal library installs).
pub struct World {
    config: WorldConfig,
    #[allow(dead_code)]
    id_registry: Arc<IdRegistry>,
    ledger: Arc<Ledger>,
    store: Arc<ArtifactStore>,
    contract_engine: Arc<ContractEngine>,
    executor: ActionExecutor,
    delegation: Arc<DelegationRegistry>,
    event_logger: Arc<dyn EventLogger>,
    event_counter: AtomicU64,
    tick: AtomicU64,
    invocation_registry: InvocationRegistry,
    mint_auction: MintAuction,
    mint_scorer: Arc<dyn MintScorer>,
    quota_tracker: QuotaTracker,
    frozen_agents: DashSet<String>,
    installed_libraries: DashMap<String, Vec<(String, Option<String>)>>,
    llm_provider: Arc<dyn LlmProvider>,
}

/// The seam handed to `kernel-vm`: a `Weak<World>` so executing code can
/// call back into the World's own permission-checked read/invoke/pay
/// surface without `kernel-vm` depending on its own caller.
struct KernelHost {
    world: Weak<World>,
}

impl KernelHost {
    fn world(&self) -> Arc<World> {
        self.world
            .upgrade()
            .expect("world dropped while an execution was in flight")
    }
}

/// Outcome of one `invoke_core` call, kept separate from `ActionResult` so
/// [`KernelHost::invoke`] can hand back a plain `Result` while
/// `execute_invoke` gets the resource/billing metadata it needs too.
struct InvokeOutcome {
    result: Result<Value, KernelError>,
    resources_consumed: HashMap<String, f64>,
    charged_to: String,
}

impl World {
    /// Builds a fresh World. Uses `Arc::new_cyclic` so the `KernelHost`
    /// handed to the executor can reach back into this same World through
    /// a `Weak` reference, avoiding a dependency cycle between
    /// `kernel-vm` and `kernel-world`.
    pub fn new(
        config: WorldConfig,
        event_logger: Arc<dyn EventLogger>,
        llm_provider: Arc<dyn LlmProvider>,
        mint_scorer: Arc<dyn MintScorer>,
    ) -> Arc<Self> {
        Arc::new_cyclic(|weak: &Weak<World>| {
            let id_registry = Arc::new(IdRegistry::new());
            let ledger = Arc::new(Ledger::new());
            let store = Arc::new(ArtifactStore::new(
                id_registry.clone(),
                Arc::new(RhaiCodeValidator),
            ));
            let cache = PermissionCache::new(Duration::from_secs(1));
            let dangling_kind = KernelContractKind::from_id(&config.dangling_fallback_contract)
                .unwrap_or(KernelContractKind::Freeware);
            let contract_engine = Arc::new(ContractEngine::new(
                store.clone(),
                cache,
                DanglingPolicy::Fallback(dangling_kind),
            ));

            let host = Arc::new(KernelHost {
                world: weak.clone(),
            });
            let exec_host: Arc<dyn ExecutionHost> = host.clone();
            let cap_manager: Arc<dyn VmCapabilityManager> = host;
            let executor = ActionExecutor::new(exec_host, cap_manager);

            World {
                invocation_registry: InvocationRegistry::new(config.invocation_registry_capacity),
                config,
                id_registry,
                ledger,
                store,
                contract_engine,
                executor,
                delegation: Arc::new(DelegationRegistry::new()),
                event_logger,
                event_counter: AtomicU64::new(0),
                tick: AtomicU64::new(0),
                mint_auction: MintAuction::new(),
                mint_scorer,
                quota_tracker: QuotaTracker::new(),
                frozen_agents: DashSet::new(),
                installed_libraries: DashMap::new(),
                llm_provider,
            }
        })
    }

    /// A World with every ambient collaborator defaulted to its inert
    /// reference implementation — convenient for tests and hosts that
    /// don't (yet) wire a real LLM/scorer backend.
    pub fn new_default() -> Arc<Self> {
        Self::new(
            WorldConfig::default(),
            Arc::new(kernel_core::NullEventLogger),
            Arc::new(NullLlmProvider),
            Arc::new(NullMintScorer),
        )
    }

    pub fn config(&self) -> &WorldConfig {
        &self.config
    }

    pub fn store(&self) -> &ArtifactStore {
        &self.store
    }

    pub fn ledger(&self) -> &Ledger {
        &self.ledger
    }

    pub fn contract_engine(&self) -> &ContractEngine {
        &self.contract_engine
    }

    pub fn invocation_registry(&self) -> &InvocationRegistry {
        &self.invocation_registry
    }

    pub fn delegation_registry(&self) -> &DelegationRegistry {
        &self.delegation
    }

    fn next_event_number(&self) -> u64 {
        self.event_counter.fetch_add(1, Ordering::SeqCst)
    }

    fn log_event(&self, event_type: EventType, payload: Value) -> u64 {
        let number = self.next_event_number();
        self.event_logger.log(Event::new(event_type, number, payload));
        number
    }

    pub fn current_tick(&self) -> u64 {
        self.tick.load(Ordering::SeqCst)
    }

    /// Advances the world's tick counter by one, returning the new value.
    /// Scheduling a loop artifact's `run` once per tick is a host concern
    /// outside this crate's scope; the World only keeps the clock.
    pub fn advance_tick(&self) -> u64 {
        self.tick.fetch_add(1, Ordering::SeqCst) + 1
    }

    // ---- the action-intent dispatcher ----

    /// Dispatches one principal's intent: frozen-agent short-circuit,
    /// per-intent handler, structured event, event counter increment.
    pub async fn execute_action(&self, intent: ActionIntent) -> ActionResult {
        let principal_id = intent.principal_id().to_string();
        let kind = intent.kind_name();

        if kind != "noop" && self.is_frozen(&principal_id) {
            let result = ActionResult::from_error(&KernelError::not_authorized(format!(
                "{principal_id} is frozen: insufficient {LLM_BUDGET_RESOURCE}"
            )));
            self.log_event(
                EventType::Action,
                serde_json::json!({"principal_id": principal_id, "kind": kind, "result": result.to_log_value()}),
            );
            return result;
        }

        let result = match intent {
            ActionIntent::Noop { reasoning, .. } => {
                ActionResult::success("noop", Some(Value::String(reasoning)))
            }
            ActionIntent::Read {
                principal_id,
                artifact_id,
                ..
            } => self.execute_read(&principal_id, &artifact_id).await,
            ActionIntent::Write {
                principal_id,
                artifact_id,
                kind,
                content,
                executable,
                code,
                price,
                access_contract_id,
                capabilities,
                ..
            } => {
                self.execute_write(
                    &principal_id,
                    artifact_id,
                    kind,
                    content,
                    executable,
                    code,
                    price,
                    access_contract_id,
                    capabilities,
                )
                .await
            }
            ActionIntent::Edit {
                principal_id,
                artifact_id,
                old_string,
                new_string,
                ..
            } => {
                self.execute_edit(&principal_id, &artifact_id, &old_string, &new_string)
                    .await
            }
            ActionIntent::Invoke {
                principal_id,
                artifact_id,
                method,
                args,
                ..
            } => self.execute_invoke(&principal_id, &artifact_id, &method, args).await,
            ActionIntent::Delete {
                principal_id,
                artifact_id,
                ..
            } => self.execute_delete(&principal_id, &artifact_id).await,
            ActionIntent::Subscribe {
                principal_id,
                artifact_id,
                trigger,
                ..
            } => {
                self.execute_subscribe(&principal_id, &artifact_id, &trigger, true)
                    .await
            }
            ActionIntent::Unsubscribe {
                principal_id,
                artifact_id,
                trigger,
                ..
            } => {
                self.execute_subscribe(&principal_id, &artifact_id, &trigger, false)
                    .await
            }
            ActionIntent::ConfigureContext {
                principal_id,
                artifact_id,
                context,
                ..
            } => {
                self.execute_self_mod(&principal_id, &artifact_id, "context", context)
                    .await
            }
            ActionIntent::ModifySystemPrompt {
                principal_id,
                artifact_id,
                prompt,
                ..
            } => {
                self.execute_self_mod(
                    &principal_id,
                    &artifact_id,
                    "system_prompt",
                    Value::String(prompt),
                )
                .await
            }
            ActionIntent::UpdateMetadata {
                principal_id,
                artifact_id,
                updates,
                ..
            } => {
                self.execute_update_metadata(&principal_id, &artifact_id, updates)
                    .await
            }
        };

        self.log_event(
            EventType::Action,
            serde_json::json!({"principal_id": principal_id, "kind": kind, "result": result.to_log_value()}),
        );
        result
    }

    // ---- per-intent handlers (ActionResult-producing) ----

    async fn execute_read(&self, principal_id: &str, artifact_id: &str) -> ActionResult {
        match self.read_core(principal_id, artifact_id).await {
            Ok(value) => ActionResult::success("read", Some(value)),
            Err(err) => ActionResult::from_error(&err),
        }
    }

    #[allow(clippy::too_many_arguments)]
    async fn execute_write(
        &self,
        principal_id: &str,
        artifact_id: Option<String>,
        kind: String,
        content: String,
        executable: bool,
        code: String,
        price: u64,
        access_contract_id: Option<String>,
        capabilities: Vec<String>,
    ) -> ActionResult {
        match self
            .write_core(
                principal_id,
                artifact_id,
                kind,
                content,
                executable,
                code,
                price,
                access_contract_id,
                capabilities,
            )
            .await
        {
            Ok(artifact) => ActionResult::success(
                "write",
                Some(serde_json::json!({"artifact_id": artifact.id, "version": artifact.version})),
            ),
            Err(err) => ActionResult::from_error(&err),
        }
    }

    async fn execute_edit(
        &self,
        principal_id: &str,
        artifact_id: &str,
        old_string: &str,
        new_string: &str,
    ) -> ActionResult {
        match self.edit_core(principal_id, artifact_id, old_string, new_string).await {
            Ok(artifact) => ActionResult::success(
                "edit",
                Some(serde_json::json!({"artifact_id": artifact.id, "version": artifact.version})),
            ),
            Err(err) => ActionResult::from_error(&err),
        }
    }

    async fn execute_invoke(
        &self,
        principal_id: &str,
        artifact_id: &str,
        method: &str,
        args: Vec<Value>,
    ) -> ActionResult {
        let outcome = self.invoke_core(principal_id, artifact_id, method, args, 0).await;
        match outcome.result {
            Ok(value) => ActionResult::success("invoke", Some(value))
                .with_resources_consumed(outcome.resources_consumed)
                .with_charged_to(outcome.charged_to),
            Err(err) => ActionResult::from_error(&err)
                .with_resources_consumed(outcome.resources_consumed)
                .with_charged_to(outcome.charged_to),
        }
    }

    async fn execute_delete(&self, principal_id: &str, artifact_id: &str) -> ActionResult {
        match self.delete_core(principal_id, artifact_id).await {
            Ok(_) => ActionResult::success("delete", None),
            Err(err) => ActionResult::from_error(&err),
        }
    }

    async fn execute_subscribe(
        &self,
        principal_id: &str,
        artifact_id: &str,
        trigger: &str,
        subscribe: bool,
    ) -> ActionResult {
        let artifact = match self.store.get(artifact_id) {
            Some(a) => a,
            None => return ActionResult::from_error(&KernelError::not_found(artifact_id)),
        };
        if artifact.kind != "agent" {
            return ActionResult::from_error(&KernelError::invalid_argument(
                "subscriptions apply only to agent-type artifacts",
            ));
        }
        if let Err(err) = self.authorize_self_mod(principal_id, &artifact).await {
            return ActionResult::from_error(&err);
        }

        let mut subscriptions: Vec<String> = artifact
            .metadata
            .get("subscriptions")
            .and_then(|v| v.as_array())
            .map(|arr| arr.iter().filter_map(|v| v.as_str().map(String::from)).collect())
            .unwrap_or_default();
        if subscribe {
            if !subscriptions.iter().any(|t| t == trigger) {
                subscriptions.push(trigger.to_string());
            }
        } else {
            subscriptions.retain(|t| t != trigger);
        }

        let mut updates = HashMap::new();
        updates.insert("subscriptions".to_string(), serde_json::json!(subscriptions));
        match self.store.update_metadata(artifact_id, updates) {
            Ok(_) => ActionResult::success(if subscribe { "subscribed" } else { "unsubscribed" }, None),
            Err(err) => ActionResult::from_error(&err),
        }
    }

    async fn execute_self_mod(
        &self,
        principal_id: &str,
        artifact_id: &str,
        field: &str,
        value: Value,
    ) -> ActionResult {
        let artifact = match self.store.get(artifact_id) {
            Some(a) => a,
            None => return ActionResult::from_error(&KernelError::not_found(artifact_id)),
        };
        if artifact.kind != "agent" {
            return ActionResult::from_error(&KernelError::invalid_argument(
                "this action applies only to agent-type artifacts",
            ));
        }
        if let Err(err) = self.authorize_self_mod(principal_id, &artifact).await {
            return ActionResult::from_error(&err);
        }
        let mut updates = HashMap::new();
        updates.insert(field.to_string(), value);
        match self.store.apply_state_updates(artifact_id, updates) {
            Ok(_) => ActionResult::success(format!("{field} updated"), None),
            Err(err) => ActionResult::from_error(&err),
        }
    }

    async fn execute_update_metadata(
        &self,
        principal_id: &str,
        artifact_id: &str,
        updates: HashMap<String, Value>,
    ) -> ActionResult {
        let artifact = match self.store.get(artifact_id) {
            Some(a) => a,
            None => return ActionResult::from_error(&KernelError::not_found(artifact_id)),
        };
        if let Err(err) = self.authorize_self_mod(principal_id, &artifact).await {
            return ActionResult::from_error(&err);
        }
        match self.store.update_metadata(artifact_id, updates) {
            Ok(updated) => {
                ActionResult::success("metadata updated", Some(serde_json::json!({"metadata": updated.metadata})))
            }
            Err(err) => ActionResult::from_error(&err),
        }
    }

    /// Self-modification intents aren't one of the five kernel actions —
    /// they're authorized by running the artifact's own contract as if it
    /// were an edit, so a self-owned/private agent still only lets its
    /// principal reconfigure it.
    async fn authorize_self_mod(&self, principal_id: &str, artifact: &Artifact) -> Result<(), KernelError> {
        let context = PermissionContext::new(
            artifact.state.clone(),
            artifact.metadata.clone(),
            artifact.created_by.clone(),
        );
        let decision = self
            .contract_engine
            .check_permission(principal_id, PermissionAction::Edit, artifact, &context, self.ledger.clone())
            .await;
        if !decision.allowed {
            return Err(KernelError::not_authorized(decision.reason));
        }
        Ok(())
    }

    // ---- core operations (Result-producing, shared with the ExecutionHost seam) ----

    async fn read_core(&self, caller: &str, target_id: &str) -> Result<Value, KernelError> {
        let artifact = self.store.get(target_id).ok_or_else(|| KernelError::not_found(target_id))?;
        if artifact.deleted {
            return Ok(serde_json::json!({
                "id": artifact.id,
                "deleted": true,
                "deleted_at": artifact.deleted_at,
                "deleted_by": artifact.deleted_by,
            }));
        }

        let context = PermissionContext::new(
            artifact.state.clone(),
            artifact.metadata.clone(),
            artifact.created_by.clone(),
        );
        let decision = self
            .contract_engine
            .check_permission(caller, PermissionAction::Read, &artifact, &context, self.ledger.clone())
            .await;
        if !decision.allowed {
            return Err(KernelError::not_authorized(decision.reason));
        }
        if let Some(updates) = decision.state_updates.clone() {
            let _ = self.store.apply_state_updates(target_id, updates);
        }
        self.settle_scrip(&decision, caller).await?;
        self.log_event(
            EventType::ArtifactRead,
            serde_json::json!({"artifact_id": target_id, "caller": caller}),
        );

        Ok(serde_json::json!({
            "id": artifact.id,
            "kind": artifact.kind,
            "content": artifact.content,
            "executable": artifact.executable,
            "price": artifact.price,
            "metadata": artifact.metadata,
            "state": artifact.state,
        }))
    }

    #[allow(clippy::too_many_arguments)]
    async fn write_core(
        &self,
        caller: &str,
        artifact_id: Option<String>,
        kind: String,
        content: String,
        executable: bool,
        code: String,
        price: u64,
        access_contract_id: Option<String>,
        capabilities: Vec<String>,
    ) -> Result<Artifact, KernelError> {
        if let Some(id) = &artifact_id {
            if let Some(existing) = self.store.get(id) {
                if existing.kernel_protected {
                    return Err(KernelError::not_authorized(
                        "kernel-protected artifacts cannot be overwritten",
                    ));
                }
                let context = PermissionContext::new(
                    existing.state.clone(),
                    existing.metadata.clone(),
                    existing.created_by.clone(),
                );
                let decision = self
                    .contract_engine
                    .check_permission(caller, PermissionAction::Write, &existing, &context, self.ledger.clone())
                    .await;
                if !decision.allowed {
                    return Err(KernelError::not_authorized(decision.reason));
                }
                if let Some(updates) = decision.state_updates.clone() {
                    let _ = self.store.apply_state_updates(id, updates);
                }
                self.settle_scrip(&decision, caller).await?;
            }
        }

        let artifact = self.store.write(WriteRequest {
            id: artifact_id,
            kind,
            content,
            created_by: caller.to_string(),
            executable,
            code,
            price,
            access_contract_id,
            capabilities,
            ..Default::default()
        })?;
        self.log_event(
            EventType::WriteArtifactSuccess,
            serde_json::json!({"artifact_id": artifact.id, "caller": caller}),
        );
        Ok(artifact)
    }

    async fn edit_core(
        &self,
        caller: &str,
        artifact_id: &str,
        old_string: &str,
        new_string: &str,
    ) -> Result<Artifact, KernelError> {
        let artifact = self.store.get(artifact_id).ok_or_else(|| KernelError::not_found(artifact_id))?;
        if artifact.kernel_protected {
            return Err(KernelError::not_authorized("kernel-protected artifacts cannot be edited"));
        }
        let context = PermissionContext::new(
            artifact.state.clone(),
            artifact.metadata.clone(),
            artifact.created_by.clone(),
        );
        let decision = self
            .contract_engine
            .check_permission(caller, PermissionAction::Edit, &artifact, &context, self.ledger.clone())
            .await;
        if !decision.allowed {
            return Err(KernelError::not_authorized(decision.reason));
        }
        if let Some(updates) = decision.state_updates.clone() {
            let _ = self.store.apply_state_updates(artifact_id, updates);
        }
        self.settle_scrip(&decision, caller).await?;

        let updated = self.store.edit(artifact_id, old_string, new_string)?;
        self.log_event(
            EventType::EditArtifactSuccess,
            serde_json::json!({"artifact_id": artifact_id, "caller": caller}),
        );
        Ok(updated)
    }

    async fn delete_core(&self, caller: &str, artifact_id: &str) -> Result<Artifact, KernelError> {
        let artifact = self.store.get(artifact_id).ok_or_else(|| KernelError::not_found(artifact_id))?;
        let context = PermissionContext::new(
            artifact.state.clone(),
            artifact.metadata.clone(),
            artifact.created_by.clone(),
        );
        let decision = self
            .contract_engine
            .check_permission(caller, PermissionAction::Delete, &artifact, &context, self.ledger.clone())
            .await;
        if !decision.allowed {
            return Err(KernelError::not_authorized(decision.reason));
        }
        self.settle_scrip(&decision, caller).await?;

        let deleted = self.store.delete(artifact_id, caller)?;
        self.log_event(
            EventType::ArtifactDeleted,
            serde_json::json!({"artifact_id": artifact_id, "caller": caller}),
        );
        self.log_event(
            EventType::DeleteArtifactSuccess,
            serde_json::json!({"artifact_id": artifact_id, "caller": caller}),
        );
        Ok(deleted)
    }

    /// Depth-bounded, permission-checked nested invoke. `caller` is the
    /// *immediate* caller — for a chain A → B → C this is called with
    /// `caller = B` when C is reached, never A (spec.md §4.6). Billing
    /// defaults to that same immediate caller but a contract's
    /// `resource_payer`/`scrip_payer` can redirect it, which is the
    /// mechanism chains use to bill further up (sponsorship).
    async fn invoke_core(
        &self,
        caller: &str,
        target_id: &str,
        method: &str,
        args: Vec<Value>,
        depth: u32,
    ) -> InvokeOutcome {
        let no_resources = HashMap::new();
        let fail = |err: KernelError| InvokeOutcome {
            result: Err(err),
            resources_consumed: no_resources.clone(),
            charged_to: caller.to_string(),
        };

        if depth > self.config.max_invoke_depth {
            return fail(KernelError::DepthExceeded {
                kind: "invoke".to_string(),
                depth,
                max: self.config.max_invoke_depth,
            });
        }

        let artifact = match self.store.get(target_id) {
            Some(a) => a,
            None => return fail(KernelError::not_found(target_id)),
        };
        if artifact.deleted {
            return fail(KernelError::Deleted {
                id: target_id.to_string(),
            });
        }
        if !artifact.executable {
            return fail(KernelError::InvalidType {
                expected: "executable artifact".to_string(),
                got: artifact.kind.clone(),
            });
        }

        let skip_gatekeeper = artifact.defines_handle_request();
        let decision = if skip_gatekeeper {
            PermissionResult::allow("handle_request artifact is its own gatekeeper")
        } else if depth > self.config.max_contract_depth {
            // Every nested invoke performs exactly one permission check, so the
            // invoke chain depth is also the permission-check chain depth here;
            // `max_contract_depth` is enforced independently of
            // `max_invoke_depth` (spec Testable Property 6) even though both
            // bound the same recursion in this implementation, since no
            // executable contract can itself trigger a further permission
            // check outside of nested invoke.
            self.invocation_registry.record(
                self.next_event_number(),
                caller,
                target_id,
                method,
                false,
                0.0,
                Some("contract_depth_exceeded".to_string()),
            );
            return fail(KernelError::DepthExceeded {
                kind: "contract".to_string(),
                depth,
                max: self.config.max_contract_depth,
            });
        } else {
            let context = PermissionContext::new(
                artifact.state.clone(),
                artifact.metadata.clone(),
                artifact.created_by.clone(),
            )
            .with_invoke(method.to_string(), args.clone());
            let decision = self
                .contract_engine
                .check_permission(caller, PermissionAction::Invoke, &artifact, &context, self.ledger.clone())
                .await;
            if !decision.allowed {
                self.invocation_registry.record(
                    self.next_event_number(),
                    caller,
                    target_id,
                    method,
                    false,
                    0.0,
                    Some("not_authorized".to_string()),
                );
                return fail(KernelError::not_authorized(decision.reason));
            }
            decision
        };

        if let Some(updates) = decision.state_updates.clone() {
            let _ = self.store.apply_state_updates(target_id, updates);
        }

        let (entry_point, call_args): (String, Vec<Value>) = if skip_gatekeeper {
            (
                "handle_request".to_string(),
                vec![Value::String(method.to_string()), Value::Array(args.clone())],
            )
        } else {
            (method.to_string(), args.clone())
        };

        let report = self.executor.execute(&artifact, caller, &entry_point, call_args, depth).await;

        let resource_payer = decision.resource_payer.clone().unwrap_or_else(|| caller.to_string());
        for (resource, amount) in &report.resources_consumed {
            if let Err(err) = self.ledger.spend_resource_f64(&resource_payer, resource, *amount) {
                tracing::warn!(%resource_payer, resource, amount, %err, "resource charge could not be applied");
            }
        }
        self.sync_frozen_state(&resource_payer);

        let success = report.result.is_ok();
        self.invocation_registry.record(
            self.next_event_number(),
            caller,
            target_id,
            method,
            success,
            report.wall_time_ms as f64,
            report.result.as_ref().err().map(|e| format!("{:?}", e.code())),
        );

        match report.result {
            Ok(value) => {
                if let Err(err) = self.settle_scrip(&decision, caller).await {
                    return InvokeOutcome {
                        result: Err(err),
                        resources_consumed: report.resources_consumed,
                        charged_to: resource_payer,
                    };
                }
                self.log_event(
                    EventType::InvokeSuccess,
                    serde_json::json!({"artifact_id": target_id, "method": method, "caller": caller}),
                );
                InvokeOutcome {
                    result: Ok(value),
                    resources_consumed: report.resources_consumed,
                    charged_to: resource_payer,
                }
            }
            Err(err) => {
                self.log_event(
                    EventType::InvokeFailure,
                    serde_json::json!({"artifact_id": target_id, "method": method, "caller": caller, "error": err.to_string()}),
                );
                InvokeOutcome {
                    result: Err(err),
                    resources_consumed: report.resources_consumed,
                    charged_to: resource_payer,
                }
            }
        }
    }

    async fn kernel_query_core(&self, caller: &str, query: &str, args: Vec<Value>) -> Result<Value, KernelError> {
        match query {
            "exists" => {
                let id = args
                    .first()
                    .and_then(|v| v.as_str())
                    .ok_or_else(|| KernelError::invalid_argument("exists requires an id argument"))?;
                Ok(Value::Bool(self.store.exists(id)))
            }
            "list_by_creator" => {
                let creator = args.first().and_then(|v| v.as_str()).unwrap_or(caller);
                Ok(serde_json::json!(self.store.ids_by_creator(creator)))
            }
            "is_frozen" => {
                let id = args.first().and_then(|v| v.as_str()).unwrap_or(caller);
                Ok(Value::Bool(self.is_frozen(id)))
            }
            "tick" => Ok(Value::from(self.current_tick())),
            other => Err(KernelError::invalid_argument(format!("unknown kernel_query: {other}"))),
        }
    }

    async fn pay_core(&self, payer: &str, recipient: &str, amount: i64) -> Result<(), KernelError> {
        self.ledger.transfer_scrip_async(payer, recipient, amount).await
    }

    pub fn can_call_llm(&self, principal_id: &str) -> bool {
        !self.is_frozen(principal_id) && self.ledger.get_resource_f64(principal_id, LLM_BUDGET_RESOURCE) > 0.0
    }

    async fn syscall_llm_core(&self, caller: &str, prompt: String) -> Result<String, KernelError> {
        if !self.can_call_llm(caller) {
            return Err(KernelError::not_authorized(format!(
                "{caller} may not call the LLM: frozen or insufficient {LLM_BUDGET_RESOURCE}"
            )));
        }
        let response = self
            .llm_provider
            .complete("default", vec![LlmMessage::user(prompt)], None)
            .await?;
        match self.ledger.spend_resource_f64(caller, LLM_BUDGET_RESOURCE, response.cost) {
            Ok(()) => {
                self.sync_frozen_state(caller);
                self.log_event(
                    EventType::Thinking,
                    serde_json::json!({"caller": caller, "cost": response.cost}),
                );
                Ok(response.content)
            }
            Err(err) => {
                self.log_event(
                    EventType::ThinkingFailed,
                    serde_json::json!({"caller": caller, "error": err.to_string()}),
                );
                Err(err)
            }
        }
    }

    /// Routes a decision's scrip charge to its payer, honoring `pool:<id>`
    /// delegation sponsorship (spec.md §8 S5): the named pool's grant to
    /// `caller` is checked and recorded, then funds move from the pool
    /// (not `caller`) to the recipient.
    async fn settle_scrip(&self, decision: &PermissionResult, caller: &str) -> Result<(), KernelError> {
        if decision.scrip_cost == 0 {
            return Ok(());
        }
        let cost = decision.scrip_cost as i64;
        let payer = decision.scrip_payer.clone().unwrap_or_else(|| caller.to_string());

        if let Some(pool) = payer.strip_prefix("pool:") {
            if !self.delegation.try_charge(pool, caller, decision.scrip_cost) {
                return Err(KernelError::not_authorized(format!(
                    "{caller} has no delegation from {pool} covering this charge"
                )));
            }
            return match &decision.scrip_recipient {
                Some(recipient) => self.ledger.transfer_scrip_async(pool, recipient, cost).await,
                None => self.ledger.deduct_scrip_async(pool, cost).await,
            };
        }

        match &decision.scrip_recipient {
            Some(recipient) => self.ledger.transfer_scrip_async(&payer, recipient, cost).await,
            None => self.ledger.deduct_scrip_async(&payer, cost).await,
        }
    }

    // ---- agent freeze/unfreeze (spec.md §10: frozen-agent set) ----

    pub fn is_frozen(&self, principal_id: &str) -> bool {
        self.frozen_agents.contains(principal_id)
    }

    pub fn frozen_agents(&self) -> Vec<String> {
        self.frozen_agents.iter().map(|entry| entry.clone()).collect()
    }

    /// Reconciles the explicit frozen-agent set against the principal's
    /// current `llm_budget` balance, emitting `agent_frozen`/
    /// `agent_unfrozen` only on an actual transition.
    fn sync_frozen_state(&self, principal_id: &str) {
        let balance = self.ledger.get_resource_f64(principal_id, LLM_BUDGET_RESOURCE);
        let currently_frozen = self.frozen_agents.contains(principal_id);
        if balance <= 0.0 && !currently_frozen {
            self.emit_agent_frozen(principal_id, &format!("{LLM_BUDGET_RESOURCE} exhausted"));
        } else if balance > 0.0 && currently_frozen {
            self.emit_agent_unfrozen(principal_id, "kernel");
        }
    }

    pub fn emit_agent_frozen(&self, principal_id: &str, reason: &str) {
        self.frozen_agents.insert(principal_id.to_string());
        self.log_event(
            EventType::AgentFrozen,
            serde_json::json!({"principal_id": principal_id, "reason": reason}),
        );
    }

    pub fn emit_agent_unfrozen(&self, principal_id: &str, unfrozen_by: &str) {
        self.frozen_agents.remove(principal_id);
        self.log_event(
            EventType::AgentUnfrozen,
            serde_json::json!({"principal_id": principal_id, "unfrozen_by": unfrozen_by}),
        );
    }

    // ---- per-resource quotas (spec.md §10) ----

    pub fn set_quota(&self, principal_id: &str, resource: &str, amount: f64) {
        self.quota_tracker.set_quota(principal_id, resource, amount);
        self.log_event(
            EventType::QuotaSet,
            serde_json::json!({"principal_id": principal_id, "resource": resource, "amount": amount}),
        );
    }

    pub fn get_quota(&self, principal_id: &str, resource: &str) -> f64 {
        self.quota_tracker.get_quota(principal_id, resource)
    }

    pub fn consume_quota(&self, principal_id: &str, resource: &str, amount: f64) -> bool {
        self.quota_tracker.consume(principal_id, resource, amount)
    }

    pub fn get_quota_usage(&self, principal_id: &str, resource: &str) -> f64 {
        self.quota_tracker.get_usage(principal_id, resource)
    }

    pub fn get_available_capacity(&self, principal_id: &str, resource: &str) -> f64 {
        self.quota_tracker.available_capacity(principal_id, resource)
    }

    // ---- library installs (spec.md §10) ----

    pub fn record_library_install(&self, principal_id: &str, library: &str, version: Option<&str>) {
        self.installed_libraries
            .entry(principal_id.to_string())
            .or_default()
            .push((library.to_string(), version.map(String::from)));
        self.log_event(
            EventType::LibraryInstalled,
            serde_json::json!({"principal_id": principal_id, "library": library, "version": version}),
        );
    }

    pub fn get_installed_libraries(&self, principal_id: &str) -> Vec<(String, Option<String>)> {
        self.installed_libraries.get(principal_id).map(|v| v.clone()).unwrap_or_default()
    }

    // ---- mint auction ----

    pub fn submit_for_mint(&self, principal_id: &str, artifact_id: &str, bid: i64) -> Result<String, KernelError> {
        let submission_id = self.mint_auction.submit(
            &self.ledger,
            &self.store,
            principal_id,
            artifact_id,
            bid,
            self.current_tick(),
        )?;
        self.log_event(
            EventType::MintSubmission,
            serde_json::json!({"principal_id": principal_id, "artifact_id": artifact_id, "bid": bid, "submission_id": submission_id}),
        );
        Ok(submission_id)
    }

    pub fn cancel_mint_submission(&self, principal_id: &str, submission_id: &str) -> bool {
        let cancelled = self.mint_auction.cancel(&self.ledger, principal_id, submission_id);
        if cancelled {
            self.log_event(
                EventType::MintCancellation,
                serde_json::json!({"principal_id": principal_id, "submission_id": submission_id}),
            );
        }
        cancelled
    }

    pub fn pending_mint_submissions(&self) -> Vec<MintSubmission> {
        self.mint_auction.pending_submissions()
    }

    pub fn mint_history(&self, limit: usize) -> Vec<MintAuctionResult> {
        self.mint_auction.history(limit)
    }

    pub fn resolve_mint_auction(&self) -> MintAuctionResult {
        let result = self.mint_auction.resolve(
            &self.ledger,
            &self.store,
            self.mint_scorer.as_ref(),
            self.config.mint_ratio,
            self.config.mint_minimum_bid,
            self.config.ubi_enabled,
            self.current_tick(),
        );
        self.log_event(
            EventType::MintAuctionResolved,
            serde_json::json!({
                "winner_id": result.winner_id,
                "artifact_id": result.artifact_id,
                "winning_bid": result.winning_bid,
                "price_paid": result.price_paid,
                "scrip_minted": result.scrip_minted,
            }),
        );
        result
    }
}

#[async_trait]
impl ExecutionHost for KernelHost {
    async fn read_artifact(&self, caller: &str, target_id: &str) -> Result<Value, KernelError> {
        self.world().read_core(caller, target_id).await
    }

    async fn invoke(
        &self,
        caller: &str,
        target_id: &str,
        method: &str,
        args: Vec<Value>,
        depth: u32,
    ) -> Result<Value, KernelError> {
        self.world().invoke_core(caller, target_id, method, args, depth).await.result
    }

    async fn kernel_query(&self, caller: &str, query: &str, args: Vec<Value>) -> Result<Value, KernelError> {
        self.world().kernel_query_core(caller, query, args).await
    }

    async fn pay(&self, payer: &str, recipient: &str, amount: i64) -> Result<(), KernelError> {
        self.world().pay_core(payer, recipient, amount).await
    }

    fn get_scrip_balance(&self, principal_id: &str) -> i64 {
        self.world().ledger.get_scrip(principal_id)
    }

    fn get_resource_balance(&self, principal_id: &str, resource: &str) -> f64 {
        self.world().ledger.get_resource_f64(principal_id, resource)
    }

    fn can_call_llm(&self, principal_id: &str) -> bool {
        self.world().can_call_llm(principal_id)
    }

    async fn syscall_llm(&self, caller: &str, prompt: String) -> Result<String, KernelError> {
        self.world().syscall_llm_core(caller, prompt).await
    }
}

impl VmCapabilityManager for KernelHost {
    fn has_capability(&self, principal_id: &str, capability: &str) -> bool {
        match capability {
            "can_call_llm" => self.world().can_call_llm(principal_id),
            _ => !self.world().is_frozen(principal_id),
        }
    }

    fn resource_quota(&self, principal_id: &str, resource: &str) -> Option<f64> {
        let world = self.world();
        let quota = world.quota_tracker.get_quota(principal_id, resource);
        if quota > 0.0 {
            Some(world.quota_tracker.available_capacity(principal_id, resource))
        } else {
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use kernel_core::constants::{KERNEL_CONTRACT_FREEWARE, KERNEL_CONTRACT_PRIVATE};
    use kernel_ledger::DelegationGrant;

    fn write_intent(
        principal: &str,
        id: Option<&str>,
        executable: bool,
        code: &str,
        access_contract_id: Option<&str>,
    ) -> ActionIntent {
        ActionIntent::Write {
            principal_id: principal.to_string(),
            reasoning: String::new(),
            artifact_id: id.map(String::from),
            kind: "data".to_string(),
            content: "hello".to_string(),
            executable,
            code: code.to_string(),
            price: 0,
            access_contract_id: access_contract_id.map(String::from),
            capabilities: Vec::new(),
        }
    }

    #[tokio::test]
    async fn freeware_write_then_read_round_trips() {
        let world = World::new_default();
        let result = world
            .execute_action(write_intent(
                "alice",
                Some("art-1"),
                false,
                "",
                Some(KERNEL_CONTRACT_FREEWARE),
            ))
            .await;
        assert!(result.success);

        let read = world
            .execute_action(ActionIntent::Read {
                principal_id: "bob".to_string(),
                reasoning: String::new(),
                artifact_id: "art-1".to_string(),
            })
            .await;
        assert!(read.success);
        assert_eq!(read.data.unwrap()["content"], Value::String("hello".to_string()));
    }

    #[tokio::test]
    async fn private_artifact_rejects_non_principal_reader() {
        let world = World::new_default();
        world
            .execute_action(write_intent(
                "alice",
                Some("secret"),
                false,
                "",
                Some(KERNEL_CONTRACT_PRIVATE),
            ))
            .await;

        let denied = world
            .execute_action(ActionIntent::Read {
                principal_id: "mallory".to_string(),
                reasoning: String::new(),
                artifact_id: "secret".to_string(),
            })
            .await;
        assert!(!denied.success);
        assert_eq!(denied.error_code, Some(kernel_core::ErrorCode::NotAuthorized));
    }

    #[tokio::test]
    async fn invoke_dispatches_and_charges_cpu_resource() {
        let world = World::new_default();
        world
            .execute_action(write_intent(
                "alice",
                Some("svc-1"),
                true,
                "fn run(args) { args[0] + args[1] }",
                Some(KERNEL_CONTRACT_FREEWARE),
            ))
            .await;

        let result = world
            .execute_action(ActionIntent::Invoke {
                principal_id: "bob".to_string(),
                reasoning: String::new(),
                artifact_id: "svc-1".to_string(),
                method: "run".to_string(),
                args: vec![Value::from(2), Value::from(3)],
            })
            .await;
        assert!(result.success);
        assert_eq!(result.data, Some(Value::from(5)));
        assert!(result.resources_consumed.unwrap().contains_key("cpu_seconds"));
        assert_eq!(result.charged_to.as_deref(), Some("bob"));
    }

    #[tokio::test]
    async fn handle_request_artifact_skips_the_contract_gatekeeper() {
        let world = World::new_default();
        world
            .execute_action(write_intent(
                "alice",
                Some("gate-1"),
                true,
                "fn handle_request(args) { args[1][0] }",
                Some(KERNEL_CONTRACT_PRIVATE),
            ))
            .await;

        // private would normally deny "stranger"; handle_request is its
        // own gatekeeper so the kernel never runs the contract check.
        let result = world
            .execute_action(ActionIntent::Invoke {
                principal_id: "stranger".to_string(),
                reasoning: String::new(),
                artifact_id: "gate-1".to_string(),
                method: "do_thing".to_string(),
                args: vec![Value::String("ok".to_string())],
            })
            .await;
        assert!(result.success);
        assert_eq!(result.data, Some(Value::String("ok".to_string())));
    }

    #[tokio::test]
    async fn frozen_agent_is_rejected_before_dispatch() {
        let world = World::new_default();
        world.emit_agent_frozen("alice", "test freeze");
        let result = world
            .execute_action(ActionIntent::Read {
                principal_id: "alice".to_string(),
                reasoning: String::new(),
                artifact_id: "anything".to_string(),
            })
            .await;
        assert!(!result.success);
        assert_eq!(result.error_code, Some(kernel_core::ErrorCode::NotAuthorized));
    }

    #[tokio::test]
    async fn invoke_beyond_max_contract_depth_denies() {
        let mut config = WorldConfig::default();
        config.max_contract_depth = 2;
        let world = World::new(
            config,
            Arc::new(kernel_core::NullEventLogger),
            Arc::new(crate::collaborators::NullLlmProvider),
            Arc::new(crate::mint::NullMintScorer),
        );
        world
            .execute_action(write_intent(
                "alice",
                Some("svc-1"),
                true,
                "fn run(args) { args[0] + args[1] }",
                Some(KERNEL_CONTRACT_FREEWARE),
            ))
            .await;

        let outcome = world.invoke_core("bob", "svc-1", "run", vec![Value::from(1), Value::from(2)], 3).await;
        assert!(matches!(
            outcome.result,
            Err(KernelError::DepthExceeded { kind, .. }) if kind == "contract"
        ));
    }

    #[tokio::test]
    async fn nested_invoke_sees_the_immediate_caller_not_the_original_agent() {
        let world = World::new_default();
        // C's contract denies anyone but "svc-b"; if chain identity were
        // wrong (passed through as the original human caller "alice")
        // this invoke would be denied instead of succeeding.
        world
            .execute_action(write_intent(
                "sys",
                Some("contract-only-b"),
                true,
                r#"fn check_permission(caller, action, target, context) { #{ allowed: caller == "svc-b" } }"#,
                None,
            ))
            .await;
        world
            .execute_action(write_intent(
                "sys",
                Some("svc-c"),
                true,
                "fn run(args) { \"reached c\" }",
                Some("contract-only-b"),
            ))
            .await;
        world
            .execute_action(write_intent(
                "sys",
                Some("svc-b"),
                true,
                r#"fn run(args) { invoke("svc-c", "run", []) }"#,
                Some(KERNEL_CONTRACT_FREEWARE),
            ))
            .await;

        let result = world
            .execute_action(ActionIntent::Invoke {
                principal_id: "alice".to_string(),
                reasoning: String::new(),
                artifact_id: "svc-b".to_string(),
                method: "run".to_string(),
                args: vec![],
            })
            .await;
        assert!(result.success, "{:?}", result.message);
        assert_eq!(result.data, Some(Value::String("reached c".to_string())));
    }

    #[tokio::test]
    async fn delegation_pool_routes_scrip_from_grantor_not_caller() {
        let world = World::new_default();
        world.ledger.credit_scrip("alice", 100);
        world.ledger.ensure_principal("bob");
        world.ledger.ensure_principal("charlie");
        world.delegation_registry().grant(DelegationGrant {
            grantor: "alice".to_string(),
            grantee: "bob".to_string(),
            max_per_call: 100,
            max_per_window: 100,
            window: Duration::from_secs(60),
        });

        world
            .execute_action(write_intent(
                "charlie",
                Some("priced-tool"),
                true,
                r#"fn check_permission(caller, action, target, context) {
                    #{ allowed: true, scrip_cost: 50, scrip_payer: "pool:alice", scrip_recipient: "charlie" }
                }"#,
                None,
            ))
            .await;
        world
            .execute_action(write_intent(
                "charlie",
                Some("priced-svc"),
                true,
                "fn run(args) { 1 }",
                Some("priced-tool"),
            ))
            .await;

        let result = world
            .execute_action(ActionIntent::Invoke {
                principal_id: "bob".to_string(),
                reasoning: String::new(),
                artifact_id: "priced-svc".to_string(),
                method: "run".to_string(),
                args: vec![],
            })
            .await;
        assert!(result.success, "{:?}", result.message);
        assert_eq!(world.ledger.get_scrip("alice"), 50);
        assert_eq!(world.ledger.get_scrip("charlie"), 50);
        assert_eq!(world.ledger.get_scrip("bob"), 0);
    }

    #[tokio::test]
    async fn self_modification_intents_require_the_owning_principal() {
        let world = World::new_default();
        world
            .execute_action(ActionIntent::Write {
                principal_id: "alice".to_string(),
                reasoning: String::new(),
                artifact_id: Some("agent-1".to_string()),
                kind: "agent".to_string(),
                content: String::new(),
                executable: false,
                code: String::new(),
                price: 0,
                access_contract_id: Some(KERNEL_CONTRACT_PRIVATE.to_string()),
                capabilities: Vec::new(),
            })
            .await;

        let denied = world
            .execute_action(ActionIntent::ModifySystemPrompt {
                principal_id: "mallory".to_string(),
                reasoning: String::new(),
                artifact_id: "agent-1".to_string(),
                prompt: "be evil".to_string(),
            })
            .await;
        assert!(!denied.success);

        let allowed = world
            .execute_action(ActionIntent::ModifySystemPrompt {
                principal_id: "alice".to_string(),
                reasoning: String::new(),
                artifact_id: "agent-1".to_string(),
                prompt: "be helpful".to_string(),
            })
            .await;
        assert!(allowed.success);
    }

    #[tokio::test]
    async fn mint_auction_end_to_end_through_world() {
        let world = World::new_default();
        world.ledger.credit_scrip("alice", 100);
        world.ledger.credit_scrip("bob", 40);
        world
            .execute_action(write_intent("alice", Some("art-a"), true, "fn run(args) { 1 }", None))
            .await;
        world
            .execute_action(write_intent("bob", Some("art-b"), true, "fn run(args) { 1 }", None))
            .await;

        world.submit_for_mint("alice", "art-a", 100).unwrap();
        world.submit_for_mint("bob", "art-b", 40).unwrap();

        let result = world.resolve_mint_auction();
        assert_eq!(result.winner_id.as_deref(), Some("alice"));
        assert_eq!(result.price_paid, 40);
        assert_eq!(world.ledger.get_scrip("alice"), 60);
    }

    #[test]
    fn quota_and_library_bookkeeping_round_trip() {
        let world = World::new_default();
        world.set_quota("alice", "disk_bytes", 100.0);
        assert!(world.consume_quota("alice", "disk_bytes", 40.0));
        assert_eq!(world.get_available_capacity("alice", "disk_bytes"), 60.0);

        world.record_library_install("alice", "numpy", Some("1.26"));
        let libs = world.get_installed_libraries("alice");
        assert_eq!(libs, vec![("numpy".to_string(), Some("1.26".to_string()))]);
    }
}
