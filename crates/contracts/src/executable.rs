//! Executable contracts: artifacts whose code defines `check_permission`
//! and serve as a policy for other artifacts.

use std::sync::Arc;

use kernel_core::json_bridge::{map_to_json, value_to_dynamic};
use kernel_core::sandbox::{restricted_engine, SandboxLimits};
use kernel_core::{KernelError, PermissionAction};
use kernel_ledger::Ledger;
use rhai::{Dynamic, Map, Scope, AST};
use serde_json::Value;

use crate::context::PermissionContext;
use crate::permission::{PermissionResult, ReadOnlyLedger};

/// A compiled, cacheable executable contract. Compiled once per contract
/// version; re-parsing only happens when the backing artifact's `code`
/// (and therefore `version`) changes.
#[derive(Clone)]
pub struct ExecutableContract {
    pub contract_artifact_id: String,
    pub version: String,
    ast: Arc<AST>,
    can_call_llm: bool,
}

impl ExecutableContract {
    /// Compiles `source` under the restricted grammar. Fails with
    /// `SyntaxError` on a parse failure — a contract that fails to compile
    /// can never be consulted and the caller must deny.
    pub fn compile(
        contract_artifact_id: impl Into<String>,
        version: impl Into<String>,
        source: &str,
        can_call_llm: bool,
    ) -> Result<Self, KernelError> {
        let engine = restricted_engine(&SandboxLimits::standard());
        let ast = engine
            .compile(source)
            .map_err(|e| KernelError::SyntaxError {
                message: e.to_string(),
            })?;
        if !ast.iter_functions().any(|f| f.name == "check_permission") {
            return Err(KernelError::invalid_argument(
                "executable contract must define check_permission",
            ));
        }
        Ok(Self {
            contract_artifact_id: contract_artifact_id.into(),
            version: version.into(),
            ast: Arc::new(ast),
            can_call_llm,
        })
    }

    /// Evaluates `check_permission(caller, action, target, context)`
    /// against a read-only ledger proxy. Any exception, non-map/non-bool
    /// return, or missing `allowed` field is converted to
    /// `PermissionResult::deny` — contract code never silently permits.
    pub async fn check_permission(
        &self,
        caller: &str,
        action: PermissionAction,
        target: &str,
        context: &PermissionContext,
        ledger: Arc<Ledger>,
    ) -> PermissionResult {
        let limits = if self.can_call_llm {
            SandboxLimits::llm_capable()
        } else {
            SandboxLimits::standard()
        };

        let caller = caller.to_string();
        let action_str = action.as_str().to_string();
        let target = target.to_string();
        let context_map = context_to_rhai_map(context);
        let ast = self.ast.clone();

        let outcome = kernel_core::sandbox::run_with_timeout(limits.timeout, move || {
            let mut engine = restricted_engine(&limits);
            register_ledger_proxy(&mut engine, ledger);
            let mut scope = Scope::new();
            engine.call_fn::<Dynamic>(
                &mut scope,
                &ast,
                "check_permission",
                (caller, action_str, target, context_map),
            )
        })
        .await;

        match outcome {
            Ok(value) => dynamic_to_result(value),
            Err(KernelError::Timeout { .. }) => {
                PermissionResult::deny("contract execution timed out")
            }
            Err(err) => PermissionResult::deny(format!("{}: {err}", error_class_name(&err))),
        }
    }
}

fn error_class_name(err: &KernelError) -> &'static str {
    match err {
        KernelError::SyntaxError { .. } => "SyntaxError",
        KernelError::RuntimeError { .. } => "RuntimeError",
        _ => "Error",
    }
}

fn register_ledger_proxy(engine: &mut rhai::Engine, ledger: Arc<Ledger>) {
    let proxy = ReadOnlyLedger::new(ledger);
    let p1 = proxy.clone();
    engine.register_fn("ledger_get_scrip", move |principal: &str| -> i64 {
        p1.get_scrip(principal)
    });
    let p2 = proxy.clone();
    engine.register_fn(
        "ledger_can_afford_scrip",
        move |principal: &str, amount: i64| -> bool { p2.can_afford_scrip(principal, amount) },
    );
    engine.register_fn(
        "ledger_get_resource",
        move |principal: &str, resource: &str| -> f64 { proxy.get_resource(principal, resource) },
    );
}

fn context_to_rhai_map(context: &PermissionContext) -> Map {
    let mut map = Map::new();
    let mut state_map = Map::new();
    for (k, v) in context.state() {
        state_map.insert(k.as_str().into(), value_to_dynamic(v));
    }
    map.insert("_artifact_state".into(), Dynamic::from(state_map));
    let mut metadata_map = Map::new();
    for (k, v) in context.metadata() {
        metadata_map.insert(k.as_str().into(), value_to_dynamic(v));
    }
    map.insert("target_metadata".into(), Dynamic::from(metadata_map));
    map.insert(
        "target_created_by".into(),
        Dynamic::from(context.target_created_by.clone()),
    );
    if let Some(method) = &context.method {
        map.insert("method".into(), Dynamic::from(method.clone()));
    }
    if let Some(args) = &context.args {
        let items: rhai::Array = args.iter().map(value_to_dynamic).collect();
        map.insert("args".into(), Dynamic::from(items));
    }
    map
}

/// Converts a contract's return value to a [`PermissionResult`]. A plain
/// boolean is accepted as shorthand for `{allowed: bool}`. Anything else
/// (non-map, missing `allowed`) denies.
fn dynamic_to_result(value: Dynamic) -> PermissionResult {
    if let Ok(b) = value.as_bool() {
        return PermissionResult {
            allowed: b,
            reason: "contract returned bare boolean".to_string(),
            ..Default::default()
        };
    }
    let Some(map) = value.try_cast::<Map>() else {
        return PermissionResult::deny("contract returned a non-map, non-bool value");
    };
    let allowed = map
        .get("allowed")
        .and_then(|v| v.clone().as_bool().ok())
        .unwrap_or(false);
    let reason = map
        .get("reason")
        .and_then(|v| v.clone().into_string().ok())
        .unwrap_or_else(|| "(contract omitted reason)".to_string());
    let scrip_cost = map
        .get("scrip_cost")
        .and_then(|v| v.as_int().ok())
        .map(|v| v.max(0) as u64)
        .unwrap_or(0);
    let scrip_payer = map
        .get("scrip_payer")
        .and_then(|v| v.clone().into_string().ok());
    let scrip_recipient = map
        .get("scrip_recipient")
        .and_then(|v| v.clone().into_string().ok());
    let resource_payer = map
        .get("resource_payer")
        .and_then(|v| v.clone().into_string().ok());
    let state_updates = map
        .get("state_updates")
        .and_then(|v| v.clone().try_cast::<Map>().map(|m| map_to_json(&m)));

    PermissionResult {
        allowed,
        reason,
        scrip_cost,
        scrip_payer,
        scrip_recipient,
        resource_payer,
        state_updates,
        conditions: None,
    }
}
