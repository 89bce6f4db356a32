//! Compiles and runs an artifact's own code: the entry point an `invoke`
//! or a scheduled `run` ultimately reaches, with syscalls back into the
//! rest of the kernel injected as host functions.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Instant;

use cpu_time::ProcessTime;
use dashmap::DashMap;
use kernel_core::constants::DEFAULT_MAX_INVOKE_DEPTH;
use kernel_core::json_bridge::{dynamic_to_json, value_to_dynamic};
use kernel_core::sandbox::{restricted_engine, SandboxLimits};
use kernel_core::KernelError;
use kernel_store::Artifact;
use rhai::{Dynamic, Scope, AST};
use serde_json::Value;

use crate::host::{CapabilityManager, ExecutionHost};

/// What came back from a single execution. Resources are accounted for
/// regardless of whether `result` succeeded — spec §7 charges CPU/memory
/// for a failed execution just like a successful one, so the report keeps
/// them alongside the result rather than only on the `Ok` path.
#[derive(Debug, Clone)]
pub struct ExecutionReport {
    pub result: Result<Value, KernelError>,
    pub wall_time_ms: u64,
    /// Kernel resources consumed by this single call — `cpu_seconds`
    /// always present, `memory_bytes` present when the host platform
    /// exposes it. Distinct from LLM token spend, which the `syscall_llm`
    /// host callback meters separately against `llm_budget`.
    pub resources_consumed: HashMap<String, f64>,
}

pub struct ActionExecutor {
    host: Arc<dyn ExecutionHost>,
    capabilities: Arc<dyn CapabilityManager>,
    compiled: DashMap<String, (String, Arc<AST>)>,
}

impl ActionExecutor {
    pub fn new(host: Arc<dyn ExecutionHost>, capabilities: Arc<dyn CapabilityManager>) -> Self {
        Self {
            host,
            capabilities,
            compiled: DashMap::new(),
        }
    }

    /// Executes `entry_point` (`run`, `handle_request`, or any other
    /// function the artifact's code defines) with `args` JSON-normalized
    /// into the sandbox's value representation.
    pub async fn execute(
        &self,
        artifact: &Artifact,
        caller: &str,
        entry_point: &str,
        args: Vec<Value>,
        depth: u32,
    ) -> ExecutionReport {
        let started = Instant::now();
        let cpu_started = ProcessTime::now();
        let result = self
            .execute_inner(artifact, caller, entry_point, args, depth)
            .await;
        let cpu_seconds = cpu_started.elapsed().as_secs_f64();

        let mut resources_consumed = HashMap::new();
        resources_consumed.insert("cpu_seconds".to_string(), cpu_seconds);

        ExecutionReport {
            result,
            wall_time_ms: started.elapsed().as_millis() as u64,
            resources_consumed,
        }
    }

    async fn execute_inner(
        &self,
        artifact: &Artifact,
        caller: &str,
        entry_point: &str,
        args: Vec<Value>,
        depth: u32,
    ) -> Result<Value, KernelError> {
        if depth > DEFAULT_MAX_INVOKE_DEPTH {
            return Err(KernelError::DepthExceeded {
                kind: "invoke".to_string(),
                depth,
                max: DEFAULT_MAX_INVOKE_DEPTH,
            });
        }
        if !artifact.executable {
            return Err(KernelError::invalid_argument(format!(
                "artifact {} is not executable",
                artifact.id
            )));
        }
        if !artifact.entry_points.iter().any(|e| e == entry_point) {
            return Err(KernelError::not_found(format!(
                "entry point {entry_point} on artifact {}",
                artifact.id
            )));
        }

        let can_call_llm = artifact.capabilities.iter().any(|c| c == "can_call_llm")
            && self.capabilities.has_capability(caller, "can_call_llm");
        let limits = if can_call_llm {
            SandboxLimits::llm_capable()
        } else {
            SandboxLimits::standard()
        };

        let ast = self.get_or_compile(artifact)?;
        let host = self.host.clone();
        let self_id = artifact.id.clone();
        let entry_point = entry_point.to_string();
        let normalized_args: Vec<Value> = args.into_iter().map(normalize_json_string_arg).collect();
        let rhai_args: rhai::Array = normalized_args.iter().map(value_to_dynamic).collect();

        let outcome = kernel_core::sandbox::run_with_timeout(limits.timeout, move || {
            let mut engine = restricted_engine(&limits);
            register_syscalls(&mut engine, host, self_id.clone(), depth);
            let mut scope = Scope::new();
            engine.call_fn::<Dynamic>(&mut scope, &ast, &entry_point, (rhai_args,))
        })
        .await?;

        Ok(dynamic_to_json(&outcome))
    }

    fn get_or_compile(&self, artifact: &Artifact) -> Result<Arc<AST>, KernelError> {
        if let Some(entry) = self.compiled.get(&artifact.id) {
            if entry.0 == artifact.version {
                return Ok(entry.1.clone());
            }
        }
        let engine = restricted_engine(&SandboxLimits::standard());
        let ast = Arc::new(engine.compile(&artifact.code).map_err(|e| KernelError::SyntaxError {
            message: e.to_string(),
        })?);
        self.compiled
            .insert(artifact.id.clone(), (artifact.version.clone(), ast.clone()));
        Ok(ast)
    }
}

/// Auto-converts a string argument that parses as a JSON object or array
/// into the corresponding collection, so code can write `args[0]["key"]`
/// against a caller that only had a string to serialize. Non-JSON
/// strings, numbers, booleans, and non-string values pass through as-is;
/// a JSON string holding a bare number/bool/null is also left alone since
/// only object/array conversion is specified.
fn normalize_json_string_arg(value: Value) -> Value {
    match &value {
        Value::String(s) => match serde_json::from_str::<Value>(s) {
            Ok(parsed @ (Value::Object(_) | Value::Array(_))) => parsed,
            _ => value,
        },
        _ => value,
    }
}

/// Registers the `invoke`/`read_artifact`/`kernel_query`/`pay`/
/// `get_balance`/`syscall_llm` functions an artifact's code can call. Each
/// bridges the synchronous `rhai` call back onto the surrounding async
/// runtime via `block_on`, which is sound here because the engine itself
/// always runs inside a `spawn_blocking` task.
///
/// Every syscall identifies the *currently executing artifact* (`self_id`)
/// as the caller it hands to the host, not whoever invoked this artifact —
/// for a chain A → B → C, when B's code reaches out to C the host sees
/// caller = B. This is what gives nested permission checks and self-paid
/// syscalls (`pay`, `syscall_llm`) the chain semantics the permission
/// checker expects; billing back to the chain's original agent, when
/// wanted, is the contract's job via `resource_payer`/`scrip_payer`.
fn register_syscalls(
    engine: &mut rhai::Engine,
    host: Arc<dyn ExecutionHost>,
    self_id: String,
    depth: u32,
) {
    let h = host.clone();
    let c = self_id.clone();
    engine.register_fn("read_artifact", move |target_id: &str| -> Dynamic {
        let result = tokio::runtime::Handle::current().block_on(h.read_artifact(&c, target_id));
        match result {
            Ok(value) => value_to_dynamic(&value),
            Err(err) => Dynamic::from(err.to_string()),
        }
    });

    let h = host.clone();
    let c = self_id.clone();
    engine.register_fn(
        "invoke",
        move |target_id: &str, method: &str, raw_args: rhai::Array| -> Dynamic {
            let args: Vec<Value> = raw_args.iter().map(dynamic_to_json).collect();
            let result = tokio::runtime::Handle::current().block_on(h.invoke(
                &c,
                target_id,
                method,
                args,
                depth + 1,
            ));
            match result {
                Ok(value) => value_to_dynamic(&value),
                Err(err) => Dynamic::from(err.to_string()),
            }
        },
    );

    let h = host.clone();
    let c = self_id.clone();
    engine.register_fn(
        "kernel_query",
        move |query: &str, raw_args: rhai::Array| -> Dynamic {
            let args: Vec<Value> = raw_args.iter().map(dynamic_to_json).collect();
            let result =
                tokio::runtime::Handle::current().block_on(h.kernel_query(&c, query, args));
            match result {
                Ok(value) => value_to_dynamic(&value),
                Err(err) => Dynamic::from(err.to_string()),
            }
        },
    );

    let h = host.clone();
    let c = self_id.clone();
    engine.register_fn("pay", move |recipient: &str, amount: i64| -> bool {
        tokio::runtime::Handle::current()
            .block_on(h.pay(&c, recipient, amount))
            .is_ok()
    });

    let h = host.clone();
    engine.register_fn("get_balance", move |principal_id: &str| -> i64 {
        h.get_scrip_balance(principal_id)
    });

    let h = host.clone();
    engine.register_fn(
        "get_resource_balance",
        move |principal_id: &str, resource: &str| -> f64 { h.get_resource_balance(principal_id, resource) },
    );

    let h = host;
    let c = self_id;
    engine.register_fn("syscall_llm", move |prompt: &str| -> Dynamic {
        if !h.can_call_llm(&c) {
            return Dynamic::from("error: can_call_llm capability not held".to_string());
        }
        let result = tokio::runtime::Handle::current().block_on(h.syscall_llm(&c, prompt.to_string()));
        match result {
            Ok(text) => Dynamic::from(text),
            Err(err) => Dynamic::from(format!("error: {err}")),
        }
    });
}
