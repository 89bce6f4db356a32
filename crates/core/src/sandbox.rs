//! The restricted evaluator shared by the contract engine and the action
//! executor. Both embed the same curated `rhai` engine — a scripting
//! language with no filesystem, process, or module-resolution access by
//! default, which we additionally harden with explicit operation/call-depth
//! caps and a disabled `eval`.
//!
//! This lives in `kernel-core` rather than duplicated in either consumer,
//! since the contract engine sits upstream of the action executor in the
//! crate dependency graph and can't borrow a sandbox utility from it.

use std::time::Duration;

use rhai::Engine;

use crate::error::KernelError;

/// Resource caps applied to a single sandboxed evaluation.
#[derive(Debug, Clone, Copy)]
pub struct SandboxLimits {
    pub max_operations: u64,
    pub max_call_levels: usize,
    pub timeout: Duration,
}

impl SandboxLimits {
    /// Default timeout for ordinary contracts/artifacts.
    pub fn standard() -> Self {
        Self {
            max_operations: 200_000,
            max_call_levels: 64,
            timeout: Duration::from_millis(500),
        }
    }

    /// A longer timeout applies when the contract/artifact declares the
    /// `can_call_llm` capability, since it may block on a provider round
    /// trip via an injected syscall.
    pub fn llm_capable() -> Self {
        Self {
            timeout: Duration::from_secs(30),
            ..Self::standard()
        }
    }
}

/// Builds a fresh `rhai::Engine` with the kernel's restricted
/// configuration: no module resolver (disables `import`), `eval` removed,
/// the operation/call-depth ceilings from `limits` applied, and a wall-
/// clock deadline enforced via `on_progress` so a compute-bound loop is
/// interrupted mid-execution rather than merely abandoned on a leaked
/// thread.
pub fn restricted_engine(limits: &SandboxLimits) -> Engine {
    let mut engine = Engine::new();
    engine.set_max_operations(limits.max_operations);
    engine.set_max_call_levels(limits.max_call_levels);
    engine.set_max_expr_depths(64, 32);
    engine.set_max_string_size(1_000_000);
    engine.set_max_array_size(100_000);
    engine.set_max_map_size(100_000);
    // rhai ships with no filesystem/process/network API by default, and no
    // module resolver is registered, so `import` already fails; disabling
    // `eval` closes the one remaining way to run constructed-at-runtime
    // source.
    engine.disable_symbol("eval");

    let deadline = std::time::Instant::now() + limits.timeout;
    engine.on_progress(move |_ops_count| {
        if std::time::Instant::now() >= deadline {
            Some(rhai::Dynamic::UNIT)
        } else {
            None
        }
    });
    engine
}

/// Classifies a `rhai` evaluation error into the kernel's error taxonomy.
/// A sandbox error never silently permits — it always becomes a denial or
/// an execution error upstream.
pub fn classify_eval_error(err: &rhai::EvalAltResult) -> KernelError {
    use rhai::EvalAltResult::*;
    match err {
        ErrorParsing(..) => KernelError::SyntaxError {
            message: err.to_string(),
        },
        ErrorTooManyOperations(..) | ErrorStackOverflow(..) | ErrorTerminated(..) => {
            KernelError::Timeout {
                elapsed_ms: 0,
                limit_ms: 0,
            }
        }
        _ => KernelError::RuntimeError {
            message: err.to_string(),
        },
    }
}

/// Runs `f` (a synchronous `rhai` call) on a blocking task under a
/// wall-clock `timeout`, classifying the outcome into `KernelError`.
pub async fn run_with_timeout<T, F>(timeout: Duration, f: F) -> Result<T, KernelError>
where
    T: Send + 'static,
    F: FnOnce() -> Result<T, Box<rhai::EvalAltResult>> + Send + 'static,
{
    let started = std::time::Instant::now();
    match tokio::time::timeout(timeout, tokio::task::spawn_blocking(f)).await {
        Ok(Ok(Ok(value))) => Ok(value),
        Ok(Ok(Err(eval_err))) => Err(classify_eval_error(&eval_err)),
        Ok(Err(join_err)) => Err(KernelError::RuntimeError {
            message: join_err.to_string(),
        }),
        Err(_) => Err(KernelError::Timeout {
            elapsed_ms: started.elapsed().as_millis() as u64,
            limit_ms: timeout.as_millis() as u64,
        }),
    }
}
