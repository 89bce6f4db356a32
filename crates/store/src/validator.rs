//! The seam between the artifact store and the sandbox: executable
//! artifacts have their code validated and their entry points discovered
//! through this trait rather than by the store parsing code itself.
//!
//! `kernel-store` is a dependency leaf and must not depend on `kernel-vm`,
//! so validation is expressed as a trait the store calls through; the host
//! (`kernel-world`) wires a `kernel-vm` implementation in.

use kernel_core::KernelError;

/// Result of validating an executable artifact's source.
#[derive(Debug, Clone, Default)]
pub struct ValidatedCode {
    /// Top-level entry points discovered in the source (e.g. `run`,
    /// `handle_request`, `check_permission`, `describe`).
    pub entry_points: Vec<String>,
}

pub trait CodeValidator: Send + Sync {
    /// Compiles `code` under the sandbox's restricted grammar without
    /// executing it, returning the entry points it defines. Returns
    /// `KernelError::SyntaxError` on a compile failure.
    fn validate(&self, code: &str) -> Result<ValidatedCode, KernelError>;
}

/// A permissive validator for tests and hosts that don't need real sandbox
/// compilation: every entry point name present verbatim in the source is
/// reported, with no actual parsing. Never use this where `code` is
/// untrusted.
#[derive(Debug, Default)]
pub struct PermissiveValidator;

impl CodeValidator for PermissiveValidator {
    fn validate(&self, code: &str) -> Result<ValidatedCode, KernelError> {
        let mut entry_points = Vec::new();
        for candidate in ["run", "handle_request", "check_permission", "describe"] {
            if code.contains(&format!("fn {candidate}")) {
                entry_points.push(candidate.to_string());
            }
        }
        Ok(ValidatedCode { entry_points })
    }
}
