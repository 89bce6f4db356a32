//! Real code validation for executable artifacts: compiles the source under
//! the restricted grammar and reports the top-level functions it defines,
//! without running any of it.

use kernel_core::sandbox::{restricted_engine, SandboxLimits};
use kernel_core::KernelError;
use kernel_store::{CodeValidator, ValidatedCode};

#[derive(Debug, Default)]
pub struct RhaiCodeValidator;

impl CodeValidator for RhaiCodeValidator {
    fn validate(&self, code: &str) -> Result<ValidatedCode, KernelError> {
        let engine = restricted_engine(&SandboxLimits::standard());
        let ast = engine.compile(code).map_err(|e| KernelError::SyntaxError {
            message: e.to_string(),
        })?;
        let entry_points = ast
            .iter_functions()
            .map(|f| f.name.to_string())
            .collect();
        Ok(ValidatedCode { entry_points })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reports_defined_entry_points() {
        let validator = RhaiCodeValidator;
        let result = validator
            .validate("fn run(args) { args } fn describe() { \"a thing\" }")
            .unwrap();
        assert!(result.entry_points.contains(&"run".to_string()));
        assert!(result.entry_points.contains(&"describe".to_string()));
        assert!(!result.entry_points.contains(&"handle_request".to_string()));
    }

    #[test]
    fn rejects_unparseable_source() {
        let validator = RhaiCodeValidator;
        let err = validator.validate("fn run( {{{ not rhai").unwrap_err();
        assert!(matches!(err, KernelError::SyntaxError { .. }));
    }
}
