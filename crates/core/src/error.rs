//! Error taxonomy for the agent-economy kernel.
//!
//! A single [`KernelError`] enum carries every failure mode produced by the
//! kernel's components. Each variant maps to one wire-level [`ErrorCode`]
//! and [`ErrorCategory`] so that callers can branch on `error.code()` /
//! `error.category()` without downcasting.

use thiserror::Error;

/// Coarse error category, mirrored on the wire as `ActionResult.error_category`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorCategory {
    Permission,
    Resource,
    Validation,
    Execution,
}

/// Specific wire error code, mirrored on the wire as `ActionResult.error_code`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorCode {
    NotFound,
    NotAuthorized,
    InsufficientFunds,
    QuotaExceeded,
    InvalidArgument,
    InvalidType,
    SyntaxError,
    RuntimeError,
    Timeout,
    Deleted,
    RateLimited,
}

/// Every fallible operation in the kernel returns `Result<T, KernelError>`.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum KernelError {
    #[error("not found: {what}")]
    NotFound { what: String },

    #[error("not authorized: {reason}")]
    NotAuthorized { reason: String },

    #[error("insufficient funds: required {required}, available {available}")]
    InsufficientFunds { required: String, available: String },

    #[error("quota exceeded for {resource}: required {required}, available {available}")]
    QuotaExceeded {
        resource: String,
        required: String,
        available: String,
    },

    #[error("invalid argument: {message}")]
    InvalidArgument { message: String },

    #[error("invalid type: expected {expected}, got {got}")]
    InvalidType { expected: String, got: String },

    #[error("syntax error: {message}")]
    SyntaxError { message: String },

    #[error("runtime error: {message}")]
    RuntimeError { message: String },

    #[error("execution timed out after {elapsed_ms}ms (limit {limit_ms}ms)")]
    Timeout { elapsed_ms: u64, limit_ms: u64 },

    #[error("artifact {id} is deleted")]
    Deleted { id: String },

    #[error("rate limited: {resource}, retry after {retry_after_ms}ms")]
    RateLimited {
        resource: String,
        retry_after_ms: u64,
    },

    #[error("id collision: {id} is already registered")]
    IdCollision { id: String },

    #[error("recursion depth exceeded: {kind} depth {depth} exceeds max {max}")]
    DepthExceeded {
        kind: String,
        depth: u32,
        max: u32,
    },
}

impl KernelError {
    pub fn not_found(what: impl Into<String>) -> Self {
        Self::NotFound { what: what.into() }
    }

    pub fn not_authorized(reason: impl Into<String>) -> Self {
        Self::NotAuthorized {
            reason: reason.into(),
        }
    }

    pub fn invalid_argument(message: impl Into<String>) -> Self {
        Self::InvalidArgument {
            message: message.into(),
        }
    }

    pub fn code(&self) -> ErrorCode {
        match self {
            Self::NotFound { .. } => ErrorCode::NotFound,
            Self::NotAuthorized { .. } => ErrorCode::NotAuthorized,
            Self::InsufficientFunds { .. } => ErrorCode::InsufficientFunds,
            Self::QuotaExceeded { .. } => ErrorCode::QuotaExceeded,
            Self::InvalidArgument { .. } => ErrorCode::InvalidArgument,
            Self::InvalidType { .. } => ErrorCode::InvalidType,
            Self::SyntaxError { .. } => ErrorCode::SyntaxError,
            Self::RuntimeError { .. } => ErrorCode::RuntimeError,
            Self::Timeout { .. } => ErrorCode::Timeout,
            Self::Deleted { .. } => ErrorCode::Deleted,
            Self::RateLimited { .. } => ErrorCode::RateLimited,
            // Not part of the wire taxonomy directly, but closest fit.
            Self::IdCollision { .. } => ErrorCode::InvalidArgument,
            Self::DepthExceeded { .. } => ErrorCode::NotAuthorized,
        }
    }

    pub fn category(&self) -> ErrorCategory {
        match self {
            Self::NotFound { .. } | Self::Deleted { .. } => ErrorCategory::Validation,
            Self::NotAuthorized { .. } | Self::DepthExceeded { .. } => ErrorCategory::Permission,
            Self::InsufficientFunds { .. }
            | Self::QuotaExceeded { .. }
            | Self::RateLimited { .. } => ErrorCategory::Resource,
            Self::InvalidArgument { .. } | Self::InvalidType { .. } | Self::SyntaxError { .. } => {
                ErrorCategory::Validation
            }
            Self::RuntimeError { .. } | Self::Timeout { .. } => ErrorCategory::Execution,
            Self::IdCollision { .. } => ErrorCategory::Validation,
        }
    }

    /// Whether a caller can expect a retry (possibly after changing nothing
    /// but timing/funding) to succeed.
    pub fn retriable(&self) -> bool {
        match self {
            Self::InsufficientFunds { .. }
            | Self::QuotaExceeded { .. }
            | Self::RateLimited { .. }
            | Self::Timeout { .. } => true,
            _ => false,
        }
    }
}
