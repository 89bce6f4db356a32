//! The contract engine and permission checker: resolves what governs an
//! artifact and evaluates whether a caller may act on it.

mod cache;
mod context;
mod engine;
mod executable;
mod kernel_contracts;
mod permission;

pub use cache::PermissionCache;
pub use context::PermissionContext;
pub use engine::{ContractEngine, DanglingPolicy};
pub use executable::ExecutableContract;
pub use kernel_contracts::KernelContractKind;
pub use permission::{PermissionResult, ReadOnlyLedger};
