//! Reserved identifiers the kernel contracts and genesis proxies occupy.

pub const KERNEL_CONTRACT_FREEWARE: &str = "kernel_contract_freeware";
pub const KERNEL_CONTRACT_TRANSFERABLE_FREEWARE: &str = "kernel_contract_transferable_freeware";
pub const KERNEL_CONTRACT_SELF_OWNED: &str = "kernel_contract_self_owned";
pub const KERNEL_CONTRACT_PRIVATE: &str = "kernel_contract_private";
pub const KERNEL_CONTRACT_PUBLIC: &str = "kernel_contract_public";

/// Default fallback contract id used when an artifact's `access_contract_id`
/// is dangling.
pub const DEFAULT_DANGLING_FALLBACK: &str = KERNEL_CONTRACT_FREEWARE;

/// Default recursion bounds for nested permission checks and invoke chains.
pub const DEFAULT_MAX_CONTRACT_DEPTH: u32 = 10;
pub const DEFAULT_MAX_INVOKE_DEPTH: u32 = 10;

/// Reserved metadata keys agents may not set directly via an update.
pub const RESERVED_METADATA_KEYS: &[&str] = &["authorized_writer", "authorized_principal"];
