//! The five built-in kernel contracts. Immutable, not stored as artifacts,
//! referenced by a reserved id. Authorization reads only
//! `context["_artifact_state"]`, never `created_by`.

use kernel_core::constants::{
    KERNEL_CONTRACT_FREEWARE, KERNEL_CONTRACT_PRIVATE, KERNEL_CONTRACT_PUBLIC,
    KERNEL_CONTRACT_SELF_OWNED, KERNEL_CONTRACT_TRANSFERABLE_FREEWARE,
};
use kernel_core::PermissionAction;

use crate::context::PermissionContext;
use crate::permission::PermissionResult;

/// The fixed set of built-in contract policies.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KernelContractKind {
    Freeware,
    TransferableFreeware,
    SelfOwned,
    Private,
    Public,
}

impl KernelContractKind {
    pub fn from_id(id: &str) -> Option<Self> {
        match id {
            KERNEL_CONTRACT_FREEWARE => Some(Self::Freeware),
            KERNEL_CONTRACT_TRANSFERABLE_FREEWARE => Some(Self::TransferableFreeware),
            KERNEL_CONTRACT_SELF_OWNED => Some(Self::SelfOwned),
            KERNEL_CONTRACT_PRIVATE => Some(Self::Private),
            KERNEL_CONTRACT_PUBLIC => Some(Self::Public),
            _ => None,
        }
    }

    pub fn contract_id(&self) -> &'static str {
        match self {
            Self::Freeware => KERNEL_CONTRACT_FREEWARE,
            Self::TransferableFreeware => KERNEL_CONTRACT_TRANSFERABLE_FREEWARE,
            Self::SelfOwned => KERNEL_CONTRACT_SELF_OWNED,
            Self::Private => KERNEL_CONTRACT_PRIVATE,
            Self::Public => KERNEL_CONTRACT_PUBLIC,
        }
    }

    pub fn check_permission(
        &self,
        caller: &str,
        action: PermissionAction,
        target: &str,
        context: &PermissionContext,
    ) -> PermissionResult {
        match self {
            Self::Freeware => freeware_check(caller, action, context, "freeware"),
            Self::TransferableFreeware => {
                freeware_check(caller, action, context, "transferable_freeware")
            }
            Self::SelfOwned => self_owned_check(caller, action, target, context),
            Self::Private => private_check(caller, action, context),
            Self::Public => PermissionResult::allow("public: true commons"),
        }
    }
}

fn freeware_check(
    caller: &str,
    action: PermissionAction,
    context: &PermissionContext,
    label: &str,
) -> PermissionResult {
    let writer = context.state_field("writer").and_then(|v| v.as_str());
    match action {
        PermissionAction::Read | PermissionAction::Invoke => {
            PermissionResult::allow(format!("{label}: open access"))
                .with_scrip_recipient(writer.map(|w| w.to_string()))
        }
        PermissionAction::Write | PermissionAction::Edit | PermissionAction::Delete => {
            match writer {
                None => PermissionResult::deny(format!("{label}: no writer in state")),
                Some(writer) if writer == caller => {
                    PermissionResult::allow(format!("{label}: authorized writer"))
                        .with_scrip_recipient(Some(writer.to_string()))
                }
                Some(_) => PermissionResult::deny(format!("{label}: only writer can modify")),
            }
        }
    }
}

fn self_owned_check(
    caller: &str,
    action: PermissionAction,
    target: &str,
    context: &PermissionContext,
) -> PermissionResult {
    let principal = context.state_field("principal").and_then(|v| v.as_str());
    if caller == target {
        return PermissionResult::allow("self_owned: self access");
    }
    match (action, principal) {
        (_, Some(principal)) if principal == caller => {
            PermissionResult::allow("self_owned: authorized principal")
        }
        _ => PermissionResult::deny("self_owned: caller is neither self nor principal"),
    }
}

fn private_check(
    caller: &str,
    _action: PermissionAction,
    context: &PermissionContext,
) -> PermissionResult {
    let principal = context.state_field("principal").and_then(|v| v.as_str());
    match principal {
        Some(principal) if principal == caller => {
            PermissionResult::allow("private: authorized principal")
        }
        _ => PermissionResult::deny("private: caller is not the authorized principal"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn ctx_with_state(field: &str, value: &str) -> PermissionContext {
        let mut state = HashMap::new();
        state.insert(field.to_string(), serde_json::Value::String(value.to_string()));
        PermissionContext::new(state, HashMap::new(), "someone".into())
    }

    #[test]
    fn freeware_allows_read_for_anyone() {
        let ctx = ctx_with_state("writer", "alice");
        let result =
            KernelContractKind::Freeware.check_permission("bob", PermissionAction::Read, "art", &ctx);
        assert!(result.allowed);
        assert_eq!(result.scrip_recipient.as_deref(), Some("alice"));
    }

    #[test]
    fn freeware_denies_write_for_non_writer() {
        let ctx = ctx_with_state("writer", "alice");
        let result =
            KernelContractKind::Freeware.check_permission("bob", PermissionAction::Write, "art", &ctx);
        assert!(!result.allowed);
    }

    #[test]
    fn freeware_denies_write_with_no_writer_set() {
        let ctx = PermissionContext::new(HashMap::new(), HashMap::new(), "someone".into());
        let result = KernelContractKind::Freeware.check_permission(
            "bob",
            PermissionAction::Write,
            "art",
            &ctx,
        );
        assert!(!result.allowed);
    }

    #[test]
    fn private_denies_even_self_access() {
        let ctx = ctx_with_state("principal", "alice");
        let result =
            KernelContractKind::Private.check_permission("art", PermissionAction::Read, "art", &ctx);
        assert!(!result.allowed);
    }

    #[test]
    fn self_owned_allows_artifact_to_access_itself() {
        let ctx = ctx_with_state("principal", "alice");
        let result = KernelContractKind::SelfOwned.check_permission(
            "art",
            PermissionAction::Write,
            "art",
            &ctx,
        );
        assert!(result.allowed);
    }

    #[test]
    fn public_allows_everything() {
        let ctx = PermissionContext::new(HashMap::new(), HashMap::new(), "someone".into());
        for action in [
            PermissionAction::Read,
            PermissionAction::Write,
            PermissionAction::Edit,
            PermissionAction::Invoke,
            PermissionAction::Delete,
        ] {
            let result = KernelContractKind::Public.check_permission("anyone", action, "art", &ctx);
            assert!(result.allowed);
        }
    }
}
