//! The five kernel actions every artifact operation maps onto.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PermissionAction {
    Read,
    Write,
    Edit,
    Invoke,
    Delete,
}

impl PermissionAction {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Read => "read",
            Self::Write => "write",
            Self::Edit => "edit",
            Self::Invoke => "invoke",
            Self::Delete => "delete",
        }
    }

    /// Aliases the agent-facing intent names (`read_artifact`, …) onto the
    /// kernel action names before handing them to contract code.
    pub fn from_agent_facing(name: &str) -> Option<Self> {
        match name {
            "read" | "read_artifact" => Some(Self::Read),
            "write" | "write_artifact" => Some(Self::Write),
            "edit" | "edit_artifact" => Some(Self::Edit),
            "invoke" | "invoke_artifact" => Some(Self::Invoke),
            "delete" | "delete_artifact" => Some(Self::Delete),
            _ => None,
        }
    }
}
