//! The five kernel action intents plus the self-modification intents an
//! agent-type artifact issues against its own record, and the uniform
//! result shape every intent produces.

use std::collections::HashMap;

use kernel_core::{ErrorCategory, ErrorCode, KernelError};
use serde_json::Value;

/// One principal's request against the world. Every variant carries
/// `principal_id` and a `reasoning` string for observability (may be
/// empty); intent-specific fields follow.
#[derive(Debug, Clone)]
pub enum ActionIntent {
    Noop {
        principal_id: String,
        reasoning: String,
    },
    Read {
        principal_id: String,
        reasoning: String,
        artifact_id: String,
    },
    Write {
        principal_id: String,
        reasoning: String,
        artifact_id: Option<String>,
        kind: String,
        content: String,
        executable: bool,
        code: String,
        price: u64,
        access_contract_id: Option<String>,
        capabilities: Vec<String>,
    },
    Edit {
        principal_id: String,
        reasoning: String,
        artifact_id: String,
        old_string: String,
        new_string: String,
    },
    Invoke {
        principal_id: String,
        reasoning: String,
        artifact_id: String,
        method: String,
        args: Vec<Value>,
    },
    Delete {
        principal_id: String,
        reasoning: String,
        artifact_id: String,
    },
    Subscribe {
        principal_id: String,
        reasoning: String,
        artifact_id: String,
        trigger: String,
    },
    Unsubscribe {
        principal_id: String,
        reasoning: String,
        artifact_id: String,
        trigger: String,
    },
    ConfigureContext {
        principal_id: String,
        reasoning: String,
        artifact_id: String,
        context: Value,
    },
    ModifySystemPrompt {
        principal_id: String,
        reasoning: String,
        artifact_id: String,
        prompt: String,
    },
    UpdateMetadata {
        principal_id: String,
        reasoning: String,
        artifact_id: String,
        updates: HashMap<String, Value>,
    },
}

impl ActionIntent {
    pub fn principal_id(&self) -> &str {
        match self {
            Self::Noop { principal_id, .. }
            | Self::Read { principal_id, .. }
            | Self::Write { principal_id, .. }
            | Self::Edit { principal_id, .. }
            | Self::Invoke { principal_id, .. }
            | Self::Delete { principal_id, .. }
            | Self::Subscribe { principal_id, .. }
            | Self::Unsubscribe { principal_id, .. }
            | Self::ConfigureContext { principal_id, .. }
            | Self::ModifySystemPrompt { principal_id, .. }
            | Self::UpdateMetadata { principal_id, .. } => principal_id,
        }
    }

    pub fn kind_name(&self) -> &'static str {
        match self {
            Self::Noop { .. } => "noop",
            Self::Read { .. } => "read",
            Self::Write { .. } => "write",
            Self::Edit { .. } => "edit",
            Self::Invoke { .. } => "invoke",
            Self::Delete { .. } => "delete",
            Self::Subscribe { .. } => "subscribe",
            Self::Unsubscribe { .. } => "unsubscribe",
            Self::ConfigureContext { .. } => "configure_context",
            Self::ModifySystemPrompt { .. } => "modify_system_prompt",
            Self::UpdateMetadata { .. } => "update_metadata",
        }
    }
}

fn require_str(data: &Value, field: &str) -> Result<String, String> {
    data.get(field)
        .and_then(|v| v.as_str())
        .map(|s| s.to_string())
        .ok_or_else(|| format!("{field} is required and must be a string"))
}

/// Parses a JSON-origin intent, aliasing agent-facing `action_type` names
/// onto [`ActionIntent`] variants. Returns a human-readable error string on
/// a malformed or unknown shape rather than panicking — callers turn that
/// into an `ActionResult::from_error` themselves.
pub fn parse_intent_from_json(principal_id: &str, data: &Value) -> Result<ActionIntent, String> {
    let action_type = data
        .get("action_type")
        .and_then(|v| v.as_str())
        .unwrap_or_default()
        .to_lowercase();
    let reasoning = data
        .get("reasoning")
        .and_then(|v| v.as_str())
        .unwrap_or_default()
        .to_string();
    let principal_id = principal_id.to_string();

    match action_type.as_str() {
        "noop" => Ok(ActionIntent::Noop { principal_id, reasoning }),
        "read" | "read_artifact" => Ok(ActionIntent::Read {
            principal_id,
            reasoning,
            artifact_id: require_str(data, "artifact_id")?,
        }),
        "write" | "write_artifact" => {
            let executable = data.get("executable").and_then(|v| v.as_bool()).unwrap_or(false);
            let code = data.get("code").and_then(|v| v.as_str()).unwrap_or_default().to_string();
            if executable && code.is_empty() {
                return Err("executable artifact requires 'code' with a run() function".to_string());
            }
            Ok(ActionIntent::Write {
                principal_id,
                reasoning,
                artifact_id: data.get("artifact_id").and_then(|v| v.as_str()).map(String::from),
                kind: data.get("kind").and_then(|v| v.as_str()).unwrap_or("generic").to_string(),
                content: data.get("content").and_then(|v| v.as_str()).unwrap_or_default().to_string(),
                executable,
                code,
                price: data.get("price").and_then(|v| v.as_u64()).unwrap_or(0),
                access_contract_id: data
                    .get("access_contract_id")
                    .and_then(|v| v.as_str())
                    .map(String::from),
                capabilities: data
                    .get("capabilities")
                    .and_then(|v| v.as_array())
                    .map(|arr| arr.iter().filter_map(|c| c.as_str().map(String::from)).collect())
                    .unwrap_or_default(),
            })
        }
        "edit" | "edit_artifact" => Ok(ActionIntent::Edit {
            principal_id,
            reasoning,
            artifact_id: require_str(data, "artifact_id")?,
            old_string: require_str(data, "old_string")?,
            new_string: require_str(data, "new_string")?,
        }),
        "invoke" | "invoke_artifact" => {
            let args = match data.get("args") {
                Some(Value::Array(arr)) => arr.clone(),
                Some(_) => return Err("'args' must be a list".to_string()),
                None => Vec::new(),
            };
            Ok(ActionIntent::Invoke {
                principal_id,
                reasoning,
                artifact_id: require_str(data, "artifact_id")?,
                method: require_str(data, "method")?,
                args,
            })
        }
        "delete" | "delete_artifact" => Ok(ActionIntent::Delete {
            principal_id,
            reasoning,
            artifact_id: require_str(data, "artifact_id")?,
        }),
        "subscribe" => Ok(ActionIntent::Subscribe {
            principal_id,
            reasoning,
            artifact_id: require_str(data, "artifact_id")?,
            trigger: require_str(data, "trigger")?,
        }),
        "unsubscribe" => Ok(ActionIntent::Unsubscribe {
            principal_id,
            reasoning,
            artifact_id: require_str(data, "artifact_id")?,
            trigger: require_str(data, "trigger")?,
        }),
        "configure_context" => Ok(ActionIntent::ConfigureContext {
            principal_id,
            reasoning,
            artifact_id: require_str(data, "artifact_id")?,
            context: data.get("context").cloned().unwrap_or(Value::Null),
        }),
        "modify_system_prompt" => Ok(ActionIntent::ModifySystemPrompt {
            principal_id,
            reasoning,
            artifact_id: require_str(data, "artifact_id")?,
            prompt: require_str(data, "prompt")?,
        }),
        "update_metadata" => {
            let updates = match data.get("updates") {
                Some(Value::Object(map)) => map.clone().into_iter().collect(),
                _ => return Err("'updates' must be an object".to_string()),
            };
            Ok(ActionIntent::UpdateMetadata {
                principal_id,
                reasoning,
                artifact_id: require_str(data, "artifact_id")?,
                updates,
            })
        }
        other => Err(format!(
            "unknown action_type: {other}. Valid types: noop, read, write, edit, invoke, delete, \
             subscribe, unsubscribe, configure_context, modify_system_prompt, update_metadata"
        )),
    }
}

/// The uniform shape every intent produces, designed so a caller can react
/// to an error programmatically (`error_code`), decide whether to retry
/// (`retriable`), and write a compact log via [`ActionResult::to_log_value`].
#[derive(Debug, Clone)]
pub struct ActionResult {
    pub success: bool,
    pub message: String,
    pub data: Option<Value>,
    pub resources_consumed: Option<HashMap<String, f64>>,
    pub charged_to: Option<String>,
    pub error_code: Option<ErrorCode>,
    pub error_category: Option<ErrorCategory>,
    pub retriable: bool,
    pub error_details: Option<Value>,
}

/// Log entries are capped so a runaway `data` payload (e.g. a large read)
/// never dominates the event stream.
const LOG_MESSAGE_TRUNCATE: usize = 500;

impl ActionResult {
    pub fn success(message: impl Into<String>, data: Option<Value>) -> Self {
        Self {
            success: true,
            message: message.into(),
            data,
            resources_consumed: None,
            charged_to: None,
            error_code: None,
            error_category: None,
            retriable: false,
            error_details: None,
        }
    }

    pub fn with_resources_consumed(mut self, resources: HashMap<String, f64>) -> Self {
        self.resources_consumed = Some(resources);
        self
    }

    pub fn with_charged_to(mut self, charged_to: impl Into<String>) -> Self {
        self.charged_to = Some(charged_to.into());
        self
    }

    /// Builds a failure result from a [`KernelError`], deriving
    /// `error_code`/`error_category`/`retriable` from the error itself so
    /// callers never hand-roll the mapping twice.
    pub fn from_error(err: &KernelError) -> Self {
        Self {
            success: false,
            message: err.to_string(),
            data: None,
            resources_consumed: None,
            charged_to: None,
            error_code: Some(err.code()),
            error_category: Some(err.category()),
            retriable: err.retriable(),
            error_details: None,
        }
    }

    pub fn with_error_details(mut self, details: Value) -> Self {
        self.error_details = Some(details);
        self
    }

    /// A compact representation suitable for the event log: `data` is
    /// dropped (it can be arbitrarily large) and `message` is truncated.
    pub fn to_log_value(&self) -> Value {
        let mut message = self.message.clone();
        if message.len() > LOG_MESSAGE_TRUNCATE {
            message.truncate(LOG_MESSAGE_TRUNCATE);
            message.push_str("...[truncated]");
        }
        serde_json::json!({
            "success": self.success,
            "message": message,
            "charged_to": self.charged_to,
            "error_code": self.error_code.map(|c| format!("{c:?}")),
            "retriable": self.retriable,
        })
    }
}
