//! The LLM provider collaborator (spec §6): the core depends on a trait
//! with this shape but ships no real backend — callers wire in whichever
//! provider they use. Two reference implementations ship here for
//! testability, matching the corpus's pattern of a trait plus a couple of
//! concrete stand-ins.

use async_trait::async_trait;
use kernel_core::KernelError;

#[derive(Debug, Clone)]
pub struct LlmMessage {
    pub role: String,
    pub content: String,
}

impl LlmMessage {
    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: "user".to_string(),
            content: content.into(),
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct TokenUsage {
    pub prompt_tokens: u64,
    pub completion_tokens: u64,
    pub total_tokens: u64,
}

#[derive(Debug, Clone)]
pub struct LlmResponse {
    pub content: String,
    pub usage: TokenUsage,
    /// Cost in the same resource unit the caller's `llm_budget` is tracked
    /// in — debited by the syscall_llm host callback on success.
    pub cost: f64,
    pub model: String,
}

#[async_trait]
pub trait LlmProvider: Send + Sync {
    async fn complete(
        &self,
        model: &str,
        messages: Vec<LlmMessage>,
        options: Option<serde_json::Value>,
    ) -> Result<LlmResponse, KernelError>;
}

/// Always errors — the default for hosts that haven't wired up a real
/// provider yet, so `can_call_llm` artifacts fail loudly instead of
/// silently succeeding with nonsense output.
#[derive(Debug, Default)]
pub struct NullLlmProvider;

#[async_trait]
impl LlmProvider for NullLlmProvider {
    async fn complete(
        &self,
        _model: &str,
        _messages: Vec<LlmMessage>,
        _options: Option<serde_json::Value>,
    ) -> Result<LlmResponse, KernelError> {
        Err(KernelError::not_authorized("no LLM provider configured"))
    }
}

/// Returns a fixed response regardless of input, for tests exercising the
/// `syscall_llm` path without a real completion backend.
pub struct StaticLlmProvider {
    pub response: String,
    pub cost: f64,
}

impl StaticLlmProvider {
    pub fn new(response: impl Into<String>, cost: f64) -> Self {
        Self {
            response: response.into(),
            cost,
        }
    }
}

#[async_trait]
impl LlmProvider for StaticLlmProvider {
    async fn complete(
        &self,
        model: &str,
        messages: Vec<LlmMessage>,
        _options: Option<serde_json::Value>,
    ) -> Result<LlmResponse, KernelError> {
        let prompt_tokens = messages.iter().map(|m| m.content.len() as u64).sum();
        Ok(LlmResponse {
            content: self.response.clone(),
            usage: TokenUsage {
                prompt_tokens,
                completion_tokens: self.response.len() as u64,
                total_tokens: prompt_tokens + self.response.len() as u64,
            },
            cost: self.cost,
            model: model.to_string(),
        })
    }
}
