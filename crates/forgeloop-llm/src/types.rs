//! Core types for the backend abstraction

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::time::Duration;

use forgeloop_utils::error::CollaboratorError;

/// Role of a message in a conversation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    System,
    User,
    Assistant,
}

impl Role {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::System => "system",
            Self::User => "user",
            Self::Assistant => "assistant",
        }
    }
}

/// A single chat message
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Message {
    pub role: Role,
    pub content: String,
}

impl Message {
    #[must_use]
    pub fn new(role: Role, content: impl Into<String>) -> Self {
        Self {
            role,
            content: content.into(),
        }
    }

    #[must_use]
    pub fn system(content: impl Into<String>) -> Self {
        Self::new(Role::System, content)
    }

    #[must_use]
    pub fn user(content: impl Into<String>) -> Self {
        Self::new(Role::User, content)
    }
}

/// Input to a backend invocation
#[derive(Debug, Clone)]
pub struct LlmInvocation {
    /// Model to use; empty means the backend's default
    pub model: String,
    pub temperature: f32,
    pub timeout: Duration,
    pub messages: Vec<Message>,
}

impl LlmInvocation {
    #[must_use]
    pub fn new(
        model: impl Into<String>,
        temperature: f32,
        timeout: Duration,
        messages: Vec<Message>,
    ) -> Self {
        Self {
            model: model.into(),
            temperature,
            timeout,
            messages,
        }
    }

    /// Content of the last user message, if any
    #[must_use]
    pub fn user_prompt(&self) -> Option<&str> {
        self.messages
            .iter()
            .rev()
            .find(|m| m.role == Role::User)
            .map(|m| m.content.as_str())
    }
}

/// Result of a backend invocation
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LlmResult {
    pub raw_response: String,
    pub provider: String,
    pub model_used: String,
    pub tokens_input: Option<u64>,
    pub tokens_output: Option<u64>,
}

impl LlmResult {
    #[must_use]
    pub fn new(
        raw_response: impl Into<String>,
        provider: impl Into<String>,
        model_used: impl Into<String>,
    ) -> Self {
        Self {
            raw_response: raw_response.into(),
            provider: provider.into(),
            model_used: model_used.into(),
            tokens_input: None,
            tokens_output: None,
        }
    }
}

/// A chat-completion endpoint.
///
/// Every provider implements this trait so collaborators can be bound to
/// any of them without knowing transport details.
#[async_trait]
pub trait LlmBackend: Send + Sync {
    /// Provider name used in logs and `Collaborator::info()`
    fn provider(&self) -> &str;

    /// Invoke the model.
    ///
    /// # Errors
    ///
    /// `Unavailable` when the endpoint cannot be reached, `Timeout` when the
    /// invocation exceeds `inv.timeout`, and provider-specific variants for
    /// HTTP-level failures.
    async fn invoke(&self, inv: LlmInvocation) -> Result<LlmResult, CollaboratorError>;
}
