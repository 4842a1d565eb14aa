//! Ollama backend (`POST {host}/api/chat`, non-streaming)

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::debug;

use forgeloop_config::CollaboratorBinding;
use forgeloop_utils::error::CollaboratorError;

use crate::http_client::HttpClient;
use crate::types::{LlmBackend, LlmInvocation, LlmResult, Message};

const PROVIDER: &str = "ollama";

pub struct OllamaBackend {
    client: HttpClient,
    endpoint: String,
    default_model: String,
}

impl OllamaBackend {
    pub fn new(host: &str, default_model: impl Into<String>) -> Result<Self, CollaboratorError> {
        Ok(Self {
            client: HttpClient::new()?,
            endpoint: chat_endpoint(host),
            default_model: default_model.into(),
        })
    }

    pub fn new_from_binding(binding: &CollaboratorBinding) -> Result<Self, CollaboratorError> {
        if binding.host.trim().is_empty() {
            return Err(CollaboratorError::Misconfiguration(format!(
                "no host configured for the {} collaborator",
                binding.role
            )));
        }
        Self::new(&binding.host, binding.model.clone())
    }

    fn resolve_model(&self, inv: &LlmInvocation) -> String {
        if inv.model.is_empty() {
            self.default_model.clone()
        } else {
            inv.model.clone()
        }
    }
}

fn chat_endpoint(host: &str) -> String {
    let trimmed = host.trim_end_matches('/');
    if trimmed.ends_with("/api/chat") {
        trimmed.to_string()
    } else {
        format!("{trimmed}/api/chat")
    }
}

#[async_trait]
impl LlmBackend for OllamaBackend {
    fn provider(&self) -> &str {
        PROVIDER
    }

    async fn invoke(&self, inv: LlmInvocation) -> Result<LlmResult, CollaboratorError> {
        let model = self.resolve_model(&inv);

        debug!(
            provider = PROVIDER,
            model = %model,
            temperature = inv.temperature,
            timeout_secs = inv.timeout.as_secs(),
            "Invoking Ollama backend"
        );

        let body = ChatRequest {
            model: &model,
            messages: &inv.messages,
            stream: false,
            options: ChatOptions {
                temperature: inv.temperature,
            },
        };

        let request = self.client.client().post(&self.endpoint).json(&body);
        let response = self
            .client
            .execute_with_retry(request, inv.timeout, PROVIDER)
            .await?;

        let text = response.text().await.map_err(|e| {
            CollaboratorError::Unavailable(format!("failed to read Ollama response: {e}"))
        })?;
        let parsed: ChatResponse = serde_json::from_str(&text).map_err(|e| {
            CollaboratorError::malformed(format!("unexpected Ollama response shape: {e}"), &text)
        })?;

        let mut result = LlmResult::new(parsed.message.content, PROVIDER, model);
        result.tokens_input = parsed.prompt_eval_count;
        result.tokens_output = parsed.eval_count;

        debug!(
            provider = PROVIDER,
            tokens_input = ?result.tokens_input,
            tokens_output = ?result.tokens_output,
            "Ollama invocation completed"
        );

        Ok(result)
    }
}

#[derive(Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: &'a [Message],
    stream: bool,
    options: ChatOptions,
}

#[derive(Serialize)]
struct ChatOptions {
    temperature: f32,
}

#[derive(Deserialize)]
struct ChatResponse {
    message: ResponseMessage,
    prompt_eval_count: Option<u64>,
    eval_count: Option<u64>,
}

#[derive(Deserialize)]
struct ResponseMessage {
    content: String,
}
