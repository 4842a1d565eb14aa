//! OpenAI-compatible chat-completions backend

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::debug;

use forgeloop_config::CollaboratorBinding;
use forgeloop_utils::error::CollaboratorError;

use crate::http_client::HttpClient;
use crate::types::{LlmBackend, LlmInvocation, LlmResult, Message};

const PROVIDER: &str = "openai";

const DEFAULT_API_KEY_ENV: &str = "OPENAI_API_KEY";

pub struct OpenAiBackend {
    client: HttpClient,
    endpoint: String,
    api_key: Option<String>,
    default_model: String,
}

impl OpenAiBackend {
    pub fn new(
        base_url: &str,
        api_key: Option<String>,
        default_model: impl Into<String>,
    ) -> Result<Self, CollaboratorError> {
        Ok(Self {
            client: HttpClient::new()?,
            endpoint: completions_endpoint(base_url),
            api_key,
            default_model: default_model.into(),
        })
    }

    /// Build from a role binding.
    ///
    /// The API key is read from `api_key_env` (default `OPENAI_API_KEY`). An
    /// explicitly named variable that is unset is a misconfiguration; the
    /// default variable may be absent for keyless local servers.
    pub fn new_from_binding(binding: &CollaboratorBinding) -> Result<Self, CollaboratorError> {
        let api_key = match &binding.api_key_env {
            Some(var) => Some(std::env::var(var).map_err(|_| {
                CollaboratorError::Misconfiguration(format!(
                    "API key not found in environment variable '{var}' for the {} collaborator",
                    binding.role
                ))
            })?),
            None => std::env::var(DEFAULT_API_KEY_ENV).ok(),
        };
        Self::new(&binding.host, api_key, binding.model.clone())
    }
}

fn completions_endpoint(base_url: &str) -> String {
    let trimmed = base_url.trim_end_matches('/');
    if trimmed.ends_with("/chat/completions") {
        trimmed.to_string()
    } else if trimmed.ends_with("/v1") {
        format!("{trimmed}/chat/completions")
    } else {
        format!("{trimmed}/v1/chat/completions")
    }
}

#[async_trait]
impl LlmBackend for OpenAiBackend {
    fn provider(&self) -> &str {
        PROVIDER
    }

    async fn invoke(&self, inv: LlmInvocation) -> Result<LlmResult, CollaboratorError> {
        let model = if inv.model.is_empty() {
            self.default_model.clone()
        } else {
            inv.model.clone()
        };

        debug!(
            provider = PROVIDER,
            model = %model,
            temperature = inv.temperature,
            timeout_secs = inv.timeout.as_secs(),
            "Invoking OpenAI-compatible backend"
        );

        let body = CompletionRequest {
            model: &model,
            messages: &inv.messages,
            temperature: inv.temperature,
            stream: false,
        };

        let mut request = self.client.client().post(&self.endpoint).json(&body);
        if let Some(key) = &self.api_key {
            request = request.bearer_auth(key);
        }

        let response = self
            .client
            .execute_with_retry(request, inv.timeout, PROVIDER)
            .await?;
        let text = response.text().await.map_err(|e| {
            CollaboratorError::Unavailable(format!("failed to read completion response: {e}"))
        })?;
        let parsed: CompletionResponse = serde_json::from_str(&text).map_err(|e| {
            CollaboratorError::malformed(format!("unexpected completion response: {e}"), &text)
        })?;

        let content = parsed
            .choices
            .into_iter()
            .next()
            .and_then(|c| c.message.content)
            .ok_or_else(|| CollaboratorError::malformed("response has no choices[0] content", &text))?;

        let mut result = LlmResult::new(content, PROVIDER, model);
        if let Some(usage) = parsed.usage {
            result.tokens_input = Some(usage.prompt_tokens);
            result.tokens_output = Some(usage.completion_tokens);
        }
        Ok(result)
    }
}

#[derive(Serialize)]
struct CompletionRequest<'a> {
    model: &'a str,
    messages: &'a [Message],
    temperature: f32,
    stream: bool,
}

#[derive(Deserialize)]
struct CompletionResponse {
    choices: Vec<Choice>,
    usage: Option<Usage>,
}

#[derive(Deserialize)]
struct Choice {
    message: ChoiceMessage,
}

#[derive(Deserialize)]
struct ChoiceMessage {
    content: Option<String>,
}

#[derive(Deserialize)]
struct Usage {
    prompt_tokens: u64,
    completion_tokens: u64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_completions_endpoint() {
        assert_eq!(
            completions_endpoint("https://api.openai.com"),
            "https://api.openai.com/v1/chat/completions"
        );
        assert_eq!(
            completions_endpoint("http://localhost:8000/v1/"),
            "http://localhost:8000/v1/chat/completions"
        );
        assert_eq!(
            completions_endpoint("https://openrouter.ai/api/v1/chat/completions"),
            "https://openrouter.ai/api/v1/chat/completions"
        );
    }

    #[test]
    fn test_response_without_content_parses_to_none() {
        let parsed: CompletionResponse =
            serde_json::from_str(r#"{"choices":[{"message":{"role":"assistant"}}]}"#).unwrap();
        assert!(parsed.choices[0].message.content.is_none());
        assert!(parsed.usage.is_none());
    }
}
