//! Generation and diagnostic collaborators
//!
//! A collaborator is a role (architect, developer, qa) bound to an
//! [`LlmBackend`] with its own tuning and instruction window. Stages talk to
//! collaborators through the [`CollaboratorRegistry`] using the closed set of
//! actions in [`actions`].

pub mod actions;
mod collaborator;
pub(crate) mod http_client;
pub mod instructions;
mod ollama;
mod openai;
pub mod parse;
pub mod prompts;
mod registry;
mod types;

#[cfg(any(test, feature = "test-utils"))]
pub mod testing;

use std::sync::Arc;

pub use actions::{ActionKind, ActionOutput, ActionRequest, resolve_action};
pub use collaborator::{Collaborator, CollaboratorInfo, FALLBACK_CODE_FILE, FALLBACK_TEST_FILE};
pub use instructions::{INSTRUCTION_WINDOW, Instruction, InstructionLog};
pub use ollama::OllamaBackend;
pub use openai::OpenAiBackend;
pub use parse::{Diagnosis, Review, ReviewIssue};
pub use registry::CollaboratorRegistry;
pub use types::{LlmBackend, LlmInvocation, LlmResult, Message, Role};

use forgeloop_config::CollaboratorBinding;
use forgeloop_utils::error::CollaboratorError;

/// Construct the backend named by a binding's provider.
///
/// # Errors
///
/// Returns `CollaboratorError::Unsupported` if the provider is unknown, and
/// `CollaboratorError::Misconfiguration` if provider-specific settings are
/// invalid.
pub fn backend_for(binding: &CollaboratorBinding) -> Result<Arc<dyn LlmBackend>, CollaboratorError> {
    match binding.provider.as_str() {
        "ollama" => Ok(Arc::new(OllamaBackend::new_from_binding(binding)?)),
        "openai" => Ok(Arc::new(OpenAiBackend::new_from_binding(binding)?)),
        other => Err(CollaboratorError::Unsupported(format!(
            "Unknown provider '{other}'. Known providers: ollama, openai"
        ))),
    }
}
