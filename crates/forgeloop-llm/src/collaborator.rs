//! A role-bound collaborator: backend + tuning + instruction window.

use serde::Serialize;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tracing::{debug, info};

use forgeloop_config::CollaboratorBinding;
use forgeloop_utils::error::{CollaboratorError, ConfigError, StageError};
use forgeloop_utils::types::CollaboratorRole;

use crate::actions::{ActionKind, ActionOutput, ActionRequest};
use crate::instructions::{Instruction, InstructionLog};
use crate::parse::{parse_diagnosis, parse_file_blocks, parse_review};
use crate::prompts::{system_prompt, task_prompt};
use crate::types::{LlmBackend, LlmInvocation, Message};

/// File name used when a code response has no file markers
pub const FALLBACK_CODE_FILE: &str = "main.py";

/// File name used when a test response has no file markers
pub const FALLBACK_TEST_FILE: &str = "test_main.py";

/// Summary of a collaborator's binding, for display
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CollaboratorInfo {
    pub role: CollaboratorRole,
    pub provider: String,
    pub model: String,
    pub host: String,
    pub temperature: f32,
    pub instructions_count: usize,
}

pub struct Collaborator {
    binding: CollaboratorBinding,
    backend: Arc<dyn LlmBackend>,
    instructions: Mutex<InstructionLog>,
}

impl std::fmt::Debug for Collaborator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Collaborator")
            .field("role", &self.binding.role)
            .field("provider", &self.backend.provider())
            .field("model", &self.binding.model)
            .finish_non_exhaustive()
    }
}

impl Collaborator {
    #[must_use]
    pub fn new(binding: CollaboratorBinding, backend: Arc<dyn LlmBackend>) -> Self {
        Self {
            binding,
            backend,
            instructions: Mutex::new(InstructionLog::default()),
        }
    }

    #[must_use]
    pub fn role(&self) -> CollaboratorRole {
        self.binding.role
    }

    #[must_use]
    pub fn binding(&self) -> &CollaboratorBinding {
        &self.binding
    }

    fn log(&self) -> MutexGuard<'_, InstructionLog> {
        self.instructions
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }

    /// Attach an operator directive; it applies from the next request on.
    pub fn inject(&self, text: &str) -> bool {
        let added = self.log().push(text);
        if added {
            info!(role = %self.binding.role, "Instruction injected");
        }
        added
    }

    pub fn clear_instructions(&self) {
        self.log().clear();
        info!(role = %self.binding.role, "Instructions cleared");
    }

    #[must_use]
    pub fn instructions(&self) -> Vec<Instruction> {
        self.log().recent()
    }

    #[must_use]
    pub fn info(&self) -> CollaboratorInfo {
        CollaboratorInfo {
            role: self.binding.role,
            provider: self.backend.provider().to_string(),
            model: self.binding.model.clone(),
            host: self.binding.host.clone(),
            temperature: self.binding.temperature,
            instructions_count: self.log().len(),
        }
    }

    /// Build the messages for a request.
    ///
    /// The instruction window is snapshotted here, so directives injected
    /// after this call only affect later requests.
    fn compose(&self, request: &ActionRequest) -> Vec<Message> {
        let prompt = self.log().apply(&task_prompt(request));
        vec![
            Message::system(system_prompt(self.binding.role)),
            Message::user(prompt),
        ]
    }

    /// Perform one action.
    ///
    /// # Errors
    ///
    /// - [`ConfigError::UnregisteredAction`] (as `StageError::Config`) when the
    ///   action belongs to another role
    /// - `StageError::Collaborator` for backend failures and responses that
    ///   cannot be parsed (`MalformedResponse`)
    pub async fn perform(&self, request: &ActionRequest) -> Result<ActionOutput, StageError> {
        let kind = request.kind();
        if kind.owner() != self.binding.role {
            return Err(ConfigError::UnregisteredAction {
                role: self.binding.role.to_string(),
                action: kind.to_string(),
            }
            .into());
        }

        let invocation = LlmInvocation::new(
            self.binding.model.clone(),
            self.binding.temperature,
            self.binding.request_timeout,
            self.compose(request),
        );

        debug!(
            role = %self.binding.role,
            action = %kind,
            provider = self.backend.provider(),
            "Dispatching collaborator action"
        );

        let result = self.backend.invoke(invocation).await?;

        debug!(
            role = %self.binding.role,
            action = %kind,
            model = %result.model_used,
            tokens_input = ?result.tokens_input,
            tokens_output = ?result.tokens_output,
            "Collaborator action completed"
        );

        Ok(parse_output(kind, &result.raw_response)?)
    }
}

fn parse_output(kind: ActionKind, raw: &str) -> Result<ActionOutput, CollaboratorError> {
    match kind {
        ActionKind::AnalyzeRequirement | ActionKind::ProduceDesign => {
            let doc = raw.trim();
            if doc.is_empty() {
                return Err(CollaboratorError::malformed("empty document", raw));
            }
            Ok(ActionOutput::Document(doc.to_string()))
        }
        ActionKind::Implement | ActionKind::Repair => {
            parse_file_blocks(raw, FALLBACK_CODE_FILE).map(ActionOutput::Files)
        }
        ActionKind::WriteTests => {
            parse_file_blocks(raw, FALLBACK_TEST_FILE).map(ActionOutput::Files)
        }
        ActionKind::Diagnose => parse_diagnosis(raw).map(ActionOutput::Diagnosis),
        ActionKind::ReviewCode => parse_review(raw).map(ActionOutput::Review),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::ScriptedBackend;
    use forgeloop_config::Config;
    use std::collections::BTreeMap;

    fn collaborator(role: CollaboratorRole, backend: Arc<ScriptedBackend>) -> Collaborator {
        Collaborator::new(Config::default().collaborator(role), backend)
    }

    #[tokio::test]
    async fn test_implement_returns_files() {
        let backend = Arc::new(ScriptedBackend::new(vec![
            "=== FILE: code/calc.py ===\n```python\ndef add(a, b):\n    return a + b\n```",
        ]));
        let dev = collaborator(CollaboratorRole::Developer, backend.clone());

        let output = dev
            .perform(&ActionRequest::Implement {
                design: "calculator".into(),
            })
            .await
            .unwrap();

        let files = output.into_files().unwrap();
        assert!(files.contains_key("calc.py"));
        assert_eq!(backend.calls(), 1);
    }

    #[tokio::test]
    async fn test_invocation_uses_role_tuning() {
        let backend = Arc::new(ScriptedBackend::new(vec!["# Requirements"]));
        let architect = collaborator(CollaboratorRole::Architect, backend.clone());

        architect
            .perform(&ActionRequest::AnalyzeRequirement {
                requirement: "a calculator".into(),
            })
            .await
            .unwrap();

        let invocations = backend.invocations();
        let inv = &invocations[0];
        assert!((inv.temperature - 0.7).abs() < f32::EPSILON);
        assert_eq!(inv.messages.len(), 2);
        assert!(inv.user_prompt().unwrap().contains("a calculator"));
    }

    #[tokio::test]
    async fn test_foreign_action_is_config_error() {
        let backend = Arc::new(ScriptedBackend::new(vec!["unused"]));
        let qa = collaborator(CollaboratorRole::Qa, backend.clone());

        let err = qa
            .perform(&ActionRequest::Implement {
                design: "x".into(),
            })
            .await
            .unwrap_err();

        assert!(matches!(
            err,
            StageError::Config(ConfigError::UnregisteredAction { .. })
        ));
        assert_eq!(backend.calls(), 0);
    }

    #[tokio::test]
    async fn test_malformed_diagnosis_surfaces_raw_text() {
        let backend = Arc::new(ScriptedBackend::new(vec!["it broke, sorry"]));
        let qa = collaborator(CollaboratorRole::Qa, backend);

        let err = qa
            .perform(&ActionRequest::Diagnose {
                raw_output: "E   boom".into(),
            })
            .await
            .unwrap_err();

        match err {
            StageError::Collaborator(CollaboratorError::MalformedResponse { raw, .. }) => {
                assert_eq!(raw, "it broke, sorry");
            }
            other => panic!("expected MalformedResponse, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_instructions_prefix_next_request_only() {
        let backend = Arc::new(ScriptedBackend::new(vec!["=== FILE: a.py ===\n```\npass\n```"]));
        let dev = collaborator(CollaboratorRole::Developer, backend.clone());
        let request = ActionRequest::Repair {
            failure_output: "E".into(),
            diagnosis: Default::default(),
            code: BTreeMap::new(),
            tests: BTreeMap::new(),
        };

        dev.perform(&request).await.unwrap();
        dev.inject("keep the public API");
        dev.perform(&request).await.unwrap();

        let prompts = backend.prompts();
        assert!(!prompts[0].contains("Operator directive"));
        assert!(prompts[1].starts_with("[Operator directive 1]: keep the public API\n\n"));
    }

    #[tokio::test]
    async fn test_info_reports_binding() {
        let backend = Arc::new(ScriptedBackend::default());
        let qa = collaborator(CollaboratorRole::Qa, backend);
        qa.inject("be strict");

        let info = qa.info();
        assert_eq!(info.role, CollaboratorRole::Qa);
        assert_eq!(info.provider, "scripted");
        assert_eq!(info.instructions_count, 1);
        assert!((info.temperature - 0.4).abs() < f32::EPSILON);
    }
}
