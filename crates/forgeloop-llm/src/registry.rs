//! Collaborators by role.
//!
//! The registry is cheap to clone: clones share the same collaborators, so an
//! operator console can inject instructions while a run holds another clone.

use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::debug;

use forgeloop_config::Config;
use forgeloop_utils::error::{CollaboratorError, ConfigError, StageError};
use forgeloop_utils::types::CollaboratorRole;

use crate::actions::{ActionOutput, ActionRequest, resolve_action};
use crate::backend_for;
use crate::collaborator::{Collaborator, CollaboratorInfo};
use crate::instructions::Instruction;
use crate::types::LlmBackend;

#[derive(Debug, Clone, Default)]
pub struct CollaboratorRegistry {
    collaborators: BTreeMap<CollaboratorRole, Arc<Collaborator>>,
}

impl CollaboratorRegistry {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn with_collaborator(mut self, collaborator: Collaborator) -> Self {
        self.insert(collaborator);
        self
    }

    /// Register a collaborator, replacing any previous one for its role.
    pub fn insert(&mut self, collaborator: Collaborator) {
        self.collaborators
            .insert(collaborator.role(), Arc::new(collaborator));
    }

    /// One collaborator per role, each with its own backend, seeded with the
    /// configured instructions.
    ///
    /// # Errors
    ///
    /// Returns the backend construction error for the first role that fails.
    pub fn from_config(config: &Config) -> Result<Self, CollaboratorError> {
        let mut registry = Self::new();
        for role in CollaboratorRole::ALL {
            let binding = config.collaborator(role);
            let backend = backend_for(&binding)?;
            registry.insert(Collaborator::new(binding, backend));
        }
        registry.seed_instructions(config);
        Ok(registry)
    }

    /// Every role bound to the same backend, with configured tuning.
    #[must_use]
    pub fn with_shared_backend(config: &Config, backend: Arc<dyn LlmBackend>) -> Self {
        let mut registry = Self::new();
        for role in CollaboratorRole::ALL {
            registry.insert(Collaborator::new(config.collaborator(role), backend.clone()));
        }
        registry.seed_instructions(config);
        registry
    }

    fn seed_instructions(&self, config: &Config) {
        for (role, collaborator) in &self.collaborators {
            for text in config.instructions.for_role(*role) {
                collaborator.inject(text);
            }
        }
    }

    /// Collaborator for `role`.
    ///
    /// # Errors
    ///
    /// [`ConfigError::MissingCollaborator`] when no collaborator is bound.
    pub fn get(&self, role: CollaboratorRole) -> Result<&Arc<Collaborator>, ConfigError> {
        self.collaborators
            .get(&role)
            .ok_or_else(|| ConfigError::MissingCollaborator {
                role: role.to_string(),
            })
    }

    #[must_use]
    pub fn roles(&self) -> Vec<CollaboratorRole> {
        self.collaborators.keys().copied().collect()
    }

    /// Send a typed request to `role`.
    pub async fn dispatch(
        &self,
        role: CollaboratorRole,
        request: &ActionRequest,
    ) -> Result<ActionOutput, StageError> {
        self.get(role)?.perform(request).await
    }

    /// Send a request to the role that owns its action.
    pub async fn request(&self, request: &ActionRequest) -> Result<ActionOutput, StageError> {
        self.dispatch(request.kind().owner(), request).await
    }

    /// String-keyed dispatch.
    ///
    /// The action name is resolved against the role's closed action set and
    /// the payload decoded into that action's request shape.
    ///
    /// # Errors
    ///
    /// `StageError::Config` for unknown actions, actions owned by another
    /// role, payloads of the wrong shape, and unbound roles.
    pub async fn invoke(
        &self,
        role: CollaboratorRole,
        action: &str,
        payload: serde_json::Value,
    ) -> Result<ActionOutput, StageError> {
        let kind = resolve_action(role, action)?;
        let request = ActionRequest::from_payload(kind, payload)?;
        debug!(role = %role, action = %kind, "Resolved collaborator action");
        self.dispatch(role, &request).await
    }

    /// Attach a directive to `role`; returns whether it was accepted.
    pub fn inject(&self, role: CollaboratorRole, text: &str) -> Result<bool, ConfigError> {
        Ok(self.get(role)?.inject(text))
    }

    pub fn clear(&self, role: CollaboratorRole) -> Result<(), ConfigError> {
        self.get(role)?.clear_instructions();
        Ok(())
    }

    pub fn instructions(&self, role: CollaboratorRole) -> Result<Vec<Instruction>, ConfigError> {
        Ok(self.get(role)?.instructions())
    }

    #[must_use]
    pub fn info(&self) -> Vec<CollaboratorInfo> {
        self.collaborators.values().map(|c| c.info()).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{ScriptedBackend, scripted_collaborator};

    fn registry_with(role: CollaboratorRole, backend: Arc<ScriptedBackend>) -> CollaboratorRegistry {
        CollaboratorRegistry::new().with_collaborator(scripted_collaborator(role, backend))
    }

    #[tokio::test]
    async fn test_invoke_by_name() {
        let backend = Arc::new(ScriptedBackend::new(vec!["# Design\nOne module."]));
        let registry = registry_with(CollaboratorRole::Architect, backend);

        let output = registry
            .invoke(
                CollaboratorRole::Architect,
                "produce-design",
                serde_json::json!({ "requirements": "add numbers" }),
            )
            .await
            .unwrap();

        assert_eq!(output.into_document().unwrap(), "# Design\nOne module.");
    }

    #[tokio::test]
    async fn test_invoke_unregistered_action_is_config_error() {
        let backend = Arc::new(ScriptedBackend::new(vec!["unused"]));
        let registry = registry_with(CollaboratorRole::Developer, backend.clone());

        let err = registry
            .invoke(CollaboratorRole::Developer, "deploy", serde_json::json!({}))
            .await
            .unwrap_err();

        assert!(matches!(
            err,
            StageError::Config(ConfigError::UnregisteredAction { .. })
        ));
        assert_eq!(backend.calls(), 0);
    }

    #[tokio::test]
    async fn test_missing_collaborator() {
        let registry = CollaboratorRegistry::new();
        let err = registry
            .request(&ActionRequest::Diagnose {
                raw_output: "x".into(),
            })
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            StageError::Config(ConfigError::MissingCollaborator { .. })
        ));
    }

    #[test]
    fn test_inject_is_shared_between_clones() {
        let backend = Arc::new(ScriptedBackend::default());
        let registry = registry_with(CollaboratorRole::Qa, backend);
        let console = registry.clone();

        for i in 1..=5 {
            console.inject(CollaboratorRole::Qa, &format!("d{i}")).unwrap();
        }

        let texts: Vec<_> = registry
            .instructions(CollaboratorRole::Qa)
            .unwrap()
            .into_iter()
            .map(|i| i.text)
            .collect();
        assert_eq!(texts, vec!["d3", "d4", "d5"]);

        console.clear(CollaboratorRole::Qa).unwrap();
        assert!(registry.instructions(CollaboratorRole::Qa).unwrap().is_empty());
    }

    #[test]
    fn test_shared_backend_seeds_instructions() {
        let mut config = Config::default();
        config
            .instructions
            .developer
            .push("prefer the standard library".to_string());

        let registry =
            CollaboratorRegistry::with_shared_backend(&config, Arc::new(ScriptedBackend::default()));

        assert_eq!(registry.roles().len(), 3);
        assert_eq!(
            registry.instructions(CollaboratorRole::Developer).unwrap()[0].text,
            "prefer the standard library"
        );
        assert!(registry.instructions(CollaboratorRole::Qa).unwrap().is_empty());
    }

    #[test]
    fn test_from_config_rejects_unknown_provider() {
        let mut config = Config::default();
        config.collaborators.provider = "carrier-pigeon".to_string();
        assert!(matches!(
            CollaboratorRegistry::from_config(&config),
            Err(CollaboratorError::Unsupported(_))
        ));
    }

    #[test]
    fn test_from_config_builds_all_roles() {
        let registry = CollaboratorRegistry::from_config(&Config::default()).unwrap();
        let info = registry.info();
        assert_eq!(info.len(), 3);
        assert!(info.iter().all(|i| i.provider == "ollama"));
    }
}
