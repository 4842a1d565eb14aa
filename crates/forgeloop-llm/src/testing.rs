//! Test doubles for collaborator backends.

use async_trait::async_trait;
use std::collections::VecDeque;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use forgeloop_config::Config;
use forgeloop_utils::error::CollaboratorError;
use forgeloop_utils::types::CollaboratorRole;

use crate::collaborator::Collaborator;
use crate::types::{LlmBackend, LlmInvocation, LlmResult};

/// One scripted reply
#[derive(Debug, Clone)]
pub enum Reply {
    Text(String),
    Unavailable(String),
    Timeout,
}

impl From<&str> for Reply {
    fn from(text: &str) -> Self {
        Self::Text(text.to_string())
    }
}

impl From<String> for Reply {
    fn from(text: String) -> Self {
        Self::Text(text)
    }
}

/// Backend that replays canned replies in order and records every invocation.
///
/// Once the script runs out the last text reply is repeated; with no text
/// reply at all the backend reports itself unavailable.
#[derive(Debug, Default)]
pub struct ScriptedBackend {
    script: Mutex<VecDeque<Reply>>,
    last_text: Mutex<Option<String>>,
    invocations: Mutex<Vec<LlmInvocation>>,
}

impl ScriptedBackend {
    #[must_use]
    pub fn new<R: Into<Reply>>(replies: Vec<R>) -> Self {
        Self {
            script: Mutex::new(replies.into_iter().map(Into::into).collect()),
            ..Self::default()
        }
    }

    pub fn push(&self, reply: impl Into<Reply>) {
        self.script
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push_back(reply.into());
    }

    #[must_use]
    pub fn calls(&self) -> usize {
        self.invocations
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    #[must_use]
    pub fn invocations(&self) -> Vec<LlmInvocation> {
        self.invocations
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// User prompts of every invocation, in order
    #[must_use]
    pub fn prompts(&self) -> Vec<String> {
        self.invocations()
            .iter()
            .filter_map(|inv| inv.user_prompt().map(str::to_string))
            .collect()
    }
}

#[async_trait]
impl LlmBackend for ScriptedBackend {
    fn provider(&self) -> &str {
        "scripted"
    }

    async fn invoke(&self, inv: LlmInvocation) -> Result<LlmResult, CollaboratorError> {
        let model = inv.model.clone();
        self.invocations
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(inv);

        let next = self
            .script
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .pop_front();
        let mut last = self.last_text.lock().unwrap_or_else(PoisonError::into_inner);

        match next {
            Some(Reply::Text(text)) => {
                *last = Some(text.clone());
                Ok(LlmResult::new(text, "scripted", model))
            }
            Some(Reply::Unavailable(msg)) => Err(CollaboratorError::Unavailable(msg)),
            Some(Reply::Timeout) => Err(CollaboratorError::Timeout {
                duration: Duration::from_secs(1),
            }),
            None => match last.as_ref() {
                Some(text) => Ok(LlmResult::new(text.clone(), "scripted", model)),
                None => Err(CollaboratorError::Unavailable(
                    "scripted backend has no replies".to_string(),
                )),
            },
        }
    }
}

/// Collaborator for `role` with default tuning, bound to `backend`.
#[must_use]
pub fn scripted_collaborator(role: CollaboratorRole, backend: Arc<ScriptedBackend>) -> Collaborator {
    Collaborator::new(Config::default().collaborator(role), backend)
}
