//! The closed set of collaborator actions.
//!
//! Every action is owned by exactly one role. String-keyed dispatch goes
//! through [`resolve_action`], which rejects unknown tags and tags owned by
//! another role with [`ConfigError::UnregisteredAction`].

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use strum::{Display, EnumIter, EnumString, IntoEnumIterator, IntoStaticStr};

use forgeloop_utils::error::ConfigError;
use forgeloop_utils::types::CollaboratorRole;

use crate::parse::{Diagnosis, Review};

/// Name of an action, as used on the wire and in logs
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Display, EnumString, EnumIter, IntoStaticStr,
)]
#[strum(serialize_all = "kebab-case")]
pub enum ActionKind {
    AnalyzeRequirement,
    ProduceDesign,
    Implement,
    WriteTests,
    Repair,
    Diagnose,
    ReviewCode,
}

impl ActionKind {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        self.into()
    }

    /// The role that handles this action
    #[must_use]
    pub const fn owner(self) -> CollaboratorRole {
        match self {
            Self::AnalyzeRequirement | Self::ProduceDesign => CollaboratorRole::Architect,
            Self::Implement | Self::WriteTests | Self::Repair => CollaboratorRole::Developer,
            Self::Diagnose | Self::ReviewCode => CollaboratorRole::Qa,
        }
    }

    /// Actions registered for `role`
    pub fn for_role(role: CollaboratorRole) -> impl Iterator<Item = ActionKind> {
        Self::iter().filter(move |kind| kind.owner() == role)
    }
}

/// Resolve an action name against a role's registered actions.
///
/// # Errors
///
/// [`ConfigError::UnregisteredAction`] when `name` is not a known action or
/// belongs to a different role.
pub fn resolve_action(role: CollaboratorRole, name: &str) -> Result<ActionKind, ConfigError> {
    name.parse::<ActionKind>()
        .ok()
        .filter(|kind| kind.owner() == role)
        .ok_or_else(|| ConfigError::UnregisteredAction {
            role: role.to_string(),
            action: name.to_string(),
        })
}

/// A structured request for one action.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "action", content = "payload", rename_all = "kebab-case")]
pub enum ActionRequest {
    AnalyzeRequirement {
        requirement: String,
    },
    ProduceDesign {
        requirements: String,
    },
    Implement {
        design: String,
    },
    WriteTests {
        design: String,
        code: BTreeMap<String, String>,
    },
    Repair {
        failure_output: String,
        diagnosis: Diagnosis,
        code: BTreeMap<String, String>,
        tests: BTreeMap<String, String>,
    },
    Diagnose {
        raw_output: String,
    },
    ReviewCode {
        code: BTreeMap<String, String>,
    },
}

impl ActionRequest {
    #[must_use]
    pub fn kind(&self) -> ActionKind {
        match self {
            Self::AnalyzeRequirement { .. } => ActionKind::AnalyzeRequirement,
            Self::ProduceDesign { .. } => ActionKind::ProduceDesign,
            Self::Implement { .. } => ActionKind::Implement,
            Self::WriteTests { .. } => ActionKind::WriteTests,
            Self::Repair { .. } => ActionKind::Repair,
            Self::Diagnose { .. } => ActionKind::Diagnose,
            Self::ReviewCode { .. } => ActionKind::ReviewCode,
        }
    }

    /// Build a request from an action kind and a JSON payload.
    ///
    /// # Errors
    ///
    /// [`ConfigError::InvalidValue`] when the payload does not match the
    /// action's shape.
    pub fn from_payload(kind: ActionKind, payload: serde_json::Value) -> Result<Self, ConfigError> {
        let tagged = serde_json::json!({ "action": kind.as_str(), "payload": payload });
        serde_json::from_value(tagged).map_err(|e| ConfigError::InvalidValue {
            key: format!("{kind} payload"),
            value: e.to_string(),
        })
    }
}

/// Structured result of an action
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "value", rename_all = "snake_case")]
pub enum ActionOutput {
    Document(String),
    Files(BTreeMap<String, String>),
    Diagnosis(Diagnosis),
    Review(Review),
}

impl ActionOutput {
    #[must_use]
    pub fn into_document(self) -> Option<String> {
        match self {
            Self::Document(doc) => Some(doc),
            _ => None,
        }
    }

    #[must_use]
    pub fn into_files(self) -> Option<BTreeMap<String, String>> {
        match self {
            Self::Files(files) => Some(files),
            _ => None,
        }
    }

    #[must_use]
    pub fn into_diagnosis(self) -> Option<Diagnosis> {
        match self {
            Self::Diagnosis(d) => Some(d),
            _ => None,
        }
    }

    #[must_use]
    pub fn into_review(self) -> Option<Review> {
        match self {
            Self::Review(r) => Some(r),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_every_action_has_one_owner() {
        let mut total = 0;
        for role in CollaboratorRole::iter() {
            total += ActionKind::for_role(role).count();
        }
        assert_eq!(total, ActionKind::iter().count());
    }

    #[test]
    fn test_resolve_known_action() {
        assert_eq!(
            resolve_action(CollaboratorRole::Developer, "repair").unwrap(),
            ActionKind::Repair
        );
        assert_eq!(
            resolve_action(CollaboratorRole::Architect, "produce-design").unwrap(),
            ActionKind::ProduceDesign
        );
    }

    #[test]
    fn test_resolve_unknown_action_is_config_error() {
        match resolve_action(CollaboratorRole::Developer, "deploy") {
            Err(ConfigError::UnregisteredAction { role, action }) => {
                assert_eq!(role, "developer");
                assert_eq!(action, "deploy");
            }
            other => panic!("expected UnregisteredAction, got {other:?}"),
        }
    }

    #[test]
    fn test_resolve_foreign_action_is_config_error() {
        assert!(matches!(
            resolve_action(CollaboratorRole::Architect, "repair"),
            Err(ConfigError::UnregisteredAction { .. })
        ));
    }

    #[test]
    fn test_request_from_payload() {
        let request = ActionRequest::from_payload(
            ActionKind::Implement,
            serde_json::json!({ "design": "one module" }),
        )
        .unwrap();
        assert_eq!(
            request,
            ActionRequest::Implement {
                design: "one module".into()
            }
        );
        assert_eq!(request.kind(), ActionKind::Implement);
    }

    #[test]
    fn test_request_from_bad_payload() {
        let err = ActionRequest::from_payload(ActionKind::Implement, serde_json::json!({}))
            .unwrap_err();
        assert!(matches!(err, ConfigError::InvalidValue { .. }));
    }

    #[test]
    fn test_request_wire_shape() {
        let json = serde_json::to_value(ActionRequest::Diagnose {
            raw_output: "boom".into(),
        })
        .unwrap();
        assert_eq!(json["action"], "diagnose");
        assert_eq!(json["payload"]["raw_output"], "boom");
    }
}
