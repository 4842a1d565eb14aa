use serde::{Deserialize, Serialize};
use strum::{Display, EnumIter, EnumString, IntoStaticStr};

/// Where a configuration value came from.
///
/// Serialises to lowercase strings (`"cli"`, `"env"`, `"config"`,
/// `"programmatic"`, `"default"`) for display in `forgeloop config`.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Display, IntoStaticStr)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum ConfigSource {
    /// Command-line flag (highest precedence)
    Cli,
    /// Environment variable
    Env,
    /// Configuration file
    Config,
    /// `Config::builder()`
    Programmatic,
    /// Built-in default (lowest precedence)
    Default,
}

/// Role of a generation or diagnostic collaborator.
///
/// Each role is bound to its own backend and keeps its own instruction
/// window. The set is closed; configuration naming any other role is
/// rejected.
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Hash,
    PartialOrd,
    Ord,
    Serialize,
    Deserialize,
    Display,
    EnumString,
    EnumIter,
    IntoStaticStr,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case", ascii_case_insensitive)]
pub enum CollaboratorRole {
    /// Requirements and design documents
    Architect,
    /// Source, tests and repairs
    Developer,
    /// Diagnosis and review
    Qa,
}

impl CollaboratorRole {
    pub const ALL: [CollaboratorRole; 3] = [Self::Architect, Self::Developer, Self::Qa];

    #[must_use]
    pub fn as_str(self) -> &'static str {
        self.into()
    }

    /// Default sampling temperature for the role
    #[must_use]
    pub const fn default_temperature(self) -> f32 {
        match self {
            Self::Architect => 0.7,
            Self::Developer => 0.2,
            Self::Qa => 0.4,
        }
    }
}
