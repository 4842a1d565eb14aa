//! Artifact categories, name sanitisation and classification.

use serde::{Deserialize, Serialize};
use strum::{Display, EnumIter, EnumString, IntoStaticStr};

use forgeloop_utils::error::ArtifactError;

/// Logical artifact category; each maps to one flat directory.
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
#[strum(serialize_all = "snake_case")]
pub enum Category {
    Requirements,
    Design,
    Code,
    Tests,
    Reports,
    Releases,
}

impl Category {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        self.into()
    }
}

/// Reduce a name to a flat file name.
///
/// Any directory prefix (`/` or `\`) is stripped. Empty names, `.`, `..`
/// and names containing NUL are rejected.
pub fn sanitize_name(name: &str) -> Result<String, ArtifactError> {
    let invalid = |reason: &str| ArtifactError::InvalidName {
        name: name.to_string(),
        reason: reason.to_string(),
    };

    if name.contains('\0') {
        return Err(invalid("contains a NUL byte"));
    }

    let base = name
        .trim()
        .rsplit(['/', '\\'])
        .next()
        .unwrap_or_default()
        .trim();

    match base {
        "" => Err(invalid("empty file name")),
        "." | ".." => Err(invalid("not a file name")),
        _ => Ok(base.to_string()),
    }
}

/// Category a generated source file belongs to.
///
/// `test_*` and `*_test.<ext>` files are tests; everything else is code.
#[must_use]
pub fn classify(name: &str) -> Category {
    let base = name.rsplit(['/', '\\']).next().unwrap_or(name);
    let stem = base.rsplit_once('.').map_or(base, |(stem, _)| stem);
    if base.starts_with("test_") || stem.ends_with("_test") {
        Category::Tests
    } else {
        Category::Code
    }
}
