//! Parsing of collaborator responses into structured outputs.
//!
//! Models are asked for a fixed format but do not always comply, so every
//! parser here either succeeds or returns `MalformedResponse` carrying the raw
//! text. Callers recover with the `from_raw` constructors.

use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;

use forgeloop_utils::error::CollaboratorError;

/// Characters of raw output kept as `root_cause` in a fallback diagnosis
pub const FALLBACK_ROOT_CAUSE_CHARS: usize = 500;

static FILE_BLOCK_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?s)===\s*FILE:\s*([^\s=]+)\s*===\s*```(?:[\w+-]+)?[ \t]*\r?\n(.*?)```")
        .expect("valid regex")
});

static CODE_BLOCK_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?s)```(?:[\w+-]+)?[ \t]*\r?\n(.*?)```").expect("valid regex"));

/// Final path component of a name, splitting on both `/` and `\`.
#[must_use]
pub fn basename(name: &str) -> &str {
    name.rsplit(['/', '\\']).next().unwrap_or(name)
}

/// Extract `=== FILE: name ===` blocks from a response.
///
/// Names are reduced to their final path component. Without any file
/// marker the first fenced block is returned under `fallback_name`. A
/// response with no code at all is malformed.
pub fn parse_file_blocks(
    response: &str,
    fallback_name: &str,
) -> Result<BTreeMap<String, String>, CollaboratorError> {
    let mut files = BTreeMap::new();

    for caps in FILE_BLOCK_RE.captures_iter(response) {
        let name = basename(caps[1].trim());
        if name.is_empty() || name == "." || name == ".." {
            continue;
        }
        files.insert(name.to_string(), caps[2].trim().to_string());
    }

    if files.is_empty()
        && let Some(caps) = CODE_BLOCK_RE.captures(response)
    {
        files.insert(fallback_name.to_string(), caps[1].trim().to_string());
    }

    if files.is_empty() {
        return Err(CollaboratorError::malformed(
            "response contains no code blocks",
            response,
        ));
    }

    Ok(files)
}

/// Slice from the first `{` to the last `}`.
fn json_object_span(text: &str) -> Option<&str> {
    let start = text.find('{')?;
    let end = text.rfind('}')?;
    (end > start).then(|| &text[start..=end])
}

fn parse_json_object(response: &str) -> Result<serde_json::Map<String, Value>, CollaboratorError> {
    let span = json_object_span(response)
        .ok_or_else(|| CollaboratorError::malformed("response contains no JSON object", response))?;
    match serde_json::from_str::<Value>(span) {
        Ok(Value::Object(map)) => Ok(map),
        Ok(_) => Err(CollaboratorError::malformed("JSON value is not an object", response)),
        Err(e) => Err(CollaboratorError::malformed(
            format!("invalid JSON: {e}"),
            response,
        )),
    }
}

fn scalar_string(value: Option<&Value>) -> Option<String> {
    match value? {
        Value::String(s) => Some(s.clone()),
        Value::Null => None,
        Value::Array(_) | Value::Object(_) => None,
        other => Some(other.to_string()),
    }
}

fn string_list(value: Option<&Value>) -> Vec<String> {
    match value {
        Some(Value::Array(items)) => items
            .iter()
            .filter_map(|v| scalar_string(Some(v)))
            .collect(),
        Some(Value::String(s)) => vec![s.clone()],
        _ => Vec::new(),
    }
}

pub(crate) fn truncate_chars(text: &str, max: usize) -> &str {
    match text.char_indices().nth(max) {
        Some((idx, _)) => &text[..idx],
        None => text,
    }
}

// ============================================================================
// Diagnosis
// ============================================================================

/// Structured root-cause analysis of a verification failure.
///
/// Every field is optional on the wire; missing fields default.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Diagnosis {
    pub error_type: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub location: Option<String>,
    pub root_cause: String,
    pub fix_suggestions: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub priority: Option<String>,
    /// Full harness output when this diagnosis is a fallback
    #[serde(skip_serializing_if = "Option::is_none")]
    pub raw_output: Option<String>,
}

impl Diagnosis {
    /// Fallback diagnosis built from raw output alone.
    #[must_use]
    pub fn from_raw(raw_output: &str) -> Self {
        Self {
            error_type: "unknown".to_string(),
            location: None,
            root_cause: truncate_chars(raw_output, FALLBACK_ROOT_CAUSE_CHARS).to_string(),
            fix_suggestions: vec![
                "Check the error messages in the verification output".to_string(),
                "Confirm the code is syntactically valid".to_string(),
            ],
            priority: None,
            raw_output: Some(raw_output.to_string()),
        }
    }

    /// Whether this diagnosis came from the fallback path
    #[must_use]
    pub fn is_fallback(&self) -> bool {
        self.raw_output.is_some() && self.error_type == "unknown"
    }

    /// One-line summary for terminal output
    #[must_use]
    pub fn summary(&self) -> String {
        let error_type = if self.error_type.is_empty() {
            "unknown"
        } else {
            &self.error_type
        };
        let cause = self.root_cause.lines().next().unwrap_or_default();
        match &self.location {
            Some(loc) => format!("{error_type} at {loc}: {cause}"),
            None => format!("{error_type}: {cause}"),
        }
    }
}

/// Parse the first JSON object in a response into a [`Diagnosis`].
pub fn parse_diagnosis(response: &str) -> Result<Diagnosis, CollaboratorError> {
    let map = parse_json_object(response)?;
    Ok(Diagnosis {
        error_type: scalar_string(map.get("error_type")).unwrap_or_else(|| "unknown".to_string()),
        location: scalar_string(map.get("location")),
        root_cause: scalar_string(map.get("root_cause")).unwrap_or_default(),
        fix_suggestions: string_list(map.get("fix_suggestions")),
        priority: scalar_string(map.get("priority")),
        raw_output: None,
    })
}

// ============================================================================
// Review
// ============================================================================

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ReviewIssue {
    pub file: Option<String>,
    pub line: Option<u32>,
    pub severity: Option<String>,
    pub message: String,
}

/// Advisory code review
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Review {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub overall_score: Option<u32>,
    pub issues: Vec<ReviewIssue>,
    pub suggestions: Vec<String>,
    /// Unparsed review text when the response was not JSON
    #[serde(skip_serializing_if = "Option::is_none")]
    pub raw_review: Option<String>,
}

impl Review {
    #[must_use]
    pub fn from_raw(text: &str) -> Self {
        Self {
            raw_review: Some(text.to_string()),
            ..Self::default()
        }
    }
}

pub fn parse_review(response: &str) -> Result<Review, CollaboratorError> {
    let map = parse_json_object(response)?;

    let issues = match map.get("issues") {
        Some(Value::Array(items)) => items
            .iter()
            .filter_map(|item| match item {
                Value::Object(obj) => Some(ReviewIssue {
                    file: scalar_string(obj.get("file")),
                    line: obj
                        .get("line")
                        .and_then(Value::as_u64)
                        .and_then(|l| u32::try_from(l).ok()),
                    severity: scalar_string(obj.get("severity")),
                    message: scalar_string(obj.get("message")).unwrap_or_default(),
                }),
                Value::String(s) => Some(ReviewIssue {
                    message: s.clone(),
                    ..ReviewIssue::default()
                }),
                _ => None,
            })
            .collect(),
        _ => Vec::new(),
    };

    Ok(Review {
        overall_score: map
            .get("overall_score")
            .and_then(Value::as_f64)
            .map(|s| s.clamp(0.0, 100.0).round() as u32),
        issues,
        suggestions: string_list(map.get("suggestions")),
        raw_review: None,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    // ========================================================================
    // File blocks
    // ========================================================================

    #[test]
    fn test_parses_multiple_file_blocks() {
        let response = "Here you go:\n\n=== FILE: calc.py ===\n```python\ndef add(a, b):\n    return a + b\n```\n\n=== FILE: util.py ===\n```\nX = 1\n```\n";
        let files = parse_file_blocks(response, "main.py").unwrap();
        assert_eq!(files.len(), 2);
        assert_eq!(files["calc.py"], "def add(a, b):\n    return a + b");
        assert_eq!(files["util.py"], "X = 1");
    }

    #[test]
    fn test_strips_directory_prefixes() {
        let response = "=== FILE: tests/test_x.py ===\n```python\nassert True\n```\n=== FILE: src\\pkg\\mod.py ===\n```python\npass\n```";
        let files = parse_file_blocks(response, "main.py").unwrap();
        assert!(files.contains_key("test_x.py"));
        assert!(files.contains_key("mod.py"));
    }

    #[test]
    fn test_falls_back_to_first_code_block() {
        let response = "```python\nprint('hi')\n```\n```python\nprint('second')\n```";
        let files = parse_file_blocks(response, "main.py").unwrap();
        assert_eq!(files.len(), 1);
        assert_eq!(files["main.py"], "print('hi')");
    }

    #[test]
    fn test_no_code_is_malformed() {
        match parse_file_blocks("I cannot help with that.", "main.py") {
            Err(CollaboratorError::MalformedResponse { raw, .. }) => {
                assert_eq!(raw, "I cannot help with that.");
            }
            other => panic!("expected MalformedResponse, got {other:?}"),
        }
    }

    // ========================================================================
    // Diagnosis
    // ========================================================================

    #[test]
    fn test_parses_diagnosis_inside_prose() {
        let response = r#"Analysis:
{
  "error_type": "import-error",
  "location": "tests/test_calc.py:3",
  "root_cause": "module calc has no add",
  "fix_suggestions": ["define add"],
  "priority": "high"
}
Hope that helps."#;
        let d = parse_diagnosis(response).unwrap();
        assert_eq!(d.error_type, "import-error");
        assert_eq!(d.location.as_deref(), Some("tests/test_calc.py:3"));
        assert_eq!(d.fix_suggestions, vec!["define add"]);
        assert!(!d.is_fallback());
    }

    #[test]
    fn test_partial_diagnosis_is_tolerated() {
        let d = parse_diagnosis(r#"{"root_cause": "typo", "location": 12, "fix_suggestions": "fix it"}"#)
            .unwrap();
        assert_eq!(d.error_type, "unknown");
        assert_eq!(d.location.as_deref(), Some("12"));
        assert_eq!(d.fix_suggestions, vec!["fix it"]);
    }

    #[test]
    fn test_non_json_diagnosis_is_malformed() {
        assert!(matches!(
            parse_diagnosis("the tests failed because of an import"),
            Err(CollaboratorError::MalformedResponse { .. })
        ));
        assert!(matches!(
            parse_diagnosis("{ not json }"),
            Err(CollaboratorError::MalformedResponse { .. })
        ));
    }

    #[test]
    fn test_fallback_diagnosis_keeps_raw_output() {
        let raw = "x".repeat(800);
        let d = Diagnosis::from_raw(&raw);
        assert_eq!(d.error_type, "unknown");
        assert_eq!(d.root_cause.len(), FALLBACK_ROOT_CAUSE_CHARS);
        assert_eq!(d.raw_output.as_deref(), Some(raw.as_str()));
        assert!(d.is_fallback());
    }

    #[test]
    fn test_fallback_truncation_respects_char_boundaries() {
        let raw = "é".repeat(600);
        let d = Diagnosis::from_raw(&raw);
        assert_eq!(d.root_cause.chars().count(), FALLBACK_ROOT_CAUSE_CHARS);
    }

    #[test]
    fn test_summary() {
        let d = Diagnosis {
            error_type: "import-error".into(),
            root_cause: "missing add\nmore".into(),
            ..Diagnosis::default()
        };
        assert_eq!(d.summary(), "import-error: missing add");
    }

    // ========================================================================
    // Review
    // ========================================================================

    #[test]
    fn test_parses_review() {
        let review = parse_review(
            r#"{"overall_score": 85, "issues": [{"file": "calc.py", "line": 3, "severity": "low", "message": "naming"}], "suggestions": ["add docstrings"]}"#,
        )
        .unwrap();
        assert_eq!(review.overall_score, Some(85));
        assert_eq!(review.issues[0].line, Some(3));
        assert_eq!(review.suggestions, vec!["add docstrings"]);
    }

    #[test]
    fn test_review_fallback() {
        assert!(parse_review("Looks good to me").is_err());
        let review = Review::from_raw("Looks good to me");
        assert_eq!(review.raw_review.as_deref(), Some("Looks good to me"));
    }
}
