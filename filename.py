```python
<complete file content>
```";

const IMPORT_RULES: &str = "Test files live in a `tests` directory next to a `code` directory. \
Every test file must start with:
```python
import sys
from pathlib import Path
sys.path.insert(0, str(Path(__file__).parent.parent / 'code'))
```
Import modules under test by bare module name (`from calculator import add`), never with a \
package prefix such as `main.`. File names carry no directory prefix.";

#[must_use]
pub fn system_prompt(role: CollaboratorRole) -> &'static str {
    match role {
        CollaboratorRole::Architect => ARCHITECT_SYSTEM,
        CollaboratorRole::Developer => DEVELOPER_SYSTEM,
        CollaboratorRole::Qa => QA_SYSTEM,
    }
}

/// Task-specific user prompt for a request (without instruction prefix).
#[must_use]
pub fn task_prompt(request: &ActionRequest) -> String {
    match request {
        ActionRequest::AnalyzeRequirement { requirement } => format!(
            "Analyse the following request and produce a structured requirements document.

Request:
{requirement}

Use these sections:
## Functional requirements
## Priorities (P0 must-have, P1 important, P2 optional)
## Non-functional requirements
## User stories (As a [role], I want [feature], so that [value])
## Acceptance criteria (each one testable)"
        ),
        ActionRequest::ProduceDesign { requirements } => format!(
            "Design the system architecture for these requirements.

{requirements}

Use these sections:
## Technology choices (language, libraries, each with a reason)
## Module layout (a tree of files with one line per file)
## Modules (responsibility, interface, dependencies)
## Data flow
## Key decisions"
        ),
        ActionRequest::Implement { design } => format!(
            "Implement the following design as complete, runnable Python code.

{design}

Requirements:
1. Every file is complete and runnable.
2. Include docstrings for public functions.
3. Follow PEP 8.

{FILE_FORMAT}"
        ),
        ActionRequest::WriteTests { design, code } => format!(
            "Write pytest unit tests for the code below, covering the main behaviour and \
edge cases.

Design:
{design}

Code:
{files}

{IMPORT_RULES}
Test file names start with `test_`. Do not use non-ASCII bytes literals.

{FILE_FORMAT}",
            files = render_files(code)
        ),
        ActionRequest::Repair {
            failure_output,
            diagnosis,
            code,
            tests,
        } => format!(
            "The tests below are failing. Fix the code or the tests so that they pass.

Test output:
{output}

Diagnosis:
{diagnosis}

Current code:
{code}

Current tests:
{tests}

{IMPORT_RULES}
Return only the files you changed, each complete.

{FILE_FORMAT}",
            output = truncate_chars(failure_output, DIAGNOSIS_OUTPUT_CHARS * 2),
            diagnosis = render_diagnosis(diagnosis),
            code = render_files(code),
            tests = render_files(tests),
        ),
        ActionRequest::Diagnose { raw_output } => {
            let excerpts = failure_excerpts(raw_output, MAX_ERROR_EXCERPTS);
            let excerpts = if excerpts.is_empty() {
                "none".to_string()
            } else {
                excerpts.join("\n---\n")
            };
            format!(
                "Find the root cause of this test failure.

Test output:
{output}

Error excerpts:
{excerpts}

Reply with JSON:
{{
  \"error_type\": \"syntax-error | import-error | logic-error | config-error\",
  \"location\": \"file:line\",
  \"root_cause\": \"detailed explanation\",
  \"fix_suggestions\": [\"specific fix 1\", \"specific fix 2\"],
  \"priority\": \"high | medium | low\"
}}",
                output = truncate_chars(raw_output, DIAGNOSIS_OUTPUT_CHARS),
            )
        }
        ActionRequest::ReviewCode { code } => format!(
            "Review this code for readability, likely bugs, security problems and performance.

{files}

Reply with JSON:
{{
  \"overall_score\": 0-100,
  \"issues\": [{{\"file\": \"x.py\", \"line\": 10, \"severity\": \"high | medium | low\", \"message\": \"...\"}}],
  \"suggestions\": [\"...\"]
}}",
            files = render_files(code)
        ),
    }
}

/// `=== name ===` headed listing of a file map
#[must_use]
pub fn render_files(files: &BTreeMap<String, String>) -> String {
    if files.is_empty() {
        return "(none)".to_string();
    }
    files
        .iter()
        .map(|(name, content)| format!("=== {name} ===\n{content}"))
        .collect::<Vec<_>>()
        .join("\n\n")
}

fn render_diagnosis(diagnosis: &Diagnosis) -> String {
    if diagnosis.root_cause.is_empty() && diagnosis.fix_suggestions.is_empty() {
        return "no detailed analysis available".to_string();
    }
    let mut out = format!("Error type: {}\n", diagnosis.error_type);
    if let Some(location) = &diagnosis.location {
        out.push_str(&format!("Location: {location}\n"));
    }
    out.push_str(&format!("Root cause: {}\n", diagnosis.root_cause));
    for suggestion in &diagnosis.fix_suggestions {
        out.push_str(&format!("- {suggestion}\n"));
    }
    out
}

/// Error excerpts from harness output.
///
/// A line containing `ERROR`, `FAILED` or `SyntaxError` opens an excerpt;
/// following non-blank lines are appended to it.
#[must_use]
pub fn failure_excerpts(output: &str, max: usize) -> Vec<String> {
    let mut excerpts: Vec<String> = Vec::new();
    let mut current: Option<String> = None;

    for line in output.lines() {
        if line.contains("ERROR") || line.contains("FAILED") || line.contains("SyntaxError") {
            if let Some(done) = current.take() {
                excerpts.push(done);
            }
            current = Some(line.to_string());
        } else if let Some(excerpt) = current.as_mut()
            && !line.trim().is_empty()
        {
            excerpt.push('\n');
            excerpt.push_str(line);
        }
    }
    if let Some(done) = current {
        excerpts.push(done);
    }

    excerpts.truncate(max);
    excerpts
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_excerpts_group_following_lines() {
        let output = "collected 2 items\n\nFAILED test_calc.py::test_add\n  assert 3 == 4\n\nERROR test_calc.py - ImportError\n  no module\n2 failed";
        let excerpts = failure_excerpts(output, 5);
        assert_eq!(excerpts.len(), 2);
        assert_eq!(excerpts[0], "FAILED test_calc.py::test_add\n  assert 3 == 4");
        assert!(excerpts[1].starts_with("ERROR test_calc.py"));
        assert!(excerpts[1].contains("2 failed"));
    }

    #[test]
    fn test_excerpts_are_capped() {
        let output = (0..10).map(|i| format!("FAILED t{i}")).collect::<Vec<_>>().join("\n");
        assert_eq!(failure_excerpts(&output, MAX_ERROR_EXCERPTS).len(), 5);
    }

    #[test]
    fn test_diagnose_prompt_truncates_output() {
        let raw = "y".repeat(5000);
        let prompt = task_prompt(&ActionRequest::Diagnose { raw_output: raw });
        assert!(prompt.contains(&"y".repeat(DIAGNOSIS_OUTPUT_CHARS)));
        assert!(!prompt.contains(&"y".repeat(DIAGNOSIS_OUTPUT_CHARS + 1)));
        assert!(prompt.contains("\"error_type\""));
    }

    #[test]
    fn test_write_tests_prompt_lists_code() {
        let mut code = BTreeMap::new();
        code.insert("calc.py".to_string(), "def add(a, b): return a + b".to_string());
        let prompt = task_prompt(&ActionRequest::WriteTests {
            design: "calculator".into(),
            code,
        });
        assert!(prompt.contains("=== calc.py ===\ndef add"));
        assert!(prompt.contains("sys.path.insert"));
    }

    #[test]
    fn test_repair_prompt_includes_diagnosis() {
        let prompt = task_prompt(&ActionRequest::Repair {
            failure_output: "E ImportError".into(),
            diagnosis: Diagnosis {
                error_type: "import-error".into(),
                root_cause: "add is missing".into(),
                ..Diagnosis::default()
            },
            code: BTreeMap::new(),
            tests: BTreeMap::new(),
        });
        assert!(prompt.contains("Error type: import-error"));
        assert!(prompt.contains("Root cause: add is missing"));
    }

    #[test]
    fn test_system_prompts_are_distinct() {
        assert_ne!(
            system_prompt(CollaboratorRole::Architect),
            system_prompt(CollaboratorRole::Developer)
        );
        assert!(system_prompt(CollaboratorRole::Qa).contains("JSON"));
    }
}
