//! Prompt composition for each role and action.

use std::collections::BTreeMap;

use forgeloop_utils::types::CollaboratorRole;

use crate::actions::ActionRequest;
use crate::parse::{Diagnosis, truncate_chars};

/// Characters of harness output included in a diagnosis prompt
pub const DIAGNOSIS_OUTPUT_CHARS: usize = 2000;

/// Error excerpts included in a diagnosis prompt
pub const MAX_ERROR_EXCERPTS: usize = 5;

const ARCHITECT_SYSTEM: &str = "You are a senior product architect. You turn loosely worded \
requests into precise requirement documents and design small, testable Python systems. \
Prefer simple module layouts and state every interface explicitly.";

const DEVELOPER_SYSTEM: &str = "You are a careful Python developer. You write complete, \
runnable code that follows PEP 8, with clear names and docstrings. Always return files in \
the requested `=== FILE: name ===` format and never prefix file names with directories.";

const QA_SYSTEM: &str = "You are a QA engineer. You analyse test failures down to their root \
cause and review code for defects. When asked for JSON, reply with a single JSON object and \
nothing else.";

const FILE_FORMAT: &str = "Output every file in this format:
