//! Operator directives attached to a collaborator.
//!
//! Each collaborator keeps a bounded trailing window of instructions. The
//! window is rendered ahead of every prompt until it is cleared.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;

/// Number of instructions surfaced per request
pub const INSTRUCTION_WINDOW: usize = 3;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Instruction {
    pub text: String,
    pub timestamp: DateTime<Utc>,
}

impl Instruction {
    #[must_use]
    pub fn new(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            timestamp: Utc::now(),
        }
    }
}

/// Bounded instruction window; the oldest entry is evicted past capacity.
#[derive(Debug, Clone)]
pub struct InstructionLog {
    entries: VecDeque<Instruction>,
    capacity: usize,
}

impl Default for InstructionLog {
    fn default() -> Self {
        Self::with_capacity(INSTRUCTION_WINDOW)
    }
}

impl InstructionLog {
    #[must_use]
    pub fn with_capacity(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            entries: VecDeque::with_capacity(capacity),
            capacity,
        }
    }

    /// Append a directive. Blank text is ignored and `false` returned.
    pub fn push(&mut self, text: &str) -> bool {
        let text = text.trim();
        if text.is_empty() {
            return false;
        }
        if self.entries.len() == self.capacity {
            self.entries.pop_front();
        }
        self.entries.push_back(Instruction::new(text));
        true
    }

    pub fn clear(&mut self) {
        self.entries.clear();
    }

    /// Current window, oldest first
    #[must_use]
    pub fn recent(&self) -> Vec<Instruction> {
        self.entries.iter().cloned().collect()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Directive block, or an empty string when there are no instructions.
    #[must_use]
    pub fn render_prefix(&self) -> String {
        self.entries
            .iter()
            .enumerate()
            .map(|(i, ins)| format!("[Operator directive {}]: {}", i + 1, ins.text))
            .collect::<Vec<_>>()
            .join("\n\n")
    }

    /// Compose the directive block ahead of `prompt`.
    #[must_use]
    pub fn apply(&self, prompt: &str) -> String {
        if self.entries.is_empty() {
            prompt.to_string()
        } else {
            format!("{}\n\n{prompt}", self.render_prefix())
        }
    }
}
