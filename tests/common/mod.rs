//! Shared fixtures for integration tests
//!
//! Every role is bound to one [`ScriptedBackend`], so replies are consumed in
//! pipeline order: requirements, design, implementation, tests, then one
//! diagnosis and one repair per failed verification attempt.

#![allow(dead_code)]

use std::sync::Arc;
use tempfile::TempDir;

use forgeloop::llm::testing::ScriptedBackend;
use forgeloop::runner::testing::ScriptedHarness;
use forgeloop::{Config, ConfigBuilder, Pipeline, PipelineBuilder};

pub const REQUIREMENTS: &str = "# Requirements\n- add(a, b) returns the sum\n- subtract(a, b)";
pub const DESIGN: &str = "# Design\nModule calc.py exposes add and subtract.";
pub const IMPL: &str = "=== FILE: calc.py ===\n```python\ndef add(a, b):\n    return a - b\n```";
pub const TESTS: &str = "=== FILE: test_calc.py ===\n```python\nfrom calc import add\n\ndef test_add():\n    assert add(1, 2) == 3\n```";
pub const DIAGNOSIS: &str = r#"{"error_type": "import-error", "location": "calc.py:1",
    "root_cause": "add is not exported", "fix_suggestions": ["define add"], "priority": "high"}"#;
pub const REPAIR: &str = "=== FILE: calc.py ===\n```python\ndef add(a, b):\n    return a + b\n```";

/// Replies for the four document and code actions
pub fn opening_replies() -> Vec<String> {
    [REQUIREMENTS, DESIGN, IMPL, TESTS]
        .iter()
        .map(|s| (*s).to_string())
        .collect()
}

/// Opening replies followed by `repairs` diagnosis/repair pairs.
pub fn replies_with_repairs(repairs: usize) -> Vec<String> {
    let mut replies = opening_replies();
    for _ in 0..repairs {
        replies.push(DIAGNOSIS.to_string());
        replies.push(REPAIR.to_string());
    }
    replies
}

pub struct Fixture {
    pub temp: TempDir,
    pub backend: Arc<ScriptedBackend>,
    pub harness: Arc<ScriptedHarness>,
    pub pipeline: Pipeline,
}

impl Fixture {
    /// Pipeline over a fresh temp artifact root.
    pub fn new(
        configure: impl FnOnce(ConfigBuilder) -> ConfigBuilder,
        replies: Vec<String>,
        harness: ScriptedHarness,
    ) -> Self {
        let temp = TempDir::new().unwrap();
        let config: Config = configure(Config::builder().artifact_root(temp.path().join("ws")))
            .build()
            .unwrap();
        let backend = Arc::new(ScriptedBackend::new(replies));
        let harness = Arc::new(harness);
        let pipeline = PipelineBuilder::from_config(config)
            .with_backend(backend.clone())
            .with_harness(harness.clone())
            .build()
            .unwrap();
        Self {
            temp,
            backend,
            harness,
            pipeline,
        }
    }

    pub fn root(&self) -> std::path::PathBuf {
        self.temp.path().join("ws")
    }
}
