//! Requirement analysis and architecture design stages.

use async_trait::async_trait;
use serde_json::json;
use tracing::info;

use forgeloop_artifacts::Category;
use forgeloop_llm::ActionRequest;
use forgeloop_stage_api::{Stage, StageError, StageResult, WorkflowContext};

use crate::{
    ARCHITECTURE_DESIGN, DESIGN_FILE, REQUIREMENT_ANALYSIS, REQUIREMENTS_FILE, step,
    unexpected_output,
};

/// Turns the free-text request into `requirements/requirements.md`.
#[derive(Debug, Clone, Default)]
pub struct RequirementAnalysisStage;

impl RequirementAnalysisStage {
    #[must_use]
    pub const fn new() -> Self {
        Self
    }
}

#[async_trait]
impl Stage for RequirementAnalysisStage {
    fn name(&self) -> &str {
        REQUIREMENT_ANALYSIS
    }

    fn can_execute(&self, ctx: &WorkflowContext) -> bool {
        !ctx.request().trim().is_empty()
    }

    async fn execute(&self, ctx: &mut WorkflowContext) -> Result<StageResult, StageError> {
        let request = ActionRequest::AnalyzeRequirement {
            requirement: ctx.request().to_string(),
        };
        let output = step!(
            ctx.collaborators().request(&request).await,
            "requirement analysis failed"
        );
        let document = output
            .into_document()
            .ok_or_else(|| unexpected_output("analyze-requirement"))?;

        let saved = step!(
            ctx.store()
                .save(Category::Requirements, REQUIREMENTS_FILE, &document),
            "could not store requirements"
        );
        info!(artifact = %saved, chars = document.len(), "Requirements document written");

        Ok(StageResult::success(json!({
            "category": Category::Requirements,
            "artifact": saved,
        })))
    }
}

/// Turns the requirements document into `design/architecture.md`.
#[derive(Debug, Clone, Default)]
pub struct ArchitectureDesignStage;

impl ArchitectureDesignStage {
    #[must_use]
    pub const fn new() -> Self {
        Self
    }
}

#[async_trait]
impl Stage for ArchitectureDesignStage {
    fn name(&self) -> &str {
        ARCHITECTURE_DESIGN
    }

    fn can_execute(&self, ctx: &WorkflowContext) -> bool {
        ctx.succeeded(REQUIREMENT_ANALYSIS)
    }

    async fn execute(&self, ctx: &mut WorkflowContext) -> Result<StageResult, StageError> {
        let requirements = step!(
            ctx.store().read(Category::Requirements, REQUIREMENTS_FILE),
            "requirements document unavailable"
        );

        let output = step!(
            ctx.collaborators()
                .request(&ActionRequest::ProduceDesign { requirements })
                .await,
            "architecture design failed"
        );
        let design = output
            .into_document()
            .ok_or_else(|| unexpected_output("produce-design"))?;

        let saved = step!(
            ctx.store().save(Category::Design, DESIGN_FILE, &design),
            "could not store design"
        );
        info!(artifact = %saved, chars = design.len(), "Architecture document written");

        Ok(StageResult::success(json!({
            "category": Category::Design,
            "artifact": saved,
        })))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::{Backends, memory_context};
    use forgeloop_llm::testing::Reply;

    #[tokio::test]
    async fn test_requirements_written() {
        let backends = Backends::new();
        backends.architect.push("# Requirements\n- add\n- subtract");
        let mut ctx = memory_context(&backends);

        let stage = RequirementAnalysisStage::new();
        assert!(stage.can_execute(&ctx));
        let result = stage.execute(&mut ctx).await.unwrap();

        assert!(result.is_success());
        assert_eq!(result.output()["artifact"], "requirements.md");
        assert!(
            ctx.store()
                .read(Category::Requirements, REQUIREMENTS_FILE)
                .unwrap()
                .contains("subtract")
        );
        assert!(
            backends.architect.prompts()[0].contains("Build a calculator with add and subtract")
        );
    }

    #[tokio::test]
    async fn test_unavailable_collaborator_fails_stage() {
        let backends = Backends::new();
        backends.architect.push(Reply::Unavailable("connection refused".into()));
        let mut ctx = memory_context(&backends);

        let result = RequirementAnalysisStage::new()
            .execute(&mut ctx)
            .await
            .unwrap();

        assert!(result.is_failed());
        assert!(result.error().unwrap().contains("connection refused"));
    }

    #[tokio::test]
    async fn test_design_reads_requirements() {
        let backends = Backends::new();
        backends.architect.push("# Design\ncalc.py");
        let mut ctx = memory_context(&backends);
        ctx.store()
            .save(Category::Requirements, REQUIREMENTS_FILE, "REQ-DOC")
            .unwrap();
        ctx.record_result(REQUIREMENT_ANALYSIS, StageResult::success(json!(null)));

        let stage = ArchitectureDesignStage::new();
        assert!(stage.can_execute(&ctx));
        let result = stage.execute(&mut ctx).await.unwrap();

        assert!(result.is_success());
        assert!(backends.architect.prompts()[0].contains("REQ-DOC"));
        assert_eq!(
            ctx.store().read(Category::Design, DESIGN_FILE).unwrap(),
            "# Design\ncalc.py"
        );
    }

    #[tokio::test]
    async fn test_design_requires_requirements_stage() {
        let backends = Backends::new();
        let ctx = memory_context(&backends);
        assert!(!ArchitectureDesignStage::new().can_execute(&ctx));
    }
}
