//! Coding stage: implementation, tests and an optional advisory review.

use async_trait::async_trait;
use serde_json::json;
use std::collections::BTreeMap;
use tracing::{info, warn};

use forgeloop_artifacts::{ArtifactStore, Category, classify};
use forgeloop_llm::{ActionRequest, Review};
use forgeloop_stage_api::{Stage, StageError, StageResult, WorkflowContext};
use forgeloop_utils::error::{ArtifactError, CollaboratorError};

use crate::{ARCHITECTURE_DESIGN, CODING, DESIGN_FILE, REVIEW_FILE, step, unexpected_output};

/// Produces `code/*` from the design, then `tests/*` from design and code.
#[derive(Debug, Clone, Default)]
pub struct CodingStage;

impl CodingStage {
    #[must_use]
    pub const fn new() -> Self {
        Self
    }
}

#[async_trait]
impl Stage for CodingStage {
    fn name(&self) -> &str {
        CODING
    }

    fn can_execute(&self, ctx: &WorkflowContext) -> bool {
        ctx.succeeded(ARCHITECTURE_DESIGN)
    }

    async fn execute(&self, ctx: &mut WorkflowContext) -> Result<StageResult, StageError> {
        let design = step!(
            ctx.store().read(Category::Design, DESIGN_FILE),
            "design document unavailable"
        );

        let implementation = step!(
            ctx.collaborators()
                .request(&ActionRequest::Implement {
                    design: design.clone()
                })
                .await,
            "implementation failed"
        )
        .into_files()
        .ok_or_else(|| unexpected_output("implement"))?;

        let code_files = step!(
            save_files(ctx.store(), &implementation, classify),
            "could not store code"
        );
        if !code_files.iter().any(|(c, _)| *c == Category::Code) {
            return Ok(StageResult::failed(
                "implementation produced no code artifacts",
            ));
        }

        let code = step!(
            ctx.store().read_all(Category::Code),
            "could not read code back"
        );
        let test_output = step!(
            ctx.collaborators()
                .request(&ActionRequest::WriteTests {
                    design,
                    code: code.clone()
                })
                .await,
            "test generation failed"
        )
        .into_files()
        .ok_or_else(|| unexpected_output("write-tests"))?;

        let test_files = step!(
            save_files(ctx.store(), &test_output, |_| Category::Tests),
            "could not store tests"
        );

        let names = |saved: &[(Category, String)], category: Category| -> Vec<String> {
            saved
                .iter()
                .filter(|(c, _)| *c == category)
                .map(|(_, n)| n.clone())
                .collect()
        };
        let code_names: Vec<String> = names(&code_files, Category::Code);
        let mut test_names = names(&code_files, Category::Tests);
        test_names.extend(names(&test_files, Category::Tests));
        test_names.sort();
        test_names.dedup();

        info!(
            code = code_names.len(),
            tests = test_names.len(),
            "Coding stage wrote artifacts"
        );

        let mut result = StageResult::success(json!({
            "code": code_names,
            "tests": test_names,
        }));

        if ctx.config().workflow.review_code
            && let Some(review) = review_code(ctx, code).await?
        {
            result = result
                .with_metadata("review_score", json!(review.overall_score))
                .with_metadata("review_issues", json!(review.issues.len()));
        }

        Ok(result)
    }
}

/// Advisory review by the qa collaborator. Failures never fail the stage.
async fn review_code(
    ctx: &WorkflowContext,
    code: BTreeMap<String, String>,
) -> Result<Option<Review>, StageError> {
    let review = match ctx
        .collaborators()
        .request(&ActionRequest::ReviewCode { code })
        .await
    {
        Ok(output) => output
            .into_review()
            .ok_or_else(|| unexpected_output("review-code"))?,
        Err(StageError::Collaborator(CollaboratorError::MalformedResponse { raw, .. })) => {
            Review::from_raw(&raw)
        }
        Err(StageError::Collaborator(e)) => {
            warn!(error = %e, "Code review unavailable, continuing without it");
            return Ok(None);
        }
        Err(other) => return Err(other),
    };

    let body = serde_json::to_string_pretty(&review)
        .map_err(|e| StageError::Internal(format!("failed to serialize review: {e}")))?;
    if let Err(e) = ctx.store().save(Category::Reports, REVIEW_FILE, &body) {
        warn!(error = %e, "Failed to store code review");
    }
    Ok(Some(review))
}

/// Save a generated file set, routing each file with `route`.
///
/// Names that fail sanitization are skipped with a warning; any other store
/// error aborts. Returns `(category, stored name)` for each saved file.
pub(crate) fn save_files(
    store: &dyn ArtifactStore,
    files: &BTreeMap<String, String>,
    route: impl Fn(&str) -> Category,
) -> Result<Vec<(Category, String)>, ArtifactError> {
    let mut saved = Vec::with_capacity(files.len());
    for (name, content) in files {
        let category = route(name);
        match store.save(category, name, content) {
            Ok(stored) => saved.push((category, stored)),
            Err(ArtifactError::InvalidName { name, reason }) => {
                warn!(name = %name, reason = %reason, "Skipping generated file with invalid name");
            }
            Err(e) => return Err(e),
        }
    }
    Ok(saved)
}
