//! Packaging stage.

use async_trait::async_trait;
use serde_json::json;

use forgeloop_artifacts::package_release;
use forgeloop_stage_api::{Stage, StageError, StageResult, WorkflowContext};

use crate::{PACKAGING, VERIFICATION, step};

/// Bundles the verified code into `releases/release_<stamp>.tar.gz`.
#[derive(Debug, Clone, Default)]
pub struct PackagingStage;

impl PackagingStage {
    #[must_use]
    pub const fn new() -> Self {
        Self
    }
}

#[async_trait]
impl Stage for PackagingStage {
    fn name(&self) -> &str {
        PACKAGING
    }

    fn can_execute(&self, ctx: &WorkflowContext) -> bool {
        ctx.succeeded(VERIFICATION)
    }

    async fn execute(&self, ctx: &mut WorkflowContext) -> Result<StageResult, StageError> {
        let release = step!(package_release(ctx.store()), "packaging failed");
        Ok(StageResult::success(json!({
            "package_path": release.archive,
            "release_dir": release.directory,
            "files": release.files,
        }))
        .with_metadata("release", json!(release.name)))
    }
}
