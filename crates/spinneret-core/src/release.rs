//! Unbounded production run of an accepted program.

use std::sync::Arc;

use tracing::info;
use uuid::Uuid;

use crate::domain::{ExecutionResult, Result};
use crate::obs;
use crate::sandbox::ProgramRunner;
use crate::workspace::ProjectWorkspace;

/// Artifact name for the persisted release result.
pub const RELEASE_RESULT_FILE: &str = "release_result.json";

/// Runs the program currently on disk without a time budget and persists
/// the result next to the project manifest.
pub struct ReleaseRunner {
    runner: Arc<dyn ProgramRunner>,
}

impl ReleaseRunner {
    pub fn new(runner: Arc<dyn ProgramRunner>) -> Self {
        Self { runner }
    }

    pub async fn run(&self, run_id: Uuid, project: &ProjectWorkspace) -> Result<ExecutionResult> {
        info!(
            event = "release.started",
            run_id = %run_id,
            spider = project.spider_name(),
            generation = project.current_generation(),
        );

        let result = self
            .runner
            .run(project, project.current_generation(), None)
            .await?;

        project.write_artifact(RELEASE_RESULT_FILE, &result)?;
        obs::emit_release_finished(run_id, &result);
        Ok(result)
    }
}
