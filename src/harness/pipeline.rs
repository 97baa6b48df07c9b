//! Grading pipeline
//!
//! `evaluate` runs one submission through allocate, build, load, execute and
//! score. The workspace is dropped on every path out of the pipeline, which
//! hands it to the cleanup queue before the result reaches the caller.

use std::collections::BTreeMap;
use std::sync::Arc;

use futures::future::join_all;

use crate::config::Config;
use crate::error::HarnessResult;
use crate::models::{ScoreResult, SubmissionRequest};

use super::build::BuildStage;
use super::cleanup::CleanupQueue;
use super::guard::ExecutionGuard;
use super::loader::{ArtifactKind, ArtifactLoader};
use super::metrics::{self, Baseline, Scorer};
use super::workspace::{Workspace, WorkspaceManager};

/// All pipeline stages, configured once and shared by every submission
pub struct Harness {
    workspaces: WorkspaceManager,
    builder: BuildStage,
    loader: ArtifactLoader,
    guard: ExecutionGuard,
    scorer: Scorer,
    cleanup: Arc<CleanupQueue>,
}

impl Harness {
    pub fn new(config: &Config, cleanup: Arc<CleanupQueue>) -> Self {
        let deadline = config.execution.entry_point_timeout();

        Self {
            workspaces: WorkspaceManager::new(
                config.storage.workspace_root.clone(),
                Arc::clone(&cleanup),
            ),
            builder: BuildStage::new(config.toolchain.clone()),
            loader: ArtifactLoader::new(config.execution.max_artifact_bytes, deadline),
            guard: ExecutionGuard::new(deadline),
            scorer: Scorer::new(config.scoring.scale),
            cleanup,
        }
    }

    pub fn cleanup(&self) -> &Arc<CleanupQueue> {
        &self.cleanup
    }

    /// Grade one submission
    pub async fn evaluate(&self, request: &SubmissionRequest) -> HarnessResult<ScoreResult> {
        // Rejected before any workspace exists
        let baseline = Baseline::new(request.baseline_speed, request.baseline_size)?;

        let workspace = self.workspaces.allocate().await?;
        let workspace_id = workspace.id();
        let result = self.grade(&workspace, request, &baseline).await;
        drop(workspace);

        match &result {
            Ok(score) => tracing::info!(
                workspace = %workspace_id,
                unit = %request.source.name,
                size = score.size,
                speed = score.speed,
                total_score = score.total_score,
                "Submission graded"
            ),
            Err(e) => tracing::info!(
                workspace = %workspace_id,
                unit = %request.source.name,
                code = e.error_code(),
                "Submission rejected"
            ),
        }

        result
    }

    async fn grade(
        &self,
        workspace: &Workspace,
        request: &SubmissionRequest,
        baseline: &Baseline,
    ) -> HarnessResult<ScoreResult> {
        let build = self
            .builder
            .build(workspace, &request.source, &request.test)
            .await?;

        let library = self
            .loader
            .load(workspace, &request.source.name, ArtifactKind::Library)
            .await?;
        tracing::debug!(
            workspace = %workspace.id(),
            unit = %library.name,
            size = library.size,
            digest = %library.digest,
            "Submitted unit loaded"
        );

        let tests = self
            .loader
            .load(workspace, &request.test.name, ArtifactKind::Executable)
            .await?;

        let samples = self.guard.run(&tests).await?;
        let speed = metrics::mean_millis(&samples);
        let size = metrics::brevity(&build.assembly).await;
        let total = self.scorer.total(speed, size, baseline);

        Ok(ScoreResult::ok(
            format!("{} entry points passed", samples.len()),
            size,
            speed,
            total,
        ))
    }

    /// Grade many submissions concurrently, keyed by submitter
    ///
    /// Every failure is collapsed into an error result for its key.
    pub async fn evaluate_all<K: Ord>(
        &self,
        requests: BTreeMap<K, SubmissionRequest>,
    ) -> BTreeMap<K, ScoreResult> {
        let (keys, requests): (Vec<K>, Vec<SubmissionRequest>) = requests.into_iter().unzip();

        let results = join_all(requests.iter().map(|request| self.evaluate(request))).await;

        keys.into_iter()
            .zip(results)
            .map(|(key, result)| {
                let score = result.unwrap_or_else(|e| ScoreResult::error(e.public_message()));
                (key, score)
            })
            .collect()
    }
}
