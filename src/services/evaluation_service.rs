//! Evaluation service - grading submissions through the harness

use std::collections::BTreeMap;

use crate::{
    error::AppResult,
    harness::Harness,
    models::{ScoreResult, SubmissionRequest},
};

/// Evaluation service
pub struct EvaluationService;

impl EvaluationService {
    /// Grade one submission, surfacing failures as [`crate::error::AppError`]
    pub async fn evaluate(harness: &Harness, request: &SubmissionRequest) -> AppResult<ScoreResult> {
        tracing::info!(
            unit = %request.source.name,
            test_unit = %request.test.name,
            "Evaluating submission"
        );

        Ok(harness.evaluate(request).await?)
    }

    /// Grade a batch concurrently; each failure becomes an error result for its key
    pub async fn evaluate_batch(
        harness: &Harness,
        requests: BTreeMap<String, SubmissionRequest>,
    ) -> BTreeMap<String, ScoreResult> {
        tracing::info!(count = requests.len(), "Evaluating submission batch");

        harness.evaluate_all(requests).await
    }
}
