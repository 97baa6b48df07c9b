//! Compile handler implementations

use std::collections::BTreeMap;

use axum::{extract::State, Json};

use crate::{
    error::AppResult,
    models::ScoreResult,
    services::EvaluationService,
    state::AppState,
};

use super::{request::CompileRequest, response::BatchCompileResponse};

/// Compile, run and score one submission
pub async fn compile(
    State(state): State<AppState>,
    Json(payload): Json<CompileRequest>,
) -> AppResult<Json<ScoreResult>> {
    let submission = payload.into_submission()?;
    let score = EvaluationService::evaluate(state.harness(), &submission).await?;

    Ok(Json(score))
}

/// Compile, run and score many submissions concurrently
///
/// Invalid entries get an error result of their own without failing the batch.
pub async fn compile_batch(
    State(state): State<AppState>,
    Json(payload): Json<BTreeMap<String, CompileRequest>>,
) -> Json<BatchCompileResponse> {
    let mut rejected = BTreeMap::new();
    let mut submissions = BTreeMap::new();

    for (key, request) in payload {
        match request.into_submission() {
            Ok(submission) => {
                submissions.insert(key, submission);
            }
            Err(e) => {
                rejected.insert(key, ScoreResult::error(e.to_string()));
            }
        }
    }

    let mut results = EvaluationService::evaluate_batch(state.harness(), submissions).await;
    results.extend(rejected);

    Json(BatchCompileResponse { results })
}
