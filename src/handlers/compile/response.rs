//! Compile response DTOs

use std::collections::BTreeMap;

use serde::Serialize;

use crate::models::ScoreResult;

/// Results of a batch, keyed by submitter
#[derive(Debug, Serialize)]
pub struct BatchCompileResponse {
    pub results: BTreeMap<String, ScoreResult>,
}
