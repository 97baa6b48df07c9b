//! Score and measurement models

use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Outcome status of a graded submission
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ScoreStatus {
    Ok,
    Error,
}

/// Result of grading one submission
///
/// Metric fields are present only when they were computed; errors short-circuit
/// before any metric exists. NaN values serialize as `null`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ScoreResult {
    pub status: ScoreStatus,
    pub message: String,
    /// Size metric ("brevity") in characters
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub size: Option<u64>,
    /// Average entry point duration ("rapidity") in milliseconds
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub speed: Option<f64>,
    /// Composite score
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub total_score: Option<f64>,
}

impl ScoreResult {
    /// Create a successful result
    pub fn ok(message: impl Into<String>, size: u64, speed: f64, total_score: f64) -> Self {
        Self {
            status: ScoreStatus::Ok,
            message: message.into(),
            size: Some(size),
            speed: Some(speed),
            total_score: Some(total_score),
        }
    }

    /// Create an error result without metrics
    pub fn error(message: impl Into<String>) -> Self {
        Self {
            status: ScoreStatus::Error,
            message: message.into(),
            size: None,
            speed: None,
            total_score: None,
        }
    }

    pub fn is_ok(&self) -> bool {
        self.status == ScoreStatus::Ok
    }
}

/// One measured invocation of a test entry point
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExecutionSample {
    pub entry_point: String,
    pub elapsed: Duration,
}

impl ExecutionSample {
    pub fn elapsed_ms(&self) -> f64 {
        self.elapsed.as_secs_f64() * 1000.0
    }
}
