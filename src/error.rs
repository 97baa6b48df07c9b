//! Custom error types and handling
//!
//! [`HarnessError`] is the taxonomy of the grading pipeline. [`AppError`] wraps it
//! for the HTTP adapter and implements conversion to responses for the Axum framework.

use std::time::Duration;

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};

use crate::models::ScoreResult;

/// Failure of one submission's pipeline
#[derive(Debug, thiserror::Error)]
pub enum HarnessError {
    /// The workspace could not be allocated or written
    #[error("Workspace error: {0}")]
    Workspace(String),

    /// Submitted code or test code does not build
    #[error("{diagnostics}")]
    Compile { diagnostics: String },

    /// The compiler itself could not be invoked
    #[error("Build infrastructure error: {0}")]
    BuildInfra(String),

    /// A built artifact is missing, oversized, truncated or malformed
    #[error("{0}")]
    Load(String),

    /// An entry point failed inside its own logic
    #[error("{cause}")]
    Execution { cause: String },

    /// An entry point exceeded the execution budget
    #[error("Execution too slow: `{entry_point}` did not finish within {}s", .limit.as_secs_f64())]
    Timeout { entry_point: String, limit: Duration },

    /// Invalid baseline values supplied for scoring
    #[error("Invalid scoring configuration: {0}")]
    Config(String),
}

impl HarnessError {
    /// Get the error code for this error type
    pub fn error_code(&self) -> &'static str {
        match self {
            Self::Workspace(_) => "WORKSPACE_ERROR",
            Self::Compile { .. } => "COMPILATION_ERROR",
            Self::BuildInfra(_) => "BUILD_INFRA_ERROR",
            Self::Load(_) => "LOAD_ERROR",
            Self::Execution { .. } => "EXECUTION_ERROR",
            Self::Timeout { .. } => "TIME_LIMIT_EXCEEDED",
            Self::Config(_) => "CONFIG_ERROR",
        }
    }

    /// Whether the failure is a fault of the harness rather than of the submission
    pub fn is_internal(&self) -> bool {
        matches!(self, Self::Workspace(_) | Self::BuildInfra(_))
    }

    /// Get the HTTP status code for this error
    pub fn status_code(&self) -> StatusCode {
        match self {
            Self::Compile { .. } | Self::Load(_) | Self::Execution { .. } | Self::Timeout { .. } => {
                StatusCode::UNPROCESSABLE_ENTITY
            }
            Self::Config(_) => StatusCode::BAD_REQUEST,
            Self::Workspace(_) | Self::BuildInfra(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Message shown to the submitter
    ///
    /// Infrastructure faults are logged in full and replaced by a generic message.
    pub fn public_message(&self) -> String {
        if self.is_internal() {
            tracing::error!(code = self.error_code(), "Internal harness error: {}", self);
            "An internal error occurred while grading the submission".to_string()
        } else {
            self.to_string()
        }
    }
}

/// Result type alias using HarnessError
pub type HarnessResult<T> = Result<T, HarnessError>;

/// Error type of the HTTP adapter
#[derive(Debug, thiserror::Error)]
pub enum AppError {
    #[error(transparent)]
    Harness(#[from] HarnessError),

    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Internal server error")]
    Internal(#[from] anyhow::Error),
}

impl AppError {
    /// Get the HTTP status code for this error
    pub fn status_code(&self) -> StatusCode {
        match self {
            Self::Harness(e) => e.status_code(),
            Self::Validation(_) => StatusCode::BAD_REQUEST,
            Self::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = self.status_code();

        // Log internal errors but don't expose details to clients
        let message = match &self {
            AppError::Harness(e) => e.public_message(),
            AppError::Internal(e) => {
                tracing::error!("Internal error: {:?}", e);
                "An internal error occurred".to_string()
            }
            AppError::Validation(_) => self.to_string(),
        };

        (status, Json(ScoreResult::error(message))).into_response()
    }
}

impl From<validator::ValidationErrors> for AppError {
    fn from(err: validator::ValidationErrors) -> Self {
        AppError::Validation(err.to_string())
    }
}

/// Result type alias using AppError
pub type AppResult<T> = Result<T, AppError>;
