//! Compile request DTOs

use serde::Deserialize;
use validator::Validate;

use crate::{
    error::{AppError, AppResult},
    models::{SourceUnit, SubmissionRequest},
    utils::validate_unit_name,
};

/// Grade one submission
#[derive(Debug, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct CompileRequest {
    /// Submitted source code
    #[validate(length(min = 1, max = 1048576))] // 1MB max
    pub code: String,

    /// Unit name of the submitted code
    #[serde(alias = "className")]
    #[validate(custom(function = "validate_unit_name_field"))]
    pub unit_name: String,

    /// Test suite source code
    #[validate(length(min = 1, max = 1048576))]
    pub test_code: String,

    /// Unit name of the test suite
    #[serde(alias = "testClassName")]
    #[validate(custom(function = "validate_unit_name_field"))]
    pub test_unit_name: String,

    /// Reference average entry point duration in milliseconds
    #[serde(alias = "averageSpeed")]
    pub baseline_speed: f64,

    /// Reference size metric in characters
    #[serde(alias = "averageBrevity")]
    pub baseline_size: f64,
}

impl CompileRequest {
    /// Validate the request and convert it into a harness submission
    pub fn into_submission(self) -> AppResult<SubmissionRequest> {
        self.validate()?;

        if self.unit_name == self.test_unit_name {
            return Err(AppError::Validation(
                "unitName and testUnitName must differ".to_string(),
            ));
        }

        Ok(SubmissionRequest {
            source: SourceUnit::new(self.unit_name, self.code),
            test: SourceUnit::new(self.test_unit_name, self.test_code),
            baseline_speed: self.baseline_speed,
            baseline_size: self.baseline_size,
        })
    }
}

fn validate_unit_name_field(name: &str) -> Result<(), validator::ValidationError> {
    validate_unit_name(name).map_err(|message| {
        let mut err = validator::ValidationError::new("invalid_unit_name");
        err.message = Some(message.into());
        err
    })
}
