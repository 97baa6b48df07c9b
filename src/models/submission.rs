//! Submission models

/// One named source file of a submission
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SourceUnit {
    /// Unit name, used as crate name and file stem
    pub name: String,
    /// Source text
    pub text: String,
}

impl SourceUnit {
    pub fn new(name: impl Into<String>, text: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            text: text.into(),
        }
    }
}

/// A submission to grade, already deserialized by the request layer
///
/// Unit names must be valid crate identifiers; the caller is responsible for that.
#[derive(Debug, Clone)]
pub struct SubmissionRequest {
    /// Submitted code
    pub source: SourceUnit,
    /// Test suite exercising the submitted code
    pub test: SourceUnit,
    /// Reference average entry point duration in milliseconds
    pub baseline_speed: f64,
    /// Reference size metric in characters
    pub baseline_size: f64,
}
