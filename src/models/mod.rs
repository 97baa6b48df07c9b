//! Domain models
//!
//! This module contains the domain models that flow through the grading pipeline.

pub mod score;
pub mod submission;

pub use score::*;
pub use submission::*;
