//! Utility functions

pub mod validation;

pub use validation::validate_unit_name;
