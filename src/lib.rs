//! GradeBench - Submission Grading Harness
//!
//! This library compiles untrusted submissions together with a caller-supplied
//! test suite, runs every test entry point under a hard deadline and scores the
//! result on speed and compiled size relative to a baseline.
//!
//! # Features
//!
//! - One isolated workspace directory per submission
//! - Per-entry-point deadlines with process termination
//! - Assembly-size and mean-duration metrics with a composite score
//! - Deferred, retried workspace reclamation by a background sweeper
//!
//! # Architecture
//!
//! The application follows a layered architecture:
//! - **Handlers**: HTTP request handlers (thin layer)
//! - **Services**: Request-level orchestration
//! - **Harness**: Workspace, build, load, execution, metrics and cleanup stages
//! - **Models**: Domain models and DTOs

pub mod config;
pub mod constants;
pub mod error;
pub mod handlers;
pub mod harness;
pub mod middleware;
pub mod models;
pub mod services;
pub mod state;
pub mod utils;

// Re-export commonly used types
pub use config::Config;
pub use error::{AppError, AppResult, HarnessError, HarnessResult};
pub use harness::Harness;
pub use state::AppState;
