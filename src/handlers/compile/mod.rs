//! Compile-and-grade handlers

mod handler;
pub mod request;
pub mod response;

pub use handler::*;
pub use request::*;
pub use response::*;

use axum::{routing::post, Router};

use crate::state::AppState;

/// Grading routes
pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/", post(handler::compile))
        .route("/batch", post(handler::compile_batch))
}
