//! Application state management
//!
//! This module contains the shared application state that is passed
//! to all request handlers via Axum's State extractor.

use std::sync::Arc;

use crate::config::Config;
use crate::harness::{CleanupQueue, Harness};

/// Shared application state
#[derive(Clone)]
pub struct AppState {
    inner: Arc<AppStateInner>,
}

/// Inner state (wrapped in Arc for cheap cloning)
struct AppStateInner {
    /// Grading pipeline
    pub harness: Harness,

    /// Application configuration
    pub config: Config,
}

impl AppState {
    /// Create a new application state
    pub fn new(config: Config, cleanup: Arc<CleanupQueue>) -> Self {
        Self {
            inner: Arc::new(AppStateInner {
                harness: Harness::new(&config, cleanup),
                config,
            }),
        }
    }

    /// Get a reference to the grading pipeline
    pub fn harness(&self) -> &Harness {
        &self.inner.harness
    }

    /// Get a reference to the configuration
    pub fn config(&self) -> &Config {
        &self.inner.config
    }
}
