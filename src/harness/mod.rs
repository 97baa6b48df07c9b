//! Execution harness
//!
//! Turns raw submitted text into an isolated, built, invoked, measured and
//! reclaimed unit of work:
//!
//! 1. **Workspace** (`workspace.rs`): one fresh directory per submission.
//! 2. **Build** (`build.rs`): writes sources and runs the compiler.
//! 3. **Loader** (`loader.rs`): validates artifacts and enumerates test entry points.
//! 4. **Guard** (`guard.rs`): runs each entry point under a hard deadline.
//! 5. **Metrics** (`metrics.rs`): size and speed metrics, composite score.
//! 6. **Cleanup** (`cleanup.rs`): background reclamation of workspaces.
//!
//! `pipeline.rs` wires the stages together behind [`Harness`].

pub mod build;
pub mod cleanup;
pub mod guard;
pub mod loader;
pub mod metrics;
pub mod pipeline;
pub mod workspace;

pub use build::{BuildOutput, BuildStage};
pub use cleanup::{CleanupQueue, DeletionRequest, SweepStats};
pub use guard::ExecutionGuard;
pub use loader::{ArtifactKind, ArtifactLoader, LoadedUnit};
pub use metrics::{Baseline, Scorer};
pub use pipeline::Harness;
pub use workspace::{Workspace, WorkspaceManager};

#[cfg(test)]
pub(crate) mod fixtures {
    use std::path::Path;

    use crate::config::Config;
    use crate::models::{SourceUnit, SubmissionRequest};

    pub const INVERT_SOURCE: &str = r#"pub fn invert(values: &[i32]) -> Vec<i32> {
    values.iter().map(|x| x * -1).collect()
}
"#;

    pub const INVERT_TESTS: &str = r#"use kata::invert;

#[test]
fn inverts_mixed_values() {
    assert_eq!(invert(&[1, 3, -2, 1, 2]), vec![-1, -3, 2, -1, -2]);
}

#[test]
fn inverts_empty_slice() {
    assert!(invert(&[]).is_empty());
}

#[test]
#[ignore]
fn not_graded() {
    panic!("ignored entry points never run");
}
"#;

    /// Config rooted in a temporary directory with short deadlines
    pub fn config(root: &Path) -> Config {
        let mut config = Config::default();
        config.storage.workspace_root = root.to_path_buf();
        config.execution.entry_point_timeout_secs = 5;
        config.toolchain.compile_timeout_secs = 120;
        config
    }

    pub fn request(source: &str, tests: &str) -> SubmissionRequest {
        SubmissionRequest {
            source: SourceUnit::new("kata", source),
            test: SourceUnit::new("kata_test", tests),
            baseline_speed: 1.0,
            baseline_size: 1.0,
        }
    }

    /// Number of entries directly under `root`
    pub fn entries(root: &Path) -> usize {
        std::fs::read_dir(root).map(|dir| dir.count()).unwrap_or(0)
    }
}
