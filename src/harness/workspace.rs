//! Per-submission workspace directories
//!
//! Every submission gets `<root>/<uuid-v4>`, which exclusively owns its source
//! files and build outputs. Dropping a [`Workspace`] hands the directory to the
//! [`CleanupQueue`], so reclamation happens on every exit path, including early
//! returns and unwinding.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use tokio::fs;
use uuid::Uuid;

use crate::error::{HarnessError, HarnessResult};

use super::cleanup::CleanupQueue;

/// Allocates workspaces under a configured root
pub struct WorkspaceManager {
    root: PathBuf,
    cleanup: Arc<CleanupQueue>,
}

impl WorkspaceManager {
    pub fn new(root: impl Into<PathBuf>, cleanup: Arc<CleanupQueue>) -> Self {
        Self {
            root: root.into(),
            cleanup,
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Create a fresh, uniquely named workspace directory
    pub async fn allocate(&self) -> HarnessResult<Workspace> {
        fs::create_dir_all(&self.root).await.map_err(|e| {
            HarnessError::Workspace(format!(
                "Failed to create workspace root {}: {}",
                self.root.display(),
                e
            ))
        })?;

        let id = Uuid::new_v4();
        let dir = self.root.join(id.to_string());

        // `create_dir` fails on an existing path, so a collision can never be reused
        fs::create_dir(&dir).await.map_err(|e| {
            HarnessError::Workspace(format!(
                "Failed to create workspace directory {}: {}",
                dir.display(),
                e
            ))
        })?;

        tracing::debug!(workspace = %id, dir = %dir.display(), "Allocated workspace");

        Ok(Workspace {
            id,
            dir,
            cleanup: Arc::clone(&self.cleanup),
        })
    }
}

/// Directory owning all files of one submission
#[derive(Debug)]
pub struct Workspace {
    id: Uuid,
    dir: PathBuf,
    cleanup: Arc<CleanupQueue>,
}

impl Workspace {
    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn source_path(&self, unit: &str) -> PathBuf {
        self.dir.join(format!("{unit}.rs"))
    }

    pub fn library_path(&self, unit: &str) -> PathBuf {
        self.dir.join(format!("lib{unit}.rlib"))
    }

    pub fn assembly_path(&self, unit: &str) -> PathBuf {
        self.dir.join(format!("{unit}.s"))
    }

    pub fn executable_path(&self, unit: &str) -> PathBuf {
        self.dir
            .join(format!("{unit}{}", std::env::consts::EXE_SUFFIX))
    }

    /// Write one named source file, creating the directory if it is absent
    pub async fn write_source(&self, unit: &str, text: &str) -> HarnessResult<PathBuf> {
        fs::create_dir_all(&self.dir).await.map_err(|e| {
            HarnessError::Workspace(format!(
                "Failed to create workspace directory {}: {}",
                self.dir.display(),
                e
            ))
        })?;

        let path = self.source_path(unit);
        fs::write(&path, text).await.map_err(|e| {
            HarnessError::Workspace(format!(
                "Failed to write source file {}: {}",
                path.display(),
                e
            ))
        })?;

        Ok(path)
    }
}

impl Drop for Workspace {
    fn drop(&mut self) {
        self.cleanup.enqueue(self.dir.clone());
        tracing::debug!(workspace = %self.id, "Workspace handed to cleanup queue");
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_allocate_creates_unique_directories() {
        let root = tempfile::tempdir().unwrap();
        let queue = Arc::new(CleanupQueue::new());
        let manager = WorkspaceManager::new(root.path().join("ws"), Arc::clone(&queue));

        let first = manager.allocate().await.unwrap();
        let second = manager.allocate().await.unwrap();

        assert_ne!(first.id(), second.id());
        assert_ne!(first.dir(), second.dir());
        assert!(first.dir().is_dir());
        assert!(second.dir().is_dir());
        assert_eq!(first.dir().parent(), Some(manager.root()));
    }

    #[tokio::test]
    async fn test_write_source_recreates_missing_directory() {
        let root = tempfile::tempdir().unwrap();
        let queue = Arc::new(CleanupQueue::new());
        let manager = WorkspaceManager::new(root.path(), queue);

        let workspace = manager.allocate().await.unwrap();
        std::fs::remove_dir(workspace.dir()).unwrap();

        let path = workspace.write_source("kata", "pub fn f() {}").await.unwrap();
        assert_eq!(path, workspace.source_path("kata"));
        assert_eq!(std::fs::read_to_string(&path).unwrap(), "pub fn f() {}");
    }

    #[tokio::test]
    async fn test_allocate_fails_when_root_is_a_file() {
        let root = tempfile::tempdir().unwrap();
        let blocker = root.path().join("blocker");
        std::fs::write(&blocker, b"not a directory").unwrap();

        let manager = WorkspaceManager::new(&blocker, Arc::new(CleanupQueue::new()));
        let err = manager.allocate().await.unwrap_err();
        assert!(matches!(err, HarnessError::Workspace(_)));
    }

    #[tokio::test]
    async fn test_drop_enqueues_directory() {
        let root = tempfile::tempdir().unwrap();
        let queue = Arc::new(CleanupQueue::new());
        let manager = WorkspaceManager::new(root.path(), Arc::clone(&queue));

        let workspace = manager.allocate().await.unwrap();
        let dir = workspace.dir().to_path_buf();
        assert!(queue.is_empty());

        drop(workspace);
        assert!(queue.contains(&dir));
    }

    #[test]
    fn test_artifact_paths() {
        let queue = Arc::new(CleanupQueue::new());
        let workspace = Workspace {
            id: Uuid::nil(),
            dir: PathBuf::from("/ws/x"),
            cleanup: queue,
        };
        assert_eq!(workspace.source_path("kata"), PathBuf::from("/ws/x/kata.rs"));
        assert_eq!(workspace.library_path("kata"), PathBuf::from("/ws/x/libkata.rlib"));
        assert_eq!(workspace.assembly_path("kata"), PathBuf::from("/ws/x/kata.s"));
    }
}
