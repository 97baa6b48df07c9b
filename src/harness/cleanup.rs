//! Deferred workspace reclamation
//!
//! Workspaces are never deleted inline. Dropped workspaces land in a shared
//! [`CleanupQueue`] and a background sweeper removes them. A failed deletion
//! stays queued and is retried on every later sweep.

use std::collections::HashMap;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use chrono::{DateTime, Utc};
use tokio::fs;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use walkdir::WalkDir;

/// A directory waiting to be deleted
#[derive(Debug, Clone)]
pub struct DeletionRequest {
    pub path: PathBuf,
    pub enqueued_at: DateTime<Utc>,
    /// Failed deletion attempts so far
    pub attempts: u32,
}

impl DeletionRequest {
    /// Time spent in the queue so far
    pub fn age(&self) -> chrono::TimeDelta {
        Utc::now() - self.enqueued_at
    }
}

/// Statistics from a sweep
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct SweepStats {
    pub attempted: usize,
    pub removed: usize,
    pub retained: usize,
}

/// Pending deletions shared between the pipeline and the sweeper
#[derive(Debug, Default)]
pub struct CleanupQueue {
    pending: Mutex<HashMap<PathBuf, DeletionRequest>>,
}

impl CleanupQueue {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<PathBuf, DeletionRequest>> {
        // The map stays consistent even if a holder panicked
        self.pending.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Queue a directory for deletion. Queuing the same path twice is a no-op.
    pub fn enqueue(&self, path: impl Into<PathBuf>) {
        let path = path.into();
        self.lock()
            .entry(path.clone())
            .or_insert_with(|| DeletionRequest {
                path,
                enqueued_at: Utc::now(),
                attempts: 0,
            });
    }

    /// Number of pending deletions
    pub fn pending(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    pub fn contains(&self, path: &Path) -> bool {
        self.lock().contains_key(path)
    }

    /// Attempt every pending deletion once
    ///
    /// Paths that no longer exist count as removed. Failures are logged and
    /// retried on the next sweep.
    pub async fn sweep(&self) -> SweepStats {
        let snapshot: Vec<PathBuf> = self.lock().keys().cloned().collect();
        let mut stats = SweepStats::default();

        for path in snapshot {
            stats.attempted += 1;

            match fs::remove_dir_all(&path).await {
                Ok(()) => {
                    let request = self.lock().remove(&path);
                    stats.removed += 1;
                    if let Some(request) = request {
                        tracing::debug!(
                            queued_ms = request.age().num_milliseconds(),
                            attempts = request.attempts,
                            "Deleted workspace: {:?}",
                            path
                        );
                    }
                }
                Err(e) if e.kind() == ErrorKind::NotFound => {
                    self.lock().remove(&path);
                    stats.removed += 1;
                }
                Err(e) => {
                    let attempts = self
                        .lock()
                        .get_mut(&path)
                        .map(|request| {
                            request.attempts += 1;
                            request.attempts
                        })
                        .unwrap_or_default();
                    stats.retained += 1;
                    tracing::warn!(
                        "Failed to delete {:?} (attempt {}), will retry: {}",
                        path,
                        attempts,
                        e
                    );
                }
            }
        }

        if stats.attempted > 0 {
            tracing::debug!(
                "Cleanup sweep: attempted={}, removed={}, retained={}",
                stats.attempted,
                stats.removed,
                stats.retained
            );
        }

        stats
    }

    /// Run [`sweep`](Self::sweep) every `interval` until the returned task is aborted
    pub fn spawn_sweeper(self: &Arc<Self>, interval: Duration) -> JoinHandle<()> {
        let queue = Arc::clone(self);

        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

            tracing::info!("Cleanup sweeper started (interval {:?})", interval);

            loop {
                ticker.tick().await;
                queue.sweep().await;
            }
        })
    }

    /// Queue every directory left directly under `root` by a previous process
    ///
    /// Returns the number of directories queued.
    pub fn enqueue_leftovers(&self, root: &Path) -> usize {
        if !root.exists() {
            tracing::debug!("Workspace root does not exist, nothing left over");
            return 0;
        }

        let mut queued = 0;
        for entry in WalkDir::new(root).min_depth(1).max_depth(1) {
            let entry = match entry {
                Ok(e) => e,
                Err(e) => {
                    tracing::warn!("Error reading directory entry: {}", e);
                    continue;
                }
            };

            if entry.file_type().is_dir() {
                self.enqueue(entry.into_path());
                queued += 1;
            }
        }

        if queued > 0 {
            tracing::info!("Queued {} leftover workspaces under {:?}", queued, root);
        }

        queued
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_sweep_removes_queued_directory() {
        let root = tempfile::tempdir().unwrap();
        let dir = root.path().join("ws");
        std::fs::create_dir_all(dir.join("nested")).unwrap();
        std::fs::write(dir.join("nested/file.txt"), b"data").unwrap();

        let queue = CleanupQueue::new();
        queue.enqueue(&dir);

        let stats = queue.sweep().await;
        assert_eq!(
            stats,
            SweepStats {
                attempted: 1,
                removed: 1,
                retained: 0
            }
        );
        assert!(!dir.exists());
        assert!(queue.is_empty());
    }

    #[tokio::test]
    async fn test_missing_path_counts_as_removed() {
        let root = tempfile::tempdir().unwrap();
        let queue = CleanupQueue::new();
        queue.enqueue(root.path().join("never-created"));

        let stats = queue.sweep().await;
        assert_eq!(stats.removed, 1);
        assert!(queue.is_empty());
    }

    #[tokio::test]
    async fn test_failed_deletion_is_retried() {
        let root = tempfile::tempdir().unwrap();
        // A regular file cannot be removed as a directory tree
        let path = root.path().join("not-a-dir");
        std::fs::write(&path, b"x").unwrap();

        let queue = CleanupQueue::new();
        queue.enqueue(&path);

        let stats = queue.sweep().await;
        assert_eq!(stats.retained, 1);
        assert!(queue.contains(&path));

        let stats = queue.sweep().await;
        assert_eq!(stats.retained, 1);
        assert_eq!(queue.lock().get(&path).map(|r| r.attempts), Some(2));

        std::fs::remove_file(&path).unwrap();
        let stats = queue.sweep().await;
        assert_eq!(stats.removed, 1);
        assert!(queue.is_empty());
    }

    #[test]
    fn test_enqueue_keeps_first_timestamp() {
        let queue = CleanupQueue::new();
        queue.enqueue("/tmp/a");
        let first = queue.lock()[Path::new("/tmp/a")].enqueued_at;

        std::thread::sleep(Duration::from_millis(5));
        queue.enqueue("/tmp/a");

        let request = queue.lock()[Path::new("/tmp/a")].clone();
        assert_eq!(request.enqueued_at, first);
        assert!(request.age() >= chrono::TimeDelta::milliseconds(5));
    }

    #[test]
    fn test_enqueue_is_idempotent() {
        let queue = CleanupQueue::new();
        queue.enqueue("/tmp/a");
        queue.enqueue("/tmp/a");
        queue.enqueue("/tmp/b");
        assert_eq!(queue.pending(), 2);
    }

    #[tokio::test]
    async fn test_enqueue_leftovers_defers_deletion() {
        let root = tempfile::tempdir().unwrap();
        std::fs::create_dir(root.path().join("old-1")).unwrap();
        std::fs::create_dir(root.path().join("old-2")).unwrap();
        std::fs::write(root.path().join("stray.txt"), b"x").unwrap();

        let queue = CleanupQueue::new();
        assert_eq!(queue.enqueue_leftovers(root.path()), 2);

        // Nothing is deleted until a sweep runs
        assert!(root.path().join("old-1").exists());

        queue.sweep().await;
        assert!(!root.path().join("old-1").exists());
        assert!(!root.path().join("old-2").exists());
        assert!(root.path().join("stray.txt").exists());
    }

    #[test]
    fn test_enqueue_leftovers_missing_root() {
        let queue = CleanupQueue::new();
        assert_eq!(queue.enqueue_leftovers(Path::new("/nonexistent/gradebench")), 0);
    }

    #[tokio::test]
    async fn test_sweeper_reclaims_in_background() {
        let root = tempfile::tempdir().unwrap();
        let dir = root.path().join("ws");
        std::fs::create_dir(&dir).unwrap();

        let queue = Arc::new(CleanupQueue::new());
        let sweeper = queue.spawn_sweeper(Duration::from_millis(20));
        queue.enqueue(&dir);

        for _ in 0..100 {
            if queue.is_empty() {
                break;
            }
            tokio::time::sleep(Duration::from_millis(20)).await;
        }

        sweeper.abort();
        assert!(queue.is_empty());
        assert!(!dir.exists());
    }
}
