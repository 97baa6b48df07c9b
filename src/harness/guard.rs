//! Execution guard
//!
//! Runs the entry points of a loaded test unit one after another. Every
//! invocation is its own process in its own process group, dispatched on a
//! separate task and awaited under a hard deadline. The sample ends when that
//! process exits, not when its output pipes close. An overrunning invocation
//! is aborted and its whole process group killed; the first failure or timeout
//! stops the run. Processes an entry point leaves behind are killed with the
//! group once it returns.
//!
//! Each sample includes process spawn and libtest start-up, a roughly constant
//! cost per entry point. Baselines measured with the same harness carry the
//! same cost, so scores stay comparable, but for very fast code the speed
//! metric is dominated by it.

use std::process::{ExitStatus, Stdio};
use std::sync::LazyLock;
use std::time::{Duration, Instant};

use regex::Regex;
use tokio::io::AsyncReadExt;
use tokio::process::{ChildStderr, Command};
use tokio::task::JoinHandle;
use tokio::time::timeout;

use crate::constants::MAX_CAPTURED_STDERR_BYTES;
use crate::error::{HarnessError, HarnessResult};
use crate::models::ExecutionSample;

use super::loader::{ArtifactKind, LoadedUnit};

/// Panic location line followed by the message (current libtest format)
static PANIC_MESSAGE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?s)panicked at [^\n]*:\n(.*?)(?:\nnote: |\z)")
        .expect("Failed to compile panic message regex")
});

/// `panicked at 'message', file:line:col` (older toolchains)
static LEGACY_PANIC_MESSAGE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?s)panicked at '(.*)', [^\n]*:\d+:\d+")
        .expect("Failed to compile legacy panic message regex")
});

/// `Error: <debug>` printed when a `Result`-returning test returns `Err`
static RETURNED_ERROR: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?m)^Error: (.*)$").expect("Failed to compile returned error regex")
});

/// How long to wait for stderr after the process group is gone
const STDERR_DRAIN_TIMEOUT: Duration = Duration::from_secs(1);

/// Runs entry points under a per-invocation deadline
pub struct ExecutionGuard {
    deadline: Duration,
}

impl ExecutionGuard {
    pub fn new(deadline: Duration) -> Self {
        Self { deadline }
    }

    /// Invoke every entry point of `unit` in order, one sample per success
    pub async fn run(&self, unit: &LoadedUnit<'_>) -> HarnessResult<Vec<ExecutionSample>> {
        if unit.kind != ArtifactKind::Executable {
            return Err(HarnessError::Load(format!(
                "`{}` is not an executable test unit",
                unit.name
            )));
        }

        let mut samples = Vec::with_capacity(unit.entry_points.len());

        for entry_point in &unit.entry_points {
            let sample = self.invoke(unit, entry_point).await?;
            tracing::debug!(
                workspace = %unit.workspace.id(),
                entry_point = %entry_point,
                elapsed_ms = sample.elapsed_ms(),
                "Entry point passed"
            );
            samples.push(sample);
        }

        Ok(samples)
    }

    async fn invoke(&self, unit: &LoadedUnit<'_>, entry_point: &str) -> HarnessResult<ExecutionSample> {
        let mut cmd = Command::new(&unit.path);
        cmd.arg(entry_point)
            .arg("--exact")
            .arg("--test-threads=1")
            .arg("--nocapture")
            .env("RUST_BACKTRACE", "0")
            .current_dir(unit.workspace.dir())
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::piped())
            .kill_on_drop(true);
        #[cfg(unix)]
        cmd.process_group(0);

        let start = Instant::now();
        let mut child = cmd.spawn().map_err(|e| HarnessError::Execution {
            cause: format!("Failed to start entry point `{}`: {}", entry_point, e),
        })?;
        let group = child.id();
        let stderr = child.stderr.take().map(|pipe| tokio::spawn(capture_stderr(pipe)));

        let mut handle = tokio::spawn(async move {
            let status = child.wait().await?;
            Ok::<_, std::io::Error>((start.elapsed(), status))
        });

        let outcome = timeout(self.deadline, &mut handle).await;

        // Whatever the entry point left running goes with its group
        kill_group(group);

        let (elapsed, status) = match outcome {
            Ok(Ok(Ok(finished))) => finished,
            Ok(Ok(Err(e))) => {
                abort_capture(stderr);
                return Err(HarnessError::Execution {
                    cause: format!("Failed to wait for entry point `{}`: {}", entry_point, e),
                });
            }
            Ok(Err(e)) => {
                abort_capture(stderr);
                return Err(HarnessError::Execution {
                    cause: format!("Entry point `{}` was interrupted: {}", entry_point, e),
                });
            }
            Err(_) => {
                // The group is already signalled; nothing waits for it here
                handle.abort();
                abort_capture(stderr);
                tracing::info!(
                    workspace = %unit.workspace.id(),
                    entry_point = %entry_point,
                    "Entry point exceeded deadline"
                );
                return Err(HarnessError::Timeout {
                    entry_point: entry_point.to_string(),
                    limit: self.deadline,
                });
            }
        };

        if !status.success() {
            let stderr = collect_stderr(stderr).await;
            return Err(HarnessError::Execution {
                cause: failure_cause(entry_point, status, &stderr),
            });
        }

        abort_capture(stderr);

        Ok(ExecutionSample {
            entry_point: entry_point.to_string(),
            elapsed,
        })
    }
}

/// Read a child's stderr to EOF, keeping at most [`MAX_CAPTURED_STDERR_BYTES`]
///
/// The pipe is drained past the limit so the child never blocks on a full pipe.
async fn capture_stderr(mut pipe: ChildStderr) -> Vec<u8> {
    let mut kept = Vec::new();
    let mut buf = [0u8; 8192];

    loop {
        match pipe.read(&mut buf).await {
            Ok(0) | Err(_) => break,
            Ok(n) => {
                let room = MAX_CAPTURED_STDERR_BYTES.saturating_sub(kept.len());
                kept.extend_from_slice(&buf[..n.min(room)]);
            }
        }
    }

    kept
}

async fn collect_stderr(capture: Option<JoinHandle<Vec<u8>>>) -> String {
    let Some(mut capture) = capture else {
        return String::new();
    };

    match timeout(STDERR_DRAIN_TIMEOUT, &mut capture).await {
        Ok(Ok(bytes)) => String::from_utf8_lossy(&bytes).into_owned(),
        _ => {
            capture.abort();
            String::new()
        }
    }
}

fn abort_capture(capture: Option<JoinHandle<Vec<u8>>>) {
    if let Some(capture) = capture {
        capture.abort();
    }
}

/// SIGKILL every process in the group led by `leader`
#[cfg(unix)]
fn kill_group(leader: Option<u32>) {
    use nix::sys::signal::{self, Signal};
    use nix::unistd::Pid;

    let Some(leader) = leader.and_then(|pid| i32::try_from(pid).ok()) else {
        return;
    };

    // ESRCH means the group is already empty
    if let Err(e) = signal::killpg(Pid::from_raw(leader), Signal::SIGKILL) {
        if e != nix::errno::Errno::ESRCH {
            tracing::warn!("Failed to kill process group {}: {}", leader, e);
        }
    }
}

#[cfg(not(unix))]
fn kill_group(_leader: Option<u32>) {}

/// Best description of why an entry point failed
fn failure_cause(entry_point: &str, status: ExitStatus, stderr: &str) -> String {
    if let Some(message) = panic_message(stderr).or_else(|| returned_error(stderr)) {
        return message;
    }

    match status.code() {
        Some(code) => format!("Entry point `{}` failed with exit code {}", entry_point, code),
        None => format!("Entry point `{}` was terminated by a signal", entry_point),
    }
}

/// Extract the panic payload from a test process's stderr
pub fn panic_message(stderr: &str) -> Option<String> {
    PANIC_MESSAGE
        .captures(stderr)
        .or_else(|| LEGACY_PANIC_MESSAGE.captures(stderr))
        .and_then(|caps| caps.get(1))
        .map(|m| m.as_str().trim().to_string())
        .filter(|message| !message.is_empty())
}

/// Extract the error a `Result`-returning test failed with
pub fn returned_error(stderr: &str) -> Option<String> {
    RETURNED_ERROR
        .captures(stderr)
        .and_then(|caps| caps.get(1))
        .map(|m| m.as_str().trim().to_string())
        .filter(|message| !message.is_empty())
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;
    use crate::harness::build::BuildStage;
    use crate::harness::cleanup::CleanupQueue;
    use crate::harness::fixtures;
    use crate::harness::loader::{ArtifactKind, ArtifactLoader};
    use crate::harness::workspace::WorkspaceManager;
    use crate::models::SourceUnit;

    #[test]
    fn test_panic_message_current_format() {
        let stderr = "\nthread 'fails' panicked at kata_test.rs:4:5:\nassertion `left == right` failed\n  left: 1\n right: 2\nnote: run with `RUST_BACKTRACE=1` environment variable to display a backtrace\n";
        assert_eq!(
            panic_message(stderr).as_deref(),
            Some("assertion `left == right` failed\n  left: 1\n right: 2")
        );
    }

    #[test]
    fn test_panic_message_legacy_format() {
        let stderr = "thread 'fails' panicked at 'boom', kata_test.rs:4:5\nnote: run with `RUST_BACKTRACE=1`";
        assert_eq!(panic_message(stderr).as_deref(), Some("boom"));
    }

    #[test]
    fn test_returned_error_message() {
        let stderr = "Error: \"invert lost a value\"\nerror: test failed, to rerun pass `--exact`\n";
        assert_eq!(
            returned_error(stderr).as_deref(),
            Some("\"invert lost a value\"")
        );
        assert_eq!(returned_error("thread 'x' panicked at a.rs:1:1:\nboom"), None);
    }

    #[test]
    fn test_panic_message_absent() {
        assert_eq!(panic_message("error: test failed, to rerun pass `--exact`"), None);
        assert_eq!(panic_message(""), None);
    }

    async fn run_tests(tests: &str, deadline: Duration) -> HarnessResult<Vec<ExecutionSample>> {
        let root = tempfile::tempdir().unwrap();
        let config = fixtures::config(root.path());
        let manager = WorkspaceManager::new(root.path(), Arc::new(CleanupQueue::new()));
        let workspace = manager.allocate().await.unwrap();

        BuildStage::new(config.toolchain.clone())
            .build(
                &workspace,
                &SourceUnit::new("kata", fixtures::INVERT_SOURCE),
                &SourceUnit::new("kata_test", tests),
            )
            .await
            .unwrap();

        let unit = ArtifactLoader::new(config.execution.max_artifact_bytes, deadline)
            .load(&workspace, "kata_test", ArtifactKind::Executable)
            .await
            .unwrap();

        ExecutionGuard::new(deadline).run(&unit).await
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_samples_follow_entry_point_order() {
        let samples = run_tests(fixtures::INVERT_TESTS, Duration::from_secs(5))
            .await
            .unwrap();
        let names: Vec<_> = samples.iter().map(|s| s.entry_point.as_str()).collect();
        assert_eq!(names, vec!["inverts_empty_slice", "inverts_mixed_values"]);
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_panic_becomes_execution_error() {
        let tests = r#"use kata::invert;

#[test]
fn wrong_expectation() {
    assert_eq!(invert(&[1]), vec![1], "sign was flipped");
}
"#;
        let err = run_tests(tests, Duration::from_secs(5)).await.unwrap_err();
        match err {
            HarnessError::Execution { cause } => assert!(cause.contains("sign was flipped")),
            other => panic!("expected execution error, got {other:?}"),
        }
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_deadline_stops_the_run() {
        let tests = r#"#[test]
fn a_sleeps() {
    std::thread::sleep(std::time::Duration::from_secs(30));
}

#[test]
fn b_never_runs() {}
"#;
        let started = Instant::now();
        let err = run_tests(tests, Duration::from_secs(1)).await.unwrap_err();

        assert!(started.elapsed() < Duration::from_secs(25));
        match err {
            HarnessError::Timeout { entry_point, limit } => {
                assert_eq!(entry_point, "a_sleeps");
                assert_eq!(limit, Duration::from_secs(1));
            }
            other => panic!("expected timeout, got {other:?}"),
        }
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_returned_err_becomes_execution_error() {
        let tests = r#"#[test]
fn returns_err() -> Result<(), String> {
    Err("negation dropped an element".into())
}
"#;
        let err = run_tests(tests, Duration::from_secs(5)).await.unwrap_err();
        match err {
            HarnessError::Execution { cause } => {
                assert!(cause.contains("negation dropped an element"), "{cause}")
            }
            other => panic!("expected execution error, got {other:?}"),
        }
    }

    #[cfg(unix)]
    #[tokio::test(flavor = "multi_thread")]
    async fn test_background_process_does_not_hold_the_sample() {
        let scratch = tempfile::tempdir().unwrap();
        let pid_file = scratch.path().join("background.pid");
        let tests = format!(
            r#"#[test]
fn returns_immediately() {{
    let child = std::process::Command::new("sleep").arg("30").spawn().unwrap();
    std::fs::write({pid_file:?}, child.id().to_string()).unwrap();
}}
"#
        );

        let samples = run_tests(&tests, Duration::from_secs(3)).await.unwrap();
        assert_eq!(samples.len(), 1);
        assert!(samples[0].elapsed < Duration::from_secs(3));

        // The leftover `sleep` was killed with the entry point's group
        let pid = std::fs::read_to_string(&pid_file).unwrap();
        let stat = format!("/proc/{}/stat", pid.trim());
        let mut gone = false;
        for _ in 0..50 {
            gone = std::fs::read_to_string(&stat)
                .map(|s| s.split_whitespace().nth(2) == Some("Z"))
                .unwrap_or(true);
            if gone {
                break;
            }
            tokio::time::sleep(Duration::from_millis(50)).await;
        }
        assert!(gone, "background process {} survived", pid.trim());
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_library_unit_is_not_runnable() {
        let root = tempfile::tempdir().unwrap();
        let config = fixtures::config(root.path());
        let manager = WorkspaceManager::new(root.path(), Arc::new(CleanupQueue::new()));
        let workspace = manager.allocate().await.unwrap();

        BuildStage::new(config.toolchain.clone())
            .build(
                &workspace,
                &SourceUnit::new("kata", fixtures::INVERT_SOURCE),
                &SourceUnit::new("kata_test", fixtures::INVERT_TESTS),
            )
            .await
            .unwrap();

        let library = ArtifactLoader::new(config.execution.max_artifact_bytes, Duration::from_secs(5))
            .load(&workspace, "kata", ArtifactKind::Library)
            .await
            .unwrap();

        let err = ExecutionGuard::new(Duration::from_secs(5))
            .run(&library)
            .await
            .unwrap_err();
        assert!(matches!(err, HarnessError::Load(_)));
    }
}
