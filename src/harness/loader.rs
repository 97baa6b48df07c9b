//! Artifact loader
//!
//! Reads a built artifact into memory behind an explicit size check, verifies
//! its format and, for test executables, enumerates the entry points through
//! libtest's listing protocol. A [`LoadedUnit`] borrows the [`Workspace`] it was
//! loaded from and cannot outlive it.

use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::time::Duration;

use sha2::{Digest, Sha256};
use tokio::fs::File;
use tokio::io::{AsyncRead, AsyncReadExt};
use tokio::process::Command;
use tokio::time::timeout;

use crate::error::{HarnessError, HarnessResult};

use super::workspace::Workspace;

/// Kind of artifact a unit compiles to
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ArtifactKind {
    /// `lib<unit>.rlib` archive
    Library,
    /// libtest executable
    Executable,
}

impl ArtifactKind {
    fn path(self, workspace: &Workspace, unit: &str) -> PathBuf {
        match self {
            Self::Library => workspace.library_path(unit),
            Self::Executable => workspace.executable_path(unit),
        }
    }

    fn has_valid_magic(self, bytes: &[u8]) -> bool {
        match self {
            Self::Library => bytes.starts_with(b"!<arch>\n"),
            Self::Executable => {
                const MAGICS: [&[u8]; 7] = [
                    b"\x7fELF",
                    b"MZ",
                    &[0xfe, 0xed, 0xfa, 0xce],
                    &[0xfe, 0xed, 0xfa, 0xcf],
                    &[0xce, 0xfa, 0xed, 0xfe],
                    &[0xcf, 0xfa, 0xed, 0xfe],
                    &[0xca, 0xfe, 0xba, 0xbe],
                ];
                MAGICS.iter().any(|magic| bytes.starts_with(magic))
            }
        }
    }
}

/// An invokable unit bound to the workspace it was built in
#[derive(Debug)]
pub struct LoadedUnit<'ws> {
    pub workspace: &'ws Workspace,
    pub name: String,
    pub kind: ArtifactKind,
    pub path: PathBuf,
    /// Artifact length in bytes
    pub size: u64,
    /// Hex-encoded SHA-256 of the artifact
    pub digest: String,
    /// Test entry points in lexicographic order (empty for libraries)
    pub entry_points: Vec<String>,
}

/// Loads compiled artifacts out of a workspace
pub struct ArtifactLoader {
    max_artifact_bytes: u64,
    list_timeout: Duration,
}

impl ArtifactLoader {
    pub fn new(max_artifact_bytes: u64, list_timeout: Duration) -> Self {
        Self {
            max_artifact_bytes,
            list_timeout,
        }
    }

    pub async fn load<'ws>(
        &self,
        workspace: &'ws Workspace,
        unit: &str,
        kind: ArtifactKind,
    ) -> HarnessResult<LoadedUnit<'ws>> {
        let path = kind.path(workspace, unit);
        let bytes = self.read_artifact(&path).await?;

        if !kind.has_valid_magic(&bytes) {
            return Err(HarnessError::Load(format!(
                "Compiled artifact for `{}` is malformed",
                unit
            )));
        }

        let digest = hex::encode(Sha256::digest(&bytes));

        let entry_points = match kind {
            ArtifactKind::Library => Vec::new(),
            ArtifactKind::Executable => self.list_entry_points(&path, unit).await?,
        };

        tracing::debug!(
            workspace = %workspace.id(),
            unit = %unit,
            kind = ?kind,
            size = bytes.len(),
            entry_points = entry_points.len(),
            "Loaded artifact"
        );

        Ok(LoadedUnit {
            workspace,
            name: unit.to_string(),
            kind,
            path,
            size: bytes.len() as u64,
            digest,
            entry_points,
        })
    }

    async fn read_artifact(&self, path: &Path) -> HarnessResult<Vec<u8>> {
        let file = File::open(path).await.map_err(|e| {
            HarnessError::Load(format!(
                "Compiled artifact not found: {} ({})",
                file_name(path),
                e
            ))
        })?;

        let declared = file
            .metadata()
            .await
            .map_err(|e| HarnessError::Load(format!("Failed to inspect compiled artifact: {}", e)))?
            .len();

        if declared > self.max_artifact_bytes {
            return Err(HarnessError::Load(format!(
                "Compiled artifact {} is too large ({} bytes, limit {})",
                file_name(path),
                declared,
                self.max_artifact_bytes
            )));
        }

        let declared = usize::try_from(declared).map_err(|_| {
            HarnessError::Load(format!(
                "Compiled artifact {} is too large for this platform",
                file_name(path)
            ))
        })?;

        read_declared(file, declared).await
    }

    async fn list_entry_points(&self, executable: &Path, unit: &str) -> HarnessResult<Vec<String>> {
        let all = self.run_listing(executable, unit, false).await?;
        let ignored = parse_test_list(&self.run_listing(executable, unit, true).await?);

        let mut entry_points: Vec<String> = parse_test_list(&all)
            .into_iter()
            .filter(|name| !ignored.contains(name))
            .collect();
        entry_points.sort();
        entry_points.dedup();

        Ok(entry_points)
    }

    async fn run_listing(&self, executable: &Path, unit: &str, ignored: bool) -> HarnessResult<String> {
        let mut cmd = Command::new(executable);
        cmd.arg("--list");
        if ignored {
            cmd.arg("--ignored");
        }
        cmd.arg("--format")
            .arg("terse")
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);

        if let Some(dir) = executable.parent() {
            cmd.current_dir(dir);
        }

        let child = cmd.spawn().map_err(|e| {
            HarnessError::Load(format!("Failed to enumerate entry points of `{}`: {}", unit, e))
        })?;

        let output = match timeout(self.list_timeout, child.wait_with_output()).await {
            Ok(Ok(output)) => output,
            Ok(Err(e)) => {
                return Err(HarnessError::Load(format!(
                    "Failed to enumerate entry points of `{}`: {}",
                    unit, e
                )));
            }
            Err(_) => {
                return Err(HarnessError::Timeout {
                    entry_point: format!("{} --list", unit),
                    limit: self.list_timeout,
                });
            }
        };

        if !output.status.success() {
            return Err(HarnessError::Load(format!(
                "Failed to enumerate entry points of `{}`: {}",
                unit,
                String::from_utf8_lossy(&output.stderr).trim()
            )));
        }

        Ok(String::from_utf8_lossy(&output.stdout).into_owned())
    }
}

/// Read exactly `declared` bytes, failing when the source ends early
async fn read_declared<R>(reader: R, declared: usize) -> HarnessResult<Vec<u8>>
where
    R: AsyncRead + Unpin,
{
    let mut bytes = Vec::with_capacity(declared);
    reader
        .take(declared as u64)
        .read_to_end(&mut bytes)
        .await
        .map_err(|e| HarnessError::Load(format!("Failed to read compiled artifact: {}", e)))?;

    if bytes.len() < declared {
        return Err(HarnessError::Load(format!(
            "Compiled artifact is truncated: not all bytes have been read ({} of {})",
            bytes.len(),
            declared
        )));
    }

    Ok(bytes)
}

/// Extract test names from `--list --format terse` output
///
/// Lines look like `module::name: test`; benchmarks and noise are skipped.
pub fn parse_test_list(output: &str) -> Vec<String> {
    output
        .lines()
        .filter_map(|line| line.trim_end().strip_suffix(": test"))
        .map(str::to_string)
        .collect()
}

fn file_name(path: &Path) -> String {
    path.file_name()
        .map(|name| name.to_string_lossy().into_owned())
        .unwrap_or_else(|| path.display().to_string())
}
