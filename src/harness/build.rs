//! Build stage
//!
//! Compiles the submitted unit as a library crate and the test unit as a
//! libtest executable linked against it. Both compiler runs happen inside the
//! submission's workspace, which is also the only crate search root besides
//! the configured auxiliary libraries.

use std::path::PathBuf;
use std::process::Stdio;

use tokio::process::Command;
use tokio::time::timeout;

use crate::config::ToolchainConfig;
use crate::error::{HarnessError, HarnessResult};
use crate::models::SourceUnit;

use super::workspace::Workspace;

/// Artifacts produced by a successful build
#[derive(Debug, Clone)]
pub struct BuildOutput {
    /// `lib<unit>.rlib` of the submitted unit
    pub library: PathBuf,
    /// `<unit>.s` assembly listing of the submitted unit
    pub assembly: PathBuf,
    /// Test executable of the test unit
    pub executable: PathBuf,
}

/// Compiles submissions with the configured toolchain
pub struct BuildStage {
    toolchain: ToolchainConfig,
}

impl BuildStage {
    pub fn new(toolchain: ToolchainConfig) -> Self {
        Self { toolchain }
    }

    /// Write both sources into `workspace` and compile them
    pub async fn build(
        &self,
        workspace: &Workspace,
        source: &SourceUnit,
        test: &SourceUnit,
    ) -> HarnessResult<BuildOutput> {
        let source_path = workspace.write_source(&source.name, &source.text).await?;
        let test_path = workspace.write_source(&test.name, &test.text).await?;

        // Submitted unit: library plus assembly listing for the size metric
        let mut cmd = self.compiler(workspace);
        cmd.arg("--crate-type")
            .arg("lib")
            .arg("--crate-name")
            .arg(&source.name)
            .arg("-C")
            .arg("codegen-units=1")
            .arg("--emit")
            .arg("link,asm")
            .arg("--out-dir")
            .arg(workspace.dir())
            .arg(&source_path);
        self.run(cmd, &source.name).await?;

        let library = workspace.library_path(&source.name);
        let executable = workspace.executable_path(&test.name);

        // Test unit: libtest harness linked against the submitted library
        let mut cmd = self.compiler(workspace);
        cmd.arg("--test")
            .arg("--crate-name")
            .arg(&test.name)
            .arg("--extern")
            .arg(format!("{}={}", source.name, library.display()))
            .arg("-o")
            .arg(&executable)
            .arg(&test_path);
        self.run(cmd, &test.name).await?;

        tracing::info!(
            workspace = %workspace.id(),
            unit = %source.name,
            test_unit = %test.name,
            "Build succeeded"
        );

        Ok(BuildOutput {
            library,
            assembly: workspace.assembly_path(&source.name),
            executable,
        })
    }

    /// Compiler invocation with the arguments shared by both runs
    fn compiler(&self, workspace: &Workspace) -> Command {
        let mut cmd = Command::new(&self.toolchain.compiler);
        cmd.arg("--edition")
            .arg(&self.toolchain.edition)
            .arg("-C")
            .arg(format!("opt-level={}", self.toolchain.opt_level))
            .arg("--color")
            .arg("never")
            .arg("-L")
            .arg(format!("dependency={}", workspace.dir().display()));

        for path in &self.toolchain.library_paths {
            cmd.arg("-L").arg(format!("dependency={}", path.display()));
        }
        for krate in &self.toolchain.extern_crates {
            cmd.arg("--extern")
                .arg(format!("{}={}", krate.name, krate.path.display()));
        }

        cmd.current_dir(workspace.dir())
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);
        cmd
    }

    async fn run(&self, mut cmd: Command, unit: &str) -> HarnessResult<()> {
        tracing::debug!(unit = %unit, command = ?cmd.as_std(), "Invoking compiler");

        let child = cmd.spawn().map_err(|e| {
            HarnessError::BuildInfra(format!(
                "Failed to start compiler {}: {}",
                self.toolchain.compiler.display(),
                e
            ))
        })?;

        let limit = self.toolchain.compile_timeout();
        let output = match timeout(limit, child.wait_with_output()).await {
            Ok(Ok(output)) => output,
            Ok(Err(e)) => {
                return Err(HarnessError::BuildInfra(format!(
                    "Failed to wait for compiler: {}",
                    e
                )));
            }
            // The child is killed when its future is dropped
            Err(_) => {
                return Err(HarnessError::BuildInfra(format!(
                    "Compiling `{}` exceeded {}s",
                    unit,
                    limit.as_secs()
                )));
            }
        };

        if output.status.success() {
            return Ok(());
        }

        let Some(code) = output.status.code() else {
            return Err(HarnessError::BuildInfra(format!(
                "Compiler terminated by a signal while building `{}`",
                unit
            )));
        };

        let stderr = String::from_utf8_lossy(&output.stderr).trim_end().to_string();
        tracing::debug!(unit = %unit, exit_code = code, "Compilation failed");

        Err(HarnessError::Compile {
            diagnostics: if stderr.is_empty() {
                format!("Compilation of `{}` failed with exit code {}", unit, code)
            } else {
                stderr
            },
        })
    }
}
