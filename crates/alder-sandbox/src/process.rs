//! Child-process sandbox over a throwaway working directory.

use crate::{
    ResourceUsage, SandboxError, SandboxExecutor, SandboxReport, SandboxRequest,
    VerificationPredicate,
};
use alder_types::SandboxOutcome;
use async_trait::async_trait;
use std::process::Stdio;
use std::time::Instant;
use tokio::process::Command;

/// Runs the verification driver as a child process. The working directory
/// is created fresh per run and dropped afterwards; read-only inputs are
/// write-protected before the driver starts.
pub struct ProcessSandbox;

impl ProcessSandbox {
    pub fn new() -> Self {
        Self
    }
}

impl Default for ProcessSandbox {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl SandboxExecutor for ProcessSandbox {
    async fn run(&self, request: SandboxRequest) -> Result<SandboxReport, SandboxError> {
        if request.command.is_empty() {
            return Err(SandboxError::Setup("empty driver command".to_string()));
        }

        let workdir = tempfile::tempdir()
            .map_err(|e| SandboxError::Setup(format!("workdir creation failed: {e}")))?;

        for file in &request.files {
            let path = workdir.path().join(&file.relative_path);
            if let Some(parent) = path.parent() {
                tokio::fs::create_dir_all(parent).await?;
            }
            tokio::fs::write(&path, &file.content).await?;
            if file.read_only {
                let mut perms = tokio::fs::metadata(&path).await?.permissions();
                perms.set_readonly(true);
                tokio::fs::set_permissions(&path, perms).await?;
            }
        }

        let mut command = Command::new(&request.command[0]);
        command
            .args(&request.command[1..])
            .current_dir(workdir.path())
            .env("ALDER_SANDBOX", "1")
            .env("ALDER_SANDBOX_MEMORY_MB", request.ceilings.memory_mb.to_string())
            .env(
                "ALDER_SANDBOX_CPU_SECONDS",
                request.ceilings.cpu_seconds.to_string(),
            )
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);

        let started = Instant::now();
        let child = command.spawn()?;

        let waited = tokio::select! {
            output = child.wait_with_output() => Some(output?),
            _ = tokio::time::sleep(request.ceilings.wall_clock) => None,
            _ = request.cancel.cancelled() => {
                let wall_ms = started.elapsed().as_millis() as u64;
                tracing::info!(wall_ms, "sandbox run cancelled");
                return Ok(SandboxReport {
                    outcome: SandboxOutcome::Cancelled,
                    exit_status: None,
                    stdout: String::new(),
                    stderr: "cancelled before completion".to_string(),
                    usage: ResourceUsage { wall_ms, ..Default::default() },
                });
            }
        };
        let wall_ms = started.elapsed().as_millis() as u64;

        let Some(output) = waited else {
            // kill_on_drop reaps the child when `command` drops here.
            tracing::warn!(
                wall_ms,
                limit_ms = request.ceilings.wall_clock.as_millis() as u64,
                "sandbox run exceeded its wall-clock ceiling"
            );
            return Ok(SandboxReport {
                outcome: SandboxOutcome::Failed,
                exit_status: None,
                stdout: String::new(),
                stderr: "wall-clock ceiling exceeded".to_string(),
                usage: ResourceUsage { wall_ms, ..Default::default() },
            });
        };

        let stdout = String::from_utf8_lossy(&output.stdout).into_owned();
        let stderr = String::from_utf8_lossy(&output.stderr).into_owned();
        let exit_status = output.status.code();

        let verified = match &request.predicate {
            VerificationPredicate::ExitZero => output.status.success(),
            VerificationPredicate::StdoutContains(marker) => {
                output.status.success() && stdout.contains(marker)
            }
        };

        Ok(SandboxReport {
            outcome: if verified {
                SandboxOutcome::Passed
            } else {
                SandboxOutcome::Failed
            },
            exit_status,
            stdout,
            stderr,
            usage: ResourceUsage { wall_ms, ..Default::default() },
        })
    }
}
