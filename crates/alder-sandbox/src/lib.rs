//! Alder sandbox executor.
//!
//! An abstract capability for running a candidate artifact plus a
//! verification driver under bounded resources. The core requires the
//! capability but does not prescribe its isolation technology; the
//! in-tree [`ProcessSandbox`] runs the driver as a child process confined
//! to a throwaway working directory and enforces the wall-clock ceiling
//! itself, while memory and CPU ceilings are handed to the driver as
//! environment variables for the host mechanism in use.
//!
//! Nothing a sandbox run writes ever leaves the working directory; the
//! executor reports outcomes and the caller decides what to do on the real
//! filesystem, through governance.

#![deny(unsafe_code)]

mod process;
mod scripted;

pub use process::ProcessSandbox;
pub use scripted::ScriptedSandbox;
pub use tokio_util::sync::CancellationToken;

use alder_types::{CorrelationId, SandboxOutcome};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum SandboxError {
    #[error("sandbox setup failed: {0}")]
    Setup(String),

    #[error("sandbox I/O: {0}")]
    Io(#[from] std::io::Error),
}

/// Resource ceilings for one run.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ResourceCeilings {
    pub wall_clock: Duration,
    pub memory_mb: u64,
    pub cpu_seconds: u64,
}

impl Default for ResourceCeilings {
    fn default() -> Self {
        Self {
            wall_clock: Duration::from_secs(60),
            memory_mb: 512,
            cpu_seconds: 30,
        }
    }
}

/// How a run's output is judged.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub enum VerificationPredicate {
    /// The driver exits 0.
    ExitZero,
    /// The driver exits 0 and its stdout contains the marker.
    StdoutContains(String),
}

/// One file placed into the sandbox working directory.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct SandboxFile {
    pub relative_path: String,
    pub content: String,
    /// Read-only inputs are write-protected before the driver starts.
    pub read_only: bool,
}

/// A request to verify an artifact in isolation.
#[derive(Clone, Debug)]
pub struct SandboxRequest {
    pub files: Vec<SandboxFile>,
    /// Driver argv; executed with the working directory as cwd.
    pub command: Vec<String>,
    pub ceilings: ResourceCeilings,
    pub predicate: VerificationPredicate,
    pub correlation_id: CorrelationId,
    /// Cooperative cancellation; a cancelled run reports
    /// [`SandboxOutcome::Cancelled`].
    pub cancel: CancellationToken,
}

impl SandboxRequest {
    pub fn new(command: Vec<String>) -> Self {
        Self {
            files: Vec::new(),
            command,
            ceilings: ResourceCeilings::default(),
            predicate: VerificationPredicate::ExitZero,
            correlation_id: CorrelationId::generate(),
            cancel: CancellationToken::new(),
        }
    }

    pub fn with_file(
        mut self,
        relative_path: impl Into<String>,
        content: impl Into<String>,
    ) -> Self {
        self.files.push(SandboxFile {
            relative_path: relative_path.into(),
            content: content.into(),
            read_only: false,
        });
        self
    }

    pub fn with_read_only_input(
        mut self,
        relative_path: impl Into<String>,
        content: impl Into<String>,
    ) -> Self {
        self.files.push(SandboxFile {
            relative_path: relative_path.into(),
            content: content.into(),
            read_only: true,
        });
        self
    }

    pub fn with_ceilings(mut self, ceilings: ResourceCeilings) -> Self {
        self.ceilings = ceilings;
        self
    }

    pub fn with_predicate(mut self, predicate: VerificationPredicate) -> Self {
        self.predicate = predicate;
        self
    }
}

/// Observed resource consumption. Fields the isolation mechanism cannot
/// measure stay `None`.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct ResourceUsage {
    pub wall_ms: u64,
    pub max_rss_kb: Option<u64>,
    pub cpu_ms: Option<u64>,
}

/// Full report of one sandbox run.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct SandboxReport {
    pub outcome: SandboxOutcome,
    pub exit_status: Option<i32>,
    pub stdout: String,
    pub stderr: String,
    pub usage: ResourceUsage,
}

impl SandboxReport {
    pub fn passed(&self) -> bool {
        self.outcome == SandboxOutcome::Passed
    }
}

/// The executor capability.
#[async_trait]
pub trait SandboxExecutor: Send + Sync {
    async fn run(&self, request: SandboxRequest) -> Result<SandboxReport, SandboxError>;
}
