//! Runtime configuration, aggregated from the subsystem knobs.

use alder_governance::GovernanceConfig;
use alder_kernels::GatewayConfig;
use alder_preflight::PreflightConfig;
use alder_scheduler::{CadenceConfig, SchedulerConfig};
use alder_supervisor::SupervisorConfig;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Everything the composition root needs to bring the platform up.
#[derive(Clone, Debug)]
pub struct RuntimeConfig {
    /// Audit stream, learning snapshot, and fix snapshots live here.
    pub data_dir: PathBuf,
    /// Directory holding constitution.yaml, guardrails.yaml, whitelist.yaml.
    pub policy_dir: PathBuf,
    /// Root against which artifact paths (patches, preflight) resolve.
    pub artifact_root: PathBuf,
    /// The application log the healer tails.
    pub watch_log: PathBuf,
    /// Sandbox verification driver; `{target}` expands to the artifact.
    pub verification_command: Vec<String>,
    pub healer_quiet_period: Duration,
    pub learning_snapshot_interval: Duration,
    pub preflight: PreflightConfig,
    pub governance: GovernanceConfig,
    pub supervisor: SupervisorConfig,
    pub scheduler: SchedulerConfig,
    pub cadence: CadenceConfig,
    pub gateway: GatewayConfig,
}

impl RuntimeConfig {
    /// Sensible defaults rooted at one directory: state under
    /// `<root>/data`, policies under `<root>/policies`, artifacts and the
    /// watched log under the root itself.
    pub fn for_root(root: impl AsRef<Path>) -> Self {
        let root = root.as_ref().to_path_buf();
        Self {
            data_dir: root.join("data"),
            policy_dir: root.join("policies"),
            artifact_root: root.clone(),
            watch_log: root.join("app.log"),
            verification_command: vec![
                "python3".to_string(),
                "-m".to_string(),
                "py_compile".to_string(),
                "{target}".to_string(),
            ],
            healer_quiet_period: Duration::from_secs(60),
            learning_snapshot_interval: Duration::from_secs(300),
            preflight: PreflightConfig::default(),
            governance: GovernanceConfig::default(),
            supervisor: SupervisorConfig::default(),
            scheduler: SchedulerConfig::default(),
            cadence: CadenceConfig::default(),
            gateway: GatewayConfig::default(),
        }
    }
}
