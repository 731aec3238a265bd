//! Configuration for alderd.

use serde::{Deserialize, Serialize};
use std::net::SocketAddr;
use std::path::PathBuf;

/// Main daemon configuration. Loaded from TOML, overridable per field by
/// CLI flags and environment variables at the binary boundary.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DaemonConfig {
    /// Root directory for runtime state, policies, and artifacts.
    #[serde(default = "default_root")]
    pub root: PathBuf,

    #[serde(default)]
    pub server: ServerConfig,

    #[serde(default)]
    pub healing: HealingConfig,
}

impl Default for DaemonConfig {
    fn default() -> Self {
        Self {
            root: default_root(),
            server: ServerConfig::default(),
            healing: HealingConfig::default(),
        }
    }
}

fn default_root() -> PathBuf {
    PathBuf::from(".")
}

/// Server configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    pub listen_addr: SocketAddr,

    #[serde(default = "default_true")]
    pub enable_cors: bool,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            listen_addr: "127.0.0.1:7421".parse().expect("static address"),
            enable_cors: true,
        }
    }
}

/// Healing-loop knobs surfaced in the config file.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealingConfig {
    /// The application log the healer tails, relative to `root`.
    #[serde(default = "default_watch_log")]
    pub watch_log: String,

    /// Sandbox verification driver; `{target}` expands to the artifact.
    #[serde(default = "default_verification_command")]
    pub verification_command: Vec<String>,

    /// Approval expiry in minutes.
    #[serde(default = "default_approval_expiry")]
    pub approval_expiry_minutes: i64,
}

impl Default for HealingConfig {
    fn default() -> Self {
        Self {
            watch_log: default_watch_log(),
            verification_command: default_verification_command(),
            approval_expiry_minutes: default_approval_expiry(),
        }
    }
}

fn default_watch_log() -> String {
    "app.log".to_string()
}

fn default_verification_command() -> Vec<String> {
    vec![
        "python3".to_string(),
        "-m".to_string(),
        "py_compile".to_string(),
        "{target}".to_string(),
    ]
}

fn default_approval_expiry() -> i64 {
    30
}

fn default_true() -> bool {
    true
}

impl DaemonConfig {
    /// Load from a TOML file, or fall back to defaults when no path is
    /// given. A missing explicit path is an error; a missing default is
    /// not.
    pub fn load(path: Option<&str>) -> Result<Self, String> {
        match path {
            Some(path) => {
                let text = std::fs::read_to_string(path)
                    .map_err(|e| format!("read {path}: {e}"))?;
                toml::from_str(&text).map_err(|e| format!("parse {path}: {e}"))
            }
            None => Ok(Self::default()),
        }
    }
}
