//! Alder Daemon - the governed self-healing core as a background service
//!
//! The daemon provides:
//! - REST API over the kernel gateway, approvals, missions, and the audit chain
//! - SSE streaming of live platform events
//! - The full healing loop (preflight, supervisor, healer, proposer, scheduler)
//! - Health reporting with per-component readiness

use clap::Parser;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

mod api;
mod config;
mod error;
mod server;

use config::DaemonConfig;
use error::DaemonResult;
use server::Server;

/// Alder Daemon CLI
#[derive(Parser)]
#[command(name = "alderd")]
#[command(about = "Alder daemon - governed self-healing execution kernel", long_about = None)]
#[command(version)]
struct Cli {
    /// Configuration file path
    #[arg(short, long, env = "ALDER_CONFIG")]
    config: Option<String>,

    /// Listen address
    #[arg(short, long, env = "ALDER_LISTEN_ADDR", default_value = "127.0.0.1:7421")]
    listen: String,

    /// Root directory for state, policies, and watched artifacts
    #[arg(short, long, env = "ALDER_ROOT")]
    root: Option<String>,

    /// Log level
    #[arg(long, env = "ALDER_LOG_LEVEL", default_value = "info")]
    log_level: String,

    /// Enable JSON logging
    #[arg(long, env = "ALDER_LOG_JSON")]
    json: bool,
}

#[tokio::main]
async fn main() -> DaemonResult<()> {
    let cli = Cli::parse();

    // Initialize tracing
    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| cli.log_level.clone().into());

    if cli.json {
        tracing_subscriber::registry()
            .with(env_filter)
            .with(tracing_subscriber::fmt::layer().json())
            .init();
    } else {
        tracing_subscriber::registry()
            .with(env_filter)
            .with(tracing_subscriber::fmt::layer())
            .init();
    }

    // Load configuration, then apply CLI overrides
    let mut config = DaemonConfig::load(cli.config.as_deref())
        .map_err(|e| error::DaemonError::Config(e.to_string()))?;
    config.server.listen_addr = cli
        .listen
        .parse()
        .map_err(|e| error::DaemonError::Config(format!("Invalid listen address: {e}")))?;
    if let Some(root) = cli.root {
        config.root = root.into();
    }

    println!(
        r#"
     _    _     ____  _____ ____
    / \  | |   |  _ \| ____|  _ \
   / _ \ | |   | | | |  _| | |_) |
  / ___ \| |___| |_| | |___|  _ <
 /_/   \_\_____|____/|_____|_| \_\

  Alder - governed self-healing execution kernel
  Version: {}
  Root: {}
  Listening: {}
"#,
        env!("CARGO_PKG_VERSION"),
        config.root.display(),
        config.server.listen_addr
    );

    let server = Server::new(config).await?;
    server.run().await
}
