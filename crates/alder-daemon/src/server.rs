//! Server setup and lifecycle management.

use crate::api::create_router;
use crate::api::rest::state::AppState;
use crate::config::DaemonConfig;
use crate::error::DaemonResult;
use alder_mesh::{handler, SubscriptionOptions};
use alder_runtime::{ensure_default_policies, AlderRuntime, RuntimeConfig};
use alder_types::Event;
use std::sync::Arc;
use tokio::net::TcpListener;
use tokio::sync::{broadcast, watch};

/// Alder daemon server.
pub struct Server {
    config: DaemonConfig,
    runtime: Arc<AlderRuntime>,
    event_tx: broadcast::Sender<Event>,
    shutdown_tx: watch::Sender<bool>,
}

impl Server {
    /// Wire the runtime and the API event bridge.
    pub async fn new(config: DaemonConfig) -> DaemonResult<Self> {
        let mut runtime_config = RuntimeConfig::for_root(&config.root);
        runtime_config.watch_log = config.root.join(&config.healing.watch_log);
        runtime_config.verification_command = config.healing.verification_command.clone();
        runtime_config.governance.approval_expiry_minutes =
            config.healing.approval_expiry_minutes;
        ensure_default_policies(&runtime_config.policy_dir)?;

        let runtime = AlderRuntime::start(runtime_config, Vec::new()).await?;

        // Bridge every mesh event into a broadcast channel for SSE.
        let (event_tx, _) = broadcast::channel(1024);
        {
            let event_tx = event_tx.clone();
            runtime
                .mesh()
                .subscribe(
                    "api-stream",
                    "*",
                    SubscriptionOptions::default(),
                    handler(move |event: Event| {
                        let event_tx = event_tx.clone();
                        async move {
                            let _ = event_tx.send(event);
                        }
                    }),
                )
                .map_err(|e| crate::error::DaemonError::Server(e.to_string()))?;
        }

        let (shutdown_tx, _) = watch::channel(false);
        Ok(Self {
            config,
            runtime,
            event_tx,
            shutdown_tx,
        })
    }

    /// Run until SIGINT/SIGTERM or an operator shutdown request.
    pub async fn run(self) -> DaemonResult<()> {
        let addr = self.config.server.listen_addr;
        let state = AppState::new(
            Arc::clone(&self.runtime),
            self.event_tx.clone(),
            self.shutdown_tx.clone(),
        );
        let app = create_router(state, self.config.server.enable_cors);

        let listener = TcpListener::bind(addr).await?;
        tracing::info!("alderd listening on {addr}");

        let mut shutdown_rx = self.shutdown_tx.subscribe();
        axum::serve(listener, app)
            .with_graceful_shutdown(async move {
                tokio::select! {
                    _ = shutdown_signal() => {}
                    _ = shutdown_rx.changed() => {
                        tracing::info!("shutdown requested via API");
                    }
                }
            })
            .await
            .map_err(|e| crate::error::DaemonError::Server(e.to_string()))?;

        tracing::info!("alderd shutting down");
        self.runtime.shutdown().await;
        Ok(())
    }
}

/// Graceful shutdown signal handler.
async fn shutdown_signal() {
    let ctrl_c = async {
        tokio::signal::ctrl_c()
            .await
            .expect("Failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
            .expect("Failed to install signal handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            tracing::info!("Received Ctrl+C, initiating graceful shutdown");
        }
        _ = terminate => {
            tracing::info!("Received terminate signal, initiating graceful shutdown");
        }
    }
}
