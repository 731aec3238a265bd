//! Shared API state.

use alder_runtime::AlderRuntime;
use alder_types::Event;
use std::sync::Arc;
use tokio::sync::{broadcast, watch};

/// Handles every handler needs: the runtime, the live event feed, and the
/// shutdown trigger.
#[derive(Clone)]
pub struct AppState {
    pub runtime: Arc<AlderRuntime>,
    pub event_tx: broadcast::Sender<Event>,
    pub shutdown_tx: watch::Sender<bool>,
}

impl AppState {
    pub fn new(
        runtime: Arc<AlderRuntime>,
        event_tx: broadcast::Sender<Event>,
        shutdown_tx: watch::Sender<bool>,
    ) -> Self {
        Self {
            runtime,
            event_tx,
            shutdown_tx,
        }
    }
}
