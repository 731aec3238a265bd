//! Health reporting.

use crate::api::rest::state::AppState;
use alder_runtime::HealthSnapshot;
use axum::extract::State;
use axum::Json;
use serde_json::{json, Value};

/// `GET /health`: status, version, uptime, per-component readiness.
pub async fn health(State(state): State<AppState>) -> Json<Value> {
    let snapshot: HealthSnapshot = state.runtime.health().await;
    Json(json!({
        "status": snapshot.status,
        "version": env!("CARGO_PKG_VERSION"),
        "uptime_seconds": snapshot.uptime_seconds,
        "audit_entries": snapshot.audit_entries,
        "chain_poisoned": snapshot.chain_poisoned,
        "policy_loaded": snapshot.policy_loaded,
        "components": snapshot.components,
    }))
}
