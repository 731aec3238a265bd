//! Hardware allocation planning.

use crate::api::rest::state::AppState;
use crate::error::ApiResult;
use alder_types::{KernelName, KernelRequest};
use axum::extract::State;
use axum::Json;
use serde::Deserialize;
use serde_json::{json, Value};

#[derive(Debug, Deserialize)]
pub struct AllocateBody {
    pub task_type: String,
}

/// `POST /hardware/allocate`: resource plan for a named task type,
/// answered by the infrastructure kernel.
pub async fn allocate_hardware(
    State(state): State<AppState>,
    Json(body): Json<AllocateBody>,
) -> ApiResult<Json<Value>> {
    let request = KernelRequest::new(KernelName::Infrastructure, "allocate")
        .with_context("task_type", json!(body.task_type));
    let response = state.runtime.gateway().invoke(request).await?;
    Ok(Json(json!({
        "task_type": response.data.get("task_type"),
        "plan": response.data.get("plan"),
        "trust_score": response.trust_score,
    })))
}
