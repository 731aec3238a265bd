//! Approval queue handlers.

use crate::api::rest::state::AppState;
use crate::error::ApiResult;
use alder_types::{ActorId, Approval};
use axum::extract::State;
use axum::Json;
use serde::Deserialize;
use serde_json::{json, Value};

/// `GET /approvals`: pending approvals, highest priority first.
pub async fn list_approvals(State(state): State<AppState>) -> Json<Vec<Approval>> {
    Json(state.runtime.governance().approvals().pending())
}

#[derive(Debug, Deserialize, Default)]
pub struct GrantAllBody {
    #[serde(default)]
    pub approver: Option<String>,
}

/// `POST /approvals/grant-all` (operator surface).
pub async fn grant_all_approvals(
    State(state): State<AppState>,
    body: Option<Json<GrantAllBody>>,
) -> ApiResult<Json<Value>> {
    let approver = body
        .and_then(|Json(b)| b.approver)
        .unwrap_or_else(|| "operator".to_string());
    let granted = state
        .runtime
        .governance()
        .grant_all(ActorId::new(approver))
        .await;
    Ok(Json(json!({
        "granted": granted.iter().map(|a| a.id.0.clone()).collect::<Vec<_>>(),
        "count": granted.len(),
    })))
}
