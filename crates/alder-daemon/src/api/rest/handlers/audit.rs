//! Audit chain handlers.

use crate::api::rest::state::AppState;
use crate::error::ApiResult;
use alder_audit::ChainVerification;
use alder_types::CoreError;
use axum::extract::{Query, State};
use axum::Json;
use serde::Deserialize;
use serde_json::{json, Value};

#[derive(Debug, Deserialize)]
pub struct RangeQuery {
    #[serde(default)]
    pub from: u64,
    pub to: Option<u64>,
}

/// `GET /audit/entries?from&to`: a range read over the chain.
pub async fn audit_entries(
    State(state): State<AppState>,
    Query(query): Query<RangeQuery>,
) -> ApiResult<Json<Value>> {
    let audit = state.runtime.audit();
    let len = audit.len().await;
    let to = query.to.unwrap_or(len).min(len);
    let entries = audit
        .read_range(query.from, to)
        .await
        .map_err(CoreError::from)?;
    Ok(Json(json!({
        "from": query.from,
        "to": to,
        "total": len,
        "entries": entries,
    })))
}

/// `GET /audit/verify`: full-chain verification.
pub async fn audit_verify(State(state): State<AppState>) -> ApiResult<Json<Value>> {
    let audit = state.runtime.audit();
    let len = audit.len().await;
    let verification = audit.verify_chain(0, len).await.map_err(CoreError::from)?;
    let body = match verification {
        ChainVerification::Ok { checked } => json!({
            "intact": true,
            "entries_checked": checked,
        }),
        ChainVerification::BrokenAt { sequence, detail } => json!({
            "intact": false,
            "broken_at": sequence,
            "detail": detail,
        }),
    };
    Ok(Json(body))
}
