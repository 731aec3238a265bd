//! Operator operations: tier changes, triage, preflight, shutdown.

use crate::api::rest::state::AppState;
use crate::error::{ApiError, ApiResult};
use alder_types::{ActorId, AutonomyTier, Disposition};
use axum::extract::State;
use axum::Json;
use serde::Deserialize;
use serde_json::{json, Value};

#[derive(Debug, Deserialize)]
pub struct SetTierBody {
    pub tier: u8,
    #[serde(default)]
    pub actor: Option<String>,
}

/// `POST /autonomy/tier`: a governed tier change. The response reports
/// whether the change applied immediately or is waiting on an approval.
pub async fn set_autonomy_tier(
    State(state): State<AppState>,
    Json(body): Json<SetTierBody>,
) -> ApiResult<Json<Value>> {
    let target = AutonomyTier::from_u8(body.tier)
        .ok_or_else(|| ApiError::BadRequest(format!("tier {} is out of range 0..=3", body.tier)))?;
    let actor = ActorId::new(body.actor.unwrap_or_else(|| "operator".to_string()));

    let outcome = state
        .runtime
        .governance()
        .request_tier_change(actor, target)
        .await
        .map_err(|e| ApiError::BadRequest(e.to_string()))?;

    let body = match outcome.decision.disposition {
        Disposition::AutoApprove => json!({
            "applied": true,
            "tier": state.runtime.governance().tier().as_u8(),
        }),
        Disposition::RequireApproval => json!({
            "applied": false,
            "pending_approval": outcome.approval.map(|a| a.id.0),
        }),
        Disposition::Deny => {
            return Err(ApiError::Core(alder_types::CoreError::PolicyDenied {
                rationale: outcome
                    .decision
                    .denial_rationale()
                    .unwrap_or("denied")
                    .to_string(),
                remediations: outcome.decision.remediations,
                correlation_id: None,
            }))
        }
    };
    Ok(Json(body))
}

/// `POST /triage/cycle`: force one triage pass now.
pub async fn force_triage(State(state): State<AppState>) -> ApiResult<Json<Value>> {
    let summary = state.runtime.scheduler().run_triage_cycle().await?;
    Ok(Json(json!({
        "clusters_considered": summary.clusters_considered,
        "missions_launched": summary.missions_launched,
        "missions_started": summary.missions_started,
        "missions_failed": summary.missions_failed,
        "approvals_expired": summary.approvals_expired,
    })))
}

/// `POST /preflight/run`: re-validate the configured artifacts.
pub async fn run_preflight(State(state): State<AppState>) -> ApiResult<Json<Value>> {
    let report = state.runtime.run_preflight().await?;
    Ok(Json(json!({
        "artifacts": report.artifacts,
        "warnings": report.warnings().len(),
    })))
}

/// `POST /system/shutdown`: graceful stop.
pub async fn shutdown(State(state): State<AppState>) -> Json<Value> {
    let _ = state.shutdown_tx.send(true);
    Json(json!({ "shutting_down": true }))
}
