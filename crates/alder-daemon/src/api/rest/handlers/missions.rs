//! Mission list handlers.

use crate::api::rest::state::AppState;
use crate::error::{ApiError, ApiResult};
use alder_types::{Mission, MissionStatus};
use axum::extract::{Path, State};
use axum::Json;

/// `GET /missions/:kind` for `active`, `proactive`, or `followups`.
pub async fn list_missions(
    State(state): State<AppState>,
    Path(kind): Path<String>,
) -> ApiResult<Json<Vec<Mission>>> {
    let scheduler = state.runtime.scheduler();
    let missions = match kind.as_str() {
        "active" => scheduler.missions_with_status(MissionStatus::Running),
        "proactive" => scheduler.missions_with_status(MissionStatus::Pending),
        "followups" => {
            let mut followups = Vec::new();
            for status in [
                MissionStatus::Pending,
                MissionStatus::Running,
                MissionStatus::Suspended,
            ] {
                followups.extend(
                    scheduler
                        .missions_with_status(status)
                        .into_iter()
                        .filter(|m| m.recovery_attempts > 0),
                );
            }
            followups
        }
        other => {
            return Err(ApiError::NotFound(format!(
                "unknown mission list '{other}' (use active, proactive, or followups)"
            )))
        }
    };
    Ok(Json(missions))
}
