//! Kernel gateway handler.

use crate::api::rest::state::AppState;
use crate::error::{ApiError, ApiResult};
use alder_types::{CorrelationId, KernelName, KernelRequest, KernelResponse};
use axum::extract::{Path, State};
use axum::Json;
use serde::Deserialize;
use serde_json::{Map, Value};

#[derive(Debug, Deserialize)]
pub struct InvokeBody {
    pub intent: String,
    #[serde(default)]
    pub context: Map<String, Value>,
    #[serde(default)]
    pub correlation_id: Option<String>,
}

/// `POST /kernel/:name` with an intent and optional context.
pub async fn invoke_kernel(
    State(state): State<AppState>,
    Path(name): Path<String>,
    Json(body): Json<InvokeBody>,
) -> ApiResult<Json<KernelResponse>> {
    let kernel = KernelName::parse(&name)
        .ok_or_else(|| ApiError::NotFound(format!("no kernel named '{name}'")))?;

    let mut request = KernelRequest::new(kernel, body.intent);
    request.context = body.context;
    if let Some(correlation) = body.correlation_id {
        request.correlation_id = CorrelationId::new(correlation);
    }

    let response = state.runtime.gateway().invoke(request).await?;
    Ok(Json(response))
}
