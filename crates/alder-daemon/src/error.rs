//! Daemon and API error types.

use alder_kernels::KernelError;
use alder_types::CoreError;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use thiserror::Error;

pub type DaemonResult<T> = Result<T, DaemonError>;

/// Process-level failures.
#[derive(Debug, Error)]
pub enum DaemonError {
    #[error("configuration error: {0}")]
    Config(String),

    #[error("server error: {0}")]
    Server(String),

    #[error("runtime failed to start: {0}")]
    Runtime(#[from] CoreError),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

pub type ApiResult<T> = Result<T, ApiError>;

/// API-surface failures, rendered per the platform error contract:
/// denied actions carry code, message, suggestions, documentation link,
/// and the partial trace; internal errors expose only code and
/// correlation id.
#[derive(Debug, Error)]
pub enum ApiError {
    #[error("{0}")]
    Core(#[from] CoreError),

    #[error("{0}")]
    Kernel(#[from] KernelError),

    #[error("bad request: {0}")]
    BadRequest(String),

    #[error("not found: {0}")]
    NotFound(String),
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        match self {
            ApiError::Kernel(KernelError::UnknownIntent {
                kernel,
                intent,
                vocabulary,
            }) => {
                let body = serde_json::json!({
                    "code": "ALD-UNKNOWN-INTENT",
                    "message": format!("kernel '{kernel}' cannot interpret intent '{intent}'"),
                    "suggestions": vocabulary,
                    "documentation_url": "https://alder-platform.dev/docs/kernels#capabilities",
                });
                (StatusCode::BAD_REQUEST, Json(body)).into_response()
            }
            ApiError::Kernel(KernelError::Denied {
                source,
                partial_trace,
            }) => denied_response(&source, Some(*partial_trace)),
            ApiError::Kernel(KernelError::Core(core)) | ApiError::Core(core) => {
                core_response(core)
            }
            ApiError::BadRequest(message) => {
                let body = serde_json::json!({
                    "code": "ALD-BAD-REQUEST",
                    "message": message,
                });
                (StatusCode::BAD_REQUEST, Json(body)).into_response()
            }
            ApiError::NotFound(message) => {
                let body = serde_json::json!({
                    "code": "ALD-NOT-FOUND",
                    "message": message,
                });
                (StatusCode::NOT_FOUND, Json(body)).into_response()
            }
        }
    }
}

fn core_response(error: CoreError) -> Response {
    match &error {
        CoreError::PolicyDenied { .. } | CoreError::GuardrailViolation { .. } => {
            denied_response(&error, None)
        }
        CoreError::ApprovalExpired { .. } => {
            let body = serde_json::json!({
                "code": error.code(),
                "message": error.to_string(),
                "suggestions": [error.remediation()],
            });
            (StatusCode::CONFLICT, Json(body)).into_response()
        }
        CoreError::Timeout { .. } => {
            let body = serde_json::json!({
                "code": error.code(),
                "message": error.to_string(),
            });
            (StatusCode::GATEWAY_TIMEOUT, Json(body)).into_response()
        }
        // Internal details stay in the logs; callers get code plus the
        // correlation id to quote at operators.
        _ => {
            tracing::error!(error = %error, code = error.code(), "internal API error");
            let body = serde_json::json!({
                "code": error.code(),
                "correlation_id": error.correlation_id().map(|c| c.to_string()),
            });
            (StatusCode::INTERNAL_SERVER_ERROR, Json(body)).into_response()
        }
    }
}

fn denied_response(
    error: &CoreError,
    partial_trace: Option<alder_types::ExecutionTrace>,
) -> Response {
    let suggestions = match error {
        CoreError::PolicyDenied { remediations, .. } if !remediations.is_empty() => {
            remediations.clone()
        }
        _ => vec![error.remediation().to_string()],
    };
    let body = serde_json::json!({
        "code": error.code(),
        "message": error.to_string(),
        "suggestions": suggestions,
        "documentation_url": "https://alder-platform.dev/docs/governance#denials",
        "correlation_id": error.correlation_id().map(|c| c.to_string()),
        "execution_trace": partial_trace,
    });
    (StatusCode::FORBIDDEN, Json(body)).into_response()
}
