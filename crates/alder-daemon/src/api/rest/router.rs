//! API Router configuration.

use super::handlers;
use super::state::AppState;
use axum::{
    routing::{get, post},
    Router,
};
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

/// Create the main API router.
pub fn create_router(state: AppState, enable_cors: bool) -> Router {
    let api_routes = Router::new()
        // Health and lifecycle
        .route("/health", get(handlers::health))
        .route("/system/shutdown", post(handlers::shutdown))
        // Kernel gateway
        .route("/kernel/:name", post(handlers::invoke_kernel))
        // Approvals
        .route("/approvals", get(handlers::list_approvals))
        .route("/approvals/grant-all", post(handlers::grant_all_approvals))
        // Logs
        .route("/logs/recent", get(handlers::recent_logs))
        .route("/logs/stream", get(handlers::stream_logs))
        // Missions
        .route("/missions/:kind", get(handlers::list_missions))
        // Hardware planning
        .route("/hardware/allocate", post(handlers::allocate_hardware))
        // Audit chain
        .route("/audit/entries", get(handlers::audit_entries))
        .route("/audit/verify", get(handlers::audit_verify))
        // Governed operations
        .route("/autonomy/tier", post(handlers::set_autonomy_tier))
        .route("/triage/cycle", post(handlers::force_triage))
        .route("/preflight/run", post(handlers::run_preflight));

    let mut router = Router::new()
        .nest("/api/v1", api_routes)
        .layer(TraceLayer::new_for_http());

    if enable_cors {
        router = router.layer(
            CorsLayer::new()
                .allow_origin(Any)
                .allow_methods(Any)
                .allow_headers(Any),
        );
    }

    router.with_state(state)
}
