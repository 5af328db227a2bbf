//! Axum router configuration with middleware.
//!
//! All routes are under `/api/v1/`. Middleware: CORS, tracing.

use axum::Router;
use axum::routing::{get, post};
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

use crate::http::handlers;
use crate::state::AppState;

/// Build the complete API router with all routes and middleware.
pub fn build_router(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    let api_routes = Router::new()
        .route(
            "/sessions",
            post(handlers::session::start_session).get(handlers::session::list_sessions),
        )
        .route("/sessions/{id}", get(handlers::session::get_session))
        .route("/sessions/{id}/decision", post(handlers::session::decide))
        .route("/sessions/{id}/rollback", post(handlers::session::rollback))
        .route("/sessions/{id}/resume", post(handlers::session::resume))
        .route("/sessions/{id}/cancel", post(handlers::session::cancel));

    Router::new()
        .nest("/api/v1", api_routes)
        .route("/ws/progress", get(handlers::ws::ws_handler))
        .route("/health", get(health_check))
        .layer(cors)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// GET /health - simple health check endpoint.
async fn health_check() -> axum::Json<serde_json::Value> {
    axum::Json(serde_json::json!({
        "status": "ok",
        "version": env!("CARGO_PKG_VERSION"),
    }))
}
