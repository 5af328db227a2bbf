//! REST handlers for the session action surface.

use std::time::Instant;

use axum::Json;
use axum::extract::{Path, State};
use serde::Deserialize;
use serde_json::Value;
use uuid::Uuid;

use draftflow_core::engine::StartRequest;
use draftflow_core::state::StatePatch;
use draftflow_types::session::{DecisionPayload, EngineStatus, Session, SessionListing};

use crate::http::error::AppError;
use crate::http::response::ApiResponse;
use crate::state::AppState;

fn request_id() -> String {
    Uuid::now_v7().to_string()
}

fn elapsed_ms(start: Instant) -> u64 {
    start.elapsed().as_millis() as u64
}

/// POST /sessions - start a new session and run until it parks.
pub async fn start_session(
    State(state): State<AppState>,
    Json(request): Json<StartRequest>,
) -> Result<ApiResponse<EngineStatus>, AppError> {
    let start = Instant::now();
    let status = state.engine.start(request).await?;
    let session_id = status.session_id;
    Ok(
        ApiResponse::success(status, request_id(), elapsed_ms(start))
            .with_link("self", &format!("/api/v1/sessions/{session_id}")),
    )
}

/// GET /sessions - list all sessions.
pub async fn list_sessions(
    State(state): State<AppState>,
) -> Result<ApiResponse<Vec<SessionListing>>, AppError> {
    let start = Instant::now();
    let listings = state.engine.list().await?;
    Ok(ApiResponse::success(
        listings,
        request_id(),
        elapsed_ms(start),
    ))
}

/// GET /sessions/{id} - full session record.
pub async fn get_session(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<ApiResponse<Session>, AppError> {
    let start = Instant::now();
    let session = state.engine.get_state(id).await?;
    Ok(ApiResponse::success(
        session,
        request_id(),
        elapsed_ms(start),
    ))
}

/// POST /sessions/{id}/decision - apply a checkpoint decision.
pub async fn decide(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    Json(payload): Json<DecisionPayload>,
) -> Result<ApiResponse<EngineStatus>, AppError> {
    let start = Instant::now();
    let status = state.engine.decide(id, payload).await?;
    Ok(ApiResponse::success(
        status,
        request_id(),
        elapsed_ms(start),
    ))
}

#[derive(Debug, Deserialize)]
pub struct RollbackRequest {
    pub target: String,
    /// Optional field overrides applied before the checkpoint re-arms.
    #[serde(default)]
    pub overrides: Option<serde_json::Map<String, Value>>,
}

/// POST /sessions/{id}/rollback - rewind to an earlier checkpoint.
pub async fn rollback(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    Json(request): Json<RollbackRequest>,
) -> Result<ApiResponse<EngineStatus>, AppError> {
    let start = Instant::now();
    let overrides = request
        .overrides
        .map(|map| map.into_iter().collect::<StatePatch>());
    let status = state.engine.rollback(id, &request.target, overrides).await?;
    Ok(ApiResponse::success(
        status,
        request_id(),
        elapsed_ms(start),
    ))
}

/// POST /sessions/{id}/resume - resume from the persisted record.
pub async fn resume(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<ApiResponse<EngineStatus>, AppError> {
    let start = Instant::now();
    let status = state.engine.resume(id).await?;
    Ok(ApiResponse::success(
        status,
        request_id(),
        elapsed_ms(start),
    ))
}

/// POST /sessions/{id}/cancel - cancel at the next phase boundary.
pub async fn cancel(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<ApiResponse<EngineStatus>, AppError> {
    let start = Instant::now();
    let status = state.engine.cancel(id).await?;
    Ok(ApiResponse::success(
        status,
        request_id(),
        elapsed_ms(start),
    ))
}
