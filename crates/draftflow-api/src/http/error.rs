//! Application error type mapping engine errors to HTTP status codes and
//! the envelope format.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde_json::json;

use draftflow_types::error::EngineError;

/// Application-level error that maps to HTTP responses.
#[derive(Debug)]
pub enum AppError {
    Engine(EngineError),
    Validation(String),
    Internal(String),
}

impl From<EngineError> for AppError {
    fn from(e: EngineError) -> Self {
        AppError::Engine(e)
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, code, message) = match &self {
            AppError::Engine(EngineError::SessionNotFound(id)) => (
                StatusCode::NOT_FOUND,
                "SESSION_NOT_FOUND",
                format!("Session {id} not found"),
            ),
            AppError::Engine(EngineError::NotAtCheckpoint) => (
                StatusCode::CONFLICT,
                "NOT_AT_CHECKPOINT",
                "Session is not parked at a checkpoint".to_string(),
            ),
            AppError::Engine(EngineError::InputValidation(msg)) => {
                (StatusCode::BAD_REQUEST, "VALIDATION_ERROR", msg.clone())
            }
            AppError::Engine(EngineError::UnknownRollbackTarget(target)) => (
                StatusCode::BAD_REQUEST,
                "VALIDATION_ERROR",
                format!("Unknown rollback target '{target}'"),
            ),
            AppError::Engine(EngineError::UnknownTheme(theme)) => (
                StatusCode::BAD_REQUEST,
                "VALIDATION_ERROR",
                format!("Unknown theme '{theme}'"),
            ),
            AppError::Engine(EngineError::SchemaValidation { phase, detail }) => (
                StatusCode::UNPROCESSABLE_ENTITY,
                "SCHEMA_VALIDATION",
                format!("Phase '{phase}': {detail}"),
            ),
            AppError::Engine(EngineError::TransientService { phase, detail }) => (
                StatusCode::SERVICE_UNAVAILABLE,
                "SERVICE_UNAVAILABLE",
                format!("Phase '{phase}': {detail}"),
            ),
            AppError::Engine(e) => (
                StatusCode::INTERNAL_SERVER_ERROR,
                "ENGINE_ERROR",
                e.to_string(),
            ),
            AppError::Validation(msg) => {
                (StatusCode::BAD_REQUEST, "VALIDATION_ERROR", msg.clone())
            }
            AppError::Internal(msg) => (
                StatusCode::INTERNAL_SERVER_ERROR,
                "INTERNAL_ERROR",
                msg.clone(),
            ),
        };

        let body = json!({
            "data": null,
            "meta": {
                "request_id": "",
                "timestamp": chrono::Utc::now().to_rfc3339(),
                "response_time_ms": 0
            },
            "errors": [{
                "code": code,
                "message": message,
            }]
        });

        (
            status,
            [(axum::http::header::CONTENT_TYPE, "application/json")],
            body.to_string(),
        )
            .into_response()
    }
}
