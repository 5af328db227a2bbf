//! Error taxonomy for the Draftflow engine.
//!
//! Four externally visible classes: input validation (rejected
//! synchronously, state unchanged), schema validation (artifact failed its
//! structural contract), transient service failures (retried with backoff,
//! promoted to terminal on exhaustion), and terminal workflow failures.

use thiserror::Error;
use uuid::Uuid;

/// Engine-level errors surfaced through the action surface.
#[derive(Debug, Error)]
pub enum EngineError {
    /// Malformed external request. The session is left unchanged.
    #[error("input validation: {0}")]
    InputValidation(String),

    /// A phase's artifact failed its structural contract after
    /// sanitization.
    #[error("schema validation in phase '{phase}': {detail}")]
    SchemaValidation { phase: String, detail: String },

    /// Network/timeout failure from an external service call.
    #[error("transient service failure in phase '{phase}': {detail}")]
    TransientService { phase: String, detail: String },

    /// `approve`/`rollback` called while the session is not parked at a
    /// checkpoint.
    #[error("session is not parked at a checkpoint")]
    NotAtCheckpoint,

    #[error("session not found: {0}")]
    SessionNotFound(Uuid),

    #[error("unknown rollback target: '{0}'")]
    UnknownRollbackTarget(String),

    #[error("unknown theme: '{0}'")]
    UnknownTheme(String),

    /// Unexpected failure ending the session in the `error` phase.
    #[error("terminal workflow failure: {0}")]
    Terminal(String),

    #[error("repository error: {0}")]
    Repository(#[from] RepositoryError),
}

/// Errors from session-store operations (trait defined in draftflow-core).
#[derive(Debug, Error)]
pub enum RepositoryError {
    #[error("database connection error")]
    Connection,

    #[error("query error: {0}")]
    Query(String),

    #[error("entity not found")]
    NotFound,

    #[error("conflict: {0}")]
    Conflict(String),
}

/// Errors from the content generator service boundary.
#[derive(Debug, Error)]
pub enum GeneratorError {
    #[error("generator request timed out")]
    Timeout,

    #[error("generator returned HTTP {status}: {detail}")]
    Http { status: u16, detail: String },

    #[error("generator response was not usable: {0}")]
    InvalidResponse(String),

    #[error("generator unavailable: {0}")]
    Unavailable(String),
}

impl GeneratorError {
    /// Whether a retry with backoff is worthwhile.
    ///
    /// Malformed responses are not transient: the same request would
    /// produce the same shape again, so they surface immediately.
    pub fn is_transient(&self) -> bool {
        match self {
            Self::Timeout | Self::Unavailable(_) => true,
            Self::Http { status, .. } => *status == 429 || *status >= 500,
            Self::InvalidResponse(_) => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn engine_error_display() {
        let err = EngineError::SchemaValidation {
            phase: "generate_outline".to_string(),
            detail: "missing sections".to_string(),
        };
        assert!(err.to_string().contains("generate_outline"));
        assert!(err.to_string().contains("missing sections"));

        let err = EngineError::UnknownRollbackTarget("intro".to_string());
        assert!(err.to_string().contains("intro"));
    }

    #[test]
    fn repository_error_display() {
        let err = RepositoryError::Query("syntax error".to_string());
        assert_eq!(err.to_string(), "query error: syntax error");
    }

    #[test]
    fn generator_transience() {
        assert!(GeneratorError::Timeout.is_transient());
        assert!(GeneratorError::Unavailable("down".to_string()).is_transient());
        assert!(
            GeneratorError::Http {
                status: 503,
                detail: "overloaded".to_string()
            }
            .is_transient()
        );
        assert!(
            GeneratorError::Http {
                status: 429,
                detail: "rate limit".to_string()
            }
            .is_transient()
        );
        assert!(
            !GeneratorError::Http {
                status: 400,
                detail: "bad request".to_string()
            }
            .is_transient()
        );
        assert!(!GeneratorError::InvalidResponse("empty".to_string()).is_transient());
    }
}
