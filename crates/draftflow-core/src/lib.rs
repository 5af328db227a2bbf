//! Draftflow core: the checkpointed workflow engine.
//!
//! Everything here is deterministic given a session record and the two
//! service boundaries ([`phase::ContentGenerator`],
//! [`phase::ArtifactEvaluator`]). Persistence is behind
//! [`repository::SessionRepository`]; concrete stores live in the infra
//! crate.

pub mod checkpoint;
pub mod engine;
pub mod phase;
pub mod pipeline;
pub mod progress;
pub mod repository;
pub mod retry;
pub mod revision;
pub mod rollback;
pub mod routing;
pub mod sanitize;
pub mod state;
