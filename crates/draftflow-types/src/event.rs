//! Progress event types for the Draftflow progress channel.
//!
//! Events are best-effort, at-most-once notifications broadcast while a
//! phase executes. Consumers use `seq` to detect gaps; final truth is
//! always recoverable from the persisted session, never from the stream.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

/// Kind of progress notification.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProgressKind {
    Start,
    Progress,
    LlmStart,
    LlmComplete,
    Error,
}

/// One notification on the progress channel.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProgressEvent {
    pub session_id: Uuid,
    pub phase: String,
    pub kind: ProgressKind,
    /// Monotonically increasing per session; gaps mean dropped events.
    pub seq: u64,
    #[serde(default, skip_serializing_if = "Value::is_null")]
    pub detail: Value,
}
