//! Session domain types for Draftflow.
//!
//! A `Session` is the durable unit of workflow state: one record per
//! content-generation run, mutated exclusively through phase-patch merges
//! and persisted whole at every phase boundary. This module also defines
//! the checkpoint descriptor, the external decision payload, and the
//! per-artifact bookkeeping key scheme.

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

use crate::error::EngineError;

// ---------------------------------------------------------------------------
// Status
// ---------------------------------------------------------------------------

/// Overall status of a session.
///
/// `Waiting` means the session is parked at a checkpoint awaiting a human
/// decision; this is a normal long-lived state, not a stall.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionStatus {
    Processing,
    Waiting,
    Complete,
    Error,
    Cancelled,
}

impl SessionStatus {
    /// Whether the session can still advance without external recovery.
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Complete | Self::Error | Self::Cancelled)
    }
}

// ---------------------------------------------------------------------------
// Artifacts
// ---------------------------------------------------------------------------

/// A revisable, human-reviewed unit of generated content.
///
/// Each artifact owns a fixed family of session fields derived from its
/// name: the artifact value itself, an approval flag, a revision counter,
/// a write-once feedback slot, a pre-rejection snapshot, and the latest
/// evaluator verdict.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Artifact {
    Outline,
    Article,
}

impl Artifact {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Outline => "outline",
            Self::Article => "article",
        }
    }

    /// Field holding the artifact value.
    pub fn value_key(self) -> String {
        self.as_str().to_string()
    }

    pub fn approved_key(self) -> String {
        format!("{}_approved", self.as_str())
    }

    pub fn revision_count_key(self) -> String {
        format!("{}_revision_count", self.as_str())
    }

    pub fn feedback_key(self) -> String {
        format!("{}_feedback", self.as_str())
    }

    pub fn previous_key(self) -> String {
        format!("previous_{}", self.as_str())
    }

    pub fn evaluation_key(self) -> String {
        format!("{}_evaluation", self.as_str())
    }
}

impl std::fmt::Display for Artifact {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for Artifact {
    type Err = EngineError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "outline" => Ok(Self::Outline),
            "article" => Ok(Self::Article),
            other => Err(EngineError::InputValidation(format!(
                "unknown artifact '{other}'"
            ))),
        }
    }
}

// ---------------------------------------------------------------------------
// Checkpoint descriptor
// ---------------------------------------------------------------------------

/// Persisted continuation marker for a suspended session.
///
/// At most one may be set per session at a time. The `payload` carries the
/// artifact value being offered for review so observers never need to read
/// the field map to render the decision.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PendingCheckpoint {
    /// Which artifact is awaiting review.
    pub artifact: Artifact,
    /// The artifact value offered for review.
    pub payload: Value,
    /// Set when the revision loop exhausted its bound and the checkpoint
    /// was forced rather than reached via a passing evaluation.
    #[serde(default)]
    pub escalated: bool,
    /// When the checkpoint was offered.
    pub offered_at: DateTime<Utc>,
}

// ---------------------------------------------------------------------------
// Decision payload
// ---------------------------------------------------------------------------

/// The sole external input accepted while a session is parked.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DecisionPayload {
    pub approved: bool,
    /// Direct replacement for the offered artifact; only valid with
    /// `approved = true`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub edits: Option<Value>,
    /// Revision guidance; required and non-empty with `approved = false`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub feedback: Option<String>,
}

/// A validated decision, ready to apply.
#[derive(Debug, Clone, PartialEq)]
pub enum DecisionAction {
    Approve { edits: Option<Value> },
    Reject { feedback: String },
}

impl DecisionPayload {
    /// Validate the payload shape.
    ///
    /// An approval with no edits and no feedback is "approve as-is".
    /// A rejection without non-empty feedback is rejected outright and
    /// must leave the checkpoint pending.
    pub fn validate(&self) -> Result<DecisionAction, EngineError> {
        if self.approved {
            if self.feedback.as_deref().is_some_and(|f| !f.trim().is_empty()) {
                return Err(EngineError::InputValidation(
                    "feedback is only meaningful on rejection".to_string(),
                ));
            }
            Ok(DecisionAction::Approve {
                edits: self.edits.clone(),
            })
        } else {
            if self.edits.is_some() {
                return Err(EngineError::InputValidation(
                    "edits are only meaningful on approval".to_string(),
                ));
            }
            match self.feedback.as_deref().map(str::trim) {
                Some(f) if !f.is_empty() => Ok(DecisionAction::Reject {
                    feedback: f.to_string(),
                }),
                _ => Err(EngineError::InputValidation(
                    "rejection requires non-empty feedback".to_string(),
                )),
            }
        }
    }
}

// ---------------------------------------------------------------------------
// Evaluation
// ---------------------------------------------------------------------------

/// Verdict produced by an evaluator phase for one artifact.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Evaluation {
    /// Quality score in `[0.0, 1.0]`, compared against the theme's
    /// configured quality bar.
    pub score: f32,
    /// Structural/quality findings, fed into the next regeneration.
    #[serde(default)]
    pub issues: Vec<String>,
}

impl Evaluation {
    pub fn passes(&self, quality_bar: f32) -> bool {
        self.score >= quality_bar
    }
}

// ---------------------------------------------------------------------------
// Error records
// ---------------------------------------------------------------------------

/// One entry in the session's append-only `errors` field.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorRecord {
    pub phase: String,
    pub kind: String,
    pub detail: String,
    pub at: DateTime<Utc>,
}

// ---------------------------------------------------------------------------
// Session
// ---------------------------------------------------------------------------

/// The durable unit of workflow state.
///
/// `fields` is an open map whose keys and merge semantics are declared by
/// the core state store; the session itself stays schema-agnostic so that
/// persistence is a whole-record JSON write.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Session {
    /// Opaque unique identifier, assigned at creation, never reused.
    pub id: Uuid,
    /// Theme name this session was started with. The resolved
    /// configuration is threaded into every phase call, never read from
    /// ambient state.
    pub theme: String,
    pub status: SessionStatus,
    /// Name of the last-executed or currently-pending phase.
    pub current_phase: String,
    /// Open field map; every key is declared in the state store.
    pub fields: HashMap<String, Value>,
    /// Set while traversal is suspended at a checkpoint.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pending_checkpoint: Option<PendingCheckpoint>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Session {
    pub fn field(&self, key: &str) -> Option<&Value> {
        self.fields.get(key)
    }

    /// Read a string-typed field, treating JSON null as absent.
    pub fn string_field(&self, key: &str) -> Option<&str> {
        match self.fields.get(key) {
            Some(Value::String(s)) => Some(s.as_str()),
            _ => None,
        }
    }

    pub fn artifact_value(&self, artifact: Artifact) -> Option<&Value> {
        match self.fields.get(&artifact.value_key()) {
            Some(Value::Null) | None => None,
            Some(v) => Some(v),
        }
    }

    pub fn is_approved(&self, artifact: Artifact) -> bool {
        matches!(
            self.fields.get(&artifact.approved_key()),
            Some(Value::Bool(true))
        )
    }

    pub fn revision_count(&self, artifact: Artifact) -> u32 {
        self.fields
            .get(&artifact.revision_count_key())
            .and_then(Value::as_u64)
            .unwrap_or(0) as u32
    }

    pub fn feedback(&self, artifact: Artifact) -> Option<&str> {
        self.string_field(&artifact.feedback_key())
    }

    pub fn evaluation(&self, artifact: Artifact) -> Option<Evaluation> {
        self.fields
            .get(&artifact.evaluation_key())
            .and_then(|v| serde_json::from_value(v.clone()).ok())
    }

    pub fn errors(&self) -> Vec<ErrorRecord> {
        self.fields
            .get("errors")
            .and_then(Value::as_array)
            .map(|entries| {
                entries
                    .iter()
                    .filter_map(|e| serde_json::from_value(e.clone()).ok())
                    .collect()
            })
            .unwrap_or_default()
    }
}

// ---------------------------------------------------------------------------
// Action-surface reply
// ---------------------------------------------------------------------------

/// Response shape for `start` / `approve` / `rollback` / `resume`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EngineStatus {
    pub session_id: Uuid,
    pub status: SessionStatus,
    pub phase: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub checkpoint: Option<PendingCheckpoint>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl EngineStatus {
    pub fn of(session: &Session) -> Self {
        Self {
            session_id: session.id,
            status: session.status,
            phase: session.current_phase.clone(),
            checkpoint: session.pending_checkpoint.clone(),
            error: session
                .errors()
                .last()
                .map(|e| format!("{}: {}", e.kind, e.detail)),
        }
    }
}

/// Compact row for session listings (CLI tables, list endpoint).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionListing {
    pub id: Uuid,
    pub theme: String,
    pub status: SessionStatus,
    pub current_phase: String,
    pub updated_at: DateTime<Utc>,
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
