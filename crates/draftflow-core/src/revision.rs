//! Revision cycle bookkeeping.
//!
//! A revision cycle is entered either by a human rejection at a
//! checkpoint or by a failing evaluation before the artifact has been
//! offered. Each entry snapshots the outgoing draft (once per cycle),
//! increments the explicit revision counter, and regenerates with a
//! combined instruction. The counter, never history length, bounds the
//! loop.

use serde_json::Value;

use draftflow_types::config::ThemeConfig;
use draftflow_types::session::{Artifact, Session};

use crate::state::StatePatch;

/// Where the loop goes after an evaluation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RevisionVerdict {
    /// Score cleared the bar: offer the artifact at its checkpoint.
    Offer,
    /// Score failed but the budget allows another silent regeneration.
    Loop,
    /// Budget exhausted: force the checkpoint offer, flagged.
    Escalate,
}

/// Decide the next step from the artifact's latest evaluation.
pub fn verdict(session: &Session, artifact: Artifact, config: &ThemeConfig) -> RevisionVerdict {
    let passed = session
        .evaluation(artifact)
        .is_some_and(|eval| eval.passes(config.quality_bar));
    if passed {
        RevisionVerdict::Offer
    } else if session.revision_count(artifact) < config.max_revisions {
        RevisionVerdict::Loop
    } else {
        RevisionVerdict::Escalate
    }
}

/// Bookkeeping patch applied when entering a revision cycle: snapshot the
/// outgoing draft (unless one is already held for this cycle), bump the
/// counter, and drop any stale approval.
pub fn prepare(session: &Session, artifact: Artifact) -> StatePatch {
    let mut patch = StatePatch::new()
        .set(
            artifact.revision_count_key(),
            Value::from(session.revision_count(artifact) + 1),
        )
        .set(artifact.approved_key(), Value::Bool(false));

    let already_snapshotted = session
        .field(&artifact.previous_key())
        .is_some_and(|v| !v.is_null());
    if !already_snapshotted
        && let Some(current) = session.artifact_value(artifact)
    {
        patch.insert(artifact.previous_key(), current.clone());
    }
    patch
}

/// Build the regeneration instruction from human feedback and evaluator
/// findings. Human feedback always leads. Returns `None` when there is
/// nothing to fold in (a first generation).
pub fn combined_instruction(session: &Session, artifact: Artifact) -> Option<String> {
    let mut parts = Vec::new();
    if let Some(feedback) = session.feedback(artifact) {
        parts.push(format!("Reviewer feedback (address first):\n{feedback}"));
    }
    if let Some(eval) = session.evaluation(artifact)
        && !eval.issues.is_empty()
    {
        let issues = eval
            .issues
            .iter()
            .map(|issue| format!("- {issue}"))
            .collect::<Vec<_>>()
            .join("\n");
        parts.push(format!("Evaluator findings:\n{issues}"));
    }
    if parts.is_empty() {
        None
    } else {
        Some(parts.join("\n\n"))
    }
}
