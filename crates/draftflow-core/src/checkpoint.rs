//! Checkpoint arming and decision application.
//!
//! A checkpoint parks the session: the walk is suspended, a
//! `PendingCheckpoint` is persisted, and the only way forward is a
//! decision payload. Arming an already-approved checkpoint is skipped by
//! the engine so replayed decisions stay idempotent.

use chrono::Utc;
use serde_json::Value;

use draftflow_types::error::EngineError;
use draftflow_types::session::{
    Artifact, DecisionAction, DecisionPayload, PendingCheckpoint, Session, SessionStatus,
};

use crate::state::{FieldRegistry, LAST_DECISION_EDITS_KEY, StatePatch};

/// Outcome of a validated, applied decision.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DecisionOutcome {
    Approved,
    Rejected,
}

/// Park the session at a checkpoint for `artifact`.
///
/// The offered payload is the live artifact value. At most one checkpoint
/// may be pending; a second arm without an intervening decision is a
/// walk bug.
pub fn arm(
    session: &mut Session,
    phase: &str,
    artifact: Artifact,
    escalated: bool,
) -> Result<(), EngineError> {
    if session.pending_checkpoint.is_some() {
        return Err(EngineError::Terminal(format!(
            "checkpoint '{phase}' armed while another is pending"
        )));
    }
    let payload = session
        .artifact_value(artifact)
        .ok_or_else(|| {
            EngineError::Terminal(format!("checkpoint '{phase}' has no {artifact} to offer"))
        })?
        .clone();

    session.pending_checkpoint = Some(PendingCheckpoint {
        artifact,
        payload,
        escalated,
        offered_at: Utc::now(),
    });
    // A fresh offer means the previous decision's edits are spent.
    session
        .fields
        .insert(LAST_DECISION_EDITS_KEY.to_string(), Value::Null);
    session.status = SessionStatus::Waiting;
    session.current_phase = phase.to_string();
    Ok(())
}

/// Validate and apply a decision to the pending checkpoint.
///
/// Invalid payloads leave the checkpoint pending and the session
/// untouched. On approval the submitted edits (if any) are cached in
/// `last_decision_edits` before anything else can fail, so a later
/// terminal error never discards them.
pub fn apply_decision(
    session: &mut Session,
    registry: &FieldRegistry,
    payload: &DecisionPayload,
) -> Result<DecisionOutcome, EngineError> {
    let pending = session
        .pending_checkpoint
        .as_ref()
        .ok_or(EngineError::NotAtCheckpoint)?;
    let artifact = pending.artifact;
    let action = payload.validate()?;

    let (patch, outcome) = match action {
        DecisionAction::Approve { edits } => {
            let mut patch = StatePatch::new()
                .set(artifact.approved_key(), Value::Bool(true))
                .set(artifact.previous_key(), Value::Null)
                .set(
                    LAST_DECISION_EDITS_KEY,
                    edits.clone().unwrap_or(Value::Null),
                );
            if let Some(edits) = edits {
                patch.insert(artifact.value_key(), edits);
            }
            (patch, DecisionOutcome::Approved)
        }
        DecisionAction::Reject { feedback } => {
            let mut patch =
                StatePatch::new().set(artifact.feedback_key(), Value::String(feedback));
            // Snapshot the rejected draft, once per cycle.
            let snapshotted = session
                .field(&artifact.previous_key())
                .is_some_and(|v| !v.is_null());
            if !snapshotted && let Some(current) = session.artifact_value(artifact) {
                patch.insert(artifact.previous_key(), current.clone());
            }
            (patch, DecisionOutcome::Rejected)
        }
    };

    registry.apply_patch(&mut session.fields, &patch)?;
    session.pending_checkpoint = None;
    session.status = SessionStatus::Processing;
    Ok(outcome)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::collections::HashMap;
    use uuid::Uuid;

    fn parked_session() -> (Session, FieldRegistry) {
        let registry = FieldRegistry::standard();
        let mut fields = registry.default_state();
        fields.insert("outline".to_string(), json!({"sections": ["hook"]}));
        let mut session = Session {
            id: Uuid::now_v7(),
            theme: "editorial".to_string(),
            status: SessionStatus::Processing,
            current_phase: "evaluate_outline".to_string(),
            fields,
            pending_checkpoint: None,
            created_at: Utc::now(),
            updated_at: Utc::now(),
        };
        arm(&mut session, "checkpoint_outline", Artifact::Outline, false).unwrap();
        (session, registry)
    }

    #[test]
    fn arm_parks_the_session() {
        let (session, _) = parked_session();
        assert_eq!(session.status, SessionStatus::Waiting);
        assert_eq!(session.current_phase, "checkpoint_outline");
        let pending = session.pending_checkpoint.as_ref().unwrap();
        assert_eq!(pending.artifact, Artifact::Outline);
        assert_eq!(pending.payload, json!({"sections": ["hook"]}));
        assert!(!pending.escalated);
    }

    #[test]
    fn double_arm_is_a_walk_bug() {
        let (mut session, _) = parked_session();
        assert!(arm(&mut session, "checkpoint_outline", Artifact::Outline, false).is_err());
    }

    #[test]
    fn arm_without_artifact_fails() {
        let registry = FieldRegistry::standard();
        let mut session = Session {
            id: Uuid::now_v7(),
            theme: "editorial".to_string(),
            status: SessionStatus::Processing,
            current_phase: "evaluate_article".to_string(),
            fields: registry.default_state(),
            pending_checkpoint: None,
            created_at: Utc::now(),
            updated_at: Utc::now(),
        };
        assert!(arm(&mut session, "checkpoint_article", Artifact::Article, false).is_err());
    }

    #[test]
    fn approve_as_is() {
        let (mut session, registry) = parked_session();
        let outcome = apply_decision(
            &mut session,
            &registry,
            &DecisionPayload {
                approved: true,
                edits: None,
                feedback: None,
            },
        )
        .unwrap();
        assert_eq!(outcome, DecisionOutcome::Approved);
        assert!(session.is_approved(Artifact::Outline));
        assert!(session.pending_checkpoint.is_none());
        assert_eq!(session.status, SessionStatus::Processing);
        assert_eq!(session.fields["last_decision_edits"], Value::Null);
    }

    #[test]
    fn approve_with_edits_replaces_and_caches() {
        let (mut session, registry) = parked_session();
        let edits = json!({"sections": ["better hook"]});
        apply_decision(
            &mut session,
            &registry,
            &DecisionPayload {
                approved: true,
                edits: Some(edits.clone()),
                feedback: None,
            },
        )
        .unwrap();
        assert_eq!(session.fields["outline"], edits);
        assert_eq!(session.fields["last_decision_edits"], edits);
        assert!(session.is_approved(Artifact::Outline));
    }

    #[test]
    fn arming_invalidates_the_edit_cache() {
        let (mut session, registry) = parked_session();
        let edits = json!({"sections": ["edited hook"]});
        apply_decision(
            &mut session,
            &registry,
            &DecisionPayload {
                approved: true,
                edits: Some(edits.clone()),
                feedback: None,
            },
        )
        .unwrap();
        assert_eq!(session.fields["last_decision_edits"], edits);

        session
            .fields
            .insert("article".to_string(), json!({"body": "draft"}));
        arm(&mut session, "checkpoint_article", Artifact::Article, false).unwrap();
        assert_eq!(session.fields["last_decision_edits"], Value::Null);
    }

    #[test]
    fn approval_clears_previous_snapshot() {
        let (mut session, registry) = parked_session();
        session
            .fields
            .insert("previous_outline".to_string(), json!({"sections": ["old"]}));
        apply_decision(
            &mut session,
            &registry,
            &DecisionPayload {
                approved: true,
                edits: None,
                feedback: None,
            },
        )
        .unwrap();
        assert_eq!(session.fields["previous_outline"], Value::Null);
    }

    #[test]
    fn reject_stores_feedback_and_snapshots() {
        let (mut session, registry) = parked_session();
        let outcome = apply_decision(
            &mut session,
            &registry,
            &DecisionPayload {
                approved: false,
                edits: None,
                feedback: Some("tighten the hook".to_string()),
            },
        )
        .unwrap();
        assert_eq!(outcome, DecisionOutcome::Rejected);
        assert_eq!(
            session.feedback(Artifact::Outline),
            Some("tighten the hook")
        );
        assert_eq!(
            session.fields["previous_outline"],
            json!({"sections": ["hook"]})
        );
        assert!(!session.is_approved(Artifact::Outline));
        assert!(session.pending_checkpoint.is_none());
    }

    #[test]
    fn invalid_payload_leaves_checkpoint_pending() {
        let (mut session, registry) = parked_session();
        let err = apply_decision(
            &mut session,
            &registry,
            &DecisionPayload {
                approved: false,
                edits: None,
                feedback: None,
            },
        )
        .unwrap_err();
        assert!(matches!(err, EngineError::InputValidation(_)));
        assert!(session.pending_checkpoint.is_some());
        assert_eq!(session.status, SessionStatus::Waiting);
    }

    #[test]
    fn decision_without_checkpoint_is_409() {
        let registry = FieldRegistry::standard();
        let mut session = Session {
            id: Uuid::now_v7(),
            theme: "editorial".to_string(),
            status: SessionStatus::Processing,
            current_phase: "generate_outline".to_string(),
            fields: registry.default_state(),
            pending_checkpoint: None,
            created_at: Utc::now(),
            updated_at: Utc::now(),
        };
        assert!(matches!(
            apply_decision(
                &mut session,
                &registry,
                &DecisionPayload {
                    approved: true,
                    edits: None,
                    feedback: None
                }
            ),
            Err(EngineError::NotAtCheckpoint)
        ));
    }
}
