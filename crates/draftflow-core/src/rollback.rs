//! Rollback to an earlier checkpoint.
//!
//! Each rollback target is declared once per pipeline: the checkpoint
//! phase it re-arms and the exact field keys that are downstream of it.
//! A rollback resets those keys to their registry defaults, applies the
//! caller's overrides, re-arms the checkpoint, and hands back a session
//! the engine persists in one write. Upstream fields are untouched.

use std::collections::BTreeMap;

use tracing::info;

use draftflow_types::error::EngineError;
use draftflow_types::session::{Artifact, Session};

use crate::checkpoint;
use crate::state::{FieldRegistry, StatePatch, clear_phase_errors};

/// One declared rollback destination.
#[derive(Debug, Clone)]
pub struct RollbackTarget {
    pub artifact: Artifact,
    /// Checkpoint phase to re-arm.
    pub checkpoint_phase: String,
    /// Field keys invalidated by re-deciding this checkpoint.
    pub downstream_keys: Vec<String>,
    /// Phases whose error records are downstream of this checkpoint.
    pub downstream_phases: Vec<String>,
}

#[derive(Debug, Clone, Default)]
pub struct RollbackManager {
    targets: BTreeMap<String, RollbackTarget>,
}

impl RollbackManager {
    pub fn declare(&mut self, name: &str, target: RollbackTarget) {
        self.targets.insert(name.to_string(), target);
    }

    pub fn target(&self, name: &str) -> Option<&RollbackTarget> {
        self.targets.get(name)
    }

    /// Apply a rollback in memory.
    ///
    /// The session must be parked (not mid-phase). Returns the rewound
    /// session for a single persistence write; on any error the input is
    /// untouched and nothing must be persisted.
    pub fn rollback(
        &self,
        session: &Session,
        target_name: &str,
        overrides: Option<&StatePatch>,
        registry: &FieldRegistry,
    ) -> Result<Session, EngineError> {
        let target = self
            .targets
            .get(target_name)
            .ok_or_else(|| EngineError::UnknownRollbackTarget(target_name.to_string()))?;

        if let Some(patch) = overrides {
            for key in patch.keys() {
                if !registry.contains(key) {
                    return Err(EngineError::InputValidation(format!(
                        "override targets undeclared state key '{key}'"
                    )));
                }
            }
        }

        let mut rewound = session.clone();
        rewound.pending_checkpoint = None;

        // The checkpoint must have something to re-offer.
        if rewound.artifact_value(target.artifact).is_none() {
            return Err(EngineError::InputValidation(format!(
                "checkpoint '{target_name}' has not been reached"
            )));
        }

        for key in &target.downstream_keys {
            let default = registry.default_value(key).ok_or_else(|| {
                EngineError::Terminal(format!("rollback target clears undeclared key '{key}'"))
            })?;
            rewound.fields.insert(key.clone(), default);
        }
        let phases: Vec<&str> = target.downstream_phases.iter().map(String::as_str).collect();
        clear_phase_errors(&mut rewound, &phases);

        if let Some(patch) = overrides {
            registry.apply_patch(&mut rewound.fields, patch)?;
        }

        checkpoint::arm(
            &mut rewound,
            &target.checkpoint_phase,
            target.artifact,
            false,
        )?;
        info!(
            session_id = %session.id,
            target = target_name,
            phase = %target.checkpoint_phase,
            "session rewound to checkpoint"
        );
        Ok(rewound)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use draftflow_types::session::SessionStatus;
    use serde_json::{Value, json};
    use uuid::Uuid;

    fn manager() -> RollbackManager {
        let mut manager = RollbackManager::default();
        manager.declare(
            "outline",
            RollbackTarget {
                artifact: Artifact::Outline,
                checkpoint_phase: "checkpoint_outline".to_string(),
                downstream_keys: vec![
                    "outline_approved".to_string(),
                    "outline_revision_count".to_string(),
                    "outline_feedback".to_string(),
                    "previous_outline".to_string(),
                    "outline_evaluation".to_string(),
                    "last_decision_edits".to_string(),
                    "article".to_string(),
                    "article_approved".to_string(),
                    "article_revision_count".to_string(),
                    "article_feedback".to_string(),
                    "previous_article".to_string(),
                    "article_evaluation".to_string(),
                    "assembled_document".to_string(),
                ],
                downstream_phases: vec![
                    "generate_article".to_string(),
                    "evaluate_article".to_string(),
                    "assemble".to_string(),
                ],
            },
        );
        manager
    }

    fn completed_session(registry: &FieldRegistry) -> Session {
        let mut fields = registry.default_state();
        fields.insert("brief".to_string(), json!("cover the launch"));
        fields.insert("outline".to_string(), json!({"sections": ["hook"]}));
        fields.insert("outline_approved".to_string(), json!(true));
        fields.insert("article".to_string(), json!({"body": "text"}));
        fields.insert("article_approved".to_string(), json!(true));
        fields.insert("article_revision_count".to_string(), json!(2));
        fields.insert("assembled_document".to_string(), json!({"body": "text"}));
        Session {
            id: Uuid::now_v7(),
            theme: "editorial".to_string(),
            status: SessionStatus::Complete,
            current_phase: "complete".to_string(),
            fields,
            pending_checkpoint: None,
            created_at: Utc::now(),
            updated_at: Utc::now(),
        }
    }

    #[test]
    fn rollback_clears_downstream_and_rearms() {
        let registry = FieldRegistry::standard();
        let session = completed_session(&registry);
        let rewound = manager()
            .rollback(&session, "outline", None, &registry)
            .unwrap();

        assert_eq!(rewound.status, SessionStatus::Waiting);
        assert_eq!(rewound.current_phase, "checkpoint_outline");
        let pending = rewound.pending_checkpoint.as_ref().unwrap();
        assert_eq!(pending.artifact, Artifact::Outline);
        assert_eq!(pending.payload, json!({"sections": ["hook"]}));

        // Downstream cleared.
        assert_eq!(rewound.fields["article"], Value::Null);
        assert_eq!(rewound.fields["article_approved"], json!(false));
        assert_eq!(rewound.fields["article_revision_count"], json!(0));
        assert_eq!(rewound.fields["assembled_document"], Value::Null);
        assert_eq!(rewound.fields["outline_approved"], json!(false));

        // Upstream untouched; the artifact itself survives for re-offer.
        assert_eq!(rewound.fields["brief"], json!("cover the launch"));
        assert_eq!(rewound.fields["outline"], json!({"sections": ["hook"]}));

        // Input session untouched.
        assert_eq!(session.fields["article"], json!({"body": "text"}));
    }

    #[test]
    fn overrides_apply_before_rearm() {
        let registry = FieldRegistry::standard();
        let session = completed_session(&registry);
        let overrides = StatePatch::new().set("outline", json!({"sections": ["new angle"]}));
        let rewound = manager()
            .rollback(&session, "outline", Some(&overrides), &registry)
            .unwrap();
        assert_eq!(rewound.fields["outline"], json!({"sections": ["new angle"]}));
        assert_eq!(
            rewound.pending_checkpoint.unwrap().payload,
            json!({"sections": ["new angle"]})
        );
    }

    #[test]
    fn unknown_target_rejected() {
        let registry = FieldRegistry::standard();
        let session = completed_session(&registry);
        assert!(matches!(
            manager().rollback(&session, "intro", None, &registry),
            Err(EngineError::UnknownRollbackTarget(_))
        ));
    }

    #[test]
    fn unknown_override_key_rejected() {
        let registry = FieldRegistry::standard();
        let session = completed_session(&registry);
        let overrides = StatePatch::new().set("not_a_key", json!(1));
        assert!(matches!(
            manager().rollback(&session, "outline", Some(&overrides), &registry),
            Err(EngineError::InputValidation(_))
        ));
    }

    #[test]
    fn unreached_checkpoint_rejected() {
        let registry = FieldRegistry::standard();
        let mut session = completed_session(&registry);
        session.fields.insert("outline".to_string(), Value::Null);
        assert!(matches!(
            manager().rollback(&session, "outline", None, &registry),
            Err(EngineError::InputValidation(_))
        ));
    }
}
