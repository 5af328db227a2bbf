//! The editorial pipeline: phases, routing, and rollback targets for one
//! theme, resolved once at build and validated before any session runs.

use std::sync::Arc;

use draftflow_types::config::ThemeConfig;
use draftflow_types::error::EngineError;
use draftflow_types::session::{Artifact, Session};

use crate::phase::{PhaseKind, PhaseRegistry};
use crate::revision::{self, RevisionVerdict};
use crate::rollback::{RollbackManager, RollbackTarget};
use crate::routing::{COMPLETE, RoutingTable};
use crate::state::{FieldRegistry, LAST_DECISION_EDITS_KEY};

/// Phase names, fixed per pipeline shape.
pub mod phases {
    pub const INTAKE: &str = "intake";
    pub const GENERATE_OUTLINE: &str = "generate_outline";
    pub const EVALUATE_OUTLINE: &str = "evaluate_outline";
    pub const CHECKPOINT_OUTLINE: &str = "checkpoint_outline";
    pub const GENERATE_ARTICLE: &str = "generate_article";
    pub const EVALUATE_ARTICLE: &str = "evaluate_article";
    pub const CHECKPOINT_ARTICLE: &str = "checkpoint_article";
    pub const ASSEMBLE: &str = "assemble";
    /// Terminal phase name recorded on failed sessions.
    pub const ERROR: &str = "error";
}

/// Branch labels used by the conditional edges.
pub mod labels {
    /// Evaluation cleared the bar: offer at the checkpoint.
    pub const OFFER: &str = "offer";
    /// Re-enter the revision cycle.
    pub const REVISE: &str = "revise";
    /// Revision budget exhausted: force the checkpoint offer.
    pub const ESCALATE: &str = "escalate";
    /// Checkpoint approved: continue downstream.
    pub const FORWARD: &str = "forward";
}

/// Everything needed to run sessions for one theme.
pub struct Pipeline {
    pub config: ThemeConfig,
    pub registry: FieldRegistry,
    pub phases: PhaseRegistry,
    pub routing: RoutingTable,
    pub rollback: RollbackManager,
    pub entry: &'static str,
}

impl Pipeline {
    /// Build and validate the pipeline for a theme.
    pub fn for_theme(config: ThemeConfig) -> Result<Self, EngineError> {
        let mut registry = PhaseRegistry::default();
        registry.register(phases::INTAKE, PhaseKind::Intake);
        registry.register(
            phases::GENERATE_OUTLINE,
            PhaseKind::Generate(Artifact::Outline),
        );
        registry.register(
            phases::EVALUATE_OUTLINE,
            PhaseKind::Evaluate(Artifact::Outline),
        );
        registry.register(
            phases::CHECKPOINT_OUTLINE,
            PhaseKind::Checkpoint(Artifact::Outline),
        );
        registry.register(
            phases::GENERATE_ARTICLE,
            PhaseKind::Generate(Artifact::Article),
        );
        registry.register(
            phases::EVALUATE_ARTICLE,
            PhaseKind::Evaluate(Artifact::Article),
        );
        registry.register(
            phases::CHECKPOINT_ARTICLE,
            PhaseKind::Checkpoint(Artifact::Article),
        );
        registry.register(phases::ASSEMBLE, PhaseKind::Assemble);

        let mut routing = RoutingTable::default();
        routing.add_static(phases::INTAKE, phases::GENERATE_OUTLINE);
        routing.add_static(phases::GENERATE_OUTLINE, phases::EVALUATE_OUTLINE);
        routing.add_conditional(
            phases::EVALUATE_OUTLINE,
            Arc::new(|session, config| after_evaluate(session, config, Artifact::Outline)),
            &[
                (labels::OFFER, phases::CHECKPOINT_OUTLINE),
                (labels::REVISE, phases::GENERATE_OUTLINE),
                (labels::ESCALATE, phases::CHECKPOINT_OUTLINE),
            ],
        );
        routing.add_conditional(
            phases::CHECKPOINT_OUTLINE,
            Arc::new(|session, _| after_checkpoint(session, Artifact::Outline)),
            &[
                (labels::FORWARD, phases::GENERATE_ARTICLE),
                (labels::REVISE, phases::GENERATE_OUTLINE),
            ],
        );
        routing.add_static(phases::GENERATE_ARTICLE, phases::EVALUATE_ARTICLE);
        routing.add_conditional(
            phases::EVALUATE_ARTICLE,
            Arc::new(|session, config| after_evaluate(session, config, Artifact::Article)),
            &[
                (labels::OFFER, phases::CHECKPOINT_ARTICLE),
                (labels::REVISE, phases::GENERATE_ARTICLE),
                (labels::ESCALATE, phases::CHECKPOINT_ARTICLE),
            ],
        );
        routing.add_conditional(
            phases::CHECKPOINT_ARTICLE,
            Arc::new(|session, _| after_checkpoint(session, Artifact::Article)),
            &[
                (labels::FORWARD, phases::ASSEMBLE),
                (labels::REVISE, phases::GENERATE_ARTICLE),
            ],
        );
        routing.add_static(phases::ASSEMBLE, COMPLETE);

        let mut rollback = RollbackManager::default();
        rollback.declare(
            Artifact::Outline.as_str(),
            RollbackTarget {
                artifact: Artifact::Outline,
                checkpoint_phase: phases::CHECKPOINT_OUTLINE.to_string(),
                downstream_keys: downstream_keys(Artifact::Outline),
                downstream_phases: vec![
                    phases::GENERATE_ARTICLE.to_string(),
                    phases::EVALUATE_ARTICLE.to_string(),
                    phases::ASSEMBLE.to_string(),
                ],
            },
        );
        rollback.declare(
            Artifact::Article.as_str(),
            RollbackTarget {
                artifact: Artifact::Article,
                checkpoint_phase: phases::CHECKPOINT_ARTICLE.to_string(),
                downstream_keys: downstream_keys(Artifact::Article),
                downstream_phases: vec![phases::ASSEMBLE.to_string()],
            },
        );

        routing.validate(&registry, phases::INTAKE)?;

        Ok(Self {
            config,
            registry: FieldRegistry::standard(),
            phases: registry,
            routing,
            rollback,
            entry: phases::INTAKE,
        })
    }
}

/// Keys invalidated by re-deciding a checkpoint, including the target's
/// own review bookkeeping. The artifact value itself stays for re-offer.
fn downstream_keys(target: Artifact) -> Vec<String> {
    let mut keys = vec![
        target.approved_key(),
        target.revision_count_key(),
        target.feedback_key(),
        target.previous_key(),
        target.evaluation_key(),
        LAST_DECISION_EDITS_KEY.to_string(),
        "assembled_document".to_string(),
    ];
    if target == Artifact::Outline {
        let article = Artifact::Article;
        keys.extend([
            article.value_key(),
            article.approved_key(),
            article.revision_count_key(),
            article.feedback_key(),
            article.previous_key(),
            article.evaluation_key(),
        ]);
    }
    keys
}

fn after_evaluate(session: &Session, config: &ThemeConfig, artifact: Artifact) -> &'static str {
    match revision::verdict(session, artifact, config) {
        RevisionVerdict::Offer => labels::OFFER,
        RevisionVerdict::Loop => labels::REVISE,
        RevisionVerdict::Escalate => labels::ESCALATE,
    }
}

fn after_checkpoint(session: &Session, artifact: Artifact) -> &'static str {
    if session.is_approved(artifact) {
        labels::FORWARD
    } else {
        labels::REVISE
    }
}
