//! Phase registry and phase execution.
//!
//! A phase is a named unit of work that reads the session and returns a
//! patch; it never mutates state directly and never decides routing.
//! Checkpoint phases are declared here but executed by the engine, since
//! they suspend the walk instead of producing a patch.

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use serde_json::{Value, json};
use tracing::debug;

use draftflow_types::config::ThemeConfig;
use draftflow_types::error::{EngineError, GeneratorError};
use draftflow_types::event::ProgressKind;
use draftflow_types::session::{Artifact, Evaluation, Session};

use crate::progress::ProgressChannel;
use crate::retry::with_backoff;
use crate::revision::combined_instruction;
use crate::sanitize;
use crate::state::StatePatch;

// ---------------------------------------------------------------------------
// Service boundaries
// ---------------------------------------------------------------------------

/// One request to the content generator.
#[derive(Debug, Clone)]
pub struct GenerationRequest {
    pub artifact: Artifact,
    pub model: String,
    pub system: String,
    pub instruction: String,
    pub timeout: Duration,
}

/// Generator output, already parsed to JSON.
#[derive(Debug, Clone)]
pub struct GenerationResponse {
    pub content: Value,
}

/// Produces artifact drafts. The HTTP-backed implementation lives in the
/// infra crate; tests script this trait directly.
pub trait ContentGenerator: Send + Sync {
    fn generate(
        &self,
        request: GenerationRequest,
    ) -> impl Future<Output = Result<GenerationResponse, GeneratorError>> + Send;
}

/// Scores one artifact draft against the theme's quality bar.
pub trait ArtifactEvaluator: Send + Sync {
    fn evaluate(
        &self,
        artifact: Artifact,
        value: &Value,
        config: &ThemeConfig,
    ) -> impl Future<Output = Result<Evaluation, GeneratorError>> + Send;
}

// ---------------------------------------------------------------------------
// Phase declarations
// ---------------------------------------------------------------------------

/// What a phase does; names are assigned by the pipeline.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PhaseKind {
    Intake,
    Generate(Artifact),
    Evaluate(Artifact),
    Checkpoint(Artifact),
    Assemble,
}

#[derive(Debug, Clone)]
pub struct PhaseDef {
    pub name: String,
    pub kind: PhaseKind,
}

/// Named phase lookup for one pipeline.
#[derive(Debug, Clone, Default)]
pub struct PhaseRegistry {
    phases: BTreeMap<String, PhaseDef>,
}

impl PhaseRegistry {
    pub fn register(&mut self, name: &str, kind: PhaseKind) {
        self.phases.insert(
            name.to_string(),
            PhaseDef {
                name: name.to_string(),
                kind,
            },
        );
    }

    pub fn get(&self, name: &str) -> Option<&PhaseDef> {
        self.phases.get(name)
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.phases.keys().map(String::as_str)
    }

    pub fn defs(&self) -> impl Iterator<Item = &PhaseDef> {
        self.phases.values()
    }
}

// ---------------------------------------------------------------------------
// Execution
// ---------------------------------------------------------------------------

/// Executes non-checkpoint phases against the service boundaries.
pub struct PhaseRunner<G, E> {
    generator: Arc<G>,
    evaluator: Arc<E>,
    progress: ProgressChannel,
}

impl<G, E> PhaseRunner<G, E>
where
    G: ContentGenerator,
    E: ArtifactEvaluator,
{
    pub fn new(generator: Arc<G>, evaluator: Arc<E>, progress: ProgressChannel) -> Self {
        Self {
            generator,
            evaluator,
            progress,
        }
    }

    /// Run one phase and return its patch.
    pub async fn run(
        &self,
        def: &PhaseDef,
        session: &Session,
        config: &ThemeConfig,
    ) -> Result<StatePatch, EngineError> {
        debug!(session_id = %session.id, phase = %def.name, "running phase");
        match def.kind {
            PhaseKind::Intake => intake(session),
            PhaseKind::Generate(artifact) => {
                self.generate(&def.name, artifact, session, config).await
            }
            PhaseKind::Evaluate(artifact) => {
                self.evaluate(&def.name, artifact, session, config).await
            }
            PhaseKind::Assemble => assemble(session),
            PhaseKind::Checkpoint(_) => Err(EngineError::Terminal(format!(
                "checkpoint phase '{}' cannot be executed as work",
                def.name
            ))),
        }
    }

    async fn generate(
        &self,
        phase: &str,
        artifact: Artifact,
        session: &Session,
        config: &ThemeConfig,
    ) -> Result<StatePatch, EngineError> {
        let request = build_generation_request(artifact, session, config)?;
        self.progress.emit(
            session.id,
            phase,
            ProgressKind::LlmStart,
            json!({"model": request.model}),
        );

        let response = with_backoff(&config.retry, phase, |_| {
            self.generator.generate(request.clone())
        })
        .await?;

        self.progress
            .emit(session.id, phase, ProgressKind::LlmComplete, Value::Null);

        let cleaned = sanitize::sanitize(artifact, response.content);
        sanitize::validate(artifact, &cleaned).map_err(|detail| {
            EngineError::SchemaValidation {
                phase: phase.to_string(),
                detail,
            }
        })?;

        // Feedback is write-once-read-once: consumed by this regeneration.
        Ok(StatePatch::new()
            .set(artifact.value_key(), cleaned)
            .set(artifact.feedback_key(), Value::Null))
    }

    async fn evaluate(
        &self,
        phase: &str,
        artifact: Artifact,
        session: &Session,
        config: &ThemeConfig,
    ) -> Result<StatePatch, EngineError> {
        let value = session
            .artifact_value(artifact)
            .ok_or_else(|| EngineError::Terminal(format!("no {artifact} to evaluate")))?
            .clone();

        let evaluation = with_backoff(&config.retry, phase, |_| {
            self.evaluator.evaluate(artifact, &value, config)
        })
        .await?;

        self.progress.emit(
            session.id,
            phase,
            ProgressKind::Progress,
            json!({"score": evaluation.score, "issues": evaluation.issues.len()}),
        );

        let encoded = serde_json::to_value(&evaluation)
            .map_err(|e| EngineError::Terminal(e.to_string()))?;
        Ok(StatePatch::new().set(artifact.evaluation_key(), encoded))
    }
}

fn intake(session: &Session) -> Result<StatePatch, EngineError> {
    let brief = session
        .string_field("brief")
        .map(str::trim)
        .filter(|b| !b.is_empty())
        .ok_or_else(|| EngineError::InputValidation("brief must be a non-empty string".to_string()))?;
    Ok(StatePatch::new().set("brief", Value::String(brief.to_string())))
}

fn assemble(session: &Session) -> Result<StatePatch, EngineError> {
    for artifact in [Artifact::Outline, Artifact::Article] {
        if !session.is_approved(artifact) {
            return Err(EngineError::Terminal(format!(
                "cannot assemble: {artifact} is not approved"
            )));
        }
    }
    let outline = session
        .artifact_value(Artifact::Outline)
        .cloned()
        .unwrap_or(Value::Null);
    let body = session
        .artifact_value(Artifact::Article)
        .and_then(|a| a.get("body"))
        .and_then(Value::as_str)
        .unwrap_or_default()
        .to_string();
    let word_count = body.split_whitespace().count();

    let document = json!({
        "outline": outline,
        "body": body,
        "word_count": word_count,
        "assembled_at": Utc::now(),
    });
    Ok(StatePatch::new().set("assembled_document", document))
}

fn build_generation_request(
    artifact: Artifact,
    session: &Session,
    config: &ThemeConfig,
) -> Result<GenerationRequest, EngineError> {
    let brief = session
        .string_field("brief")
        .ok_or_else(|| EngineError::Terminal("session has no brief".to_string()))?;

    let system = match artifact {
        Artifact::Outline => config.prompts.outline.clone(),
        Artifact::Article => config.prompts.article.clone(),
    };

    let mut instruction = format!("Brief:\n{brief}");
    if let Some(notes) = session.string_field("source_notes") {
        instruction.push_str(&format!("\n\nSource notes:\n{notes}"));
    }
    if let Some(style) = session.string_field("style_guide") {
        instruction.push_str(&format!("\n\nStyle guide:\n{style}"));
    }
    if artifact == Artifact::Article {
        let outline = session
            .artifact_value(Artifact::Outline)
            .ok_or_else(|| EngineError::Terminal("article requires an outline".to_string()))?;
        instruction.push_str(&format!("\n\nApproved outline:\n{outline}"));
    }
    if let Some(revision) = combined_instruction(session, artifact) {
        instruction.push_str(&format!("\n\n{revision}"));
    }

    Ok(GenerationRequest {
        artifact,
        model: config.model.clone(),
        system,
        instruction,
        timeout: Duration::from_secs(config.generation_timeout_secs),
    })
}
