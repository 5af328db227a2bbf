//! The workflow engine: owns the walk, the single-writer lane per
//! session, and the action surface (`start`, `decide`, `rollback`,
//! `resume`, `cancel`, reads).
//!
//! The walk is strictly sequential per session. Each phase boundary is
//! one durable write: patch merged, `current_phase` updated, record
//! saved. Resume derives everything from the persisted record; nothing
//! about traversal lives only in memory.

use std::collections::HashMap;
use std::sync::Arc;

use chrono::Utc;
use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};
use tokio::sync::Mutex;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};
use uuid::Uuid;

use draftflow_types::config::ThemeConfig;
use draftflow_types::error::EngineError;
use draftflow_types::event::{ProgressEvent, ProgressKind};
use draftflow_types::session::{
    DecisionPayload, EngineStatus, ErrorRecord, Session, SessionListing, SessionStatus,
};

use crate::checkpoint;
use crate::phase::{ArtifactEvaluator, ContentGenerator, PhaseKind, PhaseRunner};
use crate::pipeline::{Pipeline, labels, phases};
use crate::progress::ProgressChannel;
use crate::repository::SessionRepository;
use crate::revision;
use crate::routing::COMPLETE;
use crate::state::{self, StatePatch};

/// `current_phase` before the entry phase has merged.
const CREATED: &str = "created";

/// Input accepted by `start`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StartRequest {
    pub theme: String,
    pub brief: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source_notes: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub style_guide: Option<String>,
}

pub struct WorkflowEngine<R, G, E> {
    repo: Arc<R>,
    runner: PhaseRunner<G, E>,
    progress: ProgressChannel,
    pipelines: HashMap<String, Arc<Pipeline>>,
    lanes: DashMap<Uuid, Arc<Mutex<()>>>,
    cancellations: DashMap<Uuid, CancellationToken>,
}

impl<R, G, E> WorkflowEngine<R, G, E>
where
    R: SessionRepository,
    G: ContentGenerator,
    E: ArtifactEvaluator,
{
    /// Build an engine over a fixed set of themes. Pipelines are
    /// resolved and validated here, before any session can run.
    pub fn new(
        repo: Arc<R>,
        generator: Arc<G>,
        evaluator: Arc<E>,
        themes: Vec<ThemeConfig>,
    ) -> Result<Self, EngineError> {
        let progress = ProgressChannel::new();
        let mut pipelines = HashMap::new();
        for config in themes {
            let theme = config.theme.clone();
            pipelines.insert(theme, Arc::new(Pipeline::for_theme(config)?));
        }
        Ok(Self {
            repo,
            runner: PhaseRunner::new(generator, evaluator, progress.clone()),
            progress,
            pipelines,
            lanes: DashMap::new(),
            cancellations: DashMap::new(),
        })
    }

    pub fn subscribe_progress(&self) -> tokio::sync::broadcast::Receiver<ProgressEvent> {
        self.progress.subscribe()
    }

    // -----------------------------------------------------------------------
    // Action surface
    // -----------------------------------------------------------------------

    /// Validate input, create the session, and walk until it parks.
    ///
    /// Validation failures reject synchronously; nothing is persisted.
    pub async fn start(&self, request: StartRequest) -> Result<EngineStatus, EngineError> {
        let pipeline = self.pipeline(&request.theme)?;
        if request.brief.trim().is_empty() {
            return Err(EngineError::InputValidation(
                "brief must be a non-empty string".to_string(),
            ));
        }

        let mut fields = pipeline.registry.default_state();
        fields.insert("brief".to_string(), Value::String(request.brief));
        if let Some(notes) = request.source_notes {
            fields.insert("source_notes".to_string(), Value::String(notes));
        }
        if let Some(style) = request.style_guide {
            fields.insert("style_guide".to_string(), Value::String(style));
        }

        let now = Utc::now();
        let mut session = Session {
            id: Uuid::now_v7(),
            theme: request.theme,
            status: SessionStatus::Processing,
            current_phase: CREATED.to_string(),
            fields,
            pending_checkpoint: None,
            created_at: now,
            updated_at: now,
        };
        self.repo.create(&session).await?;
        info!(session_id = %session.id, theme = %session.theme, "session started");

        let lane = self.lane(session.id);
        let _guard = lane.lock().await;
        self.walk(&pipeline, &mut session).await?;
        Ok(EngineStatus::of(&session))
    }

    /// Apply a checkpoint decision and continue the walk.
    ///
    /// The decision is persisted before any downstream phase runs, so a
    /// later failure can never lose the submission. Racing decisions
    /// serialize on the session lane; the loser finds no pending
    /// checkpoint and gets a conflict.
    pub async fn decide(
        &self,
        id: Uuid,
        payload: DecisionPayload,
    ) -> Result<EngineStatus, EngineError> {
        let lane = self.lane(id);
        let _guard = lane.lock().await;

        let mut session = self.load(id).await?;
        let pipeline = self.pipeline(&session.theme)?;
        let outcome = checkpoint::apply_decision(&mut session, &pipeline.registry, &payload)?;
        self.persist(&mut session).await?;
        info!(session_id = %id, ?outcome, "checkpoint decision applied");

        self.walk(&pipeline, &mut session).await?;
        Ok(EngineStatus::of(&session))
    }

    /// Rewind a parked session to an earlier checkpoint.
    pub async fn rollback(
        &self,
        id: Uuid,
        target: &str,
        overrides: Option<StatePatch>,
    ) -> Result<EngineStatus, EngineError> {
        let lane = self.lane(id);
        let _guard = lane.lock().await;

        let session = self.load(id).await?;
        // Mid-phase sessions are not parked anywhere to rewind from;
        // same conflict class as a decision without a checkpoint.
        if session.status == SessionStatus::Processing {
            return Err(EngineError::NotAtCheckpoint);
        }
        let pipeline = self.pipeline(&session.theme)?;
        let mut rewound = pipeline.rollback.rollback(
            &session,
            target,
            overrides.as_ref(),
            &pipeline.registry,
        )?;
        // One write: either the full rewind lands or nothing does.
        self.persist(&mut rewound).await?;
        // A rewound session gets a fresh cancellation token, so a
        // previously cancelled one is live again.
        self.cancellations.remove(&id);
        Ok(EngineStatus::of(&rewound))
    }

    /// Resume a session from its persisted record.
    ///
    /// Parked-at-checkpoint sessions are returned as-is; terminal
    /// sessions likewise. A session left `processing` by a crash picks
    /// the walk back up from the last merged phase, without re-invoking
    /// anything already merged.
    pub async fn resume(&self, id: Uuid) -> Result<EngineStatus, EngineError> {
        let lane = self.lane(id);
        let _guard = lane.lock().await;

        let mut session = self.load(id).await?;
        if session.pending_checkpoint.is_some() || session.status.is_terminal() {
            return Ok(EngineStatus::of(&session));
        }
        let pipeline = self.pipeline(&session.theme)?;
        info!(session_id = %id, phase = %session.current_phase, "resuming interrupted session");
        self.walk(&pipeline, &mut session).await?;
        Ok(EngineStatus::of(&session))
    }

    /// Request cancellation. Takes effect immediately for a parked
    /// session, at the next phase boundary for a running one.
    pub async fn cancel(&self, id: Uuid) -> Result<EngineStatus, EngineError> {
        self.token(id).cancel();

        let lane = self.lane(id);
        let Ok(_guard) = lane.try_lock() else {
            // A walk holds the lane; it will observe the token at its
            // next boundary.
            let session = self.load(id).await?;
            return Ok(EngineStatus::of(&session));
        };
        let mut session = self.load(id).await?;
        if !session.status.is_terminal() {
            session.status = SessionStatus::Cancelled;
            session.pending_checkpoint = None;
            self.persist(&mut session).await?;
            info!(session_id = %id, "session cancelled");
        }
        self.release(id);
        Ok(EngineStatus::of(&session))
    }

    pub async fn get_state(&self, id: Uuid) -> Result<Session, EngineError> {
        self.load(id).await
    }

    pub async fn list(&self) -> Result<Vec<SessionListing>, EngineError> {
        Ok(self.repo.list().await?)
    }

    /// Startup sweep: resume every session a previous process left
    /// mid-phase. Failures are logged and skipped so one bad record
    /// cannot block recovery of the rest.
    pub async fn recover_interrupted(&self) -> Result<usize, EngineError> {
        let ids = self.repo.list_processing().await?;
        let total = ids.len();
        for id in ids {
            if let Err(err) = self.resume(id).await {
                warn!(session_id = %id, error = %err, "recovery sweep: resume failed");
            }
        }
        Ok(total)
    }

    // -----------------------------------------------------------------------
    // Walk
    // -----------------------------------------------------------------------

    /// Advance the session until it parks at a checkpoint, completes,
    /// fails terminally, or observes cancellation. Caller holds the
    /// session lane.
    async fn walk(&self, pipeline: &Pipeline, session: &mut Session) -> Result<(), EngineError> {
        let token = self.token(session.id);
        let mut escalated = false;

        loop {
            let step = if session.current_phase == CREATED {
                crate::routing::RouteStep {
                    target: pipeline.entry.to_string(),
                    label: None,
                }
            } else {
                pipeline
                    .routing
                    .next(&session.current_phase, session, &pipeline.config)?
            };

            if step.target == COMPLETE {
                session.status = SessionStatus::Complete;
                session.current_phase = COMPLETE.to_string();
                // The edit cache is spent once the walk finishes.
                session
                    .fields
                    .insert(state::LAST_DECISION_EDITS_KEY.to_string(), Value::Null);
                self.persist(session).await?;
                self.release(session.id);
                info!(session_id = %session.id, "session complete");
                return Ok(());
            }

            if token.is_cancelled() {
                session.status = SessionStatus::Cancelled;
                self.persist(session).await?;
                self.release(session.id);
                info!(session_id = %session.id, "cancellation observed at phase boundary");
                return Ok(());
            }

            let def = pipeline.phases.get(&step.target).ok_or_else(|| {
                EngineError::Terminal(format!("route to unregistered phase '{}'", step.target))
            })?;
            let def = def.clone();

            match step.label.as_deref() {
                Some(labels::REVISE) => {
                    if let PhaseKind::Generate(artifact) = def.kind {
                        let patch = revision::prepare(session, artifact);
                        pipeline.registry.apply_patch(&mut session.fields, &patch)?;
                    }
                }
                Some(labels::ESCALATE) => escalated = true,
                _ => {}
            }

            if let PhaseKind::Checkpoint(artifact) = def.kind {
                if session.is_approved(artifact) {
                    // Already decided; pass through without re-offering.
                    session.current_phase = def.name.clone();
                    self.persist(session).await?;
                    continue;
                }
                checkpoint::arm(session, &def.name, artifact, escalated)?;
                self.persist(session).await?;
                self.progress.emit(
                    session.id,
                    &def.name,
                    ProgressKind::Progress,
                    json!({"waiting": artifact, "escalated": escalated}),
                );
                info!(
                    session_id = %session.id,
                    phase = %def.name,
                    escalated,
                    "parked at checkpoint"
                );
                return Ok(());
            }

            self.progress
                .emit(session.id, &def.name, ProgressKind::Start, Value::Null);

            match self.runner.run(&def, session, &pipeline.config).await {
                Ok(patch) => {
                    pipeline.registry.apply_patch(&mut session.fields, &patch)?;
                    state::clear_phase_errors(session, &[&def.name]);
                    session.current_phase = def.name.clone();
                    self.persist(session).await?;
                    escalated = false;
                }
                Err(err) => {
                    self.record_failure(pipeline, session, &def.name, err).await?;
                    return Ok(());
                }
            }
        }
    }

    /// Record a phase failure and park the session in the error phase.
    /// Transient-service exhaustion is promoted to terminal here.
    async fn record_failure(
        &self,
        pipeline: &Pipeline,
        session: &mut Session,
        phase: &str,
        err: EngineError,
    ) -> Result<(), EngineError> {
        let record = ErrorRecord {
            phase: phase.to_string(),
            kind: error_kind(&err).to_string(),
            detail: err.to_string(),
            at: Utc::now(),
        };
        error!(
            session_id = %session.id,
            phase,
            kind = %record.kind,
            detail = %record.detail,
            "phase failed terminally"
        );
        self.progress.emit(
            session.id,
            phase,
            ProgressKind::Error,
            json!({"kind": record.kind, "detail": record.detail}),
        );

        let patch = state::error_record_patch(&record);
        pipeline.registry.apply_patch(&mut session.fields, &patch)?;
        session.status = SessionStatus::Error;
        session.current_phase = phases::ERROR.to_string();
        self.persist(session).await?;
        self.release(session.id);
        Ok(())
    }

    // -----------------------------------------------------------------------
    // Internals
    // -----------------------------------------------------------------------

    fn pipeline(&self, theme: &str) -> Result<Arc<Pipeline>, EngineError> {
        self.pipelines
            .get(theme)
            .cloned()
            .ok_or_else(|| EngineError::UnknownTheme(theme.to_string()))
    }

    fn lane(&self, id: Uuid) -> Arc<Mutex<()>> {
        self.lanes.entry(id).or_default().clone()
    }

    fn token(&self, id: Uuid) -> CancellationToken {
        self.cancellations
            .entry(id)
            .or_insert_with(CancellationToken::new)
            .clone()
    }

    /// Drop per-session bookkeeping once the session is terminal. The
    /// lane entry is only removed when no other caller is waiting on it;
    /// everything re-creates on demand if the session is revived.
    fn release(&self, id: Uuid) {
        self.lanes
            .remove_if(&id, |_, lane| Arc::strong_count(lane) <= 2);
        self.cancellations.remove(&id);
        self.progress.forget(id);
    }

    async fn load(&self, id: Uuid) -> Result<Session, EngineError> {
        self.repo
            .get(id)
            .await?
            .ok_or(EngineError::SessionNotFound(id))
    }

    async fn persist(&self, session: &mut Session) -> Result<(), EngineError> {
        session.updated_at = Utc::now();
        self.repo.save(session).await?;
        Ok(())
    }
}

fn error_kind(err: &EngineError) -> &'static str {
    match err {
        EngineError::InputValidation(_) => "input_validation",
        EngineError::SchemaValidation { .. } => "schema_validation",
        EngineError::TransientService { .. } => "transient_service",
        EngineError::NotAtCheckpoint => "not_at_checkpoint",
        EngineError::SessionNotFound(_) => "session_not_found",
        EngineError::UnknownRollbackTarget(_) => "unknown_rollback_target",
        EngineError::UnknownTheme(_) => "unknown_theme",
        EngineError::Terminal(_) => "terminal",
        EngineError::Repository(_) => "repository",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::phase::{GenerationRequest, GenerationResponse};
    use draftflow_types::error::{GeneratorError, RepositoryError};
    use draftflow_types::session::{Artifact, Evaluation};
    use std::sync::Mutex as StdMutex;

    #[derive(Default)]
    struct StubRepo {
        sessions: StdMutex<HashMap<Uuid, Session>>,
    }

    impl SessionRepository for StubRepo {
        async fn create(&self, session: &Session) -> Result<(), RepositoryError> {
            self.sessions
                .lock()
                .unwrap()
                .insert(session.id, session.clone());
            Ok(())
        }

        async fn save(&self, session: &Session) -> Result<(), RepositoryError> {
            self.sessions
                .lock()
                .unwrap()
                .insert(session.id, session.clone());
            Ok(())
        }

        async fn get(&self, id: Uuid) -> Result<Option<Session>, RepositoryError> {
            Ok(self.sessions.lock().unwrap().get(&id).cloned())
        }

        async fn list(&self) -> Result<Vec<SessionListing>, RepositoryError> {
            Ok(Vec::new())
        }

        async fn list_processing(&self) -> Result<Vec<Uuid>, RepositoryError> {
            Ok(Vec::new())
        }
    }

    struct StubGenerator;

    impl ContentGenerator for StubGenerator {
        async fn generate(
            &self,
            request: GenerationRequest,
        ) -> Result<GenerationResponse, GeneratorError> {
            let content = match request.artifact {
                Artifact::Outline => json!({"sections": ["hook"]}),
                Artifact::Article => json!({"body": "draft"}),
            };
            Ok(GenerationResponse { content })
        }
    }

    struct StubEvaluator;

    impl ArtifactEvaluator for StubEvaluator {
        async fn evaluate(
            &self,
            _artifact: Artifact,
            _value: &Value,
            _config: &ThemeConfig,
        ) -> Result<Evaluation, GeneratorError> {
            Ok(Evaluation {
                score: 0.95,
                issues: Vec::new(),
            })
        }
    }

    #[tokio::test]
    async fn terminal_sessions_release_their_bookkeeping() {
        let engine = WorkflowEngine::new(
            Arc::new(StubRepo::default()),
            Arc::new(StubGenerator),
            Arc::new(StubEvaluator),
            vec![ThemeConfig::named("editorial")],
        )
        .unwrap();

        let status = engine
            .start(StartRequest {
                theme: "editorial".to_string(),
                brief: "cover the launch".to_string(),
                source_notes: None,
                style_guide: None,
            })
            .await
            .unwrap();
        let id = status.session_id;
        // Parked at the outline checkpoint: still tracked.
        assert!(engine.lanes.contains_key(&id));
        assert!(engine.cancellations.contains_key(&id));

        engine.cancel(id).await.unwrap();
        assert!(!engine.lanes.contains_key(&id));
        assert!(!engine.cancellations.contains_key(&id));
    }

    #[test]
    fn error_kinds_are_stable() {
        assert_eq!(
            error_kind(&EngineError::TransientService {
                phase: "generate_outline".to_string(),
                detail: "timeout".to_string()
            }),
            "transient_service"
        );
        assert_eq!(error_kind(&EngineError::NotAtCheckpoint), "not_at_checkpoint");
    }
}
