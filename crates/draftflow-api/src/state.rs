//! Application state wiring the engine to its infrastructure.
//!
//! The engine is generic over repository/generator/evaluator traits;
//! `AppState` pins those to the concrete infra implementations used by
//! both the CLI and the REST API.

use std::path::PathBuf;
use std::sync::Arc;

use secrecy::SecretString;

use draftflow_core::engine::WorkflowEngine;
use draftflow_infra::config::{load_themes, resolve_data_dir};
use draftflow_infra::generator::{HttpEvaluator, HttpGenerator};
use draftflow_infra::sqlite::pool::DatabasePool;
use draftflow_infra::sqlite::session::SqliteSessionRepository;

/// Engine generics pinned to the infra implementations.
pub type ConcreteEngine = WorkflowEngine<SqliteSessionRepository, HttpGenerator, HttpEvaluator>;

const DEFAULT_LLM_BASE_URL: &str = "https://api.openai.com/v1";

/// Shared application state for CLI commands and REST handlers.
#[derive(Clone)]
pub struct AppState {
    pub engine: Arc<ConcreteEngine>,
    pub data_dir: PathBuf,
    pub db_pool: DatabasePool,
}

impl AppState {
    /// Connect the database, load themes, and wire the engine.
    pub async fn init() -> anyhow::Result<Self> {
        let data_dir = resolve_data_dir();
        tokio::fs::create_dir_all(&data_dir).await?;

        let db_url = format!(
            "sqlite://{}?mode=rwc",
            data_dir.join("draftflow.db").display()
        );
        let db_pool = DatabasePool::new(&db_url).await?;
        let repo = SqliteSessionRepository::new(db_pool.clone());

        let base_url = std::env::var("DRAFTFLOW_LLM_BASE_URL")
            .unwrap_or_else(|_| DEFAULT_LLM_BASE_URL.to_string());
        let api_key = SecretString::from(
            std::env::var("DRAFTFLOW_API_KEY").unwrap_or_default(),
        );
        let generator = HttpGenerator::new(base_url, api_key);
        let evaluator = HttpEvaluator::new(generator.clone());

        let themes = load_themes(&data_dir)?;
        let engine = WorkflowEngine::new(
            Arc::new(repo),
            Arc::new(generator),
            Arc::new(evaluator),
            themes,
        )?;

        Ok(Self {
            engine: Arc::new(engine),
            data_dir,
            db_pool,
        })
    }
}
