//! SQLite session repository.
//!
//! Implements `SessionRepository` from `draftflow-core` using sqlx with
//! split read/write pools. The session record is stored as one JSON blob
//! and rewritten whole at every phase boundary; scalar columns are kept
//! in sync for listings and the recovery sweep.

use chrono::{DateTime, Utc};
use sqlx::Row;
use uuid::Uuid;

use draftflow_core::repository::SessionRepository;
use draftflow_types::error::RepositoryError;
use draftflow_types::session::{Session, SessionListing, SessionStatus};

use super::pool::DatabasePool;

pub struct SqliteSessionRepository {
    pool: DatabasePool,
}

impl SqliteSessionRepository {
    pub fn new(pool: DatabasePool) -> Self {
        Self { pool }
    }

    async fn upsert(&self, session: &Session) -> Result<(), RepositoryError> {
        let record = serde_json::to_string(session)
            .map_err(|e| RepositoryError::Query(format!("serialize session: {e}")))?;
        let status = status_str(session.status);

        sqlx::query(
            r#"INSERT INTO sessions (id, theme, status, current_phase, record, created_at, updated_at)
               VALUES (?, ?, ?, ?, ?, ?, ?)
               ON CONFLICT(id) DO UPDATE SET
                 status = excluded.status,
                 current_phase = excluded.current_phase,
                 record = excluded.record,
                 updated_at = excluded.updated_at"#,
        )
        .bind(session.id.to_string())
        .bind(&session.theme)
        .bind(status)
        .bind(&session.current_phase)
        .bind(&record)
        .bind(format_datetime(&session.created_at))
        .bind(format_datetime(&session.updated_at))
        .execute(&self.pool.writer)
        .await
        .map_err(|e| RepositoryError::Query(e.to_string()))?;

        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Internal row types
// ---------------------------------------------------------------------------

struct SessionRow {
    record: String,
}

impl SessionRow {
    fn from_row(row: &sqlx::sqlite::SqliteRow) -> Result<Self, sqlx::Error> {
        Ok(Self {
            record: row.try_get("record")?,
        })
    }

    fn into_session(self) -> Result<Session, RepositoryError> {
        serde_json::from_str(&self.record)
            .map_err(|e| RepositoryError::Query(format!("invalid session JSON: {e}")))
    }
}

struct ListingRow {
    id: String,
    theme: String,
    status: String,
    current_phase: String,
    updated_at: String,
}

impl ListingRow {
    fn from_row(row: &sqlx::sqlite::SqliteRow) -> Result<Self, sqlx::Error> {
        Ok(Self {
            id: row.try_get("id")?,
            theme: row.try_get("theme")?,
            status: row.try_get("status")?,
            current_phase: row.try_get("current_phase")?,
            updated_at: row.try_get("updated_at")?,
        })
    }

    fn into_listing(self) -> Result<SessionListing, RepositoryError> {
        Ok(SessionListing {
            id: parse_uuid(&self.id)?,
            theme: self.theme,
            status: parse_status(&self.status)?,
            current_phase: self.current_phase,
            updated_at: parse_datetime(&self.updated_at)?,
        })
    }
}

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

fn parse_uuid(s: &str) -> Result<Uuid, RepositoryError> {
    s.parse::<Uuid>()
        .map_err(|e| RepositoryError::Query(format!("invalid UUID: {e}")))
}

fn parse_datetime(s: &str) -> Result<DateTime<Utc>, RepositoryError> {
    DateTime::parse_from_rfc3339(s)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| RepositoryError::Query(format!("invalid datetime: {e}")))
}

fn format_datetime(dt: &DateTime<Utc>) -> String {
    dt.to_rfc3339()
}

fn status_str(status: SessionStatus) -> &'static str {
    match status {
        SessionStatus::Processing => "processing",
        SessionStatus::Waiting => "waiting",
        SessionStatus::Complete => "complete",
        SessionStatus::Error => "error",
        SessionStatus::Cancelled => "cancelled",
    }
}

fn parse_status(s: &str) -> Result<SessionStatus, RepositoryError> {
    serde_json::from_value(serde_json::Value::String(s.to_string()))
        .map_err(|_| RepositoryError::Query(format!("invalid session status: {s}")))
}

// ---------------------------------------------------------------------------
// SessionRepository impl
// ---------------------------------------------------------------------------

impl SessionRepository for SqliteSessionRepository {
    async fn create(&self, session: &Session) -> Result<(), RepositoryError> {
        self.upsert(session).await
    }

    async fn save(&self, session: &Session) -> Result<(), RepositoryError> {
        self.upsert(session).await
    }

    async fn get(&self, id: Uuid) -> Result<Option<Session>, RepositoryError> {
        let row = sqlx::query("SELECT record FROM sessions WHERE id = ?")
            .bind(id.to_string())
            .fetch_optional(&self.pool.reader)
            .await
            .map_err(|e| RepositoryError::Query(e.to_string()))?;

        match row {
            Some(row) => {
                let r = SessionRow::from_row(&row)
                    .map_err(|e| RepositoryError::Query(e.to_string()))?;
                Ok(Some(r.into_session()?))
            }
            None => Ok(None),
        }
    }

    async fn list(&self) -> Result<Vec<SessionListing>, RepositoryError> {
        let rows = sqlx::query(
            "SELECT id, theme, status, current_phase, updated_at FROM sessions ORDER BY updated_at DESC",
        )
        .fetch_all(&self.pool.reader)
        .await
        .map_err(|e| RepositoryError::Query(e.to_string()))?;

        rows.iter()
            .map(|row| {
                ListingRow::from_row(row)
                    .map_err(|e| RepositoryError::Query(e.to_string()))?
                    .into_listing()
            })
            .collect()
    }

    async fn list_processing(&self) -> Result<Vec<Uuid>, RepositoryError> {
        let rows = sqlx::query("SELECT id FROM sessions WHERE status = 'processing'")
            .fetch_all(&self.pool.reader)
            .await
            .map_err(|e| RepositoryError::Query(e.to_string()))?;

        rows.iter()
            .map(|row| {
                let id: String = row
                    .try_get("id")
                    .map_err(|e| RepositoryError::Query(e.to_string()))?;
                parse_uuid(&id)
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::collections::HashMap;

    async fn repo() -> (SqliteSessionRepository, tempfile::TempDir) {
        let dir = tempfile::tempdir().unwrap();
        let url = format!("sqlite://{}?mode=rwc", dir.path().join("t.db").display());
        let pool = DatabasePool::new(&url).await.unwrap();
        (SqliteSessionRepository::new(pool), dir)
    }

    fn sample() -> Session {
        Session {
            id: Uuid::now_v7(),
            theme: "editorial".to_string(),
            status: SessionStatus::Processing,
            current_phase: "generate_outline".to_string(),
            fields: HashMap::from([
                ("brief".to_string(), json!("cover the launch")),
                ("outline".to_string(), json!({"sections": ["hook"]})),
            ]),
            pending_checkpoint: None,
            created_at: Utc::now(),
            updated_at: Utc::now(),
        }
    }

    #[tokio::test]
    async fn roundtrip_whole_record() {
        let (repo, _dir) = repo().await;
        let session = sample();
        repo.create(&session).await.unwrap();

        let loaded = repo.get(session.id).await.unwrap().unwrap();
        assert_eq!(loaded.id, session.id);
        assert_eq!(loaded.fields["outline"], json!({"sections": ["hook"]}));
        assert_eq!(loaded.status, SessionStatus::Processing);
    }

    #[tokio::test]
    async fn save_overwrites_and_listing_tracks_columns() {
        let (repo, _dir) = repo().await;
        let mut session = sample();
        repo.create(&session).await.unwrap();

        session.status = SessionStatus::Waiting;
        session.current_phase = "checkpoint_outline".to_string();
        session.updated_at = Utc::now();
        repo.save(&session).await.unwrap();

        let listings = repo.list().await.unwrap();
        assert_eq!(listings.len(), 1);
        assert_eq!(listings[0].status, SessionStatus::Waiting);
        assert_eq!(listings[0].current_phase, "checkpoint_outline");
    }

    #[tokio::test]
    async fn processing_sweep_finds_only_processing() {
        let (repo, _dir) = repo().await;
        let stuck = sample();
        repo.create(&stuck).await.unwrap();

        let mut done = sample();
        done.status = SessionStatus::Complete;
        repo.create(&done).await.unwrap();

        let ids = repo.list_processing().await.unwrap();
        assert_eq!(ids, vec![stuck.id]);
    }

    #[tokio::test]
    async fn missing_session_is_none() {
        let (repo, _dir) = repo().await;
        assert!(repo.get(Uuid::now_v7()).await.unwrap().is_none());
    }
}
