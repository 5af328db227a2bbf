//! In-memory session repository for tests and ephemeral runs.

use dashmap::DashMap;
use uuid::Uuid;

use draftflow_core::repository::SessionRepository;
use draftflow_types::error::RepositoryError;
use draftflow_types::session::{Session, SessionListing, SessionStatus};

#[derive(Default)]
pub struct InMemorySessionRepository {
    sessions: DashMap<Uuid, Session>,
}

impl InMemorySessionRepository {
    pub fn new() -> Self {
        Self::default()
    }
}

impl SessionRepository for InMemorySessionRepository {
    async fn create(&self, session: &Session) -> Result<(), RepositoryError> {
        self.sessions.insert(session.id, session.clone());
        Ok(())
    }

    async fn save(&self, session: &Session) -> Result<(), RepositoryError> {
        self.sessions.insert(session.id, session.clone());
        Ok(())
    }

    async fn get(&self, id: Uuid) -> Result<Option<Session>, RepositoryError> {
        Ok(self.sessions.get(&id).map(|s| s.clone()))
    }

    async fn list(&self) -> Result<Vec<SessionListing>, RepositoryError> {
        let mut listings: Vec<SessionListing> = self
            .sessions
            .iter()
            .map(|entry| SessionListing {
                id: entry.id,
                theme: entry.theme.clone(),
                status: entry.status,
                current_phase: entry.current_phase.clone(),
                updated_at: entry.updated_at,
            })
            .collect();
        listings.sort_by(|a, b| b.updated_at.cmp(&a.updated_at));
        Ok(listings)
    }

    async fn list_processing(&self) -> Result<Vec<Uuid>, RepositoryError> {
        Ok(self
            .sessions
            .iter()
            .filter(|entry| entry.status == SessionStatus::Processing)
            .map(|entry| entry.id)
            .collect())
    }
}
