//! Session persistence boundary.

use uuid::Uuid;

use draftflow_types::error::RepositoryError;
use draftflow_types::session::{Session, SessionListing};

/// Durable session store.
///
/// Implementations persist the whole record in a single write so a phase
/// boundary is either fully visible after a crash or not at all.
pub trait SessionRepository: Send + Sync {
    fn create(
        &self,
        session: &Session,
    ) -> impl Future<Output = Result<(), RepositoryError>> + Send;

    /// Whole-record upsert at a phase boundary. Atomic per session.
    fn save(
        &self,
        session: &Session,
    ) -> impl Future<Output = Result<(), RepositoryError>> + Send;

    fn get(
        &self,
        id: Uuid,
    ) -> impl Future<Output = Result<Option<Session>, RepositoryError>> + Send;

    fn list(
        &self,
    ) -> impl Future<Output = Result<Vec<SessionListing>, RepositoryError>> + Send;

    /// Sessions left in `processing` by a crashed process, for the
    /// startup recovery sweep.
    fn list_processing(
        &self,
    ) -> impl Future<Output = Result<Vec<Uuid>, RepositoryError>> + Send;
}
