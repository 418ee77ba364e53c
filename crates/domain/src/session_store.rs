//! Persistence seam for `Session` (spec.md §4.3). Concrete storage lives in
//! the sibling `quartet-storage` crate; the domain crate only depends on
//! this trait, so it never needs to know SQLite exists.

use crate::{BlockResponse, DomainError, ScoreResult, Session};
use async_trait::async_trait;
use uuid::Uuid;

#[async_trait]
pub trait SessionStore: Send + Sync {
    /// Persist a freshly generated session with its block list.
    async fn create_session(&self, session: &Session) -> Result<(), DomainError>;

    /// Fetch a session by id, or `None` if it does not exist.
    async fn get_session(&self, session_id: Uuid) -> Result<Option<Session>, DomainError>;

    /// Append the respondent's answers and mark the session in-progress.
    async fn append_responses(
        &self,
        session_id: Uuid,
        responses: &[BlockResponse],
    ) -> Result<(), DomainError>;

    /// Attach the computed result and mark the session completed. Must be
    /// idempotent-safe at the orchestrator level: the store itself simply
    /// performs the write inside one transaction.
    async fn complete_session(
        &self,
        session_id: Uuid,
        result: &ScoreResult,
    ) -> Result<(), DomainError>;
}
