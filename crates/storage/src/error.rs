//! Storage errors: the same connection/migration/query split as any other
//! sqlx-backed repository, SQLite-backed here.

use quartet_domain::DomainError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum StorageError {
    #[error("Database connection error: {0}")]
    Connection(#[source] sqlx::Error),

    #[error("Migration error: {0}")]
    Migration(#[source] sqlx::migrate::MigrateError),

    #[error("Query error: {0}")]
    Query(#[source] sqlx::Error),

    #[error("Session {0} not found")]
    SessionNotFound(uuid::Uuid),

    #[error("Stored row failed to decode: {0}")]
    Decode(String),
}

impl From<StorageError> for DomainError {
    fn from(err: StorageError) -> Self {
        match err {
            StorageError::SessionNotFound(id) => DomainError::NotFound(format!("session {id}")),
            other => DomainError::Storage(other.to_string()),
        }
    }
}
