//! Storage layer for the Quartet scoring engine: an embedded SQLite-backed
//! implementation of `quartet_domain::SessionStore` (spec.md §4.3).

use sqlx::SqlitePool;
use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePoolOptions};
use std::str::FromStr;

pub mod error;
pub mod sqlite_session_store;

pub use error::StorageError;
pub use sqlite_session_store::SqliteSessionStore;

/// Create a SQLite connection pool, creating the database file if absent.
/// WAL journal mode lets readers (e.g. `get_result` polling) proceed
/// concurrently with the writer completing a session.
pub async fn create_pool(database_path: &str) -> Result<SqlitePool, StorageError> {
    let options = SqliteConnectOptions::from_str(database_path)
        .map_err(StorageError::Connection)?
        .create_if_missing(true)
        .journal_mode(SqliteJournalMode::Wal);

    SqlitePoolOptions::new()
        .max_connections(10)
        .connect_with(options)
        .await
        .map_err(StorageError::Connection)
}

/// Run database migrations.
pub async fn run_migrations(pool: &SqlitePool) -> Result<(), StorageError> {
    sqlx::migrate!("./migrations")
        .run(pool)
        .await
        .map_err(StorageError::Migration)
}

/// Check database connectivity.
pub async fn check_connection(pool: &SqlitePool) -> Result<(), StorageError> {
    sqlx::query("SELECT 1")
        .execute(pool)
        .await
        .map_err(StorageError::Query)?;
    Ok(())
}
