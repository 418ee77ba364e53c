//! SQLite-backed `SessionStore`: a thin struct wrapping a pool, one query
//! per method, `?`-bound parameters, `StorageError::Query` on failure.

use crate::StorageError;
use chrono::{DateTime, Utc};
use quartet_domain::{
    BlockResponse, DomainError, QuartetBlock, ScoreResult, Session, SessionStatus, SessionStore,
};
use sqlx::{Row, SqlitePool};
use uuid::Uuid;

#[derive(Clone)]
pub struct SqliteSessionStore {
    pool: SqlitePool,
}

impl SqliteSessionStore {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    fn status_to_str(status: SessionStatus) -> &'static str {
        match status {
            SessionStatus::Pending => "pending",
            SessionStatus::InProgress => "in_progress",
            SessionStatus::Completed => "completed",
            SessionStatus::Expired => "expired",
        }
    }

    fn status_from_str(raw: &str) -> Result<SessionStatus, StorageError> {
        match raw {
            "pending" => Ok(SessionStatus::Pending),
            "in_progress" => Ok(SessionStatus::InProgress),
            "completed" => Ok(SessionStatus::Completed),
            "expired" => Ok(SessionStatus::Expired),
            other => Err(StorageError::Decode(format!("unknown session status '{other}'"))),
        }
    }

    fn row_to_session(row: &sqlx::sqlite::SqliteRow) -> Result<Session, StorageError> {
        let session_id: String = row.try_get("session_id").map_err(StorageError::Query)?;
        let created_at: String = row.try_get("created_at").map_err(StorageError::Query)?;
        let expires_at: String = row.try_get("expires_at").map_err(StorageError::Query)?;
        let status: String = row.try_get("status").map_err(StorageError::Query)?;
        let blocks_json: String = row.try_get("blocks_json").map_err(StorageError::Query)?;
        let responses_json: String = row.try_get("responses_json").map_err(StorageError::Query)?;
        let score_result_json: Option<String> =
            row.try_get("score_result_json").map_err(StorageError::Query)?;

        let blocks: Vec<QuartetBlock> = serde_json::from_str(&blocks_json)
            .map_err(|e| StorageError::Decode(format!("blocks_json: {e}")))?;
        let responses: Vec<BlockResponse> = serde_json::from_str(&responses_json)
            .map_err(|e| StorageError::Decode(format!("responses_json: {e}")))?;
        let score_result: Option<ScoreResult> = score_result_json
            .map(|raw| serde_json::from_str(&raw))
            .transpose()
            .map_err(|e| StorageError::Decode(format!("score_result_json: {e}")))?;

        Ok(Session {
            session_id: Uuid::parse_str(&session_id)
                .map_err(|e| StorageError::Decode(format!("session_id: {e}")))?,
            created_at: created_at
                .parse::<DateTime<Utc>>()
                .map_err(|e| StorageError::Decode(format!("created_at: {e}")))?,
            status: Self::status_from_str(&status)?,
            blocks,
            responses,
            score_result,
            expires_at: expires_at
                .parse::<DateTime<Utc>>()
                .map_err(|e| StorageError::Decode(format!("expires_at: {e}")))?,
        })
    }
}

#[async_trait::async_trait]
impl SessionStore for SqliteSessionStore {
    async fn create_session(&self, session: &Session) -> Result<(), DomainError> {
        let blocks_json = serde_json::to_string(&session.blocks)
            .map_err(|e| DomainError::Internal(e.into()))?;

        sqlx::query(
            r#"
            INSERT INTO sessions (session_id, created_at, expires_at, status, blocks_json, responses_json, score_result_json)
            VALUES (?1, ?2, ?3, ?4, ?5, '[]', NULL)
            "#,
        )
        .bind(session.session_id.to_string())
        .bind(session.created_at.to_rfc3339())
        .bind(session.expires_at.to_rfc3339())
        .bind(Self::status_to_str(session.status))
        .bind(blocks_json)
        .execute(&self.pool)
        .await
        .map_err(StorageError::Query)?;

        Ok(())
    }

    async fn get_session(&self, session_id: Uuid) -> Result<Option<Session>, DomainError> {
        let row = sqlx::query("SELECT * FROM sessions WHERE session_id = ?1")
            .bind(session_id.to_string())
            .fetch_optional(&self.pool)
            .await
            .map_err(StorageError::Query)?;

        match row {
            Some(row) => Ok(Some(Self::row_to_session(&row)?)),
            None => Ok(None),
        }
    }

    async fn append_responses(
        &self,
        session_id: Uuid,
        responses: &[BlockResponse],
    ) -> Result<(), DomainError> {
        let responses_json =
            serde_json::to_string(responses).map_err(|e| DomainError::Internal(e.into()))?;

        let result = sqlx::query(
            r#"
            UPDATE sessions
            SET responses_json = ?1, status = 'in_progress'
            WHERE session_id = ?2 AND status != 'completed'
            "#,
        )
        .bind(responses_json)
        .bind(session_id.to_string())
        .execute(&self.pool)
        .await
        .map_err(StorageError::Query)?;

        if result.rows_affected() == 0 {
            return self.resolve_zero_rows_error(session_id).await;
        }
        Ok(())
    }

    async fn complete_session(
        &self,
        session_id: Uuid,
        result: &ScoreResult,
    ) -> Result<(), DomainError> {
        let score_result_json =
            serde_json::to_string(result).map_err(|e| DomainError::Internal(e.into()))?;

        let query_result = sqlx::query(
            r#"
            UPDATE sessions
            SET score_result_json = ?1, status = 'completed'
            WHERE session_id = ?2 AND status != 'completed'
            "#,
        )
        .bind(score_result_json)
        .bind(session_id.to_string())
        .execute(&self.pool)
        .await
        .map_err(StorageError::Query)?;

        if query_result.rows_affected() == 0 {
            return self.resolve_zero_rows_error(session_id).await;
        }
        Ok(())
    }
}

impl SqliteSessionStore {
    /// A status-guarded UPDATE affecting zero rows means either the session
    /// doesn't exist, or it exists but is already completed (spec.md §5: a
    /// racing second write must surface `already-completed`, not silently
    /// overwrite the stored result).
    async fn resolve_zero_rows_error(&self, session_id: Uuid) -> Result<(), DomainError> {
        let row = sqlx::query("SELECT status FROM sessions WHERE session_id = ?1")
            .bind(session_id.to_string())
            .fetch_optional(&self.pool)
            .await
            .map_err(StorageError::Query)?;

        match row {
            Some(row) => {
                let status: String = row.try_get("status").map_err(StorageError::Query)?;
                if status == "completed" {
                    Err(DomainError::AlreadyCompleted)
                } else {
                    Err(StorageError::Decode(format!(
                        "session {session_id} update affected no rows despite status '{status}'"
                    ))
                    .into())
                }
            }
            None => Err(StorageError::SessionNotFound(session_id).into()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    async fn test_store() -> SqliteSessionStore {
        let pool = crate::create_pool("sqlite::memory:").await.unwrap();
        crate::run_migrations(&pool).await.unwrap();
        SqliteSessionStore::new(pool)
    }

    fn sample_session() -> Session {
        let now = Utc::now();
        Session {
            session_id: Uuid::new_v4(),
            created_at: now,
            status: SessionStatus::Pending,
            blocks: vec![QuartetBlock {
                block_id: "blk-001".to_string(),
                statement_ids: [
                    "t1-000".to_string(),
                    "t2-000".to_string(),
                    "t3-000".to_string(),
                    "t4-000".to_string(),
                ],
            }],
            responses: Vec::new(),
            score_result: None,
            expires_at: now + Duration::seconds(7200),
        }
    }

    #[tokio::test]
    async fn round_trips_a_session() {
        let store = test_store().await;
        let session = sample_session();
        store.create_session(&session).await.unwrap();

        let fetched = store.get_session(session.session_id).await.unwrap().unwrap();
        assert_eq!(fetched.session_id, session.session_id);
        assert_eq!(fetched.blocks.len(), 1);
    }

    #[tokio::test]
    async fn append_responses_then_complete_updates_status() {
        let store = test_store().await;
        let session = sample_session();
        store.create_session(&session).await.unwrap();

        let responses = vec![BlockResponse {
            block_index: 1,
            most_like_index: 0,
            least_like_index: 1,
            response_time_ms: Some(3000),
        }];
        store
            .append_responses(session.session_id, &responses)
            .await
            .unwrap();
        let in_progress = store.get_session(session.session_id).await.unwrap().unwrap();
        assert_eq!(in_progress.status, SessionStatus::InProgress);

        let result = ScoreResult {
            dimension_scores: Default::default(),
            domain_scores: Default::default(),
            tiers: Default::default(),
            archetype: quartet_domain::Archetype {
                id: "balanced-generalist".to_string(),
                label: "Balanced Generalist".to_string(),
                rule_id: "balanced".to_string(),
            },
            confidence: 1.0,
            algorithm_version: "4.0.0-alpha".to_string(),
            calibration_version: "uncalibrated".to_string(),
            computed_at: Utc::now(),
            warnings: Vec::new(),
        };
        store.complete_session(session.session_id, &result).await.unwrap();

        let completed = store.get_session(session.session_id).await.unwrap().unwrap();
        assert_eq!(completed.status, SessionStatus::Completed);
        assert!(completed.score_result.is_some());
    }

    #[tokio::test]
    async fn appending_to_an_unknown_session_is_an_error() {
        let store = test_store().await;
        let result = store.append_responses(Uuid::new_v4(), &[]).await;
        assert!(result.is_err());
    }

    fn sample_result() -> ScoreResult {
        ScoreResult {
            dimension_scores: Default::default(),
            domain_scores: Default::default(),
            tiers: Default::default(),
            archetype: quartet_domain::Archetype {
                id: "balanced-generalist".to_string(),
                label: "Balanced Generalist".to_string(),
                rule_id: "balanced".to_string(),
            },
            confidence: 1.0,
            algorithm_version: "4.0.0-alpha".to_string(),
            calibration_version: "uncalibrated".to_string(),
            computed_at: Utc::now(),
            warnings: Vec::new(),
        }
    }

    #[tokio::test]
    async fn completing_an_already_completed_session_is_rejected() {
        let store = test_store().await;
        let session = sample_session();
        store.create_session(&session).await.unwrap();
        store.complete_session(session.session_id, &sample_result()).await.unwrap();

        let second = store.complete_session(session.session_id, &sample_result()).await;
        assert!(matches!(second, Err(DomainError::AlreadyCompleted)));
    }

    #[tokio::test]
    async fn appending_responses_to_a_completed_session_is_rejected() {
        let store = test_store().await;
        let session = sample_session();
        store.create_session(&session).await.unwrap();
        store.complete_session(session.session_id, &sample_result()).await.unwrap();

        let result = store
            .append_responses(session.session_id, &[BlockResponse {
                block_index: 1,
                most_like_index: 0,
                least_like_index: 1,
                response_time_ms: Some(3000),
            }])
            .await;
        assert!(matches!(result, Err(DomainError::AlreadyCompleted)));
    }
}
