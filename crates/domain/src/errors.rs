//! Domain error kinds with HTTP status code mappings.
//!
//! The closed set of named failure kinds mirrors spec.md §7. The two
//! "recovered locally" kinds (`degraded-scoring`, `uncalibrated`) are not
//! represented here — they never propagate past the orchestrator and are
//! instead carried as `Warning`s on a successfully returned `ScoreResult`.

use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde::Serialize;

/// API error response format.
#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub error: String,
    pub kind: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<Vec<String>>,
}

#[derive(Debug, thiserror::Error)]
pub enum DomainError {
    /// Block count out of range, or response indices out of range/equal.
    #[error("Invalid parameter: {0}")]
    InvalidParameter(String),

    /// Multiple field-level validation errors.
    #[error("Validation failed")]
    ValidationErrors(Vec<String>),

    /// Session or result not present.
    #[error("Not found: {0}")]
    NotFound(String),

    /// Session past `expires_at`.
    #[error("Session expired")]
    Expired,

    /// Second submission for a completed session.
    #[error("Session already completed")]
    AlreadyCompleted,

    /// Not enough responses to score.
    #[error("Insufficient response coverage: {0}")]
    InsufficientCoverage(String),

    /// Statement pool too small for the requested block_count.
    #[error("Statement pool insufficient: {0}")]
    PoolInsufficient(String),

    /// Designer cannot meet the social-desirability constraint.
    #[error("Block design constraint unsatisfiable: {0}")]
    ConstraintUnsatisfiable(String),

    /// Calibration bundle or statement pool failed to load or parse.
    #[error("Configuration error: {0}")]
    Configuration(String),

    /// Session-store infrastructure failure (connection, query, migration).
    #[error("Storage error: {0}")]
    Storage(String),

    /// Catch-all for unexpected failures at the boundary.
    #[error("Internal error")]
    Internal(#[from] anyhow::Error),
}

impl DomainError {
    pub fn status_code(&self) -> StatusCode {
        match self {
            DomainError::InvalidParameter(_) | DomainError::ValidationErrors(_) => {
                StatusCode::BAD_REQUEST
            }
            DomainError::NotFound(_) => StatusCode::NOT_FOUND,
            DomainError::Expired => StatusCode::GONE,
            DomainError::AlreadyCompleted => StatusCode::CONFLICT,
            DomainError::InsufficientCoverage(_) => StatusCode::UNPROCESSABLE_ENTITY,
            DomainError::PoolInsufficient(_)
            | DomainError::ConstraintUnsatisfiable(_)
            | DomainError::Configuration(_)
            | DomainError::Storage(_)
            | DomainError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// The stable kind identifier from spec.md §7, used in API responses
    /// and logs so failures are programmatically distinguishable.
    pub fn kind(&self) -> &'static str {
        match self {
            DomainError::InvalidParameter(_) | DomainError::ValidationErrors(_) => {
                "invalid-parameter"
            }
            DomainError::NotFound(_) => "not-found",
            DomainError::Expired => "expired",
            DomainError::AlreadyCompleted => "already-completed",
            DomainError::InsufficientCoverage(_) => "insufficient-coverage",
            DomainError::PoolInsufficient(_) => "pool-insufficient",
            DomainError::ConstraintUnsatisfiable(_) => "constraint-unsatisfiable",
            DomainError::Configuration(_) => "configuration-error",
            DomainError::Storage(_) => "storage-error",
            DomainError::Internal(_) => "internal-error",
        }
    }

    pub fn from_validation_errors(errors: validator::ValidationErrors) -> Self {
        let messages: Vec<String> = errors
            .field_errors()
            .iter()
            .flat_map(|(field, errors)| {
                errors.iter().map(move |error| {
                    format!(
                        "{}: {}",
                        field,
                        error
                            .message
                            .as_ref()
                            .unwrap_or(&std::borrow::Cow::Borrowed("validation failed"))
                    )
                })
            })
            .collect();

        if messages.is_empty() {
            DomainError::InvalidParameter("invalid input".to_string())
        } else {
            DomainError::ValidationErrors(messages)
        }
    }
}

impl IntoResponse for DomainError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        let kind = self.kind();

        if status == StatusCode::INTERNAL_SERVER_ERROR {
            tracing::error!(kind, "internal error: {}", self);
        }

        let body = match &self {
            DomainError::ValidationErrors(details) => ErrorResponse {
                error: "validation failed".to_string(),
                kind,
                details: Some(details.clone()),
            },
            _ => ErrorResponse {
                error: self.to_string(),
                kind,
                details: None,
            },
        };

        (status, Json(body)).into_response()
    }
}
