//! Session lifecycle handlers: generate blocks, submit responses, fetch
//! the computed result (spec.md §6).

use std::sync::Arc;

use axum::extract::{Path, State};
use axum::Json;
use chrono::{DateTime, Utc};
use quartet_domain::{BlockResponse, DomainError, HydratedBlock, ScoreResult};
use serde::{Deserialize, Serialize};
use uuid::Uuid;
use validator::Validate;

use crate::AppState;

const INSTRUCTIONS: &str =
    "For each block of four statements, choose the one that is MOST like you and the one that is LEAST like you.";

#[derive(Debug, Deserialize, Validate)]
pub struct GenerateBlocksRequest {
    #[validate(range(min = 1, max = 1000))]
    pub block_count: Option<u32>,
    pub seed: Option<u64>,
}

#[derive(Debug, Serialize)]
pub struct GenerateBlocksResponse {
    pub session_id: Uuid,
    pub blocks: Vec<HydratedBlock>,
    pub total_blocks: usize,
    pub instructions: String,
    pub expires_at: DateTime<Utc>,
}

pub async fn generate_blocks(
    State(state): State<Arc<AppState>>,
    Json(req): Json<GenerateBlocksRequest>,
) -> Result<Json<GenerateBlocksResponse>, DomainError> {
    req.validate().map_err(DomainError::from_validation_errors)?;

    let session = state
        .orchestrator
        .generate_blocks(req.block_count, req.seed)
        .await?;

    tracing::info!(
        session_id = %session.session_id,
        block_count = session.blocks.len(),
        "generated session blocks"
    );

    let blocks = state.orchestrator.hydrate_blocks(&session.blocks)?;

    Ok(Json(GenerateBlocksResponse {
        session_id: session.session_id,
        total_blocks: blocks.len(),
        blocks,
        instructions: INSTRUCTIONS.to_string(),
        expires_at: session.expires_at,
    }))
}

#[derive(Debug, Deserialize, Validate)]
pub struct SubmitRequest {
    pub session_id: Uuid,
    #[validate(length(min = 1))]
    pub responses: Vec<BlockResponse>,
}

pub async fn submit(
    State(state): State<Arc<AppState>>,
    Json(req): Json<SubmitRequest>,
) -> Result<Json<ScoreResult>, DomainError> {
    req.validate().map_err(DomainError::from_validation_errors)?;

    let result = state
        .orchestrator
        .submit_responses(req.session_id, req.responses)
        .await?;

    tracing::info!(
        session_id = %req.session_id,
        archetype = %result.archetype.id,
        "session scored"
    );

    Ok(Json(result))
}

pub async fn get_result(
    State(state): State<Arc<AppState>>,
    Path(session_id): Path<Uuid>,
) -> Result<Json<ScoreResult>, DomainError> {
    let result = state.orchestrator.get_result(session_id).await?;
    Ok(Json(result))
}
