//! Ties the block designer, validator, scorer, normative transform, domain
//! aggregator, tier classifier and archetype mapper into the session
//! lifecycle operations the API and CLI surfaces call (spec.md §5).

use crate::{
    ArchetypeMapper, ArchetypeRules, BlockDesigner, BlockResponse, Calibration, Dimension,
    DimensionScore, DomainAggregator, DomainError, HydratedBlock, IrtScorer, NormativeTransformer,
    QuartetBlock, ResponseValidator, ScoreResult, Session, SessionStatus, SessionStore, Statement,
    StatementRepository, TierClassifier, Warning,
};
use chrono::{Duration, Utc};
use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use uuid::Uuid;

/// The tunable knobs the orchestrator needs, assembled by the caller from
/// `AppConfig` so the domain crate stays independent of the config crate.
#[derive(Debug, Clone)]
pub struct OrchestratorConfig {
    pub default_block_count: u32,
    pub min_block_count: u32,
    pub max_block_count: u32,
    pub social_desirability_tolerance: f64,
    pub repair_budget: u32,
    pub min_coverage_per_dimension: u32,
    pub min_response_time_ms: Option<u32>,
    pub max_response_time_ms: Option<u32>,
    pub irt_max_iterations: u32,
    pub irt_tolerance: f64,
    pub session_ttl_seconds: i64,
}

pub struct ScoringOrchestrator {
    statements: StatementRepository,
    calibration: Calibration,
    archetype_rules: ArchetypeRules,
    store: Arc<dyn SessionStore>,
    config: OrchestratorConfig,
}

impl ScoringOrchestrator {
    pub fn new(
        statements: StatementRepository,
        calibration: Calibration,
        archetype_rules: ArchetypeRules,
        store: Arc<dyn SessionStore>,
        config: OrchestratorConfig,
    ) -> Self {
        Self {
            statements,
            calibration,
            archetype_rules,
            store,
            config,
        }
    }

    fn statements_by_id(&self) -> HashMap<String, Statement> {
        self.statements
            .all()
            .into_iter()
            .map(|s| (s.statement_id.clone(), s.clone()))
            .collect()
    }

    /// Create a new session with `block_count` balanced quartet blocks
    /// (spec.md §5.1/§6).
    pub async fn generate_blocks(
        &self,
        block_count: Option<u32>,
        seed: Option<u64>,
    ) -> Result<Session, DomainError> {
        let block_count = block_count.unwrap_or(self.config.default_block_count);
        if block_count < self.config.min_block_count || block_count > self.config.max_block_count {
            return Err(DomainError::InvalidParameter(format!(
                "block_count must be between {} and {}, got {}",
                self.config.min_block_count, self.config.max_block_count, block_count
            )));
        }

        let session_id = Uuid::new_v4();
        let seed = seed.unwrap_or_else(|| BlockDesigner::seed_from_session(session_id));
        let blocks = BlockDesigner::design(
            &self.statements,
            block_count,
            seed,
            self.config.social_desirability_tolerance,
            self.config.repair_budget,
        )?;

        let now = Utc::now();
        let session = Session {
            session_id,
            created_at: now,
            status: SessionStatus::Pending,
            blocks,
            responses: Vec::new(),
            score_result: None,
            expires_at: now + Duration::seconds(self.config.session_ttl_seconds),
        };

        self.store.create_session(&session).await?;
        Ok(session)
    }

    /// Resolve a set of blocks into their renderable statement texts
    /// (spec.md §4.9, §6).
    pub fn hydrate_blocks(&self, blocks: &[QuartetBlock]) -> Result<Vec<HydratedBlock>, DomainError> {
        self.statements.hydrate_blocks(blocks)
    }

    /// Validate and score a completed set of responses (spec.md §5.2-§5.3).
    pub async fn submit_responses(
        &self,
        session_id: Uuid,
        responses: Vec<BlockResponse>,
    ) -> Result<ScoreResult, DomainError> {
        let session = self
            .store
            .get_session(session_id)
            .await?
            .ok_or_else(|| DomainError::NotFound(format!("session {session_id} not found")))?;

        let now = Utc::now();
        match session.effective_status(now) {
            SessionStatus::Completed => return Err(DomainError::AlreadyCompleted),
            SessionStatus::Expired => return Err(DomainError::Expired),
            SessionStatus::Pending | SessionStatus::InProgress => {}
        }

        let responses_record = responses.clone();
        let score_result = self.score(&session.blocks, responses, now)?;

        self.store
            .append_responses(session_id, &responses_record)
            .await?;
        self.store
            .complete_session(session_id, &score_result)
            .await?;

        Ok(score_result)
    }

    /// Score a set of responses against a set of blocks without touching
    /// the session store. Used by the CLI's offline `score` command, which
    /// scores a previously exported blocks+responses file (spec.md §6).
    pub fn score_standalone(
        &self,
        blocks: &[QuartetBlock],
        responses: Vec<BlockResponse>,
    ) -> Result<ScoreResult, DomainError> {
        self.score(blocks, responses, Utc::now())
    }

    fn score(
        &self,
        blocks: &[QuartetBlock],
        responses: Vec<BlockResponse>,
        now: chrono::DateTime<Utc>,
    ) -> Result<ScoreResult, DomainError> {
        let statements = self.statements_by_id();
        let validated = ResponseValidator::validate(
            blocks,
            &responses,
            &statements,
            self.config.min_coverage_per_dimension,
            self.config.min_response_time_ms,
            self.config.max_response_time_ms,
        )?;

        let estimate = IrtScorer::estimate(
            blocks,
            &validated.responses,
            &statements,
            &self.calibration,
            self.config.irt_max_iterations,
            self.config.irt_tolerance,
        );

        let dimension_scores: BTreeMap<Dimension, DimensionScore> = estimate
            .theta
            .into_iter()
            .map(|(dimension, value)| {
                (
                    dimension,
                    NormativeTransformer::transform(dimension, value, &self.calibration),
                )
            })
            .collect();

        let domain_scores = DomainAggregator::aggregate(&dimension_scores);
        let tiers = TierClassifier::classify(&dimension_scores);
        let archetype = ArchetypeMapper::map(&tiers, &self.archetype_rules);

        let mut warnings = validated.warnings.clone();
        if !self.calibration.is_calibrated() {
            warnings.push(Warning::Uncalibrated);
        }

        let mut confidence = Self::confidence(&estimate.posterior_precision);
        if !estimate.converged {
            confidence = (confidence * 0.5).clamp(0.0, 1.0);
            warnings.push(Warning::DegradedScoring {
                message: format!(
                    "IRT optimizer did not converge within {} iterations; falling back to the tally-based estimate",
                    self.config.irt_max_iterations
                ),
            });
        }

        Ok(ScoreResult {
            dimension_scores,
            domain_scores,
            tiers,
            archetype,
            confidence,
            algorithm_version: self.calibration.algorithm_version.clone(),
            calibration_version: self.calibration.calibration_version.clone(),
            computed_at: now,
            warnings,
        })
    }

    /// Fetch a previously computed result (spec.md §5.4).
    pub async fn get_result(&self, session_id: Uuid) -> Result<ScoreResult, DomainError> {
        let session = self
            .store
            .get_session(session_id)
            .await?
            .ok_or_else(|| DomainError::NotFound(format!("session {session_id} not found")))?;

        match session.effective_status(Utc::now()) {
            SessionStatus::Completed => session.score_result.ok_or_else(|| {
                DomainError::Internal(anyhow::anyhow!(
                    "session {session_id} is completed but has no stored score_result"
                ))
            }),
            SessionStatus::Expired => Err(DomainError::Expired),
            SessionStatus::Pending | SessionStatus::InProgress => Err(DomainError::NotFound(
                format!("session {session_id} has not been scored yet"),
            )),
        }
    }

    /// Confidence derived from the log-posterior curvature at the MAP
    /// estimate: lower posterior variance (steeper curvature, more/more
    /// decisive comparisons) yields higher confidence (spec.md §4.5).
    fn confidence(posterior_precision: &BTreeMap<Dimension, f64>) -> f64 {
        if posterior_precision.is_empty() {
            return 0.0;
        }
        let precisions: Vec<f64> = posterior_precision.values().map(|h| h.max(1e-9)).collect();
        let mean_precision = precisions.iter().sum::<f64>() / precisions.len() as f64;
        let posterior_variance = 1.0 / mean_precision;
        (1.0 / (1.0 + posterior_variance)).clamp(0.0, 1.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::statement_repository::test_support::sample_repository;
    use crate::Domain;
    use async_trait::async_trait;
    use std::sync::Mutex;

    #[derive(Default)]
    struct InMemoryStore {
        sessions: Mutex<HashMap<Uuid, Session>>,
    }

    #[async_trait]
    impl SessionStore for InMemoryStore {
        async fn create_session(&self, session: &Session) -> Result<(), DomainError> {
            self.sessions
                .lock()
                .unwrap()
                .insert(session.session_id, session.clone());
            Ok(())
        }

        async fn get_session(&self, session_id: Uuid) -> Result<Option<Session>, DomainError> {
            Ok(self.sessions.lock().unwrap().get(&session_id).cloned())
        }

        async fn append_responses(
            &self,
            session_id: Uuid,
            responses: &[BlockResponse],
        ) -> Result<(), DomainError> {
            let mut sessions = self.sessions.lock().unwrap();
            let session = sessions
                .get_mut(&session_id)
                .ok_or_else(|| DomainError::NotFound(session_id.to_string()))?;
            session.responses = responses.to_vec();
            session.status = SessionStatus::InProgress;
            Ok(())
        }

        async fn complete_session(
            &self,
            session_id: Uuid,
            result: &ScoreResult,
        ) -> Result<(), DomainError> {
            let mut sessions = self.sessions.lock().unwrap();
            let session = sessions
                .get_mut(&session_id)
                .ok_or_else(|| DomainError::NotFound(session_id.to_string()))?;
            session.score_result = Some(result.clone());
            session.status = SessionStatus::Completed;
            Ok(())
        }
    }

    fn test_config() -> OrchestratorConfig {
        OrchestratorConfig {
            default_block_count: 12,
            min_block_count: 5,
            max_block_count: 30,
            social_desirability_tolerance: 1.5,
            repair_budget: 200,
            min_coverage_per_dimension: 1,
            min_response_time_ms: None,
            max_response_time_ms: None,
            irt_max_iterations: 50,
            irt_tolerance: 1e-6,
            session_ttl_seconds: 7200,
        }
    }

    fn orchestrator() -> ScoringOrchestrator {
        ScoringOrchestrator::new(
            sample_repository(10),
            Calibration::uncalibrated(),
            ArchetypeRules::default_rules(),
            Arc::new(InMemoryStore::default()),
            test_config(),
        )
    }

    #[tokio::test]
    async fn generate_blocks_rejects_out_of_range_count() {
        let orchestrator = orchestrator();
        let result = orchestrator.generate_blocks(Some(1), None).await;
        assert!(matches!(result, Err(DomainError::InvalidParameter(_))));
    }

    #[tokio::test]
    async fn full_round_trip_generate_submit_get_result() {
        let orchestrator = orchestrator();
        let session = orchestrator.generate_blocks(Some(12), Some(7)).await.unwrap();

        let responses: Vec<BlockResponse> = (1..=session.blocks.len() as u32)
            .map(|block_index| BlockResponse {
                block_index,
                most_like_index: 0,
                least_like_index: 1,
                response_time_ms: Some(4000),
            })
            .collect();

        let result = orchestrator
            .submit_responses(session.session_id, responses)
            .await
            .unwrap();
        assert_eq!(result.dimension_scores.len(), 12);

        let fetched = orchestrator.get_result(session.session_id).await.unwrap();
        assert_eq!(fetched.archetype.id, result.archetype.id);
    }

    #[tokio::test]
    async fn unknown_session_is_not_found() {
        let orchestrator = orchestrator();
        let result = orchestrator.get_result(Uuid::new_v4()).await;
        assert!(matches!(result, Err(DomainError::NotFound(_))));
    }

    /// Build responses that favor `favored`'s statements as most-like and
    /// `disfavored`'s as least-like wherever a block offers the choice.
    fn responses_favoring(
        repo: &StatementRepository,
        blocks: &[QuartetBlock],
        favored: Domain,
        disfavored: Domain,
    ) -> Vec<BlockResponse> {
        blocks
            .iter()
            .enumerate()
            .map(|(i, block)| {
                let dims: Vec<Dimension> = block
                    .statement_ids
                    .iter()
                    .map(|id| repo.get(id).unwrap().dimension)
                    .collect();
                let most_idx = dims.iter().position(|d| d.domain() == favored).unwrap_or(0);
                let least_idx = dims
                    .iter()
                    .position(|d| d.domain() == disfavored && dims[most_idx].domain() != disfavored)
                    .filter(|&l| l != most_idx)
                    .unwrap_or_else(|| (0..4).find(|&j| j != most_idx).unwrap());
                BlockResponse {
                    block_index: (i + 1) as u32,
                    most_like_index: most_idx as u8,
                    least_like_index: least_idx as u8,
                    response_time_ms: Some(4000),
                }
            })
            .collect()
    }

    /// spec.md §8 scenario 1: a respondent who consistently favors Executing
    /// dimensions over Strategic ones lands an Executing-majority dominant tier.
    #[tokio::test]
    async fn executing_dominant_respondent_scenario() {
        let orchestrator = orchestrator();
        let repo = sample_repository(10);
        let session = orchestrator.generate_blocks(Some(30), Some(42)).await.unwrap();
        let responses = responses_favoring(&repo, &session.blocks, Domain::Executing, Domain::Strategic);
        let result = orchestrator
            .submit_responses(session.session_id, responses)
            .await
            .unwrap();

        let executing_in_dominant = result
            .tiers
            .dominant
            .iter()
            .filter(|d| [Dimension::T1, Dimension::T2, Dimension::T12].contains(d))
            .count();
        assert!(
            executing_in_dominant >= 2,
            "expected at least two of T1/T2/T12 in the dominant tier, got {:?}",
            result.tiers.dominant
        );
    }

    /// spec.md §8 scenario 2: a respondent who consistently favors Strategic
    /// dimensions ({T3,T4,T8}) over Executing ones lands those in the dominant tier.
    #[tokio::test]
    async fn strategic_dominant_respondent_scenario() {
        let orchestrator = orchestrator();
        let repo = sample_repository(10);
        let session = orchestrator.generate_blocks(Some(30), Some(17)).await.unwrap();
        let responses = responses_favoring(&repo, &session.blocks, Domain::Strategic, Domain::Executing);
        let result = orchestrator
            .submit_responses(session.session_id, responses)
            .await
            .unwrap();

        let strategic_in_dominant = result
            .tiers
            .dominant
            .iter()
            .filter(|d| [Dimension::T3, Dimension::T4, Dimension::T8].contains(d))
            .count();
        assert!(
            strategic_in_dominant >= 2,
            "expected at least two of T3/T4/T8 in the dominant tier, got {:?}",
            result.tiers.dominant
        );
    }

    /// spec.md §8 scenario 3: indifferent (always pick the same two slots)
    /// responses must still produce a finite, non-extreme score for every dimension.
    #[tokio::test]
    async fn uniform_responses_scenario() {
        let orchestrator = orchestrator();
        let session = orchestrator.generate_blocks(Some(30), Some(7)).await.unwrap();
        let responses: Vec<BlockResponse> = (1..=session.blocks.len() as u32)
            .map(|block_index| BlockResponse {
                block_index,
                most_like_index: 0,
                least_like_index: 3,
                response_time_ms: Some(4000),
            })
            .collect();
        let result = orchestrator
            .submit_responses(session.session_id, responses)
            .await
            .unwrap();

        for score in result.dimension_scores.values() {
            assert!(score.percentile.is_finite());
            assert!(score.t_score.is_finite());
            assert!(score.percentile <= 99.0, "got {}", score.percentile);
        }
    }

    /// spec.md §8 scenario 4: a partially-completed session must score with
    /// strictly lower confidence than the same design fully completed.
    #[tokio::test]
    async fn incomplete_session_has_lower_confidence_than_full_session() {
        let orchestrator = orchestrator();

        let full_session = orchestrator.generate_blocks(Some(30), Some(11)).await.unwrap();
        let full_responses: Vec<BlockResponse> = (1..=30)
            .map(|block_index| BlockResponse {
                block_index,
                most_like_index: 0,
                least_like_index: 1,
                response_time_ms: Some(4000),
            })
            .collect();
        let full_result = orchestrator
            .submit_responses(full_session.session_id, full_responses)
            .await
            .unwrap();

        let partial_session = orchestrator.generate_blocks(Some(30), Some(11)).await.unwrap();
        let partial_responses: Vec<BlockResponse> = (1..=15)
            .map(|block_index| BlockResponse {
                block_index,
                most_like_index: 0,
                least_like_index: 1,
                response_time_ms: Some(4000),
            })
            .collect();
        let partial_result = orchestrator
            .submit_responses(partial_session.session_id, partial_responses)
            .await
            .unwrap();

        assert!(
            partial_result.confidence < full_result.confidence,
            "partial confidence {} should be lower than full confidence {}",
            partial_result.confidence,
            full_result.confidence
        );
    }

    /// spec.md §8 scenario 5: submitting to an expired session fails with Expired.
    #[tokio::test]
    async fn expired_session_submit_is_rejected() {
        let mut config = test_config();
        config.session_ttl_seconds = -1;
        let orchestrator = ScoringOrchestrator::new(
            sample_repository(10),
            Calibration::uncalibrated(),
            ArchetypeRules::default_rules(),
            Arc::new(InMemoryStore::default()),
            config,
        );
        let session = orchestrator.generate_blocks(Some(12), Some(3)).await.unwrap();
        let responses: Vec<BlockResponse> = (1..=session.blocks.len() as u32)
            .map(|block_index| BlockResponse {
                block_index,
                most_like_index: 0,
                least_like_index: 1,
                response_time_ms: Some(4000),
            })
            .collect();

        let result = orchestrator.submit_responses(session.session_id, responses).await;
        assert!(matches!(result, Err(DomainError::Expired)));
    }

    /// spec.md §8 scenario 6: a second submit on a completed session fails,
    /// and the stored result is bit-identical to the first.
    #[tokio::test]
    async fn resubmitting_a_completed_session_is_rejected_and_result_is_unchanged() {
        let orchestrator = orchestrator();
        let session = orchestrator.generate_blocks(Some(12), Some(3)).await.unwrap();
        let responses: Vec<BlockResponse> = (1..=session.blocks.len() as u32)
            .map(|block_index| BlockResponse {
                block_index,
                most_like_index: 0,
                least_like_index: 1,
                response_time_ms: Some(4000),
            })
            .collect();
        let first = orchestrator
            .submit_responses(session.session_id, responses.clone())
            .await
            .unwrap();

        let second = orchestrator.submit_responses(session.session_id, responses).await;
        assert!(matches!(second, Err(DomainError::AlreadyCompleted)));

        let stored = orchestrator.get_result(session.session_id).await.unwrap();
        assert_eq!(stored.dimension_scores, first.dimension_scores);
        assert_eq!(stored.archetype, first.archetype);
        assert_eq!(stored.confidence, first.confidence);
    }

    /// spec.md §8: discrimination property — two sessions with identical
    /// blocks but opposite favoring must separate the favored dimensions'
    /// percentiles by at least 20 points on average.
    #[tokio::test]
    async fn discrimination_property_separates_favored_and_disfavored_dimensions() {
        let orchestrator = orchestrator();
        let repo = sample_repository(10);

        let session_a = orchestrator.generate_blocks(Some(30), Some(5)).await.unwrap();
        let responses_a = responses_favoring(&repo, &session_a.blocks, Domain::Executing, Domain::Strategic);
        let result_a = orchestrator
            .submit_responses(session_a.session_id, responses_a)
            .await
            .unwrap();

        let session_b = orchestrator.generate_blocks(Some(30), Some(5)).await.unwrap();
        let responses_b = responses_favoring(&repo, &session_b.blocks, Domain::Strategic, Domain::Executing);
        let result_b = orchestrator
            .submit_responses(session_b.session_id, responses_b)
            .await
            .unwrap();

        let executing_dims = Domain::Executing.dimensions();
        let margin: f64 = executing_dims
            .iter()
            .map(|d| result_a.dimension_scores[d].percentile - result_b.dimension_scores[d].percentile)
            .sum::<f64>()
            / executing_dims.len() as f64;

        assert!(
            margin >= 20.0,
            "expected >=20 point average percentile margin for favored dimensions, got {margin}"
        );
    }
}
