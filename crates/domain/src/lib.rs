//! Domain types and scoring algorithms for the Quartet forced-choice
//! psychometric engine: the Thurstonian IRT scorer, balanced block
//! designer, normative transform, domain aggregation, tiering and
//! archetype mapping, and the session lifecycle that ties them together.

pub mod archetype_mapper;
pub mod block_designer;
pub mod calibration;
pub mod domain_aggregator;
pub mod errors;
pub mod irt_scorer;
pub mod normative_transformer;
pub mod orchestrator;
pub mod response_validator;
pub mod session_store;
pub mod statement_repository;
pub mod tier_classifier;

pub use archetype_mapper::{ArchetypeMapper, ArchetypeRule, ArchetypeRules};
pub use block_designer::BlockDesigner;
pub use calibration::{Calibration, CalibrationError, StatementParams};
pub use domain_aggregator::DomainAggregator;
pub use errors::DomainError;
pub use irt_scorer::IrtScorer;
pub use normative_transformer::NormativeTransformer;
pub use orchestrator::{OrchestratorConfig, ScoringOrchestrator};
pub use response_validator::{ResponseValidator, ValidatedResponses};
pub use session_store::SessionStore;
pub use statement_repository::{HydratedBlock, HydratedStatement, StatementRepository};
pub use tier_classifier::TierClassifier;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use uuid::Uuid;

/// One of the 12 fine-grained talent facets measured by the instrument.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Dimension {
    T1,
    T2,
    T3,
    T4,
    T5,
    T6,
    T7,
    T8,
    T9,
    T10,
    T11,
    T12,
}

impl Dimension {
    pub const ALL: [Dimension; 12] = [
        Dimension::T1,
        Dimension::T2,
        Dimension::T3,
        Dimension::T4,
        Dimension::T5,
        Dimension::T6,
        Dimension::T7,
        Dimension::T8,
        Dimension::T9,
        Dimension::T10,
        Dimension::T11,
        Dimension::T12,
    ];

    pub fn all() -> [Dimension; 12] {
        Self::ALL
    }

    /// The domain this dimension belongs to. Fixed configuration per
    /// spec.md §6; the concrete 3-3-3-3 split is resolved in SPEC_FULL.md §9.
    pub fn domain(&self) -> Domain {
        match self {
            Dimension::T1 | Dimension::T2 | Dimension::T12 => Domain::Executing,
            Dimension::T3 | Dimension::T4 | Dimension::T8 => Domain::Strategic,
            Dimension::T5 | Dimension::T6 | Dimension::T9 => Domain::Relationship,
            Dimension::T7 | Dimension::T10 | Dimension::T11 => Domain::Influencing,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Dimension::T1 => "t1",
            Dimension::T2 => "t2",
            Dimension::T3 => "t3",
            Dimension::T4 => "t4",
            Dimension::T5 => "t5",
            Dimension::T6 => "t6",
            Dimension::T7 => "t7",
            Dimension::T8 => "t8",
            Dimension::T9 => "t9",
            Dimension::T10 => "t10",
            Dimension::T11 => "t11",
            Dimension::T12 => "t12",
        }
    }

    /// Index of this dimension into a 12-slot vector (0-based, matches `ALL`).
    pub fn index(&self) -> usize {
        Self::ALL.iter().position(|d| d == self).expect("exhaustive")
    }
}

impl std::fmt::Display for Dimension {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// One of the 4 coarse groupings of dimensions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Domain {
    Executing,
    Influencing,
    Relationship,
    Strategic,
}

impl Domain {
    pub const ALL: [Domain; 4] = [
        Domain::Executing,
        Domain::Influencing,
        Domain::Relationship,
        Domain::Strategic,
    ];

    pub fn dimensions(&self) -> Vec<Dimension> {
        Dimension::ALL
            .into_iter()
            .filter(|d| d.domain() == *self)
            .collect()
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Domain::Executing => "executing",
            Domain::Influencing => "influencing",
            Domain::Relationship => "relationship",
            Domain::Strategic => "strategic",
        }
    }
}

impl std::fmt::Display for Domain {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Immutable statement-pool catalog entry.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Statement {
    pub statement_id: String,
    pub dimension: Dimension,
    pub text: String,
    /// Social desirability rating, 1-7.
    pub social_desirability: f64,
    /// Thurstonian factor loading, strictly positive.
    pub factor_loading: f64,
}

/// Four statement ids forming one forced-choice question.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QuartetBlock {
    pub block_id: String,
    pub statement_ids: [String; 4],
}

/// Lifecycle state of a Session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionStatus {
    Pending,
    InProgress,
    Completed,
    Expired,
}

/// One respondent attempt.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Session {
    pub session_id: Uuid,
    pub created_at: DateTime<Utc>,
    pub status: SessionStatus,
    pub blocks: Vec<QuartetBlock>,
    pub responses: Vec<BlockResponse>,
    pub score_result: Option<ScoreResult>,
    pub expires_at: DateTime<Utc>,
}

impl Session {
    /// Resolve lazily-computed expiration: a session past `expires_at` reads
    /// as EXPIRED regardless of its stored status, unless already COMPLETED
    /// (spec.md §3: once COMPLETED the session is immutable).
    pub fn effective_status(&self, now: DateTime<Utc>) -> SessionStatus {
        if self.status == SessionStatus::Completed {
            return SessionStatus::Completed;
        }
        if now > self.expires_at {
            return SessionStatus::Expired;
        }
        self.status
    }
}

/// One answer to a quartet block.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BlockResponse {
    /// 1-based position in the session's block list.
    pub block_index: u32,
    pub most_like_index: u8,
    pub least_like_index: u8,
    pub response_time_ms: Option<u32>,
}

/// Per-dimension scoring output. `percentile` is carried at full float
/// precision for tier thresholds and domain aggregation; it is rounded to
/// the nearest integer only when serialized, for display (spec.md §4.6).
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct DimensionScore {
    pub theta: f64,
    pub t_score: f64,
    #[serde(serialize_with = "round_percentile_for_display")]
    pub percentile: f64,
}

fn round_percentile_for_display<S>(value: &f64, serializer: S) -> Result<S::Ok, S::Error>
where
    S: serde::Serializer,
{
    serializer.serialize_f64(value.round())
}

/// Per-domain aggregate output. `dbi`, `entropy` and `gini` are computed
/// once over the 4-domain vector and repeated per entry, matching the
/// `domains: {name -> {...}}` shape of the external API surface.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct DomainScoreSummary {
    pub mean_percentile: f64,
    pub dbi: f64,
    pub entropy: f64,
    pub gini: f64,
}

/// Dimensions partitioned into three percentile-based bands.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Tiers {
    pub dominant: Vec<Dimension>,
    pub supporting: Vec<Dimension>,
    pub lesser: Vec<Dimension>,
}

/// Archetype label assigned from the dominant tier's domain composition.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Archetype {
    pub id: String,
    pub label: String,
    pub rule_id: String,
}

/// Non-fatal conditions attached to a ScoreResult. These correspond to the
/// two "recovered locally" kinds of spec.md §7, plus the suspicious-timing
/// case carried as a warning per SPEC_FULL.md §9. Coverage below the
/// configured minimum is a hard `InsufficientCoverage` error, not a
/// warning (spec.md §4.4) — there is no soft/degraded coverage tier.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Warning {
    DegradedScoring { message: String },
    Uncalibrated,
    SuspiciousResponseTime { block_index: u32 },
}

/// Deterministic function of a session's responses and the calibration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScoreResult {
    pub dimension_scores: BTreeMap<Dimension, DimensionScore>,
    pub domain_scores: BTreeMap<Domain, DomainScoreSummary>,
    pub tiers: Tiers,
    pub archetype: Archetype,
    pub confidence: f64,
    pub algorithm_version: String,
    pub calibration_version: String,
    pub computed_at: DateTime<Utc>,
    pub warnings: Vec<Warning>,
}

/// Health check response.
#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: String,
    pub version: String,
    pub build_sha: String,
    pub uptime_seconds: u64,
}

/// Ready check response.
#[derive(Debug, Serialize)]
pub struct ReadyResponse {
    pub status: String,
    pub database: String,
}
