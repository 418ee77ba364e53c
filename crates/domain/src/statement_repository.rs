//! Statement pool: process-wide immutable configuration loaded once at
//! startup (spec.md §4.1). Read-only after load; a change to the pool
//! requires a process restart so every active session sees a consistent
//! catalog.

use crate::{Dimension, DomainError, QuartetBlock, Statement};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::Path;

/// Minimum number of statements required per dimension (spec.md §3).
pub const MIN_STATEMENTS_PER_DIMENSION: usize = 10;

#[derive(Debug, Deserialize)]
struct StatementRecord {
    statement_id: String,
    dimension: Dimension,
    text: String,
    social_desirability: f64,
    factor_loading: f64,
}

#[derive(Debug)]
pub struct StatementRepository {
    by_id: HashMap<String, Statement>,
    by_dimension: HashMap<Dimension, Vec<String>>,
}

impl StatementRepository {
    /// Load the pool from a JSON file (an array of statement records) and
    /// validate the "every dimension has >= 10 statements" invariant.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, DomainError> {
        let path_ref = path.as_ref();
        let raw = std::fs::read_to_string(path_ref).map_err(|e| {
            DomainError::Configuration(format!(
                "failed to read statement pool {}: {e}",
                path_ref.display()
            ))
        })?;
        let records: Vec<StatementRecord> = serde_json::from_str(&raw).map_err(|e| {
            DomainError::Configuration(format!(
                "failed to parse statement pool {}: {e}",
                path_ref.display()
            ))
        })?;
        Self::from_records(records)
    }

    fn from_records(records: Vec<StatementRecord>) -> Result<Self, DomainError> {
        let mut by_id = HashMap::new();
        let mut by_dimension: HashMap<Dimension, Vec<String>> = HashMap::new();

        for record in records {
            if record.factor_loading <= 0.0 {
                return Err(DomainError::Configuration(format!(
                    "statement {} has non-positive factor_loading",
                    record.statement_id
                )));
            }
            if !(1.0..=7.0).contains(&record.social_desirability) {
                return Err(DomainError::Configuration(format!(
                    "statement {} has social_desirability outside [1,7]",
                    record.statement_id
                )));
            }
            by_dimension
                .entry(record.dimension)
                .or_default()
                .push(record.statement_id.clone());
            by_id.insert(
                record.statement_id.clone(),
                Statement {
                    statement_id: record.statement_id,
                    dimension: record.dimension,
                    text: record.text,
                    social_desirability: record.social_desirability,
                    factor_loading: record.factor_loading,
                },
            );
        }

        let repo = Self { by_id, by_dimension };
        repo.validate_minimum_coverage()?;
        Ok(repo)
    }

    fn validate_minimum_coverage(&self) -> Result<(), DomainError> {
        for dimension in Dimension::ALL {
            let count = self.by_dimension.get(&dimension).map_or(0, Vec::len);
            if count < MIN_STATEMENTS_PER_DIMENSION {
                return Err(DomainError::PoolInsufficient(format!(
                    "dimension {dimension} has {count} statements, needs at least {MIN_STATEMENTS_PER_DIMENSION}"
                )));
            }
        }
        Ok(())
    }

    pub fn get(&self, statement_id: &str) -> Option<&Statement> {
        self.by_id.get(statement_id)
    }

    pub fn by_dimension(&self, dimension: Dimension) -> Vec<&Statement> {
        self.by_dimension
            .get(&dimension)
            .into_iter()
            .flatten()
            .filter_map(|id| self.by_id.get(id))
            .collect()
    }

    pub fn all(&self) -> Vec<&Statement> {
        self.by_id.values().collect()
    }

    pub fn len(&self) -> usize {
        self.by_id.len()
    }

    pub fn is_empty(&self) -> bool {
        self.by_id.is_empty()
    }

    /// Resolve a block's bare statement ids into renderable text and
    /// dimension, for the `POST blocks` response contract (spec.md §4.9, §6).
    pub fn hydrate(&self, block: &QuartetBlock) -> Result<HydratedBlock, DomainError> {
        let mut statements = Vec::with_capacity(4);
        for id in &block.statement_ids {
            let statement = self.get(id).ok_or_else(|| {
                DomainError::Internal(anyhow::anyhow!(
                    "block {} references unknown statement {id}",
                    block.block_id
                ))
            })?;
            statements.push(HydratedStatement {
                id: statement.statement_id.clone(),
                text: statement.text.clone(),
                dimension: statement.dimension,
            });
        }
        Ok(HydratedBlock {
            block_id: block.block_id.clone(),
            statements: statements.try_into().expect("exactly 4 statement ids per block"),
        })
    }

    pub fn hydrate_blocks(&self, blocks: &[QuartetBlock]) -> Result<Vec<HydratedBlock>, DomainError> {
        blocks.iter().map(|b| self.hydrate(b)).collect()
    }
}

/// A statement's rendering-ready fields resolved for one block slot.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HydratedStatement {
    pub id: String,
    pub text: String,
    pub dimension: Dimension,
}

/// A quartet block with its statement texts resolved, ready to render.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HydratedBlock {
    pub block_id: String,
    pub statements: [HydratedStatement; 4],
}
