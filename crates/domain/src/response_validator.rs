//! Response validation: structural checks on submitted block responses plus
//! the minimum per-dimension coverage gate (spec.md §4.4, §5).

use crate::{BlockResponse, Dimension, DomainError, QuartetBlock, Statement, Warning};
use std::collections::{HashMap, HashSet};

/// Responses that passed structural validation, plus any non-fatal
/// timing warnings collected along the way.
#[derive(Debug, Clone)]
pub struct ValidatedResponses {
    pub responses: Vec<BlockResponse>,
    pub warnings: Vec<Warning>,
}

pub struct ResponseValidator;

impl ResponseValidator {
    /// Validate `responses` against the session's `blocks`.
    ///
    /// `statements` resolves statement ids to their dimension, used for the
    /// per-dimension coverage check. `min_coverage_per_dimension` and the
    /// response-time bounds come from `AppConfig`.
    pub fn validate(
        blocks: &[QuartetBlock],
        responses: &[BlockResponse],
        statements: &HashMap<String, Statement>,
        min_coverage_per_dimension: u32,
        min_response_time_ms: Option<u32>,
        max_response_time_ms: Option<u32>,
    ) -> Result<ValidatedResponses, DomainError> {
        if responses.is_empty() {
            return Err(DomainError::InvalidParameter(
                "at least one response is required".to_string(),
            ));
        }

        let mut seen_blocks: HashSet<u32> = HashSet::new();
        let mut warnings = Vec::new();

        for response in responses {
            if response.block_index == 0 || response.block_index as usize > blocks.len() {
                return Err(DomainError::InvalidParameter(format!(
                    "block_index {} is out of range (1..={})",
                    response.block_index,
                    blocks.len()
                )));
            }
            if !seen_blocks.insert(response.block_index) {
                return Err(DomainError::InvalidParameter(format!(
                    "duplicate response for block_index {}",
                    response.block_index
                )));
            }
            if response.most_like_index > 3 || response.least_like_index > 3 {
                return Err(DomainError::InvalidParameter(format!(
                    "block_index {}: most_like_index and least_like_index must be in 0..=3",
                    response.block_index
                )));
            }
            if response.most_like_index == response.least_like_index {
                return Err(DomainError::InvalidParameter(format!(
                    "block_index {}: most_like_index and least_like_index must differ",
                    response.block_index
                )));
            }

            if let Some(time_ms) = response.response_time_ms {
                let too_fast = min_response_time_ms.is_some_and(|min| time_ms < min);
                let too_slow = max_response_time_ms.is_some_and(|max| time_ms > max);
                if too_fast || too_slow {
                    warnings.push(Warning::SuspiciousResponseTime {
                        block_index: response.block_index,
                    });
                }
            }
        }

        Self::check_coverage(blocks, responses, statements, min_coverage_per_dimension)?;

        Ok(ValidatedResponses {
            responses: responses.to_vec(),
            warnings,
        })
    }

    /// Count, per dimension, how many answered blocks contained a statement
    /// from that dimension. Any dimension below `min_coverage_per_dimension`
    /// (including zero) fails with `insufficient-coverage`: spec.md §4.4
    /// draws no distinction between zero and merely-sparse coverage, and
    /// §7 lists `insufficient-coverage` as non-recoverable.
    fn check_coverage(
        blocks: &[QuartetBlock],
        responses: &[BlockResponse],
        statements: &HashMap<String, Statement>,
        min_coverage_per_dimension: u32,
    ) -> Result<(), DomainError> {
        let mut coverage: HashMap<Dimension, u32> = HashMap::new();
        for response in responses {
            let block = &blocks[(response.block_index - 1) as usize];
            for statement_id in &block.statement_ids {
                if let Some(statement) = statements.get(statement_id) {
                    *coverage.entry(statement.dimension).or_insert(0) += 1;
                }
            }
        }
        let mut uncovered = Vec::new();
        for dimension in Dimension::ALL {
            let count = *coverage.get(&dimension).unwrap_or(&0);
            if count < min_coverage_per_dimension {
                uncovered.push(dimension.to_string());
            }
        }
        if !uncovered.is_empty() {
            return Err(DomainError::InsufficientCoverage(format!(
                "coverage below minimum ({min_coverage_per_dimension}) for dimension(s): {}",
                uncovered.join(", ")
            )));
        }
        Ok(())
    }
}
