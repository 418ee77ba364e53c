//! Balanced quartet block designer (spec.md §4.2).
//!
//! Produces an ordered list of quartet blocks such that every dimension is
//! exposed with near-uniform frequency, pairwise dimension co-occurrence is
//! as uniform as the requested block count allows, and within-block
//! statements are matched on social desirability.

use crate::{Dimension, DomainError, QuartetBlock, StatementRepository};
use rand::SeedableRng;
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use std::collections::{BTreeSet, HashMap, HashSet};
use uuid::Uuid;

pub struct BlockDesigner;

fn normalize_pair(a: Dimension, b: Dimension) -> (Dimension, Dimension) {
    if a < b { (a, b) } else { (b, a) }
}

impl BlockDesigner {
    /// Derive a deterministic seed from a session id (spec.md §4.2:
    /// "default seed is derived from session_id so the same session
    /// regenerates the same blocks if needed").
    pub fn seed_from_session(session_id: Uuid) -> u64 {
        let bytes = session_id.as_bytes();
        u64::from_le_bytes(bytes[0..8].try_into().expect("16-byte uuid"))
    }

    /// Design `block_count` quartet blocks from `repo`, deterministic given `seed`.
    pub fn design(
        repo: &StatementRepository,
        block_count: u32,
        seed: u64,
        social_desirability_tolerance: f64,
        repair_budget: u32,
    ) -> Result<Vec<QuartetBlock>, DomainError> {
        if block_count == 0 {
            return Err(DomainError::InvalidParameter(
                "block_count must be positive".to_string(),
            ));
        }
        let n = block_count as usize;
        let mut rng = StdRng::seed_from_u64(seed);

        let block_dimensions = Self::assign_dimensions(n, &mut rng);
        Self::assign_statements(
            repo,
            &block_dimensions,
            social_desirability_tolerance,
            repair_budget,
        )
    }

    /// Assign each block its 4 distinct dimensions, balancing per-dimension
    /// exposure counts and pairwise co-occurrence.
    fn assign_dimensions(n: usize, rng: &mut StdRng) -> Vec<[Dimension; 4]> {
        let dims = Dimension::ALL;
        let total_slots = n * 4;
        let base = total_slots / dims.len();
        let remainder = total_slots % dims.len();

        let mut order = dims.to_vec();
        order.shuffle(rng);

        let mut remaining: HashMap<Dimension, u32> =
            dims.iter().map(|d| (*d, base as u32)).collect();
        for dimension in order.into_iter().take(remainder) {
            *remaining.get_mut(&dimension).unwrap() += 1;
        }

        let mut pair_counts: HashMap<(Dimension, Dimension), u32> = HashMap::new();
        let mut blocks = Vec::with_capacity(n);

        for _ in 0..n {
            let mut chosen: Vec<Dimension> = Vec::with_capacity(4);
            for _ in 0..4 {
                let mut candidates: Vec<Dimension> = dims
                    .iter()
                    .copied()
                    .filter(|d| !chosen.contains(d) && remaining[d] > 0)
                    .collect();
                if candidates.is_empty() {
                    candidates = dims.iter().copied().filter(|d| !chosen.contains(d)).collect();
                }
                candidates.shuffle(rng);
                candidates.sort_by_key(|d| {
                    let pair_sum: u32 = chosen
                        .iter()
                        .map(|c| *pair_counts.get(&normalize_pair(*d, *c)).unwrap_or(&0))
                        .sum();
                    (pair_sum, std::cmp::Reverse(remaining[d]))
                });
                let pick = candidates[0];
                if let Some(count) = remaining.get_mut(&pick) {
                    *count = count.saturating_sub(1);
                }
                chosen.push(pick);
            }
            for i in 0..chosen.len() {
                for j in (i + 1)..chosen.len() {
                    let key = normalize_pair(chosen[i], chosen[j]);
                    *pair_counts.entry(key).or_insert(0) += 1;
                }
            }
            blocks.push(chosen.try_into().expect("exactly 4 dimensions chosen"));
        }

        blocks
    }

    /// Pick actual statements for each block's dimension slots, round-robin
    /// across each dimension's statement list, with a bounded local-swap
    /// repair pass for the social-desirability constraint and the
    /// no-duplicate-block constraint.
    fn assign_statements(
        repo: &StatementRepository,
        block_dimensions: &[[Dimension; 4]],
        tolerance: f64,
        repair_budget: u32,
    ) -> Result<Vec<QuartetBlock>, DomainError> {
        let mut cursors: HashMap<Dimension, usize> = HashMap::new();
        let mut seen: HashSet<BTreeSet<String>> = HashSet::new();
        let mut blocks = Vec::with_capacity(block_dimensions.len());

        for (index, dims) in block_dimensions.iter().enumerate() {
            let lists: Vec<Vec<&crate::Statement>> = dims
                .iter()
                .map(|d| repo.by_dimension(*d))
                .collect();
            for list in &lists {
                if list.is_empty() {
                    return Err(DomainError::PoolInsufficient(format!(
                        "no statements available for one of the dimensions in block {}",
                        index + 1
                    )));
                }
            }

            let mut offsets = [0usize; 4];
            let mut accepted: Option<[String; 4]> = None;

            for _attempt in 0..=repair_budget {
                let mut candidate_ids: [String; 4] = Default::default();
                let mut sds = [0f64; 4];
                for slot in 0..4 {
                    let list = &lists[slot];
                    let cursor = *cursors.get(&dims[slot]).unwrap_or(&0);
                    let idx = (cursor + offsets[slot]) % list.len();
                    candidate_ids[slot] = list[idx].statement_id.clone();
                    sds[slot] = list[idx].social_desirability;
                }

                let max = sds.iter().cloned().fold(f64::MIN, f64::max);
                let min = sds.iter().cloned().fold(f64::MAX, f64::min);
                let set: BTreeSet<String> = candidate_ids.iter().cloned().collect();

                if max - min <= tolerance && !seen.contains(&set) {
                    for slot in 0..4 {
                        let list_len = lists[slot].len();
                        let cursor = cursors.entry(dims[slot]).or_insert(0);
                        *cursor = (*cursor + offsets[slot] + 1) % list_len;
                    }
                    seen.insert(set);
                    accepted = Some(candidate_ids);
                    break;
                }

                let mean = sds.iter().sum::<f64>() / sds.len() as f64;
                let worst = sds
                    .iter()
                    .enumerate()
                    .max_by(|a, b| {
                        (a.1 - mean).abs().partial_cmp(&(b.1 - mean).abs()).unwrap()
                    })
                    .map(|(i, _)| i)
                    .unwrap();
                offsets[worst] += 1;
            }

            let statement_ids = accepted.ok_or_else(|| {
                DomainError::ConstraintUnsatisfiable(format!(
                    "could not satisfy social-desirability tolerance for block {} after {repair_budget} repair attempts",
                    index + 1
                ))
            })?;

            blocks.push(QuartetBlock {
                block_id: format!("blk-{:03}", index + 1),
                statement_ids,
            });
        }

        Ok(blocks)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::statement_repository::test_support::sample_repository;

    #[test]
    fn default_design_balances_dimension_exposure() {
        let repo = sample_repository(10);
        let blocks = BlockDesigner::design(&repo, 30, 42, 1.5, 200).unwrap();
        assert_eq!(blocks.len(), 30);

        let mut counts: HashMap<Dimension, u32> = HashMap::new();
        for block in &blocks {
            let mut dims_in_block = HashSet::new();
            for id in &block.statement_ids {
                let statement = repo.get(id).unwrap();
                *counts.entry(statement.dimension).or_insert(0) += 1;
                assert!(
                    dims_in_block.insert(statement.dimension),
                    "block must have 4 distinct dimensions"
                );
            }
        }
        for dimension in Dimension::ALL {
            assert_eq!(counts[&dimension], 10, "dimension {dimension} should appear 10 times");
        }
    }

    #[test]
    fn no_duplicate_blocks_within_a_session() {
        let repo = sample_repository(10);
        let blocks = BlockDesigner::design(&repo, 30, 7, 1.5, 200).unwrap();
        let mut seen = HashSet::new();
        for block in &blocks {
            let set: BTreeSet<String> = block.statement_ids.iter().cloned().collect();
            assert!(seen.insert(set), "duplicate block multiset detected");
        }
    }

    #[test]
    fn same_seed_is_deterministic() {
        let repo = sample_repository(10);
        let first = BlockDesigner::design(&repo, 30, 99, 1.5, 200).unwrap();
        let second = BlockDesigner::design(&repo, 30, 99, 1.5, 200).unwrap();
        assert_eq!(first, second);
    }

    #[test]
    fn different_seeds_can_differ() {
        let repo = sample_repository(10);
        let first = BlockDesigner::design(&repo, 30, 1, 1.5, 200).unwrap();
        let second = BlockDesigner::design(&repo, 30, 2, 1.5, 200).unwrap();
        assert_ne!(first, second);
    }

    #[test]
    fn social_desirability_spread_respects_tolerance() {
        let repo = sample_repository(10);
        let blocks = BlockDesigner::design(&repo, 30, 5, 1.5, 200).unwrap();
        for block in &blocks {
            let sds: Vec<f64> = block
                .statement_ids
                .iter()
                .map(|id| repo.get(id).unwrap().social_desirability)
                .collect();
            let max = sds.iter().cloned().fold(f64::MIN, f64::max);
            let min = sds.iter().cloned().fold(f64::MAX, f64::min);
            assert!(max - min <= 1.5 + 1e-9);
        }
    }

    #[test]
    fn smaller_block_counts_still_balance_within_one() {
        let repo = sample_repository(10);
        let blocks = BlockDesigner::design(&repo, 10, 3, 1.5, 200).unwrap();
        assert_eq!(blocks.len(), 10);

        let mut counts: HashMap<Dimension, u32> = HashMap::new();
        for block in &blocks {
            for id in &block.statement_ids {
                let statement = repo.get(id).unwrap();
                *counts.entry(statement.dimension).or_insert(0) += 1;
            }
        }
        let values: Vec<u32> = Dimension::ALL.iter().map(|d| *counts.get(d).unwrap_or(&0)).collect();
        let min = *values.iter().min().unwrap();
        let max = *values.iter().max().unwrap();
        assert!(max - min <= 1, "exposure counts should differ by at most 1, got {values:?}");
    }

    #[test]
    fn seed_from_session_is_stable_for_same_uuid() {
        let id = Uuid::parse_str("11111111-2222-3333-4444-555555555555").unwrap();
        assert_eq!(BlockDesigner::seed_from_session(id), BlockDesigner::seed_from_session(id));
    }
}
