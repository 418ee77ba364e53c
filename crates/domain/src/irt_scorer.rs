//! Thurstonian forced-choice IRT scorer (spec.md §4.5).
//!
//! Each answered quartet yields 5 implied pairwise comparisons: the
//! "most-like" statement beats the two unranked statements and the
//! "least-like" statement, and each unranked statement beats "least-like".
//! No comparison is implied between the two unranked statements. Each
//! comparison is modeled as a logistic choice between latent utilities
//! `u_i = loading_i * theta_dim(i)`, scaled by the pooled residual spread of
//! the pair. Per-dimension theta is estimated by maximizing the resulting
//! log-posterior (comparisons + a zero-mean Gaussian prior) with a
//! coordinate-wise Newton iteration, seeded from a most/least tally.

use crate::{BlockResponse, Calibration, Dimension, QuartetBlock, Statement};
use std::collections::{BTreeMap, HashMap};

pub struct IrtScorer;

/// The Newton iteration's outcome: theta per dimension, the log-posterior
/// curvature (negative Hessian diagonal, i.e. posterior precision) at that
/// theta, and whether the iteration converged within budget.
pub struct IrtEstimate {
    pub theta: BTreeMap<Dimension, f64>,
    pub posterior_precision: BTreeMap<Dimension, f64>,
    pub converged: bool,
}

struct Comparison {
    winner_dim: Dimension,
    winner_loading: f64,
    loser_dim: Dimension,
    loser_loading: f64,
    scale: f64,
}

fn sigmoid(z: f64) -> f64 {
    1.0 / (1.0 + (-z).exp())
}

impl IrtScorer {
    /// Estimate per-dimension theta (MAP) from a set of validated responses.
    ///
    /// Seeds theta from a most/least tally, then refines it with a
    /// coordinate-wise Newton iteration against the log-posterior. If the
    /// iteration fails to converge within `max_iterations`, the tally-seeded
    /// estimate is returned instead of the partially-updated one, with
    /// `converged = false` so the caller can degrade confidence and emit a
    /// warning (spec.md §4.5).
    pub fn estimate(
        blocks: &[QuartetBlock],
        responses: &[BlockResponse],
        statements: &HashMap<String, Statement>,
        calibration: &Calibration,
        max_iterations: u32,
        tolerance: f64,
    ) -> IrtEstimate {
        let comparisons = Self::build_comparisons(blocks, responses, statements, calibration);
        let prior_variance = calibration.theta_prior_variance.max(1e-6);

        let mut initial_theta: BTreeMap<Dimension, f64> =
            Dimension::ALL.into_iter().map(|d| (d, 0.0)).collect();
        for (dimension, tally) in Self::tally(blocks, responses, statements) {
            *initial_theta.get_mut(&dimension).unwrap() = tally * 0.3;
        }

        let mut theta = initial_theta.clone();
        let mut converged = false;
        let mut posterior_precision = BTreeMap::new();

        for _ in 0..max_iterations {
            let (gradient, hessian) = Self::gradient_and_hessian(&theta, &comparisons, prior_variance);

            let mut max_delta = 0.0f64;
            for dimension in Dimension::ALL {
                let h = hessian[&dimension];
                if h.abs() < 1e-9 {
                    continue;
                }
                let delta = gradient[&dimension] / h;
                let updated = theta[&dimension] - delta;
                max_delta = max_delta.max(delta.abs());
                *theta.get_mut(&dimension).unwrap() = updated;
            }

            posterior_precision = hessian.into_iter().map(|(d, h)| (d, -h)).collect();

            if max_delta < tolerance {
                converged = true;
                break;
            }
        }

        if !converged {
            theta = initial_theta.clone();
            let (_, hessian) = Self::gradient_and_hessian(&theta, &comparisons, prior_variance);
            posterior_precision = hessian.into_iter().map(|(d, h)| (d, -h)).collect();
        }

        IrtEstimate {
            theta,
            posterior_precision,
            converged,
        }
    }

    /// Gradient and Hessian diagonal of the log-posterior at `theta`: a
    /// zero-mean Gaussian prior plus each pairwise comparison's logistic
    /// log-likelihood contribution.
    fn gradient_and_hessian(
        theta: &BTreeMap<Dimension, f64>,
        comparisons: &[Comparison],
        prior_variance: f64,
    ) -> (BTreeMap<Dimension, f64>, BTreeMap<Dimension, f64>) {
        let mut gradient: BTreeMap<Dimension, f64> =
            Dimension::ALL.into_iter().map(|d| (d, 0.0)).collect();
        let mut hessian: BTreeMap<Dimension, f64> =
            Dimension::ALL.into_iter().map(|d| (d, 0.0)).collect();

        for dimension in Dimension::ALL {
            let t = theta[&dimension];
            *gradient.get_mut(&dimension).unwrap() -= t / prior_variance;
            *hessian.get_mut(&dimension).unwrap() -= 1.0 / prior_variance;
        }

        for c in comparisons {
            let z = (c.winner_loading * theta[&c.winner_dim] - c.loser_loading * theta[&c.loser_dim])
                / c.scale;
            let p = sigmoid(z);
            let d_logp = (1.0 - p) / c.scale;
            let d2_logp = -p * (1.0 - p) / (c.scale * c.scale);

            *gradient.get_mut(&c.winner_dim).unwrap() += d_logp * c.winner_loading;
            *gradient.get_mut(&c.loser_dim).unwrap() -= d_logp * c.loser_loading;
            *hessian.get_mut(&c.winner_dim).unwrap() += d2_logp * c.winner_loading * c.winner_loading;
            *hessian.get_mut(&c.loser_dim).unwrap() += d2_logp * c.loser_loading * c.loser_loading;
        }

        (gradient, hessian)
    }

    fn tally(
        blocks: &[QuartetBlock],
        responses: &[BlockResponse],
        statements: &HashMap<String, Statement>,
    ) -> BTreeMap<Dimension, f64> {
        let mut tally: BTreeMap<Dimension, f64> =
            Dimension::ALL.into_iter().map(|d| (d, 0.0)).collect();
        for response in responses {
            let block = &blocks[(response.block_index - 1) as usize];
            if let Some(statement) = statements.get(&block.statement_ids[response.most_like_index as usize]) {
                *tally.get_mut(&statement.dimension).unwrap() += 1.0;
            }
            if let Some(statement) = statements.get(&block.statement_ids[response.least_like_index as usize]) {
                *tally.get_mut(&statement.dimension).unwrap() -= 1.0;
            }
        }
        tally
    }

    fn build_comparisons(
        blocks: &[QuartetBlock],
        responses: &[BlockResponse],
        statements: &HashMap<String, Statement>,
        calibration: &Calibration,
    ) -> Vec<Comparison> {
        let mut comparisons = Vec::new();

        for response in responses {
            let block = &blocks[(response.block_index - 1) as usize];
            let most = response.most_like_index as usize;
            let least = response.least_like_index as usize;

            let resolved: Vec<Option<&Statement>> = block
                .statement_ids
                .iter()
                .map(|id| statements.get(id))
                .collect();
            let (Some(most_statement), Some(least_statement)) = (resolved[most], resolved[least])
            else {
                continue;
            };

            let pair_scale = |a: &Statement, b: &Statement| -> f64 {
                (calibration.residual_variance(&a.statement_id)
                    + calibration.residual_variance(&b.statement_id))
                .sqrt()
                .max(1e-6)
            };

            for (index, statement) in resolved.iter().enumerate() {
                let Some(statement) = statement else { continue };
                if index == most || index == least {
                    continue;
                }
                comparisons.push(Comparison {
                    winner_dim: most_statement.dimension,
                    winner_loading: most_statement.factor_loading,
                    loser_dim: statement.dimension,
                    loser_loading: statement.factor_loading,
                    scale: pair_scale(most_statement, statement),
                });
                comparisons.push(Comparison {
                    winner_dim: statement.dimension,
                    winner_loading: statement.factor_loading,
                    loser_dim: least_statement.dimension,
                    loser_loading: least_statement.factor_loading,
                    scale: pair_scale(statement, least_statement),
                });
            }

            comparisons.push(Comparison {
                winner_dim: most_statement.dimension,
                winner_loading: most_statement.factor_loading,
                loser_dim: least_statement.dimension,
                loser_loading: least_statement.factor_loading,
                scale: pair_scale(most_statement, least_statement),
            });
        }

        comparisons
    }
}
