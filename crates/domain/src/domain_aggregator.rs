//! Domain-level aggregation: per-domain mean percentile plus three balance
//! metrics computed once over the 4-domain distribution (spec.md §4.7).
//!
//! - **DBI** (Domain Balance Index) is `1 - variance(p)/variance_max`, where
//!   `p` is the 4-vector of domain mean percentiles each normalized into
//!   [0,1]. `variance_max` is the maximum variance a [0,1]-bounded vector can
//!   have for the same mean `m`, namely `m * (1 - m)` (the Bernoulli bound).
//!   1.0 means the four domains are equally represented; 0.0 means standing
//!   is as concentrated as it can be given the mean.
//! - **Entropy** is the normalized Shannon entropy of the same 4-vector
//!   treated as shares of a whole, a distinct balance statistic from DBI.
//! - **Gini** is reported as `1 - standard_Gini(p)` so that, like DBI and
//!   entropy, higher means more balanced.

use crate::{Dimension, DimensionScore, Domain, DomainScoreSummary};
use std::collections::BTreeMap;

pub struct DomainAggregator;

impl DomainAggregator {
    pub fn aggregate(
        dimension_scores: &BTreeMap<Dimension, DimensionScore>,
    ) -> BTreeMap<Domain, DomainScoreSummary> {
        let mut means: BTreeMap<Domain, f64> = BTreeMap::new();
        for domain in Domain::ALL {
            let dims = domain.dimensions();
            let sum: f64 = dims
                .iter()
                .filter_map(|d| dimension_scores.get(d))
                .map(|s| s.percentile)
                .sum();
            let mean = if dims.is_empty() { 0.0 } else { sum / dims.len() as f64 };
            means.insert(domain, mean);
        }

        let values: Vec<f64> = Domain::ALL.iter().map(|d| means[d]).collect();
        let dbi = Self::domain_balance_index(&values);
        let entropy = Self::normalized_entropy(&values);
        let gini = 1.0 - Self::gini_coefficient(&values);

        Domain::ALL
            .into_iter()
            .map(|domain| {
                (
                    domain,
                    DomainScoreSummary {
                        mean_percentile: means[&domain],
                        dbi,
                        entropy,
                        gini,
                    },
                )
            })
            .collect()
    }

    /// `1 - variance(p)/variance_max` over `p = percentile/100` per domain.
    fn domain_balance_index(values: &[f64]) -> f64 {
        let p: Vec<f64> = values.iter().map(|v| v / 100.0).collect();
        let n = p.len() as f64;
        let mean = p.iter().sum::<f64>() / n;
        let variance = p.iter().map(|v| (v - mean).powi(2)).sum::<f64>() / n;
        let variance_max = mean * (1.0 - mean);
        if variance_max <= 1e-12 {
            return 1.0;
        }
        (1.0 - variance / variance_max).clamp(0.0, 1.0)
    }

    fn normalized_entropy(values: &[f64]) -> f64 {
        let total: f64 = values.iter().sum();
        if total <= 0.0 {
            return 1.0;
        }
        let n = values.len() as f64;
        let entropy: f64 = values
            .iter()
            .filter(|v| **v > 0.0)
            .map(|v| {
                let p = v / total;
                -p * p.ln()
            })
            .sum();
        (entropy / n.ln()).clamp(0.0, 1.0)
    }

    fn gini_coefficient(values: &[f64]) -> f64 {
        let total: f64 = values.iter().sum();
        if total <= 0.0 {
            return 0.0;
        }
        let n = values.len();
        let mut numerator = 0.0;
        for i in 0..n {
            for j in 0..n {
                numerator += (values[i] - values[j]).abs();
            }
        }
        (numerator / (2.0 * n as f64 * total)).clamp(0.0, 1.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn scores(percentiles: [f64; 12]) -> BTreeMap<Dimension, DimensionScore> {
        Dimension::ALL
            .into_iter()
            .zip(percentiles)
            .map(|(d, p)| {
                (
                    d,
                    DimensionScore {
                        theta: 0.0,
                        t_score: 50.0,
                        percentile: p,
                    },
                )
            })
            .collect()
    }

    #[test]
    fn uniform_percentiles_yield_perfect_balance() {
        let dimension_scores = scores([50.0; 12]);
        let summary = DomainAggregator::aggregate(&dimension_scores);
        for domain in Domain::ALL {
            assert!((summary[&domain].dbi - 1.0).abs() < 1e-9);
            assert!((summary[&domain].gini - 1.0).abs() < 1e-9);
        }
    }

    #[test]
    fn concentrated_percentiles_lower_balance_metrics() {
        let mut percentiles = [1.0; 12];
        for dimension in Domain::Executing.dimensions() {
            percentiles[dimension.index()] = 99.0;
        }
        let dimension_scores = scores(percentiles);
        let summary = DomainAggregator::aggregate(&dimension_scores);
        assert!(summary[&Domain::Executing].dbi < 1.0);
        assert!(summary[&Domain::Executing].gini < 1.0);
    }
}
