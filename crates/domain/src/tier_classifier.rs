//! Tier classification: partition the 12 dimensions into dominant,
//! supporting and lesser bands by percentile (spec.md §4.8).

use crate::{Dimension, DimensionScore, Tiers};
use std::collections::BTreeMap;

const DOMINANT_THRESHOLD: f64 = 75.0;
const LESSER_THRESHOLD: f64 = 25.0;

pub struct TierClassifier;

impl TierClassifier {
    pub fn classify(dimension_scores: &BTreeMap<Dimension, DimensionScore>) -> Tiers {
        let mut tiers = Tiers::default();
        for dimension in Dimension::ALL {
            let Some(score) = dimension_scores.get(&dimension) else {
                continue;
            };
            if score.percentile > DOMINANT_THRESHOLD {
                tiers.dominant.push(dimension);
            } else if score.percentile < LESSER_THRESHOLD {
                tiers.lesser.push(dimension);
            } else {
                tiers.supporting.push(dimension);
            }
        }

        // Stable ordering within a tier: descending percentile, then
        // ascending dimension id (spec.md §4.8).
        let by_percentile_desc_then_id = |tier: &mut Vec<Dimension>| {
            tier.sort_by(|a, b| {
                let pa = dimension_scores[a].percentile;
                let pb = dimension_scores[b].percentile;
                pb.partial_cmp(&pa).unwrap_or(std::cmp::Ordering::Equal).then(a.cmp(b))
            });
        };
        by_percentile_desc_then_id(&mut tiers.dominant);
        by_percentile_desc_then_id(&mut tiers.supporting);
        by_percentile_desc_then_id(&mut tiers.lesser);

        tiers
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn score(percentile: f64) -> DimensionScore {
        DimensionScore {
            theta: 0.0,
            t_score: 50.0,
            percentile,
        }
    }

    #[test]
    fn partitions_cover_every_dimension_exactly_once() {
        let mut scores = BTreeMap::new();
        for (i, dimension) in Dimension::ALL.into_iter().enumerate() {
            scores.insert(dimension, score((i as f64) * 9.0));
        }
        let tiers = TierClassifier::classify(&scores);
        let total = tiers.dominant.len() + tiers.supporting.len() + tiers.lesser.len();
        assert_eq!(total, 12);
    }

    #[test]
    fn boundary_values_land_in_supporting() {
        let mut scores = BTreeMap::new();
        scores.insert(Dimension::T1, score(75.0));
        scores.insert(Dimension::T2, score(25.0));
        let tiers = TierClassifier::classify(&scores);
        assert!(tiers.supporting.contains(&Dimension::T1));
        assert!(tiers.supporting.contains(&Dimension::T2));
    }

    #[test]
    fn above_and_below_thresholds_classify_correctly() {
        let mut scores = BTreeMap::new();
        scores.insert(Dimension::T1, score(90.0));
        scores.insert(Dimension::T2, score(10.0));
        let tiers = TierClassifier::classify(&scores);
        assert!(tiers.dominant.contains(&Dimension::T1));
        assert!(tiers.lesser.contains(&Dimension::T2));
    }

    #[test]
    fn dominant_tier_orders_by_percentile_desc_then_dimension_id() {
        let mut scores = BTreeMap::new();
        scores.insert(Dimension::T12, score(80.0));
        scores.insert(Dimension::T1, score(95.0));
        scores.insert(Dimension::T5, score(95.0));
        scores.insert(Dimension::T3, score(80.0));
        let tiers = TierClassifier::classify(&scores);
        assert_eq!(
            tiers.dominant,
            vec![Dimension::T1, Dimension::T5, Dimension::T3, Dimension::T12]
        );
    }
}
