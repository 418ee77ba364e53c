//! Normative transform: raw theta -> z-score -> T-score -> percentile
//! (spec.md §4.6). The standard normal CDF is evaluated with the
//! Abramowitz & Stegun 7.1.26 erf approximation (max error 1.5e-7); no
//! special-function crate is used anywhere in this workspace.
//!
//! `t_score` is rounded to 1 decimal place here. `percentile` stays at full
//! float precision in `DimensionScore` since tier thresholds and domain
//! aggregation need it; it is rounded to an integer only when serialized.

use crate::{Calibration, Dimension, DimensionScore};

/// Standard normal cumulative distribution function.
fn standard_normal_cdf(x: f64) -> f64 {
    0.5 * (1.0 + erf(x / std::f64::consts::SQRT_2))
}

/// Abramowitz & Stegun formula 7.1.26.
fn erf(x: f64) -> f64 {
    const A1: f64 = 0.254829592;
    const A2: f64 = -0.284496736;
    const A3: f64 = 1.421413741;
    const A4: f64 = -1.453152027;
    const A5: f64 = 1.061405429;
    const P: f64 = 0.3275911;

    let sign = if x < 0.0 { -1.0 } else { 1.0 };
    let x = x.abs();

    let t = 1.0 / (1.0 + P * x);
    let y = 1.0 - (((((A5 * t + A4) * t) + A3) * t + A2) * t + A1) * t * (-x * x).exp();

    sign * y
}

pub struct NormativeTransformer;

impl NormativeTransformer {
    /// Transform one dimension's raw theta into a `DimensionScore`.
    pub fn transform(dimension: Dimension, theta: f64, calibration: &Calibration) -> DimensionScore {
        let norm = calibration.norm(dimension);
        let sd = if norm.sd.abs() < 1e-9 { 1.0 } else { norm.sd };
        let z = (theta - norm.mean) / sd;
        let t_score_raw = (50.0 + 10.0 * z).clamp(0.0, 100.0);
        let t_score = (t_score_raw * 10.0).round() / 10.0;
        let percentile = (standard_normal_cdf(z) * 100.0).clamp(0.0, 100.0);

        DimensionScore {
            theta,
            t_score,
            percentile,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::calibration::NormParams;

    fn calibration_with_norm(mean: f64, sd: f64) -> Calibration {
        let mut calibration = Calibration::uncalibrated();
        for dimension in Dimension::ALL {
            calibration.norms.insert(dimension, NormParams { mean, sd });
        }
        calibration
    }

    #[test]
    fn theta_at_norm_mean_yields_t_score_50() {
        let calibration = calibration_with_norm(0.0, 15.0);
        let score = NormativeTransformer::transform(Dimension::T1, 0.0, &calibration);
        assert!((score.t_score - 50.0).abs() < 1e-9);
        assert!((score.percentile - 50.0).abs() < 1e-6);
    }

    #[test]
    fn theta_one_sd_above_mean_yields_percentile_near_84() {
        let calibration = calibration_with_norm(0.0, 15.0);
        let score = NormativeTransformer::transform(Dimension::T1, 15.0, &calibration);
        assert!((score.t_score - 60.0).abs() < 1e-9);
        assert!((score.percentile - 84.134).abs() < 0.05);
    }

    #[test]
    fn t_score_is_clamped_to_0_100() {
        let calibration = calibration_with_norm(0.0, 1.0);
        let high = NormativeTransformer::transform(Dimension::T1, 100.0, &calibration);
        let low = NormativeTransformer::transform(Dimension::T1, -100.0, &calibration);
        assert_eq!(high.t_score, 100.0);
        assert_eq!(low.t_score, 0.0);
    }

    #[test]
    fn higher_theta_always_yields_non_lower_percentile() {
        let calibration = calibration_with_norm(0.0, 15.0);
        let low = NormativeTransformer::transform(Dimension::T2, -5.0, &calibration);
        let high = NormativeTransformer::transform(Dimension::T2, 20.0, &calibration);
        assert!(high.percentile > low.percentile);
    }
}
