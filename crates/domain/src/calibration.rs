//! Calibration bundle: item parameters, θ prior and per-dimension norm
//! statistics produced by an offline calibration study. Process-wide
//! immutable configuration, loaded once at startup (spec.md §3, §4.5, §4.6).

use crate::Dimension;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::Path;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum CalibrationError {
    #[error("failed to read calibration file {path}: {source}")]
    Read {
        path: String,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to parse calibration file {path}: {source}")]
    Parse {
        path: String,
        #[source]
        source: serde_json::Error,
    },
    #[error("calibration is missing norm parameters for dimension {0}")]
    MissingNorm(Dimension),
}

/// Per-dimension normative reference (mean/sd of the calibration population's θ).
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct NormParams {
    pub mean: f64,
    pub sd: f64,
}

/// Statement-level calibration overrides. Factor loading normally lives on
/// the `Statement` record itself; this lets a calibration study override
/// residual variance per statement without mutating the statement pool.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct StatementParams {
    pub residual_variance: f64,
}

impl Default for StatementParams {
    fn default() -> Self {
        Self {
            residual_variance: 1.0,
        }
    }
}

/// Process-wide immutable calibration bundle.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Calibration {
    /// Residual variance applied to every statement unless overridden below.
    pub default_residual_variance: f64,
    /// Per-statement residual-variance overrides, keyed by statement_id.
    #[serde(default)]
    pub statement_overrides: BTreeMap<String, StatementParams>,
    /// Diagonal variance of the zero-mean θ prior (identity covariance scaled
    /// by this factor).
    pub theta_prior_variance: f64,
    pub norms: BTreeMap<Dimension, NormParams>,
    pub algorithm_version: String,
    pub calibration_version: String,
}

impl Calibration {
    /// Load a calibration bundle from a JSON file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, CalibrationError> {
        let path_ref = path.as_ref();
        let raw =
            std::fs::read_to_string(path_ref).map_err(|source| CalibrationError::Read {
                path: path_ref.display().to_string(),
                source,
            })?;
        let calibration: Calibration =
            serde_json::from_str(&raw).map_err(|source| CalibrationError::Parse {
                path: path_ref.display().to_string(),
                source,
            })?;
        for dimension in Dimension::ALL {
            if !calibration.norms.contains_key(&dimension) {
                return Err(CalibrationError::MissingNorm(dimension));
            }
        }
        Ok(calibration)
    }

    /// The fixed reference norm used when no calibration bundle is
    /// available (spec.md §4.6: "bootstrapping a new instrument").
    pub fn uncalibrated() -> Self {
        let norms = Dimension::ALL
            .into_iter()
            .map(|d| (d, NormParams { mean: 0.0, sd: 15.0 }))
            .collect();
        Self {
            default_residual_variance: 1.0,
            statement_overrides: BTreeMap::new(),
            theta_prior_variance: 1.0,
            norms,
            algorithm_version: "4.0.0-alpha".to_string(),
            calibration_version: "uncalibrated".to_string(),
        }
    }

    pub fn is_calibrated(&self) -> bool {
        self.calibration_version != "uncalibrated"
    }

    pub fn residual_variance(&self, statement_id: &str) -> f64 {
        self.statement_overrides
            .get(statement_id)
            .map(|p| p.residual_variance)
            .unwrap_or(self.default_residual_variance)
    }

    pub fn norm(&self, dimension: Dimension) -> NormParams {
        self.norms
            .get(&dimension)
            .copied()
            .unwrap_or(NormParams { mean: 0.0, sd: 1.0 })
    }
}
