//! Configuration module for the Quartet scoring engine.

use serde::Deserialize;
use std::env;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Missing environment variable: {0}")]
    MissingVar(String),
    #[error("Invalid value for {0}: {1}")]
    InvalidValue(String, String),
}

/// Application configuration loaded from environment variables.
#[derive(Debug, Clone, Deserialize)]
pub struct AppConfig {
    /// Path to the sqlite session database file.
    pub session_db_path: String,
    /// Path to the statement pool JSON file.
    pub statement_pool_path: String,
    /// Path to the calibration bundle JSON file. Absent file path is valid;
    /// missing file at load time triggers the "uncalibrated" fallback.
    pub calibration_path: String,
    /// Path to the archetype rule table JSON file.
    pub archetype_rules_path: String,
    /// Address to bind the HTTP server to.
    pub bind_address: String,
    /// Session time-to-live, in seconds, from creation.
    pub session_ttl_seconds: i64,
    /// Default block count when the caller does not specify one.
    pub default_block_count: u32,
    /// Minimum permitted block count.
    pub min_block_count: u32,
    /// Maximum permitted block count.
    pub max_block_count: u32,
    /// Maximum social-desirability spread allowed within one block.
    pub social_desirability_tolerance: f64,
    /// Bounded number of local swap-repair attempts per slot.
    pub repair_budget: u32,
    /// Minimum answered-block coverage per dimension for scoring to proceed.
    pub min_coverage_per_dimension: u32,
    /// Optional suspicious-response-time bounds, in milliseconds.
    pub min_response_time_ms: Option<u32>,
    pub max_response_time_ms: Option<u32>,
    /// Maximum IRT optimizer iterations before falling back to the tally estimate.
    pub irt_max_iterations: u32,
    /// IRT optimizer convergence tolerance (gradient / step L2 norm).
    pub irt_tolerance: f64,
}

impl AppConfig {
    /// Load configuration from environment variables.
    pub fn from_env() -> Result<Self, ConfigError> {
        dotenvy::dotenv().ok();

        Ok(Self {
            session_db_path: env_var_or("SESSION_DB_PATH", "./data/sessions.db"),
            statement_pool_path: env_var_or(
                "STATEMENT_POOL_PATH",
                "./data/statement_pool.json",
            ),
            calibration_path: env_var_or("CALIBRATION_PATH", "./data/calibration.json"),
            archetype_rules_path: env_var_or(
                "ARCHETYPE_RULES_PATH",
                "./data/archetype_rules.json",
            ),
            bind_address: env_var_or("BIND_ADDRESS", "0.0.0.0:8080"),
            session_ttl_seconds: env_parse_or("SESSION_TTL_SECONDS", 7200)?,
            default_block_count: env_parse_or("DEFAULT_BLOCK_COUNT", 30)?,
            min_block_count: env_parse_or("MIN_BLOCK_COUNT", 5)?,
            max_block_count: env_parse_or("MAX_BLOCK_COUNT", 30)?,
            social_desirability_tolerance: env_parse_or(
                "SOCIAL_DESIRABILITY_TOLERANCE",
                1.5,
            )?,
            repair_budget: env_parse_or("REPAIR_BUDGET", 200)?,
            min_coverage_per_dimension: env_parse_or("MIN_COVERAGE_PER_DIMENSION", 3)?,
            min_response_time_ms: env_parse_opt("MIN_RESPONSE_TIME_MS")?,
            max_response_time_ms: env_parse_opt("MAX_RESPONSE_TIME_MS")?,
            irt_max_iterations: env_parse_or("IRT_MAX_ITERATIONS", 100)?,
            irt_tolerance: env_parse_or("IRT_TOLERANCE", 1e-6)?,
        })
    }
}

fn env_var_or(name: &str, default: &str) -> String {
    env::var(name).unwrap_or_else(|_| default.to_string())
}

fn env_parse_or<T>(name: &str, default: T) -> Result<T, ConfigError>
where
    T: std::str::FromStr,
{
    match env::var(name) {
        Ok(raw) => raw
            .parse()
            .map_err(|_| ConfigError::InvalidValue(name.to_string(), raw)),
        Err(_) => Ok(default),
    }
}

fn env_parse_opt<T>(name: &str) -> Result<Option<T>, ConfigError>
where
    T: std::str::FromStr,
{
    match env::var(name) {
        Ok(raw) => raw
            .parse()
            .map(Some)
            .map_err(|_| ConfigError::InvalidValue(name.to_string(), raw)),
        Err(_) => Ok(None),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_env_var_or_uses_default() {
        let val = env_var_or("NON_EXISTENT_VAR_12345", "default_value");
        assert_eq!(val, "default_value");
    }

    #[test]
    fn test_env_parse_or_rejects_bad_value() {
        // SAFETY: test is single-threaded with respect to this var.
        unsafe {
            env::set_var("QUARTET_TEST_BAD_INT", "not-a-number");
        }
        let result: Result<u32, ConfigError> = env_parse_or("QUARTET_TEST_BAD_INT", 1);
        assert!(matches!(result, Err(ConfigError::InvalidValue(_, _))));
        unsafe {
            env::remove_var("QUARTET_TEST_BAD_INT");
        }
    }
}
