//! Quartet Scoring Server

use std::sync::Arc;
use std::time::Instant;

use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use quartet_api::{AppState, build_router};
use quartet_config::AppConfig;
use quartet_domain::{
    ArchetypeRules, Calibration, OrchestratorConfig, ScoringOrchestrator, StatementRepository,
};
use quartet_storage::{SqliteSessionStore, create_pool, run_migrations};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info,sqlx=warn".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    tracing::info!("Starting Quartet scoring server...");

    let config = AppConfig::from_env()?;
    tracing::info!("Binding to {}", config.bind_address);

    let pool = create_pool(&config.session_db_path).await?;
    tracing::info!("Session database pool created at {}", config.session_db_path);

    run_migrations(&pool).await?;
    tracing::info!("Database migrations complete");

    let statements = StatementRepository::load(&config.statement_pool_path)?;
    tracing::info!(count = statements.len(), "statement pool loaded");

    let calibration = match Calibration::load(&config.calibration_path) {
        Ok(calibration) => calibration,
        Err(err) => {
            tracing::warn!(
                error = %err,
                path = %config.calibration_path,
                "no calibration bundle found, falling back to uncalibrated norms"
            );
            Calibration::uncalibrated()
        }
    };

    let archetype_rules = ArchetypeRules::load(&config.archetype_rules_path)
        .unwrap_or_else(|_| ArchetypeRules::default_rules());

    let store = Arc::new(SqliteSessionStore::new(pool.clone()));
    let orchestrator_config = OrchestratorConfig {
        default_block_count: config.default_block_count,
        min_block_count: config.min_block_count,
        max_block_count: config.max_block_count,
        social_desirability_tolerance: config.social_desirability_tolerance,
        repair_budget: config.repair_budget,
        min_coverage_per_dimension: config.min_coverage_per_dimension,
        min_response_time_ms: config.min_response_time_ms,
        max_response_time_ms: config.max_response_time_ms,
        irt_max_iterations: config.irt_max_iterations,
        irt_tolerance: config.irt_tolerance,
        session_ttl_seconds: config.session_ttl_seconds,
    };
    let orchestrator = Arc::new(ScoringOrchestrator::new(
        statements,
        calibration,
        archetype_rules,
        store,
        orchestrator_config,
    ));

    let state = Arc::new(AppState {
        pool,
        orchestrator,
        config: config.clone(),
        start_time: Instant::now(),
    });

    let app = build_router(state);

    let listener = tokio::net::TcpListener::bind(&config.bind_address).await?;
    tracing::info!("Server listening on {}", config.bind_address);

    axum::serve(listener, app).await?;

    Ok(())
}
