//! Quartet CLI: generate balanced quartet blocks for a seed, or score a
//! previously exported blocks+responses file, without standing up the
//! HTTP server (spec.md §6).

use clap::{Parser, Subcommand};
use quartet_config::AppConfig;
use quartet_domain::{
    ArchetypeRules, BlockDesigner, BlockResponse, Calibration, OrchestratorConfig, QuartetBlock,
    ScoringOrchestrator, SessionStore, StatementRepository,
};
use quartet_storage::SqliteSessionStore;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::sync::Arc;
use tracing_subscriber::{EnvFilter, layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Parser)]
#[command(name = "quartet")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Enable verbose (debug-level) logging
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Generate a balanced set of quartet blocks for a seed and print them.
    GenerateBlocks {
        /// Number of quartet blocks to generate.
        #[arg(long)]
        block_count: Option<u32>,

        /// Deterministic seed; a random session id is used to derive one if omitted.
        #[arg(long)]
        seed: Option<u64>,

        /// Path to the statement pool JSON file.
        #[arg(long)]
        statement_pool: Option<PathBuf>,
    },

    /// Score a stored blocks+responses file and print the result.
    Score {
        /// Path to a JSON file with `{"blocks": [...], "responses": [...]}`.
        #[arg(long)]
        input: PathBuf,

        #[arg(long)]
        statement_pool: Option<PathBuf>,

        #[arg(long)]
        calibration: Option<PathBuf>,

        #[arg(long)]
        archetype_rules: Option<PathBuf>,
    },
}

#[derive(Debug, Deserialize, Serialize)]
struct ScoreInput {
    blocks: Vec<QuartetBlock>,
    responses: Vec<BlockResponse>,
}

fn init_tracing(verbose: bool) {
    let filter = if verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::new("warn")
    };
    tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer().with_target(false))
        .init();
}

fn build_orchestrator(
    statement_pool: Option<PathBuf>,
    calibration_path: Option<PathBuf>,
    archetype_rules_path: Option<PathBuf>,
) -> anyhow::Result<ScoringOrchestrator> {
    let config = AppConfig::from_env()?;

    let statements = StatementRepository::load(
        statement_pool.unwrap_or_else(|| PathBuf::from(&config.statement_pool_path)),
    )?;

    let calibration = calibration_path
        .or_else(|| Some(PathBuf::from(&config.calibration_path)))
        .and_then(|path| Calibration::load(path).ok())
        .unwrap_or_else(Calibration::uncalibrated);

    let archetype_rules = archetype_rules_path
        .or_else(|| Some(PathBuf::from(&config.archetype_rules_path)))
        .and_then(|path| ArchetypeRules::load(path).ok())
        .unwrap_or_else(ArchetypeRules::default_rules);

    let store: Arc<dyn SessionStore> = Arc::new(SqliteSessionStore::new(
        sqlx::SqlitePool::connect_lazy("sqlite::memory:")?,
    ));

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

    Ok(ScoringOrchestrator::new(
        statements,
        calibration,
        archetype_rules,
        store,
        orchestrator_config,
    ))
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    match cli.command {
        Commands::GenerateBlocks {
            block_count,
            seed,
            statement_pool,
        } => {
            let config = AppConfig::from_env()?;
            let statements = StatementRepository::load(
                statement_pool.unwrap_or_else(|| PathBuf::from(&config.statement_pool_path)),
            )?;
            let block_count = block_count.unwrap_or(config.default_block_count);
            let seed = seed.unwrap_or(0);
            let blocks = BlockDesigner::design(
                &statements,
                block_count,
                seed,
                config.social_desirability_tolerance,
                config.repair_budget,
            )?;
            println!("{}", serde_json::to_string_pretty(&blocks)?);
        }

        Commands::Score {
            input,
            statement_pool,
            calibration,
            archetype_rules,
        } => {
            let raw = std::fs::read_to_string(&input)?;
            let score_input: ScoreInput = serde_json::from_str(&raw)?;
            let orchestrator =
                build_orchestrator(statement_pool, calibration, archetype_rules)?;
            let result =
                orchestrator.score_standalone(&score_input.blocks, score_input.responses)?;
            println!("{}", serde_json::to_string_pretty(&result)?);
        }
    }

    Ok(())
}
