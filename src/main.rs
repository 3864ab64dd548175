// Quota Engine - Main Entry Point
//
// Command-line harness around the quota engine:
// - Evaluate requests against the configured tier tables
// - Run batches of requests concurrently
// - Inspect resolved service configurations
// - Serve Prometheus metrics

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use quota_engine::config::Config;
use quota_engine::metrics_server;
use quota_engine::quota::{
    AdminOps, BatchEvaluator, Clock, ConfigResolver, MemoryConfigStore, MemoryUsageStore, QuotaEngine,
    QuotaRequest, QuotaResponse, SystemClock,
};
use std::collections::BTreeSet;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{info, Level};
use tracing_subscriber::EnvFilter;

/// Quota Engine: per-service, per-tier admission control
#[derive(Parser, Debug)]
#[command(name = "quota-engine")]
#[command(version)]
#[command(about = "Multi-tenant quota engine with sliding window limits", long_about = None)]
struct Args {
    /// Enable verbose logging
    #[arg(short, long)]
    verbose: bool,

    /// Path to a TOML configuration file
    #[arg(short, long)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Evaluate one or more requests for a client
    Check {
        /// Service being rate limited
        #[arg(long)]
        service: String,

        /// Client identifier (e.g. "ip:1.2.3.4")
        #[arg(long)]
        client: String,

        /// Requested tier
        #[arg(long)]
        tier: Option<String>,

        /// Number of consecutive requests to evaluate
        #[arg(long, default_value_t = 1)]
        count: u32,
    },
    /// Evaluate a JSON array of requests concurrently
    Batch {
        /// Path to a JSON file containing an array of requests
        #[arg(long)]
        file: PathBuf,
    },
    /// Print every resolvable service configuration
    Configs,
    /// Serve Prometheus metrics
    ServeMetrics {
        /// Port to listen on (defaults to the configured metrics port)
        #[arg(long)]
        port: Option<u16>,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    let config = match &args.config {
        Some(path) => Config::load_from_path(path)?,
        None => Config::load()?,
    };

    init_tracing(&config, args.verbose);

    match args.command {
        Some(Commands::Check {
            service,
            client,
            tier,
            count,
        }) => {
            let mut request = QuotaRequest::new(service, client);
            request.tier = tier;
            check(&config, request, count).await?;
        }
        Some(Commands::Batch { file }) => {
            batch(&config, &file).await?;
        }
        Some(Commands::Configs) => {
            let configs = build_resolver(&config).list_all().await?;
            println!("{}", serde_json::to_string_pretty(&configs)?);
        }
        Some(Commands::ServeMetrics { port }) => {
            if !config.metrics.enabled {
                anyhow::bail!("Metrics are disabled in the configuration");
            }
            metrics_server::start_metrics_server(port.unwrap_or(config.metrics.port)).await?;
        }
        None => {
            info!("No command specified. Use \"quota-engine --help\" for usage.");
        }
    }

    Ok(())
}

/// Initialize tracing from the logging config; logs go to stderr
fn init_tracing(config: &Config, verbose: bool) {
    let level = if verbose {
        Level::DEBUG
    } else {
        config.log_level().unwrap_or(Level::INFO)
    };

    let builder = tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(
            EnvFilter::builder()
                .with_default_directive(level.into())
                .from_env_lossy(),
        );

    match config.logging.format.to_lowercase().as_str() {
        "json" => builder.json().init(),
        "pretty" => builder.pretty().init(),
        _ => builder.compact().init(),
    }
}

/// Resolver over an empty custom store and the configured default table
fn build_resolver(config: &Config) -> ConfigResolver {
    ConfigResolver::new(Arc::new(MemoryConfigStore::new()), config.default_table())
}

/// Engine over fresh in-memory stores, with the expiry sweeper running
fn build_engine(config: &Config) -> Arc<QuotaEngine> {
    let clock: Arc<dyn Clock> = Arc::new(SystemClock);
    let usage = MemoryUsageStore::new();
    let _sweeper = usage.spawn_eviction_task(clock.clone(), config.eviction_interval());

    let engine = QuotaEngine::new(build_resolver(config), Arc::new(usage), clock)
        .with_options(config.engine_options());
    Arc::new(engine)
}

/// Evaluate `count` consecutive requests, printing each response
async fn check(config: &Config, request: QuotaRequest, count: u32) -> Result<()> {
    let engine = build_engine(config);

    for _ in 0..count {
        let decision = engine
            .evaluate(&request)
            .await
            .with_context(|| format!("Failed to evaluate quota for {}", request.key()))?;
        println!("{}", serde_json::to_string(&decision.to_response())?);
    }

    Ok(())
}

/// Evaluate a file of requests; failed entries are answered by the failure policy
async fn batch(config: &Config, file: &Path) -> Result<()> {
    let content = fs::read_to_string(file)
        .with_context(|| format!("Failed to read batch file from {:?}", file))?;
    let requests: Vec<QuotaRequest> = serde_json::from_str(&content)
        .with_context(|| format!("Failed to parse batch file from {:?}", file))?;

    let engine = build_engine(config);

    let services: Vec<String> = requests
        .iter()
        .map(|r| r.service_id.clone())
        .collect::<BTreeSet<_>>()
        .into_iter()
        .collect();
    AdminOps::new(engine.clone())
        .preload_configurations(&services)
        .await;

    let results = BatchEvaluator::new(engine.clone())
        .evaluate_all_settled(&requests)
        .await;

    let policy = engine.failure_policy();
    let now = engine.now_millis();
    let responses: Vec<QuotaResponse> = requests
        .iter()
        .zip(results)
        .map(|(request, result)| policy.guard(request, now, result).to_response())
        .collect();

    println!("{}", serde_json::to_string_pretty(&responses)?);
    Ok(())
}
