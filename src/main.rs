use anyhow::{bail, Context};
use clap::Parser;
use std::time::Duration;
use tracing::{info, warn};

use page_telemetry::simulator::{self, SimulationConfig};
use page_telemetry::{logging, CollectorConfig, MetricsCollector, RetryPolicy};

/// Plays synthetic portal page loads through the metrics collector and
/// reports them to an ingestion endpoint.
#[derive(Debug, Parser)]
#[command(name = "page-telemetry", version)]
struct Args {
    /// Metrics ingestion URL.
    #[arg(
        long,
        env = "PAGE_TELEMETRY_ENDPOINT",
        default_value = "http://127.0.0.1:8000/api/metrics/"
    )]
    endpoint: String,

    /// Anti-forgery token sent as X-CSRFToken.
    #[arg(long, env = "PAGE_TELEMETRY_CSRF_TOKEN")]
    csrf_token: Option<String>,

    /// Samples per category before a flush.
    #[arg(long, env = "PAGE_TELEMETRY_THRESHOLD", default_value_t = 10)]
    threshold: usize,

    /// Per-request timeout in milliseconds.
    #[arg(long, env = "PAGE_TELEMETRY_TIMEOUT_MS", default_value_t = 10_000)]
    timeout_ms: u64,

    /// Delivery attempts per flush, the first one included.
    #[arg(long, env = "PAGE_TELEMETRY_MAX_ATTEMPTS", default_value_t = 5)]
    max_attempts: u32,

    /// Number of page loads to simulate.
    #[arg(long, env = "PAGE_TELEMETRY_PAGE_VIEWS", default_value_t = 20)]
    page_views: u32,

    /// Chance (0–1) that a page throws an uncaught error.
    #[arg(long, env = "PAGE_TELEMETRY_ERROR_RATE", default_value_t = 0.3)]
    error_rate: f64,

    #[arg(long, env = "PAGE_TELEMETRY_SEED", default_value_t = 1000)]
    seed: u64,

    /// Pause between page loads in milliseconds.
    #[arg(long, env = "PAGE_TELEMETRY_THINK_TIME_MS", default_value_t = 0)]
    think_time_ms: u64,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();
    logging::init("info");

    if !(0.0..=1.0).contains(&args.error_rate) {
        bail!("--error-rate must be between 0 and 1");
    }

    // ── 1. Build the collector ──────────────────────────────────
    let config = CollectorConfig {
        endpoint: args.endpoint,
        csrf_token: args.csrf_token,
        threshold: args.threshold,
        request_timeout_ms: args.timeout_ms,
        retry: RetryPolicy {
            max_attempts: args.max_attempts,
            ..RetryPolicy::default()
        },
    };
    let collector = MetricsCollector::connect(config).context("invalid collector configuration")?;
    info!(
        endpoint = %collector.config().endpoint,
        threshold = collector.config().threshold,
        "collector ready"
    );

    // ── 2. Play the page session ────────────────────────────────
    let report = simulator::run(
        &collector,
        &SimulationConfig {
            page_views: args.page_views,
            error_rate: args.error_rate,
            seed: args.seed,
            think_time: Duration::from_millis(args.think_time_ms),
        },
    )
    .await;
    info!(
        page_views = report.page_views,
        performance_entries = report.performance_entries,
        resources = report.resources,
        errors = report.errors,
        "session finished"
    );

    // ── 3. Drain what is left ───────────────────────────────────
    collector.settle().await;
    for (category, result) in collector.flush_all().await {
        if let Err(err) = result {
            warn!(category = %category, error = %err, "final flush failed");
        }
    }

    let stats = collector.stats();
    info!(
        sent = stats.total_sent(),
        still_buffered = stats.total_buffered(),
        "done"
    );
    println!("{}", serde_json::to_string_pretty(&stats)?);

    Ok(())
}
