//! tradestat-harvester: load HS codes, run batches, inspect progress

use std::path::{Path, PathBuf};
use std::sync::atomic::Ordering;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use tradestat_harvester::utils::{
    DEFAULT_ACQUIRE_TIMEOUT, DEFAULT_CHUNK_SIZE, DEFAULT_DATA_DIR, DEFAULT_MAX_PARALLEL_CHUNKS,
    DEFAULT_POOL_SIZE, DEFAULT_THROTTLE_MAX_DELAY, DEFAULT_THROTTLE_MIN_DELAY, LEDGER_FILE_NAME,
};
use tradestat_harvester::{HarvestConfig, ProgressLedger, chromium_runner, load_codes_from_path};

#[derive(Parser)]
#[command(name = "tradestat-harvester")]
#[command(about = "Resumable batch harvester for commodity-wise trade statistics")]
#[command(version)]
struct Cli {
    /// Root of the raw/processed/normalized output
    #[arg(long, global = true, env = "TRADESTAT_DATA_DIR", default_value = DEFAULT_DATA_DIR)]
    data_dir: PathBuf,

    /// Progress ledger file [default: <data-dir>/hs_codes.db]
    #[arg(long, global = true, env = "TRADESTAT_LEDGER")]
    ledger: Option<PathBuf>,

    /// Enable debug logging
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Add HS codes from a file (one per line) to the ledger
    Load {
        file: PathBuf,
    },

    /// Scrape every pending HS code once
    Run(RunArgs),

    /// Show ledger statistics
    Stats,

    /// Move failed codes and modes back to pending
    RequeueFailed,
}

#[derive(Args)]
struct RunArgs {
    /// HS codes per chunk
    #[arg(long, default_value_t = DEFAULT_CHUNK_SIZE)]
    chunk_size: usize,

    /// Chunks processed at the same time
    #[arg(long, default_value_t = DEFAULT_MAX_PARALLEL_CHUNKS)]
    max_parallel: usize,

    /// Pooled browser instances
    #[arg(long, default_value_t = DEFAULT_POOL_SIZE)]
    pool_size: usize,

    /// Seconds to wait for a free browser
    #[arg(long, value_parser = parse_secs, default_value_t = DEFAULT_ACQUIRE_TIMEOUT.as_secs_f64())]
    acquire_timeout: f64,

    /// Minimum seconds between requests to the portal
    #[arg(long, value_parser = parse_secs, default_value_t = DEFAULT_THROTTLE_MIN_DELAY.as_secs_f64())]
    min_delay: f64,

    /// Maximum seconds between requests to the portal
    #[arg(long, value_parser = parse_secs, default_value_t = DEFAULT_THROTTLE_MAX_DELAY.as_secs_f64())]
    max_delay: f64,

    /// Launch all browsers before the first chunk
    #[arg(long)]
    prewarm: bool,

    /// Show browser windows
    #[arg(long)]
    headed: bool,
}

fn parse_secs(raw: &str) -> Result<f64, String> {
    let secs: f64 = raw.parse().map_err(|e| format!("invalid number of seconds '{raw}': {e}"))?;
    if secs.is_finite() && secs >= 0.0 {
        Ok(secs)
    } else {
        Err(format!("seconds must be a non-negative number, got {raw}"))
    }
}

impl Cli {
    fn ledger_path(&self) -> PathBuf {
        self.ledger
            .clone()
            .unwrap_or_else(|| self.data_dir.join(LEDGER_FILE_NAME))
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let default_filter = if cli.verbose {
        "tradestat_harvester=debug"
    } else {
        "tradestat_harvester=info"
    };
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| default_filter.into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    match &cli.command {
        Commands::Load { file } => cmd_load(&cli, file).await,
        Commands::Run(args) => cmd_run(&cli, args).await,
        Commands::Stats => cmd_stats(&cli).await,
        Commands::RequeueFailed => cmd_requeue(&cli).await,
    }
}

async fn open_ledger(cli: &Cli) -> Result<ProgressLedger> {
    let path = cli.ledger_path();
    ProgressLedger::open(&path)
        .await
        .with_context(|| format!("Failed to open ledger at {}", path.display()))
}

async fn cmd_load(cli: &Cli, file: &Path) -> Result<()> {
    let (codes, report) = load_codes_from_path(file).await?;
    let ledger = open_ledger(cli).await?;
    let inserted = ledger.bulk_insert(&codes).await?;
    ledger.close().await;

    println!(
        "Loaded {} codes from {} ({} blank, {} invalid, {} duplicate lines skipped)",
        report.accepted,
        file.display(),
        report.blank,
        report.invalid,
        report.duplicate
    );
    println!(
        "{inserted} new ledger entries, {} already present",
        (codes.len() as u64).saturating_sub(inserted)
    );
    Ok(())
}

async fn cmd_run(cli: &Cli, args: &RunArgs) -> Result<()> {
    let config = HarvestConfig::builder()
        .data_dir(&cli.data_dir)
        .ledger_path(cli.ledger_path())
        .chunk_size(args.chunk_size)
        .max_parallel(args.max_parallel)
        .pool_size(args.pool_size)
        .acquire_timeout(Duration::from_secs_f64(args.acquire_timeout))
        .throttle(
            Duration::from_secs_f64(args.min_delay),
            Duration::from_secs_f64(args.max_delay),
        )
        .prewarm(args.prewarm)
        .headless(!args.headed)
        .build()?;
    info!("Effective configuration: {}", serde_json::to_string(&config)?);

    let ledger = open_ledger(cli).await?;
    let runner = chromium_runner(&config, ledger.clone()).await?;

    let cancel = runner.cancel_handle();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("Interrupt received: finishing in-flight codes, admitting no more");
            cancel.store(true, Ordering::Release);
        }
    });

    let result = runner.run().await;
    ledger.close().await;
    if let Some(summary) = runner.last_summary() {
        println!("{summary}");
    }
    result?;
    Ok(())
}

async fn cmd_stats(cli: &Cli) -> Result<()> {
    let ledger = open_ledger(cli).await?;
    let stats = ledger.stats().await?;
    ledger.close().await;
    println!("{stats}");
    Ok(())
}

async fn cmd_requeue(cli: &Cli) -> Result<()> {
    let ledger = open_ledger(cli).await?;
    let requeued = ledger.requeue_failed().await?;
    ledger.close().await;
    println!("Requeued {requeued} failed codes");
    Ok(())
}
