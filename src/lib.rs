//! Resumable batch harvester for commodity-wise trade statistics
//!
//! HS codes are loaded into a SQLite progress ledger, dispatched in chunks
//! across a fixed pool of headless browsers, scraped per trade mode and run
//! through a raw → processed → normalized JSON pipeline.

pub mod browser_pool;
pub mod browser_profile;
pub mod browser_setup;
pub mod config;
pub mod harvest_engine;
pub mod ledger;
pub mod pipeline;
pub mod scrape_task;
pub mod utils;
pub mod work_source;

use std::sync::Arc;

use log::warn;

pub use browser_pool::{PoolLease, PoolStats, ResourceFactory, ResourcePool};
pub use browser_setup::{BrowserPool, ChromiumLauncher, PooledBrowser, find_browser_executable};
pub use config::HarvestConfig;
pub use harvest_engine::{
    BatchRunner, ErrorKind, HarvestError, HarvestResult, ItemOutcome, LogProgress, NoOpProgress,
    ProgressReporter, RequestThrottler, RetryPolicy, RunPhase, RunSummary,
};
pub use ledger::{FailureScope, ItemStatus, LedgerEntry, LedgerStats, ProgressLedger};
pub use pipeline::{NormalizedRow, ProcessedRecord, RawPayload, StageOutputs, TransformPipeline};
pub use scrape_task::{ScrapeTask, TradeMode, TradestatScrapeTask};
pub use work_source::{HsCode, LoadReport, chunk_items, load_codes_from_path, parse_codes};

/// Batch runner backed by pooled Chromium and the portal scrape task
pub type ChromiumRunner = BatchRunner<ChromiumLauncher, TradestatScrapeTask>;

/// Wire the production runner for `config`
///
/// Resolves the browser binary (downloading one if needed) but launches
/// nothing; browsers start on first demand or on pre-warm.
pub async fn chromium_runner(config: &HarvestConfig, ledger: ProgressLedger) -> HarvestResult<ChromiumRunner> {
    if let Err(e) = browser_profile::cleanup_stale_profiles() {
        warn!("Stale profile cleanup failed: {e:#}");
    }

    let throttler = Arc::new(RequestThrottler::new(
        config.throttle_min_delay(),
        config.throttle_max_delay(),
    )?);
    let launcher = ChromiumLauncher::discover(config.headless(), config.page_timeout()).await?;
    let pool = ResourcePool::new(launcher, config.pool_size())?;
    let task = Arc::new(
        TradestatScrapeTask::new(Arc::clone(&throttler)).with_page_timeout(config.page_timeout()),
    );

    Ok(BatchRunner::new(config, pool, task, throttler, ledger).with_progress(Arc::new(LogProgress)))
}
