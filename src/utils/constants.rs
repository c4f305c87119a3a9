//! Shared configuration constants for the harvester
//!
//! Default values and portal constants used throughout the codebase so that
//! the CLI, the config builder and the tests agree on the same numbers.

use std::time::Duration;

/// Default number of HS codes per chunk
///
/// Matches the batch size the portal tolerated in long unattended runs.
pub const DEFAULT_CHUNK_SIZE: usize = 20;

/// Default number of chunks admitted at the same time
///
/// Each in-flight item fetches both modes at once, so two chunks saturate
/// the default pool exactly.
pub const DEFAULT_MAX_PARALLEL_CHUNKS: usize = 2;

/// Default number of pooled browser instances
///
/// This is the hard ceiling on simultaneously running scrape tasks.
pub const DEFAULT_POOL_SIZE: usize = 4;

/// How long `acquire` waits for a free browser before giving up
pub const DEFAULT_ACQUIRE_TIMEOUT: Duration = Duration::from_secs(30);

/// Lower bound of the randomized per-host request spacing
pub const DEFAULT_THROTTLE_MIN_DELAY: Duration = Duration::from_millis(1500);

/// Upper bound of the randomized per-host request spacing
pub const DEFAULT_THROTTLE_MAX_DELAY: Duration = Duration::from_millis(3000);

/// Wait applied when the portal signals rate limiting without a hint
pub const DEFAULT_RATE_LIMIT_WAIT: Duration = Duration::from_secs(60);

/// Timeout for navigation and element waits inside a scrape task
pub const DEFAULT_PAGE_TIMEOUT: Duration = Duration::from_secs(120);

/// Timeout for the results table to render after a form submit
pub const TABLE_WAIT_TIMEOUT: Duration = Duration::from_secs(60);

/// Default root for raw/processed/normalized output
pub const DEFAULT_DATA_DIR: &str = "./data";

/// Ledger file name inside the data directory
pub const LEDGER_FILE_NAME: &str = "hs_codes.db";

/// Host all portal requests are throttled against
pub const PORTAL_HOST: &str = "tradestat.commerce.gov.in";

/// Report page for commodity-wise exports to all countries
pub const EXPORT_REPORT_URL: &str =
    "https://tradestat.commerce.gov.in/eidb/commodity_wise_all_countries_export";

/// Report page for commodity-wise imports from all countries
pub const IMPORT_REPORT_URL: &str =
    "https://tradestat.commerce.gov.in/eidb/commodity_wise_all_countries_import";

/// Schema version stamped on every processed record
pub const SCHEMA_VERSION: &str = "v1";

/// Transform pipeline version stamped on processed and normalized records
pub const PIPELINE_VERSION: &str = "1.0.0";

/// Chrome user agent string presented by pooled browsers
pub const CHROME_USER_AGENT: &str = "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/132.0.6834.160 Safari/537.36";
