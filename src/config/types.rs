//! Core configuration types for batch runs

use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

use crate::harvest_engine::retry::RetryPolicy;

/// Everything one batch run needs to know before it touches the ledger
///
/// Only constructed through [`HarvestConfig::builder`], so every instance
/// has passed validation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HarvestConfig {
    /// Root of the `raw/`, `processed/` and `normalized/` trees
    pub(crate) data_dir: PathBuf,
    pub(crate) ledger_path: PathBuf,

    /// Codes per chunk; always > 0
    pub(crate) chunk_size: usize,
    /// Chunks in flight at once; always > 0
    pub(crate) max_parallel: usize,
    /// Hard ceiling on simultaneously leased browsers; always > 0
    pub(crate) pool_size: usize,
    pub(crate) acquire_timeout: Duration,
    /// Launch every browser before the first chunk instead of on demand
    pub(crate) prewarm: bool,

    /// Per-host spacing window, `min <= max`
    pub(crate) throttle_min_delay: Duration,
    pub(crate) throttle_max_delay: Duration,

    pub(crate) headless: bool,
    pub(crate) page_timeout: Duration,
    pub(crate) retry: RetryPolicy,
}
