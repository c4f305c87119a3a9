//! Getter methods for `HarvestConfig`

use std::path::Path;
use std::time::Duration;

use super::types::HarvestConfig;
use crate::harvest_engine::retry::RetryPolicy;

impl HarvestConfig {
    #[must_use]
    pub fn data_dir(&self) -> &Path {
        &self.data_dir
    }

    #[must_use]
    pub fn ledger_path(&self) -> &Path {
        &self.ledger_path
    }

    #[must_use]
    pub fn chunk_size(&self) -> usize {
        self.chunk_size
    }

    #[must_use]
    pub fn max_parallel(&self) -> usize {
        self.max_parallel
    }

    #[must_use]
    pub fn pool_size(&self) -> usize {
        self.pool_size
    }

    #[must_use]
    pub fn acquire_timeout(&self) -> Duration {
        self.acquire_timeout
    }

    #[must_use]
    pub fn prewarm(&self) -> bool {
        self.prewarm
    }

    #[must_use]
    pub fn throttle_min_delay(&self) -> Duration {
        self.throttle_min_delay
    }

    #[must_use]
    pub fn throttle_max_delay(&self) -> Duration {
        self.throttle_max_delay
    }

    #[must_use]
    pub fn headless(&self) -> bool {
        self.headless
    }

    #[must_use]
    pub fn page_timeout(&self) -> Duration {
        self.page_timeout
    }

    #[must_use]
    pub fn retry(&self) -> &RetryPolicy {
        &self.retry
    }
}
