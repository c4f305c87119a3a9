//! Type-safe builder for `HarvestConfig` using the typestate pattern
//!
//! The data directory is the one required field; `build()` only exists once
//! it is set. Everything else falls back to the defaults in
//! [`crate::utils::constants`].

use std::marker::PhantomData;
use std::path::PathBuf;
use std::time::Duration;

use tracing::warn;

use super::types::HarvestConfig;
use crate::harvest_engine::errors::{HarvestError, HarvestResult};
use crate::harvest_engine::retry::RetryPolicy;
use crate::utils::{
    DEFAULT_ACQUIRE_TIMEOUT, DEFAULT_CHUNK_SIZE, DEFAULT_MAX_PARALLEL_CHUNKS, DEFAULT_PAGE_TIMEOUT,
    DEFAULT_POOL_SIZE, DEFAULT_THROTTLE_MAX_DELAY, DEFAULT_THROTTLE_MIN_DELAY, LEDGER_FILE_NAME,
};

// Type states for the builder
pub struct WithDataDir;

pub struct HarvestConfigBuilder<State = ()> {
    pub(crate) data_dir: Option<PathBuf>,
    pub(crate) ledger_path: Option<PathBuf>,
    pub(crate) chunk_size: usize,
    pub(crate) max_parallel: usize,
    pub(crate) pool_size: usize,
    pub(crate) acquire_timeout: Duration,
    pub(crate) prewarm: bool,
    pub(crate) throttle_min_delay: Duration,
    pub(crate) throttle_max_delay: Duration,
    pub(crate) headless: bool,
    pub(crate) page_timeout: Duration,
    pub(crate) retry: RetryPolicy,
    pub(crate) _phantom: PhantomData<State>,
}

impl Default for HarvestConfigBuilder<()> {
    fn default() -> Self {
        Self {
            data_dir: None,
            ledger_path: None,
            chunk_size: DEFAULT_CHUNK_SIZE,
            max_parallel: DEFAULT_MAX_PARALLEL_CHUNKS,
            pool_size: DEFAULT_POOL_SIZE,
            acquire_timeout: DEFAULT_ACQUIRE_TIMEOUT,
            prewarm: false,
            throttle_min_delay: DEFAULT_THROTTLE_MIN_DELAY,
            throttle_max_delay: DEFAULT_THROTTLE_MAX_DELAY,
            headless: true,
            page_timeout: DEFAULT_PAGE_TIMEOUT,
            retry: RetryPolicy::scraping(),
            _phantom: PhantomData,
        }
    }
}

impl HarvestConfig {
    /// Create a builder for configuring a `HarvestConfig` with a fluent interface
    #[must_use]
    pub fn builder() -> HarvestConfigBuilder<()> {
        HarvestConfigBuilder::default()
    }
}

impl HarvestConfigBuilder<()> {
    pub fn data_dir(self, dir: impl Into<PathBuf>) -> HarvestConfigBuilder<WithDataDir> {
        HarvestConfigBuilder {
            data_dir: Some(dir.into()),
            ledger_path: self.ledger_path,
            chunk_size: self.chunk_size,
            max_parallel: self.max_parallel,
            pool_size: self.pool_size,
            acquire_timeout: self.acquire_timeout,
            prewarm: self.prewarm,
            throttle_min_delay: self.throttle_min_delay,
            throttle_max_delay: self.throttle_max_delay,
            headless: self.headless,
            page_timeout: self.page_timeout,
            retry: self.retry,
            _phantom: PhantomData,
        }
    }
}

// Build method only available once the data directory is set
impl HarvestConfigBuilder<WithDataDir> {
    /// Validate and freeze the configuration
    ///
    /// # Errors
    /// `InvalidConfiguration` for a zero chunk size, pool size, parallelism
    /// or timeout, an inverted throttle window, or a retry base below 1.
    pub fn build(self) -> HarvestResult<HarvestConfig> {
        let data_dir = self
            .data_dir
            .ok_or_else(|| HarvestError::config("data_dir is required"))?;

        if self.chunk_size == 0 {
            return Err(HarvestError::config("chunk size must be positive"));
        }
        if self.pool_size == 0 {
            return Err(HarvestError::config("pool size must be positive"));
        }
        if self.max_parallel == 0 {
            return Err(HarvestError::config("max parallel chunks must be positive"));
        }
        if self.acquire_timeout.is_zero() || self.page_timeout.is_zero() {
            return Err(HarvestError::config("timeouts must be non-zero"));
        }
        if self.throttle_min_delay > self.throttle_max_delay {
            return Err(HarvestError::config(format!(
                "throttle min delay {:?} exceeds max delay {:?}",
                self.throttle_min_delay, self.throttle_max_delay
            )));
        }
        if !self.retry.exponential_base.is_finite() || self.retry.exponential_base < 1.0 {
            return Err(HarvestError::config(format!(
                "retry exponential base must be >= 1, got {}",
                self.retry.exponential_base
            )));
        }

        // Export and import of one code are fetched together
        if self.max_parallel.saturating_mul(2) > self.pool_size {
            warn!(
                "{} parallel chunks can request {} browsers at once but the pool holds {}; \
                 fetches will queue on acquire (timeout {:?})",
                self.max_parallel,
                self.max_parallel * 2,
                self.pool_size,
                self.acquire_timeout
            );
        }

        let ledger_path = self
            .ledger_path
            .unwrap_or_else(|| data_dir.join(LEDGER_FILE_NAME));

        Ok(HarvestConfig {
            data_dir,
            ledger_path,
            chunk_size: self.chunk_size,
            max_parallel: self.max_parallel,
            pool_size: self.pool_size,
            acquire_timeout: self.acquire_timeout,
            prewarm: self.prewarm,
            throttle_min_delay: self.throttle_min_delay,
            throttle_max_delay: self.throttle_max_delay,
            headless: self.headless,
            page_timeout: self.page_timeout,
            retry: self.retry,
        })
    }
}

// Methods available at any state
impl<State> HarvestConfigBuilder<State> {
    /// Ledger file; defaults to `<data_dir>/hs_codes.db`
    #[must_use]
    pub fn ledger_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.ledger_path = Some(path.into());
        self
    }

    #[must_use]
    pub fn chunk_size(mut self, size: usize) -> Self {
        self.chunk_size = size;
        self
    }

    #[must_use]
    pub fn max_parallel(mut self, chunks: usize) -> Self {
        self.max_parallel = chunks;
        self
    }

    #[must_use]
    pub fn pool_size(mut self, size: usize) -> Self {
        self.pool_size = size;
        self
    }

    #[must_use]
    pub fn acquire_timeout(mut self, timeout: Duration) -> Self {
        self.acquire_timeout = timeout;
        self
    }

    /// Launch all browsers up front
    #[must_use]
    pub fn prewarm(mut self, prewarm: bool) -> Self {
        self.prewarm = prewarm;
        self
    }

    /// Per-host spacing window; each wait draws uniformly from `[min, max]`
    #[must_use]
    pub fn throttle(mut self, min_delay: Duration, max_delay: Duration) -> Self {
        self.throttle_min_delay = min_delay;
        self.throttle_max_delay = max_delay;
        self
    }

    /// Set browser headless mode
    ///
    /// Headed mode needs a display server and is only useful when watching
    /// the portal interaction while debugging selectors.
    #[must_use]
    pub fn headless(mut self, headless: bool) -> Self {
        self.headless = headless;
        self
    }

    #[must_use]
    pub fn page_timeout(mut self, timeout: Duration) -> Self {
        self.page_timeout = timeout;
        self
    }

    #[must_use]
    pub fn retry(mut self, policy: RetryPolicy) -> Self {
        self.retry = policy;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::harvest_engine::errors::ErrorKind;

    #[test]
    fn defaults_fill_everything_but_the_data_dir() {
        let config = HarvestConfig::builder().data_dir("/tmp/th").build().unwrap();
        assert_eq!(config.chunk_size(), DEFAULT_CHUNK_SIZE);
        assert_eq!(config.pool_size(), DEFAULT_POOL_SIZE);
        assert_eq!(config.ledger_path(), PathBuf::from("/tmp/th").join(LEDGER_FILE_NAME));
        assert_eq!(config.retry(), &RetryPolicy::scraping());
        assert!(config.headless());
    }

    #[test]
    fn zero_sizes_are_rejected() {
        for builder in [
            HarvestConfig::builder().data_dir("d").chunk_size(0),
            HarvestConfig::builder().data_dir("d").pool_size(0),
            HarvestConfig::builder().data_dir("d").max_parallel(0),
        ] {
            let err = builder.build().unwrap_err();
            assert_eq!(err.kind(), ErrorKind::ConfigInvalid);
        }
    }

    #[test]
    fn inverted_throttle_window_is_rejected() {
        let err = HarvestConfig::builder()
            .data_dir("d")
            .throttle(Duration::from_secs(3), Duration::from_secs(1))
            .build()
            .unwrap_err();
        assert!(matches!(err, HarvestError::InvalidConfiguration(_)));
    }
}
