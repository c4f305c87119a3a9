//! Per-host request spacing
//!
//! Every host gets its own async slot holding the time of its last request.
//! The slot map is behind a single mutex; each slot is held across the
//! sleep so callers for the same host queue up, while other hosts proceed.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use log::{debug, info};
use parking_lot::Mutex;
use rand::Rng;
use tokio::time::Instant;

use super::errors::{HarvestError, HarvestResult};

type HostSlot = Arc<tokio::sync::Mutex<Option<Instant>>>;

/// Enforces a jittered minimum gap between requests to the same host
#[derive(Debug)]
pub struct RequestThrottler {
    min_delay: Duration,
    max_delay: Duration,
    last_request: Mutex<HashMap<String, HostSlot>>,
}

impl RequestThrottler {
    /// # Errors
    /// `InvalidConfiguration` when `min_delay > max_delay`.
    pub fn new(min_delay: Duration, max_delay: Duration) -> HarvestResult<Self> {
        if min_delay > max_delay {
            return Err(HarvestError::config(format!(
                "throttle min_delay {min_delay:?} exceeds max_delay {max_delay:?}"
            )));
        }
        Ok(Self {
            min_delay,
            max_delay,
            last_request: Mutex::new(HashMap::new()),
        })
    }

    #[must_use]
    pub fn min_delay(&self) -> Duration {
        self.min_delay
    }

    #[must_use]
    pub fn max_delay(&self) -> Duration {
        self.max_delay
    }

    fn slot(&self, host: &str) -> HostSlot {
        let mut map = self.last_request.lock();
        Arc::clone(map.entry(host.to_string()).or_default())
    }

    fn pick_delay(&self) -> Duration {
        if self.min_delay == self.max_delay {
            return self.min_delay;
        }
        let secs = rand::rng().random_range(self.min_delay.as_secs_f64()..=self.max_delay.as_secs_f64());
        Duration::from_secs_f64(secs)
    }

    /// Wait until a request to `host` is allowed, then record it
    pub async fn wait(&self, host: &str) {
        let slot = self.slot(host);
        let mut last = slot.lock().await;
        let delay = self.pick_delay();

        if let Some(prev) = *last {
            let elapsed = prev.elapsed();
            if elapsed < delay {
                let remaining = delay - elapsed;
                debug!("Throttling {host}: sleeping {:.2}s", remaining.as_secs_f64());
                tokio::time::sleep(remaining).await;
            }
        }

        *last = Some(Instant::now());
    }

    /// Wait for the host behind `url`; URLs without a host share one slot
    pub async fn wait_for_url(&self, url: &str) {
        let host = host_of(url).unwrap_or_default();
        self.wait(&host).await;
    }

    /// Unconditional sleep after an explicit rate-limit signal
    pub async fn wait_on_rate_limit(&self, retry_after: Duration) {
        info!("Rate limited. Waiting {:.1}s before next request", retry_after.as_secs_f64());
        tokio::time::sleep(retry_after).await;
    }

    /// Number of hosts seen so far
    #[must_use]
    pub fn tracked_hosts(&self) -> usize {
        self.last_request.lock().len()
    }
}

/// Host part of a URL, lowercased
#[must_use]
pub fn host_of(url: &str) -> Option<String> {
    url::Url::parse(url)
        .ok()
        .and_then(|u| u.host_str().map(str::to_ascii_lowercase))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rejects_inverted_window() {
        let err = RequestThrottler::new(Duration::from_secs(3), Duration::from_secs(1)).unwrap_err();
        assert_eq!(err.kind(), super::super::errors::ErrorKind::ConfigInvalid);
    }

    #[test]
    fn host_extraction() {
        assert_eq!(
            host_of("https://TradeStat.commerce.gov.in/eidb/commodity_wise_export").as_deref(),
            Some("tradestat.commerce.gov.in")
        );
        assert_eq!(host_of("not a url"), None);
    }

    #[tokio::test(start_paused = true)]
    async fn first_request_is_not_delayed() {
        let t = RequestThrottler::new(Duration::from_secs(2), Duration::from_secs(2)).unwrap();
        let start = Instant::now();
        t.wait("a.example").await;
        assert!(start.elapsed() < Duration::from_millis(10));
        assert_eq!(t.tracked_hosts(), 1);
    }
}
