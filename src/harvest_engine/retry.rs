//! Bounded retry with exponential backoff and jitter
//!
//! Delay for attempt `k` (0-indexed) is `min(initial * base^k, max)`,
//! scaled by a uniform factor in `[0.5, 1.5)` when jitter is enabled.

use std::future::Future;
use std::time::Duration;

use log::{error, warn};
use rand::Rng;
use serde::{Deserialize, Serialize};

use super::errors::HarvestResult;

/// Retry parameters for one class of operation
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct RetryPolicy {
    pub max_retries: u32,
    pub initial_delay: Duration,
    pub max_delay: Duration,
    pub exponential_base: f64,
    pub jitter: bool,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: 3,
            initial_delay: Duration::from_secs(1),
            max_delay: Duration::from_secs(60),
            exponential_base: 2.0,
            jitter: true,
        }
    }
}

impl RetryPolicy {
    /// Page interaction against the portal
    #[must_use]
    pub fn scraping() -> Self {
        Self {
            max_retries: 3,
            initial_delay: Duration::from_secs(2),
            max_delay: Duration::from_secs(30),
            ..Self::default()
        }
    }

    /// Plain network calls
    #[must_use]
    pub fn network() -> Self {
        Self {
            max_retries: 5,
            initial_delay: Duration::from_secs(1),
            max_delay: Duration::from_secs(60),
            ..Self::default()
        }
    }

    /// Local or remote storage writes
    #[must_use]
    pub fn storage() -> Self {
        Self {
            max_retries: 2,
            initial_delay: Duration::from_millis(500),
            max_delay: Duration::from_secs(10),
            ..Self::default()
        }
    }

    /// Same policy without jitter
    #[must_use]
    pub fn without_jitter(mut self) -> Self {
        self.jitter = false;
        self
    }

    /// Total number of attempts, first try included
    #[must_use]
    pub fn max_attempts(&self) -> u32 {
        self.max_retries.saturating_add(1)
    }

    /// Pre-jitter delay after failed attempt `attempt`
    #[must_use]
    pub fn base_delay(&self, attempt: u32) -> Duration {
        let exp = i32::try_from(attempt).unwrap_or(i32::MAX);
        let secs = self.initial_delay.as_secs_f64() * self.exponential_base.powi(exp);
        let capped = secs.min(self.max_delay.as_secs_f64());
        if capped.is_finite() && capped >= 0.0 {
            Duration::from_secs_f64(capped)
        } else {
            self.max_delay
        }
    }

    /// Delay after failed attempt `attempt`, jitter applied
    #[must_use]
    pub fn delay_for(&self, attempt: u32) -> Duration {
        let base = self.base_delay(attempt);
        if self.jitter {
            let factor: f64 = rand::rng().random_range(0.5..1.5);
            base.mul_f64(factor)
        } else {
            base
        }
    }

    /// Run `op` until it succeeds, fails with a non-retryable error, or
    /// the retry budget is spent
    ///
    /// The last error is always returned to the caller.
    pub async fn run<T, F, Fut>(&self, op_name: &str, mut op: F) -> HarvestResult<T>
    where
        F: FnMut(u32) -> Fut,
        Fut: Future<Output = HarvestResult<T>>,
    {
        let attempts = self.max_attempts();
        let mut attempt = 0;

        loop {
            match op(attempt).await {
                Ok(value) => return Ok(value),
                Err(e) if !e.is_retryable() => {
                    warn!("{op_name}: non-retryable failure on attempt {}: {e}", attempt + 1);
                    return Err(e);
                }
                Err(e) if attempt + 1 >= attempts => {
                    error!("{op_name}: all {attempts} attempts failed. Last error: {e}");
                    return Err(e);
                }
                Err(e) => {
                    let delay = self.delay_for(attempt);
                    warn!(
                        "{op_name}: attempt {}/{attempts} failed: {e}. Retrying in {:.2}s...",
                        attempt + 1,
                        delay.as_secs_f64()
                    );
                    tokio::time::sleep(delay).await;
                    attempt += 1;
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn presets_match_operation_classes() {
        let s = RetryPolicy::scraping();
        assert_eq!(
            (s.max_retries, s.initial_delay, s.max_delay),
            (3, Duration::from_secs(2), Duration::from_secs(30))
        );
        let n = RetryPolicy::network();
        assert_eq!(
            (n.max_retries, n.initial_delay, n.max_delay),
            (5, Duration::from_secs(1), Duration::from_secs(60))
        );
        let st = RetryPolicy::storage();
        assert_eq!(
            (st.max_retries, st.initial_delay, st.max_delay),
            (2, Duration::from_millis(500), Duration::from_secs(10))
        );
    }

    #[test]
    fn base_delay_grows_then_caps() {
        let p = RetryPolicy::scraping();
        assert_eq!(p.base_delay(0), Duration::from_secs(2));
        assert_eq!(p.base_delay(1), Duration::from_secs(4));
        assert_eq!(p.base_delay(3), Duration::from_secs(16));
        assert_eq!(p.base_delay(4), Duration::from_secs(30));
        assert_eq!(p.base_delay(60), Duration::from_secs(30));
    }

    #[test]
    fn jittered_delay_stays_in_band() {
        let p = RetryPolicy::network();
        for k in 0..8 {
            let base = p.base_delay(k).as_secs_f64();
            for _ in 0..50 {
                let d = p.delay_for(k).as_secs_f64();
                assert!(d >= base * 0.5 - 1e-9 && d <= base * 1.5 + 1e-9);
            }
        }
    }
}
