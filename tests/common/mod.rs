//! Fakes and fixtures shared by the integration tests

#![allow(dead_code)]

use std::collections::{BTreeMap, HashMap, HashSet, VecDeque};
use std::path::Path;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::{Duration, Instant};

use async_trait::async_trait;
use chrono::{DateTime, FixedOffset, TimeZone};
use parking_lot::Mutex;

use tradestat_harvester::pipeline::{RawPayload, YearBlock};
use tradestat_harvester::scrape_task::{assemble_payload, map_rows};
use tradestat_harvester::utils::ist;
use tradestat_harvester::{
    HarvestConfig, HarvestError, HarvestResult, HsCode, ResourceFactory, RetryPolicy, ScrapeTask,
    TradeMode,
};

pub const YEARS: [&str; 2] = ["2023-2024", "2024-2025"];
pub const PARTNERS: [&str; 3] = ["Nepal", "United States", "Bangladesh"];

/// Capture time used by every fixture payload
pub fn capture_time() -> DateTime<FixedOffset> {
    ist().with_ymd_and_hms(2025, 3, 14, 10, 30, 0).unwrap()
}

/// Two years × three partners, every value carrying thousands separators
pub fn sample_payload(code: &HsCode, mode: TradeMode) -> RawPayload {
    let data_by_year: BTreeMap<String, YearBlock> = YEARS
        .iter()
        .map(|year| {
            let rows: Vec<Vec<String>> = PARTNERS
                .iter()
                .enumerate()
                .map(|(i, country)| {
                    vec![
                        (i + 1).to_string(),
                        (*country).to_string(),
                        "12,345.6".to_string(),
                        " 1,234 ".to_string(),
                        "-3.5".to_string(),
                    ]
                })
                .collect();
            let block = YearBlock {
                product_label: Some("T-SHIRTS, SINGLETS AND OTHER VESTS, KNITTED".to_string()),
                partner_countries: map_rows(&rows, year),
                summary: None,
                total_pages: 1,
            };
            ((*year).to_string(), block)
        })
        .collect();

    assemble_payload(
        code,
        mode,
        mode.report_url(),
        capture_time(),
        Duration::from_secs(3),
        data_by_year,
    )
}

pub fn code(raw: &str) -> HsCode {
    raw.parse().unwrap()
}

/// Retry policy with millisecond delays
pub fn fast_retry(max_retries: u32) -> RetryPolicy {
    RetryPolicy {
        max_retries,
        initial_delay: Duration::from_millis(1),
        max_delay: Duration::from_millis(5),
        exponential_base: 2.0,
        jitter: false,
    }
}

pub fn test_config(data_dir: &Path, pool_size: usize, max_parallel: usize, chunk_size: usize) -> HarvestConfig {
    HarvestConfig::builder()
        .data_dir(data_dir)
        .chunk_size(chunk_size)
        .max_parallel(max_parallel)
        .pool_size(pool_size)
        .acquire_timeout(Duration::from_secs(5))
        .throttle(Duration::ZERO, Duration::ZERO)
        .retry(fast_retry(1))
        .build()
        .unwrap()
}

// =============================================================================
// Resource factory
// =============================================================================

#[derive(Debug)]
pub struct FakeResource {
    pub id: u64,
}

#[derive(Debug, Default)]
pub struct FactoryCounters {
    pub launched: AtomicUsize,
    pub closed: AtomicUsize,
    pub unhealthy: Mutex<HashSet<u64>>,
}

impl FactoryCounters {
    pub fn launched(&self) -> usize {
        self.launched.load(Ordering::SeqCst)
    }

    pub fn closed(&self) -> usize {
        self.closed.load(Ordering::SeqCst)
    }
}

#[derive(Debug, Clone, Default)]
pub struct FakeFactory {
    pub counters: Arc<FactoryCounters>,
}

#[async_trait]
impl ResourceFactory for FakeFactory {
    type Resource = FakeResource;

    async fn launch(&self, id: u64) -> HarvestResult<FakeResource> {
        self.counters.launched.fetch_add(1, Ordering::SeqCst);
        Ok(FakeResource { id })
    }

    async fn is_healthy(&self, resource: &FakeResource) -> bool {
        !self.counters.unhealthy.lock().contains(&resource.id)
    }

    async fn close(&self, _resource: FakeResource) -> HarvestResult<()> {
        self.counters.closed.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

// =============================================================================
// Scrape task
// =============================================================================

/// Scripted behaviour for one (code, mode) pair
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Script {
    Succeed,
    /// Transient failure on every attempt
    FailAlways,
    /// Transient failure on the first `n` attempts
    FailTimes(u32),
    /// Payload that cannot pass the process stage
    Malformed,
    /// Rate-limit signal with the given wait hint on the first attempt
    RateLimitedOnce(Duration),
}

#[derive(Debug, Default)]
pub struct FakeScrapeTask {
    scripts: Mutex<HashMap<(String, TradeMode), Script>>,
    calls: Mutex<HashMap<(String, TradeMode), u32>>,
    delay: Duration,
    /// Per-call delays consumed in call order before `delay` applies
    delays: Mutex<VecDeque<Duration>>,
    starts: Mutex<Vec<Instant>>,
    active: AtomicUsize,
    max_active: AtomicUsize,
}

impl FakeScrapeTask {
    pub fn with_delay(delay: Duration) -> Self {
        Self {
            delay,
            ..Self::default()
        }
    }

    pub fn with_delays(delays: impl IntoIterator<Item = Duration>) -> Self {
        Self {
            delays: Mutex::new(delays.into_iter().collect()),
            ..Self::default()
        }
    }

    pub fn script(&self, code: &str, mode: TradeMode, script: Script) {
        self.scripts.lock().insert((code.to_string(), mode), script);
    }

    pub fn calls(&self, code: &str, mode: TradeMode) -> u32 {
        self.calls
            .lock()
            .get(&(code.to_string(), mode))
            .copied()
            .unwrap_or(0)
    }

    pub fn total_calls(&self) -> u32 {
        self.calls.lock().values().sum()
    }

    /// Gaps between consecutive scrape starts, in start order
    pub fn start_gaps(&self) -> Vec<Duration> {
        let mut starts = self.starts.lock().clone();
        starts.sort();
        starts.windows(2).map(|w| w[1] - w[0]).collect()
    }

    /// Highest number of scrapes observed running at once
    pub fn max_active(&self) -> usize {
        self.max_active.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl ScrapeTask for FakeScrapeTask {
    type Resource = FakeResource;

    async fn run(&self, _resource: &FakeResource, code: &HsCode, mode: TradeMode) -> HarvestResult<RawPayload> {
        let key = (code.to_string(), mode);
        let attempt = {
            let mut calls = self.calls.lock();
            let n = calls.entry(key.clone()).or_insert(0);
            *n += 1;
            *n
        };
        let script = self.scripts.lock().get(&key).copied().unwrap_or(Script::Succeed);

        self.starts.lock().push(Instant::now());
        let now = self.active.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_active.fetch_max(now, Ordering::SeqCst);
        let delay = self.delays.lock().pop_front().unwrap_or(self.delay);
        if !delay.is_zero() {
            tokio::time::sleep(delay).await;
        }
        self.active.fetch_sub(1, Ordering::SeqCst);

        match script {
            Script::Succeed => Ok(sample_payload(code, mode)),
            Script::FailAlways => Err(HarvestError::transient(format!("{mode} table never rendered"))),
            Script::FailTimes(n) if attempt <= n => {
                Err(HarvestError::transient(format!("{mode} attempt {attempt} timed out")))
            }
            Script::FailTimes(_) => Ok(sample_payload(code, mode)),
            Script::RateLimitedOnce(retry_after) if attempt == 1 => Err(HarvestError::RateLimited { retry_after }),
            Script::RateLimitedOnce(_) => Ok(sample_payload(code, mode)),
            Script::Malformed => {
                let mut payload = sample_payload(code, mode);
                payload.data_by_year = None;
                Ok(payload)
            }
        }
    }
}
