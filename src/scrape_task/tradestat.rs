//! Commodity-wise all-countries report on the portal, driven by chromiumoxide

use std::collections::BTreeMap;
use std::future::Future;
use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use chromiumoxide::Page;
use chrono::Utc;
use log::{debug, info, warn};
use serde::Deserialize;
use serde::de::DeserializeOwned;

use super::js_scripts::{
    NEXT_PAGE_SCRIPT, PAGE_PROBE_SCRIPT, PRODUCT_LABEL_SCRIPT, STEALTH_SCRIPT, SUBMIT_SCRIPT,
    SUMMARY_SCRIPT, TABLE_ROWS_SCRIPT, exists_script, fill_input_script, option_labels_script,
    select_option_script,
};
use super::{ScrapeTask, TradeMode, assemble_payload, build_summary, map_rows};
use crate::browser_setup::PooledBrowser;
use crate::harvest_engine::errors::{HarvestError, HarvestResult};
use crate::harvest_engine::throttler::RequestThrottler;
use crate::pipeline::{RawPayload, YearBlock};
use crate::utils::{DEFAULT_PAGE_TIMEOUT, DEFAULT_RATE_LIMIT_WAIT, PORTAL_HOST, TABLE_WAIT_TIMEOUT, ist};
use crate::work_source::HsCode;

const POLL_INTERVAL: Duration = Duration::from_millis(250);
const PAGINATION_SETTLE: Duration = Duration::from_secs(1);
const SUMMARY_WAIT: Duration = Duration::from_secs(30);
/// Guard against a pager that never disables its "next" button
const MAX_PAGES: u32 = 500;

const RATE_LIMIT_MARKERS: [&str; 5] = [
    "error 429",
    "too many requests",
    "503 service",
    "service unavailable",
    "rate limit",
];

#[derive(Debug, Deserialize)]
struct PageProbe {
    title: String,
    text: String,
}

#[derive(Debug, Deserialize)]
struct SummaryProbe {
    years: Vec<String>,
    rows: Vec<Vec<String>>,
}

/// Whether a page's title or leading text reports rate limiting
#[must_use]
pub fn looks_rate_limited(title: &str, text: &str) -> bool {
    let title = title.to_ascii_lowercase();
    let text = text.to_ascii_lowercase();
    RATE_LIMIT_MARKERS
        .iter()
        .any(|m| title.contains(m) || text.lines().take(5).any(|l| l.contains(m)))
}

/// Apply a timeout to one page operation
async fn with_page_timeout<F, T>(operation: F, limit: Duration, operation_name: &str) -> HarvestResult<T>
where
    F: Future<Output = HarvestResult<T>>,
{
    match tokio::time::timeout(limit, operation).await {
        Ok(result) => result,
        Err(_) => Err(HarvestError::transient(format!(
            "{operation_name} timeout after {:.0} seconds",
            limit.as_secs_f64()
        ))),
    }
}

async fn eval<T: DeserializeOwned>(page: &Page, script: impl Into<String>, what: &str) -> HarvestResult<T> {
    let script: String = script.into();
    page.evaluate(script)
        .await
        .map_err(|e| HarvestError::transient(format!("{what}: {e}")))?
        .into_value::<T>()
        .map_err(|e| HarvestError::transient(format!("{what}: unexpected result: {e}")))
}

async fn wait_for_selector(page: &Page, selector: &str, limit: Duration) -> HarvestResult<()> {
    let probe = exists_script(selector);
    let deadline = Instant::now() + limit;
    loop {
        if eval::<bool>(page, probe.as_str(), "selector probe").await.unwrap_or(false) {
            return Ok(());
        }
        if Instant::now() >= deadline {
            return Err(HarvestError::transient(format!(
                "timed out after {:.0}s waiting for {selector}",
                limit.as_secs_f64()
            )));
        }
        tokio::time::sleep(POLL_INTERVAL).await;
    }
}

/// Scrape task for the commodity-wise report of either trade mode
#[derive(Debug, Clone)]
pub struct TradestatScrapeTask {
    throttler: Arc<RequestThrottler>,
    page_timeout: Duration,
    table_timeout: Duration,
    rate_limit_wait: Duration,
}

impl TradestatScrapeTask {
    pub fn new(throttler: Arc<RequestThrottler>) -> Self {
        Self {
            throttler,
            page_timeout: DEFAULT_PAGE_TIMEOUT,
            table_timeout: TABLE_WAIT_TIMEOUT,
            rate_limit_wait: DEFAULT_RATE_LIMIT_WAIT,
        }
    }

    #[must_use]
    pub fn with_page_timeout(mut self, timeout: Duration) -> Self {
        self.page_timeout = timeout;
        self
    }

    async fn check_rate_limit(&self, page: &Page) -> HarvestResult<()> {
        if let Ok(probe) = eval::<PageProbe>(page, PAGE_PROBE_SCRIPT, "page probe").await
            && looks_rate_limited(&probe.title, &probe.text)
        {
            warn!("Portal reports rate limiting: {}", probe.title);
            return Err(HarvestError::RateLimited {
                retry_after: self.rate_limit_wait,
            });
        }
        Ok(())
    }

    async fn open_report(&self, page: &Page, mode: TradeMode) -> HarvestResult<()> {
        let url = mode.report_url();
        info!("Opening URL: {url}");
        with_page_timeout(
            async {
                page.goto(url)
                    .await
                    .map_err(|e| HarvestError::transient(format!("navigation to {url} failed: {e}")))?;
                page.wait_for_navigation()
                    .await
                    .map_err(|e| HarvestError::transient(format!("page load failed: {e}")))?;
                Ok(())
            },
            self.page_timeout,
            "Navigation",
        )
        .await?;

        if let Err(e) = eval::<bool>(page, STEALTH_SCRIPT, "stealth").await {
            debug!("Stealth script not applied: {e}");
        }
        self.check_rate_limit(page).await?;

        wait_for_selector(page, mode.code_selector(), self.page_timeout).await
    }

    async fn fill_code(&self, page: &Page, mode: TradeMode, code: &HsCode) -> HarvestResult<()> {
        let filled: bool = eval(page, fill_input_script(mode.code_selector(), code.as_str()), "fill code").await?;
        if filled {
            Ok(())
        } else {
            Err(HarvestError::transient(format!("HS code input {} not found", mode.code_selector())))
        }
    }

    async fn available_years(&self, page: &Page, mode: TradeMode) -> HarvestResult<Vec<String>> {
        wait_for_selector(page, mode.year_selector(), self.page_timeout).await?;
        let labels: Vec<String> = eval(page, option_labels_script(mode.year_selector()), "year options").await?;
        let years: Vec<String> = labels.into_iter().filter(|l| l.contains('-')).collect();
        if years.is_empty() {
            return Err(HarvestError::transient("No year options found"));
        }
        info!("Available years: {years:?}");
        Ok(years)
    }

    async fn submit_year(&self, page: &Page, mode: TradeMode, code: &HsCode, year: &str) -> HarvestResult<()> {
        self.fill_code(page, mode, code).await?;
        let selected: bool = eval(page, select_option_script(mode.year_selector(), year), "select year").await?;
        if !selected {
            return Err(HarvestError::transient(format!("year option '{year}' not found")));
        }

        self.throttler.wait(PORTAL_HOST).await;
        let submitted: bool = eval(page, SUBMIT_SCRIPT, "submit").await?;
        if !submitted {
            return Err(HarvestError::transient("submit button not found"));
        }
        if let Err(e) = with_page_timeout(
            async {
                page.wait_for_navigation()
                    .await
                    .map(|_| ())
                    .map_err(|e| HarvestError::transient(e.to_string()))
            },
            self.page_timeout,
            "Form submit",
        )
        .await
        {
            debug!("No navigation after submit: {e}");
        }

        self.check_rate_limit(page).await?;
        wait_for_selector(page, "#example1 tbody tr", self.table_timeout).await
    }

    /// Read every page of the results table
    async fn scrape_all_pages(&self, page: &Page) -> HarvestResult<(Vec<Vec<String>>, u32)> {
        let mut rows = Vec::new();
        let mut pages = 0;

        loop {
            pages += 1;
            let batch: Vec<Vec<String>> = eval(page, TABLE_ROWS_SCRIPT, "table rows").await?;
            debug!("Parsed {} rows from page {pages}", batch.len());
            rows.extend(batch);

            if pages >= MAX_PAGES {
                warn!("Stopping pagination at {MAX_PAGES} pages");
                break;
            }
            let advanced: bool = eval(page, NEXT_PAGE_SCRIPT, "next page").await?;
            if !advanced {
                break;
            }
            tokio::time::sleep(PAGINATION_SETTLE).await;
        }

        Ok((rows, pages))
    }

    async fn scrape_year(&self, page: &Page, mode: TradeMode, code: &HsCode, year: &str) -> HarvestResult<YearBlock> {
        info!("Processing {code} [{mode}] for year {year}");
        self.submit_year(page, mode, code, year).await?;

        let product_label: Option<String> = eval(page, PRODUCT_LABEL_SCRIPT, "product label")
            .await
            .unwrap_or_else(|e| {
                warn!("Product label not found: {e}");
                None
            });

        let (rows, total_pages) = self.scrape_all_pages(page).await?;

        let summary = match wait_for_selector(page, "#example1 tfoot tr", SUMMARY_WAIT).await {
            Ok(()) => eval::<SummaryProbe>(page, SUMMARY_SCRIPT, "summary")
                .await
                .ok()
                .and_then(|s| build_summary(&s.years, &s.rows)),
            Err(_) => None,
        };
        if summary.is_none() {
            warn!("Summary not available for {code} [{mode}] {year}");
        }

        Ok(YearBlock {
            product_label,
            partner_countries: map_rows(&rows, year),
            summary,
            total_pages,
        })
    }

    async fn scrape(&self, page: &Page, code: &HsCode, mode: TradeMode) -> HarvestResult<RawPayload> {
        let started = Instant::now();

        self.open_report(page, mode).await?;
        self.fill_code(page, mode, code).await?;
        let years = self.available_years(page, mode).await?;

        let mut data_by_year = BTreeMap::new();
        for year in years {
            let block = self.scrape_year(page, mode, code, &year).await?;
            data_by_year.insert(year, block);
        }

        Ok(assemble_payload(
            code,
            mode,
            mode.report_url(),
            Utc::now().with_timezone(&ist()),
            started.elapsed(),
            data_by_year,
        ))
    }
}

#[async_trait]
impl ScrapeTask for TradestatScrapeTask {
    type Resource = PooledBrowser;

    async fn run(&self, resource: &PooledBrowser, code: &HsCode, mode: TradeMode) -> HarvestResult<RawPayload> {
        let page = resource
            .browser()
            .new_page("about:blank")
            .await
            .map_err(|e| HarvestError::transient(format!("failed to open page: {e}")))?;

        let result = self.scrape(&page, code, mode).await;

        if let Err(e) = page.close().await {
            warn!("Failed to close page for {code} [{mode}]: {e}");
        }
        result
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn detects_rate_limit_pages() {
        assert!(looks_rate_limited("429 Too Many Requests", ""));
        assert!(looks_rate_limited("", "Service Unavailable\nPlease retry later"));
        assert!(!looks_rate_limited("Export Import Data Bank", "Commodity-wise all countries"));
    }
}
