//! Per-item work: fetch both modes, transform, record
//!
//! The export and import fetches of one code run concurrently, each behind
//! its own retry loop, throttle wait and pool lease. Once both have reached
//! a terminal state the owning task applies transform and ledger writes one
//! after another, so no two writers ever touch the same ledger row.

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use futures::future::join_all;
use log::{debug, info, warn};

use super::errors::{HarvestError, HarvestResult};
use super::progress::{ItemOutcome, ProgressReporter};
use super::retry::RetryPolicy;
use super::throttler::{RequestThrottler, host_of};
use crate::browser_pool::{ResourceFactory, ResourcePool};
use crate::ledger::{FailureScope, LedgerEntry, ProgressLedger};
use crate::pipeline::{RawPayload, TransformPipeline};
use crate::scrape_task::{ScrapeTask, TradeMode};
use crate::utils::{PORTAL_HOST, ist};
use crate::work_source::HsCode;

/// Shared context for processing ledger entries
///
/// Every field is a handle, so clones are cheap and may be moved into
/// spawned chunk tasks.
pub struct ItemProcessor<F, T>
where
    F: ResourceFactory,
    T: ScrapeTask<Resource = F::Resource>,
{
    pub(crate) pool: Arc<ResourcePool<F>>,
    pub(crate) task: Arc<T>,
    pub(crate) throttler: Arc<RequestThrottler>,
    pub(crate) retry: RetryPolicy,
    pub(crate) acquire_timeout: Duration,
    pub(crate) pipeline: TransformPipeline,
    pub(crate) ledger: ProgressLedger,
    pub(crate) progress: Arc<dyn ProgressReporter>,
}

impl<F, T> Clone for ItemProcessor<F, T>
where
    F: ResourceFactory,
    T: ScrapeTask<Resource = F::Resource>,
{
    fn clone(&self) -> Self {
        Self {
            pool: Arc::clone(&self.pool),
            task: Arc::clone(&self.task),
            throttler: Arc::clone(&self.throttler),
            retry: self.retry,
            acquire_timeout: self.acquire_timeout,
            pipeline: self.pipeline.clone(),
            ledger: self.ledger.clone(),
            progress: Arc::clone(&self.progress),
        }
    }
}

impl<F, T> ItemProcessor<F, T>
where
    F: ResourceFactory,
    T: ScrapeTask<Resource = F::Resource>,
{
    /// Fetch one (code, mode) pair under retry, throttle and a pool lease
    ///
    /// The lease covers the throttle wait and the scrape, never the
    /// backoff sleep.
    ///
    /// # Errors
    /// The last attempt's error once retries are spent, or the first
    /// non-retryable error (`PoolExhausted`, `SchemaInvalid`, ...).
    pub async fn fetch_mode(&self, code: &HsCode, mode: TradeMode) -> HarvestResult<RawPayload> {
        let op_name = format!("HS {code} [{mode}]");
        let host = host_of(mode.report_url()).unwrap_or_else(|| PORTAL_HOST.to_string());

        let payload = self
            .retry
            .run(&op_name, |attempt| {
                let host = host.as_str();
                async move {
                    if attempt > 0 {
                        debug!("HS {code} [{mode}]: retry attempt {}", attempt + 1);
                    }
                    // Throttle after leasing: queued fetches must not hold a slot
                    let lease = self.pool.acquire(self.acquire_timeout).await?;
                    self.throttler.wait(host).await;
                    let result = self.task.run(lease.resource(), code, mode).await;
                    drop(lease);

                    if let Some(retry_after) = result.as_ref().err().and_then(HarvestError::retry_after) {
                        self.throttler.wait_on_rate_limit(retry_after).await;
                    }
                    result
                }
            })
            .await?;

        if payload.metadata.code != code.as_str() || payload.metadata.mode != mode {
            return Err(HarvestError::schema(format!(
                "payload for {} [{}] returned when {code} [{mode}] was requested",
                payload.metadata.code, payload.metadata.mode
            )));
        }
        Ok(payload)
    }

    /// Transform a fetched payload and record the mode as completed
    async fn complete_mode(&self, code: &HsCode, mode: TradeMode, payload: &RawPayload) -> Result<(), String> {
        let outputs = self
            .pipeline
            .run(payload)
            .await
            .map_err(|e| format!("transform failed: {e}"))?;
        debug!(
            "HS {code} [{mode}]: {} normalized rows -> {}",
            outputs.normalized_rows,
            outputs.normalized.display()
        );
        Ok(())
    }

    /// Drive one ledger entry to a terminal state for this run
    ///
    /// Only modes that are not yet completed are fetched. Per-item failures
    /// end up in the ledger and are reported through the returned outcome.
    ///
    /// # Errors
    /// Only ledger failures, which the caller escalates.
    pub async fn process_item(&self, entry: LedgerEntry) -> HarvestResult<ItemOutcome> {
        let code: HsCode = match entry.code.parse() {
            Ok(code) => code,
            Err(e) => {
                warn!("Skipping ledger entry with invalid code '{}': {e}", entry.code);
                self.ledger
                    .mark_failed(&entry.code, &format!("invalid HS code: {e}"), FailureScope::Overall)
                    .await?;
                return Ok(ItemOutcome::Failed);
            }
        };

        let outstanding = entry.outstanding_modes();
        if outstanding.is_empty() {
            self.ledger.mark_completed(code.as_str(), Utc::now().with_timezone(&ist())).await?;
            self.progress.report_item_finished(&code, ItemOutcome::Completed);
            return Ok(ItemOutcome::Completed);
        }

        info!("Processing HS {code} ({} modes outstanding)", outstanding.len());
        let code_ref = &code;
        let fetched = join_all(
            outstanding
                .iter()
                .map(|&mode| async move { (mode, self.fetch_mode(code_ref, mode).await) }),
        )
        .await;

        let mut failures: Vec<(TradeMode, String)> = Vec::new();
        for (mode, result) in fetched {
            let outcome = match result {
                Ok(payload) => self
                    .complete_mode(&code, mode, &payload)
                    .await
                    .map(|()| payload.metadata.scraped_at),
                Err(e) => Err(e.to_string()),
            };
            match outcome {
                Ok(scraped_at) => {
                    self.ledger.mark_mode_completed(code.as_str(), mode, scraped_at).await?;
                }
                Err(message) => {
                    self.progress.report_mode_failed(&code, mode, &message);
                    failures.push((mode, message));
                }
            }
        }

        let outcome = if failures.is_empty() {
            self.ledger.mark_completed(code.as_str(), Utc::now().with_timezone(&ist())).await?;
            ItemOutcome::Completed
        } else if failures.len() < TradeMode::ALL.len() {
            // At least one mode is completed, now or in an earlier run
            for (mode, message) in &failures {
                self.ledger
                    .mark_failed(code.as_str(), message, FailureScope::Mode(*mode))
                    .await?;
            }
            ItemOutcome::Partial
        } else {
            let combined = failures
                .iter()
                .map(|(mode, message)| format!("{mode}: {message}"))
                .collect::<Vec<_>>()
                .join("; ");
            self.ledger
                .mark_failed(code.as_str(), &combined, FailureScope::Overall)
                .await?;
            ItemOutcome::Failed
        };

        self.progress.report_item_finished(&code, outcome);
        Ok(outcome)
    }
}
