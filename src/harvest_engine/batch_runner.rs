//! Batch runner: pending ledger entries → chunks → bounded parallel dispatch
//!
//! `Idle → Loading → Dispatching → Draining → Done`. At most `max_parallel`
//! chunk tasks are in flight; inside a chunk items run one after another, and
//! each item holds at most one pool lease per mode, so the pool's semaphore
//! stays the hard ceiling on concurrent scrape tasks.

use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU8, Ordering};
use std::time::{Duration, Instant};

use futures::StreamExt;
use futures::stream::FuturesUnordered;
use log::{debug, error, info, warn};
use parking_lot::Mutex;
use serde::Serialize;

use super::errors::{HarvestError, HarvestResult};
use super::item_processor::ItemProcessor;
use super::progress::{ItemOutcome, NoOpProgress, ProgressReporter, RunPhase};
use super::throttler::RequestThrottler;
use crate::browser_pool::{ResourceFactory, ResourcePool};
use crate::config::HarvestConfig;
use crate::ledger::{LedgerEntry, LedgerStats, ProgressLedger};
use crate::pipeline::TransformPipeline;
use crate::scrape_task::ScrapeTask;
use crate::work_source::chunk_items;

/// What one run did, plus the ledger totals after it
#[derive(Debug, Clone, Serialize)]
pub struct RunSummary {
    pub phase: RunPhase,
    pub chunks_total: usize,
    pub chunks_admitted: usize,
    pub items_admitted: usize,
    pub items_completed: usize,
    pub items_partial: usize,
    pub items_failed: usize,
    /// Items left pending because the run stopped early
    pub items_skipped: usize,
    pub cancelled: bool,
    pub elapsed: Duration,
    pub ledger: LedgerStats,
}

impl fmt::Display for RunSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(
            f,
            "Run {} in {:.1}s{}",
            self.phase,
            self.elapsed.as_secs_f64(),
            if self.cancelled { " (cancelled)" } else { "" }
        )?;
        writeln!(
            f,
            "Chunks:           {}/{} admitted",
            self.chunks_admitted, self.chunks_total
        )?;
        writeln!(
            f,
            "Items:            {} admitted, {} completed, {} partial, {} failed, {} skipped",
            self.items_admitted,
            self.items_completed,
            self.items_partial,
            self.items_failed,
            self.items_skipped
        )?;
        write!(f, "{}", self.ledger)
    }
}

/// Per-chunk counts
#[derive(Debug, Default, Clone, Copy)]
struct ChunkTally {
    completed: usize,
    partial: usize,
    failed: usize,
    skipped: usize,
}

impl ChunkTally {
    fn absorb(&mut self, other: ChunkTally) {
        self.completed += other.completed;
        self.partial += other.partial;
        self.failed += other.failed;
        self.skipped += other.skipped;
    }

    fn record(&mut self, outcome: ItemOutcome) {
        match outcome {
            ItemOutcome::Completed => self.completed += 1,
            ItemOutcome::Partial => self.partial += 1,
            ItemOutcome::Failed => self.failed += 1,
        }
    }
}

/// Stop flags shared with every chunk task
#[derive(Debug, Clone, Default)]
struct StopFlags {
    /// Operator interrupt
    cancel: Arc<AtomicBool>,
    /// Set when the ledger becomes unreachable
    halt: Arc<AtomicBool>,
}

impl StopFlags {
    fn stopping(&self) -> bool {
        self.cancel.load(Ordering::Acquire) || self.halt.load(Ordering::Acquire)
    }
}

/// Runs every pending ledger entry once through the item processor
pub struct BatchRunner<F, T>
where
    F: ResourceFactory,
    T: ScrapeTask<Resource = F::Resource>,
{
    chunk_size: usize,
    max_parallel: usize,
    prewarm: bool,
    processor: ItemProcessor<F, T>,
    phase: Arc<AtomicU8>,
    flags: StopFlags,
    last_summary: Mutex<Option<RunSummary>>,
}

impl<F, T> BatchRunner<F, T>
where
    F: ResourceFactory,
    T: ScrapeTask<Resource = F::Resource>,
{
    /// Wire a runner from a validated configuration and its collaborators
    ///
    /// The pool is shared with nothing else; the runner shuts it down at
    /// the end of [`run`](Self::run).
    pub fn new(
        config: &HarvestConfig,
        pool: Arc<ResourcePool<F>>,
        task: Arc<T>,
        throttler: Arc<RequestThrottler>,
        ledger: ProgressLedger,
    ) -> Self {
        Self {
            chunk_size: config.chunk_size(),
            max_parallel: config.max_parallel(),
            prewarm: config.prewarm(),
            processor: ItemProcessor {
                pool,
                task,
                throttler,
                retry: *config.retry(),
                acquire_timeout: config.acquire_timeout(),
                pipeline: TransformPipeline::new(config.data_dir()),
                ledger,
                progress: Arc::new(NoOpProgress),
            },
            phase: Arc::new(AtomicU8::new(RunPhase::Idle.as_u8())),
            flags: StopFlags::default(),
            last_summary: Mutex::new(None),
        }
    }

    #[must_use]
    pub fn with_progress(mut self, progress: Arc<dyn ProgressReporter>) -> Self {
        self.processor.progress = progress;
        self
    }

    /// Flag that stops admission when set; in-flight items still finish
    #[must_use]
    pub fn cancel_handle(&self) -> Arc<AtomicBool> {
        Arc::clone(&self.flags.cancel)
    }

    /// Request cancellation
    pub fn cancel(&self) {
        self.flags.cancel.store(true, Ordering::Release);
    }

    /// Summary of the finished run, also kept when it ended in an error
    #[must_use]
    pub fn last_summary(&self) -> Option<RunSummary> {
        self.last_summary.lock().clone()
    }

    #[must_use]
    pub fn phase(&self) -> RunPhase {
        RunPhase::from_u8(self.phase.load(Ordering::Acquire))
    }

    fn set_phase(&self, phase: RunPhase) {
        self.phase.store(phase.as_u8(), Ordering::Release);
        self.processor.progress.report_phase(phase);
    }

    /// Run the batch once
    ///
    /// Per-item failures never stop the run. The pool is shut down exactly
    /// once before this returns, whatever the outcome.
    ///
    /// # Errors
    /// Ledger failures (the run stops admitting and drains first; the
    /// partial summary is kept in [`last_summary`](Self::last_summary)), or
    /// `InvalidConfiguration` if the runner was already used.
    pub async fn run(&self) -> HarvestResult<RunSummary> {
        if self
            .phase
            .compare_exchange(
                RunPhase::Idle.as_u8(),
                RunPhase::Loading.as_u8(),
                Ordering::AcqRel,
                Ordering::Acquire,
            )
            .is_err()
        {
            return Err(HarvestError::config("batch runner can only run once"));
        }

        let started = Instant::now();
        let outcome = self.load_and_dispatch().await;

        self.processor.pool.shutdown().await;
        self.set_phase(RunPhase::Done);

        let (mut summary, fatal) = outcome?;
        summary.phase = RunPhase::Done;
        summary.cancelled = self.flags.cancel.load(Ordering::Acquire);
        summary.elapsed = started.elapsed();

        if let Some(e) = fatal {
            if let Ok(stats) = self.processor.ledger.stats().await {
                summary.ledger = stats;
            }
            error!("Batch run halted by store failure\n{summary}");
            *self.last_summary.lock() = Some(summary);
            return Err(e);
        }

        summary.ledger = self.processor.ledger.stats().await?;
        info!("Batch run finished\n{summary}");
        *self.last_summary.lock() = Some(summary.clone());
        Ok(summary)
    }

    /// Load and run every chunk; the error slot holds the first escalation
    async fn load_and_dispatch(&self) -> HarvestResult<(RunSummary, Option<HarvestError>)> {
        self.set_phase(RunPhase::Loading);
        let pending = self.processor.ledger.get_pending().await?;
        info!("Loaded {} pending HS codes", pending.len());

        let chunks = chunk_items(&pending, self.chunk_size)?;
        let mut summary = RunSummary {
            phase: RunPhase::Loading,
            chunks_total: chunks.len(),
            chunks_admitted: 0,
            items_admitted: 0,
            items_completed: 0,
            items_partial: 0,
            items_failed: 0,
            items_skipped: 0,
            cancelled: false,
            elapsed: Duration::ZERO,
            ledger: LedgerStats::default(),
        };

        if self.prewarm && !chunks.is_empty() {
            match self.processor.pool.start().await {
                Ok(n) => debug!("Pre-warmed {n} pooled resources"),
                Err(e) => warn!("Pool pre-warm failed, continuing lazily: {e}"),
            }
        }

        self.set_phase(RunPhase::Dispatching);
        let fatal = self.dispatch(chunks, &mut summary).await;
        summary.phase = RunPhase::Draining;
        Ok((summary, fatal))
    }

    /// Admission loop; returns the first escalated error, if any
    async fn dispatch(&self, chunks: Vec<Vec<LedgerEntry>>, summary: &mut RunSummary) -> Option<HarvestError> {
        let total = chunks.len();
        let mut queue = chunks.into_iter().enumerate();
        let mut active = FuturesUnordered::new();
        let mut totals = ChunkTally::default();
        let mut fatal: Option<HarvestError> = None;
        let mut draining = false;

        loop {
            // Fill up to the parallelism limit
            while !draining && active.len() < self.max_parallel {
                if self.flags.stopping() {
                    info!("Stopping admission: {} of {total} chunks admitted", summary.chunks_admitted);
                    break;
                }
                let Some((index, chunk)) = queue.next() else {
                    break;
                };

                summary.chunks_admitted += 1;
                summary.items_admitted += chunk.len();
                self.processor.progress.report_chunk_started(index, total, chunk.len());

                let processor = self.processor.clone();
                let flags = self.flags.clone();
                let task = tokio::spawn(async move {
                    let result = run_chunk(&processor, chunk, &flags).await;
                    processor.progress.report_chunk_finished(index, total);
                    result
                });
                active.push(task);
            }

            if !draining && (self.flags.stopping() || queue.len() == 0) {
                draining = true;
                self.set_phase(RunPhase::Draining);
            }

            // Wait for at least one chunk to complete
            match active.next().await {
                Some(Ok((tally, result))) => {
                    totals.absorb(tally);
                    if let Err(e) = result {
                        error!("Chunk aborted by store failure: {e}");
                        self.flags.halt.store(true, Ordering::Release);
                        fatal.get_or_insert(e);
                    }
                }
                Some(Err(e)) => {
                    error!("Chunk task panicked: {e}");
                }
                None => break,
            }
        }

        // Chunks never admitted stay pending in the ledger
        totals.skipped += queue.map(|(_, chunk)| chunk.len()).sum::<usize>();

        summary.items_completed = totals.completed;
        summary.items_partial = totals.partial;
        summary.items_failed = totals.failed;
        summary.items_skipped = totals.skipped;
        fatal
    }
}

/// Process one chunk's items in order
///
/// Stops before the next item once cancellation or a halt is requested;
/// the rest stay pending. A ledger failure ends the chunk with an error
/// next to the tally of the items finished before it.
async fn run_chunk<F, T>(
    processor: &ItemProcessor<F, T>,
    chunk: Vec<LedgerEntry>,
    flags: &StopFlags,
) -> (ChunkTally, HarvestResult<()>)
where
    F: ResourceFactory,
    T: ScrapeTask<Resource = F::Resource>,
{
    let mut tally = ChunkTally::default();
    let len = chunk.len();

    for (i, entry) in chunk.into_iter().enumerate() {
        if flags.stopping() {
            tally.skipped = len - i;
            debug!("Chunk stopping early, {} items left pending", tally.skipped);
            break;
        }
        match processor.process_item(entry).await {
            Ok(outcome) => tally.record(outcome),
            Err(e) => {
                // The failing item's ledger state is unknown; count it with the rest
                tally.skipped = len - i;
                return (tally, Err(e));
            }
        }
    }

    (tally, Ok(()))
}
