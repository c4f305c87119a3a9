//! Progress reporting abstraction for batch runs
//!
//! Defines the `ProgressReporter` trait for lifecycle callbacks and
//! provides a no-op and a log-backed implementation.

use log::{debug, info, warn};
use serde::Serialize;
use std::fmt;

use crate::scrape_task::TradeMode;
use crate::work_source::HsCode;

/// Lifecycle of one batch run
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RunPhase {
    Idle,
    Loading,
    Dispatching,
    Draining,
    Done,
}

impl RunPhase {
    pub(crate) fn as_u8(self) -> u8 {
        match self {
            Self::Idle => 0,
            Self::Loading => 1,
            Self::Dispatching => 2,
            Self::Draining => 3,
            Self::Done => 4,
        }
    }

    pub(crate) fn from_u8(v: u8) -> Self {
        match v {
            1 => Self::Loading,
            2 => Self::Dispatching,
            3 => Self::Draining,
            4 => Self::Done,
            _ => Self::Idle,
        }
    }
}

impl fmt::Display for RunPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Idle => "idle",
            Self::Loading => "loading",
            Self::Dispatching => "dispatching",
            Self::Draining => "draining",
            Self::Done => "done",
        };
        f.write_str(s)
    }
}

/// Terminal result of one WorkItem within a run
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ItemOutcome {
    /// Both modes completed
    Completed,
    /// One mode completed, the other failed
    Partial,
    /// No mode completed in this run
    Failed,
}

/// Trait for reporting batch progress at key lifecycle events
///
/// Implementations can forward to channels, a UI, or the log.
pub trait ProgressReporter: Send + Sync {
    /// The run moved to a new phase
    fn report_phase(&self, phase: RunPhase);

    /// A chunk was admitted past the parallelism gate
    fn report_chunk_started(&self, index: usize, total: usize, size: usize);

    /// A chunk finished every item it held
    fn report_chunk_finished(&self, index: usize, total: usize);

    /// One mode of an item failed after retries
    fn report_mode_failed(&self, code: &HsCode, mode: TradeMode, error: &str);

    /// An item reached its terminal state for this run
    fn report_item_finished(&self, code: &HsCode, outcome: ItemOutcome);
}

/// Progress reporter that does nothing
#[derive(Debug, Clone, Copy, Default)]
pub struct NoOpProgress;

impl ProgressReporter for NoOpProgress {
    #[inline(always)]
    fn report_phase(&self, _phase: RunPhase) {}

    #[inline(always)]
    fn report_chunk_started(&self, _index: usize, _total: usize, _size: usize) {}

    #[inline(always)]
    fn report_chunk_finished(&self, _index: usize, _total: usize) {}

    #[inline(always)]
    fn report_mode_failed(&self, _code: &HsCode, _mode: TradeMode, _error: &str) {}

    #[inline(always)]
    fn report_item_finished(&self, _code: &HsCode, _outcome: ItemOutcome) {}
}

/// Progress reporter that writes to the log
#[derive(Debug, Clone, Copy, Default)]
pub struct LogProgress;

impl ProgressReporter for LogProgress {
    fn report_phase(&self, phase: RunPhase) {
        info!("Batch run phase: {phase}");
    }

    fn report_chunk_started(&self, index: usize, total: usize, size: usize) {
        info!("Chunk {}/{total} started ({size} codes)", index + 1);
    }

    fn report_chunk_finished(&self, index: usize, total: usize) {
        info!("Chunk {}/{total} finished", index + 1);
    }

    fn report_mode_failed(&self, code: &HsCode, mode: TradeMode, error: &str) {
        warn!("HS {code} [{mode}] failed: {error}");
    }

    fn report_item_finished(&self, code: &HsCode, outcome: ItemOutcome) {
        debug!("HS {code} finished: {outcome:?}");
    }
}
