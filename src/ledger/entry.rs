//! Row and aggregate types of the progress ledger

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, FixedOffset};
use serde::Serialize;

use crate::scrape_task::TradeMode;

/// Status of one item or one mode of an item
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ItemStatus {
    Pending,
    Completed,
    Failed,
}

impl ItemStatus {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Completed => "completed",
            Self::Failed => "failed",
        }
    }
}

impl fmt::Display for ItemStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ItemStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(Self::Pending),
            "completed" => Ok(Self::Completed),
            "failed" => Ok(Self::Failed),
            other => Err(format!("unknown ledger status '{other}'")),
        }
    }
}

/// What a failure is recorded against
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureScope {
    Mode(TradeMode),
    Overall,
}

/// One ledger row
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct LedgerEntry {
    pub code: String,
    pub overall_status: ItemStatus,
    pub export_status: ItemStatus,
    pub import_status: ItemStatus,
    pub export_scraped_at: Option<DateTime<FixedOffset>>,
    pub import_scraped_at: Option<DateTime<FixedOffset>>,
    pub error_count: i64,
    pub last_error: Option<String>,
}

impl LedgerEntry {
    #[must_use]
    pub fn mode_status(&self, mode: TradeMode) -> ItemStatus {
        match mode {
            TradeMode::Export => self.export_status,
            TradeMode::Import => self.import_status,
        }
    }

    /// Modes that still need a successful fetch
    #[must_use]
    pub fn outstanding_modes(&self) -> Vec<TradeMode> {
        TradeMode::ALL
            .into_iter()
            .filter(|m| self.mode_status(*m) != ItemStatus::Completed)
            .collect()
    }
}

/// Aggregate counts over the whole ledger
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct LedgerStats {
    pub total: i64,
    pub completed: i64,
    pub pending: i64,
    pub failed: i64,
    pub export_completed: i64,
    pub export_failed: i64,
    pub import_completed: i64,
    pub import_failed: i64,
    pub completion_percent: f64,
}

impl fmt::Display for LedgerStats {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "Total HS codes:   {}", self.total)?;
        writeln!(f, "Completed:        {}", self.completed)?;
        writeln!(f, "Pending:          {}", self.pending)?;
        writeln!(f, "Failed:           {}", self.failed)?;
        writeln!(
            f,
            "Export:           {} completed, {} failed",
            self.export_completed, self.export_failed
        )?;
        writeln!(
            f,
            "Import:           {} completed, {} failed",
            self.import_completed, self.import_failed
        )?;
        write!(f, "Completion:       {:.2}%", self.completion_percent)
    }
}
