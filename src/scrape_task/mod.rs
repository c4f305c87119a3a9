//! Scrape task contract and the portal implementation
//!
//! A scrape task turns `(code, mode)` into a [`RawPayload`] using a leased
//! resource it is handed; it never creates its own. Re-running it for the
//! same pair is a plain re-read on the portal side.

pub mod js_scripts;
pub mod trade_mode;
pub mod tradestat;

use std::collections::{BTreeMap, BTreeSet};
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, FixedOffset};

use crate::harvest_engine::errors::HarvestResult;
use crate::pipeline::{HsHierarchy, PartnerRow, PayloadStatus, RawMetadata, RawPayload, Summary, YearBlock};
use crate::work_source::HsCode;

pub use trade_mode::TradeMode;
pub use tradestat::TradestatScrapeTask;

const REPORT_TYPE: &str = "Commodity wise all Countries";
const DATA_FREQUENCY: &str = "Annual";
const CURRENCY: &str = "USD Million";

/// Summary line names, in footer order
pub const SUMMARY_LINES: [&str; 3] = [
    "total_exports_selected_countries",
    "india_total_exports",
    "share_of_india_exports_percent",
];

/// Page interaction for one (code, mode) pair
#[async_trait]
pub trait ScrapeTask: Send + Sync + 'static {
    /// The pooled resource this task drives
    type Resource: Send + Sync + 'static;

    async fn run(
        &self,
        resource: &Self::Resource,
        code: &HsCode,
        mode: TradeMode,
    ) -> HarvestResult<RawPayload>;
}

/// Column headers for a financial-year table
///
/// `"2024-2025"` yields `S.No, Country, 2023-2024, 2024-2025, %Growth,
/// Qty_2023_2024, Qty_2024_2025, Qty_Growth`.
#[must_use]
pub fn build_headers(year: &str) -> [String; 8] {
    let prev = year
        .split_once('-')
        .and_then(|(start, _)| start.trim().parse::<i32>().ok())
        .map_or_else(|| "previous".to_string(), |y| format!("{}-{y}", y - 1));

    [
        "S.No".to_string(),
        "Country".to_string(),
        prev.clone(),
        year.to_string(),
        "%Growth".to_string(),
        format!("Qty_{}", prev.replace('-', "_")),
        format!("Qty_{}", year.replace('-', "_")),
        "Qty_Growth".to_string(),
    ]
}

/// Map raw cell vectors onto year-derived headers
///
/// Missing or empty cells become `None`.
#[must_use]
pub fn map_rows(rows: &[Vec<String>], year: &str) -> Vec<PartnerRow> {
    let headers = build_headers(year);
    rows.iter()
        .map(|cells| {
            let cell = |i: usize| {
                cells
                    .get(i)
                    .map(|c| c.trim())
                    .filter(|c| !c.is_empty())
                    .map(str::to_string)
            };
            PartnerRow {
                serial: cell(0),
                country: cell(1),
                values: headers
                    .iter()
                    .enumerate()
                    .skip(2)
                    .map(|(i, h)| (h.clone(), cell(i)))
                    .collect(),
            }
        })
        .collect()
}

/// Build the summary block from footer rows
///
/// Needs at least two year headers and three footer lines; otherwise the
/// table has no summary. Cell 0 of each line is its label.
#[must_use]
pub fn build_summary(years: &[String], rows: &[Vec<String>]) -> Option<Summary> {
    if years.len() < 2 || rows.len() < 3 {
        return None;
    }
    let prev_key = years[0].replace('-', "_");
    let curr_key = years[1].replace('-', "_");

    let summary = SUMMARY_LINES
        .iter()
        .zip(rows)
        .map(|(name, cells)| {
            let get = |i: usize| cells.get(i).cloned();
            let growth = if *name == "share_of_india_exports_percent" {
                None
            } else {
                get(3)
            };
            let line = BTreeMap::from([
                (prev_key.clone(), get(1)),
                (curr_key.clone(), get(2)),
                ("growth_percent".to_string(), growth),
            ]);
            ((*name).to_string(), line)
        })
        .collect();

    Some(summary)
}

fn round2(v: f64) -> f64 {
    (v * 100.0).round() / 100.0
}

/// Wrap captured year blocks into a success payload with metadata
#[must_use]
pub fn assemble_payload(
    code: &HsCode,
    mode: TradeMode,
    source_site: &str,
    scraped_at: DateTime<FixedOffset>,
    duration: Duration,
    data_by_year: BTreeMap<String, YearBlock>,
) -> RawPayload {
    let partners = || data_by_year.values().flat_map(|y| y.partner_countries.iter());

    let total_records = partners().count();
    let complete_records = partners().filter(|p| p.country.is_some()).count();
    let unique_partner_countries = partners()
        .map(|p| p.country.as_deref().unwrap_or("Unknown"))
        .collect::<BTreeSet<_>>()
        .len();
    let completeness = if total_records > 0 {
        round2(complete_records as f64 / total_records as f64 * 100.0)
    } else {
        0.0
    };

    let metadata = RawMetadata {
        code: code.to_string(),
        mode,
        report_type: REPORT_TYPE.to_string(),
        data_frequency: DATA_FREQUENCY.to_string(),
        currency: CURRENCY.to_string(),
        scraped_at,
        scrape_duration_seconds: round2(duration.as_secs_f64()),
        total_records_captured: total_records,
        complete_records,
        data_completeness_percent: completeness,
        years_available: data_by_year.keys().cloned().collect(),
        number_of_years: data_by_year.len(),
        unique_partner_countries,
        hs_hierarchy: HsHierarchy::from(code),
        source_site: source_site.to_string(),
    };

    RawPayload {
        status: PayloadStatus::Success,
        metadata,
        data_by_year: Some(data_by_year),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn headers_follow_the_financial_year() {
        let h = build_headers("2024-2025");
        assert_eq!(h[2], "2023-2024");
        assert_eq!(h[3], "2024-2025");
        assert_eq!(h[5], "Qty_2023_2024");
        assert_eq!(h[6], "Qty_2024_2025");
    }

    #[test]
    fn short_rows_pad_with_none() {
        let rows = vec![vec!["1".to_string(), "Nepal".to_string(), "10.5".to_string()]];
        let mapped = map_rows(&rows, "2024-2025");
        assert_eq!(mapped[0].country.as_deref(), Some("Nepal"));
        assert_eq!(mapped[0].values["2023-2024"].as_deref(), Some("10.5"));
        assert_eq!(mapped[0].values["Qty_Growth"], None);
        assert_eq!(mapped[0].values.len(), 6);
    }

    #[test]
    fn summary_needs_three_footer_lines() {
        let years = vec!["2023-2024".to_string(), "2024-2025".to_string()];
        let line = |label: &str| vec![label.to_string(), "1,000".into(), "1,100".into(), "10".into()];
        assert!(build_summary(&years, &[line("a"), line("b")]).is_none());

        let summary = build_summary(&years, &[line("a"), line("b"), line("c")]).unwrap();
        assert_eq!(summary["india_total_exports"]["2024_2025"].as_deref(), Some("1,100"));
        assert_eq!(summary["share_of_india_exports_percent"]["growth_percent"], None);
    }
}
