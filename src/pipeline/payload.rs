//! Record types for the three stages of a fetch's data
//!
//! `RawPayload` is what a scrape produces, `ProcessedRecord` is the
//! validated and cleaned form, `NormalizedRow` is one flattened
//! (year, partner) row for analytical use.

use std::collections::BTreeMap;

use chrono::{DateTime, FixedOffset, NaiveDate};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::scrape_task::TradeMode;
use crate::work_source::HsCode;

/// Header keys of the two fixed partner-row columns
pub const SERIAL_COLUMN: &str = "S.No";
pub const COUNTRY_COLUMN: &str = "Country";

/// One summary line, keyed by `<yyyy>_<yy>` year keys and `growth_percent`
pub type SummaryLine = BTreeMap<String, Option<String>>;

/// Summary block, keyed by line name
pub type Summary = BTreeMap<String, SummaryLine>;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum PayloadStatus {
    Success,
    Failed,
}

/// Code prefixes at each level of the HS nomenclature
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HsHierarchy {
    pub chapter: String,
    pub heading: String,
    pub sub_heading: String,
    pub hs8: String,
}

impl From<&HsCode> for HsHierarchy {
    fn from(code: &HsCode) -> Self {
        Self {
            chapter: code.chapter().to_string(),
            heading: code.heading().to_string(),
            sub_heading: code.sub_heading().to_string(),
            hs8: code.as_str().to_string(),
        }
    }
}

/// Capture metadata attached to every raw payload
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RawMetadata {
    pub code: String,
    pub mode: TradeMode,
    pub report_type: String,
    pub data_frequency: String,
    pub currency: String,
    pub scraped_at: DateTime<FixedOffset>,
    pub scrape_duration_seconds: f64,
    pub total_records_captured: usize,
    pub complete_records: usize,
    pub data_completeness_percent: f64,
    pub years_available: Vec<String>,
    pub number_of_years: usize,
    pub unique_partner_countries: usize,
    pub hs_hierarchy: HsHierarchy,
    #[serde(default)]
    pub source_site: String,
}

impl RawMetadata {
    /// Calendar date of capture in the payload's own offset
    #[must_use]
    pub fn scrape_date(&self) -> NaiveDate {
        self.scraped_at.date_naive()
    }
}

/// One partner-country row of a year table
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PartnerRow {
    #[serde(rename = "S.No", default)]
    pub serial: Option<String>,
    #[serde(rename = "Country", default)]
    pub country: Option<String>,
    /// Value columns keyed by year-derived header
    #[serde(flatten)]
    pub values: BTreeMap<String, Option<String>>,
}

/// Everything captured for one financial year
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct YearBlock {
    #[serde(default)]
    pub product_label: Option<String>,
    #[serde(default)]
    pub partner_countries: Vec<PartnerRow>,
    #[serde(default)]
    pub summary: Option<Summary>,
    #[serde(default)]
    pub total_pages: u32,
}

/// Unmodified output of one (code, mode) scrape
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RawPayload {
    pub status: PayloadStatus,
    pub metadata: RawMetadata,
    /// Absent only on malformed captures
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data_by_year: Option<BTreeMap<String, YearBlock>>,
}

/// Where the data was taken from
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SourceInfo {
    pub site: String,
    pub dataset: String,
    pub country: String,
}

/// Validated, cleaned form of one raw payload
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProcessedRecord {
    pub record_id: Uuid,
    pub schema_version: String,
    pub pipeline_version: String,
    pub processed_at: DateTime<FixedOffset>,
    pub metadata: RawMetadata,
    pub hs: HsHierarchy,
    pub mode: TradeMode,
    pub source: SourceInfo,
    pub years: BTreeMap<String, YearBlock>,
}

/// One flattened (code, mode, year, partner) row
///
/// Partner value columns and `summary_<line>_<key>` columns are carried
/// in `columns`, which serializes inline.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NormalizedRow {
    pub record_id: Uuid,
    pub schema_version: String,
    pub pipeline_version: String,
    pub code: String,
    pub mode: TradeMode,
    pub chapter: String,
    pub heading: String,
    pub sub_heading: String,
    pub hs8: String,
    pub year: String,
    pub product_label: Option<String>,
    pub scraped_at: DateTime<FixedOffset>,
    pub scrape_date: NaiveDate,
    pub data_frequency: String,
    pub currency: String,
    pub source_site: String,
    #[serde(rename = "S.No")]
    pub serial: Option<String>,
    #[serde(rename = "Country")]
    pub country: Option<String>,
    #[serde(flatten)]
    pub columns: BTreeMap<String, Option<String>>,
}
