//! Transform pipeline
//!
//! Three ordered stages applied to each successful fetch:
//! raw persistence, processing into a cleaned record, and normalization
//! into flat analytical rows. Every stage derives its output location from
//! the payload's own capture date so replays land in the same bucket.

pub mod json_store;
pub mod normalizer;
pub mod payload;
pub mod processor;

use std::path::{Path, PathBuf};

use log::debug;

use crate::harvest_engine::errors::{HarvestError, HarvestResult};
use crate::work_source::HsCode;

pub use normalizer::{merge_mode_rows, normalize_record};
pub use payload::{
    HsHierarchy, NormalizedRow, PartnerRow, PayloadStatus, ProcessedRecord, RawMetadata,
    RawPayload, SourceInfo, Summary, SummaryLine, YearBlock,
};
pub use processor::{clean_value, process_raw_payload};

/// Files written for one (code, mode) pass through the pipeline
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StageOutputs {
    pub raw: PathBuf,
    pub processed: PathBuf,
    pub normalized: PathBuf,
    pub normalized_rows: usize,
}

/// Raw → processed → normalized, rooted at one data directory
#[derive(Debug, Clone)]
pub struct TransformPipeline {
    root: PathBuf,
}

impl TransformPipeline {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    #[must_use]
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Stage 1: write the payload verbatim
    ///
    /// # Errors
    /// `SchemaInvalid` if the embedded code cannot name a file, `Storage`
    /// on write failure.
    pub async fn persist_raw(&self, raw: &RawPayload) -> HarvestResult<PathBuf> {
        let code = file_code(&raw.metadata.code)?;
        let path = json_store::raw_path(
            &self.root,
            raw.metadata.mode,
            raw.metadata.scrape_date(),
            &code,
        );
        json_store::write_json(&path, raw).await?;
        debug!("Raw payload saved: {}", path.display());
        Ok(path)
    }

    /// Stage 2: validate, clean and persist
    pub async fn process(&self, raw: &RawPayload) -> HarvestResult<(ProcessedRecord, PathBuf)> {
        let record = process_raw_payload(raw)?;
        let path = json_store::processed_path(
            &self.root,
            record.mode,
            record.metadata.scrape_date(),
            &record.hs.hs8,
        );
        json_store::write_json(&path, &record).await?;
        debug!("Processed record saved: {}", path.display());
        Ok((record, path))
    }

    /// Stage 3: flatten and merge into the day's normalized file
    ///
    /// Only rows of the record's own mode are replaced.
    pub async fn normalize(&self, record: &ProcessedRecord) -> HarvestResult<(usize, PathBuf)> {
        let rows = normalize_record(record);
        let count = rows.len();
        let path = json_store::normalized_path(
            &self.root,
            record.metadata.scrape_date(),
            &record.hs.hs8,
        );

        let existing: Vec<NormalizedRow> = json_store::read_json_opt(&path).await?.unwrap_or_default();
        let merged = merge_mode_rows(existing, record.mode, rows);
        json_store::write_json(&path, &merged).await?;
        debug!("Normalized {count} rows into {}", path.display());
        Ok((count, path))
    }

    /// All three stages in order
    pub async fn run(&self, raw: &RawPayload) -> HarvestResult<StageOutputs> {
        let raw_path = self.persist_raw(raw).await?;
        let (record, processed_path) = self.process(raw).await?;
        let (normalized_rows, normalized_path) = self.normalize(&record).await?;
        Ok(StageOutputs {
            raw: raw_path,
            processed: processed_path,
            normalized: normalized_path,
            normalized_rows,
        })
    }
}

/// Code as used in a file name
///
/// Valid HS codes pass through; anything else non-empty and alphanumeric
/// is still accepted so malformed captures are kept for inspection.
fn file_code(code: &str) -> HarvestResult<String> {
    let code = code.trim();
    if let Ok(hs) = code.parse::<HsCode>() {
        return Ok(hs.to_string());
    }
    if !code.is_empty() && code.chars().all(|c| c.is_ascii_alphanumeric()) {
        return Ok(code.to_string());
    }
    Err(HarvestError::schema(format!(
        "invalid raw payload: metadata.code '{code}' cannot name a file"
    )))
}
