//! Process stage: validate a raw payload and clean its values

use std::collections::BTreeMap;
use std::sync::LazyLock;

use chrono::Utc;
use regex::Regex;
use uuid::Uuid;

use super::payload::{
    HsHierarchy, PartnerRow, PayloadStatus, ProcessedRecord, RawPayload, SourceInfo, Summary,
    YearBlock,
};
use crate::harvest_engine::errors::{HarvestError, HarvestResult};
use crate::utils::{PIPELINE_VERSION, SCHEMA_VERSION, ist};
use crate::work_source::HsCode;

static NUMERIC_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^-?\d+(\.\d+)?$").expect("NUMERIC_RE: hardcoded regex is valid")
});

const SOURCE_SITE: &str = "https://tradestat.commerce.gov.in";
const SOURCE_DATASET: &str = "Commodity-wise all Countries";
const SOURCE_COUNTRY: &str = "India";

/// Trim a cell; drop thousands separators when what remains is a number
///
/// `" 12,345.6 "` becomes `"12345.6"`, `"United States"` only loses its
/// surrounding whitespace.
#[must_use]
pub fn clean_value(raw: &str) -> String {
    let trimmed = raw.trim();
    let stripped = trimmed.replace(',', "");
    if NUMERIC_RE.is_match(&stripped) {
        stripped
    } else {
        trimmed.to_string()
    }
}

fn clean_opt(value: Option<&String>) -> Option<String> {
    value.map(|v| clean_value(v))
}

fn clean_row(row: &PartnerRow) -> PartnerRow {
    PartnerRow {
        serial: clean_opt(row.serial.as_ref()),
        country: clean_opt(row.country.as_ref()),
        values: row
            .values
            .iter()
            .map(|(k, v)| (k.clone(), clean_opt(v.as_ref())))
            .collect(),
    }
}

fn clean_summary(summary: &Summary) -> Summary {
    summary
        .iter()
        .map(|(line, cells)| {
            let cleaned = cells
                .iter()
                .map(|(k, v)| (k.clone(), clean_opt(v.as_ref())))
                .collect();
            (line.clone(), cleaned)
        })
        .collect()
}

fn clean_year(block: &YearBlock) -> YearBlock {
    YearBlock {
        product_label: block.product_label.as_ref().map(|l| l.trim().to_string()),
        partner_countries: block.partner_countries.iter().map(clean_row).collect(),
        summary: block.summary.as_ref().map(clean_summary),
        total_pages: block.total_pages,
    }
}

/// Validate required fields and build the cleaned record
///
/// # Errors
/// `SchemaInvalid` when the payload is not a success capture, when
/// `metadata.code` is empty or not an HS code, or when `data_by_year` is
/// missing.
pub fn process_raw_payload(raw: &RawPayload) -> HarvestResult<ProcessedRecord> {
    if raw.status != PayloadStatus::Success {
        return Err(HarvestError::schema(format!(
            "payload for '{}' has status FAILED",
            raw.metadata.code
        )));
    }

    if raw.metadata.code.trim().is_empty() {
        return Err(HarvestError::schema("invalid raw payload: missing metadata.code"));
    }
    let code: HsCode = raw
        .metadata
        .code
        .parse()
        .map_err(|e| HarvestError::schema(format!("invalid raw payload: {e}")))?;

    let data_by_year = raw.data_by_year.as_ref().ok_or_else(|| {
        HarvestError::schema(format!("invalid raw payload for {code}: missing data_by_year"))
    })?;

    let years: BTreeMap<String, YearBlock> = data_by_year
        .iter()
        .map(|(year, block)| (year.clone(), clean_year(block)))
        .collect();

    Ok(ProcessedRecord {
        record_id: Uuid::new_v4(),
        schema_version: SCHEMA_VERSION.to_string(),
        pipeline_version: PIPELINE_VERSION.to_string(),
        processed_at: Utc::now().with_timezone(&ist()),
        metadata: raw.metadata.clone(),
        hs: HsHierarchy::from(&code),
        mode: raw.metadata.mode,
        source: SourceInfo {
            site: SOURCE_SITE.to_string(),
            dataset: SOURCE_DATASET.to_string(),
            country: SOURCE_COUNTRY.to_string(),
        },
        years,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn numeric_cells_lose_separators() {
        assert_eq!(clean_value("12,345.6"), "12345.6");
        assert_eq!(clean_value(" -1,000 "), "-1000");
        assert_eq!(clean_value("0.25"), "0.25");
    }

    #[test]
    fn text_cells_are_only_trimmed() {
        assert_eq!(clean_value("  U S A "), "U S A");
        assert_eq!(clean_value("Korea, Rep."), "Korea, Rep.");
        assert_eq!(clean_value("1,2a"), "1,2a");
        assert_eq!(clean_value(""), "");
    }

    #[test]
    fn cleaning_is_idempotent() {
        for v in ["12,345.6", " 7 ", "N.A.", "-3.5", "1,000,000"] {
            let once = clean_value(v);
            assert_eq!(clean_value(&once), once);
        }
    }
}
