//! Normalize stage: one flat row per (year, partner country)

use std::collections::BTreeMap;

use super::payload::{NormalizedRow, ProcessedRecord, Summary};
use crate::scrape_task::TradeMode;

/// Column name for one summary cell
fn summary_column(line: &str, key: &str) -> String {
    format!("summary_{line}_{key}")
}

fn flatten_summary(summary: Option<&Summary>) -> BTreeMap<String, Option<String>> {
    summary
        .into_iter()
        .flat_map(|s| s.iter())
        .flat_map(|(line, cells)| {
            cells
                .iter()
                .map(move |(key, value)| (summary_column(line, key), value.clone()))
        })
        .collect()
}

/// Flatten a processed record
///
/// Pure: the same record always yields the same rows, in year order and
/// then table order.
#[must_use]
pub fn normalize_record(record: &ProcessedRecord) -> Vec<NormalizedRow> {
    let meta = &record.metadata;
    let scrape_date = meta.scrape_date();
    let mut rows = Vec::new();

    for (year, block) in &record.years {
        let summary_columns = flatten_summary(block.summary.as_ref());

        for partner in &block.partner_countries {
            let mut columns = partner.values.clone();
            columns.extend(summary_columns.clone());

            rows.push(NormalizedRow {
                record_id: record.record_id,
                schema_version: record.schema_version.clone(),
                pipeline_version: record.pipeline_version.clone(),
                code: record.hs.hs8.clone(),
                mode: record.mode,
                chapter: record.hs.chapter.clone(),
                heading: record.hs.heading.clone(),
                sub_heading: record.hs.sub_heading.clone(),
                hs8: record.hs.hs8.clone(),
                year: year.clone(),
                product_label: block.product_label.clone(),
                scraped_at: meta.scraped_at,
                scrape_date,
                data_frequency: meta.data_frequency.clone(),
                currency: meta.currency.clone(),
                source_site: meta.source_site.clone(),
                serial: partner.serial.clone(),
                country: partner.country.clone(),
                columns,
            });
        }
    }

    rows
}

/// Replace `mode`'s rows inside an existing row set
///
/// Rows of the other mode are kept; the result is ordered by mode so
/// repeated merges of the same input are stable.
#[must_use]
pub fn merge_mode_rows(
    existing: Vec<NormalizedRow>,
    mode: TradeMode,
    fresh: Vec<NormalizedRow>,
) -> Vec<NormalizedRow> {
    let mut merged: Vec<NormalizedRow> = existing.into_iter().filter(|r| r.mode != mode).collect();
    merged.extend(fresh);
    merged.sort_by_key(|r| r.mode);
    merged
}
