mod common;

use common::{PARTNERS, YEARS, capture_time, code, sample_payload};
use tradestat_harvester::pipeline::json_store::{normalized_path, processed_path, raw_path, read_json};
use tradestat_harvester::pipeline::{NormalizedRow, PayloadStatus, RawPayload, normalize_record, process_raw_payload};
use tradestat_harvester::{ErrorKind, TradeMode, TransformPipeline};

#[test]
fn process_cleans_numbers_and_stamps_versions() {
    let raw = sample_payload(&code("61091000"), TradeMode::Export);
    let record = process_raw_payload(&raw).unwrap();

    assert_eq!(record.schema_version, "v1");
    assert_eq!(record.hs.chapter, "61");
    assert_eq!(record.hs.heading, "6109");
    assert_eq!(record.mode, TradeMode::Export);

    for block in record.years.values() {
        for row in &block.partner_countries {
            assert_eq!(row.values["2023-2024"].as_deref(), Some("12345.6"));
            assert_eq!(row.values["%Growth"].as_deref(), Some("-3.5"));
        }
    }
    let first = &record.years["2024-2025"].partner_countries[1];
    assert_eq!(first.country.as_deref(), Some("United States"));
    assert_eq!(first.values["2024-2025"].as_deref(), Some("1234"));
}

#[test]
fn normalize_emits_one_row_per_year_and_partner() {
    let raw = sample_payload(&code("61091000"), TradeMode::Export);
    let record = process_raw_payload(&raw).unwrap();
    let rows = normalize_record(&record);

    assert_eq!(rows.len(), YEARS.len() * PARTNERS.len());
    for row in &rows {
        assert_eq!(row.code, "61091000");
        assert_eq!(row.chapter, "61");
        assert_eq!(row.heading, "6109");
        assert_eq!(row.mode, TradeMode::Export);
        assert_eq!(row.scrape_date, capture_time().date_naive());
    }
    let json = serde_json::to_value(&rows[0]).unwrap();
    assert_eq!(json["mode"], "export");
    assert_eq!(json["Country"], "Nepal");
}

#[test]
fn stages_are_idempotent() {
    let raw = sample_payload(&code("61091000"), TradeMode::Import);
    let a = process_raw_payload(&raw).unwrap();
    let b = process_raw_payload(&raw).unwrap();
    assert_ne!(a.record_id, b.record_id);
    assert_eq!(a.years, b.years);
    assert_eq!(a.hs, b.hs);

    assert_eq!(normalize_record(&a), normalize_record(&a));
}

#[test]
fn missing_fields_are_schema_errors() {
    let mut raw = sample_payload(&code("61091000"), TradeMode::Export);
    raw.data_by_year = None;
    let err = process_raw_payload(&raw).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::SchemaInvalid);

    let mut raw = sample_payload(&code("61091000"), TradeMode::Export);
    raw.metadata.code = String::new();
    assert_eq!(process_raw_payload(&raw).unwrap_err().kind(), ErrorKind::SchemaInvalid);

    let mut raw = sample_payload(&code("61091000"), TradeMode::Export);
    raw.status = PayloadStatus::Failed;
    assert_eq!(process_raw_payload(&raw).unwrap_err().kind(), ErrorKind::SchemaInvalid);
}

#[tokio::test]
async fn run_writes_all_three_stages_under_the_capture_date() {
    let dir = tempfile::tempdir().unwrap();
    let pipeline = TransformPipeline::new(dir.path());
    let raw = sample_payload(&code("61091000"), TradeMode::Export);
    let day = capture_time().date_naive();

    let outputs = pipeline.run(&raw).await.unwrap();
    assert_eq!(outputs.raw, raw_path(dir.path(), TradeMode::Export, day, "61091000"));
    assert_eq!(outputs.processed, processed_path(dir.path(), TradeMode::Export, day, "61091000"));
    assert_eq!(outputs.normalized, normalized_path(dir.path(), day, "61091000"));
    assert_eq!(outputs.normalized_rows, 6);

    let stored: RawPayload = read_json(&outputs.raw).await.unwrap();
    assert_eq!(stored, raw, "raw stage is verbatim");
    assert!(outputs.raw.to_string_lossy().contains("2025-03-14"));

    // Re-running replaces rather than appends
    pipeline.run(&raw).await.unwrap();
    let rows: Vec<NormalizedRow> = read_json(&outputs.normalized).await.unwrap();
    assert_eq!(rows.len(), 6);
}

#[tokio::test]
async fn export_and_import_share_the_normalized_file() {
    let dir = tempfile::tempdir().unwrap();
    let pipeline = TransformPipeline::new(dir.path());
    let hs = code("61091000");

    let export = pipeline.run(&sample_payload(&hs, TradeMode::Export)).await.unwrap();
    let import = pipeline.run(&sample_payload(&hs, TradeMode::Import)).await.unwrap();
    assert_eq!(export.normalized, import.normalized);

    let rows: Vec<NormalizedRow> = read_json(&import.normalized).await.unwrap();
    assert_eq!(rows.len(), 12);
    assert_eq!(rows.iter().filter(|r| r.mode == TradeMode::Export).count(), 6);
    assert!(rows[..6].iter().all(|r| r.mode == TradeMode::Export), "rows ordered by mode");
}

#[tokio::test]
async fn malformed_payload_still_lands_in_raw() {
    let dir = tempfile::tempdir().unwrap();
    let pipeline = TransformPipeline::new(dir.path());
    let mut raw = sample_payload(&code("61091000"), TradeMode::Export);
    raw.data_by_year = None;

    let err = pipeline.run(&raw).await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::SchemaInvalid);
    let day = capture_time().date_naive();
    assert!(raw_path(dir.path(), TradeMode::Export, day, "61091000").exists());
    assert!(!processed_path(dir.path(), TradeMode::Export, day, "61091000").exists());
}
