use std::io::Write;

use tradestat_harvester::harvest_engine::ErrorKind;
use tradestat_harvester::work_source::{chunk_items, chunk_items_checked, load_codes_from_path, parse_codes};
use tradestat_harvester::HsCode;

#[test]
fn chunks_cover_input_in_order() {
    for n in [0usize, 1, 7, 20, 21, 100] {
        let items: Vec<usize> = (0..n).collect();
        for size in [1usize, 3, 20, 25] {
            let chunks = chunk_items(&items, size).unwrap();
            assert_eq!(chunks.len(), n.div_ceil(size));
            assert!(chunks.iter().rev().skip(1).all(|c| c.len() == size));
            let flat: Vec<usize> = chunks.into_iter().flatten().collect();
            assert_eq!(flat, items);
        }
    }
}

#[test]
fn non_positive_chunk_size_is_a_configuration_error() {
    let items = vec![1, 2, 3];
    assert_eq!(chunk_items(&items, 0).unwrap_err().kind(), ErrorKind::ConfigInvalid);
    assert_eq!(chunk_items_checked(&items, 0).unwrap_err().kind(), ErrorKind::ConfigInvalid);
    assert_eq!(chunk_items_checked(&items, -4).unwrap_err().kind(), ErrorKind::ConfigInvalid);
    assert_eq!(chunk_items_checked(&items, 2).unwrap().len(), 2);
}

#[test]
fn parse_skips_blank_invalid_and_duplicate_lines() {
    let text = "61091000\n\n  61091000\n6109100A\n610910\n52010011\n";
    let (codes, report) = parse_codes(text);

    let codes: Vec<&str> = codes.iter().map(HsCode::as_str).collect();
    assert_eq!(codes, ["61091000", "52010011"]);
    assert_eq!(report.accepted, 2);
    assert_eq!(report.blank, 1);
    assert_eq!(report.invalid, 2);
    assert_eq!(report.duplicate, 1);
}

#[test]
fn hs_code_exposes_its_hierarchy() {
    let code: HsCode = "61091000".parse().unwrap();
    assert_eq!(code.chapter(), "61");
    assert_eq!(code.heading(), "6109");
    assert_eq!(code.sub_heading(), "610910");
    assert!("6109100".parse::<HsCode>().is_err());
}

#[tokio::test]
async fn load_from_file_keeps_first_seen_order() {
    let mut file = tempfile::NamedTempFile::new().unwrap();
    writeln!(file, "52010011").unwrap();
    writeln!(file, "61091000").unwrap();
    writeln!(file, "52010011").unwrap();

    let (codes, report) = load_codes_from_path(file.path()).await.unwrap();
    assert_eq!(codes.len(), 2);
    assert_eq!(codes[0].as_str(), "52010011");
    assert_eq!(report.duplicate, 1);

    let missing = file.path().with_extension("missing");
    assert!(load_codes_from_path(&missing).await.is_err());
}
