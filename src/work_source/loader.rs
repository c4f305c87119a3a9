//! Loading the list of target codes
//!
//! One code per line. Blank lines are ignored; malformed and duplicate
//! entries are dropped with a warning that names the line.

use std::collections::HashSet;
use std::path::Path;

use anyhow::{Context, Result};
use log::{info, warn};

use super::hs_code::{HsCode, HsCodeError};

/// Counts collected while loading a work list
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LoadReport {
    pub accepted: usize,
    pub blank: usize,
    pub invalid: usize,
    pub duplicate: usize,
}

/// Parse a newline-separated work list, keeping first-seen order
#[must_use]
pub fn parse_codes(text: &str) -> (Vec<HsCode>, LoadReport) {
    let mut report = LoadReport::default();
    let mut seen = HashSet::new();
    let mut codes = Vec::new();

    for (idx, line) in text.lines().enumerate() {
        let line_no = idx + 1;
        let candidate = line.trim();

        if candidate.is_empty() {
            report.blank += 1;
            continue;
        }

        match candidate.parse::<HsCode>() {
            Ok(code) => {
                if seen.insert(code.clone()) {
                    codes.push(code);
                } else {
                    warn!("Line {line_no}: duplicate HS code skipped: {candidate}");
                    report.duplicate += 1;
                }
            }
            Err(HsCodeError::NonNumeric(_)) => {
                warn!("Line {line_no}: non-numeric HS code skipped: {candidate}");
                report.invalid += 1;
            }
            Err(HsCodeError::InvalidLength { .. }) => {
                warn!("Line {line_no}: invalid length HS code skipped: {candidate}");
                report.invalid += 1;
            }
        }
    }

    report.accepted = codes.len();
    info!(
        "Loaded {} valid HS codes ({} invalid, {} duplicate)",
        report.accepted, report.invalid, report.duplicate
    );
    (codes, report)
}

/// Read and parse a work list file
pub async fn load_codes_from_path(path: &Path) -> Result<(Vec<HsCode>, LoadReport)> {
    let text = tokio::fs::read_to_string(path)
        .await
        .with_context(|| format!("Failed to read HS code list: {}", path.display()))?;
    Ok(parse_codes(&text))
}
