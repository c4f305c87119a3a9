//! Date-partitioned JSON persistence
//!
//! Layout under the data root:
//!
//! ```text
//! raw/<mode>/<YYYY-MM-DD>/HS_<code>.json
//! processed/<mode>/<YYYY-MM-DD>/HS_<code>.json
//! normalized/<YYYY-MM-DD>/HS_<code>_normalized.json
//! ```

use std::io::Write;
use std::path::{Path, PathBuf};
use std::time::Duration;

use chrono::NaiveDate;
use serde::Serialize;
use serde::de::DeserializeOwned;
use tempfile::NamedTempFile;
use tokio::time::timeout;

use crate::harvest_engine::errors::{HarvestError, HarvestResult};
use crate::scrape_task::TradeMode;

/// Timeout for blocking serialization and write
const BLOCKING_WRITE_TIMEOUT: Duration = Duration::from_secs(10);

fn day(date: NaiveDate) -> String {
    date.format("%Y-%m-%d").to_string()
}

#[must_use]
pub fn raw_path(root: &Path, mode: TradeMode, date: NaiveDate, code: &str) -> PathBuf {
    root.join("raw")
        .join(mode.as_str())
        .join(day(date))
        .join(format!("HS_{code}.json"))
}

#[must_use]
pub fn processed_path(root: &Path, mode: TradeMode, date: NaiveDate, code: &str) -> PathBuf {
    root.join("processed")
        .join(mode.as_str())
        .join(day(date))
        .join(format!("HS_{code}.json"))
}

#[must_use]
pub fn normalized_path(root: &Path, date: NaiveDate, code: &str) -> PathBuf {
    root.join("normalized")
        .join(day(date))
        .join(format!("HS_{code}_normalized.json"))
}

/// Serialize `value` as pretty JSON and atomically replace `path`
pub async fn write_json<T>(path: &Path, value: &T) -> HarvestResult<()>
where
    T: Serialize + Clone + Send + 'static,
{
    let parent = path
        .parent()
        .ok_or_else(|| HarvestError::Storage(std::io::Error::other("path has no parent directory")))?
        .to_path_buf();
    tokio::fs::create_dir_all(&parent).await?;

    let value = value.clone();
    let target = path.to_path_buf();
    let blocking_task = tokio::task::spawn_blocking(move || -> HarvestResult<()> {
        let json = serde_json::to_vec_pretty(&value)?;
        // temp file in the target directory keeps the rename atomic
        let mut temp_file = NamedTempFile::new_in(&parent)?;
        temp_file.write_all(&json)?;
        temp_file.write_all(b"\n")?;
        temp_file
            .persist(&target)
            .map_err(|e| HarvestError::Storage(e.error))?;
        Ok(())
    });

    match timeout(BLOCKING_WRITE_TIMEOUT, blocking_task).await {
        Ok(Ok(result)) => result,
        Ok(Err(e)) => Err(HarvestError::Storage(std::io::Error::other(format!(
            "JSON write task panicked: {e}"
        )))),
        Err(_) => {
            log::warn!("JSON write timeout for {} (timeout: {BLOCKING_WRITE_TIMEOUT:?})", path.display());
            Err(HarvestError::Storage(std::io::Error::new(
                std::io::ErrorKind::TimedOut,
                format!("JSON write timed out after {BLOCKING_WRITE_TIMEOUT:?}"),
            )))
        }
    }
}

/// Read and deserialize a JSON file
pub async fn read_json<T: DeserializeOwned>(path: &Path) -> HarvestResult<T> {
    let bytes = tokio::fs::read(path).await?;
    Ok(serde_json::from_slice(&bytes)?)
}

/// Like `read_json`, but a missing file is `None`
pub async fn read_json_opt<T: DeserializeOwned>(path: &Path) -> HarvestResult<Option<T>> {
    match tokio::fs::read(path).await {
        Ok(bytes) => Ok(Some(serde_json::from_slice(&bytes)?)),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
        Err(e) => Err(e.into()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn layout_is_partitioned_by_mode_and_date() {
        let root = Path::new("/data");
        let date = NaiveDate::from_ymd_opt(2025, 3, 14).unwrap();
        assert_eq!(
            raw_path(root, TradeMode::Export, date, "61091000"),
            PathBuf::from("/data/raw/export/2025-03-14/HS_61091000.json")
        );
        assert_eq!(
            processed_path(root, TradeMode::Import, date, "61091000"),
            PathBuf::from("/data/processed/import/2025-03-14/HS_61091000.json")
        );
        assert_eq!(
            normalized_path(root, date, "61091000"),
            PathBuf::from("/data/normalized/2025-03-14/HS_61091000_normalized.json")
        );
    }
}
