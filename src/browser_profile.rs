//! Chrome profile directories for pooled browsers
//!
//! Every pooled browser gets its own UUID-named profile under the temp
//! directory, so concurrent instances never fight over a SingletonLock.

use anyhow::{Context, Result};
use std::path::{Path, PathBuf};
use std::time::{Duration, SystemTime};
use tracing::{debug, info, warn};
use uuid::Uuid;

/// Prefix of every profile directory this crate creates
pub const PROFILE_PREFIX: &str = "tradestat_chrome";

/// Profiles untouched for this long are considered orphaned
const STALE_PROFILE_AGE: Duration = Duration::from_secs(24 * 60 * 60);

/// Owned profile directory, removed on drop
#[derive(Debug)]
pub struct BrowserProfile {
    path: PathBuf,
}

impl BrowserProfile {
    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl Drop for BrowserProfile {
    fn drop(&mut self) {
        if self.path.exists() {
            debug!("Removing browser profile {}", self.path.display());
            if let Err(e) = std::fs::remove_dir_all(&self.path) {
                warn!("Failed to remove profile directory {}: {e}", self.path.display());
            }
        }
    }
}

/// Create `<tmp>/tradestat_chrome_<slot>_<uuid>`
///
/// `create_dir` (not `create_dir_all`) so a collision fails loudly.
pub fn create_unique_profile(slot: u64) -> Result<BrowserProfile> {
    let path = std::env::temp_dir().join(format!("{PROFILE_PREFIX}_{slot}_{}", Uuid::new_v4()));
    std::fs::create_dir(&path)
        .with_context(|| format!("Failed to create profile directory: {}", path.display()))?;
    debug!("Created Chrome profile directory: {}", path.display());
    Ok(BrowserProfile { path })
}

/// Remove profile directories left behind by crashed runs
///
/// Only directories carrying [`PROFILE_PREFIX`] and not modified for a day
/// are touched. Returns how many were removed.
pub fn cleanup_stale_profiles() -> Result<usize> {
    let temp_dir = std::env::temp_dir();
    let entries = std::fs::read_dir(&temp_dir)
        .with_context(|| format!("Failed to read temp directory: {}", temp_dir.display()))?;

    let now = SystemTime::now();
    let mut cleaned = 0;

    for entry in entries.flatten() {
        let path = entry.path();
        let ours = path
            .file_name()
            .and_then(|n| n.to_str())
            .is_some_and(|n| n.starts_with(PROFILE_PREFIX));
        if !ours || !path.is_dir() {
            continue;
        }

        let stale = entry
            .metadata()
            .and_then(|m| m.modified())
            .ok()
            .and_then(|modified| now.duration_since(modified).ok())
            .is_some_and(|age| age > STALE_PROFILE_AGE);

        if stale {
            match std::fs::remove_dir_all(&path) {
                Ok(()) => cleaned += 1,
                Err(e) => warn!("Failed to remove stale profile {}: {e}", path.display()),
            }
        }
    }

    if cleaned > 0 {
        info!("Cleaned {cleaned} stale Chrome profile directories");
    }
    Ok(cleaned)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn profile_is_removed_on_drop() {
        let profile = create_unique_profile(7).unwrap();
        let path = profile.path().to_path_buf();
        assert!(path.exists());
        assert!(path.to_string_lossy().contains("tradestat_chrome_7_"));
        drop(profile);
        assert!(!path.exists());
    }
}
