//! Chromium discovery, launch and the production pool factory

use anyhow::{Context, Result};
use async_trait::async_trait;
use chromiumoxide::browser::{Browser, BrowserConfigBuilder, HeadlessMode};
use chromiumoxide::fetcher::{BrowserFetcher, BrowserFetcherOptions};
use futures::StreamExt;
use std::path::{Path, PathBuf};
use std::process::Command;
use std::time::Duration;
use tokio::task::{self, JoinHandle};
use tracing::{debug, error, info, trace, warn};

use crate::browser_pool::{ResourceFactory, ResourcePool};
use crate::browser_profile::{BrowserProfile, create_unique_profile};
use crate::harvest_engine::errors::{HarvestError, HarvestResult};
use crate::utils::constants::CHROME_USER_AGENT;

/// Pool of Chromium instances
pub type BrowserPool = ResourcePool<ChromiumLauncher>;

fn candidate_paths() -> Vec<PathBuf> {
    let raw: &[&str] = if cfg!(target_os = "windows") {
        &[
            r"C:\Program Files\Google\Chrome\Application\chrome.exe",
            r"C:\Program Files (x86)\Google\Chrome\Application\chrome.exe",
            r"C:\Program Files\Chromium\Application\chrome.exe",
        ]
    } else if cfg!(target_os = "macos") {
        &[
            "/Applications/Google Chrome.app/Contents/MacOS/Google Chrome",
            "/Applications/Chromium.app/Contents/MacOS/Chromium",
            "~/Applications/Google Chrome.app/Contents/MacOS/Google Chrome",
            "/opt/homebrew/bin/chromium",
        ]
    } else {
        &[
            "/usr/bin/google-chrome",
            "/usr/bin/google-chrome-stable",
            "/usr/bin/chromium",
            "/usr/bin/chromium-browser",
            "/snap/bin/chromium",
            "/usr/local/bin/chromium",
        ]
    };

    raw.iter()
        .filter_map(|p| match p.strip_prefix("~/") {
            Some(rest) => dirs::home_dir().map(|home| home.join(rest)),
            None => Some(PathBuf::from(p)),
        })
        .collect()
}

/// Locate a Chrome/Chromium binary
///
/// `CHROMIUM_PATH` wins, then well-known install locations, then `which`.
pub fn find_browser_executable() -> Result<PathBuf> {
    if let Ok(path) = std::env::var("CHROMIUM_PATH") {
        let path = PathBuf::from(path);
        if path.exists() {
            info!("Using browser from CHROMIUM_PATH: {}", path.display());
            return Ok(path);
        }
        warn!("CHROMIUM_PATH points to a missing file: {}", path.display());
    }

    if let Some(path) = candidate_paths().into_iter().find(|p| p.exists()) {
        info!("Found browser at: {}", path.display());
        return Ok(path);
    }

    if !cfg!(target_os = "windows") {
        for cmd in ["chromium", "chromium-browser", "google-chrome", "chrome"] {
            if let Ok(output) = Command::new("which").arg(cmd).output()
                && output.status.success()
            {
                let found = String::from_utf8_lossy(&output.stdout).trim().to_string();
                if !found.is_empty() {
                    info!("Found browser using 'which': {found}");
                    return Ok(PathBuf::from(found));
                }
            }
        }
    }

    Err(anyhow::anyhow!("Chrome/Chromium executable not found"))
}

/// Download a managed Chromium into the user cache directory
pub async fn download_managed_browser() -> Result<PathBuf> {
    let cache_dir = dirs::cache_dir()
        .unwrap_or_else(std::env::temp_dir)
        .join("tradestat_harvester")
        .join("chromium");
    tokio::fs::create_dir_all(&cache_dir)
        .await
        .context("Failed to create browser cache directory")?;

    info!("Downloading managed Chromium into {}", cache_dir.display());
    let fetcher = BrowserFetcher::new(
        BrowserFetcherOptions::builder()
            .with_path(&cache_dir)
            .build()
            .context("Failed to build fetcher options")?,
    );
    let revision = fetcher.fetch().await.context("Failed to fetch browser")?;
    info!("Downloaded Chromium to: {}", revision.folder_path.display());
    Ok(revision.executable_path)
}

/// Launch one browser with its own profile directory
///
/// Returns the browser and the task driving its CDP connection.
pub async fn launch_browser(
    executable: &Path,
    headless: bool,
    user_data_dir: &Path,
    request_timeout: Duration,
) -> Result<(Browser, JoinHandle<()>)> {
    let mut builder = BrowserConfigBuilder::default()
        .request_timeout(request_timeout)
        .window_size(1920, 1080)
        .user_data_dir(user_data_dir)
        .chrome_executable(executable);

    builder = if headless {
        builder.headless_mode(HeadlessMode::default())
    } else {
        builder.with_head()
    };

    let config = builder
        .arg(format!("--user-agent={CHROME_USER_AGENT}"))
        .arg("--disable-blink-features=AutomationControlled")
        .arg("--disable-infobars")
        .arg("--disable-notifications")
        .arg("--disable-extensions")
        .arg("--disable-popup-blocking")
        .arg("--disable-background-timer-throttling")
        .arg("--disable-backgrounding-occluded-windows")
        .arg("--disable-dev-shm-usage")
        .arg("--no-first-run")
        .arg("--no-default-browser-check")
        .arg("--no-sandbox")
        .arg("--password-store=basic")
        .arg("--mute-audio")
        .build()
        .map_err(|e| anyhow::anyhow!("Failed to build browser config: {e}"))?;

    let (browser, mut handler) = Browser::launch(config)
        .await
        .context("Failed to launch browser")?;

    let handler_task = task::spawn(async move {
        while let Some(event) = handler.next().await {
            if let Err(e) = event {
                let msg = e.to_string();
                // chromiumoxide cannot decode some newer CDP events; those are noise
                if msg.contains("data did not match any variant of untagged enum Message")
                    || msg.contains("Failed to deserialize WS response")
                {
                    trace!("Suppressed benign CDP error: {msg}");
                } else {
                    error!("Browser handler error: {e:?}");
                }
            }
        }
        debug!("Browser handler task completed");
    });

    Ok((browser, handler_task))
}

/// A pooled Chromium instance
#[derive(Debug)]
pub struct PooledBrowser {
    browser: Browser,
    handler: JoinHandle<()>,
    profile: BrowserProfile,
}

impl PooledBrowser {
    pub fn browser(&self) -> &Browser {
        &self.browser
    }

    pub fn profile_dir(&self) -> &Path {
        self.profile.path()
    }
}

/// Launches pooled Chromium instances
#[derive(Debug, Clone)]
pub struct ChromiumLauncher {
    executable: PathBuf,
    headless: bool,
    request_timeout: Duration,
}

impl ChromiumLauncher {
    /// Resolve the browser binary once, downloading it if needed
    pub async fn discover(headless: bool, request_timeout: Duration) -> HarvestResult<Self> {
        let executable = match find_browser_executable() {
            Ok(path) => path,
            Err(_) => {
                warn!("No Chrome/Chromium found locally, downloading a managed build");
                download_managed_browser()
                    .await
                    .map_err(|e| HarvestError::config(format!("no usable browser: {e:#}")))?
            }
        };
        Ok(Self {
            executable,
            headless,
            request_timeout,
        })
    }

    #[must_use]
    pub fn executable(&self) -> &Path {
        &self.executable
    }
}

#[async_trait]
impl ResourceFactory for ChromiumLauncher {
    type Resource = PooledBrowser;

    async fn launch(&self, id: u64) -> HarvestResult<PooledBrowser> {
        let profile = create_unique_profile(id)?;
        let (browser, handler) = launch_browser(
            &self.executable,
            self.headless,
            profile.path(),
            self.request_timeout,
        )
        .await?;
        info!("Launched pooled browser {id}");
        Ok(PooledBrowser {
            browser,
            handler,
            profile,
        })
    }

    async fn is_healthy(&self, resource: &PooledBrowser) -> bool {
        match resource.browser.version().await {
            Ok(version) => {
                trace!("Browser health check OK: {}", version.product);
                true
            }
            Err(e) => {
                warn!("Browser health check failed: {e}");
                false
            }
        }
    }

    /// Close the browser, wait for the process, then drop the profile
    async fn close(&self, resource: PooledBrowser) -> HarvestResult<()> {
        let PooledBrowser {
            mut browser,
            handler,
            profile,
        } = resource;

        let mut errors = Vec::new();
        if let Err(e) = browser.close().await {
            errors.push(format!("close: {e}"));
        }
        if let Err(e) = browser.wait().await {
            errors.push(format!("wait: {e}"));
        }
        handler.abort();
        drop(profile);

        if errors.is_empty() {
            Ok(())
        } else {
            Err(HarvestError::transient(format!(
                "browser cleanup incomplete: {}",
                errors.join("; ")
            )))
        }
    }
}
