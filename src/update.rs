//! Self-update check against the GitHub releases feed.
//!
//! Advisory only: the throttled [`UpdateChecker::check`] swallows every
//! failure and reports "no update".

use std::fs;
use std::future::Future;
use std::path::PathBuf;
use std::time::Duration;

use chrono::{DateTime, Local, TimeZone, Utc};
use reqwest::Client;
use serde::Deserialize;
use tracing::{debug, info, warn};

pub const CURRENT_VERSION: &str = env!("CARGO_PKG_VERSION");

/// Minimum time between two throttled checks.
pub const CHECK_INTERVAL: Duration = Duration::from_secs(3600);

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UpdateInfo {
    pub version: String,
    pub url: String,
    pub notes: String,
    pub download_url: String,
}

#[derive(Debug, thiserror::Error)]
pub enum UpdateError {
    #[error("update request failed: {0}")]
    Network(#[from] reqwest::Error),

    #[error("release feed returned HTTP {0}")]
    Status(u16),

    #[error("release feed has no version tag")]
    MissingTag,
}

/// The fields of a release we use.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct Release {
    #[serde(default)]
    pub tag_name: String,
    #[serde(default)]
    pub html_url: String,
    #[serde(default)]
    pub body: Option<String>,
    #[serde(default)]
    pub zipball_url: Option<String>,
}

/// Where the latest release comes from.
pub trait ReleaseFeed: Send + Sync {
    fn latest(&self) -> impl Future<Output = Result<Release, UpdateError>> + Send;
}

pub struct GithubReleases {
    client: Client,
    url: String,
}

impl GithubReleases {
    pub fn new(url: &str, timeout: Duration) -> Result<Self, UpdateError> {
        let client = Client::builder()
            .connect_timeout(timeout)
            .timeout(timeout)
            .user_agent("TTS-Pronunciation-Practice")
            .build()?;

        Ok(Self {
            client,
            url: url.to_string(),
        })
    }
}

impl ReleaseFeed for GithubReleases {
    async fn latest(&self) -> Result<Release, UpdateError> {
        let resp = self
            .client
            .get(&self.url)
            .header("Accept", "application/vnd.github.v3+json")
            .send()
            .await?;

        if !resp.status().is_success() {
            return Err(UpdateError::Status(resp.status().as_u16()));
        }
        Ok(resp.json::<Release>().await?)
    }
}

/// Parse the numeric dot-separated fields of a version, dropping any field
/// that isn't all digits.
fn version_fields(version: &str) -> Vec<u64> {
    version
        .split('.')
        .filter(|field| !field.is_empty() && field.bytes().all(|b| b.is_ascii_digit()))
        .filter_map(|field| field.parse().ok())
        .collect()
}

/// True if `candidate` is strictly newer than `current`, comparing numeric
/// fields left to right (so `1.10` is newer than `1.2`).
pub fn compare_versions(candidate: &str, current: &str) -> bool {
    version_fields(candidate) > version_fields(current)
}

pub struct UpdateChecker<F = GithubReleases> {
    feed: F,
    current_version: String,
    stamp_path: PathBuf,
}

impl<F: ReleaseFeed> UpdateChecker<F> {
    pub fn new(feed: F, current_version: &str, stamp_path: PathBuf) -> Self {
        Self {
            feed,
            current_version: current_version.to_string(),
            stamp_path,
        }
    }

    pub fn current_version(&self) -> &str {
        &self.current_version
    }

    /// Throttled check. Skipped entirely when the last attempt was less than
    /// an hour ago; failures are logged and reported as "no update".
    pub async fn check(&self) -> Option<UpdateInfo> {
        if let Some(elapsed) = self.seconds_since_last_check() {
            if elapsed < CHECK_INTERVAL.as_secs_f64() {
                debug!("Skipping update check, last one {elapsed:.0}s ago");
                return None;
            }
        }

        match self.check_now().await {
            Ok(info) => info,
            Err(e) => {
                warn!("Update check failed: {e}");
                None
            }
        }
    }

    /// Unthrottled check for the "Check for Updates" dialog.
    pub async fn check_now(&self) -> Result<Option<UpdateInfo>, UpdateError> {
        self.record_check();

        let release = self.feed.latest().await?;
        let latest = release.tag_name.trim().trim_start_matches('v');
        if latest.is_empty() {
            return Err(UpdateError::MissingTag);
        }

        if !compare_versions(latest, &self.current_version) {
            info!("Up to date (latest release {latest}, running {})", self.current_version);
            return Ok(None);
        }

        info!("Update available: {latest} (running {})", self.current_version);
        Ok(Some(UpdateInfo {
            version: latest.to_string(),
            url: release.html_url,
            notes: release
                .body
                .filter(|b| !b.trim().is_empty())
                .unwrap_or_else(|| "No release notes available.".into()),
            download_url: release.zipball_url.unwrap_or_default(),
        }))
    }

    /// When the last check was attempted, if ever.
    pub fn last_checked(&self) -> Option<DateTime<Local>> {
        let secs = self.read_stamp()?;
        let millis = (secs * 1000.0) as i64;
        Utc.timestamp_millis_opt(millis)
            .single()
            .map(|t| t.with_timezone(&Local))
    }

    fn read_stamp(&self) -> Option<f64> {
        let contents = fs::read_to_string(&self.stamp_path).ok()?;
        contents.trim().parse::<f64>().ok().filter(|s| s.is_finite())
    }

    fn seconds_since_last_check(&self) -> Option<f64> {
        let last = self.read_stamp()?;
        Some(now_secs() - last)
    }

    fn record_check(&self) {
        if let Some(dir) = self.stamp_path.parent() {
            let _ = fs::create_dir_all(dir);
        }
        if let Err(e) = fs::write(&self.stamp_path, format!("{:.6}", now_secs())) {
            warn!("Failed to record update check time: {e}");
        }
    }
}

fn now_secs() -> f64 {
    Utc::now().timestamp_millis() as f64 / 1000.0
}
