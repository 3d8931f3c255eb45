//! Squirrel-style feed updater.
//!
//! The feed answers `204 No Content` when the running version is current and
//! `200` with `{"url": "<package>"}` when a newer package exists. The package
//! is streamed through the download queue so the dock badge and progress
//! indicator show it like any other download.

use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use reqwest::StatusCode;
use serde::Deserialize;
use url::Url;

use super::coordinator::{TransitionSender, Updater};
use super::state::UpdateTransition;
use crate::download::{DownloadQueue, FileOpener, SystemOpener, fetch_to};
use crate::error::UpdateError;

const FALLBACK_PACKAGE_NAME: &str = "pgadmin4-update.zip";

#[derive(Debug, Deserialize)]
struct FeedResponse {
    url: String,
}

/// What the feed said.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FeedAnswer {
    UpToDate,
    Available(Url),
}

#[derive(Clone)]
pub struct SquirrelUpdater {
    client: reqwest::Client,
    queue: Arc<DownloadQueue>,
    download_dir: PathBuf,
    downloaded: Arc<Mutex<Option<PathBuf>>>,
    opener: Arc<dyn FileOpener>,
}

impl SquirrelUpdater {
    pub fn new(queue: Arc<DownloadQueue>, download_dir: impl Into<PathBuf>) -> Self {
        Self {
            client: reqwest::Client::new(),
            queue,
            download_dir: download_dir.into(),
            downloaded: Arc::new(Mutex::new(None)),
            opener: Arc::new(SystemOpener),
        }
    }

    pub fn with_opener(mut self, opener: Arc<dyn FileOpener>) -> Self {
        self.opener = opener;
        self
    }

    /// Package fetched by the last successful check.
    pub fn downloaded_package(&self) -> Option<PathBuf> {
        self.downloaded
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .clone()
    }

    /// Query the feed once.
    pub async fn query(&self, feed: &Url) -> Result<FeedAnswer, UpdateError> {
        let response = self.client.get(feed.clone()).send().await?;
        match response.status() {
            StatusCode::NO_CONTENT => Ok(FeedAnswer::UpToDate),
            StatusCode::OK => {
                let body: FeedResponse = response.json().await?;
                Ok(FeedAnswer::Available(Url::parse(&body.url)?))
            }
            other => Err(UpdateError::Status(other.as_u16())),
        }
    }

    /// Run one full check, reporting each step on `events`.
    pub async fn check(&self, feed: Url, events: &TransitionSender) -> Result<(), UpdateError> {
        let report = |t: UpdateTransition| {
            if events.send(t).is_err() {
                log::debug!("Update coordinator gone, dropping {t}");
            }
        };

        match self.query(&feed).await? {
            FeedAnswer::UpToDate => {
                log::info!("No update available");
                report(UpdateTransition::UpdateNotAvailable);
            }
            FeedAnswer::Available(package) => {
                log::info!("Update available at {package}");
                report(UpdateTransition::UpdateAvailable);

                let dest = self.download_dir.join(package_file_name(&package));
                fetch_to(&self.client, package.as_str(), &self.queue, &dest, false).await?;
                *self.downloaded.lock().unwrap_or_else(|e| e.into_inner()) = Some(dest);
                report(UpdateTransition::UpdateDownloaded);
            }
        }
        Ok(())
    }
}

impl Updater for SquirrelUpdater {
    fn start_check(&self, feed: Url, events: TransitionSender) -> Result<(), UpdateError> {
        let handle = tokio::runtime::Handle::try_current()
            .map_err(|e| UpdateError::Updater(format!("no async runtime for update check: {e}")))?;
        let updater = self.clone();
        handle.spawn(async move {
            if let Err(e) = updater.check(feed, &events).await {
                log::error!("Update check failed: {e:#}");
                let _ = events.send(UpdateTransition::ErrorClose);
            }
        });
        Ok(())
    }

    fn install(&self) -> Result<(), UpdateError> {
        let package = self
            .downloaded_package()
            .ok_or_else(|| UpdateError::Updater("no update package on disk".to_string()))?;
        log::info!("Opening update package {}", package.display());
        self.opener
            .open(&package)
            .map_err(|e| UpdateError::Updater(format!("failed to open {}: {e}", package.display())))
    }
}

fn package_file_name(package: &Url) -> PathBuf {
    package
        .path_segments()
        .and_then(|mut segments| segments.next_back())
        .filter(|name| !name.is_empty())
        .map(|name| Path::new(name).to_path_buf())
        .unwrap_or_else(|| PathBuf::from(FALLBACK_PACKAGE_NAME))
}
