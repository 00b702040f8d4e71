//! Simulated site downloads.
//!
//! A [`Downloader`] is the shared context every download task receives. It
//! sleeps for the configured latency (plus optional jitter) and then succeeds,
//! unless the site was configured to fail or to hang.

use crate::cli::config::AppConfig;
use core::time::Duration;
use fanout::CancellationToken;
use rand::Rng;
use std::collections::HashSet;
use thiserror::Error;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum DownloadError {
    #[error("connection to {site} refused after {latency:?}")]
    Refused { site: String, latency: Duration },

    #[error("download of {site} interrupted")]
    Interrupted { site: String },
}

/// A finished download.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Download {
    pub site: String,
    pub latency_ms: u64,
}

#[derive(Debug, Clone)]
pub struct Downloader {
    latency: Duration,
    jitter: Duration,
    fail: HashSet<String>,
    hang: HashSet<String>,
}

impl Downloader {
    pub fn new(latency: Duration, jitter: Duration) -> Self {
        Self {
            latency,
            jitter,
            fail: HashSet::new(),
            hang: HashSet::new(),
        }
    }

    #[must_use]
    pub fn failing(mut self, sites: impl IntoIterator<Item = String>) -> Self {
        self.fail.extend(sites);
        self
    }

    #[must_use]
    pub fn hanging(mut self, sites: impl IntoIterator<Item = String>) -> Self {
        self.hang.extend(sites);
        self
    }

    /// Downloads `site`, giving up as soon as `cancel` fires.
    pub async fn download(
        &self,
        site: &str,
        cancel: &CancellationToken,
    ) -> Result<Download, DownloadError> {
        if self.hang.contains(site) {
            cancel.cancelled().await;
            return Err(DownloadError::Interrupted {
                site: site.to_string(),
            });
        }

        let latency = self.latency();
        tokio::select! {
            biased;
            () = cancel.cancelled() => {
                return Err(DownloadError::Interrupted {
                    site: site.to_string(),
                });
            }
            () = tokio::time::sleep(latency) => {}
        }

        if self.fail.contains(site) {
            return Err(DownloadError::Refused {
                site: site.to_string(),
                latency,
            });
        }

        Ok(Download {
            site: site.to_string(),
            latency_ms: u64::try_from(latency.as_millis()).unwrap_or(u64::MAX),
        })
    }

    fn latency(&self) -> Duration {
        if self.jitter.is_zero() {
            return self.latency;
        }
        let max = u64::try_from(self.jitter.as_millis()).unwrap_or(u64::MAX);
        self.latency + Duration::from_millis(rand::rng().random_range(0..=max))
    }
}

impl From<&AppConfig> for Downloader {
    fn from(config: &AppConfig) -> Self {
        Self::new(config.latency, config.jitter)
            .failing(config.fail.iter().cloned())
            .hanging(config.hang.iter().cloned())
    }
}
