//! Concurrent retrieval of the hourly upstream sources.

use crate::ingest::normalize::{normalize_payload, processing_timestamp};
use crate::ingest::FlightSource;
use crate::models::{FlightMap, HourKey, Point};
use anyhow::{Context, Result};
use futures::future::{join_all, BoxFuture};
use futures::FutureExt;
use serde_json::Value;
use std::sync::Arc;
use std::time::{Duration, Instant};
use thiserror::Error;
use tracing::{debug, warn};

/// Placeholder replaced by the zero-padded source suffix.
pub const SUFFIX_PLACEHOLDER: &str = "{suffix}";

/// Why a single source produced no data.
#[derive(Debug, Error)]
pub enum FetchError {
    #[error("request to {url} failed: {source}")]
    Transport {
        url: String,
        #[source]
        source: reqwest::Error,
    },

    #[error("{url} answered with status {status}")]
    Status {
        url: String,
        status: reqwest::StatusCode,
    },

    #[error("{url} returned a body that is not JSON: {source}")]
    Decode {
        url: String,
        #[source]
        source: serde_json::Error,
    },

    #[error("{url} returned a payload that is not an array")]
    NotArray { url: String },
}

/// Settings for the upstream feed.
#[derive(Debug, Clone)]
pub struct FeedConfig {
    /// URL with a `{suffix}` placeholder.
    pub url_template: String,
    /// Number of sources, suffixes `00` up to `source_count - 1`.
    pub source_count: u32,
    /// Per-request timeout.
    pub timeout: Duration,
}

impl Default for FeedConfig {
    fn default() -> Self {
        Self {
            url_template: crate::config::default_url_template(),
            source_count: 24,
            timeout: Duration::from_secs(10),
        }
    }
}

impl From<&crate::config::UpstreamConfig> for FeedConfig {
    fn from(config: &crate::config::UpstreamConfig) -> Self {
        Self {
            url_template: config.url_template.clone(),
            source_count: config.source_count,
            timeout: Duration::from_secs(config.timeout_seconds),
        }
    }
}

/// HTTP client for the hourly feed. Cheap to clone.
#[derive(Debug, Clone)]
pub struct FeedClient {
    config: Arc<FeedConfig>,
    http: reqwest::Client,
}

impl FeedClient {
    pub fn new(config: FeedConfig) -> Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(config.timeout)
            .build()
            .context("Failed to create HTTP client")?;

        Ok(Self {
            config: Arc::new(config),
            http,
        })
    }

    pub fn config(&self) -> &FeedConfig {
        &self.config
    }

    /// URL of the source behind `key`.
    pub fn source_url(&self, key: HourKey) -> String {
        self.config
            .url_template
            .replace(SUFFIX_PLACEHOLDER, &key.suffix())
    }

    /// Fetch and normalize a single source.
    pub async fn fetch_source(&self, key: HourKey) -> Result<Vec<Point>, FetchError> {
        let url = self.source_url(key);

        let response = self
            .http
            .get(&url)
            .send()
            .await
            .map_err(|source| FetchError::Transport {
                url: url.clone(),
                source,
            })?;

        let status = response.status();
        if !status.is_success() {
            return Err(FetchError::Status { url, status });
        }

        let body = response
            .bytes()
            .await
            .map_err(|source| FetchError::Transport {
                url: url.clone(),
                source,
            })?;

        let payload: Value = serde_json::from_slice(&body).map_err(|source| FetchError::Decode {
            url: url.clone(),
            source,
        })?;

        let now = processing_timestamp();
        normalize_payload(&payload, &now).ok_or(FetchError::NotArray { url })
    }

    /// Fetch every source concurrently and merge the readable ones.
    ///
    /// Never fails; sources that cannot be read are logged and left out.
    pub async fn fetch_and_normalize(&self) -> FlightMap {
        let started = Instant::now();
        let keys: Vec<HourKey> = (0..self.config.source_count).map(HourKey::new).collect();

        let requests = keys
            .iter()
            .map(|&key| async move { (key, self.fetch_source(key).await) });
        let results = join_all(requests).await;

        let mut map = FlightMap::new();
        let mut failed = 0usize;

        for (key, result) in results {
            match result {
                Ok(points) => {
                    debug!("{}: {} points", key, points.len());
                    map.insert(key, points);
                }
                Err(e) => {
                    failed += 1;
                    warn!("No data for {}: {}", key, e);
                }
            }
        }

        debug!(
            "Fetched {}/{} sources ({} points) in {:?}",
            map.len(),
            keys.len(),
            map.total_points(),
            started.elapsed()
        );
        if map.is_empty() && failed > 0 {
            warn!("Every upstream source failed; serving an empty map");
        }

        map
    }
}

impl FlightSource for FeedClient {
    fn poll(&self) -> BoxFuture<'static, FlightMap> {
        let client = self.clone();
        async move { client.fetch_and_normalize().await }.boxed()
    }
}
