//! # Protocol Builders
//!
//! Fluent builder API for assembling an [`HlsConfig`] and the downloader that uses it.

use std::path::PathBuf;
use std::time::Duration;

use reqwest::header::{HeaderMap, HeaderName, HeaderValue};
use std::str::FromStr;

use crate::DownloadError;
use crate::DownloaderConfig;
use crate::hls::{HlsConfig, HlsDownloader};

/// Builder for HLS protocol handlers
pub struct HlsProtocolBuilder {
    config: HlsConfig,
}

impl HlsProtocolBuilder {
    /// Create a new HLS protocol builder with default configuration
    pub fn new() -> Self {
        Self {
            config: HlsConfig::default(),
        }
    }

    pub fn with_base_config(mut self, base_config: DownloaderConfig) -> Self {
        self.config.base = base_config;
        self
    }

    // --- Base DownloaderConfig methods ---

    /// Set user agent for HTTP requests
    pub fn user_agent(mut self, user_agent: impl Into<String>) -> Self {
        self.config.base.user_agent = user_agent.into();
        self
    }

    /// Replace the HTTP headers
    pub fn headers(mut self, headers: HeaderMap) -> Self {
        self.config.base.headers = headers;
        self
    }

    /// Add a single HTTP header
    pub fn add_header(mut self, name: &str, value: &str) -> Self {
        if let (Ok(name), Ok(value)) = (HeaderName::from_str(name), HeaderValue::from_str(value)) {
            self.config.base.headers.insert(name, value);
        }
        self
    }

    // --- Playlist ---

    pub fn playlist_fetch_timeout(mut self, timeout: Duration) -> Self {
        self.config.playlist_config.playlist_fetch_timeout = timeout;
        self
    }

    // --- Scheduler ---

    /// Set maximum concurrent segment downloads.
    pub fn download_concurrency(mut self, concurrency: usize) -> Self {
        self.config.scheduler_config.download_concurrency = concurrency;
        self
    }

    // --- Fetcher ---

    /// Set timeout for a single segment request attempt.
    pub fn segment_download_timeout(mut self, timeout: Duration) -> Self {
        self.config.fetcher_config.segment_download_timeout = timeout;
        self
    }

    /// Set the number of retries after the first failed attempt.
    pub fn segment_retry_count(mut self, retries: u32) -> Self {
        self.config.fetcher_config.max_segment_retries = retries;
        self
    }

    /// Set the unit of the linear retry backoff.
    pub fn segment_retry_delay_base(mut self, delay: Duration) -> Self {
        self.config.fetcher_config.segment_retry_delay_base = delay;
        self
    }

    pub fn key_download_timeout(mut self, timeout: Duration) -> Self {
        self.config.fetcher_config.key_download_timeout = timeout;
        self
    }

    pub fn max_key_retries(mut self, retries: u32) -> Self {
        self.config.fetcher_config.max_key_retries = retries;
        self
    }

    // --- Output ---

    pub fn output_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.config.output_config.output_path = path.into();
        self
    }

    pub fn intermediate_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.config.output_config.intermediate_dir = dir.into();
        self
    }

    pub fn keep_intermediates_on_failure(mut self, keep: bool) -> Self {
        self.config.output_config.keep_intermediates_on_failure = keep;
        self
    }

    /// Access the raw configuration for more advanced customization
    pub fn with_config<F>(mut self, f: F) -> Self
    where
        F: FnOnce(&mut HlsConfig),
    {
        f(&mut self.config);
        self
    }

    /// Get a copy of the current configuration
    pub fn get_config(&self) -> HlsConfig {
        self.config.clone()
    }

    pub fn build(self) -> Result<HlsDownloader, DownloadError> {
        self.config.validate()?;
        HlsDownloader::new(self.config)
    }
}

impl Default for HlsProtocolBuilder {
    fn default() -> Self {
        Self::new()
    }
}
