// HLS Segment Fetcher: downloads the raw bytes of one segment with bounded retries.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use reqwest::Client;
use tracing::{debug, error, warn};

use crate::hls::HlsDownloaderError;
use crate::hls::config::HlsConfig;
use crate::hls::segment::SegmentDescriptor;

#[async_trait]
pub trait SegmentDownloader: Send + Sync {
    /// Returns the raw (still encrypted, if keyed) bytes of a segment, or a terminal error.
    async fn download_segment(
        &self,
        descriptor: &SegmentDescriptor,
    ) -> Result<Bytes, HlsDownloaderError>;
}

/// Delay before retry number `retry` (1-based): grows linearly, never jittered.
#[inline]
pub fn retry_delay(base: Duration, retry: u32) -> Duration {
    base.saturating_mul(retry)
}

pub struct SegmentFetcher {
    http_client: Client,
    config: Arc<HlsConfig>,
}

impl SegmentFetcher {
    pub fn new(http_client: Client, config: Arc<HlsConfig>) -> Self {
        Self {
            http_client,
            config,
        }
    }

    /// One request. Any transport failure or non-success status is reported as transient.
    async fn attempt(&self, descriptor: &SegmentDescriptor) -> Result<Bytes, HlsDownloaderError> {
        let response = self
            .http_client
            .get(descriptor.url.clone())
            .timeout(self.config.fetcher_config.segment_download_timeout)
            .send()
            .await
            .map_err(|e| HlsDownloaderError::TransientError(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            return Err(HlsDownloaderError::TransientError(format!(
                "HTTP {status} for {}",
                descriptor.url
            )));
        }

        response
            .bytes()
            .await
            .map_err(|e| HlsDownloaderError::TransientError(format!("body read failed: {e}")))
    }
}

#[async_trait]
impl SegmentDownloader for SegmentFetcher {
    async fn download_segment(
        &self,
        descriptor: &SegmentDescriptor,
    ) -> Result<Bytes, HlsDownloaderError> {
        let max_retries = self.config.fetcher_config.max_segment_retries;
        let max_attempts = max_retries + 1;

        let mut attempt = 0;
        loop {
            attempt += 1;
            match self.attempt(descriptor).await {
                Ok(bytes) => {
                    debug!(
                        index = descriptor.index,
                        attempt,
                        len = bytes.len(),
                        "Downloaded segment"
                    );
                    return Ok(bytes);
                }
                Err(e) if attempt < max_attempts => {
                    let delay =
                        retry_delay(self.config.fetcher_config.segment_retry_delay_base, attempt);
                    warn!(
                        index = descriptor.index,
                        attempt,
                        error = %e,
                        retry_in = ?delay,
                        "Segment attempt failed, retrying"
                    );
                    tokio::time::sleep(delay).await;
                }
                Err(e) => {
                    error!(index = descriptor.index, attempts = attempt, error = %e, "Segment download failed");
                    return Err(HlsDownloaderError::SegmentFetchError {
                        index: descriptor.index,
                        attempts: attempt,
                        cause: Box::new(e),
                    });
                }
            }
        }
    }
}
