use std::sync::Arc;

use reqwest::Client;
use tracing::info;

use crate::hls::coordinator::{HlsRunCoordinator, RunReport};
use crate::hls::events::{HlsProgressEvent, OnProgress};
use crate::hls::fetcher::{SegmentDownloader, SegmentFetcher};
use crate::hls::playlist::PlaylistEngine;
use crate::{DownloadError, create_client};

use super::HlsConfig;

/// Downloads a VOD playlist into a single file: discovery, fetch, decrypt, merge.
pub struct HlsDownloader {
    client: Client,
    config: Arc<HlsConfig>,
}

impl HlsDownloader {
    pub fn new(config: HlsConfig) -> Result<Self, DownloadError> {
        let client = create_client(&config.base)?;
        Ok(Self::with_client(config, client))
    }

    /// Use an already configured client, e.g. one shared with other downloads
    pub fn with_client(config: HlsConfig, client: Client) -> Self {
        Self {
            client,
            config: Arc::new(config),
        }
    }

    pub fn config(&self) -> &HlsConfig {
        &self.config
    }

    pub fn client(&self) -> &Client {
        &self.client
    }

    pub async fn download(
        &self,
        url: &str,
        on_progress: Option<OnProgress>,
    ) -> Result<RunReport, DownloadError> {
        self.config.validate()?;

        let playlist_engine = PlaylistEngine::new(self.client.clone(), Arc::clone(&self.config));
        let resolved = playlist_engine.load_descriptors(url).await?;
        if let Some(callback) = &on_progress {
            callback(HlsProgressEvent::PlaylistResolved {
                url: resolved.url.to_string(),
                segments: resolved.descriptors.len(),
            });
        }

        let segment_fetcher: Arc<dyn SegmentDownloader> = Arc::new(SegmentFetcher::new(
            self.client.clone(),
            Arc::clone(&self.config),
        ));
        let coordinator =
            HlsRunCoordinator::new(Arc::clone(&self.config), segment_fetcher, on_progress);

        let report = coordinator.run(resolved.descriptors.into()).await?;
        info!(
            url = %url,
            output = %report.output.display(),
            "HLS download complete"
        );
        Ok(report)
    }
}
