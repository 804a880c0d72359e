use std::path::{Component, Path, PathBuf};
use std::time::Duration;

use tokio::sync::Semaphore;

use crate::DownloaderConfig;
use crate::hls::HlsDownloaderError;

// --- Top-Level Configuration ---
#[derive(Debug, Clone, Default)]
pub struct HlsConfig {
    /// Base downloader configuration
    pub base: DownloaderConfig,
    pub playlist_config: HlsPlaylistConfig,
    pub scheduler_config: HlsSchedulerConfig,
    pub fetcher_config: HlsFetcherConfig,
    pub output_config: HlsOutputConfig,
}

impl HlsConfig {
    pub fn validate(&self) -> Result<(), HlsDownloaderError> {
        if self.scheduler_config.download_concurrency == 0 {
            return Err(HlsDownloaderError::ConfigError(
                "download concurrency must be at least 1".to_string(),
            ));
        }
        if self.scheduler_config.download_concurrency > Semaphore::MAX_PERMITS {
            return Err(HlsDownloaderError::ConfigError(format!(
                "download concurrency must be at most {}",
                Semaphore::MAX_PERMITS
            )));
        }
        if self.playlist_config.max_playlist_depth == 0 {
            return Err(HlsDownloaderError::ConfigError(
                "playlist depth must be at least 1".to_string(),
            ));
        }
        self.output_config.validate()
    }
}

// --- Playlist Configuration ---
#[derive(Debug, Clone)]
pub struct HlsPlaylistConfig {
    pub playlist_fetch_timeout: Duration,
    /// How many master playlists may be followed before a media playlist must appear
    pub max_playlist_depth: usize,
}

impl Default for HlsPlaylistConfig {
    fn default() -> Self {
        Self {
            playlist_fetch_timeout: Duration::from_secs(30),
            max_playlist_depth: 4,
        }
    }
}

// --- Scheduler Configuration ---
#[derive(Debug, Clone)]
pub struct HlsSchedulerConfig {
    pub download_concurrency: usize, // Max concurrent segment downloads
}

impl Default for HlsSchedulerConfig {
    fn default() -> Self {
        Self {
            download_concurrency: 32,
        }
    }
}

// --- Fetcher Configuration ---
#[derive(Debug, Clone)]
pub struct HlsFetcherConfig {
    pub segment_download_timeout: Duration,
    /// Retries beyond the first attempt
    pub max_segment_retries: u32,
    /// Unit of the linear backoff: retry `n` waits `n * base`
    pub segment_retry_delay_base: Duration,
    pub key_download_timeout: Duration,
    pub max_key_retries: u32,
    pub key_retry_delay_base: Duration,
}

impl Default for HlsFetcherConfig {
    fn default() -> Self {
        Self {
            segment_download_timeout: Duration::from_secs(30),
            max_segment_retries: 3,
            segment_retry_delay_base: Duration::from_secs(1),
            key_download_timeout: Duration::from_secs(30),
            max_key_retries: 3,
            key_retry_delay_base: Duration::from_secs(1),
        }
    }
}

// --- Output Configuration ---
#[derive(Debug, Clone)]
pub struct HlsOutputConfig {
    /// Directory holding one decrypted file per segment until the merge consumes it
    pub intermediate_dir: PathBuf,
    /// Final concatenated output
    pub output_path: PathBuf,
    /// Leave the intermediate directory in place when the run fails
    pub keep_intermediates_on_failure: bool,
}

impl HlsOutputConfig {
    /// The intermediate directory is emptied after the merge, so the output must live elsewhere.
    pub fn validate(&self) -> Result<(), HlsDownloaderError> {
        let dir = lexical_absolute(&self.intermediate_dir)?;
        let output = lexical_absolute(&self.output_path)?;
        if output.starts_with(&dir) {
            return Err(HlsDownloaderError::ConfigError(format!(
                "output path {} must not be inside the intermediate directory {}",
                self.output_path.display(),
                self.intermediate_dir.display()
            )));
        }
        Ok(())
    }
}

/// Absolute form of `path` with `.` and `..` folded away, without touching the filesystem.
fn lexical_absolute(path: &Path) -> Result<PathBuf, HlsDownloaderError> {
    let absolute = std::path::absolute(path).map_err(|e| {
        HlsDownloaderError::ConfigError(format!("invalid path {}: {e}", path.display()))
    })?;
    let mut normalized = PathBuf::new();
    for component in absolute.components() {
        match component {
            Component::CurDir => {}
            Component::ParentDir => {
                normalized.pop();
            }
            other => normalized.push(other),
        }
    }
    Ok(normalized)
}

impl Default for HlsOutputConfig {
    fn default() -> Self {
        Self {
            intermediate_dir: PathBuf::from("./hls_temp"),
            output_path: PathBuf::from("output.ts"),
            keep_intermediates_on_failure: true,
        }
    }
}
