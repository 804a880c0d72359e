use crate::hls::HlsDownloaderError;

// Custom error type for download operations
#[derive(Debug, thiserror::Error)]
pub enum DownloadError {
    #[error("HTTP error: {0}")]
    HttpError(#[from] reqwest::Error),

    #[error("HLS error: {0}")]
    HlsError(#[from] HlsDownloaderError),
}

impl DownloadError {
    /// Number of segments that failed, when the run ended because of segment failures
    pub fn failed_segments(&self) -> Option<usize> {
        match self {
            DownloadError::HlsError(HlsDownloaderError::SegmentsFailed { failed, .. }) => {
                Some(*failed)
            }
            _ => None,
        }
    }
}
