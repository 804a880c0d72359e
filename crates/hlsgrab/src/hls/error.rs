use std::sync::Arc;

use crate::hls::decryption::DecryptError;

#[derive(Debug, thiserror::Error, Clone)]
pub enum HlsDownloaderError {
    /// Playlist unreachable, unparseable, or without any usable variant or segment
    #[error("Playlist error: {0}")]
    PlaylistError(String),
    #[error("Key fetch error: {0}")]
    KeyFetchError(String),
    /// A single failed attempt; only surfaces once the retry budget is spent
    #[error("Transient error: {0}")]
    TransientError(String),
    #[error("Segment {index} failed after {attempts} attempts: {cause}")]
    SegmentFetchError {
        index: usize,
        attempts: u32,
        cause: Box<HlsDownloaderError>,
    },
    #[error("Decryption of segment {index} failed: {source}")]
    DecryptionError {
        index: usize,
        #[source]
        source: DecryptError,
    },
    #[error("Failed to merge segment {index}: {source}")]
    ReassemblyError {
        index: usize,
        #[source]
        source: Arc<std::io::Error>,
    },
    #[error("{failed} of {total} segments failed to download")]
    SegmentsFailed { failed: usize, total: usize },
    #[error("I/O error: {source}")]
    IoError {
        #[from]
        source: Arc<std::io::Error>,
    },
    #[error("Configuration error: {0}")]
    ConfigError(String),
    #[error("Internal error: {0}")]
    InternalError(String),
}

impl HlsDownloaderError {
    /// Segment index this error is attributed to, if any
    pub fn segment_index(&self) -> Option<usize> {
        match self {
            HlsDownloaderError::SegmentFetchError { index, .. }
            | HlsDownloaderError::DecryptionError { index, .. }
            | HlsDownloaderError::ReassemblyError { index, .. } => Some(*index),
            _ => None,
        }
    }
}

// Manual implementation because of the Arc wrapping.
impl From<std::io::Error> for HlsDownloaderError {
    fn from(err: std::io::Error) -> Self {
        HlsDownloaderError::IoError {
            source: Arc::new(err),
        }
    }
}
