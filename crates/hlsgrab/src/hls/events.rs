use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use crate::hls::HlsDownloaderError;

/// Callback invoked from worker tasks; implementations must be cheap and non-blocking.
pub type OnProgress = Arc<dyn Fn(HlsProgressEvent) + Send + Sync>;

#[derive(Debug, Clone)]
pub enum HlsProgressEvent {
    /// The media playlist has been resolved into segment descriptors
    PlaylistResolved { url: String, segments: usize },
    DownloadStarted { total: usize, concurrency: usize },
    SegmentCompleted {
        index: usize,
        bytes: u64,
        completed: usize,
        total: usize,
    },
    SegmentFailed {
        index: usize,
        error: HlsDownloaderError,
        failed: usize,
    },
    DownloadFinished {
        completed: usize,
        failed: usize,
        elapsed: Duration,
    },
    MergeStarted { total: usize },
    MergeFinished { bytes: u64, output: PathBuf },
}
