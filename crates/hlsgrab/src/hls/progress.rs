// Shared counters for one run, updated concurrently by every worker.

use std::sync::atomic::{AtomicUsize, Ordering};

use crate::hls::HlsDownloaderError;
use crate::hls::events::{HlsProgressEvent, OnProgress};

pub struct RunProgress {
    total: usize,
    completed: AtomicUsize,
    failed: AtomicUsize,
    on_progress: Option<OnProgress>,
}

impl RunProgress {
    pub fn new(total: usize, on_progress: Option<OnProgress>) -> Self {
        Self {
            total,
            completed: AtomicUsize::new(0),
            failed: AtomicUsize::new(0),
            on_progress,
        }
    }

    pub fn emit(&self, event: HlsProgressEvent) {
        if let Some(callback) = &self.on_progress {
            callback(event);
        }
    }

    /// Counts a stored segment and notifies the observer. Returns the new completed count.
    pub fn record_success(&self, index: usize, bytes: u64) -> usize {
        let completed = self.completed.fetch_add(1, Ordering::AcqRel) + 1;
        self.emit(HlsProgressEvent::SegmentCompleted {
            index,
            bytes,
            completed,
            total: self.total,
        });
        completed
    }

    /// Counts a terminal segment failure. Returns the new failed count.
    pub fn record_failure(&self, index: usize, error: HlsDownloaderError) -> usize {
        let failed = self.failed.fetch_add(1, Ordering::AcqRel) + 1;
        self.emit(HlsProgressEvent::SegmentFailed {
            index,
            error,
            failed,
        });
        failed
    }

    #[inline]
    pub fn total(&self) -> usize {
        self.total
    }

    #[inline]
    pub fn completed(&self) -> usize {
        self.completed.load(Ordering::Acquire)
    }

    #[inline]
    pub fn failed(&self) -> usize {
        self.failed.load(Ordering::Acquire)
    }

    /// True once every segment has either completed or failed.
    pub fn is_drained(&self) -> bool {
        self.completed() + self.failed() == self.total
    }

    /// Completed fraction in `[0, 1]`; an empty run counts as done.
    pub fn ratio(&self) -> f64 {
        if self.total == 0 {
            return 1.0;
        }
        self.completed() as f64 / self.total as f64
    }
}
