// HLS Segment Scheduler: drives every descriptor through fetch, decrypt and store
// with at most `download_concurrency` segments in flight.

use std::sync::Arc;
use std::time::Instant;

use bytes::Bytes;
use futures::StreamExt;
use futures::stream::FuturesUnordered;
use tokio::sync::Semaphore;
use tracing::{debug, error, info, warn};

use crate::hls::HlsDownloaderError;
use crate::hls::config::HlsConfig;
use crate::hls::decryption::decrypt_aes128_cbc;
use crate::hls::events::HlsProgressEvent;
use crate::hls::fetcher::SegmentDownloader;
use crate::hls::output::SegmentStore;
use crate::hls::progress::RunProgress;
use crate::hls::segment::{FetchOutcome, SegmentDescriptor};

/// Outcome of the download phase once every descriptor has resolved.
#[derive(Debug)]
pub struct SchedulerReport {
    pub completed: usize,
    pub failed: usize,
    pub bytes: u64,
    /// Terminal failures, ordered by segment index
    pub errors: Vec<HlsDownloaderError>,
}

impl SchedulerReport {
    #[inline]
    pub fn is_success(&self) -> bool {
        self.failed == 0
    }
}

pub struct SegmentScheduler {
    config: Arc<HlsConfig>,
    segment_fetcher: Arc<dyn SegmentDownloader>,
    store: Arc<SegmentStore>,
    progress: Arc<RunProgress>,
}

impl SegmentScheduler {
    pub fn new(
        config: Arc<HlsConfig>,
        segment_fetcher: Arc<dyn SegmentDownloader>,
        store: Arc<SegmentStore>,
        progress: Arc<RunProgress>,
    ) -> Self {
        Self {
            config,
            segment_fetcher,
            store,
            progress,
        }
    }

    async fn perform_segment_processing(
        segment_fetcher: Arc<dyn SegmentDownloader>,
        store: Arc<SegmentStore>,
        descriptor: SegmentDescriptor,
    ) -> Result<u64, HlsDownloaderError> {
        let raw_data = segment_fetcher.download_segment(&descriptor).await?;

        let data = match descriptor.cipher.clone() {
            Some(cipher) => {
                let index = descriptor.index;
                tokio::task::spawn_blocking(move || {
                    decrypt_aes128_cbc(&raw_data, &cipher.key, &cipher.iv)
                })
                .await
                .map_err(|e| {
                    HlsDownloaderError::InternalError(format!(
                        "decryption task for segment {index} panicked: {e}"
                    ))
                })?
                .map_err(|source| {
                    warn!(index, error = %source, "Segment decryption failed");
                    HlsDownloaderError::DecryptionError { index, source }
                })?
            }
            None => raw_data,
        };

        Self::store_segment(&store, descriptor.index, data).await
    }

    async fn store_segment(
        store: &SegmentStore,
        index: usize,
        data: Bytes,
    ) -> Result<u64, HlsDownloaderError> {
        let written = store.write_segment(index, &data).await?;
        debug!(index, bytes = written, "Segment stored");
        Ok(written)
    }

    /// Runs until every descriptor has produced an outcome. Failures never stop
    /// queued or in-flight segments; they are only counted.
    pub async fn run(&self, descriptors: Arc<[SegmentDescriptor]>) -> SchedulerReport {
        let concurrency = self.config.scheduler_config.download_concurrency.max(1);
        let total = descriptors.len();
        let started = Instant::now();

        info!(total, concurrency, "SegmentScheduler started.");
        self.progress
            .emit(HlsProgressEvent::DownloadStarted { total, concurrency });

        let permits = Arc::new(Semaphore::new(concurrency));
        let mut in_flight = FuturesUnordered::new();
        let mut next = 0usize;
        let mut report = SchedulerReport {
            completed: 0,
            failed: 0,
            bytes: 0,
            errors: Vec::new(),
        };

        loop {
            tokio::select! {
                biased;

                // Reap finished segments first so their permits are back before dispatching.
                Some(joined) = in_flight.next(), if !in_flight.is_empty() => {
                    let outcome = Self::join_outcome(joined);
                    self.record(outcome, &mut report);
                }

                // Admit the next descriptor only once a permit is held.
                permit = Arc::clone(&permits).acquire_owned(), if next < total => {
                    let Ok(permit) = permit else {
                        error!("Permit pool closed unexpectedly.");
                        break;
                    };
                    let descriptor = descriptors[next].clone();
                    next += 1;
                    let index = descriptor.index;
                    let fetcher = Arc::clone(&self.segment_fetcher);
                    let store = Arc::clone(&self.store);
                    let handle = tokio::spawn(async move {
                        let result =
                            Self::perform_segment_processing(fetcher, store, descriptor).await;
                        // Released on success and failure alike.
                        drop(permit);
                        FetchOutcome { index, result }
                    });
                    in_flight.push(async move { (index, handle.await) });
                }

                else => break,
            }
        }

        report.errors.sort_by_key(|e| e.segment_index().unwrap_or(usize::MAX));

        let elapsed = started.elapsed();
        self.progress.emit(HlsProgressEvent::DownloadFinished {
            completed: report.completed,
            failed: report.failed,
            elapsed,
        });
        info!(
            completed = report.completed,
            failed = report.failed,
            elapsed = ?elapsed,
            "SegmentScheduler finished."
        );
        report
    }

    fn join_outcome(
        joined: (usize, Result<FetchOutcome, tokio::task::JoinError>),
    ) -> FetchOutcome {
        match joined {
            (_, Ok(outcome)) => outcome,
            (index, Err(e)) => FetchOutcome {
                index,
                result: Err(HlsDownloaderError::InternalError(format!(
                    "worker for segment {index} did not complete: {e}"
                ))),
            },
        }
    }

    fn record(&self, outcome: FetchOutcome, report: &mut SchedulerReport) {
        match outcome.result {
            Ok(bytes) => {
                report.completed += 1;
                report.bytes += bytes;
                self.progress.record_success(outcome.index, bytes);
            }
            Err(e) => {
                report.failed += 1;
                self.progress.record_failure(outcome.index, e.clone());
                report.errors.push(match e {
                    e @ (HlsDownloaderError::SegmentFetchError { .. }
                    | HlsDownloaderError::DecryptionError { .. }) => e,
                    other => HlsDownloaderError::SegmentFetchError {
                        index: outcome.index,
                        attempts: 1,
                        cause: Box::new(other),
                    },
                });
            }
        }
    }
}
