// HLS Run Coordinator: download phase, then (only on full success) the ordered merge.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::{Duration, Instant};

use tracing::{error, info, warn};

use crate::hls::HlsDownloaderError;
use crate::hls::config::HlsConfig;
use crate::hls::events::{HlsProgressEvent, OnProgress};
use crate::hls::fetcher::SegmentDownloader;
use crate::hls::output::{Reassembler, SegmentStore};
use crate::hls::progress::RunProgress;
use crate::hls::scheduler::SegmentScheduler;
use crate::hls::segment::{SegmentDescriptor, check_contiguous};

/// Summary of a successful run
#[derive(Debug, Clone)]
pub struct RunReport {
    pub total_segments: usize,
    pub bytes_written: u64,
    pub fetch_elapsed: Duration,
    pub total_elapsed: Duration,
    pub output: PathBuf,
}

pub struct HlsRunCoordinator {
    config: Arc<HlsConfig>,
    segment_fetcher: Arc<dyn SegmentDownloader>,
    on_progress: Option<OnProgress>,
}

impl HlsRunCoordinator {
    pub fn new(
        config: Arc<HlsConfig>,
        segment_fetcher: Arc<dyn SegmentDownloader>,
        on_progress: Option<OnProgress>,
    ) -> Self {
        Self {
            config,
            segment_fetcher,
            on_progress,
        }
    }

    pub async fn run(
        &self,
        descriptors: Arc<[SegmentDescriptor]>,
    ) -> Result<RunReport, HlsDownloaderError> {
        self.config.validate()?;
        check_contiguous(&descriptors)?;
        if descriptors.is_empty() {
            return Err(HlsDownloaderError::PlaylistError(
                "No segments to download".to_string(),
            ));
        }

        let started = Instant::now();
        let total = descriptors.len();
        let output_config = &self.config.output_config;

        let store = Arc::new(SegmentStore::new(&output_config.intermediate_dir));
        store.create().await?;
        let progress = Arc::new(RunProgress::new(total, self.on_progress.clone()));

        let scheduler = SegmentScheduler::new(
            Arc::clone(&self.config),
            Arc::clone(&self.segment_fetcher),
            Arc::clone(&store),
            Arc::clone(&progress),
        );
        let report = scheduler.run(descriptors).await;
        let fetch_elapsed = started.elapsed();

        if !report.is_success() {
            for e in &report.errors {
                error!(error = %e, "Segment failed");
            }
            if output_config.keep_intermediates_on_failure {
                warn!(
                    dir = %store.dir().display(),
                    "Intermediate segments kept for inspection"
                );
            } else if let Err(e) = store.remove().await {
                warn!(error = %e, "Failed to remove intermediate directory");
            }
            return Err(HlsDownloaderError::SegmentsFailed {
                failed: report.failed,
                total,
            });
        }

        progress.emit(HlsProgressEvent::MergeStarted { total });
        let bytes_written = Reassembler::new(&store)
            .merge(total, &output_config.output_path)
            .await?;

        if let Err(e) = store.remove().await {
            warn!(error = %e, dir = %store.dir().display(), "Failed to remove intermediate directory");
        }

        progress.emit(HlsProgressEvent::MergeFinished {
            bytes: bytes_written,
            output: output_config.output_path.clone(),
        });

        let total_elapsed = started.elapsed();
        info!(
            segments = total,
            bytes = bytes_written,
            elapsed = ?total_elapsed,
            "Run finished"
        );

        Ok(RunReport {
            total_segments: total,
            bytes_written,
            fetch_elapsed,
            total_elapsed,
            output: output_config.output_path.clone(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::hls::scheduler::tests::{ScriptedDownloader, descriptors, payload};
    use bytes::Bytes;
    use std::collections::{HashMap, HashSet};
    use std::path::Path;
    use std::sync::Mutex;

    fn config(root: &Path, concurrency: usize) -> Arc<HlsConfig> {
        let mut config = HlsConfig::default();
        config.scheduler_config.download_concurrency = concurrency;
        config.output_config.intermediate_dir = root.join("parts");
        config.output_config.output_path = root.join("output.ts");
        Arc::new(config)
    }

    fn expected_output(count: usize) -> Vec<u8> {
        (0..count).flat_map(|i| payload(i).to_vec()).collect()
    }

    #[tokio::test]
    async fn test_four_plain_segments_merge_in_order() {
        let temp = tempfile::tempdir().unwrap();
        let config = config(temp.path(), 32);
        let payloads = (0..4).map(|i| (i, payload(i))).collect();
        let downloader = Arc::new(ScriptedDownloader::new(payloads, HashSet::new()));

        let events = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&events);
        let coordinator = HlsRunCoordinator::new(
            Arc::clone(&config),
            downloader,
            Some(Arc::new(move |event| sink.lock().unwrap().push(event))),
        );

        let report = coordinator.run(descriptors(4)).await.unwrap();

        assert_eq!(report.total_segments, 4);
        assert_eq!(
            std::fs::read(&config.output_config.output_path).unwrap(),
            expected_output(4)
        );
        assert_eq!(report.bytes_written, expected_output(4).len() as u64);
        assert!(!config.output_config.intermediate_dir.exists());

        let events = events.lock().unwrap();
        let last_completed = events
            .iter()
            .filter_map(|e| match e {
                HlsProgressEvent::SegmentCompleted {
                    completed, total, ..
                } => Some((*completed, *total)),
                _ => None,
            })
            .max();
        assert_eq!(last_completed, Some((4, 4)));
        assert!(
            events
                .iter()
                .any(|e| matches!(e, HlsProgressEvent::MergeFinished { .. }))
        );
    }

    #[tokio::test]
    async fn test_output_is_identical_for_every_concurrency() {
        let mut outputs = Vec::new();
        for concurrency in [1, 2, 5, 32] {
            let temp = tempfile::tempdir().unwrap();
            let config = config(temp.path(), concurrency);
            let payloads = (0..23).map(|i| (i, payload(i))).collect();
            let downloader = Arc::new(ScriptedDownloader::new(payloads, HashSet::new()));

            HlsRunCoordinator::new(Arc::clone(&config), downloader, None)
                .run(descriptors(23))
                .await
                .unwrap();
            outputs.push(std::fs::read(&config.output_config.output_path).unwrap());
        }

        assert_eq!(outputs[0], expected_output(23));
        assert!(outputs.iter().all(|o| *o == outputs[0]));
    }

    #[tokio::test]
    async fn test_single_failure_fails_run_without_merging() {
        let temp = tempfile::tempdir().unwrap();
        let config = config(temp.path(), 3);
        let payloads: HashMap<usize, Bytes> =
            [0, 1, 3, 4].into_iter().map(|i| (i, payload(i))).collect();
        let downloader = Arc::new(ScriptedDownloader::new(payloads, HashSet::from([2])));

        let err = HlsRunCoordinator::new(Arc::clone(&config), downloader, None)
            .run(descriptors(5))
            .await
            .unwrap_err();

        assert!(matches!(
            err,
            HlsDownloaderError::SegmentsFailed {
                failed: 1,
                total: 5
            }
        ));
        assert!(!config.output_config.output_path.exists());

        let store = SegmentStore::new(&config.output_config.intermediate_dir);
        for index in [0, 1, 3, 4] {
            assert!(store.segment_path(index).exists());
        }
        assert!(!store.segment_path(2).exists());
    }

    #[tokio::test]
    async fn test_failure_can_discard_intermediates() {
        let temp = tempfile::tempdir().unwrap();
        let mut config = (*config(temp.path(), 2)).clone();
        config.output_config.keep_intermediates_on_failure = false;
        let config = Arc::new(config);
        let downloader = Arc::new(ScriptedDownloader::new(
            HashMap::from([(0, payload(0))]),
            HashSet::from([1]),
        ));

        let result = HlsRunCoordinator::new(Arc::clone(&config), downloader, None)
            .run(descriptors(2))
            .await;

        assert!(result.is_err());
        assert!(!config.output_config.intermediate_dir.exists());
    }

    #[tokio::test]
    async fn test_empty_and_non_contiguous_sequences_are_rejected() {
        let temp = tempfile::tempdir().unwrap();
        let coordinator = HlsRunCoordinator::new(
            config(temp.path(), 4),
            Arc::new(ScriptedDownloader::new(HashMap::new(), HashSet::new())),
            None,
        );

        assert!(matches!(
            coordinator.run(descriptors(0)).await,
            Err(HlsDownloaderError::PlaylistError(_))
        ));

        let mut shuffled = descriptors(3).to_vec();
        shuffled.swap(0, 2);
        assert!(matches!(
            coordinator.run(shuffled.into()).await,
            Err(HlsDownloaderError::InternalError(_))
        ));
    }

    #[tokio::test]
    async fn test_output_inside_intermediate_dir_is_rejected_before_download() {
        let temp = tempfile::tempdir().unwrap();
        let mut config = HlsConfig::default();
        config.output_config.intermediate_dir = temp.path().join("work");
        config.output_config.output_path = temp.path().join("work").join("video.ts");
        let payloads = (0..3).map(|i| (i, payload(i))).collect();
        let downloader = Arc::new(ScriptedDownloader::new(payloads, HashSet::new()));

        let fetcher: Arc<dyn SegmentDownloader> = downloader.clone();
        let result = HlsRunCoordinator::new(Arc::new(config), fetcher, None)
            .run(descriptors(3))
            .await;

        assert!(matches!(result, Err(HlsDownloaderError::ConfigError(_))));
        assert!(!temp.path().join("work").exists());
        assert!(downloader.calls.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_successful_run_keeps_unrelated_files_in_intermediate_dir() {
        let temp = tempfile::tempdir().unwrap();
        let videos = temp.path().join("videos");
        std::fs::create_dir_all(&videos).unwrap();
        std::fs::write(videos.join("keep_me.mp4"), b"user data").unwrap();

        let mut config = HlsConfig::default();
        config.output_config.intermediate_dir = videos.clone();
        config.output_config.output_path = temp.path().join("video.ts");
        let payloads = (0..2).map(|i| (i, payload(i))).collect();
        let downloader = Arc::new(ScriptedDownloader::new(payloads, HashSet::new()));

        HlsRunCoordinator::new(Arc::new(config), downloader, None)
            .run(descriptors(2))
            .await
            .unwrap();

        assert_eq!(
            std::fs::read(temp.path().join("video.ts")).unwrap(),
            expected_output(2)
        );
        assert_eq!(std::fs::read(videos.join("keep_me.mp4")).unwrap(), b"user data");
        let store = SegmentStore::new(&videos);
        assert!(!store.segment_path(0).exists());
        assert!(!store.segment_path(1).exists());
    }
}
