use hlsgrab_engine::HlsProgressEvent;
use indicatif::{MultiProgress, ProgressBar, ProgressDrawTarget, ProgressStyle};
use std::time::Duration;

use super::format_bytes;

fn segment_style() -> ProgressStyle {
    ProgressStyle::default_bar()
        .template("{spinner:.green} {msg}\n[{elapsed_precise}] [{bar:40.green/white}] {pos}/{len} segments ({per_sec}, eta {eta})")
        .unwrap_or_else(|_| ProgressStyle::default_bar())
        .progress_chars("=> ")
}

fn merge_style() -> ProgressStyle {
    ProgressStyle::default_spinner()
        .template("{spinner:.green} {msg} [{elapsed_precise}]")
        .unwrap_or_else(|_| ProgressStyle::default_spinner())
}

/// Drives a single segment bar from engine progress events
#[derive(Clone)]
pub struct ProgressManager {
    bar: ProgressBar,
    disabled: bool,
}

impl ProgressManager {
    pub fn new(multi: MultiProgress) -> Self {
        let bar = multi.add(ProgressBar::new(0));
        bar.set_style(segment_style());
        Self {
            bar,
            disabled: false,
        }
    }

    pub fn new_disabled(multi: MultiProgress) -> Self {
        multi.set_draw_target(ProgressDrawTarget::hidden());
        Self {
            bar: ProgressBar::hidden(),
            disabled: true,
        }
    }

    pub fn handle_event(&self, event: HlsProgressEvent) {
        if self.disabled {
            return;
        }

        match event {
            HlsProgressEvent::PlaylistResolved { segments, .. } => {
                self.bar.set_message(format!("Resolved {segments} segments"));
            }
            HlsProgressEvent::DownloadStarted { total, concurrency } => {
                self.bar.set_length(total as u64);
                self.bar.set_position(0);
                self.bar
                    .set_message(format!("Downloading with {concurrency} workers"));
                self.bar.enable_steady_tick(Duration::from_millis(200));
            }
            HlsProgressEvent::SegmentCompleted { completed, .. } => {
                self.bar.set_position(completed as u64);
            }
            HlsProgressEvent::SegmentFailed {
                index,
                error,
                failed,
            } => {
                self.bar
                    .println(format!("segment {index} failed: {error}"));
                self.bar.set_message(format!("{failed} segment(s) failed"));
            }
            HlsProgressEvent::DownloadFinished {
                completed, failed, ..
            } => {
                if failed > 0 {
                    self.bar.abandon_with_message(format!(
                        "Download incomplete: {completed} ok, {failed} failed"
                    ));
                }
            }
            HlsProgressEvent::MergeStarted { total } => {
                self.bar.set_style(merge_style());
                self.bar.set_message(format!("Merging {total} segments"));
            }
            HlsProgressEvent::MergeFinished { bytes, output } => {
                self.bar.finish_with_message(format!(
                    "Wrote {} to {}",
                    format_bytes(bytes),
                    output.display()
                ));
            }
        }
    }

    /// Stop drawing, leaving the last frame on screen
    pub fn abandon(&self) {
        if !self.disabled && !self.bar.is_finished() {
            self.bar.abandon();
        }
    }
}
