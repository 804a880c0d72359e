// Intermediate segment storage and the ordered merge into the final output.

use std::io;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use tokio::fs::{self, File};
use tokio::io::{AsyncWriteExt, BufWriter};
use tracing::{debug, error, info, warn};

use crate::hls::HlsDownloaderError;

const MERGE_BUFFER_SIZE: usize = 1024 * 1024;

/// One file per segment index, named so the index alone locates it.
#[derive(Debug, Clone)]
pub struct SegmentStore {
    dir: PathBuf,
}

impl SegmentStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    #[inline]
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn segment_path(&self, index: usize) -> PathBuf {
        self.dir.join(format!("segment_{index:06}.ts"))
    }

    fn is_segment_file(name: &str) -> bool {
        name.strip_prefix("segment_")
            .and_then(|rest| rest.strip_suffix(".ts"))
            .is_some_and(|digits| !digits.is_empty() && digits.bytes().all(|b| b.is_ascii_digit()))
    }

    pub async fn create(&self) -> Result<(), HlsDownloaderError> {
        fs::create_dir_all(&self.dir).await?;
        Ok(())
    }

    /// Writes the decrypted payload for `index`. Returns the number of bytes stored.
    pub async fn write_segment(&self, index: usize, data: &[u8]) -> Result<u64, HlsDownloaderError> {
        fs::write(self.segment_path(index), data).await?;
        Ok(data.len() as u64)
    }

    /// Deletes the segment files, then the directory itself if nothing else is left in it.
    /// A missing directory is not an error.
    pub async fn remove(&self) -> Result<(), HlsDownloaderError> {
        let mut entries = match fs::read_dir(&self.dir).await {
            Ok(entries) => entries,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(()),
            Err(e) => return Err(e.into()),
        };

        let mut foreign = 0usize;
        while let Some(entry) = entries.next_entry().await? {
            let is_segment = entry.file_name().to_str().is_some_and(Self::is_segment_file)
                && entry.file_type().await?.is_file();
            if !is_segment {
                foreign += 1;
                continue;
            }
            match fs::remove_file(entry.path()).await {
                Ok(()) => {}
                Err(e) if e.kind() == io::ErrorKind::NotFound => {}
                Err(e) => return Err(e.into()),
            }
        }

        if foreign > 0 {
            debug!(dir = %self.dir.display(), foreign, "Intermediate directory kept, it holds other files");
            return Ok(());
        }
        match fs::remove_dir(&self.dir).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }
}

/// Concatenates stored segments `0..count` into one output file, deleting each
/// intermediate once its bytes are flushed to the output.
pub struct Reassembler<'a> {
    store: &'a SegmentStore,
}

impl<'a> Reassembler<'a> {
    pub fn new(store: &'a SegmentStore) -> Self {
        Self { store }
    }

    pub async fn merge(&self, count: usize, output: &Path) -> Result<u64, HlsDownloaderError> {
        if let Some(parent) = output.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent).await?;
        }

        let out_file = File::create(output).await?;
        let mut writer = BufWriter::with_capacity(MERGE_BUFFER_SIZE, out_file);
        let mut total_bytes = 0u64;

        for index in 0..count {
            let path = self.store.segment_path(index);
            let reassembly_error = |e: io::Error| {
                error!(index, path = %path.display(), error = %e, "Merge aborted");
                HlsDownloaderError::ReassemblyError {
                    index,
                    source: Arc::new(e),
                }
            };

            let mut segment = File::open(&path).await.map_err(reassembly_error)?;
            let copied = tokio::io::copy(&mut segment, &mut writer)
                .await
                .map_err(reassembly_error)?;
            writer.flush().await.map_err(reassembly_error)?;
            drop(segment);

            if let Err(e) = fs::remove_file(&path).await {
                warn!(index, path = %path.display(), error = %e, "Failed to remove merged segment");
            }

            total_bytes += copied;
            debug!(index, bytes = copied, "Merged segment");
        }

        writer.shutdown().await?;
        info!(
            segments = count,
            bytes = total_bytes,
            output = %output.display(),
            "Merge finished"
        );
        Ok(total_bytes)
    }
}
