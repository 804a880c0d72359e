// HLS VOD acquisition: playlist discovery, bounded parallel fetch, decryption and merge

pub mod config;
pub mod coordinator;
pub mod decryption;
pub mod error;
pub mod events;
pub mod fetcher;
pub mod hls_downloader;
pub mod output;
pub mod playlist;
pub mod progress;
pub mod scheduler;
pub mod segment;

// Re-exports for easier access
pub use config::HlsConfig;
pub use coordinator::{HlsRunCoordinator, RunReport};
pub use decryption::{DecryptError, KeyFetcher, decrypt_aes128_cbc};
pub use error::HlsDownloaderError;
pub use events::{HlsProgressEvent, OnProgress};
pub use fetcher::{SegmentDownloader, SegmentFetcher};
pub use hls_downloader::HlsDownloader;
pub use segment::{SegmentCipher, SegmentDescriptor};
