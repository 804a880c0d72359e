//! # hlsgrab-engine
//!
//! A library for downloading a complete HLS video-on-demand playlist into a
//! single media file.
//!
//! ## Features
//!
//! - Master playlist resolution to the highest bandwidth variant
//! - Bounded parallel segment downloads with linear retry backoff
//! - AES-128-CBC segment decryption with per-run key caching
//! - Ordered reassembly with intermediate cleanup
//! - Progress events for front ends

pub mod builder;
pub mod config;
pub mod downloader;
pub mod error;
pub mod hls;
pub mod protocol_builder;

pub use builder::DownloaderConfigBuilder;
pub use config::DownloaderConfig;
pub use error::DownloadError;

// Re-export protocol builders
pub use protocol_builder::HlsProtocolBuilder;

// Re-export downloader utilities
pub use downloader::create_client;

pub use hls::{HlsConfig, HlsDownloader, HlsDownloaderError, HlsProgressEvent, RunReport};
