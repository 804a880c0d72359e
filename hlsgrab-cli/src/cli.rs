use clap::Parser;
use std::path::PathBuf;

/// Define CLI arguments
#[derive(Parser, Debug)]
#[command(
    version,
    about = "HLS video-on-demand downloader",
    long_about = "Downloads every segment of an HLS playlist in parallel, decrypts\n\
                  AES-128 segments, and stitches them into a single media file.\n\
                  \n\
                  Master playlists are resolved to their highest bandwidth variant."
)]
pub struct CliArgs {
    /// Playlist URL (master or media)
    #[arg(required = true, help = "URL of the .m3u8 playlist to download")]
    pub url: String,

    /// Output file path
    #[arg(
        short,
        long,
        default_value = "output.ts",
        help = "Path of the merged output file"
    )]
    pub output: PathBuf,

    /// Number of concurrent segment downloads
    #[arg(
        short,
        long,
        default_value = "32",
        value_parser = clap::value_parser!(u16).range(1..),
        help = "Maximum number of segments downloaded at the same time"
    )]
    pub workers: u16,

    /// Retries per segment after the first attempt
    #[arg(
        long,
        default_value = "3",
        help = "Number of retries for a failing segment (total attempts = retries + 1)"
    )]
    pub retries: u32,

    /// Per-request timeout in seconds
    #[arg(
        long,
        default_value = "30",
        help = "Timeout in seconds for each playlist, key and segment request"
    )]
    pub timeout: u64,

    /// HTTP headers to include with every request
    #[arg(
        short = 'H',
        long = "header",
        help = "Add custom HTTP header (format: 'Name: Value'). Can be used multiple times."
    )]
    pub headers: Vec<String>,

    /// Override the User-Agent header
    #[arg(long, help = "User-Agent to send with every request")]
    pub user_agent: Option<String>,

    /// Directory for intermediate segment files
    #[arg(
        long,
        help = "Directory for intermediate segment files (default: ./hls_temp_<unix-seconds>)"
    )]
    pub temp_dir: Option<PathBuf>,

    /// Enable verbose logging
    #[arg(short, long, help = "Enable detailed debug logging")]
    pub verbose: bool,

    /// Disable the progress bar
    #[arg(long, help = "Do not draw a progress bar")]
    pub no_progress: bool,

    /// Also write logs to this file
    #[arg(long, help = "Write logs to this file in addition to stderr")]
    pub log_file: Option<PathBuf>,
}
