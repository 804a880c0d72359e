use std::sync::Arc;
use std::time::Duration;

use clap::Parser;
use error::AppError;
use hlsgrab_engine::{DownloaderConfig, HlsProtocolBuilder, RunReport};
use indicatif::MultiProgress;
use tracing::{Level, error, info, warn};
use tracing_subscriber::FmtSubscriber;
use tracing_subscriber::fmt::writer::{BoxMakeWriter, MakeWriterExt};

mod cli;
mod error;
mod utils;

use cli::CliArgs;
use utils::progress::ProgressManager;
use utils::{default_temp_dir, format_bytes, format_duration, parse_headers};

fn main() {
    if let Err(e) = bootstrap() {
        eprintln!("Error: {e}");
        // Log the full error for debugging
        error!(error = ?e, "Application failed");
        std::process::exit(e.exit_code());
    }
}

fn init_logging(args: &CliArgs) -> Result<(), AppError> {
    let log_level = if args.verbose {
        Level::DEBUG
    } else {
        Level::INFO
    };

    let writer = match &args.log_file {
        Some(path) => {
            let log_file = std::fs::OpenOptions::new()
                .create(true)
                .write(true)
                .truncate(true)
                .open(path)?;
            BoxMakeWriter::new(MakeWriterExt::and(std::io::stderr, log_file))
        }
        None => BoxMakeWriter::new(std::io::stderr),
    };

    let subscriber = FmtSubscriber::builder()
        .with_max_level(log_level)
        .with_writer(writer)
        .with_ansi(args.log_file.is_none())
        .finish();
    tracing::subscriber::set_global_default(subscriber)
        .map_err(|e| AppError::Initialization(e.to_string()))
}

#[tokio::main]
async fn bootstrap() -> Result<(), AppError> {
    // Parse command-line arguments
    let args = CliArgs::parse();
    init_logging(&args)?;

    let temp_dir = args.temp_dir.clone().unwrap_or_else(default_temp_dir);
    let timeout = Duration::from_secs(args.timeout);

    let mut base_builder = DownloaderConfig::builder()
        .with_timeout(timeout)
        .with_headers(parse_headers(&args.headers));
    if let Some(user_agent) = &args.user_agent {
        base_builder = base_builder.with_user_agent(user_agent);
    }

    let downloader = HlsProtocolBuilder::new()
        .with_base_config(base_builder.build())
        .download_concurrency(usize::from(args.workers))
        .segment_retry_count(args.retries)
        .segment_download_timeout(timeout)
        .playlist_fetch_timeout(timeout)
        .key_download_timeout(timeout)
        .intermediate_dir(&temp_dir)
        .output_path(&args.output)
        .keep_intermediates_on_failure(true)
        .build()?;

    info!(
        url = %args.url,
        output = %args.output.display(),
        temp_dir = %temp_dir.display(),
        workers = args.workers,
        retries = args.retries,
        "Starting HLS download"
    );

    let multi = MultiProgress::new();
    let progress_manager = if args.no_progress {
        ProgressManager::new_disabled(multi)
    } else {
        ProgressManager::new(multi)
    };
    let progress = progress_manager.clone();

    let outcome = tokio::select! {
        result = downloader.download(
            &args.url,
            Some(Arc::new(move |event| progress.handle_event(event))),
        ) => result,
        _ = tokio::signal::ctrl_c() => {
            progress_manager.abandon();
            warn!(temp_dir = %temp_dir.display(), "Interrupted, intermediate files left in place");
            return Err(AppError::Interrupted);
        }
    };
    progress_manager.abandon();

    match outcome {
        Ok(report) => {
            print_summary(&report);
            Ok(())
        }
        Err(e) => {
            if let Some(failed) = e.failed_segments() {
                eprintln!(
                    "{failed} segment(s) failed; intermediate files were left in {}",
                    temp_dir.display()
                );
            }
            Err(e.into())
        }
    }
}

fn print_summary(report: &RunReport) {
    let size = std::fs::metadata(&report.output)
        .map(|m| m.len())
        .unwrap_or(report.bytes_written);
    info!(
        segments = report.total_segments,
        fetch = %format_duration(report.fetch_elapsed),
        "Download summary"
    );
    println!(
        "Downloaded {} segments in {} -> {} ({})",
        report.total_segments,
        format_duration(report.total_elapsed),
        report.output.display(),
        format_bytes(size)
    );
}
