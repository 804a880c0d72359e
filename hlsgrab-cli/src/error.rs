use thiserror::Error;

#[derive(Debug, Error)]
pub enum AppError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Download error: {0}")]
    Download(#[from] hlsgrab_engine::DownloadError),

    #[error("Initialization failed: {0}")]
    Initialization(String),

    #[error("Interrupted")]
    Interrupted,
}

impl AppError {
    /// Process exit status for this error
    pub fn exit_code(&self) -> i32 {
        match self {
            AppError::Interrupted => 130,
            _ => 1,
        }
    }
}
