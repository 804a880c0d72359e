use std::path::PathBuf;
use std::time::{SystemTime, UNIX_EPOCH};

/// `./hls_temp_<unix-seconds>`, unique enough for runs started in different seconds
pub fn default_temp_dir() -> PathBuf {
    let seconds = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or_default();
    PathBuf::from(format!("./hls_temp_{seconds}"))
}
