use reqwest::Client;
use tracing::debug;

use crate::{DownloadError, DownloaderConfig};

/// Create a reqwest Client with the provided configuration
pub fn create_client(config: &DownloaderConfig) -> Result<Client, DownloadError> {
    let mut client_builder = Client::builder()
        .pool_max_idle_per_host(32)
        .user_agent(&config.user_agent)
        .default_headers(config.headers.clone())
        .redirect(if config.follow_redirects {
            reqwest::redirect::Policy::limited(10)
        } else {
            reqwest::redirect::Policy::none()
        });

    if !config.timeout.is_zero() {
        client_builder = client_builder.timeout(config.timeout);
    }

    if !config.connect_timeout.is_zero() {
        client_builder = client_builder.connect_timeout(config.connect_timeout);
    }

    debug!(
        user_agent = %config.user_agent,
        headers = config.headers.len(),
        "Building HTTP client"
    );

    client_builder.build().map_err(DownloadError::from)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_create_client_with_defaults() {
        assert!(create_client(&DownloaderConfig::default()).is_ok());
    }

    #[test]
    fn test_create_client_without_timeouts() {
        let config = DownloaderConfig::builder()
            .with_timeout(std::time::Duration::ZERO)
            .with_connect_timeout(std::time::Duration::ZERO)
            .with_follow_redirects(false)
            .build();
        assert!(create_client(&config).is_ok());
    }
}
