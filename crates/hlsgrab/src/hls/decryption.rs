// HLS decryption: AES-128-CBC segment decryption and raw key retrieval.

use std::sync::Arc;

use aes::Aes128;
use bytes::Bytes;
use cbc::cipher::{BlockDecryptMut, KeyIvInit, block_padding::NoPadding};
use reqwest::Client;
use tracing::{debug, warn};

use crate::hls::HlsDownloaderError;
use crate::hls::config::HlsConfig;
use crate::hls::fetcher::retry_delay;

const AES_BLOCK_SIZE: usize = 16;

type Aes128CbcDec = cbc::Decryptor<Aes128>;

#[derive(Debug, thiserror::Error, Clone, PartialEq, Eq)]
pub enum DecryptError {
    #[error("invalid key length {0} (expected 16)")]
    InvalidKeyLength(usize),
    #[error("invalid IV length {0} (expected 16)")]
    InvalidIvLength(usize),
    #[error("ciphertext length {0} is not a positive multiple of the block size")]
    InvalidCiphertextLength(usize),
    #[error("padding length {padding} is out of range for {len} bytes of plaintext")]
    PaddingOutOfRange { padding: usize, len: usize },
    #[error("padding bytes are inconsistent with padding length {0}")]
    PaddingMismatch(usize),
}

/// Decrypts an AES-128-CBC payload and strips its trailing-count padding.
///
/// The last plaintext byte gives the padding length. It must lie in `1..=16`, fit
/// inside the plaintext, and every padding byte must repeat it.
pub fn decrypt_aes128_cbc(ciphertext: &[u8], key: &[u8], iv: &[u8]) -> Result<Bytes, DecryptError> {
    if key.len() != AES_BLOCK_SIZE {
        return Err(DecryptError::InvalidKeyLength(key.len()));
    }
    if iv.len() != AES_BLOCK_SIZE {
        return Err(DecryptError::InvalidIvLength(iv.len()));
    }
    if ciphertext.is_empty() || ciphertext.len() % AES_BLOCK_SIZE != 0 {
        return Err(DecryptError::InvalidCiphertextLength(ciphertext.len()));
    }

    let cipher = Aes128CbcDec::new_from_slices(key, iv)
        .map_err(|_| DecryptError::InvalidKeyLength(key.len()))?;

    let mut buffer = ciphertext.to_vec();
    let plaintext_len = cipher
        .decrypt_padded_mut::<NoPadding>(&mut buffer)
        .map_err(|_| DecryptError::InvalidCiphertextLength(ciphertext.len()))?
        .len();

    let unpadded_len = unpadded_len(&buffer[..plaintext_len])?;
    buffer.truncate(unpadded_len);
    Ok(Bytes::from(buffer))
}

fn unpadded_len(plaintext: &[u8]) -> Result<usize, DecryptError> {
    let len = plaintext.len();
    let padding = plaintext
        .last()
        .map(|&b| b as usize)
        .ok_or(DecryptError::PaddingOutOfRange { padding: 0, len })?;

    if padding == 0 || padding > AES_BLOCK_SIZE || padding > len {
        return Err(DecryptError::PaddingOutOfRange { padding, len });
    }
    if plaintext[len - padding..]
        .iter()
        .any(|&b| b as usize != padding)
    {
        return Err(DecryptError::PaddingMismatch(padding));
    }
    Ok(len - padding)
}

/// Parses an `IV` attribute such as `0x00000000000000000000000000000001`.
pub fn parse_iv(iv_hex_str: &str) -> Result<[u8; 16], HlsDownloaderError> {
    let iv_str = iv_hex_str
        .trim()
        .trim_start_matches("0x")
        .trim_start_matches("0X");
    let mut iv_bytes = [0u8; 16];
    hex::decode_to_slice(iv_str, &mut iv_bytes).map_err(|e| {
        HlsDownloaderError::PlaylistError(format!("Failed to parse IV '{iv_hex_str}': {e}"))
    })?;
    Ok(iv_bytes)
}

/// IV used when a key carries no explicit `IV`: the media sequence number, big-endian.
#[inline]
pub fn iv_from_sequence(media_sequence: u64) -> [u8; 16] {
    (media_sequence as u128).to_be_bytes()
}

// --- KeyFetcher ---
// Retrieves raw key bytes from a key URI.
pub struct KeyFetcher {
    http_client: Client,
    config: Arc<HlsConfig>,
}

impl KeyFetcher {
    pub fn new(http_client: Client, config: Arc<HlsConfig>) -> Self {
        Self {
            http_client,
            config,
        }
    }

    pub async fn fetch_key(&self, key_uri: &str) -> Result<Bytes, HlsDownloaderError> {
        let max_retries = self.config.fetcher_config.max_key_retries;
        let mut last_error = String::new();

        for attempt in 1..=max_retries + 1 {
            if attempt > 1 {
                tokio::time::sleep(retry_delay(
                    self.config.fetcher_config.key_retry_delay_base,
                    attempt - 1,
                ))
                .await;
            }

            match self
                .http_client
                .get(key_uri)
                .timeout(self.config.fetcher_config.key_download_timeout)
                .send()
                .await
            {
                Ok(response) if response.status().is_success() => match response.bytes().await {
                    Ok(key) => return Self::check_key(key_uri, key),
                    Err(e) => last_error = e.to_string(),
                },
                Ok(response) => last_error = format!("HTTP {}", response.status()),
                Err(e) => last_error = e.to_string(),
            }
            warn!(uri = %key_uri, attempt, error = %last_error, "Key fetch attempt failed");
        }

        Err(HlsDownloaderError::KeyFetchError(format!(
            "Failed to fetch key {key_uri} after {} attempts: {last_error}",
            max_retries + 1
        )))
    }

    fn check_key(key_uri: &str, key: Bytes) -> Result<Bytes, HlsDownloaderError> {
        if key.len() != AES_BLOCK_SIZE {
            return Err(HlsDownloaderError::KeyFetchError(format!(
                "Key from {key_uri} has incorrect length: {} bytes (expected 16)",
                key.len()
            )));
        }
        debug!(uri = %key_uri, "Fetched decryption key");
        Ok(key)
    }
}
