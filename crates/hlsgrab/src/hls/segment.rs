// Segment work items: what to fetch, where it lands in the output, and how to decrypt it.

use std::fmt;

use bytes::Bytes;
use url::Url;

use crate::hls::HlsDownloaderError;

/// AES-128 key material for one segment. The IV is always present once a key is.
#[derive(Clone, PartialEq, Eq)]
pub struct SegmentCipher {
    pub key: Bytes,
    pub iv: [u8; 16],
}

impl SegmentCipher {
    pub fn new(key: Bytes, iv: [u8; 16]) -> Self {
        Self { key, iv }
    }
}

// Keep key bytes out of logs.
impl fmt::Debug for SegmentCipher {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SegmentCipher")
            .field("key_len", &self.key.len())
            .field("iv", &hex::encode(self.iv))
            .finish()
    }
}

/// One unit of work. `index` is the 0-based playlist position and fixes the merge order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SegmentDescriptor {
    pub index: usize,
    pub url: Url,
    pub cipher: Option<SegmentCipher>,
}

impl SegmentDescriptor {
    pub fn new(index: usize, url: Url) -> Self {
        Self {
            index,
            url,
            cipher: None,
        }
    }

    pub fn with_cipher(mut self, cipher: SegmentCipher) -> Self {
        self.cipher = Some(cipher);
        self
    }

    #[inline]
    pub fn is_encrypted(&self) -> bool {
        self.cipher.is_some()
    }
}

/// Result of driving one descriptor through fetch, decrypt and store.
/// On success carries the number of bytes written to the intermediate file.
#[derive(Debug)]
pub struct FetchOutcome {
    pub index: usize,
    pub result: Result<u64, HlsDownloaderError>,
}

impl FetchOutcome {
    #[inline]
    pub fn is_success(&self) -> bool {
        self.result.is_ok()
    }
}

/// Checks that indices are exactly `0..len` in order.
pub fn check_contiguous(descriptors: &[SegmentDescriptor]) -> Result<(), HlsDownloaderError> {
    for (position, descriptor) in descriptors.iter().enumerate() {
        if descriptor.index != position {
            return Err(HlsDownloaderError::InternalError(format!(
                "segment at position {position} has index {}",
                descriptor.index
            )));
        }
    }
    Ok(())
}
