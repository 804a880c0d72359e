// HLS Playlist Engine: fetches playlists, follows master playlists to the highest-bandwidth
// variant, and turns the media playlist into segment descriptors with resolved keys.

use std::collections::HashMap;
use std::sync::Arc;

use bytes::Bytes;
use m3u8_rs::{KeyMethod, MasterPlaylist, MediaPlaylist, Playlist, parse_playlist_res};
use reqwest::Client;
use tracing::{debug, info};
use url::Url;

use crate::hls::HlsDownloaderError;
use crate::hls::config::HlsConfig;
use crate::hls::decryption::{KeyFetcher, iv_from_sequence, parse_iv};
use crate::hls::segment::{SegmentCipher, SegmentDescriptor};

/// The media playlist actually used and the work items derived from it
#[derive(Debug, Clone)]
pub struct ResolvedPlaylist {
    pub url: Url,
    pub descriptors: Vec<SegmentDescriptor>,
}

pub struct PlaylistEngine {
    http_client: Client,
    config: Arc<HlsConfig>,
    key_fetcher: KeyFetcher,
}

/// Resolves a playlist entry against the playlist's own URL. Handles absolute,
/// root-relative and relative references.
pub fn resolve_uri(base: &Url, uri: &str) -> Result<Url, HlsDownloaderError> {
    base.join(uri.trim()).map_err(|e| {
        HlsDownloaderError::PlaylistError(format!("Could not resolve '{uri}' against {base}: {e}"))
    })
}

/// Picks the non-I-frame variant with the highest declared bandwidth.
pub fn select_variant(master: &MasterPlaylist, base: &Url) -> Result<Url, HlsDownloaderError> {
    let variant = master
        .variants
        .iter()
        .filter(|v| !v.is_i_frame && !v.uri.trim().is_empty())
        .max_by_key(|v| v.bandwidth)
        .ok_or_else(|| {
            HlsDownloaderError::PlaylistError("Master playlist has no variants".to_string())
        })?;
    debug!(bandwidth = variant.bandwidth, uri = %variant.uri, "Selected variant");
    resolve_uri(base, &variant.uri)
}

impl PlaylistEngine {
    pub fn new(http_client: Client, config: Arc<HlsConfig>) -> Self {
        let key_fetcher = KeyFetcher::new(http_client.clone(), Arc::clone(&config));
        Self {
            http_client,
            config,
            key_fetcher,
        }
    }

    /// Loads `url`, follows master playlists, and builds the descriptor sequence.
    pub async fn load_descriptors(&self, url: &str) -> Result<ResolvedPlaylist, HlsDownloaderError> {
        let (media_url, media_playlist) = self.resolve_media_playlist(url).await?;
        let descriptors = self.build_descriptors(&media_url, &media_playlist).await?;
        info!(
            url = %media_url,
            segments = descriptors.len(),
            encrypted = descriptors.iter().filter(|d| d.is_encrypted()).count(),
            "Media playlist resolved"
        );
        Ok(ResolvedPlaylist {
            url: media_url,
            descriptors,
        })
    }

    async fn resolve_media_playlist(
        &self,
        url: &str,
    ) -> Result<(Url, MediaPlaylist), HlsDownloaderError> {
        let mut playlist_url = Url::parse(url).map_err(|e| {
            HlsDownloaderError::PlaylistError(format!("Invalid playlist URL {url}: {e}"))
        })?;

        for _ in 0..self.config.playlist_config.max_playlist_depth {
            match self.fetch_playlist(&playlist_url).await? {
                Playlist::MediaPlaylist(media) => return Ok((playlist_url, media)),
                Playlist::MasterPlaylist(master) => {
                    info!(
                        url = %playlist_url,
                        variants = master.variants.len(),
                        "Detected master playlist"
                    );
                    playlist_url = select_variant(&master, &playlist_url)?;
                }
            }
        }

        Err(HlsDownloaderError::PlaylistError(format!(
            "No media playlist found within {} levels starting at {url}",
            self.config.playlist_config.max_playlist_depth
        )))
    }

    async fn fetch_playlist(&self, playlist_url: &Url) -> Result<Playlist, HlsDownloaderError> {
        debug!(url = %playlist_url, "Fetching playlist");
        let response = self
            .http_client
            .get(playlist_url.clone())
            .timeout(self.config.playlist_config.playlist_fetch_timeout)
            .send()
            .await
            .map_err(|e| {
                HlsDownloaderError::PlaylistError(format!(
                    "Failed to fetch playlist {playlist_url}: {e}"
                ))
            })?;
        if !response.status().is_success() {
            return Err(HlsDownloaderError::PlaylistError(format!(
                "Failed to fetch playlist {playlist_url}: HTTP {}",
                response.status()
            )));
        }
        let playlist_bytes = response.bytes().await.map_err(|e| {
            HlsDownloaderError::PlaylistError(format!(
                "Failed to read playlist {playlist_url}: {e}"
            ))
        })?;
        let playlist_content = std::str::from_utf8(&playlist_bytes).map_err(|e| {
            HlsDownloaderError::PlaylistError(format!("Playlist content is not valid UTF-8: {e}"))
        })?;

        parse_playlist_res(playlist_content.as_bytes()).map_err(|e| {
            HlsDownloaderError::PlaylistError(format!(
                "Failed to parse playlist {playlist_url}: {e}"
            ))
        })
    }

    /// A key tag applies to every following segment until the next key tag.
    async fn build_descriptors(
        &self,
        playlist_url: &Url,
        playlist: &MediaPlaylist,
    ) -> Result<Vec<SegmentDescriptor>, HlsDownloaderError> {
        if playlist.segments.is_empty() {
            return Err(HlsDownloaderError::PlaylistError(format!(
                "Media playlist {playlist_url} contains no segments"
            )));
        }

        let mut keys: HashMap<Url, Bytes> = HashMap::new();
        let mut current_key: Option<&m3u8_rs::Key> = None;
        let mut descriptors = Vec::with_capacity(playlist.segments.len());

        for (index, segment) in playlist.segments.iter().enumerate() {
            if let Some(key) = &segment.key {
                current_key = Some(key);
            }

            let url = resolve_uri(playlist_url, &segment.uri)?;
            let mut descriptor = SegmentDescriptor::new(index, url);

            if let Some(key) = current_key {
                let media_sequence = playlist.media_sequence.wrapping_add(index as u64);
                descriptor.cipher = self
                    .segment_cipher(playlist_url, key, media_sequence, &mut keys)
                    .await?;
            }
            descriptors.push(descriptor);
        }

        Ok(descriptors)
    }

    async fn segment_cipher(
        &self,
        playlist_url: &Url,
        key: &m3u8_rs::Key,
        media_sequence: u64,
        keys: &mut HashMap<Url, Bytes>,
    ) -> Result<Option<SegmentCipher>, HlsDownloaderError> {
        match &key.method {
            KeyMethod::None => return Ok(None),
            KeyMethod::AES128 => {}
            other => {
                return Err(HlsDownloaderError::PlaylistError(format!(
                    "Unsupported encryption method: {other:?}"
                )));
            }
        }

        let uri = key.uri.as_deref().ok_or_else(|| {
            HlsDownloaderError::PlaylistError("AES-128 key is missing its URI".to_string())
        })?;
        let key_url = resolve_uri(playlist_url, uri)?;

        let key_bytes = match keys.get(&key_url) {
            Some(bytes) => bytes.clone(),
            None => {
                let bytes = self.key_fetcher.fetch_key(key_url.as_str()).await?;
                keys.insert(key_url, bytes.clone());
                bytes
            }
        };

        let iv = match &key.iv {
            Some(iv) => parse_iv(iv)?,
            None => iv_from_sequence(media_sequence),
        };

        Ok(Some(SegmentCipher::new(key_bytes, iv)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::hls::fetcher::tests::{fast_config, spawn_responder};
    use std::sync::atomic::Ordering;

    const KEY: &[u8; 16] = b"fedcba9876543210";

    #[test]
    fn test_resolve_uri_forms() {
        let base = Url::parse("https://cdn.example.com/live/stream/index.m3u8?token=1").unwrap();
        assert_eq!(
            resolve_uri(&base, "https://other.example.com/a.ts")
                .unwrap()
                .as_str(),
            "https://other.example.com/a.ts"
        );
        assert_eq!(
            resolve_uri(&base, "/root/a.ts").unwrap().as_str(),
            "https://cdn.example.com/root/a.ts"
        );
        assert_eq!(
            resolve_uri(&base, "seg-001.ts").unwrap().as_str(),
            "https://cdn.example.com/live/stream/seg-001.ts"
        );
        assert_eq!(
            resolve_uri(&base, "../other/seg.ts").unwrap().as_str(),
            "https://cdn.example.com/live/other/seg.ts"
        );
    }

    #[test]
    fn test_select_variant_prefers_highest_bandwidth() {
        let master = "#EXTM3U\n\
            #EXT-X-STREAM-INF:BANDWIDTH=800000,RESOLUTION=640x360\n\
            low/index.m3u8\n\
            #EXT-X-STREAM-INF:BANDWIDTH=5000000,RESOLUTION=1920x1080\n\
            high/index.m3u8\n\
            #EXT-X-STREAM-INF:BANDWIDTH=2500000,RESOLUTION=1280x720\n\
            mid/index.m3u8\n";
        let Ok(Playlist::MasterPlaylist(master)) = parse_playlist_res(master.as_bytes()) else {
            panic!("expected master playlist");
        };
        let base = Url::parse("https://cdn.example.com/vod/master.m3u8").unwrap();
        assert_eq!(
            select_variant(&master, &base).unwrap().as_str(),
            "https://cdn.example.com/vod/high/index.m3u8"
        );
    }

    #[tokio::test]
    async fn test_master_to_media_with_keys() {
        let (base, hits) = spawn_responder(|_, path| match path {
            "/master.m3u8" => (
                200,
                b"#EXTM3U\n\
                  #EXT-X-STREAM-INF:BANDWIDTH=100000\n\
                  low.m3u8\n\
                  #EXT-X-STREAM-INF:BANDWIDTH=900000\n\
                  media/high.m3u8\n"
                    .to_vec(),
            ),
            "/media/high.m3u8" => (
                200,
                b"#EXTM3U\n\
                  #EXT-X-VERSION:3\n\
                  #EXT-X-TARGETDURATION:10\n\
                  #EXT-X-MEDIA-SEQUENCE:5\n\
                  #EXTINF:10.0,\n\
                  plain.ts\n\
                  #EXT-X-KEY:METHOD=AES-128,URI=\"/keys/k1\",IV=0x000000000000000000000000000000FF\n\
                  #EXTINF:10.0,\n\
                  /abs/seg1.ts\n\
                  #EXTINF:10.0,\n\
                  http://other.invalid/seg2.ts\n\
                  #EXT-X-KEY:METHOD=AES-128,URI=\"../keys/k1\"\n\
                  #EXTINF:10.0,\n\
                  seg3.ts\n\
                  #EXT-X-KEY:METHOD=NONE\n\
                  #EXTINF:10.0,\n\
                  seg4.ts\n\
                  #EXT-X-ENDLIST\n"
                    .to_vec(),
            ),
            "/keys/k1" => (200, KEY.to_vec()),
            _ => (404, Vec::new()),
        })
        .await;

        let engine = PlaylistEngine::new(Client::new(), fast_config());
        let resolved = engine
            .load_descriptors(base.join("master.m3u8").unwrap().as_str())
            .await
            .unwrap();

        assert_eq!(resolved.url, base.join("media/high.m3u8").unwrap());
        let d = &resolved.descriptors;
        assert_eq!(d.len(), 5);
        assert!(d.iter().enumerate().all(|(i, s)| s.index == i));

        assert_eq!(d[0].url, base.join("media/plain.ts").unwrap());
        assert!(d[0].cipher.is_none());

        assert_eq!(d[1].url, base.join("abs/seg1.ts").unwrap());
        let c1 = d[1].cipher.as_ref().unwrap();
        assert_eq!(&c1.key[..], KEY);
        assert_eq!(c1.iv[15], 0xFF);

        assert_eq!(d[2].url.as_str(), "http://other.invalid/seg2.ts");
        assert_eq!(d[2].cipher, d[1].cipher);

        // No IV attribute: media sequence 5 + position 3.
        let c3 = d[3].cipher.as_ref().unwrap();
        assert_eq!(c3.iv, iv_from_sequence(8));

        assert!(d[4].cipher.is_none());

        // master + media + one key fetch shared by both key tags.
        assert_eq!(hits.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_unreachable_playlist_is_a_discovery_error() {
        let (base, _) = spawn_responder(|_, _| (500, Vec::new())).await;
        let engine = PlaylistEngine::new(Client::new(), fast_config());
        let err = engine
            .load_descriptors(base.join("index.m3u8").unwrap().as_str())
            .await
            .unwrap_err();
        assert!(matches!(err, HlsDownloaderError::PlaylistError(_)));
    }

    #[tokio::test]
    async fn test_empty_media_playlist_is_rejected() {
        let (base, _) = spawn_responder(|_, _| {
            (
                200,
                b"#EXTM3U\n#EXT-X-TARGETDURATION:10\n#EXT-X-ENDLIST\n".to_vec(),
            )
        })
        .await;
        let engine = PlaylistEngine::new(Client::new(), fast_config());
        let err = engine
            .load_descriptors(base.join("index.m3u8").unwrap().as_str())
            .await
            .unwrap_err();
        assert!(matches!(err, HlsDownloaderError::PlaylistError(_)));
    }

    #[tokio::test]
    async fn test_missing_key_fails_discovery() {
        let (base, _) = spawn_responder(|_, path| match path {
            "/index.m3u8" => (
                200,
                b"#EXTM3U\n\
                  #EXT-X-TARGETDURATION:10\n\
                  #EXT-X-KEY:METHOD=AES-128,URI=\"key.bin\"\n\
                  #EXTINF:10.0,\n\
                  seg0.ts\n\
                  #EXT-X-ENDLIST\n"
                    .to_vec(),
            ),
            _ => (404, Vec::new()),
        })
        .await;
        let engine = PlaylistEngine::new(Client::new(), fast_config());
        let err = engine
            .load_descriptors(base.join("index.m3u8").unwrap().as_str())
            .await
            .unwrap_err();
        assert!(matches!(err, HlsDownloaderError::KeyFetchError(_)));
    }

    #[tokio::test]
    async fn test_media_sequence_wraps_at_u64_max() {
        let (base, _) = spawn_responder(|_, path| match path {
            "/index.m3u8" => (
                200,
                b"#EXTM3U\n\
                  #EXT-X-TARGETDURATION:10\n\
                  #EXT-X-MEDIA-SEQUENCE:18446744073709551615\n\
                  #EXT-X-KEY:METHOD=AES-128,URI=\"key.bin\"\n\
                  #EXTINF:10.0,\n\
                  seg0.ts\n\
                  #EXTINF:10.0,\n\
                  seg1.ts\n\
                  #EXT-X-ENDLIST\n"
                    .to_vec(),
            ),
            "/key.bin" => (200, KEY.to_vec()),
            _ => (404, Vec::new()),
        })
        .await;
        let engine = PlaylistEngine::new(Client::new(), fast_config());
        let resolved = engine
            .load_descriptors(base.join("index.m3u8").unwrap().as_str())
            .await
            .unwrap();

        let d = &resolved.descriptors;
        assert_eq!(d[0].cipher.as_ref().unwrap().iv, iv_from_sequence(u64::MAX));
        assert_eq!(d[1].cipher.as_ref().unwrap().iv, iv_from_sequence(0));
    }
}
