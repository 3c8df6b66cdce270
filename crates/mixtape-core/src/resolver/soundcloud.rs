//! SoundCloud adapter.
//!
//! The streams endpoint returns a flat map from encoding name
//! (`http_mp3_128_url`, `hls_mp3_128_url`, ...) to a stream URL.

use std::collections::BTreeMap;

use async_trait::async_trait;
use tracing::debug;

use super::{StreamSource, fetch_text};
use crate::error::ResolutionError;
use crate::source::{SourceRef, StreamCandidate};

/// Streams endpoint for a track id.
#[must_use]
pub fn streams_url(track_id: &str, client_id: &str) -> String {
    format!("https://api.soundcloud.com/i1/tracks/{track_id}/streams?client_id={client_id}")
}

/// Parse the streams map of a track. Non-string entries are ignored.
pub fn parse_streams(
    track_id: &str,
    body: &str,
) -> std::result::Result<Vec<StreamCandidate>, ResolutionError> {
    let streams: BTreeMap<String, serde_json::Value> = serde_json::from_str(body)
        .map_err(|e| ResolutionError::invalid(track_id, format!("Failed to parse streams: {e}")))?;

    Ok(streams
        .into_iter()
        .filter_map(|(encoding, url)| {
            url.as_str()
                .map(|url| StreamCandidate::new(encoding, url))
        })
        .collect())
}

/// Streams of a SoundCloud track.
#[derive(Debug, Clone)]
pub struct SoundCloudSource {
    client: reqwest::Client,
    client_id: Option<String>,
}

impl SoundCloudSource {
    /// Create a new SoundCloud adapter. Without a client id every lookup fails.
    #[must_use]
    pub const fn new(client: reqwest::Client, client_id: Option<String>) -> Self {
        Self { client, client_id }
    }
}

#[async_trait]
impl StreamSource for SoundCloudSource {
    async fn candidates(
        &self,
        source: &SourceRef,
    ) -> std::result::Result<Vec<StreamCandidate>, ResolutionError> {
        let client_id = self
            .client_id
            .as_deref()
            .ok_or_else(|| ResolutionError::fetch(&source.id, "no SoundCloud client id configured"))?;

        debug!("Fetching SoundCloud streams for {}", source.id);
        let body = fetch_text(&self.client, &streams_url(&source.id, client_id), &source.id).await?;
        parse_streams(&source.id, &body)
    }
}
