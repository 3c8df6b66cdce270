//! Vimeo adapter.
//!
//! The player config of a video lists its progressive (single-file) encodings,
//! each labelled with a quality such as `360p`.

use async_trait::async_trait;
use serde::Deserialize;
use tracing::debug;

use super::{StreamSource, fetch_text};
use crate::error::ResolutionError;
use crate::source::{SourceRef, StreamCandidate};

#[derive(Debug, Deserialize)]
struct PlayerConfig {
    request: PlayerRequest,
}

#[derive(Debug, Deserialize)]
struct PlayerRequest {
    files: PlayerFiles,
}

#[derive(Debug, Deserialize)]
struct PlayerFiles {
    #[serde(default)]
    progressive: Vec<ProgressiveFile>,
}

#[derive(Debug, Deserialize)]
struct ProgressiveFile {
    quality: String,
    url: String,
}

/// Player config URL for a video id.
#[must_use]
pub fn config_url(video_id: &str) -> String {
    format!("https://player.vimeo.com/video/{video_id}/config")
}

/// Parse the progressive files of a player config document.
pub fn parse_player_config(
    video_id: &str,
    body: &str,
) -> std::result::Result<Vec<StreamCandidate>, ResolutionError> {
    let config: PlayerConfig = serde_json::from_str(body).map_err(|e| {
        ResolutionError::invalid(video_id, format!("Failed to parse player config: {e}"))
    })?;

    Ok(config
        .request
        .files
        .progressive
        .into_iter()
        .map(|file| StreamCandidate::new(file.quality, file.url))
        .collect())
}

/// Streams of a Vimeo video, keyed by quality label.
#[derive(Debug, Clone)]
pub struct VimeoSource {
    client: reqwest::Client,
}

impl VimeoSource {
    /// Create a new Vimeo adapter using the given HTTP client.
    #[must_use]
    pub const fn new(client: reqwest::Client) -> Self {
        Self { client }
    }
}

#[async_trait]
impl StreamSource for VimeoSource {
    async fn candidates(
        &self,
        source: &SourceRef,
    ) -> std::result::Result<Vec<StreamCandidate>, ResolutionError> {
        debug!("Fetching Vimeo player config for {}", source.id);
        let body = fetch_text(&self.client, &config_url(&source.id), &source.id).await?;
        parse_player_config(&source.id, &body)
    }
}
