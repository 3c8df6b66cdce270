//! `YouTube` video and playlist adapters.
//!
//! Video streams come from `rusty_ytdl`, which exposes every format of a video
//! keyed by its itag. Playlists are listed by scraping the playlist page for the
//! embedded `ytInitialData` JSON.

use async_trait::async_trait;
use regex::Regex;
use rusty_ytdl::Video;
use tracing::{debug, info};

use super::{CollectionSource, StreamSource, fetch_text, html_decode};
use crate::error::ResolutionError;
use crate::source::{SourceKind, SourceRef, StreamCandidate};

/// Watch URL for a video id.
#[must_use]
pub fn watch_url(video_id: &str) -> String {
    format!("https://www.youtube.com/watch?v={video_id}")
}

/// Streams of a single video, one candidate per itag.
#[derive(Debug, Clone, Default)]
pub struct YoutubeVideoSource;

impl YoutubeVideoSource {
    /// Create a new video adapter.
    #[must_use]
    pub const fn new() -> Self {
        Self
    }
}

#[async_trait]
impl StreamSource for YoutubeVideoSource {
    async fn candidates(
        &self,
        source: &SourceRef,
    ) -> std::result::Result<Vec<StreamCandidate>, ResolutionError> {
        let url = watch_url(&source.id);

        let video = Video::new(&url).map_err(|e| {
            ResolutionError::fetch(&source.id, format!("Failed to create video instance: {e}"))
        })?;

        let info = video.get_info().await.map_err(|e| {
            ResolutionError::fetch(&source.id, format!("Failed to get video info: {e}"))
        })?;

        debug!(
            "Available formats for {}: {}",
            source.id,
            info.formats.len()
        );

        Ok(info
            .formats
            .iter()
            .map(|format| {
                StreamCandidate::new(format.itag.to_string(), format.url.clone()).with_length(
                    format
                        .content_length
                        .as_deref()
                        .and_then(|length| length.parse().ok()),
                )
            })
            .collect())
    }
}

/// Lists the videos of a playlist.
#[derive(Debug, Clone)]
pub struct YoutubePlaylistSource {
    client: reqwest::Client,
}

impl YoutubePlaylistSource {
    /// Create a new playlist adapter using the given HTTP client.
    #[must_use]
    pub const fn new(client: reqwest::Client) -> Self {
        Self { client }
    }
}

#[async_trait]
impl CollectionSource for YoutubePlaylistSource {
    async fn entries(
        &self,
        source: &SourceRef,
    ) -> std::result::Result<Vec<SourceRef>, ResolutionError> {
        let url = format!("https://www.youtube.com/playlist?list={}", source.id);
        info!("Fetching playlist page: {}", url);

        let html = fetch_text(&self.client, &url, &source.id).await?;
        let entries = parse_playlist_page(&source.id, &html)?;

        info!(
            "Parsed playlist '{}' with {} videos",
            extract_playlist_title(&html).unwrap_or_else(|| source.title.clone()),
            entries.len()
        );
        Ok(entries)
    }
}

/// Parse the videos of a playlist page, in playlist order.
pub fn parse_playlist_page(
    playlist_id: &str,
    html: &str,
) -> std::result::Result<Vec<SourceRef>, ResolutionError> {
    let json = extract_yt_initial_data(html)
        .map_err(|reason| ResolutionError::invalid(playlist_id, reason))?;

    let contents = find_playlist_contents(&json).ok_or_else(|| {
        ResolutionError::invalid(playlist_id, "playlist contents missing from page data")
    })?;

    contents
        .iter()
        // Continuation markers and other renderers are not videos.
        .filter_map(|item| item.get("playlistVideoRenderer"))
        .enumerate()
        .map(|(position, renderer)| {
            parse_playlist_item(renderer).ok_or_else(|| {
                ResolutionError::invalid(
                    playlist_id,
                    format!("malformed playlist entry at position {position}"),
                )
            })
        })
        .collect()
}

/// Extract the playlist title from the page.
fn extract_playlist_title(html: &str) -> Option<String> {
    let og_title_re = Regex::new(r#"<meta\s+property="og:title"\s+content="([^"]+)""#).ok()?;
    if let Some(caps) = og_title_re.captures(html) {
        return Some(html_decode(caps.get(1)?.as_str()));
    }

    let title_re = Regex::new(r"<title>([^<]+?)\s*-\s*YouTube</title>").ok()?;
    title_re
        .captures(html)
        .and_then(|caps| caps.get(1))
        .map(|m| html_decode(m.as_str()))
}

/// Extract the `ytInitialData` JSON object embedded in the page.
fn extract_yt_initial_data(html: &str) -> std::result::Result<serde_json::Value, String> {
    const MARKERS: [&str; 2] = ["var ytInitialData = ", "ytInitialData = "];

    let start_pos = MARKERS
        .iter()
        .find_map(|marker| html.find(marker).map(|pos| pos + marker.len()))
        .ok_or_else(|| "Could not find ytInitialData in page".to_string())?;

    // Find the end of the object by counting braces outside of strings
    let json_bytes = &html.as_bytes()[start_pos..];
    if json_bytes.first() != Some(&b'{') {
        return Err("ytInitialData does not start with '{'".to_string());
    }

    let mut depth = 0usize;
    let mut end_pos = None;
    let mut in_string = false;
    let mut escape_next = false;

    for (i, &byte) in json_bytes.iter().enumerate() {
        if escape_next {
            escape_next = false;
            continue;
        }

        match byte {
            b'\\' if in_string => escape_next = true,
            b'"' => in_string = !in_string,
            b'{' if !in_string => depth += 1,
            b'}' if !in_string => {
                depth = depth.saturating_sub(1);
                if depth == 0 {
                    end_pos = Some(i + 1);
                    break;
                }
            }
            _ => {}
        }
    }

    let end_pos = end_pos.ok_or_else(|| "Could not find end of ytInitialData JSON".to_string())?;
    let json_str = &html[start_pos..start_pos + end_pos];
    debug!("Extracted ytInitialData JSON: {} bytes", json_str.len());

    serde_json::from_str(json_str).map_err(|e| format!("Failed to parse ytInitialData: {e}"))
}

/// Navigate to the playlist item list.
fn find_playlist_contents(json: &serde_json::Value) -> Option<&Vec<serde_json::Value>> {
    // contents.twoColumnBrowseResultsRenderer.tabs[].tabRenderer.content
    //   .sectionListRenderer.contents[].itemSectionRenderer.contents[]
    //   .playlistVideoListRenderer.contents
    let tabs = json
        .get("contents")?
        .get("twoColumnBrowseResultsRenderer")?
        .get("tabs")?
        .as_array()?;

    tabs.iter()
        .filter_map(|tab| {
            tab.get("tabRenderer")?
                .get("content")?
                .get("sectionListRenderer")?
                .get("contents")?
                .as_array()
        })
        .flatten()
        .filter_map(|section| {
            section
                .get("itemSectionRenderer")?
                .get("contents")?
                .as_array()
        })
        .flatten()
        .find_map(|item| {
            item.get("playlistVideoListRenderer")?
                .get("contents")?
                .as_array()
        })
}

fn parse_playlist_item(renderer: &serde_json::Value) -> Option<SourceRef> {
    let id = renderer.get("videoId")?.as_str()?;

    let title = renderer
        .get("title")?
        .get("runs")?
        .as_array()?
        .first()?
        .get("text")?
        .as_str()?;

    Some(SourceRef::new(SourceKind::YoutubeVideo, id, title))
}
