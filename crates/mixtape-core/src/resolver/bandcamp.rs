//! Bandcamp track and album adapters.
//!
//! Both page types embed their data as HTML-escaped JSON in a `data-tralbum`
//! attribute. A track page lists its encodings under `trackinfo[0].file`; an
//! album page lists every track with a link to its own page.

use std::collections::BTreeMap;
use std::sync::LazyLock;

use async_trait::async_trait;
use regex::Regex;
use reqwest::Url;
use serde::Deserialize;
use tracing::{debug, info};

use super::{CollectionSource, StreamSource, fetch_text, html_decode};
use crate::error::ResolutionError;
use crate::source::{SourceKind, SourceRef, StreamCandidate};

static TRALBUM_RE: LazyLock<Option<Regex>> =
    LazyLock::new(|| Regex::new(r#"data-tralbum="([^"]*)""#).ok());

#[derive(Debug, Deserialize)]
struct Tralbum {
    artist: Option<String>,
    #[serde(default)]
    trackinfo: Vec<TrackEntry>,
}

#[derive(Debug, Deserialize)]
struct TrackEntry {
    title: Option<String>,
    title_link: Option<String>,
    file: Option<BTreeMap<String, String>>,
}

/// Extract and parse the `data-tralbum` JSON of a page.
fn parse_tralbum(page_id: &str, html: &str) -> std::result::Result<Tralbum, ResolutionError> {
    let encoded = TRALBUM_RE
        .as_ref()
        .and_then(|re| re.captures(html))
        .and_then(|caps| caps.get(1))
        .ok_or_else(|| ResolutionError::invalid(page_id, "page has no data-tralbum attribute"))?;

    serde_json::from_str(&html_decode(encoded.as_str()))
        .map_err(|e| ResolutionError::invalid(page_id, format!("Failed to parse tralbum data: {e}")))
}

fn display_title(artist: Option<&str>, title: &str) -> String {
    match artist {
        Some(artist) if !artist.is_empty() => format!("{artist} - {title}"),
        _ => title.to_string(),
    }
}

/// Parse the encodings of a track page.
pub fn parse_track_page(
    page_url: &str,
    html: &str,
) -> std::result::Result<Vec<StreamCandidate>, ResolutionError> {
    let tralbum = parse_tralbum(page_url, html)?;
    let track = tralbum
        .trackinfo
        .into_iter()
        .next()
        .ok_or_else(|| ResolutionError::invalid(page_url, "track page lists no track"))?;

    // Unstreamable tracks carry a null file map.
    Ok(track
        .file
        .unwrap_or_default()
        .into_iter()
        .map(|(encoding, url)| StreamCandidate::new(encoding, url))
        .collect())
}

/// Parse the track list of an album page, in album order.
///
/// Every track must carry a title and a link; one malformed track fails the
/// whole album.
pub fn parse_album_page(
    album_url: &str,
    html: &str,
) -> std::result::Result<Vec<SourceRef>, ResolutionError> {
    let base = Url::parse(album_url)
        .map_err(|e| ResolutionError::invalid(album_url, format!("Invalid album URL: {e}")))?;
    let tralbum = parse_tralbum(album_url, html)?;

    tralbum
        .trackinfo
        .iter()
        .enumerate()
        .map(|(position, track)| {
            let malformed =
                || ResolutionError::invalid(album_url, format!("malformed track {}", position + 1));

            let title = track.title.as_deref().ok_or_else(malformed)?;
            let link = track.title_link.as_deref().ok_or_else(malformed)?;
            let track_url = base.join(link).map_err(|_| malformed())?;

            Ok(SourceRef::new(
                SourceKind::BandcampTrack,
                track_url.as_str(),
                display_title(tralbum.artist.as_deref(), title),
            ))
        })
        .collect()
}

/// Streams of a single Bandcamp track, keyed by encoding name.
#[derive(Debug, Clone)]
pub struct BandcampTrackSource {
    client: reqwest::Client,
}

impl BandcampTrackSource {
    /// Create a new track adapter using the given HTTP client.
    #[must_use]
    pub const fn new(client: reqwest::Client) -> Self {
        Self { client }
    }
}

#[async_trait]
impl StreamSource for BandcampTrackSource {
    async fn candidates(
        &self,
        source: &SourceRef,
    ) -> std::result::Result<Vec<StreamCandidate>, ResolutionError> {
        debug!("Fetching Bandcamp track page: {}", source.id);
        let html = fetch_text(&self.client, &source.id, &source.id).await?;
        parse_track_page(&source.id, &html)
    }
}

/// Lists the tracks of a Bandcamp album.
#[derive(Debug, Clone)]
pub struct BandcampAlbumSource {
    client: reqwest::Client,
}

impl BandcampAlbumSource {
    /// Create a new album adapter using the given HTTP client.
    #[must_use]
    pub const fn new(client: reqwest::Client) -> Self {
        Self { client }
    }
}

#[async_trait]
impl CollectionSource for BandcampAlbumSource {
    async fn entries(
        &self,
        source: &SourceRef,
    ) -> std::result::Result<Vec<SourceRef>, ResolutionError> {
        info!("Fetching Bandcamp album page: {}", source.id);
        let html = fetch_text(&self.client, &source.id, &source.id).await?;
        parse_album_page(&source.id, &html)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    fn page(tralbum_json: &str) -> String {
        let encoded = tralbum_json.replace('&', "&amp;").replace('"', "&quot;");
        format!(r#"<html><script data-band="x" data-tralbum="{encoded}"></script></html>"#)
    }

    #[test]
    fn test_parse_track_page_lists_encodings() {
        let html = page(
            r#"{"artist":"Band","trackinfo":[{"title":"Song","title_link":"/track/song","file":{"mp3-128":"https://t4.bcbits.com/stream/abc?p=0&ts=1"}}]}"#,
        );
        let candidates = parse_track_page("https://band.bandcamp.com/track/song", &html).unwrap();
        assert_eq!(candidates.len(), 1);
        assert_eq!(candidates[0].format_id, "mp3-128");
        assert_eq!(candidates[0].url, "https://t4.bcbits.com/stream/abc?p=0&ts=1");
    }

    #[test]
    fn test_unstreamable_track_has_no_candidates() {
        let html = page(r#"{"trackinfo":[{"title":"Song","title_link":"/track/song","file":null}]}"#);
        let candidates = parse_track_page("https://band.bandcamp.com/track/song", &html).unwrap();
        assert!(candidates.is_empty());
    }

    #[test]
    fn test_parse_album_page_in_order() {
        let html = page(
            r#"{"artist":"Band","trackinfo":[
                {"title":"One","title_link":"/track/one","file":null},
                {"title":"Two","title_link":"/track/two","file":null},
                {"title":"Three","title_link":"/track/three","file":null}]}"#,
        );
        let tracks = parse_album_page("https://band.bandcamp.com/album/record", &html).unwrap();

        let titles: Vec<_> = tracks.iter().map(|t| t.title.as_str()).collect();
        assert_eq!(titles, vec!["Band - One", "Band - Two", "Band - Three"]);
        assert_eq!(tracks[1].id, "https://band.bandcamp.com/track/two");
        assert!(tracks.iter().all(|t| t.kind == SourceKind::BandcampTrack));
    }

    #[test]
    fn test_album_with_malformed_track_fails() {
        let html = page(
            r#"{"trackinfo":[{"title":"One","title_link":"/track/one"},{"title":"Two"}]}"#,
        );
        let result = parse_album_page("https://band.bandcamp.com/album/record", &html);
        assert!(matches!(result, Err(ResolutionError::InvalidData { .. })));
    }

    #[test]
    fn test_page_without_tralbum_fails() {
        let result = parse_album_page("https://band.bandcamp.com/album/record", "<html/>");
        assert!(matches!(result, Err(ResolutionError::InvalidData { .. })));
    }

    #[test]
    fn test_unparsable_tralbum_fails() {
        let html = r#"<div data-tralbum="{not json"></div>"#;
        let result = parse_track_page("https://band.bandcamp.com/track/x", html);
        assert!(matches!(result, Err(ResolutionError::InvalidData { .. })));
    }
}
