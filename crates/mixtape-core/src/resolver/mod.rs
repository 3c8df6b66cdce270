//! Source resolution.
//!
//! Every [`SourceKind`] is served by exactly one adapter. An adapter has one of
//! two capabilities:
//!
//! - [`StreamSource`]: list the stream candidates of a single track.
//! - [`CollectionSource`]: list the child references of a playlist or album.
//!
//! [`SourceResolver`] dispatches on the kind, flattens collections into leaf
//! references in source order, and applies the required-format filter from
//! [`FormatPolicy`] to the stream candidates of each leaf.
//!
//! ```rust,no_run
//! use mixtape_core::{AppConfig, SourceKind, SourceRef, SourceResolver};
//!
//! # async fn run() -> mixtape_core::Result<()> {
//! let resolver = SourceResolver::with_default_adapters(&AppConfig::default());
//! let album = SourceRef::new(
//!     SourceKind::BandcampAlbum,
//!     "https://artist.bandcamp.com/album/record",
//!     "Record",
//! );
//! for entry in resolver.resolve(&album).await? {
//!     println!("{} -> {}", entry.source.title, entry.stream.url);
//! }
//! # Ok(())
//! # }
//! ```

pub mod bandcamp;
pub mod local;
pub mod soundcloud;
pub mod vimeo;
pub mod youtube;

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use futures::future::{BoxFuture, FutureExt, try_join_all};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::config::{AppConfig, FormatPolicy};
use crate::error::{Error, FormatUnavailableError, ResolutionError, Result};
use crate::source::{ResolvedStream, SourceKind, SourceRef, StreamCandidate};

pub use bandcamp::{BandcampAlbumSource, BandcampTrackSource};
pub use local::LocalFileSource;
pub use soundcloud::SoundCloudSource;
pub use vimeo::VimeoSource;
pub use youtube::{YoutubePlaylistSource, YoutubeVideoSource};

/// Collections nested deeper than this are rejected.
pub const MAX_EXPANSION_DEPTH: usize = 4;

/// Browser-like user agent for page scraping.
pub(crate) const USER_AGENT: &str = "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36";

/// Lists the playable streams of a single track.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait StreamSource: Send + Sync {
    /// Fetch the stream candidates for a leaf reference.
    async fn candidates(
        &self,
        source: &SourceRef,
    ) -> std::result::Result<Vec<StreamCandidate>, ResolutionError>;
}

/// Lists the children of a playlist or album.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait CollectionSource: Send + Sync {
    /// Fetch the child references, in source order.
    ///
    /// Implementations must fail as a whole when any part of the listing is
    /// malformed rather than return a subset.
    async fn entries(
        &self,
        source: &SourceRef,
    ) -> std::result::Result<Vec<SourceRef>, ResolutionError>;
}

/// The capability registered for a source kind.
#[derive(Clone)]
pub enum SourceAdapter {
    /// Resolves directly into a stream.
    Stream(Arc<dyn StreamSource>),
    /// Fans out into child references.
    Collection(Arc<dyn CollectionSource>),
}

impl std::fmt::Debug for SourceAdapter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Stream(_) => write!(f, "Stream"),
            Self::Collection(_) => write!(f, "Collection"),
        }
    }
}

/// A fully resolved leaf: the reference and its selected stream.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResolvedEntry {
    /// Leaf reference.
    pub source: SourceRef,
    /// Selected stream.
    pub stream: ResolvedStream,
}

/// Dispatches source references to their adapters.
#[derive(Clone)]
pub struct SourceResolver {
    adapters: HashMap<SourceKind, SourceAdapter>,
    formats: FormatPolicy,
}

impl SourceResolver {
    /// Create a resolver with no adapters registered.
    #[must_use]
    pub fn new(formats: FormatPolicy) -> Self {
        Self {
            adapters: HashMap::new(),
            formats,
        }
    }

    /// Create a resolver with the network adapters for every source kind.
    #[must_use]
    pub fn with_default_adapters(config: &AppConfig) -> Self {
        let client = reqwest::Client::builder()
            .user_agent(USER_AGENT)
            .build()
            .unwrap_or_else(|e| {
                warn!("Falling back to default HTTP client: {}", e);
                reqwest::Client::new()
            });

        Self::new(config.formats.clone())
            .with_stream(SourceKind::YoutubeVideo, YoutubeVideoSource::new())
            .with_collection(
                SourceKind::YoutubePlaylist,
                YoutubePlaylistSource::new(client.clone()),
            )
            .with_stream(
                SourceKind::SoundCloud,
                SoundCloudSource::new(client.clone(), config.soundcloud.client_id.clone()),
            )
            .with_stream(SourceKind::LocalFile, LocalFileSource)
            .with_stream(SourceKind::Vimeo, VimeoSource::new(client.clone()))
            .with_stream(
                SourceKind::BandcampTrack,
                BandcampTrackSource::new(client.clone()),
            )
            .with_collection(SourceKind::BandcampAlbum, BandcampAlbumSource::new(client))
    }

    /// Register a stream adapter for a kind, replacing any previous one.
    #[must_use]
    pub fn with_stream(mut self, kind: SourceKind, source: impl StreamSource + 'static) -> Self {
        self.adapters
            .insert(kind, SourceAdapter::Stream(Arc::new(source)));
        self
    }

    /// Register a collection adapter for a kind, replacing any previous one.
    #[must_use]
    pub fn with_collection(
        mut self,
        kind: SourceKind,
        source: impl CollectionSource + 'static,
    ) -> Self {
        self.adapters
            .insert(kind, SourceAdapter::Collection(Arc::new(source)));
        self
    }

    fn adapter(&self, kind: SourceKind) -> std::result::Result<&SourceAdapter, ResolutionError> {
        self.adapters
            .get(&kind)
            .ok_or(ResolutionError::UnsupportedKind { kind })
    }

    /// Flatten a reference into leaf references, preserving source order.
    ///
    /// A leaf expands to itself without any network access. Collections are
    /// listed and each child is expanded through the same dispatch; any
    /// failure fails the whole expansion.
    pub async fn expand(&self, source: &SourceRef) -> Result<Vec<SourceRef>> {
        self.expand_at(source, 0).await
    }

    fn expand_at<'a>(
        &'a self,
        source: &'a SourceRef,
        depth: usize,
    ) -> BoxFuture<'a, Result<Vec<SourceRef>>> {
        async move {
            match self.adapter(source.kind)? {
                SourceAdapter::Stream(_) => Ok(vec![source.clone()]),
                SourceAdapter::Collection(collection) => {
                    if depth >= MAX_EXPANSION_DEPTH {
                        return Err(ResolutionError::invalid(
                            &source.id,
                            "collections nested too deeply",
                        )
                        .into());
                    }

                    debug!("Listing {} '{}'", source.kind, source.title);
                    let children = collection.entries(source).await?;
                    let nested =
                        try_join_all(children.iter().map(|child| self.expand_at(child, depth + 1)))
                            .await?;
                    let leaves: Vec<SourceRef> = nested.into_iter().flatten().collect();

                    info!(
                        "Expanded {} '{}' into {} entries",
                        source.kind,
                        source.title,
                        leaves.len()
                    );
                    Ok(leaves)
                }
            }
        }
        .boxed()
    }

    /// Resolve the stream of a leaf reference in its required format.
    pub async fn resolve_stream(&self, leaf: &SourceRef) -> Result<ResolvedStream> {
        let SourceAdapter::Stream(stream_source) = self.adapter(leaf.kind)? else {
            return Err(ResolutionError::NotDownloadable { kind: leaf.kind }.into());
        };

        let required = self.formats.required_for(leaf.kind).ok_or_else(|| {
            Error::Configuration(format!("No required stream format for {}", leaf.kind))
        })?;

        debug!("Resolving stream for {} '{}'", leaf.kind, leaf.title);
        let candidates = stream_source.candidates(leaf).await?;
        let stream = select_format(&leaf.id, candidates, required)?;

        debug!(
            "Resolved '{}' to format {} ({:?} bytes)",
            leaf.title, stream.format_id, stream.content_length
        );
        Ok(stream)
    }

    /// Resolve a reference into fully resolved entries in source order.
    ///
    /// Fails as a whole if the listing or any child stream fails.
    pub async fn resolve(&self, source: &SourceRef) -> Result<Vec<ResolvedEntry>> {
        let leaves = self.expand(source).await?;
        try_join_all(leaves.into_iter().map(|leaf| async move {
            let stream = self.resolve_stream(&leaf).await?;
            Ok::<_, Error>(ResolvedEntry {
                source: leaf,
                stream,
            })
        }))
        .await
    }
}

impl std::fmt::Debug for SourceResolver {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let mut kinds: Vec<_> = self.adapters.keys().copied().collect();
        kinds.sort();
        f.debug_struct("SourceResolver")
            .field("kinds", &kinds)
            .field("formats", &self.formats)
            .finish_non_exhaustive()
    }
}

/// Pick the candidate with the required format id.
///
/// There is no fallback: when nothing matches, the error lists what the
/// source offered.
pub fn select_format(
    source_id: &str,
    candidates: Vec<StreamCandidate>,
    required: &str,
) -> std::result::Result<ResolvedStream, FormatUnavailableError> {
    let offered: Vec<String> = candidates.iter().map(|c| c.format_id.clone()).collect();

    candidates
        .into_iter()
        .find(|candidate| candidate.format_id == required)
        .map(ResolvedStream::from)
        .ok_or_else(|| FormatUnavailableError {
            source_id: source_id.to_string(),
            required: required.to_string(),
            offered,
        })
}

/// Fetch a page body as text.
pub(crate) async fn fetch_text(
    client: &reqwest::Client,
    url: &str,
    source_id: &str,
) -> std::result::Result<String, ResolutionError> {
    let response = client
        .get(url)
        .header("Accept-Language", "en-US,en;q=0.9")
        .send()
        .await
        .and_then(reqwest::Response::error_for_status)
        .map_err(|e| ResolutionError::fetch(source_id, e))?;

    response
        .text()
        .await
        .map_err(|e| ResolutionError::fetch(source_id, format!("Failed to read response: {e}")))
}

/// Decode the handful of HTML entities that appear in embedded data.
pub(crate) fn html_decode(s: &str) -> String {
    s.replace("&quot;", "\"")
        .replace("&lt;", "<")
        .replace("&gt;", ">")
        .replace("&#39;", "'")
        .replace("&apos;", "'")
        .replace("&amp;", "&")
}
