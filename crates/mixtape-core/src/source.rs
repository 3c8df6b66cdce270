//! Source references and the songs they resolve into.

use serde::{Deserialize, Serialize};

/// Unique identifier for a song in the play queue.
pub type SongId = u64;

/// Where a media reference comes from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SourceKind {
    /// A single `YouTube` video.
    YoutubeVideo,
    /// A `YouTube` playlist.
    YoutubePlaylist,
    /// A SoundCloud track.
    SoundCloud,
    /// A file on the local disk.
    LocalFile,
    /// A Vimeo video.
    Vimeo,
    /// A single Bandcamp track.
    BandcampTrack,
    /// A Bandcamp album.
    BandcampAlbum,
}

impl SourceKind {
    /// All kinds, in declaration order.
    pub const ALL: [Self; 7] = [
        Self::YoutubeVideo,
        Self::YoutubePlaylist,
        Self::SoundCloud,
        Self::LocalFile,
        Self::Vimeo,
        Self::BandcampTrack,
        Self::BandcampAlbum,
    ];

    /// Whether this kind fans out into several child references.
    #[must_use]
    pub const fn is_collection(self) -> bool {
        matches!(self, Self::YoutubePlaylist | Self::BandcampAlbum)
    }
}

impl std::fmt::Display for SourceKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::YoutubeVideo => write!(f, "youtube"),
            Self::YoutubePlaylist => write!(f, "youtube playlist"),
            Self::SoundCloud => write!(f, "soundcloud"),
            Self::LocalFile => write!(f, "local file"),
            Self::Vimeo => write!(f, "vimeo"),
            Self::BandcampTrack => write!(f, "bandcamp track"),
            Self::BandcampAlbum => write!(f, "bandcamp album"),
        }
    }
}

/// An immutable reference to remote (or local) media.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SourceRef {
    /// Which adapter handles this reference.
    pub kind: SourceKind,
    /// Opaque, adapter-specific identifier (video id, page URL, path...).
    pub id: String,
    /// Display title.
    pub title: String,
}

impl SourceRef {
    /// Create a new source reference.
    pub fn new(kind: SourceKind, id: impl Into<String>, title: impl Into<String>) -> Self {
        Self {
            kind,
            id: id.into(),
            title: title.into(),
        }
    }
}

/// One playable format offered by a source.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StreamCandidate {
    /// Adapter-specific format identifier (itag, quality label, encoding name).
    pub format_id: String,
    /// Direct stream URL.
    pub url: String,
    /// Size of the stream in bytes, when the source declares it.
    pub content_length: Option<u64>,
}

impl StreamCandidate {
    /// Create a new candidate.
    pub fn new(format_id: impl Into<String>, url: impl Into<String>) -> Self {
        Self {
            format_id: format_id.into(),
            url: url.into(),
            content_length: None,
        }
    }

    /// Set the declared byte length.
    #[must_use]
    pub const fn with_length(mut self, length: Option<u64>) -> Self {
        self.content_length = length;
        self
    }
}

/// The stream picked for a song after format selection.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResolvedStream {
    /// Direct stream URL.
    pub url: String,
    /// Declared byte length.
    pub content_length: Option<u64>,
    /// Format that was selected.
    pub format_id: String,
}

impl From<StreamCandidate> for ResolvedStream {
    fn from(candidate: StreamCandidate) -> Self {
        Self {
            url: candidate.url,
            content_length: candidate.content_length,
            format_id: candidate.format_id,
        }
    }
}

/// An entry in the play queue.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Song {
    /// Queue-assigned identity.
    pub id: SongId,
    /// The leaf reference this song was created from.
    pub source: SourceRef,
    /// Display title.
    pub title: String,
    /// Stream URL, `None` until resolved.
    pub stream_url: Option<String>,
    /// Whether stream resolution is in flight.
    pub stream_url_loading: bool,
    /// Declared stream size in bytes.
    pub stream_length: Option<u64>,
    /// Last resolution failure, if the stream could not be resolved.
    pub resolution_error: Option<String>,
}

impl Song {
    /// Create an unresolved song whose stream is about to be fetched.
    #[must_use]
    pub fn pending(id: SongId, source: SourceRef) -> Self {
        Self {
            id,
            title: source.title.clone(),
            source,
            stream_url: None,
            stream_url_loading: true,
            stream_length: None,
            resolution_error: None,
        }
    }

    /// Create a song with an already resolved stream.
    #[must_use]
    pub fn resolved(id: SongId, source: SourceRef, stream: ResolvedStream) -> Self {
        Self {
            id,
            title: source.title.clone(),
            source,
            stream_url: Some(stream.url),
            stream_url_loading: false,
            stream_length: stream.content_length,
            resolution_error: None,
        }
    }

    /// Whether the stream URL is available.
    #[must_use]
    pub const fn is_ready(&self) -> bool {
        self.stream_url.is_some()
    }
}
