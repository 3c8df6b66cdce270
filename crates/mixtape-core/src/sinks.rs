//! Interfaces to the collaborators the engine drives but does not own.
//!
//! - [`Player`] plays a stream URL and reports loading, progress and the end
//!   of a track back through the orchestrator handle.
//! - [`NotificationSink`] shows short messages to the user.
//! - [`ScrobbleSink`] reports listening history.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, error, info};

use crate::playback::PlayerTarget;

/// Artist used when a title carries no artist part.
pub const UNKNOWN_ARTIST: &str = "Unknown Artist";

/// The audio engine.
#[cfg_attr(test, mockall::automock)]
pub trait Player: Send + Sync {
    /// Load `target.stream_url` and move to `target.status`, starting from
    /// `target.seek_target` seconds.
    fn apply(&self, target: &PlayerTarget);
}

/// Fire-and-forget user notifications.
#[cfg_attr(test, mockall::automock)]
pub trait NotificationSink: Send + Sync {
    /// Neutral information.
    fn info(&self, text: &str);
    /// Something the user asked for succeeded.
    fn success(&self, text: &str);
    /// Something the user asked for failed.
    fn error(&self, text: &str);
}

/// Failure reported by a scrobble service.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
#[error("Scrobble request failed: {0}")]
pub struct ScrobbleError(pub String);

/// Listening-history service.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait ScrobbleSink: Send + Sync {
    /// Report the track that just started.
    async fn update_now_playing(
        &self,
        session_token: &str,
        artist: &str,
        track: &str,
    ) -> std::result::Result<(), ScrobbleError>;

    /// Report a track that played to the end.
    async fn scrobble(
        &self,
        session_token: &str,
        artist: &str,
        track: &str,
    ) -> std::result::Result<(), ScrobbleError>;
}

/// Artist and track parsed from a display title.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TrackInfo {
    /// Artist name.
    pub artist: String,
    /// Track name.
    pub track: String,
}

impl TrackInfo {
    /// Split `"Artist - Track"` on the first separator.
    ///
    /// Titles without a separator keep the whole title as the track.
    #[must_use]
    pub fn from_title(title: &str) -> Self {
        match title.split_once(" - ") {
            Some((artist, track)) if !artist.trim().is_empty() && !track.trim().is_empty() => {
                Self {
                    artist: artist.trim().to_string(),
                    track: track.trim().to_string(),
                }
            }
            _ => Self {
                artist: UNKNOWN_ARTIST.to_string(),
                track: title.trim().to_string(),
            },
        }
    }
}

/// Notification sink that writes to the log.
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingNotifier;

impl NotificationSink for TracingNotifier {
    fn info(&self, text: &str) {
        info!(target: "mixtape::notify", "{}", text);
    }

    fn success(&self, text: &str) {
        info!(target: "mixtape::notify", success = true, "{}", text);
    }

    fn error(&self, text: &str) {
        error!(target: "mixtape::notify", "{}", text);
    }
}

/// Scrobble sink that only logs what would be reported.
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingScrobbler;

#[async_trait]
impl ScrobbleSink for TracingScrobbler {
    async fn update_now_playing(
        &self,
        _session_token: &str,
        artist: &str,
        track: &str,
    ) -> std::result::Result<(), ScrobbleError> {
        debug!("Now playing: {} - {}", artist, track);
        Ok(())
    }

    async fn scrobble(
        &self,
        _session_token: &str,
        artist: &str,
        track: &str,
    ) -> std::result::Result<(), ScrobbleError> {
        debug!("Scrobbled: {} - {}", artist, track);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_track_info_splits_on_first_separator() {
        let info = TrackInfo::from_title("Daft Punk - One More Time - Radio Edit");
        assert_eq!(info.artist, "Daft Punk");
        assert_eq!(info.track, "One More Time - Radio Edit");
    }

    #[test]
    fn test_track_info_without_artist() {
        let info = TrackInfo::from_title("Ambient Mix");
        assert_eq!(info.artist, UNKNOWN_ARTIST);
        assert_eq!(info.track, "Ambient Mix");

        let info = TrackInfo::from_title(" - Untitled");
        assert_eq!(info.artist, UNKNOWN_ARTIST);
        assert_eq!(info.track, "- Untitled");
    }

    #[tokio::test]
    async fn test_tracing_scrobbler_never_fails() {
        let scrobbler = TracingScrobbler;
        assert!(scrobbler.update_now_playing("s", "a", "t").await.is_ok());
        assert!(scrobbler.scrobble("s", "a", "t").await.is_ok());
    }
}
