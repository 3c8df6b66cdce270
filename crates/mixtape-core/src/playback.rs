//! Playback state machine.
//!
//! ```text
//! Stopped -> Loading -> Playing -> Stopped
//!    ^          |
//!    +----------+  (stream failed / toggled)
//! ```
//!
//! [`PlaybackController`] reads the play queue but never mutates it. Each input
//! returns a [`Transition`]: the player target to push (if it changed), side
//! effects for the scrobble sink, and an optional request to move the queue's
//! current index before playing again.

use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::queue::PlayQueue;
use crate::source::{Song, SongId};

/// Playback status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PlaybackStatus {
    /// Nothing is playing.
    #[default]
    Stopped,
    /// Waiting for the current song's stream to resolve.
    Loading,
    /// The player is playing the current song.
    Playing,
}

impl std::fmt::Display for PlaybackStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Stopped => write!(f, "Stopped"),
            Self::Loading => write!(f, "Loading"),
            Self::Playing => write!(f, "Playing"),
        }
    }
}

/// Playback state of the session. Positions are in seconds.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PlaybackState {
    /// Current status.
    pub status: PlaybackStatus,
    /// Last reported position.
    pub position: f64,
    /// Last reported duration.
    pub duration: f64,
    /// Position the player should start from.
    pub seek_target: f64,
    /// Whether the player is buffering.
    pub stream_loading: bool,
    /// Rounded percent progress derived from position and duration.
    pub progress: u8,
}

/// What the player should be doing.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PlayerTarget {
    /// Stream to load, `None` when there is nothing to play.
    pub stream_url: Option<String>,
    /// Desired status.
    pub status: PlaybackStatus,
    /// Start position in seconds.
    pub seek_target: f64,
}

/// Side effect requested by a transition.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum PlaybackEffect {
    /// A song started playing.
    NowPlaying {
        /// Display title.
        title: String,
    },
    /// A song played to the end.
    Scrobble {
        /// Display title.
        title: String,
    },
    /// The current song cannot be played.
    Unplayable {
        /// Display title.
        title: String,
        /// Why.
        reason: String,
    },
}

/// Result of one playback input.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Transition {
    /// New player target, if it changed.
    pub target: Option<PlayerTarget>,
    /// Side effects to run.
    pub effects: Vec<PlaybackEffect>,
    /// Queue index to select before calling [`PlaybackController::play`].
    pub advance_to: Option<usize>,
}

impl Transition {
    /// A transition that changes nothing.
    #[must_use]
    pub fn none() -> Self {
        Self::default()
    }

    /// Whether the transition changes nothing.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.target.is_none() && self.effects.is_empty() && self.advance_to.is_none()
    }

    /// Append the target and effects of a follow-up transition.
    pub fn merge(&mut self, next: Self) {
        if next.target.is_some() {
            self.target = next.target;
        }
        self.effects.extend(next.effects);
        self.advance_to = next.advance_to;
    }
}

/// Drives [`PlaybackState`] from user commands and player callbacks.
#[derive(Debug, Clone, Default)]
pub struct PlaybackController {
    state: PlaybackState,
    stream_url: Option<String>,
}

impl PlaybackController {
    /// Create a stopped controller.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Current state.
    #[must_use]
    pub const fn state(&self) -> &PlaybackState {
        &self.state
    }

    /// Current status.
    #[must_use]
    pub const fn status(&self) -> PlaybackStatus {
        self.state.status
    }

    fn target(&self) -> PlayerTarget {
        PlayerTarget {
            stream_url: self.stream_url.clone(),
            status: self.state.status,
            seek_target: self.state.seek_target,
        }
    }

    fn set_status(&mut self, status: PlaybackStatus) {
        if self.state.status != status {
            debug!("Playback {} -> {}", self.state.status, status);
            self.state.status = status;
        }
    }

    fn stop(&mut self) -> Transition {
        self.set_status(PlaybackStatus::Stopped);
        Transition {
            target: Some(self.target()),
            ..Transition::none()
        }
    }

    /// Start playing `song` from `seek_target`, or wait for its stream.
    fn start(&mut self, song: &Song, seek_target: f64) -> Transition {
        self.state.seek_target = seek_target;

        if let Some(url) = &song.stream_url {
            self.stream_url = Some(url.clone());
            self.set_status(PlaybackStatus::Playing);
            info!("Playing '{}'", song.title);
            return Transition {
                target: Some(self.target()),
                effects: vec![PlaybackEffect::NowPlaying {
                    title: song.title.clone(),
                }],
                advance_to: None,
            };
        }

        if song.stream_url_loading {
            self.stream_url = None;
            self.set_status(PlaybackStatus::Loading);
            debug!("Waiting for stream of '{}'", song.title);
            return Transition {
                target: Some(self.target()),
                ..Transition::none()
            };
        }

        let reason = song
            .resolution_error
            .clone()
            .unwrap_or_else(|| "stream unavailable".to_string());
        warn!("Cannot play '{}': {}", song.title, reason);
        self.stream_url = None;
        let mut transition = self.stop();
        transition.effects.push(PlaybackEffect::Unplayable {
            title: song.title.clone(),
            reason,
        });
        transition
    }

    /// Play the queue's current song from the beginning.
    ///
    /// Enters `Loading` while the stream is unresolved and `Playing` once it
    /// is. An empty queue stops playback.
    pub fn play(&mut self, queue: &PlayQueue) -> Transition {
        self.state.position = 0.0;
        self.state.progress = 0;
        match queue.current_song() {
            Some(song) => self.start(song, 0.0),
            None => {
                self.stream_url = None;
                self.stop()
            }
        }
    }

    /// Switch between playing and stopped.
    ///
    /// Resuming restarts the current song's stream at the last reported
    /// position. Toggling while loading cancels the pending start.
    pub fn toggle(&mut self, queue: &PlayQueue) -> Transition {
        match self.state.status {
            PlaybackStatus::Playing | PlaybackStatus::Loading => {
                self.state.seek_target = self.state.position;
                self.stop()
            }
            PlaybackStatus::Stopped => match queue.current_song() {
                Some(song) => {
                    let position = self.state.position;
                    self.start(song, position)
                }
                None => Transition::none(),
            },
        }
    }

    /// Ask the player to jump to `percent` (0.0 to 1.0) of the duration.
    pub fn seek(&mut self, percent: f64) -> Transition {
        let percent = if percent.is_finite() {
            percent.clamp(0.0, 1.0)
        } else {
            0.0
        };
        self.state.seek_target = percent * self.state.duration;
        debug!("Seek to {:.1}s", self.state.seek_target);
        Transition {
            target: Some(self.target()),
            ..Transition::none()
        }
    }

    /// Index after the current one, `None` at the end of the queue.
    #[must_use]
    pub fn next_index(queue: &PlayQueue) -> Option<usize> {
        queue
            .current_index()
            .map(|index| index + 1)
            .filter(|&index| index < queue.len())
    }

    /// Index before the current one, `None` at the start of the queue.
    #[must_use]
    pub fn prev_index(queue: &PlayQueue) -> Option<usize> {
        queue.current_index().and_then(|index| index.checked_sub(1))
    }

    /// The player reached the end of the current song.
    ///
    /// Scrobbles it and resets the position. Requests the next index unless
    /// the song was the last one, in which case playback stops.
    pub fn on_track_finished(&mut self, queue: &PlayQueue) -> Transition {
        let mut effects = Vec::new();
        if let Some(song) = queue.current_song() {
            effects.push(PlaybackEffect::Scrobble {
                title: song.title.clone(),
            });
        }

        self.state.position = 0.0;
        self.state.seek_target = 0.0;
        self.state.progress = 0;

        if let Some(next) = Self::next_index(queue) {
            return Transition {
                target: None,
                effects,
                advance_to: Some(next),
            };
        }

        info!("Reached end of queue");
        let mut transition = self.stop();
        transition.effects = effects;
        transition
    }

    /// The player started or finished buffering.
    pub const fn on_loading_progress(&mut self, loaded: bool) {
        self.state.stream_loading = !loaded;
    }

    /// The player reported its position.
    pub fn on_progress(&mut self, position: f64, duration: f64) {
        self.state.position = position;
        self.state.duration = duration;
        self.state.progress = percent(position, duration);
        self.state.stream_loading = false;
    }

    /// Finish a pending `Loading` once the song's resolution has landed in the queue.
    fn settle_pending(&mut self, queue: &PlayQueue, id: SongId) -> Transition {
        match queue.current_song() {
            Some(song) if song.id == id && self.state.status == PlaybackStatus::Loading => {
                let seek_target = self.state.seek_target;
                self.start(song, seek_target)
            }
            _ => Transition::none(),
        }
    }

    /// A song's stream became available.
    pub fn on_stream_ready(&mut self, queue: &PlayQueue, id: SongId) -> Transition {
        self.settle_pending(queue, id)
    }

    /// A song's stream could not be resolved. Stops if it was the one loading.
    pub fn on_stream_failed(&mut self, queue: &PlayQueue, id: SongId) -> Transition {
        self.settle_pending(queue, id)
    }

    /// The current song was removed from the queue.
    pub fn on_current_removed(&mut self) -> Transition {
        self.stream_url = None;
        self.state.position = 0.0;
        self.state.seek_target = 0.0;
        self.state.progress = 0;
        self.stop()
    }

    /// Forget everything; used when the queue is cleared.
    pub fn reset(&mut self) -> Transition {
        self.state = PlaybackState::default();
        self.stream_url = None;
        Transition {
            target: Some(self.target()),
            ..Transition::none()
        }
    }
}

#[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
fn percent(position: f64, duration: f64) -> u8 {
    if duration <= 0.0 || !duration.is_finite() || !position.is_finite() {
        return 0;
    }
    ((position / duration) * 100.0).round().clamp(0.0, 100.0) as u8
}
