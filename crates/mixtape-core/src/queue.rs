//! The play queue.
//!
//! [`PlayQueue`] is a plain synchronous structure owned by the orchestrator
//! task. Every mutation returns a [`QueueDelta`] describing what changed, so
//! callers can react (and tests can assert) without diffing the whole queue.
//!
//! The current index is `Some` exactly when the queue is non-empty. Moves and
//! removals recompute it so it keeps pointing at the same song whenever that
//! song is still in the queue.

use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::error::QueueError;
use crate::source::{ResolvedStream, Song, SongId, SourceRef};

/// A change applied to the play queue.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum QueueDelta {
    /// Songs were appended at the tail, starting at `start`.
    Appended {
        /// Ids of the new songs, in queue order.
        ids: Vec<SongId>,
        /// Index of the first new song.
        start: usize,
    },
    /// A song was removed.
    Removed {
        /// Id of the removed song.
        id: SongId,
        /// Index it occupied.
        index: usize,
        /// Whether it was the current song.
        was_current: bool,
        /// Current index after the removal.
        current_index: Option<usize>,
    },
    /// A song was moved.
    Moved {
        /// Old index.
        from: usize,
        /// New index, after clamping.
        to: usize,
        /// Current index after the move.
        current_index: Option<usize>,
    },
    /// The queue was emptied.
    Cleared,
    /// A song's stream resolution completed or failed.
    SongUpdated {
        /// Id of the song.
        id: SongId,
        /// Its index at the time of the update.
        index: usize,
    },
    /// The current index was set explicitly.
    CurrentChanged {
        /// New current index.
        index: usize,
    },
}

/// A point-in-time copy of the queue.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct QueueSnapshot {
    /// Songs in playback order.
    pub songs: Vec<Song>,
    /// Index of the current song.
    pub current_index: Option<usize>,
}

/// Ordered, reorderable list of songs plus the current position.
#[derive(Debug, Clone, Default)]
pub struct PlayQueue {
    songs: Vec<Song>,
    current_index: Option<usize>,
    next_id: SongId,
}

impl PlayQueue {
    /// Create an empty queue.
    #[must_use]
    pub const fn new() -> Self {
        Self {
            songs: Vec::new(),
            current_index: None,
            next_id: 1,
        }
    }

    const fn next_song_id(&mut self) -> SongId {
        let id = self.next_id;
        self.next_id += 1;
        id
    }

    /// Number of songs.
    #[must_use]
    pub fn len(&self) -> usize {
        self.songs.len()
    }

    /// Whether the queue has no songs.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.songs.is_empty()
    }

    /// Songs in playback order.
    #[must_use]
    pub fn songs(&self) -> &[Song] {
        &self.songs
    }

    /// Song at an index.
    #[must_use]
    pub fn get(&self, index: usize) -> Option<&Song> {
        self.songs.get(index)
    }

    /// Song with an id.
    #[must_use]
    pub fn song(&self, id: SongId) -> Option<&Song> {
        self.songs.iter().find(|song| song.id == id)
    }

    /// Index of the song with an id.
    #[must_use]
    pub fn index_of(&self, id: SongId) -> Option<usize> {
        self.songs.iter().position(|song| song.id == id)
    }

    /// Current index, `None` when the queue is empty.
    #[must_use]
    pub const fn current_index(&self) -> Option<usize> {
        self.current_index
    }

    /// The song at the current index.
    #[must_use]
    pub fn current_song(&self) -> Option<&Song> {
        self.current_index.and_then(|index| self.songs.get(index))
    }

    /// Whether the current index is the last slot.
    #[must_use]
    pub fn is_at_end(&self) -> bool {
        self.current_index
            .is_none_or(|index| index + 1 >= self.songs.len())
    }

    /// Append unresolved placeholders for the given leaves, in order.
    pub fn append(&mut self, leaves: Vec<SourceRef>) -> QueueDelta {
        let start = self.songs.len();
        let mut ids = Vec::with_capacity(leaves.len());

        for leaf in leaves {
            let id = self.next_song_id();
            self.songs.push(Song::pending(id, leaf));
            ids.push(id);
        }

        if self.current_index.is_none() && !self.songs.is_empty() {
            self.current_index = Some(0);
        }

        info!(
            "Appended {} songs to queue at index {} (len {})",
            ids.len(),
            start,
            self.songs.len()
        );
        QueueDelta::Appended { ids, start }
    }

    /// Record the stream resolution result of one song.
    ///
    /// Returns `None` when the song is no longer in the queue.
    pub fn apply_stream(
        &mut self,
        id: SongId,
        result: std::result::Result<ResolvedStream, String>,
    ) -> Option<QueueDelta> {
        let Some(index) = self.index_of(id) else {
            debug!("Dropping stream result for removed song {}", id);
            return None;
        };
        let song = &mut self.songs[index];
        song.stream_url_loading = false;

        match result {
            Ok(stream) => {
                song.stream_url = Some(stream.url);
                song.stream_length = stream.content_length;
                song.resolution_error = None;
                debug!("Song {} stream ready ({})", id, stream.format_id);
            }
            Err(reason) => {
                debug!("Song {} stream failed: {}", id, reason);
                song.resolution_error = Some(reason);
            }
        }

        Some(QueueDelta::SongUpdated { id, index })
    }

    /// Remove a song by id.
    ///
    /// # Errors
    ///
    /// Returns [`QueueError::SongNotFound`] if no song has this id.
    pub fn remove(&mut self, id: SongId) -> std::result::Result<QueueDelta, QueueError> {
        let index = self.index_of(id).ok_or(QueueError::SongNotFound(id))?;
        self.songs.remove(index);

        let was_current = self.current_index == Some(index);
        self.current_index = match self.current_index {
            _ if self.songs.is_empty() => None,
            Some(current) if index <= current => Some(current.saturating_sub(1)),
            other => other,
        };

        info!(
            "Removed song {} at index {} (current {:?})",
            id, index, self.current_index
        );
        Ok(QueueDelta::Removed {
            id,
            index,
            was_current,
            current_index: self.current_index,
        })
    }

    /// Move the song at `old_index` to `new_index`.
    ///
    /// `new_index` past the end is clamped to the last slot.
    ///
    /// # Errors
    ///
    /// Returns [`QueueError::IndexOutOfRange`] if `old_index` is not a valid index.
    pub fn reorder(
        &mut self,
        old_index: usize,
        new_index: usize,
    ) -> std::result::Result<QueueDelta, QueueError> {
        let len = self.songs.len();
        if old_index >= len {
            return Err(QueueError::IndexOutOfRange {
                index: old_index,
                len,
            });
        }
        let new_index = new_index.min(len - 1);

        let song = self.songs.remove(old_index);
        self.songs.insert(new_index, song);

        self.current_index = self.current_index.map(|current| {
            if current == old_index {
                new_index
            } else if old_index < current && new_index >= current {
                current - 1
            } else if old_index > current && new_index <= current {
                current + 1
            } else {
                current
            }
        });

        debug!(
            "Moved song from {} to {} (current {:?})",
            old_index, new_index, self.current_index
        );
        Ok(QueueDelta::Moved {
            from: old_index,
            to: new_index,
            current_index: self.current_index,
        })
    }

    /// Set the current index.
    ///
    /// # Errors
    ///
    /// Returns [`QueueError::EmptyQueue`] on an empty queue and
    /// [`QueueError::IndexOutOfRange`] for an invalid index.
    pub fn select(&mut self, index: usize) -> std::result::Result<QueueDelta, QueueError> {
        if self.songs.is_empty() {
            return Err(QueueError::EmptyQueue);
        }
        if index >= self.songs.len() {
            return Err(QueueError::IndexOutOfRange {
                index,
                len: self.songs.len(),
            });
        }

        self.current_index = Some(index);
        Ok(QueueDelta::CurrentChanged { index })
    }

    /// Remove every song. Ids are not reused afterwards.
    pub fn clear(&mut self) -> QueueDelta {
        let removed = self.songs.len();
        self.songs.clear();
        self.current_index = None;
        info!("Cleared {} songs from queue", removed);
        QueueDelta::Cleared
    }

    /// Copy the queue for observers.
    #[must_use]
    pub fn snapshot(&self) -> QueueSnapshot {
        QueueSnapshot {
            songs: self.songs.clone(),
            current_index: self.current_index,
        }
    }
}
