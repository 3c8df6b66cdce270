//! Error types for Mixtape core operations.
//!
//! Errors are grouped by the part of the engine that raises them. Resolution,
//! format and transfer failures are user visible and get reported through the
//! notification sink; range errors point at a caller bug and are only logged.

use std::path::PathBuf;

use thiserror::Error;

use crate::download::JobId;
use crate::source::{SongId, SourceKind};

/// Result type alias using the crate's Error type.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur in Mixtape core operations.
#[derive(Debug, Error)]
pub enum Error {
    /// A source reference could not be turned into songs.
    #[error("Resolution failed: {0}")]
    Resolution(#[from] ResolutionError),

    /// No stream of a resolved source matches the required format.
    #[error(transparent)]
    FormatUnavailable(#[from] FormatUnavailableError),

    /// A download transfer failed.
    #[error("Transfer failed: {0}")]
    Transfer(#[from] TransferError),

    /// An index or song handed to the play queue does not exist.
    #[error("Queue error: {0}")]
    Queue(#[from] QueueError),

    /// No download job with this id.
    #[error("Download job not found: {0}")]
    DownloadNotFound(JobId),

    /// Configuration error.
    #[error("Configuration error: {0}")]
    Configuration(String),

    /// The coordination task has shut down.
    #[error("Orchestrator is not running")]
    EngineStopped,

    /// IO error wrapper.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Serialization error.
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// Flat error category for programmatic handling.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// Bad or missing source data.
    Resolution,
    /// Required stream format missing.
    FormatUnavailable,
    /// Download stream failure.
    Transfer,
    /// Queue index or identity out of range.
    Range,
    /// Invalid configuration.
    Configuration,
    /// Engine task gone.
    EngineStopped,
    /// Filesystem failure.
    Io,
    /// JSON (de)serialization failure.
    Serialization,
}

impl Error {
    /// Get the category of this error.
    #[must_use]
    pub const fn kind(&self) -> ErrorKind {
        match self {
            Self::Resolution(_) => ErrorKind::Resolution,
            Self::FormatUnavailable(_) => ErrorKind::FormatUnavailable,
            Self::Transfer(_) => ErrorKind::Transfer,
            Self::Queue(_) | Self::DownloadNotFound(_) => ErrorKind::Range,
            Self::Configuration(_) => ErrorKind::Configuration,
            Self::EngineStopped => ErrorKind::EngineStopped,
            Self::Io(_) => ErrorKind::Io,
            Self::Serialization(_) => ErrorKind::Serialization,
        }
    }

    /// Whether the error should be shown to the user through the notification sink.
    #[must_use]
    pub const fn is_user_visible(&self) -> bool {
        matches!(
            self.kind(),
            ErrorKind::Resolution | ErrorKind::FormatUnavailable | ErrorKind::Transfer
        )
    }
}

/// Errors raised while resolving a source reference.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ResolutionError {
    /// No adapter is registered for this source kind.
    #[error("No adapter registered for {kind}")]
    UnsupportedKind {
        /// The kind that has no adapter.
        kind: SourceKind,
    },

    /// The remote service could not be reached or refused the request.
    #[error("Failed to fetch {id}: {reason}")]
    FetchFailed {
        /// Source identifier.
        id: String,
        /// Underlying reason.
        reason: String,
    },

    /// The remote service answered with data that could not be understood.
    #[error("Invalid data for {id}: {reason}")]
    InvalidData {
        /// Source identifier.
        id: String,
        /// What was wrong with the data.
        reason: String,
    },

    /// The source kind cannot be downloaded as a single file.
    #[error("{kind} sources cannot be downloaded")]
    NotDownloadable {
        /// The offending kind.
        kind: SourceKind,
    },
}

impl ResolutionError {
    /// Shorthand for a fetch failure.
    pub fn fetch(id: impl Into<String>, reason: impl std::fmt::Display) -> Self {
        Self::FetchFailed {
            id: id.into(),
            reason: reason.to_string(),
        }
    }

    /// Shorthand for an invalid data failure.
    pub fn invalid(id: impl Into<String>, reason: impl std::fmt::Display) -> Self {
        Self::InvalidData {
            id: id.into(),
            reason: reason.to_string(),
        }
    }
}

/// No candidate stream matched the required format id.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
#[error("No stream for {source_id} in required format '{required}' (offered: [{}])", .offered.join(", "))]
pub struct FormatUnavailableError {
    /// Source identifier.
    pub source_id: String,
    /// The format id that was required.
    pub required: String,
    /// The format ids the source offered instead.
    pub offered: Vec<String>,
}

/// Errors raised by a download transfer.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum TransferError {
    /// The byte stream could not be opened.
    #[error("Failed to open stream for '{title}': {reason}")]
    OpenFailed {
        /// Job title.
        title: String,
        /// Underlying reason.
        reason: String,
    },

    /// The byte stream broke while reading.
    #[error("Stream interrupted: {reason}")]
    StreamFailed {
        /// Underlying reason.
        reason: String,
    },

    /// The output file could not be created.
    #[error("Failed to create {path}: {reason}")]
    SinkFailed {
        /// Output path.
        path: PathBuf,
        /// Underlying reason.
        reason: String,
    },

    /// Writing to the output file failed.
    #[error("Failed to write {path}: {reason}")]
    WriteFailed {
        /// Output path.
        path: PathBuf,
        /// Underlying reason.
        reason: String,
    },
}

/// Errors raised by play queue operations.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum QueueError {
    /// Index outside `0..len`.
    #[error("Index {index} out of range for queue of length {len}")]
    IndexOutOfRange {
        /// The offending index.
        index: usize,
        /// Queue length at the time of the call.
        len: usize,
    },

    /// No song with this id in the queue.
    #[error("Song {0} is not in the queue")]
    SongNotFound(SongId),

    /// The operation needs at least one song.
    #[error("Queue is empty")]
    EmptyQueue,
}
