//! `Mixtape` Core Library
//!
//! This crate provides the orchestration engine of the `Mixtape` player:
//! - Source resolution for `YouTube`, SoundCloud, Vimeo, Bandcamp and local files
//! - The play queue and its reordering rules
//! - The playback state machine
//! - The background download queue
//! - Application configuration management
//!
//! All mutable state lives in one coordination task, driven through an
//! [`OrchestratorHandle`]:
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use mixtape_core::{
//!     AppConfig, Collaborators, Orchestrator, PlayerTarget, SourceKind, SourceRef,
//!     sinks::Player,
//! };
//!
//! struct Speaker;
//!
//! impl Player for Speaker {
//!     fn apply(&self, target: &PlayerTarget) {
//!         println!("{:?} {:?}", target.status, target.stream_url);
//!     }
//! }
//!
//! # async fn run() -> mixtape_core::Result<()> {
//! let config = AppConfig::load()?;
//! let engine = Orchestrator::spawn(&config, Collaborators::new(&config, Arc::new(Speaker)));
//! engine
//!     .play_now(SourceRef::new(SourceKind::YoutubeVideo, "FZ8BxMU3BYc", "Artist - Song"))
//!     .await?;
//! # Ok(())
//! # }
//! ```
//!
//! # Error Handling
//!
//! Typed errors per domain are collected in the [`error`] module.

pub mod config;
pub mod download;
pub mod error;
pub mod orchestrator;
pub mod playback;
pub mod queue;
pub mod resolver;
pub mod sinks;
pub mod source;

pub use config::{
    AppConfig, DEFAULT_AUDIO_EXTENSION, DEFAULT_PROGRESS_UPDATE_INTERVAL, DownloadSettings,
    FormatPolicy, ScrobbleSettings, SoundCloudSettings, default_download_directory,
};
pub use download::{
    ByteSource, DownloadJob, DownloadQueue, DownloadStats, DownloadStatus, FileSink, FsFileSink,
    HttpByteSource, JobId, Tally, Transfer, TransferUpdate, run_transfer, sanitize_filename,
};
pub use error::{
    Error, ErrorKind, FormatUnavailableError, QueueError, ResolutionError, Result, TransferError,
};
pub use orchestrator::{
    Collaborators, EVENT_CHANNEL_CAPACITY, EngineEvent, EngineSnapshot, Orchestrator,
    OrchestratorHandle,
};
pub use playback::{
    PlaybackController, PlaybackEffect, PlaybackState, PlaybackStatus, PlayerTarget, Transition,
};
pub use queue::{PlayQueue, QueueDelta, QueueSnapshot};
pub use resolver::{
    CollectionSource, MAX_EXPANSION_DEPTH, ResolvedEntry, SourceAdapter, SourceResolver,
    StreamSource, select_format,
};
pub use sinks::{
    NotificationSink, Player, ScrobbleError, ScrobbleSink, TrackInfo, TracingNotifier,
    TracingScrobbler,
};
pub use source::{ResolvedStream, Song, SongId, SourceKind, SourceRef, StreamCandidate};
