//! The coordination task.
//!
//! One spawned task owns the [`PlayQueue`], the [`PlaybackController`] and the
//! [`DownloadQueue`]. Callers talk to it through an [`OrchestratorHandle`]
//! (an `mpsc` command channel with `oneshot` replies), and observers receive
//! [`EngineEvent`]s over a `broadcast` channel.
//!
//! Everything that can block runs in its own task and reports back over an
//! internal channel: collection listing, per-song stream resolution, download
//! transfers and scrobble calls. Their results are applied one at a time by
//! the coordination task, so appends, removals and moves never interleave.

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tokio::sync::{broadcast, mpsc, oneshot};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use crate::config::{AppConfig, DownloadSettings};
use crate::download::{
    ByteSource, DownloadJob, DownloadQueue, DownloadStats, FileSink, FsFileSink, HttpByteSource,
    JobId, TransferUpdate, run_transfer, sanitize_filename,
};
use crate::error::{Error, Result};
use crate::playback::{PlaybackController, PlaybackEffect, PlaybackState, Transition};
use crate::queue::{PlayQueue, QueueDelta, QueueSnapshot};
use crate::resolver::{SourceResolver, USER_AGENT};
use crate::sinks::{NotificationSink, Player, ScrobbleSink, TrackInfo, TracingNotifier, TracingScrobbler};
use crate::source::{ResolvedStream, Song, SongId, SourceRef};

/// Capacity of the event broadcast channel.
pub const EVENT_CHANNEL_CAPACITY: usize = 256;

/// Something observers may want to react to.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", content = "data")]
pub enum EngineEvent {
    /// The play queue changed.
    Queue(QueueDelta),
    /// The playback state changed.
    Playback(PlaybackState),
    /// A download job was added or changed.
    Download(DownloadJob),
    /// A download job was removed.
    DownloadRemoved(JobId),
    /// A reference could not be added to the queue.
    ResolutionFailed {
        /// The reference.
        source: SourceRef,
        /// Why.
        reason: String,
    },
}

/// Everything observers need to render the session.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EngineSnapshot {
    /// Play queue.
    pub queue: QueueSnapshot,
    /// Playback state.
    pub playback: PlaybackState,
    /// Download jobs.
    pub downloads: Vec<DownloadJob>,
    /// Download counts.
    pub download_stats: DownloadStats,
}

/// The external collaborators the orchestrator drives.
#[derive(Clone)]
pub struct Collaborators {
    /// Source resolution.
    pub resolver: SourceResolver,
    /// Audio engine.
    pub player: Arc<dyn Player>,
    /// User notifications.
    pub notifier: Arc<dyn NotificationSink>,
    /// Listening history.
    pub scrobbler: Arc<dyn ScrobbleSink>,
    /// Download byte streams.
    pub byte_source: Arc<dyn ByteSource>,
    /// Download output.
    pub file_sink: Arc<dyn FileSink>,
}

impl Collaborators {
    /// Network adapters, HTTP downloads to disk, log-only notifier and scrobbler.
    #[must_use]
    pub fn new(config: &AppConfig, player: Arc<dyn Player>) -> Self {
        let resolver = SourceResolver::with_default_adapters(config);
        let client = reqwest::Client::builder()
            .user_agent(USER_AGENT)
            .build()
            .unwrap_or_else(|e| {
                warn!("Falling back to default HTTP client: {}", e);
                reqwest::Client::new()
            });

        Self {
            byte_source: Arc::new(HttpByteSource::new(client, resolver.clone())),
            resolver,
            player,
            notifier: Arc::new(TracingNotifier),
            scrobbler: Arc::new(TracingScrobbler),
            file_sink: Arc::new(FsFileSink),
        }
    }

    /// Replace the notification sink.
    #[must_use]
    pub fn with_notifier(mut self, notifier: Arc<dyn NotificationSink>) -> Self {
        self.notifier = notifier;
        self
    }

    /// Replace the scrobble sink.
    #[must_use]
    pub fn with_scrobbler(mut self, scrobbler: Arc<dyn ScrobbleSink>) -> Self {
        self.scrobbler = scrobbler;
        self
    }

    /// Replace the download byte source.
    #[must_use]
    pub fn with_byte_source(mut self, byte_source: Arc<dyn ByteSource>) -> Self {
        self.byte_source = byte_source;
        self
    }

    /// Replace the download file sink.
    #[must_use]
    pub fn with_file_sink(mut self, file_sink: Arc<dyn FileSink>) -> Self {
        self.file_sink = file_sink;
        self
    }
}

impl std::fmt::Debug for Collaborators {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Collaborators")
            .field("resolver", &self.resolver)
            .finish_non_exhaustive()
    }
}

type Reply<T> = oneshot::Sender<Result<T>>;

enum Command {
    AddToQueue {
        source: SourceRef,
        play_now: bool,
        clear_first: bool,
        reply: Reply<Vec<SongId>>,
    },
    Remove {
        id: SongId,
        reply: Reply<()>,
    },
    Reorder {
        old_index: usize,
        new_index: usize,
        reply: Reply<()>,
    },
    Clear {
        reply: Reply<()>,
    },
    Play {
        index: usize,
        reply: Reply<()>,
    },
    Toggle {
        reply: Reply<()>,
    },
    Seek {
        percent: f64,
        reply: Reply<()>,
    },
    Next {
        reply: Reply<()>,
    },
    Prev {
        reply: Reply<()>,
    },
    PlayerLoading {
        loaded: bool,
    },
    PlayerProgress {
        position: f64,
        duration: f64,
    },
    PlayerFinished,
    AddDownload {
        song: Song,
        reply: Reply<JobId>,
    },
    StartDownloads {
        reply: Reply<usize>,
    },
    RemoveDownload {
        id: JobId,
        reply: Reply<DownloadJob>,
    },
    ClearFinishedDownloads {
        reply: Reply<usize>,
    },
    Snapshot {
        reply: Reply<EngineSnapshot>,
    },
    Shutdown {
        reply: oneshot::Sender<()>,
    },
}

/// Results of spawned work, applied by the coordination task.
enum Internal {
    Expanded {
        source: SourceRef,
        play_now: bool,
        result: Result<Vec<SourceRef>>,
        reply: Reply<Vec<SongId>>,
    },
    StreamResolved {
        id: SongId,
        result: Result<ResolvedStream>,
    },
    Transfer(TransferUpdate),
}

/// Cloneable handle to a running orchestrator.
#[derive(Debug, Clone)]
pub struct OrchestratorHandle {
    commands: mpsc::UnboundedSender<Command>,
    events: broadcast::Sender<EngineEvent>,
}

impl OrchestratorHandle {
    async fn request<T>(&self, make: impl FnOnce(Reply<T>) -> Command) -> Result<T> {
        let (reply, response) = oneshot::channel();
        self.commands
            .send(make(reply))
            .map_err(|_| Error::EngineStopped)?;
        response.await.map_err(|_| Error::EngineStopped)?
    }

    fn notify(&self, command: Command) -> Result<()> {
        self.commands.send(command).map_err(|_| Error::EngineStopped)
    }

    /// Add a reference to the end of the queue.
    ///
    /// Returns once collections have been listed and placeholders appended,
    /// with the new song ids in source order. Streams resolve in the
    /// background; with `play_now` the first new song starts as soon as its
    /// stream is ready.
    ///
    /// # Errors
    ///
    /// Returns the resolution error if the reference could not be expanded.
    pub async fn add_to_queue(&self, source: SourceRef, play_now: bool) -> Result<Vec<SongId>> {
        self.request(|reply| Command::AddToQueue {
            source,
            play_now,
            clear_first: false,
            reply,
        })
        .await
    }

    /// Replace the queue with a reference and play it.
    ///
    /// # Errors
    ///
    /// Returns the resolution error if the reference could not be expanded.
    pub async fn play_now(&self, source: SourceRef) -> Result<Vec<SongId>> {
        self.request(|reply| Command::AddToQueue {
            source,
            play_now: true,
            clear_first: true,
            reply,
        })
        .await
    }

    /// Remove a song from the queue.
    ///
    /// # Errors
    ///
    /// Returns a queue error if the song is not in the queue.
    pub async fn remove(&self, id: SongId) -> Result<()> {
        self.request(|reply| Command::Remove { id, reply }).await
    }

    /// Move a song within the queue.
    ///
    /// # Errors
    ///
    /// Returns a queue error if `old_index` is out of range.
    pub async fn reorder(&self, old_index: usize, new_index: usize) -> Result<()> {
        self.request(|reply| Command::Reorder {
            old_index,
            new_index,
            reply,
        })
        .await
    }

    /// Empty the queue and reset playback.
    ///
    /// # Errors
    ///
    /// Returns [`Error::EngineStopped`] if the orchestrator is gone.
    pub async fn clear(&self) -> Result<()> {
        self.request(|reply| Command::Clear { reply }).await
    }

    /// Play the song at an index.
    ///
    /// # Errors
    ///
    /// Returns a queue error if the index is out of range.
    pub async fn play(&self, index: usize) -> Result<()> {
        self.request(|reply| Command::Play { index, reply }).await
    }

    /// Switch between playing and stopped.
    ///
    /// # Errors
    ///
    /// Returns [`Error::EngineStopped`] if the orchestrator is gone.
    pub async fn toggle(&self) -> Result<()> {
        self.request(|reply| Command::Toggle { reply }).await
    }

    /// Seek to a fraction (0.0 - 1.0) of the current song.
    ///
    /// # Errors
    ///
    /// Returns [`Error::EngineStopped`] if the orchestrator is gone.
    pub async fn seek(&self, percent: f64) -> Result<()> {
        self.request(|reply| Command::Seek { percent, reply }).await
    }

    /// Play the next song, if any.
    ///
    /// # Errors
    ///
    /// Returns [`Error::EngineStopped`] if the orchestrator is gone.
    pub async fn next(&self) -> Result<()> {
        self.request(|reply| Command::Next { reply }).await
    }

    /// Play the previous song, if any.
    ///
    /// # Errors
    ///
    /// Returns [`Error::EngineStopped`] if the orchestrator is gone.
    pub async fn prev(&self) -> Result<()> {
        self.request(|reply| Command::Prev { reply }).await
    }

    /// Player callback: buffering started (`loaded == false`) or ended.
    ///
    /// # Errors
    ///
    /// Returns [`Error::EngineStopped`] if the orchestrator is gone.
    pub fn player_loading(&self, loaded: bool) -> Result<()> {
        self.notify(Command::PlayerLoading { loaded })
    }

    /// Player callback: position update, in seconds.
    ///
    /// # Errors
    ///
    /// Returns [`Error::EngineStopped`] if the orchestrator is gone.
    pub fn player_progress(&self, position: f64, duration: f64) -> Result<()> {
        self.notify(Command::PlayerProgress { position, duration })
    }

    /// Player callback: the current song ended.
    ///
    /// # Errors
    ///
    /// Returns [`Error::EngineStopped`] if the orchestrator is gone.
    pub fn player_finished(&self) -> Result<()> {
        self.notify(Command::PlayerFinished)
    }

    /// Queue a download of a song. It does not start until [`Self::start_downloads`].
    ///
    /// # Errors
    ///
    /// Returns [`Error::EngineStopped`] if the orchestrator is gone.
    pub async fn add_download(&self, song: Song) -> Result<JobId> {
        self.request(|reply| Command::AddDownload { song, reply })
            .await
    }

    /// Start every queued download. Returns how many were started.
    ///
    /// # Errors
    ///
    /// Returns [`Error::EngineStopped`] if the orchestrator is gone.
    pub async fn start_downloads(&self) -> Result<usize> {
        self.request(|reply| Command::StartDownloads { reply })
            .await
    }

    /// Remove a download job, aborting its transfer if it is running.
    ///
    /// # Errors
    ///
    /// Returns [`Error::DownloadNotFound`] for an unknown id.
    pub async fn remove_download(&self, id: JobId) -> Result<DownloadJob> {
        self.request(|reply| Command::RemoveDownload { id, reply })
            .await
    }

    /// Drop finished and failed jobs. Returns how many were removed.
    ///
    /// # Errors
    ///
    /// Returns [`Error::EngineStopped`] if the orchestrator is gone.
    pub async fn clear_finished_downloads(&self) -> Result<usize> {
        self.request(|reply| Command::ClearFinishedDownloads { reply })
            .await
    }

    /// Copy the current state.
    ///
    /// # Errors
    ///
    /// Returns [`Error::EngineStopped`] if the orchestrator is gone.
    pub async fn snapshot(&self) -> Result<EngineSnapshot> {
        self.request(|reply| Command::Snapshot { reply }).await
    }

    /// Current download jobs.
    ///
    /// # Errors
    ///
    /// Returns [`Error::EngineStopped`] if the orchestrator is gone.
    pub async fn downloads(&self) -> Result<Vec<DownloadJob>> {
        Ok(self.snapshot().await?.downloads)
    }

    /// Receive engine events from now on.
    #[must_use]
    pub fn subscribe(&self) -> broadcast::Receiver<EngineEvent> {
        self.events.subscribe()
    }

    /// Stop the orchestrator, aborting running transfers.
    ///
    /// # Errors
    ///
    /// Returns [`Error::EngineStopped`] if it was already gone.
    pub async fn shutdown(&self) -> Result<()> {
        let (reply, done) = oneshot::channel();
        self.notify(Command::Shutdown { reply })?;
        done.await.map_err(|_| Error::EngineStopped)
    }
}

struct RunningTransfer {
    handle: JoinHandle<()>,
    path: PathBuf,
}

/// The coordination task state.
pub struct Orchestrator {
    settings: DownloadSettings,
    scrobble_token: Option<String>,
    collaborators: Collaborators,
    queue: PlayQueue,
    playback: PlaybackController,
    downloads: DownloadQueue,
    transfers: HashMap<JobId, RunningTransfer>,
    internal: mpsc::UnboundedSender<Internal>,
    events: broadcast::Sender<EngineEvent>,
}

impl Orchestrator {
    /// Spawn the coordination task on the current tokio runtime.
    #[must_use]
    pub fn spawn(config: &AppConfig, collaborators: Collaborators) -> OrchestratorHandle {
        let (command_tx, command_rx) = mpsc::unbounded_channel();
        let (internal_tx, internal_rx) = mpsc::unbounded_channel();
        let (events, _) = broadcast::channel(EVENT_CHANNEL_CAPACITY);

        let mut settings = config.downloads.clone();
        settings.validate();

        let orchestrator = Self {
            settings,
            scrobble_token: config.scrobble.session_token.clone(),
            collaborators,
            queue: PlayQueue::new(),
            playback: PlaybackController::new(),
            downloads: DownloadQueue::new(),
            transfers: HashMap::new(),
            internal: internal_tx,
            events: events.clone(),
        };

        tokio::spawn(orchestrator.run(command_rx, internal_rx));

        OrchestratorHandle {
            commands: command_tx,
            events,
        }
    }

    async fn run(
        mut self,
        mut commands: mpsc::UnboundedReceiver<Command>,
        mut internal: mpsc::UnboundedReceiver<Internal>,
    ) {
        info!("Orchestrator started");

        loop {
            tokio::select! {
                Some(message) = internal.recv() => self.handle_internal(message),
                command = commands.recv() => match command {
                    Some(Command::Shutdown { reply }) => {
                        self.abort_transfers();
                        let _ = reply.send(());
                        break;
                    }
                    Some(command) => self.handle_command(command),
                    None => {
                        debug!("All handles dropped");
                        self.abort_transfers();
                        break;
                    }
                },
            }
        }

        info!("Orchestrator stopped");
    }

    fn emit(&self, event: EngineEvent) {
        // No subscribers is fine.
        let _ = self.events.send(event);
    }

    fn handle_command(&mut self, command: Command) {
        match command {
            Command::AddToQueue {
                source,
                play_now,
                clear_first,
                reply,
            } => {
                if clear_first {
                    self.clear_queue();
                }
                self.spawn_expansion(source, play_now, reply);
            }
            Command::Remove { id, reply } => {
                let _ = reply.send(self.remove_song(id));
            }
            Command::Reorder {
                old_index,
                new_index,
                reply,
            } => {
                let result = self.queue.reorder(old_index, new_index).map_err(Error::from);
                if let Ok(delta) = &result {
                    self.emit(EngineEvent::Queue(delta.clone()));
                }
                let _ = reply.send(result.map(|_| ()));
            }
            Command::Clear { reply } => {
                self.clear_queue();
                let _ = reply.send(Ok(()));
            }
            Command::Play { index, reply } => {
                let _ = reply.send(self.play_index(index));
            }
            Command::Toggle { reply } => {
                let transition = self.playback.toggle(&self.queue);
                self.apply_transition(transition);
                let _ = reply.send(Ok(()));
            }
            Command::Seek { percent, reply } => {
                let transition = self.playback.seek(percent);
                self.apply_transition(transition);
                let _ = reply.send(Ok(()));
            }
            Command::Next { reply } => {
                let result = PlaybackController::next_index(&self.queue)
                    .map_or(Ok(()), |index| self.play_index(index));
                let _ = reply.send(result);
            }
            Command::Prev { reply } => {
                let result = PlaybackController::prev_index(&self.queue)
                    .map_or(Ok(()), |index| self.play_index(index));
                let _ = reply.send(result);
            }
            Command::PlayerLoading { loaded } => {
                self.playback.on_loading_progress(loaded);
                self.emit(EngineEvent::Playback(self.playback.state().clone()));
            }
            Command::PlayerProgress { position, duration } => {
                self.playback.on_progress(position, duration);
                self.emit(EngineEvent::Playback(self.playback.state().clone()));
            }
            Command::PlayerFinished => {
                let transition = self.playback.on_track_finished(&self.queue);
                self.apply_transition(transition);
            }
            Command::AddDownload { song, reply } => {
                let job = self.downloads.add(&song).clone();
                self.collaborators
                    .notifier
                    .success(&format!("Song \"{}\" added to downloads.", job.title));
                let id = job.id;
                self.emit(EngineEvent::Download(job));
                let _ = reply.send(Ok(id));
            }
            Command::StartDownloads { reply } => {
                let started = self.start_downloads();
                let _ = reply.send(Ok(started));
            }
            Command::RemoveDownload { id, reply } => {
                let _ = reply.send(self.remove_download(id));
            }
            Command::ClearFinishedDownloads { reply } => {
                let removed = self.downloads.clear_finished();
                let _ = reply.send(Ok(removed));
            }
            Command::Snapshot { reply } => {
                let _ = reply.send(Ok(self.snapshot()));
            }
            // Handled by the run loop.
            Command::Shutdown { reply } => {
                let _ = reply.send(());
            }
        }
    }

    fn handle_internal(&mut self, message: Internal) {
        match message {
            Internal::Expanded {
                source,
                play_now,
                result,
                reply,
            } => {
                let _ = reply.send(self.append_expanded(&source, play_now, result));
            }
            Internal::StreamResolved { id, result } => self.apply_stream(id, result),
            Internal::Transfer(update) => self.apply_transfer_update(update),
        }
    }

    fn snapshot(&self) -> EngineSnapshot {
        EngineSnapshot {
            queue: self.queue.snapshot(),
            playback: self.playback.state().clone(),
            downloads: self.downloads.jobs().to_vec(),
            download_stats: self.downloads.stats(),
        }
    }

    fn spawn_expansion(&self, source: SourceRef, play_now: bool, reply: Reply<Vec<SongId>>) {
        let resolver = self.collaborators.resolver.clone();
        let internal = self.internal.clone();

        debug!("Expanding {} '{}'", source.kind, source.title);
        tokio::spawn(async move {
            let result = resolver.expand(&source).await;
            let _ = internal.send(Internal::Expanded {
                source,
                play_now,
                result,
                reply,
            });
        });
    }

    fn append_expanded(
        &mut self,
        source: &SourceRef,
        play_now: bool,
        result: Result<Vec<SourceRef>>,
    ) -> Result<Vec<SongId>> {
        let leaves = match result {
            Ok(leaves) => leaves,
            Err(e) => {
                error!("Failed to add '{}': {}", source.title, e);
                if e.is_user_visible() {
                    self.collaborators.notifier.error(&format!(
                        "Could not add {} {}. {}",
                        source.kind, source.title, e
                    ));
                }
                self.emit(EngineEvent::ResolutionFailed {
                    source: source.clone(),
                    reason: e.to_string(),
                });
                return Err(e);
            }
        };

        if leaves.is_empty() {
            self.collaborators
                .notifier
                .info(&format!("{} has no songs to add.", source.title));
            return Ok(Vec::new());
        }

        let delta = self.queue.append(leaves.clone());
        let QueueDelta::Appended { ids, start } = &delta else {
            return Ok(Vec::new());
        };
        let (ids, start) = (ids.clone(), *start);
        self.emit(EngineEvent::Queue(delta));

        for (id, leaf) in ids.iter().copied().zip(leaves) {
            self.spawn_stream_resolution(id, leaf);
        }

        if play_now && let Err(e) = self.play_index(start) {
            warn!("Could not start playback of added songs: {}", e);
        }

        Ok(ids)
    }

    fn spawn_stream_resolution(&self, id: SongId, leaf: SourceRef) {
        let resolver = self.collaborators.resolver.clone();
        let internal = self.internal.clone();

        tokio::spawn(async move {
            let result = resolver.resolve_stream(&leaf).await;
            let _ = internal.send(Internal::StreamResolved { id, result });
        });
    }

    fn apply_stream(&mut self, id: SongId, result: Result<ResolvedStream>) {
        let (result, failure) = match result {
            Ok(stream) => (Ok(stream), None),
            Err(e) => (Err(e.to_string()), Some(e)),
        };
        let Some(delta) = self.queue.apply_stream(id, result) else {
            return;
        };
        self.emit(EngineEvent::Queue(delta));

        let transition = match failure {
            None => self.playback.on_stream_ready(&self.queue, id),
            Some(e) => {
                let transition = self.playback.on_stream_failed(&self.queue, id);
                if let Some(song) = self.queue.song(id) {
                    if !e.is_user_visible() {
                        warn!("Stream of '{}' unavailable: {}", song.title, e);
                    } else if transition.effects.is_empty() {
                        // A stopped pending start already reports the failure.
                        self.collaborators
                            .notifier
                            .error(&format!("Could not load {}. {}", song.title, e));
                    }
                }
                transition
            }
        };
        self.apply_transition(transition);
    }

    fn remove_song(&mut self, id: SongId) -> Result<()> {
        let delta = self.queue.remove(id)?;
        let was_current = matches!(delta, QueueDelta::Removed { was_current: true, .. });
        self.emit(EngineEvent::Queue(delta));

        if was_current {
            let transition = self.playback.on_current_removed();
            self.apply_transition(transition);
        }
        Ok(())
    }

    fn clear_queue(&mut self) {
        let delta = self.queue.clear();
        self.emit(EngineEvent::Queue(delta));
        let transition = self.playback.reset();
        self.apply_transition(transition);
    }

    fn play_index(&mut self, index: usize) -> Result<()> {
        let delta = self.queue.select(index)?;
        self.emit(EngineEvent::Queue(delta));
        let transition = self.playback.play(&self.queue);
        self.apply_transition(transition);
        Ok(())
    }

    fn apply_transition(&mut self, mut transition: Transition) {
        if let Some(index) = transition.advance_to.take() {
            match self.queue.select(index) {
                Ok(delta) => {
                    self.emit(EngineEvent::Queue(delta));
                    let next = self.playback.play(&self.queue);
                    transition.merge(next);
                }
                Err(e) => warn!("Cannot advance to index {}: {}", index, e),
            }
        }

        if let Some(target) = &transition.target {
            self.collaborators.player.apply(target);
        }

        for effect in transition.effects {
            match effect {
                PlaybackEffect::NowPlaying { title } => self.spawn_scrobble(title, true),
                PlaybackEffect::Scrobble { title } => self.spawn_scrobble(title, false),
                PlaybackEffect::Unplayable { title, reason } => {
                    self.collaborators
                        .notifier
                        .error(&format!("Could not play {title}. {reason}"));
                }
            }
        }

        self.emit(EngineEvent::Playback(self.playback.state().clone()));
    }

    fn spawn_scrobble(&self, title: String, now_playing: bool) {
        let Some(token) = self.scrobble_token.clone() else {
            debug!("Scrobbling disabled, skipping '{}'", title);
            return;
        };
        let scrobbler = Arc::clone(&self.collaborators.scrobbler);

        tokio::spawn(async move {
            let info = TrackInfo::from_title(&title);
            let result = if now_playing {
                scrobbler
                    .update_now_playing(&token, &info.artist, &info.track)
                    .await
            } else {
                scrobbler.scrobble(&token, &info.artist, &info.track).await
            };

            if let Err(e) = result {
                warn!("Ignoring scrobble failure for '{}': {}", title, e);
            }
        });
    }

    fn start_downloads(&mut self) -> usize {
        let started = self.downloads.start_all();
        let count = started.len();

        for job in started {
            let id = job.id;
            let path = self.output_path_for(&job);
            let internal = self.internal.clone();
            let report = move |update| {
                let _ = internal.send(Internal::Transfer(update));
            };

            self.emit(EngineEvent::Download(job.clone()));
            let handle = tokio::spawn(run_transfer(
                job,
                path.clone(),
                Arc::clone(&self.collaborators.byte_source),
                Arc::clone(&self.collaborators.file_sink),
                self.settings.progress_update_interval,
                report,
            ));
            self.transfers.insert(id, RunningTransfer { handle, path });
        }

        count
    }

    /// Output path of a job, suffixed with its id when a running transfer
    /// already writes to the plain one.
    fn output_path_for(&self, job: &DownloadJob) -> PathBuf {
        let stem = sanitize_filename(&job.title);
        let path = self.settings.output_path(&stem);
        let occupied = self
            .transfers
            .values()
            .any(|transfer| transfer.path == path);
        if occupied {
            debug!("{} is in use, suffixing job {}", path.display(), job.id);
            self.settings.output_path(&format!("{stem} ({})", job.id))
        } else {
            path
        }
    }

    fn apply_transfer_update(&mut self, update: TransferUpdate) {
        let id = update.job_id();
        let job = match update {
            TransferUpdate::Opened { total_length, .. } => {
                self.downloads.set_total_length(id, total_length);
                self.downloads.get(id)
            }
            TransferUpdate::Progress { tally, .. } => self.downloads.record_progress(id, tally),
            TransferUpdate::Finished { tally, .. } => {
                self.transfers.remove(&id);
                let job = self.downloads.finish(id, tally);
                if let Some(job) = job {
                    self.collaborators
                        .notifier
                        .success(&format!("Song \"{}\" downloaded.", job.title));
                }
                job
            }
            TransferUpdate::Failed { tally, error, .. } => {
                self.transfers.remove(&id);
                let job = self.downloads.fail(id, tally, error.to_string());
                if let Some(job) = job {
                    self.collaborators.notifier.error(&format!(
                        "Download of \"{}\" failed. {}",
                        job.title, error
                    ));
                }
                job
            }
        };

        if let Some(job) = job.cloned() {
            self.emit(EngineEvent::Download(job));
        }
    }

    fn remove_download(&mut self, id: JobId) -> Result<DownloadJob> {
        let job = self.downloads.remove(id).ok_or(Error::DownloadNotFound(id))?;

        if let Some(transfer) = self.transfers.remove(&id) {
            transfer.handle.abort();
            info!("Aborted transfer of download job {}", id);

            if self.settings.delete_partial_on_abort {
                let sink = Arc::clone(&self.collaborators.file_sink);
                tokio::spawn(async move {
                    // Let the aborted task drop its file handle first.
                    let _ = transfer.handle.await;
                    if let Err(e) = sink.discard(&transfer.path).await {
                        warn!("Failed to delete partial download: {}", e);
                    }
                });
            }
        }

        self.emit(EngineEvent::DownloadRemoved(id));
        Ok(job)
    }

    fn abort_transfers(&mut self) {
        for (id, transfer) in self.transfers.drain() {
            debug!("Aborting transfer of download job {}", id);
            transfer.handle.abort();
        }
    }
}

impl std::fmt::Debug for Orchestrator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Orchestrator")
            .field("queue_len", &self.queue.len())
            .field("playback", &self.playback.status())
            .field("downloads", &self.downloads.jobs().len())
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use std::time::Duration;

    use tokio::sync::mpsc::{UnboundedReceiver, unbounded_channel};

    use super::*;
    use crate::config::FormatPolicy;
    use crate::resolver::MockStreamSource;
    use crate::sinks::{MockNotificationSink, MockPlayer, MockScrobbleSink};
    use crate::source::{SourceKind, StreamCandidate};

    fn any_player() -> MockPlayer {
        let mut player = MockPlayer::new();
        player.expect_apply().returning(|_| ());
        player
    }

    fn youtube_streams() -> MockStreamSource {
        let mut streams = MockStreamSource::new();
        streams.expect_candidates().returning(|source| {
            Ok(vec![StreamCandidate::new(
                "140",
                format!("https://cdn/{}.m4a", source.id),
            )])
        });
        streams
    }

    fn spawn_with(
        formats: FormatPolicy,
        notifier: MockNotificationSink,
        scrobbler: MockScrobbleSink,
    ) -> OrchestratorHandle {
        let mut config = AppConfig::default();
        config.scrobble.session_token = Some("session".to_string());

        let resolver =
            SourceResolver::new(formats).with_stream(SourceKind::YoutubeVideo, youtube_streams());
        let collaborators = Collaborators {
            byte_source: Arc::new(HttpByteSource::new(reqwest::Client::new(), resolver.clone())),
            resolver,
            player: Arc::new(any_player()),
            notifier: Arc::new(notifier),
            scrobbler: Arc::new(scrobbler),
            file_sink: Arc::new(FsFileSink),
        };
        Orchestrator::spawn(&config, collaborators)
    }

    async fn next_text(rx: &mut UnboundedReceiver<String>) -> String {
        tokio::time::timeout(Duration::from_secs(2), rx.recv())
            .await
            .unwrap()
            .unwrap()
    }

    #[tokio::test]
    async fn test_now_playing_uses_split_title() {
        let (tx, mut rx) = unbounded_channel();
        let mut scrobbler = MockScrobbleSink::new();
        scrobbler
            .expect_update_now_playing()
            .times(1)
            .returning(move |token, artist, track| {
                let _ = tx.send(format!("{token}|{artist}|{track}"));
                Ok(())
            });

        let engine = spawn_with(FormatPolicy::default(), MockNotificationSink::new(), scrobbler);
        engine
            .play_now(SourceRef::new(SourceKind::YoutubeVideo, "abc", "Artist - Song"))
            .await
            .unwrap();

        assert_eq!(next_text(&mut rx).await, "session|Artist|Song");
    }

    #[tokio::test]
    async fn test_unsupported_kind_is_notified() {
        let (tx, mut rx) = unbounded_channel();
        let mut notifier = MockNotificationSink::new();
        notifier.expect_error().times(1).returning(move |text| {
            let _ = tx.send(text.to_string());
        });

        let engine = spawn_with(FormatPolicy::default(), notifier, MockScrobbleSink::new());
        let result = engine
            .add_to_queue(SourceRef::new(SourceKind::Vimeo, "1", "Clip"), false)
            .await;

        assert!(matches!(result, Err(Error::Resolution(_))));
        assert!(next_text(&mut rx).await.starts_with("Could not add vimeo Clip."));
    }

    #[tokio::test]
    async fn test_configuration_error_is_only_logged() {
        let mut formats = FormatPolicy::default();
        formats.required.remove(&SourceKind::YoutubeVideo);

        // Any notifier call would panic the coordination task.
        let engine = spawn_with(formats, MockNotificationSink::new(), MockScrobbleSink::new());
        engine
            .add_to_queue(SourceRef::new(SourceKind::YoutubeVideo, "abc", "Song"), false)
            .await
            .unwrap();

        let mut song = None;
        for _ in 0..100 {
            let snapshot = engine.snapshot().await.unwrap();
            if !snapshot.queue.songs[0].stream_url_loading {
                song = Some(snapshot.queue.songs[0].clone());
                break;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }

        let song = song.unwrap();
        assert!(song.stream_url.is_none());
        assert!(
            song.resolution_error
                .unwrap()
                .contains("No required stream format")
        );
        assert!(engine.snapshot().await.is_ok());
    }

    #[tokio::test]
    async fn test_added_download_is_announced() {
        let (tx, mut rx) = unbounded_channel();
        let mut notifier = MockNotificationSink::new();
        notifier.expect_success().times(1).returning(move |text| {
            let _ = tx.send(text.to_string());
        });

        let engine = spawn_with(FormatPolicy::default(), notifier, MockScrobbleSink::new());
        let song = Song::pending(0, SourceRef::new(SourceKind::YoutubeVideo, "abc", "Tune"));
        let id = engine.add_download(song).await.unwrap();

        assert_eq!(id, 1);
        assert_eq!(
            next_text(&mut rx).await,
            "Song \"Tune\" added to downloads."
        );
    }
}
