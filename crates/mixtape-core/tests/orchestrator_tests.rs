//! End-to-end tests of the coordination task with scripted collaborators.

#![allow(clippy::unwrap_used, clippy::expect_used, clippy::panic)]

use std::path::Path;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use futures::stream::{self, StreamExt};
use mixtape_core::{
    AppConfig, ByteSource, CollectionSource, Collaborators, DownloadJob, DownloadStatus,
    EngineSnapshot, FsFileSink, NotificationSink, Orchestrator, OrchestratorHandle,
    PlaybackStatus, Player, PlayerTarget, ResolutionError, ScrobbleError, ScrobbleSink, Song,
    SourceKind, SourceRef, SourceResolver, StreamCandidate, StreamSource, Transfer,
    TransferError,
};
use tempfile::TempDir;
use tokio::sync::Notify;

#[derive(Default)]
struct RecordingPlayer {
    targets: Mutex<Vec<PlayerTarget>>,
}

impl RecordingPlayer {
    fn statuses(&self) -> Vec<PlaybackStatus> {
        self.targets
            .lock()
            .unwrap()
            .iter()
            .map(|target| target.status)
            .collect()
    }
}

impl Player for RecordingPlayer {
    fn apply(&self, target: &PlayerTarget) {
        self.targets.lock().unwrap().push(target.clone());
    }
}

#[derive(Default)]
struct RecordingNotifier {
    errors: Mutex<Vec<String>>,
    successes: Mutex<Vec<String>>,
}

impl NotificationSink for RecordingNotifier {
    fn info(&self, _text: &str) {}

    fn success(&self, text: &str) {
        self.successes.lock().unwrap().push(text.to_string());
    }

    fn error(&self, text: &str) {
        self.errors.lock().unwrap().push(text.to_string());
    }
}

#[derive(Default)]
struct RecordingScrobbler {
    now_playing: Mutex<Vec<(String, String)>>,
    scrobbled: Mutex<Vec<(String, String)>>,
}

#[async_trait]
impl ScrobbleSink for RecordingScrobbler {
    async fn update_now_playing(
        &self,
        _session_token: &str,
        artist: &str,
        track: &str,
    ) -> Result<(), ScrobbleError> {
        self.now_playing
            .lock()
            .unwrap()
            .push((artist.to_string(), track.to_string()));
        Ok(())
    }

    async fn scrobble(
        &self,
        _session_token: &str,
        artist: &str,
        track: &str,
    ) -> Result<(), ScrobbleError> {
        self.scrobbled
            .lock()
            .unwrap()
            .push((artist.to_string(), track.to_string()));
        // Failures are swallowed by the engine.
        Err(ScrobbleError("service unavailable".to_string()))
    }
}

/// Streams keyed by id prefix: `slow*` waits for the gate, `bad*` only offers flac.
struct ScriptedStreams {
    gate: Arc<Notify>,
}

#[async_trait]
impl StreamSource for ScriptedStreams {
    async fn candidates(&self, source: &SourceRef) -> Result<Vec<StreamCandidate>, ResolutionError> {
        if source.id.starts_with("slow") {
            self.gate.notified().await;
        }
        if source.id.starts_with("bad") {
            return Ok(vec![StreamCandidate::new("flac", "https://cdn/flac")]);
        }
        Ok(vec![
            StreamCandidate::new("140", format!("https://cdn/{}.m4a", source.id))
                .with_length(Some(1000)),
            StreamCandidate::new("mp3-128", format!("https://cdn/{}.mp3", source.id)),
        ])
    }
}

/// Albums list `tracks` children unless their id is `broken`; `held*` albums
/// wait for the gate before listing.
struct ScriptedAlbum {
    tracks: usize,
    gate: Arc<Notify>,
}

#[async_trait]
impl CollectionSource for ScriptedAlbum {
    async fn entries(&self, source: &SourceRef) -> Result<Vec<SourceRef>, ResolutionError> {
        if source.id == "broken" {
            return Err(ResolutionError::invalid(&source.id, "unparsable tralbum"));
        }
        if source.id.starts_with("held") {
            self.gate.notified().await;
        }
        Ok((1..=self.tracks)
            .map(|n| {
                SourceRef::new(
                    SourceKind::BandcampTrack,
                    format!("{}-{n}", source.id),
                    format!("Band - Track {n}"),
                )
            })
            .collect())
    }
}

/// Writes `chunks` chunks of 100 bytes, then fails if `fail` is set.
/// Jobs titled `Endless*` write three chunks and then stall forever.
struct ScriptedBytes {
    chunks: usize,
    fail: bool,
}

#[async_trait]
impl ByteSource for ScriptedBytes {
    async fn open(&self, job: &DownloadJob) -> Result<Transfer, TransferError> {
        if job.title.starts_with("Endless") {
            let head = stream::iter((0..3).map(|_| Ok(vec![0u8; 100])));
            return Ok(Transfer {
                total_length: None,
                chunks: head.chain(stream::pending()).boxed(),
            });
        }

        let mut chunks: Vec<Result<Vec<u8>, TransferError>> =
            (0..self.chunks).map(|_| Ok(vec![0u8; 100])).collect();
        if self.fail {
            chunks.push(Err(TransferError::StreamFailed {
                reason: "connection reset".to_string(),
            }));
        }
        Ok(Transfer {
            total_length: Some(1000),
            chunks: stream::iter(chunks).boxed(),
        })
    }
}

struct Harness {
    engine: OrchestratorHandle,
    player: Arc<RecordingPlayer>,
    notifier: Arc<RecordingNotifier>,
    scrobbler: Arc<RecordingScrobbler>,
    gate: Arc<Notify>,
    album_gate: Arc<Notify>,
    dir: TempDir,
}

fn harness_with(bytes: ScriptedBytes, configure: impl FnOnce(&mut AppConfig)) -> Harness {
    let dir = TempDir::new().unwrap();
    let mut config = AppConfig::default();
    config.downloads.directory = dir.path().join("downloads");
    config.scrobble.session_token = Some("session".to_string());
    configure(&mut config);

    let gate = Arc::new(Notify::new());
    let album_gate = Arc::new(Notify::new());
    let resolver = SourceResolver::new(config.formats.clone())
        .with_stream(
            SourceKind::YoutubeVideo,
            ScriptedStreams {
                gate: Arc::clone(&gate),
            },
        )
        .with_stream(
            SourceKind::BandcampTrack,
            ScriptedStreams {
                gate: Arc::clone(&gate),
            },
        )
        .with_collection(
            SourceKind::BandcampAlbum,
            ScriptedAlbum {
                tracks: 5,
                gate: Arc::clone(&album_gate),
            },
        );

    let player = Arc::new(RecordingPlayer::default());
    let notifier = Arc::new(RecordingNotifier::default());
    let scrobbler = Arc::new(RecordingScrobbler::default());

    let collaborators = Collaborators {
        resolver,
        player: Arc::clone(&player) as Arc<dyn Player>,
        notifier: Arc::clone(&notifier) as Arc<dyn NotificationSink>,
        scrobbler: Arc::clone(&scrobbler) as Arc<dyn ScrobbleSink>,
        byte_source: Arc::new(bytes),
        file_sink: Arc::new(FsFileSink),
    };

    Harness {
        engine: Orchestrator::spawn(&config, collaborators),
        player,
        notifier,
        scrobbler,
        gate,
        album_gate,
        dir,
    }
}

fn harness_with_bytes(bytes: ScriptedBytes) -> Harness {
    harness_with(bytes, |_| {})
}

fn harness() -> Harness {
    harness_with_bytes(ScriptedBytes {
        chunks: 10,
        fail: false,
    })
}

fn video(id: &str) -> SourceRef {
    SourceRef::new(SourceKind::YoutubeVideo, id, format!("Artist - {id}"))
}

/// Poll snapshots until `done` holds.
async fn wait_for(
    engine: &OrchestratorHandle,
    done: impl Fn(&EngineSnapshot) -> bool,
) -> EngineSnapshot {
    for _ in 0..200 {
        let snapshot = engine.snapshot().await.unwrap();
        if done(&snapshot) {
            return snapshot;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    panic!("condition not reached: {:?}", engine.snapshot().await.unwrap());
}

fn all_resolved(snapshot: &EngineSnapshot) -> bool {
    snapshot
        .queue
        .songs
        .iter()
        .all(|song| !song.stream_url_loading)
}

#[tokio::test]
async fn test_single_track_play_now_loads_then_plays() {
    let h = harness();
    let initial = h.engine.snapshot().await.unwrap();
    assert_eq!(initial.playback.status, PlaybackStatus::Stopped);

    let ids = h.engine.add_to_queue(video("slow-1"), true).await.unwrap();
    assert_eq!(ids.len(), 1);

    let snapshot = h.engine.snapshot().await.unwrap();
    assert_eq!(snapshot.queue.songs.len(), 1);
    assert_eq!(snapshot.playback.status, PlaybackStatus::Loading);

    h.gate.notify_one();
    let snapshot = wait_for(&h.engine, |s| s.playback.status == PlaybackStatus::Playing).await;
    assert_eq!(
        snapshot.queue.songs[0].stream_url.as_deref(),
        Some("https://cdn/slow-1.m4a")
    );

    let statuses = h.player.statuses();
    assert_eq!(
        statuses,
        vec![PlaybackStatus::Loading, PlaybackStatus::Playing]
    );
}

#[tokio::test]
async fn test_album_play_now_plays_first_track_only() {
    let h = harness();
    let album = SourceRef::new(SourceKind::BandcampAlbum, "record", "Record");

    let ids = h.engine.add_to_queue(album, true).await.unwrap();
    assert_eq!(ids.len(), 5);

    let snapshot = wait_for(&h.engine, |s| {
        all_resolved(s) && s.playback.status == PlaybackStatus::Playing
    })
    .await;

    let titles: Vec<_> = snapshot
        .queue
        .songs
        .iter()
        .map(|song| song.title.as_str())
        .collect();
    assert_eq!(
        titles,
        vec![
            "Band - Track 1",
            "Band - Track 2",
            "Band - Track 3",
            "Band - Track 4",
            "Band - Track 5"
        ]
    );
    assert_eq!(snapshot.queue.current_index, Some(0));
    assert_eq!(
        snapshot.queue.songs.iter().map(|song| song.id).collect::<Vec<_>>(),
        ids
    );

    tokio::time::sleep(Duration::from_millis(50)).await;
    let now_playing = h.scrobbler.now_playing.lock().unwrap().clone();
    assert_eq!(
        now_playing,
        vec![("Band".to_string(), "Track 1".to_string())]
    );
}

#[tokio::test]
async fn test_broken_album_fails_whole_without_touching_queue() {
    let h = harness();
    h.engine.add_to_queue(video("a"), false).await.unwrap();

    let broken = SourceRef::new(SourceKind::BandcampAlbum, "broken", "Broken");
    let result = h.engine.add_to_queue(broken, true).await;
    assert!(result.is_err());

    let snapshot = wait_for(&h.engine, all_resolved).await;
    assert_eq!(snapshot.queue.songs.len(), 1);
    assert_eq!(snapshot.playback.status, PlaybackStatus::Stopped);

    let errors = h.notifier.errors.lock().unwrap().clone();
    assert_eq!(errors.len(), 1);
    assert!(errors[0].starts_with("Could not add bandcamp album Broken."));
}

#[tokio::test]
async fn test_missing_format_leaves_song_unresolved() {
    let h = harness();
    h.engine.add_to_queue(video("bad-1"), false).await.unwrap();

    let snapshot = wait_for(&h.engine, all_resolved).await;
    let song = &snapshot.queue.songs[0];
    assert!(song.stream_url.is_none());
    assert!(song.resolution_error.as_deref().unwrap().contains("'140'"));
    assert_eq!(h.notifier.errors.lock().unwrap().len(), 1);
}

#[tokio::test]
async fn test_concurrent_adds_land_in_completion_order() {
    let h = harness();
    let engine = h.engine.clone();
    let held = SourceRef::new(SourceKind::BandcampAlbum, "held", "Held");
    let album_add = tokio::spawn(async move { engine.add_to_queue(held, false).await });

    let video_ids = h.engine.add_to_queue(video("v"), false).await.unwrap();
    assert_eq!(h.engine.snapshot().await.unwrap().queue.songs.len(), 1);

    h.album_gate.notify_one();
    let album_ids = album_add.await.unwrap().unwrap();
    assert_eq!(album_ids.len(), 5);

    let snapshot = wait_for(&h.engine, all_resolved).await;
    let order: Vec<_> = snapshot
        .queue
        .songs
        .iter()
        .map(|song| song.source.id.as_str())
        .collect();
    assert_eq!(
        order,
        vec!["v", "held-1", "held-2", "held-3", "held-4", "held-5"]
    );
    let ids: Vec<_> = snapshot.queue.songs.iter().map(|song| song.id).collect();
    assert_eq!(ids, [video_ids, album_ids].concat());
}

#[tokio::test]
async fn test_reorder_keeps_current_song() {
    let h = harness();
    for id in ["a", "b", "c"] {
        h.engine.add_to_queue(video(id), false).await.unwrap();
    }
    wait_for(&h.engine, all_resolved).await;
    h.engine.play(0).await.unwrap();

    h.engine.reorder(0, 2).await.unwrap();

    let snapshot = h.engine.snapshot().await.unwrap();
    assert_eq!(snapshot.queue.current_index, Some(2));
    assert_eq!(snapshot.queue.songs[2].source.id, "a");
    assert_eq!(snapshot.playback.status, PlaybackStatus::Playing);

    let err = h.engine.reorder(3, 0).await.unwrap_err();
    assert_eq!(err.kind(), mixtape_core::ErrorKind::Range);
}

#[tokio::test]
async fn test_last_song_finishing_stops() {
    let h = harness();
    for id in ["a", "b"] {
        h.engine.add_to_queue(video(id), false).await.unwrap();
    }
    wait_for(&h.engine, all_resolved).await;

    h.engine.play(1).await.unwrap();
    h.engine.player_progress(95.0, 100.0).unwrap();
    h.engine.player_finished().unwrap();

    let snapshot = wait_for(&h.engine, |s| s.playback.status == PlaybackStatus::Stopped).await;
    assert_eq!(snapshot.playback.position, 0.0);
    assert_eq!(snapshot.playback.seek_target, 0.0);
    assert_eq!(snapshot.queue.current_index, Some(1));

    tokio::time::sleep(Duration::from_millis(50)).await;
    let scrobbled = h.scrobbler.scrobbled.lock().unwrap().clone();
    assert_eq!(scrobbled, vec![("Artist".to_string(), "b".to_string())]);
}

#[tokio::test]
async fn test_finished_song_advances_to_next() {
    let h = harness();
    for id in ["a", "b"] {
        h.engine.add_to_queue(video(id), false).await.unwrap();
    }
    wait_for(&h.engine, all_resolved).await;

    h.engine.play(0).await.unwrap();
    h.engine.player_finished().unwrap();

    let snapshot = wait_for(&h.engine, |s| s.queue.current_index == Some(1)).await;
    assert_eq!(snapshot.playback.status, PlaybackStatus::Playing);
}

#[tokio::test]
async fn test_removing_current_song_stops_playback() {
    let h = harness();
    let mut ids = Vec::new();
    for id in ["a", "b", "c"] {
        ids.extend(h.engine.add_to_queue(video(id), false).await.unwrap());
    }
    wait_for(&h.engine, all_resolved).await;
    h.engine.play(2).await.unwrap();

    h.engine.remove(ids[2]).await.unwrap();
    let snapshot = h.engine.snapshot().await.unwrap();
    assert_eq!(snapshot.playback.status, PlaybackStatus::Stopped);
    assert_eq!(snapshot.queue.current_index, Some(1));

    h.engine.play(0).await.unwrap();
    h.engine.remove(ids[1]).await.unwrap();
    let snapshot = h.engine.snapshot().await.unwrap();
    assert_eq!(snapshot.playback.status, PlaybackStatus::Playing);
    assert_eq!(snapshot.queue.songs[0].source.id, "a");
}

#[tokio::test]
async fn test_removing_song_with_pending_stream() {
    let h = harness();
    let ids = h.engine.add_to_queue(video("slow-1"), false).await.unwrap();
    h.engine.add_to_queue(video("b"), false).await.unwrap();

    h.engine.remove(ids[0]).await.unwrap();
    h.gate.notify_one();

    let snapshot = wait_for(&h.engine, all_resolved).await;
    assert_eq!(snapshot.queue.songs.len(), 1);
    assert_eq!(snapshot.queue.songs[0].source.id, "b");
}

#[tokio::test]
async fn test_clear_and_empty_queue_never_plays() {
    let h = harness();
    h.engine.toggle().await.unwrap();
    assert_eq!(
        h.engine.snapshot().await.unwrap().playback.status,
        PlaybackStatus::Stopped
    );

    h.engine.add_to_queue(video("a"), true).await.unwrap();
    wait_for(&h.engine, |s| s.playback.status == PlaybackStatus::Playing).await;

    h.engine.clear().await.unwrap();
    let snapshot = h.engine.snapshot().await.unwrap();
    assert!(snapshot.queue.songs.is_empty());
    assert_eq!(snapshot.playback.status, PlaybackStatus::Stopped);

    h.engine.next().await.unwrap();
    h.engine.toggle().await.unwrap();
    assert_eq!(
        h.engine.snapshot().await.unwrap().playback.status,
        PlaybackStatus::Stopped
    );
}

#[tokio::test]
async fn test_play_now_replaces_queue() {
    let h = harness();
    h.engine.add_to_queue(video("a"), false).await.unwrap();
    h.engine.add_to_queue(video("b"), false).await.unwrap();

    h.engine.play_now(video("c")).await.unwrap();
    let snapshot = wait_for(&h.engine, |s| s.playback.status == PlaybackStatus::Playing).await;
    assert_eq!(snapshot.queue.songs.len(), 1);
    assert_eq!(snapshot.queue.songs[0].source.id, "c");
}

#[tokio::test]
async fn test_seek_and_toggle_resume() {
    let h = harness();
    h.engine.add_to_queue(video("a"), true).await.unwrap();
    wait_for(&h.engine, |s| s.playback.status == PlaybackStatus::Playing).await;

    h.engine.player_progress(30.0, 120.0).unwrap();
    h.engine.seek(0.5).await.unwrap();
    let snapshot = h.engine.snapshot().await.unwrap();
    assert_eq!(snapshot.playback.seek_target, 60.0);
    assert_eq!(snapshot.playback.progress, 25);

    h.engine.toggle().await.unwrap();
    h.engine.toggle().await.unwrap();
    let last = h.player.targets.lock().unwrap().last().cloned().unwrap();
    assert_eq!(last.status, PlaybackStatus::Playing);
    assert_eq!(last.seek_target, 30.0);
}

fn downloadable(title: &str) -> Song {
    Song::pending(0, SourceRef::new(SourceKind::YoutubeVideo, "x", title))
}

fn job_status(snapshot: &EngineSnapshot, index: usize) -> &DownloadStatus {
    &snapshot.downloads[index].status
}

#[tokio::test]
async fn test_failed_download_keeps_bytes_and_is_not_restarted() {
    let h = harness_with_bytes(ScriptedBytes {
        chunks: 5,
        fail: true,
    });

    h.engine.add_download(downloadable("Artist - Song")).await.unwrap();
    let snapshot = h.engine.snapshot().await.unwrap();
    assert_eq!(job_status(&snapshot, 0), &DownloadStatus::Queued);
    assert_eq!(
        h.notifier.successes.lock().unwrap().clone(),
        vec!["Song \"Artist - Song\" added to downloads.".to_string()]
    );

    assert_eq!(h.engine.start_downloads().await.unwrap(), 1);
    let snapshot = wait_for(&h.engine, |s| {
        matches!(s.downloads[0].status, DownloadStatus::Error(_))
    })
    .await;
    assert_eq!(snapshot.downloads[0].bytes_written, 500);
    assert_eq!(snapshot.downloads[0].total_length, Some(1000));

    assert_eq!(h.engine.start_downloads().await.unwrap(), 0);
    tokio::time::sleep(Duration::from_millis(20)).await;
    let snapshot = h.engine.snapshot().await.unwrap();
    assert!(matches!(job_status(&snapshot, 0), DownloadStatus::Error(_)));
    assert_eq!(snapshot.downloads[0].bytes_written, 500);
}

#[tokio::test]
async fn test_downloads_finish_independently() {
    let h = harness();

    h.engine.add_download(downloadable("One")).await.unwrap();
    h.engine.add_download(downloadable("Two")).await.unwrap();
    assert_eq!(h.engine.start_downloads().await.unwrap(), 2);

    let snapshot = wait_for(&h.engine, |s| {
        s.downloads
            .iter()
            .all(|job| job.status == DownloadStatus::Finished)
    })
    .await;
    assert!(snapshot.downloads.iter().all(|job| job.bytes_written == 1000));
    assert_eq!(snapshot.downloads[0].chunks_received, 10);

    let path = h.dir.path().join("downloads").join("One.m4a");
    assert_eq!(std::fs::metadata(Path::new(&path)).unwrap().len(), 1000);

    assert_eq!(h.engine.clear_finished_downloads().await.unwrap(), 2);
    assert!(h.engine.downloads().await.unwrap().is_empty());
}

#[tokio::test]
async fn test_duplicate_titles_get_separate_files() {
    let h = harness();
    h.engine.add_download(downloadable("Same")).await.unwrap();
    h.engine.add_download(downloadable("Same")).await.unwrap();
    assert_eq!(h.engine.start_downloads().await.unwrap(), 2);

    wait_for(&h.engine, |s| {
        s.downloads
            .iter()
            .all(|job| job.status == DownloadStatus::Finished)
    })
    .await;

    let downloads = h.dir.path().join("downloads");
    assert_eq!(std::fs::metadata(downloads.join("Same.m4a")).unwrap().len(), 1000);
    assert_eq!(
        std::fs::metadata(downloads.join("Same (2).m4a")).unwrap().len(),
        1000
    );
}

async fn wait_for_path(path: &Path, present: bool) {
    for _ in 0..200 {
        if path.exists() == present {
            return;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    panic!("{} never became present={present}", path.display());
}

/// Start a stalled job next to a normal one, then remove the stalled one
/// mid-transfer. Returns the stalled job's output path.
async fn remove_stalled_download(h: &Harness) -> std::path::PathBuf {
    let stalled = h.engine.add_download(downloadable("Endless Song")).await.unwrap();
    h.engine.add_download(downloadable("Other")).await.unwrap();
    assert_eq!(h.engine.start_downloads().await.unwrap(), 2);

    let partial = h.dir.path().join("downloads").join("Endless Song.m4a");
    wait_for_path(&partial, true).await;

    let removed = h.engine.remove_download(stalled).await.unwrap();
    assert_eq!(removed.status, DownloadStatus::InProgress);

    let snapshot = wait_for(&h.engine, |s| {
        s.downloads.len() == 1 && s.downloads[0].status == DownloadStatus::Finished
    })
    .await;
    assert_eq!(snapshot.downloads[0].title, "Other");
    assert_eq!(snapshot.downloads[0].bytes_written, 1000);

    partial
}

#[tokio::test]
async fn test_removed_running_download_keeps_partial_file() {
    let h = harness();
    let partial = remove_stalled_download(&h).await;

    tokio::time::sleep(Duration::from_millis(50)).await;
    assert!(partial.exists());

    let snapshot = h.engine.snapshot().await.unwrap();
    assert_eq!(snapshot.downloads.len(), 1);
    assert_eq!(snapshot.download_stats.total_jobs, 1);
    assert_eq!(snapshot.download_stats.in_progress_count, 0);
}

#[tokio::test]
async fn test_removed_running_download_deletes_partial_file_when_configured() {
    let h = harness_with(
        ScriptedBytes {
            chunks: 10,
            fail: false,
        },
        |config| config.downloads.delete_partial_on_abort = true,
    );
    let partial = remove_stalled_download(&h).await;

    wait_for_path(&partial, false).await;
    let sibling = h.dir.path().join("downloads").join("Other.m4a");
    assert_eq!(std::fs::metadata(sibling).unwrap().len(), 1000);
    assert_eq!(h.engine.downloads().await.unwrap().len(), 1);
}

#[tokio::test]
async fn test_remove_unknown_download() {
    let h = harness();
    let err = h.engine.remove_download(42).await.unwrap_err();
    assert!(matches!(err, mixtape_core::Error::DownloadNotFound(42)));

    let id = h.engine.add_download(downloadable("Song")).await.unwrap();
    let removed = h.engine.remove_download(id).await.unwrap();
    assert_eq!(removed.title, "Song");
}

#[tokio::test]
async fn test_shutdown_stops_engine() {
    let h = harness();
    h.engine.shutdown().await.unwrap();
    let err = h.engine.snapshot().await.unwrap_err();
    assert!(matches!(err, mixtape_core::Error::EngineStopped));
}
