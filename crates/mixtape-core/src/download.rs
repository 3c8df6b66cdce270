//! Download jobs.
//!
//! This module provides:
//! - [`DownloadQueue`], the ordered job set and its status rules
//! - [`ByteSource`] / [`FileSink`], the two ends of a transfer
//! - [`run_transfer`], the task body that copies one job's stream to disk
//!
//! Jobs are only started in batches by [`DownloadQueue::start_all`], never on
//! add. Status only moves `Queued -> InProgress -> Finished | Error` and a job
//! is never restarted.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use async_trait::async_trait;
use futures::stream::{self, BoxStream, StreamExt};
use serde::{Deserialize, Serialize};
use tokio::io::{AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tracing::{debug, error, info, warn};

use crate::error::TransferError;
use crate::resolver::SourceResolver;
use crate::source::{Song, SourceRef};

/// Unique identifier for a download job.
pub type JobId = u64;

/// Longest file stem produced by [`sanitize_filename`], in bytes.
pub const MAX_FILE_STEM_LEN: usize = 200;

const FILE_READ_CHUNK: usize = 64 * 1024;

/// Status of a download job.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DownloadStatus {
    /// Added, waiting for the next batch start.
    Queued,
    /// Transfer running.
    InProgress,
    /// Transfer completed.
    Finished,
    /// Transfer failed with an error.
    Error(String),
}

impl std::fmt::Display for DownloadStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Queued => write!(f, "Queued"),
            Self::InProgress => write!(f, "In progress"),
            Self::Finished => write!(f, "Finished"),
            Self::Error(msg) => write!(f, "Error: {msg}"),
        }
    }
}

/// One tracked transfer of a song's stream to disk.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DownloadJob {
    /// Unique identifier for this job.
    pub id: JobId,
    /// Source the song came from.
    pub source: SourceRef,
    /// Title at the time the job was added.
    pub title: String,
    /// Stream URL, if the song was already resolved.
    pub stream_url: Option<String>,
    /// Current status.
    pub status: DownloadStatus,
    /// Declared size in bytes.
    pub total_length: Option<u64>,
    /// Bytes written so far.
    pub bytes_written: u64,
    /// Chunks received from the stream so far.
    pub chunks_received: u64,
    /// Timestamp when the job was added (Unix millis).
    pub added_at: u64,
    /// Timestamp when the transfer ended (Unix millis).
    pub finished_at: Option<u64>,
}

impl DownloadJob {
    fn new(id: JobId, song: &Song) -> Self {
        Self {
            id,
            source: song.source.clone(),
            title: song.title.clone(),
            stream_url: song.stream_url.clone(),
            status: DownloadStatus::Queued,
            total_length: song.stream_length,
            bytes_written: 0,
            chunks_received: 0,
            added_at: now_millis(),
            finished_at: None,
        }
    }

    /// Check if the job reached `Finished` or `Error`.
    #[must_use]
    pub const fn is_finished(&self) -> bool {
        matches!(
            self.status,
            DownloadStatus::Finished | DownloadStatus::Error(_)
        )
    }

    /// Fraction of the declared length written so far (0.0 - 1.0).
    #[must_use]
    #[allow(clippy::cast_precision_loss)]
    pub fn progress(&self) -> Option<f64> {
        self.total_length
            .filter(|&total| total > 0)
            .map(|total| (self.bytes_written as f64 / total as f64).min(1.0))
    }
}

/// Statistics about the download queue.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DownloadStats {
    /// Total number of jobs.
    pub total_jobs: usize,
    /// Jobs waiting for a start.
    pub queued_count: usize,
    /// Jobs transferring.
    pub in_progress_count: usize,
    /// Jobs completed.
    pub finished_count: usize,
    /// Jobs failed.
    pub error_count: usize,
}

/// Ordered set of download jobs.
#[derive(Debug, Clone, Default)]
pub struct DownloadQueue {
    jobs: Vec<DownloadJob>,
    next_id: JobId,
}

impl DownloadQueue {
    /// Create an empty job set.
    #[must_use]
    pub const fn new() -> Self {
        Self {
            jobs: Vec::new(),
            next_id: 1,
        }
    }

    const fn next_job_id(&mut self) -> JobId {
        let id = self.next_id;
        self.next_id += 1;
        id
    }

    fn find_mut(&mut self, id: JobId) -> Option<&mut DownloadJob> {
        self.jobs.iter_mut().find(|job| job.id == id)
    }

    /// Snapshot a song into a new `Queued` job.
    pub fn add(&mut self, song: &Song) -> &DownloadJob {
        let id = self.next_job_id();
        info!("Added download job {} for '{}'", id, song.title);
        self.jobs.push(DownloadJob::new(id, song));
        &self.jobs[self.jobs.len() - 1]
    }

    /// Move every `Queued` job to `InProgress` and return them.
    ///
    /// Jobs in any other state are left alone, so calling this again never
    /// restarts a running, finished or failed job.
    pub fn start_all(&mut self) -> Vec<DownloadJob> {
        let started: Vec<DownloadJob> = self
            .jobs
            .iter_mut()
            .filter(|job| job.status == DownloadStatus::Queued)
            .map(|job| {
                job.status = DownloadStatus::InProgress;
                job.clone()
            })
            .collect();

        info!("Starting {} download jobs", started.len());
        started
    }

    /// Record the declared length reported when a transfer opened.
    pub fn set_total_length(&mut self, id: JobId, total_length: Option<u64>) {
        if let Some(job) = self.find_mut(id)
            && job.status == DownloadStatus::InProgress
            && total_length.is_some()
        {
            job.total_length = total_length;
        }
    }

    fn running_mut(&mut self, id: JobId, tally: Tally) -> Option<&mut DownloadJob> {
        let job = self.find_mut(id)?;
        if job.status != DownloadStatus::InProgress {
            return None;
        }
        job.bytes_written = job.bytes_written.max(tally.bytes_written);
        job.chunks_received = job.chunks_received.max(tally.chunks_received);
        Some(job)
    }

    /// Record surfaced progress. Ignored unless the job is `InProgress`.
    pub fn record_progress(&mut self, id: JobId, tally: Tally) -> Option<&DownloadJob> {
        self.running_mut(id, tally).map(|job| &*job)
    }

    /// Mark a running job `Finished`.
    pub fn finish(&mut self, id: JobId, tally: Tally) -> Option<&DownloadJob> {
        let job = self.running_mut(id, tally)?;
        job.status = DownloadStatus::Finished;
        job.finished_at = Some(now_millis());
        info!("Download job {} finished ({} bytes)", id, job.bytes_written);
        Some(job)
    }

    /// Mark a running job `Error`, freezing its byte count.
    pub fn fail(&mut self, id: JobId, tally: Tally, reason: String) -> Option<&DownloadJob> {
        let job = self.running_mut(id, tally)?;
        error!(
            "Download job {} failed after {} bytes: {}",
            id, job.bytes_written, reason
        );
        job.status = DownloadStatus::Error(reason);
        job.finished_at = Some(now_millis());
        Some(job)
    }

    /// Remove a job, returning it.
    pub fn remove(&mut self, id: JobId) -> Option<DownloadJob> {
        let Some(index) = self.jobs.iter().position(|job| job.id == id) else {
            warn!("Cannot remove download job {} - not found", id);
            return None;
        };
        info!("Removed download job {}", id);
        Some(self.jobs.remove(index))
    }

    /// Drop finished and failed jobs. Returns how many were removed.
    pub fn clear_finished(&mut self) -> usize {
        let before = self.jobs.len();
        self.jobs.retain(|job| !job.is_finished());
        let removed = before - self.jobs.len();
        if removed > 0 {
            info!("Cleared {} finished download jobs", removed);
        }
        removed
    }

    /// Job with an id.
    #[must_use]
    pub fn get(&self, id: JobId) -> Option<&DownloadJob> {
        self.jobs.iter().find(|job| job.id == id)
    }

    /// All jobs, in add order.
    #[must_use]
    pub fn jobs(&self) -> &[DownloadJob] {
        &self.jobs
    }

    /// Count jobs per status.
    #[must_use]
    pub fn stats(&self) -> DownloadStats {
        let mut stats = DownloadStats {
            total_jobs: self.jobs.len(),
            ..DownloadStats::default()
        };

        for job in &self.jobs {
            match job.status {
                DownloadStatus::Queued => stats.queued_count += 1,
                DownloadStatus::InProgress => stats.in_progress_count += 1,
                DownloadStatus::Finished => stats.finished_count += 1,
                DownloadStatus::Error(_) => stats.error_count += 1,
            }
        }

        stats
    }
}

/// An opened byte stream.
pub struct Transfer {
    /// Declared length, if known.
    pub total_length: Option<u64>,
    /// Chunks in order.
    pub chunks: BoxStream<'static, std::result::Result<Vec<u8>, TransferError>>,
}

impl std::fmt::Debug for Transfer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Transfer")
            .field("total_length", &self.total_length)
            .finish_non_exhaustive()
    }
}

/// Opens the byte stream of a job.
#[async_trait]
pub trait ByteSource: Send + Sync {
    /// Open the stream for a job.
    async fn open(&self, job: &DownloadJob) -> std::result::Result<Transfer, TransferError>;
}

/// Where downloaded bytes go.
#[async_trait]
pub trait FileSink: Send + Sync {
    /// Create (or truncate) the output file.
    async fn create(
        &self,
        path: &Path,
    ) -> std::result::Result<Box<dyn AsyncWrite + Send + Unpin>, TransferError>;

    /// Delete a partially written file.
    async fn discard(&self, path: &Path) -> std::result::Result<(), TransferError>;
}

/// Streams over HTTP, or from disk for `file://` URLs.
///
/// Jobs without a stream URL are resolved through the [`SourceResolver`]
/// first.
#[derive(Debug, Clone)]
pub struct HttpByteSource {
    client: reqwest::Client,
    resolver: SourceResolver,
}

impl HttpByteSource {
    /// Create a new byte source.
    #[must_use]
    pub const fn new(client: reqwest::Client, resolver: SourceResolver) -> Self {
        Self { client, resolver }
    }

    async fn stream_url(&self, job: &DownloadJob) -> std::result::Result<String, TransferError> {
        if let Some(url) = &job.stream_url {
            return Ok(url.clone());
        }

        debug!("Resolving stream for download '{}'", job.title);
        self.resolver
            .resolve_stream(&job.source)
            .await
            .map(|stream| stream.url)
            .map_err(|e| TransferError::OpenFailed {
                title: job.title.clone(),
                reason: e.to_string(),
            })
    }

    async fn open_file(
        job: &DownloadJob,
        path: &str,
    ) -> std::result::Result<Transfer, TransferError> {
        let open_failed = |e: std::io::Error| TransferError::OpenFailed {
            title: job.title.clone(),
            reason: e.to_string(),
        };

        let file = tokio::fs::File::open(path).await.map_err(open_failed)?;
        let total_length = file.metadata().await.map_err(open_failed)?.len();

        let chunks = stream::try_unfold(file, |mut file| async move {
            let mut buf = vec![0u8; FILE_READ_CHUNK];
            let read = match file.read(&mut buf).await {
                Ok(read) => read,
                Err(e) => {
                    return Err(TransferError::StreamFailed {
                        reason: e.to_string(),
                    });
                }
            };
            if read == 0 {
                return Ok(None);
            }
            buf.truncate(read);
            Ok(Some((buf, file)))
        });

        Ok(Transfer {
            total_length: Some(total_length),
            chunks: chunks.boxed(),
        })
    }
}

#[async_trait]
impl ByteSource for HttpByteSource {
    async fn open(&self, job: &DownloadJob) -> std::result::Result<Transfer, TransferError> {
        let url = self.stream_url(job).await?;

        if let Some(path) = url.strip_prefix("file://") {
            return Self::open_file(job, path).await;
        }

        let response = self
            .client
            .get(&url)
            .send()
            .await
            .and_then(reqwest::Response::error_for_status)
            .map_err(|e| TransferError::OpenFailed {
                title: job.title.clone(),
                reason: e.to_string(),
            })?;

        let total_length = response.content_length().or(job.total_length);
        let chunks = response
            .bytes_stream()
            .map(|chunk| {
                chunk
                    .map(|bytes| bytes.to_vec())
                    .map_err(|e| TransferError::StreamFailed {
                        reason: e.to_string(),
                    })
            })
            .boxed();

        Ok(Transfer {
            total_length,
            chunks,
        })
    }
}

/// Writes downloads to the local filesystem.
#[derive(Debug, Clone, Copy, Default)]
pub struct FsFileSink;

#[async_trait]
impl FileSink for FsFileSink {
    async fn create(
        &self,
        path: &Path,
    ) -> std::result::Result<Box<dyn AsyncWrite + Send + Unpin>, TransferError> {
        let sink_failed = |e: std::io::Error| TransferError::SinkFailed {
            path: path.to_path_buf(),
            reason: e.to_string(),
        };

        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent).await.map_err(sink_failed)?;
        }
        let file = tokio::fs::File::create(path).await.map_err(sink_failed)?;
        Ok(Box::new(file))
    }

    async fn discard(&self, path: &Path) -> std::result::Result<(), TransferError> {
        match tokio::fs::remove_file(path).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(TransferError::SinkFailed {
                path: path.to_path_buf(),
                reason: e.to_string(),
            }),
        }
    }
}

/// Bytes and chunks a transfer has handled so far.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Tally {
    /// Bytes written to the sink.
    pub bytes_written: u64,
    /// Chunks received from the stream.
    pub chunks_received: u64,
}

impl Tally {
    /// Create a tally.
    #[must_use]
    pub const fn new(bytes_written: u64, chunks_received: u64) -> Self {
        Self {
            bytes_written,
            chunks_received,
        }
    }
}

/// What a running transfer reports back.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransferUpdate {
    /// The stream opened.
    Opened {
        /// Job id.
        id: JobId,
        /// Declared length.
        total_length: Option<u64>,
    },
    /// Periodic progress.
    Progress {
        /// Job id.
        id: JobId,
        /// Bytes and chunks so far.
        tally: Tally,
    },
    /// All bytes written.
    Finished {
        /// Job id.
        id: JobId,
        /// Final bytes and chunks.
        tally: Tally,
    },
    /// The transfer stopped with an error.
    Failed {
        /// Job id.
        id: JobId,
        /// Bytes and chunks before the failure.
        tally: Tally,
        /// What went wrong.
        error: TransferError,
    },
}

impl TransferUpdate {
    /// Id of the job the update is about.
    #[must_use]
    pub const fn job_id(&self) -> JobId {
        match self {
            Self::Opened { id, .. }
            | Self::Progress { id, .. }
            | Self::Finished { id, .. }
            | Self::Failed { id, .. } => *id,
        }
    }
}

/// Copy one job's stream into `path`.
///
/// Bytes are counted on every chunk, but progress is only reported every
/// `update_interval` chunks. Exactly one `Finished` or `Failed` update ends
/// the transfer.
pub async fn run_transfer<F>(
    job: DownloadJob,
    path: PathBuf,
    source: Arc<dyn ByteSource>,
    sink: Arc<dyn FileSink>,
    update_interval: u64,
    report: F,
) where
    F: Fn(TransferUpdate) + Send,
{
    let id = job.id;
    let update_interval = update_interval.max(1);
    let mut tally = Tally::default();

    let failed = |tally, error| TransferUpdate::Failed { id, tally, error };

    let mut transfer = match source.open(&job).await {
        Ok(transfer) => transfer,
        Err(e) => {
            report(failed(tally, e));
            return;
        }
    };
    report(TransferUpdate::Opened {
        id,
        total_length: transfer.total_length,
    });

    let mut writer = match sink.create(&path).await {
        Ok(writer) => writer,
        Err(e) => {
            report(failed(tally, e));
            return;
        }
    };
    info!("Downloading '{}' to {}", job.title, path.display());

    while let Some(chunk) = transfer.chunks.next().await {
        let chunk = match chunk {
            Ok(chunk) => chunk,
            Err(e) => {
                report(failed(tally, e));
                return;
            }
        };

        if let Err(e) = writer.write_all(&chunk).await {
            report(failed(
                tally,
                TransferError::WriteFailed {
                    path: path.clone(),
                    reason: e.to_string(),
                },
            ));
            return;
        }

        tally.bytes_written += chunk.len() as u64;
        tally.chunks_received += 1;
        if tally.chunks_received % update_interval == 0 {
            report(TransferUpdate::Progress { id, tally });
        }
    }

    if let Err(e) = writer.shutdown().await {
        report(failed(
            tally,
            TransferError::WriteFailed {
                path,
                reason: e.to_string(),
            },
        ));
        return;
    }

    debug!(
        "Transfer of job {} done after {} chunks",
        id, tally.chunks_received
    );
    report(TransferUpdate::Finished { id, tally });
}

/// Sanitize a title for use as a file name.
///
/// Replaces characters that are invalid on common filesystems, trims
/// whitespace and dots, and caps the length at [`MAX_FILE_STEM_LEN`] bytes.
#[must_use]
pub fn sanitize_filename(name: &str) -> String {
    let invalid_chars = ['/', '\\', ':', '*', '?', '"', '<', '>', '|', '\0'];

    let sanitized: String = name
        .chars()
        .map(|c| if invalid_chars.contains(&c) { '_' } else { c })
        .collect();

    let trimmed = sanitized.trim().trim_matches('.');

    let mut end = trimmed.len().min(MAX_FILE_STEM_LEN);
    while !trimmed.is_char_boundary(end) {
        end -= 1;
    }
    let stem = trimmed[..end].trim_end();

    if stem.is_empty() {
        "download".to_string()
    } else {
        stem.to_string()
    }
}

fn now_millis() -> u64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .map(|d| u64::try_from(d.as_millis()).unwrap_or(u64::MAX))
        .unwrap_or(0)
}
