//! Mixtape - command line front end of the media orchestrator.
//!
//! `mixtape resolve <kind> <id>` prints the resolved streams of a reference as
//! JSON. `mixtape download <kind> <id>` expands the reference and downloads
//! every song it contains through the engine's download queue.

mod logging;

use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;

use clap::{Parser, Subcommand, ValueEnum};
use mixtape_core::{
    AppConfig, Collaborators, DownloadStatus, EngineEvent, Orchestrator, OrchestratorHandle,
    PlayerTarget, Song, SourceKind, SourceRef, sinks::Player,
};
use tokio::sync::broadcast::error::RecvError;
use tracing::{debug, error, info};

use crate::logging::{LoggingConfig, LoggingError};

#[derive(Debug, Parser)]
#[command(name = "mixtape", version, about = "Resolve, queue and download media")]
struct Cli {
    /// Configuration file (defaults to the platform config directory).
    #[arg(long, global = true, env = "MIXTAPE_CONFIG")]
    config: Option<PathBuf>,

    /// Directory for log files.
    #[arg(long, global = true, env = "MIXTAPE_LOG_DIR")]
    log_dir: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Print the selected stream of every song behind a reference.
    Resolve {
        /// Source kind.
        kind: KindArg,
        /// Video id, page URL or file path.
        id: String,
        /// Display title.
        #[arg(long)]
        title: Option<String>,
    },
    /// Download every song behind a reference.
    Download {
        /// Source kind.
        kind: KindArg,
        /// Video id, page URL or file path.
        id: String,
        /// Display title.
        #[arg(long)]
        title: Option<String>,
        /// Override the download directory.
        #[arg(long, short)]
        output: Option<PathBuf>,
    },
}

#[derive(Debug, Clone, Copy, ValueEnum)]
enum KindArg {
    Youtube,
    YoutubePlaylist,
    Soundcloud,
    Local,
    Vimeo,
    BandcampTrack,
    BandcampAlbum,
}

impl From<KindArg> for SourceKind {
    fn from(kind: KindArg) -> Self {
        match kind {
            KindArg::Youtube => Self::YoutubeVideo,
            KindArg::YoutubePlaylist => Self::YoutubePlaylist,
            KindArg::Soundcloud => Self::SoundCloud,
            KindArg::Local => Self::LocalFile,
            KindArg::Vimeo => Self::Vimeo,
            KindArg::BandcampTrack => Self::BandcampTrack,
            KindArg::BandcampAlbum => Self::BandcampAlbum,
        }
    }
}

#[derive(Debug, thiserror::Error)]
enum CliError {
    #[error(transparent)]
    Core(#[from] mixtape_core::Error),

    #[error(transparent)]
    Logging(#[from] LoggingError),

    #[error("Failed to encode output: {0}")]
    Output(#[from] serde_json::Error),

    #[error("{failed} of {total} downloads failed")]
    DownloadsFailed { failed: usize, total: usize },
}

/// Headless player: there is no audio output, targets are only logged.
struct LogPlayer;

impl Player for LogPlayer {
    fn apply(&self, target: &PlayerTarget) {
        debug!(
            "Player target: {} {:?} at {:.1}s",
            target.status, target.stream_url, target.seek_target
        );
    }
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    let mut logging_config = LoggingConfig::auto();
    if let Some(dir) = cli.log_dir.clone() {
        logging_config = logging_config.with_log_directory(dir);
    }
    let _guard = match logging::init(&logging_config) {
        Ok(guard) => Some(guard),
        Err(e) => {
            eprintln!("Logging disabled: {e}");
            None
        }
    };

    match run(cli).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!("{}", e);
            eprintln!("Error: {e}");
            ExitCode::FAILURE
        }
    }
}

async fn run(cli: Cli) -> Result<(), CliError> {
    let mut config = match &cli.config {
        Some(path) => AppConfig::load_from(path)?,
        None => AppConfig::load()?,
    };

    match cli.command {
        Command::Resolve { kind, id, title } => {
            let source = source_ref(kind, id, title);
            let collaborators = Collaborators::new(&config, Arc::new(LogPlayer));
            let entries = collaborators.resolver.resolve(&source).await?;
            println!("{}", serde_json::to_string_pretty(&entries)?);
            Ok(())
        }
        Command::Download {
            kind,
            id,
            title,
            output,
        } => {
            if let Some(dir) = output {
                config.downloads.directory = dir;
            }
            download(&config, source_ref(kind, id, title)).await
        }
    }
}

fn source_ref(kind: KindArg, id: String, title: Option<String>) -> SourceRef {
    let title = title.unwrap_or_else(|| id.clone());
    SourceRef::new(kind.into(), id, title)
}

async fn download(config: &AppConfig, source: SourceRef) -> Result<(), CliError> {
    let collaborators = Collaborators::new(config, Arc::new(LogPlayer));
    let leaves = collaborators.resolver.expand(&source).await?;
    if leaves.is_empty() {
        info!("'{}' has no songs to download", source.title);
        return Ok(());
    }

    let engine = Orchestrator::spawn(config, collaborators);
    let mut events = engine.subscribe();

    for leaf in leaves {
        engine.add_download(Song::pending(0, leaf)).await?;
    }
    let total = engine.start_downloads().await?;
    info!(
        "Downloading {} songs to {}",
        total,
        config.downloads.directory.display()
    );

    let failed = wait_for_downloads(&engine, &mut events).await?;
    engine.shutdown().await?;

    if failed > 0 {
        return Err(CliError::DownloadsFailed { failed, total });
    }
    Ok(())
}

/// Block until every job is finished or failed, returning the failure count.
async fn wait_for_downloads(
    engine: &OrchestratorHandle,
    events: &mut tokio::sync::broadcast::Receiver<EngineEvent>,
) -> Result<usize, CliError> {
    loop {
        let jobs = engine.downloads().await?;
        if jobs.iter().all(mixtape_core::DownloadJob::is_finished) {
            for job in &jobs {
                match &job.status {
                    DownloadStatus::Error(reason) => eprintln!("failed   {}: {reason}", job.title),
                    _ => println!("finished {} ({} bytes)", job.title, job.bytes_written),
                }
            }
            return Ok(jobs
                .iter()
                .filter(|job| matches!(job.status, DownloadStatus::Error(_)))
                .count());
        }

        match events.recv().await {
            Ok(EngineEvent::Download(job)) => {
                if let Some(progress) = job.progress() {
                    debug!("{}: {:.0}%", job.title, progress * 100.0);
                }
            }
            Ok(_) | Err(RecvError::Lagged(_)) => {}
            Err(RecvError::Closed) => return Err(mixtape_core::Error::EngineStopped.into()),
        }
    }
}
