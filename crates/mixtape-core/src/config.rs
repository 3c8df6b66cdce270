//! Application configuration management.
//!
//! Handles loading and saving the settings the engine needs: where downloads
//! go, which stream format each source must provide, and the credentials of
//! the optional collaborators.

use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::error::{Error, Result};
use crate::source::SourceKind;

/// Default number of received chunks between two progress notifications.
pub const DEFAULT_PROGRESS_UPDATE_INTERVAL: u64 = 10;

/// Default extension of downloaded audio files.
pub const DEFAULT_AUDIO_EXTENSION: &str = "m4a";

/// Download queue settings.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct DownloadSettings {
    /// Directory downloaded files are written to.
    #[serde(default = "default_download_directory")]
    pub directory: PathBuf,
    /// Extension appended to every downloaded file.
    #[serde(default = "default_audio_extension")]
    pub audio_extension: String,
    /// Progress is surfaced to observers every this many chunks.
    #[serde(default = "default_progress_interval")]
    pub progress_update_interval: u64,
    /// Whether removing an in-progress job deletes the partially written file.
    #[serde(default)]
    pub delete_partial_on_abort: bool,
}

fn default_audio_extension() -> String {
    DEFAULT_AUDIO_EXTENSION.to_string()
}

const fn default_progress_interval() -> u64 {
    DEFAULT_PROGRESS_UPDATE_INTERVAL
}

impl Default for DownloadSettings {
    fn default() -> Self {
        Self {
            directory: default_download_directory(),
            audio_extension: default_audio_extension(),
            progress_update_interval: DEFAULT_PROGRESS_UPDATE_INTERVAL,
            delete_partial_on_abort: false,
        }
    }
}

impl DownloadSettings {
    /// Clamp values that would stall progress reporting.
    pub fn validate(&mut self) {
        self.progress_update_interval = self.progress_update_interval.max(1);
        let trimmed = self.audio_extension.trim_start_matches('.');
        if trimmed.len() != self.audio_extension.len() {
            self.audio_extension = trimmed.to_string();
        }
        if self.audio_extension.is_empty() {
            self.audio_extension = default_audio_extension();
        }
    }

    /// Output path for a download with the given (already sanitized) file stem.
    #[must_use]
    pub fn output_path(&self, file_stem: &str) -> PathBuf {
        self.directory
            .join(format!("{file_stem}.{}", self.audio_extension))
    }
}

/// Required stream format per source kind.
///
/// Resolution fails when a source offers no stream in the required format;
/// there is no fallback to another candidate.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct FormatPolicy {
    /// Format id each leaf kind must provide.
    #[serde(default = "default_required_formats")]
    pub required: BTreeMap<SourceKind, String>,
}

fn default_required_formats() -> BTreeMap<SourceKind, String> {
    BTreeMap::from([
        // m4a audio, 128 kbps
        (SourceKind::YoutubeVideo, "140".to_string()),
        (SourceKind::Vimeo, "360p".to_string()),
        (SourceKind::BandcampTrack, "mp3-128".to_string()),
        (SourceKind::SoundCloud, "http_mp3_128_url".to_string()),
        (SourceKind::LocalFile, "file".to_string()),
    ])
}

impl Default for FormatPolicy {
    fn default() -> Self {
        Self {
            required: default_required_formats(),
        }
    }
}

impl FormatPolicy {
    /// Format id required for a kind, if any.
    #[must_use]
    pub fn required_for(&self, kind: SourceKind) -> Option<&str> {
        self.required.get(&kind).map(String::as_str)
    }

    /// Override the required format of one kind.
    #[must_use]
    pub fn with_required(mut self, kind: SourceKind, format_id: impl Into<String>) -> Self {
        self.required.insert(kind, format_id.into());
        self
    }
}

/// SoundCloud API settings.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct SoundCloudSettings {
    /// Public API client id.
    #[serde(default)]
    pub client_id: Option<String>,
}

/// Listening-history reporting settings.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct ScrobbleSettings {
    /// Session token for the scrobble service; scrobbling is off without one.
    #[serde(default)]
    pub session_token: Option<String>,
}

/// Application configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct AppConfig {
    /// Download queue settings.
    #[serde(default)]
    pub downloads: DownloadSettings,
    /// Required stream formats.
    #[serde(default)]
    pub formats: FormatPolicy,
    /// SoundCloud settings.
    #[serde(default)]
    pub soundcloud: SoundCloudSettings,
    /// Scrobble settings.
    #[serde(default)]
    pub scrobble: ScrobbleSettings,
}

impl AppConfig {
    /// Load configuration from the default location, or create it if missing.
    ///
    /// # Errors
    ///
    /// Returns an error if the config file exists but cannot be read or parsed.
    pub fn load() -> Result<Self> {
        let config_path = config_file_path();

        if !config_path.exists() {
            debug!("Config file not found, using defaults");
            let config = Self::default();
            if let Err(e) = config.save() {
                warn!("Failed to save default config: {}", e);
            }
            return Ok(config);
        }

        Self::load_from(&config_path)
    }

    /// Load configuration from a specific file.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read or parsed.
    pub fn load_from(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path).map_err(|e| {
            Error::Configuration(format!(
                "Failed to read config file {}: {e}",
                path.display()
            ))
        })?;

        let mut config: Self = serde_json::from_str(&content)
            .map_err(|e| Error::Configuration(format!("Failed to parse config file: {e}")))?;
        config.downloads.validate();

        info!("Loaded config from {}", path.display());
        debug!(
            "Download directory: {}",
            config.downloads.directory.display()
        );

        Ok(config)
    }

    /// Save configuration to the default location.
    ///
    /// # Errors
    ///
    /// Returns an error if the config file cannot be written.
    pub fn save(&self) -> Result<()> {
        self.save_to(&config_file_path())
    }

    /// Save configuration to a specific file, creating parent directories.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be written.
    pub fn save_to(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent()
            && !parent.exists()
        {
            fs::create_dir_all(parent)?;
        }

        let content = serde_json::to_string_pretty(self)?;
        fs::write(path, content)?;

        info!("Saved config to {}", path.display());
        Ok(())
    }

    /// Get the path to the config file.
    #[must_use]
    pub fn config_file_path() -> PathBuf {
        config_file_path()
    }
}

/// Get the default download directory.
#[must_use]
pub fn default_download_directory() -> PathBuf {
    dirs::data_local_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("mixtape")
        .join("downloads")
}

fn config_file_path() -> PathBuf {
    dirs::config_dir()
        .unwrap_or_else(|| dirs::data_local_dir().unwrap_or_else(|| PathBuf::from(".")))
        .join("mixtape")
        .join("config.json")
}
