use anyhow::Context;
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;

use crate::domain::track::Bitrate;

/// Name of the config file picked up from the working directory when
/// `--config` is not given.
pub const DEFAULT_CONFIG_FILE: &str = "playlist-dl.toml";

#[derive(Debug, Deserialize, Clone, PartialEq)]
#[serde(default)]
pub struct Config {
    pub playlists_dir: PathBuf,
    pub output_dir: PathBuf,
    pub logs_dir: PathBuf,
    pub bitrate_kbps: u32,
    pub columns: Columns,
    pub tools: Tools,
    pub tagging: Tagging,
    pub spotify: Spotify,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            playlists_dir: PathBuf::from("playlists"),
            output_dir: PathBuf::from("my_music"),
            logs_dir: PathBuf::from("logs"),
            bitrate_kbps: Bitrate::DEFAULT.kbps(),
            columns: Columns::default(),
            tools: Tools::default(),
            tagging: Tagging::default(),
            spotify: Spotify::default(),
        }
    }
}

/// Header names of the playlist export.
#[derive(Debug, Deserialize, Clone, PartialEq, Eq)]
#[serde(default)]
pub struct Columns {
    pub title: String,
    pub artist: String,
    pub album: String,
    pub release_date: String,
    pub artwork: String,
}

impl Default for Columns {
    fn default() -> Self {
        Self {
            title: "Track Name".to_string(),
            artist: "Artist Name(s)".to_string(),
            album: "Album Name".to_string(),
            release_date: "Album Release Date".to_string(),
            artwork: "Album Image URL".to_string(),
        }
    }
}

#[derive(Debug, Deserialize, Clone, PartialEq, Eq)]
#[serde(default)]
pub struct Tools {
    pub yt_dlp: PathBuf,
    pub ffmpeg: PathBuf,
    /// Appended to `artist title` when searching
    pub search_suffix: String,
    pub artwork_timeout_secs: u64,
}

impl Default for Tools {
    fn default() -> Self {
        Self {
            yt_dlp: PathBuf::from("yt-dlp"),
            ffmpeg: PathBuf::from("ffmpeg"),
            search_suffix: "audio".to_string(),
            artwork_timeout_secs: 30,
        }
    }
}

impl Tools {
    pub fn artwork_timeout(&self) -> Duration {
        Duration::from_secs(self.artwork_timeout_secs)
    }
}

#[derive(Debug, Deserialize, Clone, PartialEq, Eq)]
#[serde(default)]
pub struct Tagging {
    pub enabled: bool,
    pub embed_artwork: bool,
}

impl Default for Tagging {
    fn default() -> Self {
        Self {
            enabled: true,
            embed_artwork: true,
        }
    }
}

/// Web API application used by the `export` command.
#[derive(Debug, Deserialize, Clone, PartialEq, Eq)]
#[serde(default)]
pub struct Spotify {
    pub client_id: Option<String>,
    pub client_secret: Option<String>,
    /// Must be registered for the application; the callback listener binds
    /// to its host and port.
    pub redirect_uri: String,
    pub auth_timeout_secs: u64,
    pub request_timeout_secs: u64,
}

impl Default for Spotify {
    fn default() -> Self {
        Self {
            client_id: None,
            client_secret: None,
            redirect_uri: "http://127.0.0.1:8888/callback".to_string(),
            auth_timeout_secs: 300,
            request_timeout_secs: 30,
        }
    }
}

pub const CLIENT_ID_ENV: &str = "SPOTIFY_CLIENT_ID";
pub const CLIENT_SECRET_ENV: &str = "SPOTIFY_CLIENT_SECRET";

impl Spotify {
    /// Client id and secret, each from the file or else from the environment.
    pub fn credentials(&self) -> Result<(String, String), ConfigError> {
        let id = credential(&self.client_id, CLIENT_ID_ENV)
            .ok_or(ConfigError::MissingCredential(CLIENT_ID_ENV))?;
        let secret = credential(&self.client_secret, CLIENT_SECRET_ENV)
            .ok_or(ConfigError::MissingCredential(CLIENT_SECRET_ENV))?;
        Ok((id, secret))
    }

    pub fn auth_timeout(&self) -> Duration {
        Duration::from_secs(self.auth_timeout_secs)
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }
}

fn credential(configured: &Option<String>, env: &str) -> Option<String> {
    let non_blank = |v: &str| Some(v.trim().to_string()).filter(|v| !v.is_empty());
    configured
        .as_deref()
        .and_then(non_blank)
        .or_else(|| std::env::var(env).ok().as_deref().and_then(non_blank))
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("unsupported MP3 bitrate {0} kbps")]
    InvalidBitrate(u32),

    #[error("column mapping for {0} is empty")]
    EmptyColumn(&'static str),

    #[error("no Spotify credential configured, set [spotify] in the config or {0}")]
    MissingCredential(&'static str),
}

/// Values given on the command line, applied on top of the file.
#[derive(Debug, Default, Clone)]
pub struct Overrides {
    pub playlists_dir: Option<PathBuf>,
    pub output_dir: Option<PathBuf>,
    pub logs_dir: Option<PathBuf>,
    pub bitrate_kbps: Option<u32>,
}

impl Config {
    pub fn load(path: &Path) -> anyhow::Result<Config> {
        let contents = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config {}", path.display()))?;
        toml::from_str(&contents).with_context(|| "Failed to parse config TOML")
    }

    /// Loads the explicit config, or the default file if present, or defaults.
    pub fn resolve(explicit: Option<&Path>) -> anyhow::Result<Config> {
        match explicit {
            Some(path) => Self::load(path),
            None => {
                let default_path = Path::new(DEFAULT_CONFIG_FILE);
                if default_path.is_file() {
                    Self::load(default_path)
                } else {
                    Ok(Config::default())
                }
            }
        }
    }

    pub fn apply(mut self, overrides: Overrides) -> Self {
        if let Some(dir) = overrides.playlists_dir {
            self.playlists_dir = dir;
        }
        if let Some(dir) = overrides.output_dir {
            self.output_dir = dir;
        }
        if let Some(dir) = overrides.logs_dir {
            self.logs_dir = dir;
        }
        if let Some(kbps) = overrides.bitrate_kbps {
            self.bitrate_kbps = kbps;
        }
        self
    }

    pub fn bitrate(&self) -> Result<Bitrate, ConfigError> {
        Bitrate::from_kbps(self.bitrate_kbps).ok_or(ConfigError::InvalidBitrate(self.bitrate_kbps))
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        self.bitrate()?;
        if self.columns.title.trim().is_empty() {
            return Err(ConfigError::EmptyColumn("title"));
        }
        if self.columns.artist.trim().is_empty() {
            return Err(ConfigError::EmptyColumn("artist"));
        }
        Ok(())
    }
}
