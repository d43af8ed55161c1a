//! Getting audio for a track: search + download, then transcode to MP3.
//!
//! Both steps are external capabilities behind narrow traits so the pipeline
//! can run against fakes. All intermediate files live in a [`Staging`]
//! directory; the canonical path is only ever written by a rename of a
//! finished file.

use std::path::{Path, PathBuf};

use log::debug;
use tempfile::TempDir;
use thiserror::Error;

use crate::{
    domain::track::{Bitrate, TrackDescriptor},
    storage::{OutputDir, OutputFile},
};

pub mod ffmpeg;
mod process;
pub mod ytdlp;

pub use ffmpeg::FfmpegTranscoder;
pub use process::ToolError;
pub use ytdlp::YtDlpFetcher;

/// Per-track failures of the fetch and transcode steps. None of them stops
/// the run.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum TrackError {
    #[error("no search result for \"{query}\"")]
    NotFound { query: String },

    #[error("download failed: {0}")]
    Fetch(String),

    #[error("transcode failed: {0}")]
    Transcode(String),
}

/// Downloaded source audio, in whatever container the source provided.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawAudio {
    pub path: PathBuf,
    pub source_title: Option<String>,
    pub source_url: Option<String>,
}

pub trait Fetcher {
    /// Searches for the track and downloads the top result into `workdir`.
    fn fetch(&self, track: &TrackDescriptor, workdir: &Path) -> Result<RawAudio, TrackError>;

    /// Checks the capability is usable before any track is attempted.
    fn preflight(&self) -> Result<(), ToolError> {
        Ok(())
    }
}

pub trait Transcoder {
    /// Converts `source` into a constant bitrate MP3 at `target`.
    fn transcode(&self, source: &RawAudio, target: &Path, bitrate: Bitrate)
    -> Result<(), TrackError>;

    fn preflight(&self) -> Result<(), ToolError> {
        Ok(())
    }
}

impl<F: Fetcher + ?Sized> Fetcher for &F {
    fn fetch(&self, track: &TrackDescriptor, workdir: &Path) -> Result<RawAudio, TrackError> {
        (**self).fetch(track, workdir)
    }

    fn preflight(&self) -> Result<(), ToolError> {
        (**self).preflight()
    }
}

impl<T: Transcoder + ?Sized> Transcoder for &T {
    fn transcode(
        &self,
        source: &RawAudio,
        target: &Path,
        bitrate: Bitrate,
    ) -> Result<(), TrackError> {
        (**self).transcode(source, target, bitrate)
    }

    fn preflight(&self) -> Result<(), ToolError> {
        (**self).preflight()
    }
}

/// Scratch directory for one track, removed with its content on drop.
pub struct Staging {
    dir: TempDir,
}

impl Staging {
    pub fn new(output: &OutputDir) -> Result<Self, TrackError> {
        let dir = output
            .staging()
            .map_err(|e| TrackError::Fetch(format!("cannot create staging directory: {e}")))?;
        Ok(Self { dir })
    }

    /// Where the fetcher downloads to
    pub fn workdir(&self) -> &Path {
        self.dir.path()
    }

    /// Where the transcoder writes its result
    pub fn transcode_target(&self) -> PathBuf {
        self.dir.path().join("transcoded.mp3")
    }

    /// Moves the finished file onto `target` and discards the staging area.
    pub fn publish(self, produced: &Path, target: &Path) -> Result<OutputFile, TrackError> {
        let len = std::fs::metadata(produced).map(|m| m.len()).unwrap_or(0);
        if len == 0 {
            return Err(TrackError::Transcode(
                "transcoder produced no output".to_string(),
            ));
        }

        std::fs::rename(produced, target).map_err(|e| {
            TrackError::Transcode(format!("cannot move result to {}: {e}", target.display()))
        })?;
        debug!("published {} ({len} bytes)", target.display());

        Ok(OutputFile::published(target.to_path_buf()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_publish_moves_file_and_drops_staging() -> anyhow::Result<()> {
        let tmp = tempfile::TempDir::new()?;
        let out = OutputDir::new(tmp.path());
        let target = tmp.path().join("band - song.mp3");

        let staging = Staging::new(&out)?;
        let workdir = staging.workdir().to_path_buf();
        std::fs::write(workdir.join("source.webm"), b"raw")?;
        let produced = staging.transcode_target();
        std::fs::write(&produced, b"mp3 data")?;

        let file = staging.publish(&produced, &target)?;

        assert_eq!(file.path, target);
        assert!(file.path.is_file());
        assert_eq!(std::fs::read(&target)?, b"mp3 data");
        assert!(!workdir.exists());

        Ok(())
    }

    #[test]
    fn test_publish_rejects_missing_output() -> anyhow::Result<()> {
        let tmp = tempfile::TempDir::new()?;
        let out = OutputDir::new(tmp.path());
        let target = tmp.path().join("band - song.mp3");

        let staging = Staging::new(&out)?;
        let produced = staging.transcode_target();
        let err = staging.publish(&produced, &target).unwrap_err();

        assert!(matches!(err, TrackError::Transcode(_)));
        assert!(!target.exists());

        Ok(())
    }
}
