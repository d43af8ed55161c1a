//! MP3 encoding through the `ffmpeg` command line tool.

use std::{
    path::{Path, PathBuf},
    process::Command,
};

use log::info;

use crate::{
    domain::track::Bitrate,
    fetch::{
        RawAudio, ToolError, TrackError, Transcoder,
        process::{self, stderr_tail},
    },
};

pub struct FfmpegTranscoder {
    program: PathBuf,
}

impl FfmpegTranscoder {
    pub fn new<P: AsRef<Path>>(program: P) -> Self {
        Self {
            program: program.as_ref().to_path_buf(),
        }
    }

    fn command(&self, source: &Path, target: &Path, bitrate: Bitrate) -> Command {
        let mut cmd = Command::new(&self.program);
        cmd.args(["-hide_banner", "-nostdin", "-loglevel", "error", "-y"])
            .arg("-i")
            .arg(source)
            // audio only, and no tags inherited from the source
            .args(["-vn", "-map_metadata", "-1"])
            .args(["-codec:a", "libmp3lame", "-b:a"])
            .arg(bitrate.as_ffmpeg_arg())
            .args(["-f", "mp3"])
            .arg(target);
        cmd
    }
}

impl Transcoder for FfmpegTranscoder {
    fn transcode(
        &self,
        source: &RawAudio,
        target: &Path,
        bitrate: Bitrate,
    ) -> Result<(), TrackError> {
        let output = process::run(&self.program, &mut self.command(&source.path, target, bitrate))
            .map_err(|e| TrackError::Transcode(e.to_string()))?;

        if !output.status.success() {
            // ffmpeg may leave a truncated file behind
            let _ = std::fs::remove_file(target);
            return Err(TrackError::Transcode(stderr_tail(&output.stderr)));
        }
        Ok(())
    }

    fn preflight(&self) -> Result<(), ToolError> {
        let version = process::version(&self.program, "-version")?;
        info!("using {version}");
        Ok(())
    }
}
