//! Search and download through the `yt-dlp` command line tool.

use std::{
    path::{Path, PathBuf},
    process::Command,
};

use log::{debug, info};
use serde::Deserialize;

use crate::{
    domain::track::TrackDescriptor,
    fetch::{
        Fetcher, RawAudio, ToolError, TrackError,
        process::{self, stderr_tail},
    },
};

/// File stem the download is saved under inside the staging directory
const SOURCE_STEM: &str = "source";

/// Suffixes of yt-dlp's in-progress files
const PARTIAL_SUFFIXES: &[&str] = &["part", "ytdl", "temp"];

pub struct YtDlpFetcher {
    program: PathBuf,
    search_suffix: String,
}

/// The subset of yt-dlp's info JSON that is logged
#[derive(Debug, Deserialize)]
struct SearchHit {
    id: Option<String>,
    title: Option<String>,
    webpage_url: Option<String>,
}

impl YtDlpFetcher {
    pub fn new<P: AsRef<Path>>(program: P, search_suffix: &str) -> Self {
        Self {
            program: program.as_ref().to_path_buf(),
            search_suffix: search_suffix.to_string(),
        }
    }

    fn command(&self, query: &str, workdir: &Path) -> Command {
        let mut cmd = Command::new(&self.program);
        cmd.arg(format!("ytsearch1:{query}"))
            .args(["--format", "bestaudio/best"])
            .args(["--no-playlist", "--no-progress", "--no-warnings"])
            // print the info JSON but still download
            .args(["--dump-json", "--no-simulate"])
            .arg("--output")
            .arg(workdir.join(format!("{SOURCE_STEM}.%(ext)s")));
        cmd
    }
}

impl Fetcher for YtDlpFetcher {
    fn fetch(&self, track: &TrackDescriptor, workdir: &Path) -> Result<RawAudio, TrackError> {
        let query = track.search_query(&self.search_suffix);
        debug!("searching \"{query}\"");

        let output = process::run(&self.program, &mut self.command(&query, workdir))
            .map_err(|e| TrackError::Fetch(e.to_string()))?;

        let stderr = stderr_tail(&output.stderr);
        if !output.status.success() {
            if is_no_results(&stderr) {
                return Err(TrackError::NotFound { query });
            }
            return Err(TrackError::Fetch(stderr));
        }

        let hit = parse_hit(&String::from_utf8_lossy(&output.stdout));
        let downloaded = find_download(workdir)
            .map_err(|e| TrackError::Fetch(format!("cannot inspect download directory: {e}")))?;

        match (hit, downloaded) {
            (hit, Some(path)) => {
                let (source_title, source_url) = hit
                    .map(|h| {
                        info!(
                            "matched \"{}\" ({})",
                            h.title.as_deref().unwrap_or("untitled"),
                            h.id.as_deref().unwrap_or("unknown id")
                        );
                        (h.title, h.webpage_url)
                    })
                    .unwrap_or_default();
                Ok(RawAudio {
                    path,
                    source_title,
                    source_url,
                })
            }
            (None, None) => Err(TrackError::NotFound { query }),
            (Some(_), None) => Err(TrackError::Fetch(format!(
                "a match was reported but nothing was downloaded: {stderr}"
            ))),
        }
    }

    fn preflight(&self) -> Result<(), ToolError> {
        let version = process::version(&self.program, "--version")?;
        info!("using {} {version}", self.program.display());
        Ok(())
    }
}

fn is_no_results(stderr: &str) -> bool {
    let lower = stderr.to_lowercase();
    lower.contains("no video results") || lower.contains("no results")
}

/// First info JSON object printed by yt-dlp, if any
fn parse_hit(stdout: &str) -> Option<SearchHit> {
    stdout
        .lines()
        .map(str::trim)
        .filter(|l| l.starts_with('{'))
        .find_map(|l| serde_json::from_str(l).ok())
}

/// The completed download in `workdir`, ignoring partial files.
fn find_download(workdir: &Path) -> std::io::Result<Option<PathBuf>> {
    let mut found = None;
    for entry in std::fs::read_dir(workdir)? {
        let path = entry?.path();
        let stem_matches = path.file_stem().and_then(|s| s.to_str()) == Some(SOURCE_STEM);
        let partial = path
            .extension()
            .and_then(|e| e.to_str())
            .is_some_and(|e| PARTIAL_SUFFIXES.contains(&e));
        if path.is_file() && stem_matches && !partial {
            found = Some(path);
        }
    }
    Ok(found)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_command_searches_top_result_into_workdir() {
        let fetcher = YtDlpFetcher::new("yt-dlp", "audio");
        let track = TrackDescriptor::new("Song", "Band", None, None, None).unwrap();

        let cmd = fetcher.command(&track.search_query("audio"), Path::new("/tmp/stage"));
        let args: Vec<_> = cmd.get_args().map(|a| a.to_string_lossy().into_owned()).collect();

        assert_eq!(cmd.get_program(), "yt-dlp");
        assert_eq!(args[0], "ytsearch1:Band Song audio");
        assert!(args.contains(&"bestaudio/best".to_string()));
        assert_eq!(args.last().unwrap(), "/tmp/stage/source.%(ext)s");
    }

    #[test]
    fn test_parse_hit_reads_first_json_line() {
        let stdout = "\n{\"id\":\"abc\",\"title\":\"Band - Song\",\"webpage_url\":\"https://www.youtube.com/watch?v=abc\",\"duration\":200}\n";

        let hit = parse_hit(stdout).unwrap();

        assert_eq!(hit.id.as_deref(), Some("abc"));
        assert_eq!(hit.title.as_deref(), Some("Band - Song"));
        assert!(parse_hit("").is_none());
        assert!(parse_hit("WARNING: something").is_none());
    }

    #[test]
    fn test_find_download_ignores_partial_files() -> anyhow::Result<()> {
        let tmp = tempfile::TempDir::new()?;
        std::fs::write(tmp.path().join("source.webm.part"), b"x")?;
        assert_eq!(find_download(tmp.path())?, None);

        std::fs::write(tmp.path().join("source.webm"), b"x")?;
        assert_eq!(find_download(tmp.path())?, Some(tmp.path().join("source.webm")));

        Ok(())
    }

    #[test]
    fn test_no_results_detection() {
        assert!(is_no_results("ERROR: [youtube:search] No video results"));
        assert!(!is_no_results("ERROR: unable to download video data: HTTP Error 403"));
    }
}
