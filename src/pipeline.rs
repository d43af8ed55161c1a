//! Turns a directory of playlist exports into downloaded, tagged MP3 files.
//!
//! Playlists are processed in file name order and rows in file order, one
//! track at a time. Every track ends in exactly one of three states:
//! skipped (its file already exists), done, or failed. Track failures are
//! recorded in the [`RunSummary`] and never stop the run; a playlist that
//! cannot be read at all is recorded as a file error and the run moves on to
//! the next file.

use std::{
    fmt::Display,
    path::{Path, PathBuf},
};

use log::{debug, error, info, warn};
use thiserror::Error;

use crate::{
    config::{Columns, Config, ConfigError},
    domain::track::{Bitrate, TrackDescriptor},
    fetch::{Fetcher, Staging, ToolError, TrackError, Transcoder},
    playlist::{PlaylistFile, RowError},
    storage::{OutputDir, OutputFile, error::StorageError, fs::discover_playlists},
    tagging::{TagStatus, Tagger},
};

/// Errors that abort the whole run
#[derive(Debug, Error)]
pub enum PipelineError {
    #[error("cannot read playlists: {0}")]
    Playlists(StorageError),

    #[error("cannot use output directory: {0}")]
    Output(StorageError),

    #[error("required tool unavailable: {0}")]
    Tool(#[from] ToolError),
}

/// Immutable settings of one run.
#[derive(Debug, Clone)]
pub struct PipelineConfig {
    pub playlists_dir: PathBuf,
    pub output: OutputDir,
    pub bitrate: Bitrate,
    pub columns: Columns,
}

impl PipelineConfig {
    pub fn from_config(config: &Config) -> Result<Self, ConfigError> {
        config.validate()?;
        Ok(Self {
            playlists_dir: config.playlists_dir.clone(),
            output: OutputDir::new(&config.output_dir),
            bitrate: config.bitrate()?,
            columns: config.columns.clone(),
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TrackState {
    Pending,
    Skipped,
    Fetching,
    Transcoding,
    Tagging,
    Done,
    Failed,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureKind {
    RowParse,
    NotFound,
    Fetch,
    Transcode,
}

impl From<&TrackError> for FailureKind {
    fn from(err: &TrackError) -> Self {
        match err {
            TrackError::NotFound { .. } => FailureKind::NotFound,
            TrackError::Fetch(_) => FailureKind::Fetch,
            TrackError::Transcode(_) => FailureKind::Transcode,
        }
    }
}

impl Display for FailureKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            FailureKind::RowParse => "row-parse",
            FailureKind::NotFound => "not-found",
            FailureKind::Fetch => "fetch-error",
            FailureKind::Transcode => "transcode-error",
        };
        f.write_str(name)
    }
}

/// One entry that needs manual attention
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FailureRecord {
    pub playlist: String,
    /// 1-based data row
    pub row: usize,
    /// `artist - title`, absent when the row could not be parsed
    pub track: Option<String>,
    pub kind: FailureKind,
    pub reason: String,
}

impl Display for FailureRecord {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "[{} row {}] ", self.playlist, self.row)?;
        if let Some(track) = &self.track {
            write!(f, "{track}: ")?;
        }
        write!(f, "{}: {}", self.kind, self.reason)
    }
}

/// A playlist file that could not be processed at all
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileFailure {
    pub path: PathBuf,
    pub reason: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RunSummary {
    pub processed: usize,
    pub skipped: usize,
    pub failed: usize,
    /// Processed tracks whose tags or artwork could not be written
    pub tag_warnings: usize,
    /// In playlist order, then row order
    pub failures: Vec<FailureRecord>,
    pub file_errors: Vec<FileFailure>,
}

impl RunSummary {
    pub fn has_file_errors(&self) -> bool {
        !self.file_errors.is_empty()
    }

    pub fn total(&self) -> usize {
        self.processed + self.skipped + self.failed
    }

    fn record_row_error(&mut self, playlist: &str, err: &RowError) {
        self.failed += 1;
        self.failures.push(FailureRecord {
            playlist: playlist.to_string(),
            row: err.row,
            track: None,
            kind: FailureKind::RowParse,
            reason: err.kind.to_string(),
        });
    }

    fn record(&mut self, playlist: &str, row: usize, track: &TrackDescriptor, outcome: &TrackOutcome) {
        match outcome {
            TrackOutcome::Skipped(_) => self.skipped += 1,
            TrackOutcome::Done(file) => {
                self.processed += 1;
                match &file.tags {
                    TagStatus::Failed(_) => self.tag_warnings += 1,
                    TagStatus::Written(report) if report.artwork_warning.is_some() => {
                        self.tag_warnings += 1
                    }
                    _ => {}
                }
            }
            TrackOutcome::Failed(err) => {
                self.failed += 1;
                self.failures.push(FailureRecord {
                    playlist: playlist.to_string(),
                    row,
                    track: Some(track.to_string()),
                    kind: err.into(),
                    reason: err.to_string(),
                });
            }
        }
    }
}

impl Display for RunSummary {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "processed: {}, skipped: {}, failed: {}",
            self.processed, self.skipped, self.failed
        )?;
        if self.tag_warnings > 0 {
            write!(f, " ({} with incomplete tags)", self.tag_warnings)?;
        }
        if !self.failures.is_empty() {
            write!(f, "\nfailed tracks:")?;
            for failure in &self.failures {
                write!(f, "\n  {failure}")?;
            }
        }
        if !self.file_errors.is_empty() {
            write!(f, "\nunreadable playlists:")?;
            for failure in &self.file_errors {
                write!(f, "\n  {}: {}", failure.path.display(), failure.reason)?;
            }
        }
        Ok(())
    }
}

/// Terminal state of one track
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TrackOutcome {
    Skipped(PathBuf),
    Done(OutputFile),
    Failed(TrackError),
}

pub struct Pipeline<F, T, G> {
    config: PipelineConfig,
    fetcher: F,
    transcoder: T,
    tagger: Option<G>,
}

impl<F: Fetcher, T: Transcoder, G: Tagger> Pipeline<F, T, G> {
    /// Tagging is skipped entirely when `tagger` is `None`.
    pub fn new(config: PipelineConfig, fetcher: F, transcoder: T, tagger: Option<G>) -> Self {
        Self {
            config,
            fetcher,
            transcoder,
            tagger,
        }
    }

    pub fn run(&self) -> Result<RunSummary, PipelineError> {
        self.fetcher.preflight()?;
        self.transcoder.preflight()?;

        let playlists =
            discover_playlists(&self.config.playlists_dir).map_err(PipelineError::Playlists)?;
        self.config.output.prepare().map_err(PipelineError::Output)?;

        if playlists.is_empty() {
            warn!(
                "no playlist files found in {}",
                self.config.playlists_dir.display()
            );
        } else {
            info!(
                "found {} playlist file(s) in {}, saving to {} at {}",
                playlists.len(),
                self.config.playlists_dir.display(),
                self.config.output.root().display(),
                self.config.bitrate
            );
        }

        let mut summary = RunSummary::default();
        for playlist in &playlists {
            self.run_playlist(playlist, &mut summary);
        }

        info!("run finished, {} tracks seen, {summary}", summary.total());
        Ok(summary)
    }

    fn run_playlist(&self, playlist: &PlaylistFile, summary: &mut RunSummary) {
        let name = playlist.name();
        info!("processing playlist {name}");

        let rows = match playlist.rows(&self.config.columns) {
            Ok(rows) => rows,
            Err(err) => {
                error!("skipping playlist {name}: {err}");
                summary.file_errors.push(FileFailure {
                    path: playlist.path().to_path_buf(),
                    reason: err.to_string(),
                });
                return;
            }
        };

        for (idx, row) in rows.enumerate() {
            let row_no = idx + 1;
            match row {
                Ok(track) => {
                    let outcome = self.process_track(&track);
                    log_outcome(&name, row_no, &track, &outcome);
                    summary.record(&name, row_no, &track, &outcome);
                }
                Err(err) => {
                    warn!("[{name}] skipping {err}");
                    summary.record_row_error(&name, &err);
                }
            }
        }
    }

    /// Runs one track through skip-check, fetch, transcode and tagging.
    pub fn process_track(&self, track: &TrackDescriptor) -> TrackOutcome {
        transition(track, TrackState::Pending);
        let target = self.config.output.canonical_path(track);

        if self.config.output.exists(&target) {
            transition(track, TrackState::Skipped);
            return TrackOutcome::Skipped(target);
        }

        match self.download(track, &target) {
            Ok(mut file) => {
                file.tags = self.write_tags(&file.path, track);
                transition(track, TrackState::Done);
                TrackOutcome::Done(file)
            }
            Err(err) => {
                transition(track, TrackState::Failed);
                TrackOutcome::Failed(err)
            }
        }
    }

    fn download(&self, track: &TrackDescriptor, target: &Path) -> Result<OutputFile, TrackError> {
        let staging = Staging::new(&self.config.output)?;

        transition(track, TrackState::Fetching);
        let raw = self.fetcher.fetch(track, staging.workdir())?;
        info!(
            "{track}: matched \"{}\" ({})",
            raw.source_title.as_deref().unwrap_or("untitled"),
            raw.source_url.as_deref().unwrap_or("unknown source")
        );
        debug!("{track}: fetched {}", raw.path.display());

        transition(track, TrackState::Transcoding);
        let produced = staging.transcode_target();
        self.transcoder
            .transcode(&raw, &produced, self.config.bitrate)?;

        staging.publish(&produced, target)
    }

    fn write_tags(&self, path: &Path, track: &TrackDescriptor) -> TagStatus {
        let Some(tagger) = &self.tagger else {
            return TagStatus::NotAttempted;
        };
        transition(track, TrackState::Tagging);
        match tagger.tag(path, track) {
            Ok(report) => {
                info!("{track}: tagged {report}");
                TagStatus::Written(report)
            }
            Err(err) => {
                warn!("{track}: downloaded but untagged, {err}");
                TagStatus::Failed(err.to_string())
            }
        }
    }
}

fn transition(track: &TrackDescriptor, state: TrackState) {
    debug!("{track}: {state:?}");
}

fn log_outcome(playlist: &str, row: usize, track: &TrackDescriptor, outcome: &TrackOutcome) {
    match outcome {
        TrackOutcome::Skipped(path) => {
            info!("[{playlist} row {row}] skipped {track}, {} exists", path.display())
        }
        TrackOutcome::Done(file) => {
            info!("[{playlist} row {row}] downloaded {track} to {}", file.path.display())
        }
        TrackOutcome::Failed(err) => {
            warn!("[{playlist} row {row}] failed {track}: {err}")
        }
    }
}

/// What a run would do for one playlist
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PlaylistPlan {
    pub name: String,
    pub present: usize,
    pub pending: usize,
    pub row_errors: usize,
    /// Set when the file cannot be read at all
    pub error: Option<String>,
}

/// Dry run: parses every playlist and checks which tracks already exist.
/// Nothing is downloaded and the output directory is not created.
pub fn plan(config: &PipelineConfig) -> Result<Vec<PlaylistPlan>, PipelineError> {
    let playlists = discover_playlists(&config.playlists_dir).map_err(PipelineError::Playlists)?;

    Ok(playlists
        .iter()
        .map(|playlist| {
            let mut entry = PlaylistPlan {
                name: playlist.name(),
                ..Default::default()
            };
            match playlist.rows(&config.columns) {
                Ok(rows) => {
                    for row in rows {
                        match row {
                            Ok(track) => {
                                if config.output.exists(&config.output.canonical_path(&track)) {
                                    entry.present += 1;
                                } else {
                                    entry.pending += 1;
                                }
                            }
                            Err(_) => entry.row_errors += 1,
                        }
                    }
                }
                Err(err) => entry.error = Some(err.to_string()),
            }
            entry
        })
        .collect())
}
