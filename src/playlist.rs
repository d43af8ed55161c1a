//! Reading playlist exports.
//!
//! A playlist is a CSV file with a header row. Columns are located by header
//! name (see [`Columns`]), so exports with extra or reordered columns work.
//! Every call to [`PlaylistFile::rows`] reopens the file, which makes the
//! sequence restartable.

use std::{
    fs::File,
    path::{Path, PathBuf},
};

use csv::{StringRecord, StringRecordsIntoIter};
use thiserror::Error;

use crate::{
    config::Columns,
    domain::track::{InvalidTrack, TrackDescriptor},
};

pub const PLAYLIST_EXTENSION: &str = "csv";

/// Errors that make a whole playlist file unusable
#[derive(Debug, Error)]
pub enum PlaylistError {
    #[error("cannot open {path}: {source}")]
    Open { path: PathBuf, source: csv::Error },

    #[error("cannot read header of {path}: {source}")]
    Header { path: PathBuf, source: csv::Error },

    #[error("{path} has no '{column}' column")]
    MissingColumn { path: PathBuf, column: String },
}

#[derive(Debug, Error)]
#[error("row {row}: {kind}")]
pub struct RowError {
    /// 1-based index among data rows (the header is not counted)
    pub row: usize,
    pub kind: RowErrorKind,
}

#[derive(Debug, Error)]
pub enum RowErrorKind {
    #[error("malformed row: {0}")]
    Malformed(#[from] csv::Error),

    #[error("missing value for '{0}'")]
    MissingField(String),

    #[error(transparent)]
    Invalid(#[from] InvalidTrack),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PlaylistFile {
    path: PathBuf,
}

impl PlaylistFile {
    pub fn new<P: AsRef<Path>>(path: P) -> Self {
        Self {
            path: path.as_ref().to_path_buf(),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Display name, the file name without extension
    pub fn name(&self) -> String {
        self.path
            .file_stem()
            .map(|s| s.to_string_lossy().into_owned())
            .unwrap_or_else(|| self.path.to_string_lossy().into_owned())
    }

    /// Opens the file and returns a lazy iterator over its data rows.
    pub fn rows(&self, columns: &Columns) -> Result<PlaylistRows, PlaylistError> {
        let mut reader = csv::ReaderBuilder::new()
            .flexible(true)
            .trim(csv::Trim::All)
            .from_path(&self.path)
            .map_err(|source| PlaylistError::Open {
                path: self.path.clone(),
                source,
            })?;

        let headers = reader
            .headers()
            .map_err(|source| PlaylistError::Header {
                path: self.path.clone(),
                source,
            })?
            .clone();

        let layout = ColumnLayout::resolve(&headers, columns).map_err(|column| {
            PlaylistError::MissingColumn {
                path: self.path.clone(),
                column,
            }
        })?;

        Ok(PlaylistRows {
            records: reader.into_records(),
            layout,
            row: 0,
            done: false,
        })
    }
}

/// Column indices resolved from the header row
#[derive(Debug, Clone)]
struct ColumnLayout {
    title: (usize, String),
    artist: (usize, String),
    album: Option<usize>,
    release_date: Option<usize>,
    artwork: Option<usize>,
}

impl ColumnLayout {
    /// Fails with the name of the first required column that is absent.
    fn resolve(headers: &StringRecord, columns: &Columns) -> Result<Self, String> {
        let find = |name: &str| {
            let name = name.trim();
            headers
                .iter()
                .position(|h| h.trim_start_matches('\u{feff}').trim() == name)
        };
        let required = |name: &str| {
            find(name)
                .map(|idx| (idx, name.trim().to_string()))
                .ok_or_else(|| name.trim().to_string())
        };

        Ok(Self {
            title: required(&columns.title)?,
            artist: required(&columns.artist)?,
            album: find(&columns.album),
            release_date: find(&columns.release_date),
            artwork: find(&columns.artwork),
        })
    }

    fn track(&self, record: &StringRecord) -> Result<TrackDescriptor, RowErrorKind> {
        let required = |(idx, name): &(usize, String)| {
            record
                .get(*idx)
                .ok_or_else(|| RowErrorKind::MissingField(name.clone()))
        };
        let optional = |idx: Option<usize>| idx.and_then(|i| record.get(i));

        let title = required(&self.title)?;
        let artist = required(&self.artist)?;
        let year = optional(self.release_date).and_then(parse_release_year);

        Ok(TrackDescriptor::new(
            title,
            artist,
            optional(self.album),
            year,
            optional(self.artwork),
        )?)
    }
}

pub struct PlaylistRows {
    records: StringRecordsIntoIter<File>,
    layout: ColumnLayout,
    row: usize,
    done: bool,
}

impl Iterator for PlaylistRows {
    type Item = Result<TrackDescriptor, RowError>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.done {
            return None;
        }
        let record = self.records.next()?;
        self.row += 1;
        let row = self.row;

        let result = match record {
            Ok(record) => self.layout.track(&record),
            Err(err) => {
                // an I/O failure would repeat on every following read
                if matches!(err.kind(), csv::ErrorKind::Io(_)) {
                    self.done = true;
                }
                Err(RowErrorKind::Malformed(err))
            }
        };

        Some(result.map_err(|kind| RowError { row, kind }))
    }
}

/// Extracts the year from `YYYY`, `YYYY-MM` or `YYYY-MM-DD`.
///
/// Exports use `0000` for unknown dates, which yields `None`.
pub fn parse_release_year(date: &str) -> Option<i32> {
    let year = date.trim().split('-').next()?;
    if year.len() != 4 || !year.chars().all(|c| c.is_ascii_digit()) {
        return None;
    }
    year.parse().ok().filter(|y| *y >= 1000)
}
