//! The output directory: where tracks land and how presence is checked.

use std::path::{Path, PathBuf};

use log::{debug, warn};
use tempfile::TempDir;

use crate::{
    domain::{identity::canonical_file_name, track::TrackDescriptor},
    storage::error::StorageError,
    tagging::TagStatus,
};

pub mod error;
pub mod fs;

/// Prefix of per-track staging directories inside the output directory
pub const STAGING_PREFIX: &str = ".playlist-dl-";

/// Flat directory of `.mp3` files, one per canonical (artist, title).
#[derive(Debug, Clone)]
pub struct OutputDir {
    root: PathBuf,
}

/// A track file in the output directory.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutputFile {
    pub path: PathBuf,
    pub tags: TagStatus,
}

impl OutputFile {
    pub fn published(path: PathBuf) -> Self {
        Self {
            path,
            tags: TagStatus::NotAttempted,
        }
    }
}

impl OutputDir {
    pub fn new<P: AsRef<Path>>(root: P) -> Self {
        Self {
            root: root.as_ref().to_path_buf(),
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Where the track is stored. Depends on artist and title only.
    pub fn canonical_path(&self, track: &TrackDescriptor) -> PathBuf {
        self.root.join(canonical_file_name(track))
    }

    /// Direct presence check, the sole deduplication mechanism.
    pub fn exists(&self, path: &Path) -> bool {
        path.exists()
    }

    /// Creates the directory if needed, verifies it accepts new files and
    /// removes staging leftovers of interrupted runs.
    pub fn prepare(&self) -> Result<(), StorageError> {
        if self.root.exists() && !self.root.is_dir() {
            return Err(StorageError::NotADirectory(self.root.clone()));
        }
        std::fs::create_dir_all(&self.root).map_err(|source| StorageError::NotWritable {
            path: self.root.clone(),
            source,
        })?;

        // the writability check file is removed on drop
        tempfile::Builder::new()
            .prefix(STAGING_PREFIX)
            .tempfile_in(&self.root)
            .map_err(|source| StorageError::NotWritable {
                path: self.root.clone(),
                source,
            })?;

        let removed = self.clean_stale_staging()?;
        if removed > 0 {
            warn!(
                "removed {removed} leftover staging entries from {}",
                self.root.display()
            );
        }
        Ok(())
    }

    /// Fresh staging directory on the same filesystem as the final files, so
    /// publishing is a rename. Deleted with everything inside when dropped.
    pub fn staging(&self) -> Result<TempDir, StorageError> {
        let dir = tempfile::Builder::new()
            .prefix(STAGING_PREFIX)
            .tempdir_in(&self.root)?;
        debug!("staging in {}", dir.path().display());
        Ok(dir)
    }

    fn clean_stale_staging(&self) -> Result<usize, StorageError> {
        let mut removed = 0;
        for entry in fs::list_dir(&self.root)? {
            let is_staging = entry
                .file_name()
                .and_then(|n| n.to_str())
                .is_some_and(|n| n.starts_with(STAGING_PREFIX));
            if !is_staging {
                continue;
            }
            let result = if entry.is_dir() {
                std::fs::remove_dir_all(&entry)
            } else {
                std::fs::remove_file(&entry)
            };
            match result {
                Ok(()) => removed += 1,
                Err(err) => warn!("cannot remove stale {}: {err}", entry.display()),
            }
        }
        Ok(removed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn track(artist: &str, title: &str) -> TrackDescriptor {
        TrackDescriptor::new(title, artist, None, None, None).unwrap()
    }

    #[test]
    fn test_canonical_path_joins_output_dir() {
        let out = OutputDir::new("/music");

        let path = out.canonical_path(&track("Band", "Song"));

        assert_eq!(path, PathBuf::from("/music/band - song.mp3"));
        assert_eq!(path, out.canonical_path(&track("band ", " SONG")));
    }

    #[test]
    fn test_exists_follows_the_filesystem() -> anyhow::Result<()> {
        let tmp = TempDir::new()?;
        let out = OutputDir::new(tmp.path());
        let path = out.canonical_path(&track("Band", "Song"));

        assert!(!out.exists(&path));
        std::fs::write(&path, b"mp3")?;
        assert!(out.exists(&path));

        Ok(())
    }

    #[test]
    fn test_prepare_creates_dir_and_cleans_staging() -> anyhow::Result<()> {
        let tmp = TempDir::new()?;
        let root = tmp.path().join("nested").join("music");
        let out = OutputDir::new(&root);

        out.prepare()?;
        assert!(root.is_dir());

        let stale = root.join(format!("{STAGING_PREFIX}abc"));
        std::fs::create_dir(&stale)?;
        std::fs::write(stale.join("source.webm"), b"partial")?;
        std::fs::write(root.join("keep.mp3"), b"mp3")?;

        out.prepare()?;

        assert!(!stale.exists());
        assert!(root.join("keep.mp3").exists());
        assert_eq!(fs::list_dir(&root)?.len(), 1);

        Ok(())
    }

    #[test]
    fn test_prepare_rejects_file_as_output() -> anyhow::Result<()> {
        let tmp = TempDir::new()?;
        let file = tmp.path().join("music");
        std::fs::write(&file, b"")?;

        let err = OutputDir::new(&file).prepare().unwrap_err();

        assert!(matches!(err, StorageError::NotADirectory(_)));
        Ok(())
    }

    #[test]
    fn test_staging_is_removed_on_drop() -> anyhow::Result<()> {
        let tmp = TempDir::new()?;
        let out = OutputDir::new(tmp.path());

        let staging = out.staging()?;
        let staged = staging.path().to_path_buf();
        std::fs::write(staged.join("source.m4a"), b"audio")?;
        drop(staging);

        assert!(!staged.exists());
        Ok(())
    }
}
