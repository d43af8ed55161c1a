//! Module to find playlist exports in the file system

use walkdir::WalkDir;

use std::path::{Path, PathBuf};

use log::warn;

use crate::{
    playlist::{PLAYLIST_EXTENSION, PlaylistFile},
    storage::error::StorageError,
};

pub fn is_playlist_file(path: &Path) -> bool {
    path.extension()
        .and_then(|ext| ext.to_str())
        .map(|ext| ext.eq_ignore_ascii_case(PLAYLIST_EXTENSION))
        .unwrap_or(false)
}

/// Lists the direct children of `dir`, sorted by file name.
///
/// Unreadable entries are logged and skipped.
pub fn list_dir(dir: &Path) -> Result<Vec<PathBuf>, StorageError> {
    if !dir.exists() {
        return Err(StorageError::MissingDir(dir.to_path_buf()));
    }
    if !dir.is_dir() {
        return Err(StorageError::NotADirectory(dir.to_path_buf()));
    }
    let dir_str = dir.to_string_lossy();

    let entries = WalkDir::new(dir)
        .min_depth(1)
        .max_depth(1)
        .sort_by_file_name()
        .into_iter()
        .filter_map(|e| match e {
            Ok(e) => Some(e.into_path()),
            Err(err) => {
                warn!("error while listing dir {dir_str}, skipping an entry: {err}");
                None
            }
        })
        .collect();

    Ok(entries)
}

/// Playlist exports directly inside `dir`, in ascending file name order.
///
/// The order is user visible: it decides processing order and therefore the
/// order of log lines and failure records.
pub fn discover_playlists(dir: &Path) -> Result<Vec<PlaylistFile>, StorageError> {
    Ok(list_dir(dir)?
        .into_iter()
        .filter(|p| p.is_file() && is_playlist_file(p))
        .map(PlaylistFile::new)
        .collect())
}

#[cfg(test)]
mod tests {
    use tempfile::TempDir;

    use super::*;

    #[test]
    fn discover_sorts_by_name_and_ignores_other_files() {
        let tmp = TempDir::new().unwrap();
        let root = tmp.path();

        std::fs::write(root.join("b.csv"), b"").unwrap();
        std::fs::write(root.join("a.csv"), b"").unwrap();
        std::fs::write(root.join("C.CSV"), b"").unwrap();
        std::fs::write(root.join("notes.txt"), b"").unwrap();
        std::fs::create_dir(root.join("dir.csv")).unwrap();
        std::fs::create_dir(root.join("nested")).unwrap();
        std::fs::write(root.join("nested").join("deep.csv"), b"").unwrap();

        let playlists = discover_playlists(root).unwrap();

        let names: Vec<_> = playlists.iter().map(|p| p.name()).collect();
        // byte order: upper case sorts first
        assert_eq!(names, vec!["C", "a", "b"]);
    }

    #[test]
    fn discover_fails_on_missing_dir() {
        let tmp = TempDir::new().unwrap();

        let err = discover_playlists(&tmp.path().join("playlists")).unwrap_err();

        assert!(matches!(err, StorageError::MissingDir(_)));
    }

    #[test]
    fn playlist_extension_is_case_insensitive() {
        assert!(is_playlist_file(Path::new("Liked_Songs.csv")));
        assert!(is_playlist_file(Path::new("x.Csv")));
        assert!(!is_playlist_file(Path::new("x.tsv")));
        assert!(!is_playlist_file(Path::new("csv")));
    }
}
