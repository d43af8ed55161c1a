//! Exporting the user's Spotify library into playlist CSV files.
//!
//! Liked songs go to `Liked_Songs.csv`, every other playlist to a file named
//! after it. The files use the same column layout the `download` command
//! reads by default, so an export can be downloaded without any column
//! mapping.

use std::{
    collections::HashSet,
    path::{Path, PathBuf},
};

use log::{error, info, warn};
use serde::Serialize;
use thiserror::Error;

pub mod api;
pub mod auth;

use api::{ApiError, LibraryItem, PlaylistRef, SpotifyApi};

pub const LIKED_SONGS: &str = "Liked Songs";
const LIKED_SONGS_FILE: &str = "Liked_Songs.csv";

/// Separator for multi-valued cells such as artist lists
const LIST_SEPARATOR: &str = ", ";

#[derive(Debug, Error)]
pub enum ExportError {
    #[error(transparent)]
    Api(#[from] ApiError),

    #[error("cannot create export directory {path}: {source}")]
    Dir {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("cannot write {path}: {source}")]
    Write { path: PathBuf, source: csv::Error },
}

/// One exported row. Field order is the column order of the file.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct ExportRow {
    #[serde(rename = "Track URI")]
    pub track_uri: String,
    #[serde(rename = "Track Name")]
    pub track_name: String,
    #[serde(rename = "Artist URI(s)")]
    pub artist_uris: String,
    #[serde(rename = "Artist Name(s)")]
    pub artist_names: String,
    #[serde(rename = "Album URI")]
    pub album_uri: String,
    #[serde(rename = "Album Name")]
    pub album_name: String,
    #[serde(rename = "Album Artist URI(s)")]
    pub album_artist_uris: String,
    #[serde(rename = "Album Artist Name(s)")]
    pub album_artist_names: String,
    #[serde(rename = "Album Release Date")]
    pub album_release_date: String,
    #[serde(rename = "Album Image URL")]
    pub album_image_url: String,
    #[serde(rename = "Disc Number")]
    pub disc_number: Option<u32>,
    #[serde(rename = "Track Number")]
    pub track_number: Option<u32>,
    #[serde(rename = "Track Duration (ms)")]
    pub duration_ms: Option<u64>,
    #[serde(rename = "Track Preview URL")]
    pub preview_url: String,
    #[serde(rename = "Explicit")]
    pub explicit: bool,
    #[serde(rename = "Popularity")]
    pub popularity: Option<u32>,
    #[serde(rename = "ISRC")]
    pub isrc: String,
    #[serde(rename = "Added By")]
    pub added_by: String,
    #[serde(rename = "Added At")]
    pub added_at: String,
    #[serde(rename = "Playlist Name")]
    pub playlist_name: String,
}

impl ExportRow {
    /// `None` for unavailable entries and for podcast episodes.
    pub fn from_item(item: &LibraryItem, playlist: &str) -> Option<Self> {
        let track = item.track.as_ref().filter(|t| t.is_music())?;
        let album = track.album.clone().unwrap_or_default();

        Some(Self {
            track_uri: track.uri.clone(),
            track_name: track.name.clone(),
            artist_uris: join(track.artists.iter().map(|a| a.uri.as_str())),
            artist_names: join(track.artists.iter().map(|a| a.name.as_str())),
            album_uri: album.uri,
            album_name: album.name,
            album_artist_uris: join(album.artists.iter().map(|a| a.uri.as_str())),
            album_artist_names: join(album.artists.iter().map(|a| a.name.as_str())),
            album_release_date: album.release_date.unwrap_or_default(),
            album_image_url: album
                .images
                .first()
                .map(|image| image.url.clone())
                .unwrap_or_default(),
            disc_number: track.disc_number,
            track_number: track.track_number,
            duration_ms: track.duration_ms,
            preview_url: track.preview_url.clone().unwrap_or_default(),
            explicit: track.explicit,
            popularity: track.popularity,
            isrc: track
                .external_ids
                .as_ref()
                .and_then(|ids| ids.isrc.clone())
                .unwrap_or_default(),
            added_by: item
                .added_by
                .as_ref()
                .map(|user| user.id.clone())
                .unwrap_or_default(),
            added_at: item.added_at.clone().unwrap_or_default(),
            playlist_name: playlist.to_string(),
        })
    }
}

fn join<'a>(values: impl Iterator<Item = &'a str>) -> String {
    values.collect::<Vec<_>>().join(LIST_SEPARATOR)
}

/// A playlist written to disk
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExportedPlaylist {
    pub name: String,
    pub path: PathBuf,
    pub rows: usize,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ExportSummary {
    pub written: Vec<ExportedPlaylist>,
    /// Playlists without exportable tracks; no file is written for them
    pub empty: Vec<String>,
    /// Playlists whose tracks could not be fetched, with the reason
    pub failed: Vec<(String, String)>,
}

impl ExportSummary {
    pub fn has_failures(&self) -> bool {
        !self.failed.is_empty()
    }
}

impl std::fmt::Display for ExportSummary {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "exported: {}, empty: {}, failed: {}",
            self.written.len(),
            self.empty.len(),
            self.failed.len()
        )?;
        for playlist in &self.written {
            write!(
                f,
                "\n  {}: {} tracks in {}",
                playlist.name,
                playlist.rows,
                playlist.path.display()
            )?;
        }
        for (name, reason) in &self.failed {
            write!(f, "\n  [FAILED] {name}: {reason}")?;
        }
        Ok(())
    }
}

/// File name for a playlist: letters, digits, spaces, `-` and `_` only.
pub fn playlist_file_name(name: &str) -> Option<String> {
    let safe: String = name
        .chars()
        .filter(|c| c.is_alphanumeric() || matches!(c, ' ' | '-' | '_'))
        .collect();
    let safe = safe.trim();
    (!safe.is_empty()).then(|| format!("{safe}.csv"))
}

pub struct Exporter<A> {
    api: A,
    dir: PathBuf,
}

impl<A: SpotifyApi> Exporter<A> {
    pub fn new<P: AsRef<Path>>(api: A, dir: P) -> Self {
        Self {
            api,
            dir: dir.as_ref().to_path_buf(),
        }
    }

    /// Writes liked songs, then every playlist. A playlist whose tracks
    /// cannot be fetched is recorded and skipped.
    pub fn run(&self) -> Result<ExportSummary, ExportError> {
        std::fs::create_dir_all(&self.dir).map_err(|source| ExportError::Dir {
            path: self.dir.clone(),
            source,
        })?;

        let user = self.api.current_user()?;
        info!(
            "logged in as {}",
            user.display_name.as_deref().unwrap_or(&user.id)
        );

        let mut summary = ExportSummary::default();
        let mut used = HashSet::from([LIKED_SONGS_FILE.to_lowercase()]);

        info!("fetching liked songs");
        let liked = self.api.saved_tracks()?;
        self.write(LIKED_SONGS, LIKED_SONGS_FILE.to_string(), &liked, &mut summary)?;

        let playlists = self.api.playlists()?;
        info!("found {} playlists", playlists.len());

        for playlist in &playlists {
            info!("exporting playlist {}", playlist.name);
            let file_name = unique_file_name(playlist, &mut used);
            match self.api.playlist_tracks(&playlist.id) {
                Ok(items) => self.write(&playlist.name, file_name, &items, &mut summary)?,
                Err(err) => {
                    error!("skipping playlist {}: {err}", playlist.name);
                    summary
                        .failed
                        .push((playlist.name.clone(), err.to_string()));
                }
            }
        }

        info!("export finished, {summary}");
        Ok(summary)
    }

    fn write(
        &self,
        name: &str,
        file_name: String,
        items: &[LibraryItem],
        summary: &mut ExportSummary,
    ) -> Result<(), ExportError> {
        let rows: Vec<ExportRow> = items
            .iter()
            .filter_map(|item| ExportRow::from_item(item, name))
            .collect();
        if rows.is_empty() {
            warn!("no tracks to export for {name}");
            summary.empty.push(name.to_string());
            return Ok(());
        }

        let path = self.dir.join(file_name);
        write_rows(&path, &rows).map_err(|source| ExportError::Write {
            path: path.clone(),
            source,
        })?;
        info!("exported {} tracks to {}", rows.len(), path.display());

        summary.written.push(ExportedPlaylist {
            name: name.to_string(),
            path,
            rows: rows.len(),
        });
        Ok(())
    }
}

/// Falls back to the playlist id for names without safe characters, and
/// appends it when two playlists would share a file.
fn unique_file_name(playlist: &PlaylistRef, used: &mut HashSet<String>) -> String {
    let name = match playlist_file_name(&playlist.name) {
        Some(name) if !used.contains(&name.to_lowercase()) => name,
        Some(name) => format!("{}-{}.csv", name.trim_end_matches(".csv"), playlist.id),
        None => format!("{}.csv", playlist.id),
    };
    used.insert(name.to_lowercase());
    name
}

fn write_rows(path: &Path, rows: &[ExportRow]) -> Result<(), csv::Error> {
    let mut writer = csv::Writer::from_path(path)?;
    for row in rows {
        writer.serialize(row)?;
    }
    writer.flush()?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        config::Columns,
        export::api::{ApiAlbum, ApiTrack, ArtistRef, Image, User},
        playlist::PlaylistFile,
    };
    use std::collections::HashMap;
    use tempfile::TempDir;

    fn item(title: &str, artist: &str) -> LibraryItem {
        LibraryItem {
            added_at: Some("2024-01-01T00:00:00Z".into()),
            added_by: None,
            track: Some(ApiTrack {
                kind: "track".into(),
                uri: format!("spotify:track:{title}"),
                name: title.into(),
                artists: vec![ArtistRef {
                    uri: "spotify:artist:1".into(),
                    name: artist.into(),
                }],
                album: Some(ApiAlbum {
                    name: "Album".into(),
                    release_date: Some("1999-05-01".into()),
                    images: vec![Image {
                        url: "https://i.scdn.co/image/cover".into(),
                    }],
                    ..Default::default()
                }),
                explicit: true,
                ..Default::default()
            }),
        }
    }

    #[derive(Default)]
    struct FakeApi {
        liked: Vec<LibraryItem>,
        playlists: Vec<(PlaylistRef, Vec<LibraryItem>)>,
        broken: HashMap<String, String>,
    }

    impl FakeApi {
        fn playlist(mut self, id: &str, name: &str, items: Vec<LibraryItem>) -> Self {
            let playlist = PlaylistRef {
                id: id.into(),
                name: name.into(),
            };
            self.playlists.push((playlist, items));
            self
        }
    }

    impl SpotifyApi for FakeApi {
        fn current_user(&self) -> Result<User, ApiError> {
            Ok(User {
                id: "me".into(),
                display_name: None,
            })
        }

        fn saved_tracks(&self) -> Result<Vec<LibraryItem>, ApiError> {
            Ok(self.liked.clone())
        }

        fn playlists(&self) -> Result<Vec<PlaylistRef>, ApiError> {
            Ok(self.playlists.iter().map(|(p, _)| p.clone()).collect())
        }

        fn playlist_tracks(&self, playlist_id: &str) -> Result<Vec<LibraryItem>, ApiError> {
            if let Some(reason) = self.broken.get(playlist_id) {
                return Err(ApiError::Request {
                    url: format!("https://api.spotify.com/v1/playlists/{playlist_id}/tracks"),
                    reason: reason.clone(),
                });
            }
            Ok(self
                .playlists
                .iter()
                .find(|(p, _)| p.id == playlist_id)
                .map(|(_, items)| items.clone())
                .unwrap_or_default())
        }
    }

    #[test]
    fn test_exported_files_feed_the_downloader() -> anyhow::Result<()> {
        let tmp = TempDir::new()?;
        let api = FakeApi {
            liked: vec![item("Liked One", "Band")],
            ..Default::default()
        }
        .playlist("p1", "Road Trip", vec![item("Song A", "Band"), item("Song B", "Other")]);

        let summary = Exporter::new(api, tmp.path()).run()?;

        assert_eq!(summary.written.len(), 2);
        assert_eq!(summary.written[0].path, tmp.path().join("Liked_Songs.csv"));
        assert_eq!(summary.written[1].path, tmp.path().join("Road Trip.csv"));
        assert_eq!(summary.written[1].rows, 2);

        let tracks: Vec<_> = PlaylistFile::new(tmp.path().join("Road Trip.csv"))
            .rows(&Columns::default())?
            .collect::<Result<_, _>>()?;
        assert_eq!(tracks.len(), 2);
        assert_eq!(tracks[0].title, "Song A");
        assert_eq!(tracks[0].artist, "Band");
        assert_eq!(tracks[0].album.as_deref(), Some("Album"));
        assert_eq!(tracks[0].year, Some(1999));
        assert_eq!(
            tracks[0].artwork.as_ref().map(|a| a.0.as_str()),
            Some("https://i.scdn.co/image/cover")
        );

        Ok(())
    }

    #[test]
    fn test_header_has_every_column_in_order() -> anyhow::Result<()> {
        let tmp = TempDir::new()?;
        let api = FakeApi {
            liked: vec![item("Song", "Band")],
            ..Default::default()
        };

        Exporter::new(api, tmp.path()).run()?;

        let content = std::fs::read_to_string(tmp.path().join("Liked_Songs.csv"))?;
        let header = content.lines().next().unwrap_or_default();
        assert_eq!(
            header,
            "Track URI,Track Name,Artist URI(s),Artist Name(s),Album URI,Album Name,\
             Album Artist URI(s),Album Artist Name(s),Album Release Date,Album Image URL,\
             Disc Number,Track Number,Track Duration (ms),Track Preview URL,Explicit,\
             Popularity,ISRC,Added By,Added At,Playlist Name"
        );
        assert!(content.lines().nth(1).unwrap_or_default().ends_with(",Liked Songs"));

        Ok(())
    }

    #[test]
    fn test_unavailable_entries_and_empty_playlists() -> anyhow::Result<()> {
        let tmp = TempDir::new()?;
        let episode = LibraryItem {
            track: Some(ApiTrack {
                kind: "episode".into(),
                name: "Pod".into(),
                ..Default::default()
            }),
            ..Default::default()
        };
        let api = FakeApi::default()
            .playlist("p1", "Mixed", vec![LibraryItem::default(), item("Song", "Band"), episode])
            .playlist("p2", "Nothing", vec![LibraryItem::default()]);

        let summary = Exporter::new(api, tmp.path()).run()?;

        assert_eq!(summary.empty, vec![LIKED_SONGS.to_string(), "Nothing".to_string()]);
        assert_eq!(summary.written.len(), 1);
        assert_eq!(summary.written[0].rows, 1);
        assert!(!tmp.path().join("Nothing.csv").exists());
        assert!(!tmp.path().join("Liked_Songs.csv").exists());

        Ok(())
    }

    #[test]
    fn test_failed_playlist_does_not_stop_export() -> anyhow::Result<()> {
        let tmp = TempDir::new()?;
        let mut api = FakeApi::default()
            .playlist("p1", "Broken", vec![item("A", "Band")])
            .playlist("p2", "Fine", vec![item("B", "Band")]);
        api.broken.insert("p1".into(), "502 Bad Gateway".into());

        let summary = Exporter::new(api, tmp.path()).run()?;

        assert!(summary.has_failures());
        assert_eq!(summary.failed[0].0, "Broken");
        assert!(summary.failed[0].1.contains("502"));
        assert!(tmp.path().join("Fine.csv").exists());

        Ok(())
    }

    #[test]
    fn test_summary_display() {
        let summary = ExportSummary {
            written: vec![ExportedPlaylist {
                name: "Mix".into(),
                path: PathBuf::from("playlists/Mix.csv"),
                rows: 12,
            }],
            empty: vec!["Empty".into()],
            failed: vec![("Gone".into(), "404 Not Found".into())],
        };

        assert_eq!(
            summary.to_string(),
            "exported: 1, empty: 1, failed: 1\n  Mix: 12 tracks in playlists/Mix.csv\n  [FAILED] Gone: 404 Not Found"
        );
    }

    #[test]
    fn test_playlist_file_names() {
        assert_eq!(playlist_file_name("Chill: Vibes/2024!").as_deref(), Some("Chill Vibes2024.csv"));
        assert_eq!(playlist_file_name("  rock_n-roll "), Some("rock_n-roll.csv".to_string()));
        assert_eq!(playlist_file_name("🔥🔥"), None);
    }

    #[test]
    fn test_colliding_names_get_the_playlist_id() {
        let mut used = HashSet::from([LIKED_SONGS_FILE.to_lowercase()]);
        let named = |id: &str, name: &str| PlaylistRef {
            id: id.into(),
            name: name.into(),
        };

        assert_eq!(unique_file_name(&named("a", "Mix"), &mut used), "Mix.csv");
        assert_eq!(unique_file_name(&named("b", "mix!"), &mut used), "mix-b.csv");
        assert_eq!(unique_file_name(&named("c", "Liked_Songs"), &mut used), "Liked_Songs-c.csv");
        assert_eq!(unique_file_name(&named("d", "✨"), &mut used), "d.csv");
    }

    #[test]
    fn test_row_joins_multiple_artists() {
        let mut entry = item("Song", "Band");
        if let Some(track) = entry.track.as_mut() {
            track.artists.push(ArtistRef {
                uri: "spotify:artist:2".into(),
                name: "Guest".into(),
            });
        }

        let row = ExportRow::from_item(&entry, "Mix").unwrap();

        assert_eq!(row.artist_names, "Band, Guest");
        assert_eq!(row.artist_uris, "spotify:artist:1, spotify:artist:2");
        assert!(row.explicit);
        assert_eq!(row.album_release_date, "1999-05-01");
        assert_eq!(row.playlist_name, "Mix");
    }
}
