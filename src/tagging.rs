//! Writing ID3 metadata onto downloaded tracks.
//!
//! Only fields present on the [`TrackDescriptor`] are written; nothing is
//! filled with placeholders. Every call builds the tag from scratch and
//! replaces whatever tag the file had, so tagging twice gives the same result.

use std::{path::Path, time::Duration};

use id3::{
    Tag, TagLike, Version,
    frame::{Picture, PictureType},
};
use log::{debug, warn};
use thiserror::Error;

use crate::domain::track::{ArtworkRef, TrackDescriptor};

/// Fallback when neither the server nor the file name reveals the type
const DEFAULT_ARTWORK_MIME: &str = "image/jpeg";

#[derive(Debug, Error)]
pub enum TagError {
    #[error("failed to write tags: {0}")]
    Write(#[from] id3::Error),
}

#[derive(Debug, Error)]
pub enum ArtworkError {
    #[error("failed to fetch artwork: {0}")]
    Http(String),

    #[error("failed to read artwork file: {0}")]
    Io(#[from] std::io::Error),

    #[error("artwork is empty")]
    Empty,
}

/// Which optional fields ended up in the file
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TagReport {
    pub album: bool,
    pub year: bool,
    pub artwork: bool,
    /// Set when the track had artwork that could not be embedded
    pub artwork_warning: Option<String>,
}

impl std::fmt::Display for TagReport {
    /// Lists the frames written, e.g. `title, artist, year`
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("title, artist")?;
        let optional = [
            (self.album, "album"),
            (self.year, "year"),
            (self.artwork, "artwork"),
        ];
        for (written, name) in optional {
            if written {
                write!(f, ", {name}")?;
            }
        }
        Ok(())
    }
}

/// Tag-write status of an output file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TagStatus {
    NotAttempted,
    Written(TagReport),
    Failed(String),
}

pub trait Tagger {
    fn tag(&self, path: &Path, track: &TrackDescriptor) -> Result<TagReport, TagError>;
}

impl<G: Tagger + ?Sized> Tagger for &G {
    fn tag(&self, path: &Path, track: &TrackDescriptor) -> Result<TagReport, TagError> {
        (**self).tag(path, track)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Artwork {
    pub mime_type: String,
    pub data: Vec<u8>,
}

pub trait ArtworkLoader {
    fn load(&self, artwork: &ArtworkRef) -> Result<Artwork, ArtworkError>;
}

impl<L: ArtworkLoader + ?Sized> ArtworkLoader for &L {
    fn load(&self, artwork: &ArtworkRef) -> Result<Artwork, ArtworkError> {
        (**self).load(artwork)
    }
}

/// Downloads `http(s)` references and reads everything else from disk.
pub struct DefaultArtworkLoader {
    timeout: Duration,
}

impl DefaultArtworkLoader {
    pub fn new(timeout: Duration) -> Self {
        Self { timeout }
    }

    fn fetch(&self, url: &str) -> Result<Artwork, ArtworkError> {
        let client = reqwest::blocking::Client::builder()
            .timeout(self.timeout)
            .build()
            .map_err(|e| ArtworkError::Http(format!("failed to create HTTP client: {e}")))?;

        let response = client
            .get(url)
            .send()
            .and_then(|r| r.error_for_status())
            .map_err(|e| ArtworkError::Http(e.to_string()))?;

        let mime_type = response
            .headers()
            .get(reqwest::header::CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .map(|v| v.split(';').next().unwrap_or(v).trim().to_string())
            .filter(|v| v.starts_with("image/"))
            .unwrap_or_else(|| guess_mime(url));

        let data = response
            .bytes()
            .map_err(|e| ArtworkError::Http(format!("failed to read body: {e}")))?;

        Ok(Artwork {
            mime_type,
            data: data.to_vec(),
        })
    }
}

impl ArtworkLoader for DefaultArtworkLoader {
    fn load(&self, artwork: &ArtworkRef) -> Result<Artwork, ArtworkError> {
        let artwork = if artwork.is_remote() {
            self.fetch(&artwork.0)?
        } else {
            Artwork {
                mime_type: guess_mime(&artwork.0),
                data: std::fs::read(&artwork.0)?,
            }
        };
        if artwork.data.is_empty() {
            return Err(ArtworkError::Empty);
        }
        Ok(artwork)
    }
}

fn guess_mime(reference: &str) -> String {
    // drop query strings so `cover.png?size=640` still guesses png
    let path = reference.split(['?', '#']).next().unwrap_or(reference);
    mime_guess::from_path(path)
        .first()
        .filter(|m| m.type_().as_str() == "image")
        .map(|m| m.essence_str().to_string())
        .unwrap_or_else(|| DEFAULT_ARTWORK_MIME.to_string())
}

/// ID3v2.3 tagger. Artwork is embedded as the front cover when a loader is
/// configured.
pub struct Id3Tagger<A> {
    artwork: Option<A>,
}

impl<A: ArtworkLoader> Id3Tagger<A> {
    pub fn new(artwork: Option<A>) -> Self {
        Self { artwork }
    }

    fn artwork_frame(&self, track: &TrackDescriptor) -> Result<Option<Picture>, ArtworkError> {
        let (Some(loader), Some(reference)) = (&self.artwork, &track.artwork) else {
            return Ok(None);
        };
        let art = loader.load(reference)?;
        Ok(Some(Picture {
            mime_type: art.mime_type,
            picture_type: PictureType::CoverFront,
            description: String::new(),
            data: art.data,
        }))
    }
}

impl<A: ArtworkLoader> Tagger for Id3Tagger<A> {
    fn tag(&self, path: &Path, track: &TrackDescriptor) -> Result<TagReport, TagError> {
        let mut tag = Tag::new();
        let mut report = TagReport::default();

        tag.set_title(&track.title);
        tag.set_artist(&track.artist);
        if let Some(album) = &track.album {
            tag.set_album(album);
            report.album = true;
        }
        if let Some(year) = track.year {
            tag.set_year(year);
            report.year = true;
        }

        match self.artwork_frame(track) {
            Ok(Some(picture)) => {
                tag.add_frame(picture);
                report.artwork = true;
            }
            Ok(None) => {}
            Err(err) => {
                warn!("{track}: embedding without artwork, {err}");
                report.artwork_warning = Some(err.to_string());
            }
        }

        tag.write_to_path(path, Version::Id3v23)?;
        debug!("tagged {} with {report}", path.display());
        Ok(report)
    }
}
