use std::fmt::Display;

use thiserror::Error;

/// Represent one playlist entry.
///
/// Constructed once per CSV row and never mutated afterwards.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TrackDescriptor {
    pub title: String,
    pub artist: String,
    pub album: Option<String>,
    pub year: Option<i32>,
    pub artwork: Option<ArtworkRef>,
}

/// Location of an album cover: either a URL or a path on disk.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArtworkRef(pub String);

impl ArtworkRef {
    pub fn is_remote(&self) -> bool {
        let lower = self.0.to_ascii_lowercase();
        lower.starts_with("http://") || lower.starts_with("https://")
    }
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum InvalidTrack {
    #[error("track title is empty")]
    EmptyTitle,
    #[error("track artist is empty")]
    EmptyArtist,
}

impl TrackDescriptor {
    /// Builds a descriptor, trimming every field.
    ///
    /// Title and artist are mandatory. Optional text fields that are blank
    /// after trimming become `None` instead of empty strings.
    pub fn new(
        title: &str,
        artist: &str,
        album: Option<&str>,
        year: Option<i32>,
        artwork: Option<&str>,
    ) -> Result<Self, InvalidTrack> {
        let title = title.trim();
        let artist = artist.trim();
        if title.is_empty() {
            return Err(InvalidTrack::EmptyTitle);
        }
        if artist.is_empty() {
            return Err(InvalidTrack::EmptyArtist);
        }

        Ok(Self {
            title: title.to_string(),
            artist: artist.to_string(),
            album: non_blank(album),
            year,
            artwork: non_blank(artwork).map(ArtworkRef),
        })
    }

    /// Query handed to the search tool
    pub fn search_query(&self, suffix: &str) -> String {
        let suffix = suffix.trim();
        if suffix.is_empty() {
            format!("{} {}", self.artist, self.title)
        } else {
            format!("{} {} {}", self.artist, self.title, suffix)
        }
    }
}

impl Display for TrackDescriptor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} - {}", self.artist, self.title)
    }
}

fn non_blank(value: Option<&str>) -> Option<String> {
    value
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .map(str::to_string)
}

/// Constant MP3 bitrate in kbps.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Bitrate(u32);

/// MPEG-1 Layer III bitrates accepted by the encoder.
pub const MP3_BITRATES: &[u32] = &[32, 40, 48, 56, 64, 80, 96, 112, 128, 160, 192, 224, 256, 320];

impl Bitrate {
    pub const DEFAULT: Bitrate = Bitrate(320);

    pub fn from_kbps(kbps: u32) -> Option<Self> {
        MP3_BITRATES.contains(&kbps).then_some(Self(kbps))
    }

    pub fn kbps(&self) -> u32 {
        self.0
    }

    /// Value in the form ffmpeg expects for `-b:a`
    pub fn as_ffmpeg_arg(&self) -> String {
        format!("{}k", self.0)
    }
}

impl Default for Bitrate {
    fn default() -> Self {
        Self::DEFAULT
    }
}

impl Display for Bitrate {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}kbps", self.0)
    }
}
