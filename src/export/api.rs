//! Minimal read-only client for the Spotify Web API.

use std::time::Duration;

use log::debug;
use serde::{Deserialize, de::DeserializeOwned};
use thiserror::Error;

use super::auth::AccessToken;

const API_BASE: &str = "https://api.spotify.com/v1";

/// Largest page size the library endpoints accept
const LIBRARY_PAGE: usize = 50;
/// Largest page size of the playlist items endpoint
const PLAYLIST_PAGE: usize = 100;

#[derive(Debug, Error)]
pub enum ApiError {
    #[error("request to {url} failed: {reason}")]
    Request { url: String, reason: String },

    #[error("unexpected response from {url}: {reason}")]
    Decode { url: String, reason: String },
}

/// The library reads the exporter needs.
pub trait SpotifyApi {
    fn current_user(&self) -> Result<User, ApiError>;

    /// Every saved ("liked") track, most recently added first.
    fn saved_tracks(&self) -> Result<Vec<LibraryItem>, ApiError>;

    /// Playlists owned or followed by the user.
    fn playlists(&self) -> Result<Vec<PlaylistRef>, ApiError>;

    fn playlist_tracks(&self, playlist_id: &str) -> Result<Vec<LibraryItem>, ApiError>;
}

#[derive(Debug, Clone, Deserialize, PartialEq)]
pub struct Page<T> {
    pub items: Vec<T>,
    pub next: Option<String>,
}

#[derive(Debug, Clone, Deserialize, PartialEq)]
pub struct User {
    pub id: String,
    pub display_name: Option<String>,
}

#[derive(Debug, Clone, Deserialize, PartialEq)]
pub struct PlaylistRef {
    pub id: String,
    pub name: String,
}

/// A saved track or a playlist entry. `track` is null for entries that are
/// no longer available.
#[derive(Debug, Clone, Default, Deserialize, PartialEq)]
pub struct LibraryItem {
    pub added_at: Option<String>,
    pub added_by: Option<UserRef>,
    pub track: Option<ApiTrack>,
}

#[derive(Debug, Clone, Default, Deserialize, PartialEq)]
pub struct UserRef {
    #[serde(default)]
    pub id: String,
}

#[derive(Debug, Clone, Default, Deserialize, PartialEq)]
pub struct ApiTrack {
    /// `track` or `episode`
    #[serde(rename = "type", default)]
    pub kind: String,
    #[serde(default)]
    pub uri: String,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub artists: Vec<ArtistRef>,
    pub album: Option<ApiAlbum>,
    pub disc_number: Option<u32>,
    pub track_number: Option<u32>,
    pub duration_ms: Option<u64>,
    pub preview_url: Option<String>,
    #[serde(default)]
    pub explicit: bool,
    pub popularity: Option<u32>,
    pub external_ids: Option<ExternalIds>,
}

impl ApiTrack {
    pub fn is_music(&self) -> bool {
        self.kind.is_empty() || self.kind == "track"
    }
}

#[derive(Debug, Clone, Default, Deserialize, PartialEq)]
pub struct ArtistRef {
    #[serde(default)]
    pub uri: String,
    #[serde(default)]
    pub name: String,
}

#[derive(Debug, Clone, Default, Deserialize, PartialEq)]
pub struct ApiAlbum {
    #[serde(default)]
    pub uri: String,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub artists: Vec<ArtistRef>,
    pub release_date: Option<String>,
    /// Largest first
    #[serde(default)]
    pub images: Vec<Image>,
}

#[derive(Debug, Clone, Default, Deserialize, PartialEq)]
pub struct Image {
    pub url: String,
}

#[derive(Debug, Clone, Default, Deserialize, PartialEq)]
pub struct ExternalIds {
    pub isrc: Option<String>,
}

/// Blocking HTTP implementation authorized by a user access token.
pub struct WebApi {
    client: reqwest::blocking::Client,
    token: AccessToken,
}

impl WebApi {
    pub fn new(token: AccessToken, timeout: Duration) -> Result<Self, ApiError> {
        let client = reqwest::blocking::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| ApiError::Request {
                url: API_BASE.to_string(),
                reason: format!("failed to create HTTP client: {e}"),
            })?;
        Ok(Self { client, token })
    }

    fn get<T: DeserializeOwned>(&self, url: &str) -> Result<T, ApiError> {
        let request_error = |reason: String| ApiError::Request {
            url: url.to_string(),
            reason,
        };

        let response = self
            .client
            .get(url)
            .bearer_auth(self.token.secret())
            .send()
            .map_err(|e| request_error(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().unwrap_or_default();
            return Err(request_error(format!("{status}: {}", body.trim())));
        }

        response.json().map_err(|e| ApiError::Decode {
            url: url.to_string(),
            reason: e.to_string(),
        })
    }

    /// Follows `next` links until the last page.
    fn collect_pages<T: DeserializeOwned>(&self, first: String) -> Result<Vec<T>, ApiError> {
        let mut items = Vec::new();
        let mut next = Some(first);
        while let Some(url) = next {
            let page: Page<T> = self.get(&url)?;
            items.extend(page.items);
            debug!("fetched {} items so far", items.len());
            next = page.next;
        }
        Ok(items)
    }
}

impl SpotifyApi for WebApi {
    fn current_user(&self) -> Result<User, ApiError> {
        self.get(&format!("{API_BASE}/me"))
    }

    fn saved_tracks(&self) -> Result<Vec<LibraryItem>, ApiError> {
        self.collect_pages(format!("{API_BASE}/me/tracks?limit={LIBRARY_PAGE}"))
    }

    fn playlists(&self) -> Result<Vec<PlaylistRef>, ApiError> {
        self.collect_pages(format!("{API_BASE}/me/playlists?limit={LIBRARY_PAGE}"))
    }

    fn playlist_tracks(&self, playlist_id: &str) -> Result<Vec<LibraryItem>, ApiError> {
        self.collect_pages(format!(
            "{API_BASE}/playlists/{playlist_id}/tracks?limit={PLAYLIST_PAGE}"
        ))
    }
}
