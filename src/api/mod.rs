//! # Remote Playback API
//!
//! The monitor talks to the streaming service only through the [`PlaybackApi`] trait.
//! [`SpotifyClient`](spotify::SpotifyClient) is the production implementation; tests
//! plug in scripted fakes.
//!
//! Token state is explicit: every data call receives the access token to use, and
//! [`PlaybackApi::refresh_access_token`] hands back a new set of [`Credentials`]
//! instead of mutating hidden state. [`AuthorizedClient`](crate::client::AuthorizedClient)
//! owns the credentials of a running session.

use crate::error::ApiResult;
use serde::{Deserialize, Serialize};

pub mod spotify;

/// Display name used when a track comes without any artist.
pub const UNKNOWN_ARTIST: &str = "Unknown Artist";

/// Everything needed to call the API on behalf of one user.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Credentials {
    pub client_id: String,
    pub client_secret: String,
    pub access_token: String,
    pub refresh_token: String,
}

impl Credentials {
    /// A session can run with a live access token, or with a refresh token that
    /// can mint one.
    pub fn is_usable(&self) -> bool {
        !self.access_token.is_empty() || !self.refresh_token.is_empty()
    }
}

/// What the service reports as currently playing.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct PlaybackSnapshot {
    #[serde(default)]
    pub is_playing: bool,
    #[serde(default)]
    pub progress_ms: Option<u64>,
    #[serde(default)]
    pub item: Option<TrackItem>,
    #[serde(default)]
    pub context: Option<PlaybackContext>,
}

impl PlaybackSnapshot {
    /// The playing track, if it is one the monitor can follow.
    ///
    /// Local files and ads come without an id and are treated like no item at all.
    pub fn track(&self) -> Option<&TrackItem> {
        self.item.as_ref().filter(|item| item.id.as_deref().is_some_and(|id| !id.is_empty()))
    }
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct TrackItem {
    #[serde(default)]
    pub id: Option<String>,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub duration_ms: u64,
    #[serde(default)]
    pub artists: Vec<Artist>,
    #[serde(default)]
    pub album: Option<Album>,
}

impl TrackItem {
    pub fn id(&self) -> &str {
        self.id.as_deref().unwrap_or_default()
    }

    /// Comma separated artist names.
    pub fn artist_names(&self) -> String {
        if self.artists.is_empty() {
            return UNKNOWN_ARTIST.to_string();
        }
        self.artists
            .iter()
            .map(|artist| artist.name.as_str())
            .collect::<Vec<_>>()
            .join(", ")
    }

    pub fn album_name(&self) -> &str {
        self.album.as_ref().map(|album| album.name.as_str()).unwrap_or_default()
    }
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct Artist {
    #[serde(default)]
    pub name: String,
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct Album {
    #[serde(default)]
    pub name: String,
}

/// Where playback was started from (playlist, album, liked songs...).
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct PlaybackContext {
    #[serde(default)]
    pub uri: String,
    #[serde(default, rename = "type")]
    pub kind: Option<String>,
}

/// The slice of the streaming service the monitor depends on.
pub trait PlaybackApi: Send + Sync {
    /// Current playback, `None` when nothing is playing.
    fn current_playback(&self, access_token: &str) -> ApiResult<Option<PlaybackSnapshot>>;

    /// Ids of recently played tracks, most recent first.
    fn recently_played(&self, access_token: &str) -> ApiResult<Vec<String>>;

    fn is_track_in_library(&self, access_token: &str, track_id: &str) -> ApiResult<bool>;

    /// Remove a track from the user's library. `true` when the service accepted it.
    fn remove_from_library(&self, access_token: &str, track_id: &str) -> ApiResult<bool>;

    /// Exchange the refresh token for a new access token.
    fn refresh_access_token(&self, credentials: &Credentials) -> ApiResult<Credentials>;
}
