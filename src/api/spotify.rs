//! Spotify Web API implementation of [`PlaybackApi`].
//!
//! Uses blocking `reqwest`, the monitor runs its timers on plain threads.

use super::{Credentials, PlaybackApi, PlaybackSnapshot};
use crate::error::{ApiError, ApiResult};
use log::debug;
use reqwest::blocking::{Client, Response};
use reqwest::StatusCode;
use serde::Deserialize;
use std::time::Duration;

const API_BASE: &str = "https://api.spotify.com/v1";
const TOKEN_URL: &str = "https://accounts.spotify.com/api/token";
const REQUEST_TIMEOUT: Duration = Duration::from_secs(10);
/// Used when a 429 comes without a `Retry-After` header.
const DEFAULT_RETRY_AFTER: Duration = Duration::from_secs(10);
const RECENTLY_PLAYED_LIMIT: u32 = 50;

#[derive(Debug, Clone)]
pub struct SpotifyClient {
    http: Client,
    api_base: String,
    token_url: String,
}

#[derive(Deserialize)]
struct RecentlyPlayed {
    #[serde(default)]
    items: Vec<PlayHistory>,
}

#[derive(Deserialize)]
struct PlayHistory {
    track: HistoryTrack,
}

#[derive(Deserialize)]
struct HistoryTrack {
    #[serde(default)]
    id: Option<String>,
}

#[derive(Deserialize)]
struct TokenResponse {
    access_token: String,
    #[serde(default)]
    refresh_token: Option<String>,
}

#[derive(Deserialize)]
struct ErrorEnvelope {
    error: ErrorBody,
}

#[derive(Deserialize)]
#[serde(untagged)]
enum ErrorBody {
    Api { message: String },
    // The accounts service uses OAuth style errors.
    OAuth(String),
}

impl SpotifyClient {
    pub fn new() -> ApiResult<Self> {
        Self::with_endpoints(API_BASE, TOKEN_URL)
    }

    /// Point the client at other hosts, e.g. a local mock server.
    pub fn with_endpoints(api_base: &str, token_url: &str) -> ApiResult<Self> {
        let http = Client::builder().timeout(REQUEST_TIMEOUT).build()?;
        Ok(Self {
            http,
            api_base: api_base.trim_end_matches('/').to_string(),
            token_url: token_url.to_string(),
        })
    }

    fn url(&self, path: &str) -> String {
        format!("{}{path}", self.api_base)
    }

    fn require_token(access_token: &str) -> ApiResult<()> {
        if access_token.is_empty() {
            return Err(ApiError::Unauthorized);
        }
        Ok(())
    }
}

/// Map a non-success response onto [`ApiError`].
fn check_status(response: Response) -> ApiResult<Response> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }

    match status {
        StatusCode::UNAUTHORIZED => Err(ApiError::Unauthorized),
        StatusCode::TOO_MANY_REQUESTS => {
            let retry_after = response
                .headers()
                .get(reqwest::header::RETRY_AFTER)
                .and_then(|value| value.to_str().ok())
                .and_then(|value| value.trim().parse::<u64>().ok())
                .map(Duration::from_secs)
                .unwrap_or(DEFAULT_RETRY_AFTER);
            Err(ApiError::RateLimited { retry_after })
        }
        status if status.is_server_error() => Err(ApiError::Server { status: status.as_u16() }),
        status => {
            let body = response.text().unwrap_or_default();
            let message = match serde_json::from_str::<ErrorEnvelope>(&body) {
                Ok(ErrorEnvelope { error: ErrorBody::Api { message } }) => message,
                Ok(ErrorEnvelope { error: ErrorBody::OAuth(message) }) => message,
                Err(_) => body,
            };
            Err(ApiError::Status { status: status.as_u16(), message })
        }
    }
}

impl PlaybackApi for SpotifyClient {
    fn current_playback(&self, access_token: &str) -> ApiResult<Option<PlaybackSnapshot>> {
        Self::require_token(access_token)?;
        let response = self.http.get(self.url("/me/player")).bearer_auth(access_token).send()?;
        let response = check_status(response)?;

        if response.status() == StatusCode::NO_CONTENT {
            return Ok(None);
        }
        let snapshot = response.json::<PlaybackSnapshot>()?;
        Ok(Some(snapshot))
    }

    fn recently_played(&self, access_token: &str) -> ApiResult<Vec<String>> {
        Self::require_token(access_token)?;
        let response = self
            .http
            .get(self.url("/me/player/recently-played"))
            .query(&[("limit", RECENTLY_PLAYED_LIMIT)])
            .bearer_auth(access_token)
            .send()?;
        let history = check_status(response)?.json::<RecentlyPlayed>()?;

        Ok(history.items.into_iter().filter_map(|entry| entry.track.id).collect())
    }

    fn is_track_in_library(&self, access_token: &str, track_id: &str) -> ApiResult<bool> {
        Self::require_token(access_token)?;
        let response = self
            .http
            .get(self.url("/me/tracks/contains"))
            .query(&[("ids", track_id)])
            .bearer_auth(access_token)
            .send()?;
        let flags = check_status(response)?.json::<Vec<bool>>()?;

        Ok(flags.first().copied().unwrap_or(false))
    }

    fn remove_from_library(&self, access_token: &str, track_id: &str) -> ApiResult<bool> {
        Self::require_token(access_token)?;
        let response = self
            .http
            .delete(self.url("/me/tracks"))
            .query(&[("ids", track_id)])
            .bearer_auth(access_token)
            .send()?;
        check_status(response)?;

        debug!("Removed {track_id} from library");
        Ok(true)
    }

    fn refresh_access_token(&self, credentials: &Credentials) -> ApiResult<Credentials> {
        if credentials.refresh_token.is_empty() {
            return Err(ApiError::MissingCredentials("refresh_token"));
        }
        if credentials.client_id.is_empty() {
            return Err(ApiError::MissingCredentials("client_id"));
        }

        let response = self
            .http
            .post(&self.token_url)
            .basic_auth(&credentials.client_id, Some(&credentials.client_secret))
            .form(&[
                ("grant_type", "refresh_token"),
                ("refresh_token", credentials.refresh_token.as_str()),
            ])
            .send()?;
        let tokens = check_status(response)?.json::<TokenResponse>()?;

        Ok(Credentials {
            access_token: tokens.access_token,
            refresh_token: tokens
                .refresh_token
                .unwrap_or_else(|| credentials.refresh_token.clone()),
            ..credentials.clone()
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_url_joining_trims_trailing_slash() {
        let client = SpotifyClient::with_endpoints("http://localhost:9000/v1/", TOKEN_URL).unwrap();
        assert_eq!(client.url("/me/player"), "http://localhost:9000/v1/me/player");
    }

    #[test]
    fn test_calls_without_token_are_unauthorized() {
        let client = SpotifyClient::new().unwrap();
        assert!(matches!(client.current_playback(""), Err(ApiError::Unauthorized)));
        assert!(matches!(client.is_track_in_library("", "x"), Err(ApiError::Unauthorized)));
    }

    #[test]
    fn test_refresh_requires_refresh_token() {
        let client = SpotifyClient::new().unwrap();
        let result = client.refresh_access_token(&Credentials::default());
        assert!(matches!(result, Err(ApiError::MissingCredentials("refresh_token"))));
    }

    #[test]
    fn test_recently_played_payload_skips_missing_ids() {
        let json = r#"{"items": [
            {"track": {"id": "a"}},
            {"track": {"id": null}},
            {"track": {"id": "b"}}
        ]}"#;
        let history: RecentlyPlayed = serde_json::from_str(json).unwrap();
        let ids: Vec<String> = history.items.into_iter().filter_map(|e| e.track.id).collect();
        assert_eq!(ids, vec!["a".to_string(), "b".to_string()]);
    }

    #[test]
    fn test_error_envelopes_parse() {
        let api: ErrorEnvelope =
            serde_json::from_str(r#"{"error": {"status": 403, "message": "Forbidden"}}"#).unwrap();
        assert!(matches!(api.error, ErrorBody::Api { ref message } if message == "Forbidden"));

        let oauth: ErrorEnvelope = serde_json::from_str(r#"{"error": "invalid_grant"}"#).unwrap();
        assert!(matches!(oauth.error, ErrorBody::OAuth(ref message) if message == "invalid_grant"));
    }
}
