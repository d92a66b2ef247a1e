//! Typed failures of the remote playback API.
//!
//! Everything above the remote client works with `anyhow`, but the monitor needs to
//! tell an expired token apart from a flaky network, so calls into
//! [`PlaybackApi`](crate::api::PlaybackApi) return [`ApiError`].

use std::time::Duration;
use thiserror::Error;

/// Result alias for remote API calls.
pub type ApiResult<T> = std::result::Result<T, ApiError>;

#[derive(Debug, Error)]
pub enum ApiError {
    /// HTTP 401. The access token is missing, revoked or expired.
    #[error("unauthorized: access token rejected")]
    Unauthorized,

    /// HTTP 429 with the server-suggested wait.
    #[error("rate limited, retry after {}s", retry_after.as_secs())]
    RateLimited { retry_after: Duration },

    #[error("server error (HTTP {status})")]
    Server { status: u16 },

    #[error("unexpected response (HTTP {status}): {message}")]
    Status { status: u16, message: String },

    #[error("could not decode response: {0}")]
    Decode(String),

    #[error("transport failure: {0}")]
    Transport(String),

    #[error("no credentials configured ({0})")]
    MissingCredentials(&'static str),
}

impl ApiError {
    /// True for failures that a token refresh can cure.
    ///
    /// Besides a plain 401 this also matches error payloads whose message mentions
    /// an unauthorized or expired token, which some endpoints return with other codes.
    pub fn is_auth_failure(&self) -> bool {
        match self {
            Self::Unauthorized => true,
            Self::Status { message, .. } => {
                let message = message.to_ascii_lowercase();
                message.contains("unauthorized") || message.contains("expired")
            }
            _ => false,
        }
    }

    /// Minimum wait the server asked for before the next attempt.
    pub fn retry_after(&self) -> Option<Duration> {
        match self {
            Self::RateLimited { retry_after } => Some(*retry_after),
            _ => None,
        }
    }
}

impl From<reqwest::Error> for ApiError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_decode() {
            Self::Decode(err.to_string())
        } else {
            Self::Transport(err.to_string())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_unauthorized_is_auth_failure() {
        assert!(ApiError::Unauthorized.is_auth_failure());
    }

    #[test]
    fn test_expired_message_is_auth_failure() {
        let err = ApiError::Status {
            status: 400,
            message: "The access token expired".to_string(),
        };
        assert!(err.is_auth_failure());

        let err = ApiError::Status {
            status: 403,
            message: "Insufficient client scope".to_string(),
        };
        assert!(!err.is_auth_failure());
    }

    #[test]
    fn test_transient_errors_are_not_auth_failures() {
        assert!(!ApiError::Server { status: 502 }.is_auth_failure());
        assert!(!ApiError::Transport("connection reset".into()).is_auth_failure());
    }

    #[test]
    fn test_retry_after_only_for_rate_limits() {
        let limited = ApiError::RateLimited { retry_after: Duration::from_secs(3) };
        assert_eq!(limited.retry_after(), Some(Duration::from_secs(3)));
        assert_eq!(ApiError::Server { status: 500 }.retry_after(), None);
    }
}
