//! Credential-aware wrapper around a [`PlaybackApi`].
//!
//! Holds the session's [`Credentials`], refreshes them when the service rejects the
//! access token, and writes refreshed tokens back to the store so the next start
//! does not begin with a dead token.

use crate::api::{Credentials, PlaybackApi, PlaybackSnapshot};
use crate::config::{ACCESS_TOKEN, REFRESH_TOKEN};
use crate::db::SkipStore;
use crate::error::ApiResult;
use crate::retry::{retry_with_backoff, RetryPolicy};
use log::{debug, info, warn};
use std::sync::{Arc, Mutex, PoisonError};

pub struct AuthorizedClient {
    api: Arc<dyn PlaybackApi>,
    store: Arc<dyn SkipStore>,
    credentials: Mutex<Credentials>,
}

impl AuthorizedClient {
    pub fn new(api: Arc<dyn PlaybackApi>, store: Arc<dyn SkipStore>) -> Self {
        Self { api, store, credentials: Mutex::new(Credentials::default()) }
    }

    pub fn set_credentials(&self, credentials: Credentials) {
        *self.credentials.lock().unwrap_or_else(PoisonError::into_inner) = credentials;
    }

    pub fn credentials(&self) -> Credentials {
        self.credentials.lock().unwrap_or_else(PoisonError::into_inner).clone()
    }

    fn access_token(&self) -> String {
        self.credentials.lock().unwrap_or_else(PoisonError::into_inner).access_token.clone()
    }

    /// Swap in a fresh access token.
    pub fn refresh(&self) -> ApiResult<()> {
        let current = self.credentials();
        let refreshed = self.api.refresh_access_token(&current)?;

        if let Err(err) = self.store.set_setting(ACCESS_TOKEN, &refreshed.access_token) {
            warn!("Could not persist refreshed access token: {err:#}");
        }
        if refreshed.refresh_token != current.refresh_token {
            if let Err(err) = self.store.set_setting(REFRESH_TOKEN, &refreshed.refresh_token) {
                warn!("Could not persist rotated refresh token: {err:#}");
            }
        }

        self.set_credentials(refreshed);
        info!("Access token refreshed");
        Ok(())
    }

    /// Run `op` and, when it fails on authorization, refresh once and run it again.
    ///
    /// A failing refresh is logged and the original error is returned.
    pub fn with_auth_retry<T, F>(&self, label: &str, op: F) -> ApiResult<T>
    where
        F: Fn(&dyn PlaybackApi, &str) -> ApiResult<T>,
    {
        match op(self.api.as_ref(), &self.access_token()) {
            Err(err) if err.is_auth_failure() => {
                debug!("{label} rejected ({err}), refreshing token");
                if let Err(refresh_err) = self.refresh() {
                    warn!("Token refresh for {label} failed: {refresh_err}");
                    return Err(err);
                }
                op(self.api.as_ref(), &self.access_token())
            }
            other => other,
        }
    }

    /// Current playback, retried with backoff.
    ///
    /// An authorization failure refreshes the token before the next attempt; the
    /// attempt still counts against the policy's budget.
    pub fn current_playback(&self, policy: &RetryPolicy) -> ApiResult<Option<PlaybackSnapshot>> {
        retry_with_backoff(policy, "Fetching current playback", |_| {
            let result = self.api.current_playback(&self.access_token());
            if let Err(err) = &result {
                if err.is_auth_failure() {
                    if let Err(refresh_err) = self.refresh() {
                        warn!("Token refresh failed: {refresh_err}");
                    }
                }
            }
            result
        })
    }

    /// Recently played track ids, most recent first.
    pub fn recently_played(&self, policy: &RetryPolicy) -> ApiResult<Vec<String>> {
        retry_with_backoff(policy, "Fetching recently played tracks", |_| {
            self.with_auth_retry("recently played", |api, token| api.recently_played(token))
        })
    }

    pub fn is_track_in_library(&self, track_id: &str) -> ApiResult<bool> {
        self.with_auth_retry("library check", |api, token| api.is_track_in_library(token, track_id))
    }

    pub fn remove_from_library(&self, track_id: &str) -> ApiResult<bool> {
        self.with_auth_retry("library removal", |api, token| api.remove_from_library(token, track_id))
    }
}
