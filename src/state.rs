//! What the monitor believes is playing right now.

use crate::api::{PlaybackSnapshot, TrackItem};
use crate::classifier::OutgoingTrack;
use crate::events::PresentationUpdate;
use log::debug;
use std::collections::VecDeque;
use std::time::{Duration, Instant};

/// How many track ids the recently-played cache keeps.
pub const RECENT_TRACKS_CAPACITY: usize = 5;

/// Bounded, most-recent-first list of track ids.
///
/// A track change *to* one of these ids is a revisit (e.g. "previous") and is never
/// classified.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RecentTracks {
    ids: VecDeque<String>,
}

impl RecentTracks {
    pub fn new() -> Self {
        Self::default()
    }

    /// Fill free slots with `ids` (most recent first) after the ids already cached.
    ///
    /// Local entries win: tracks skipped too early to reach the service's history
    /// only live here.
    pub fn seed<I>(&mut self, ids: I)
    where
        I: IntoIterator<Item = String>,
    {
        for id in ids {
            if self.ids.len() >= RECENT_TRACKS_CAPACITY {
                break;
            }
            if !id.is_empty() && !self.contains(&id) {
                self.ids.push_back(id);
            }
        }
    }

    /// Put `id` in front, dropping its older occurrence and anything beyond capacity.
    pub fn push(&mut self, id: &str) {
        if id.is_empty() {
            return;
        }
        self.ids.retain(|existing| existing != id);
        self.ids.push_front(id.to_string());
        self.ids.truncate(RECENT_TRACKS_CAPACITY);
    }

    pub fn contains(&self, id: &str) -> bool {
        self.ids.iter().any(|existing| existing == id)
    }

    pub fn len(&self) -> usize {
        self.ids.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ids.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &str> {
        self.ids.iter().map(String::as_str)
    }
}

/// Mutable playback record of one monitoring session.
///
/// Written only by the poller. `pause_started` is set exactly while the last observed
/// transition was playing -> paused.
#[derive(Debug, Clone, Default)]
pub struct PlaybackState {
    pub track_id: String,
    pub track_name: String,
    pub artist_name: String,
    pub album_name: String,
    /// Playback source of the current track, opaque.
    pub context: Option<String>,
    pub progress_ms: u64,
    pub duration_ms: u64,
    pub is_playing: bool,
    pub is_in_library: bool,
    pub library_status_logged: bool,
    pub pause_started: Option<Instant>,
    pub total_pause: Duration,
    /// When `progress_ms` was last known to be accurate.
    pub last_sync: Option<Instant>,
    pub recent_tracks: RecentTracks,
}

impl PlaybackState {
    pub fn has_track(&self) -> bool {
        !self.track_id.is_empty()
    }

    /// Forget the current track but keep the recently-played cache.
    pub fn reset(&mut self) {
        let recent_tracks = std::mem::take(&mut self.recent_tracks);
        *self = Self { recent_tracks, ..Self::default() };
    }

    /// Update progress of the current track and keep the pause bookkeeping.
    pub fn observe(&mut self, snapshot: &PlaybackSnapshot, duration_ms: u64, now: Instant) {
        let was_playing = self.is_playing;
        let is_playing = snapshot.is_playing;

        if was_playing && !is_playing {
            debug!("Paused {}", self.track_id);
            self.pause_started = Some(now);
        } else if !was_playing && is_playing {
            if let Some(started) = self.pause_started.take() {
                let paused = now.saturating_duration_since(started);
                self.total_pause += paused;
                debug!(
                    "Resumed {} after {}ms (total paused {}ms)",
                    self.track_id,
                    paused.as_millis(),
                    self.total_pause.as_millis()
                );
            }
        }

        self.is_playing = is_playing;
        self.duration_ms = duration_ms;
        self.progress_ms = snapshot.progress_ms.unwrap_or(self.progress_ms).min(duration_ms);
        self.last_sync = Some(now);
    }

    /// Switch to a new track. The previous track id moves into the recent cache.
    pub fn load_track(&mut self, snapshot: &PlaybackSnapshot, item: &TrackItem, is_in_library: bool, now: Instant) {
        if self.has_track() {
            let previous = std::mem::take(&mut self.track_id);
            self.recent_tracks.push(&previous);
        }

        let recent_tracks = std::mem::take(&mut self.recent_tracks);
        *self = Self {
            track_id: item.id().to_string(),
            track_name: item.name.clone(),
            artist_name: item.artist_names(),
            album_name: item.album_name().to_string(),
            context: snapshot.context.as_ref().map(|context| context.uri.clone()),
            progress_ms: snapshot.progress_ms.unwrap_or(0).min(item.duration_ms),
            duration_ms: item.duration_ms,
            is_playing: snapshot.is_playing,
            is_in_library,
            library_status_logged: false,
            pause_started: None,
            total_pause: Duration::ZERO,
            last_sync: Some(now),
            recent_tracks,
        };
    }

    /// Snapshot of the current track for the classifier.
    pub fn outgoing(&self) -> OutgoingTrack {
        OutgoingTrack {
            track_id: self.track_id.clone(),
            track_name: self.track_name.clone(),
            artist_name: self.artist_name.clone(),
            context: self.context.clone(),
            progress_ms: self.progress_ms,
            duration_ms: self.duration_ms,
            is_in_library: self.is_in_library,
            is_playing: self.is_playing,
            pause_started: self.pause_started,
            total_pause: self.total_pause,
        }
    }

    /// Presentation update at `progress_ms` (clamped to the track length).
    pub fn to_update(&self, progress_ms: u64) -> PresentationUpdate {
        if !self.has_track() {
            return PresentationUpdate::default();
        }
        let progress_ms = progress_ms.min(self.duration_ms);
        PresentationUpdate {
            is_playing: self.is_playing,
            track_id: self.track_id.clone(),
            track_name: self.track_name.clone(),
            artist_name: self.artist_name.clone(),
            album_name: self.album_name.clone(),
            progress_pct: progress_percent(progress_ms, self.duration_ms),
            duration_sec: self.duration_ms / 1000,
            is_in_library: self.is_in_library,
            monitoring_stopped: None,
            error: None,
        }
    }
}

/// Percentage of `duration_ms` reached at `progress_ms`, two decimals, at most 100.
pub fn progress_percent(progress_ms: u64, duration_ms: u64) -> f64 {
    if duration_ms == 0 {
        return 0.0;
    }
    let pct = progress_ms.min(duration_ms) as f64 / duration_ms as f64 * 100.0;
    (pct * 100.0).round() / 100.0
}
