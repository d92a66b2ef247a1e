//! Progress extrapolation between polls.
//!
//! Polling the service once a second makes a progress bar jump. The interpolator
//! runs on a faster timer and estimates the position from the last synced progress
//! and the time since. It only reads the playback state (apart from seeding the sync
//! timestamp) and never touches skip bookkeeping.

use crate::events::{EventSink, PresentationUpdate};
use crate::state::PlaybackState;
use log::trace;
use std::sync::{Mutex, TryLockError};
use std::time::Instant;

/// Estimated presentation update at `now`, or `None` when there is nothing to report.
pub fn interpolate(state: &mut PlaybackState, now: Instant) -> Option<PresentationUpdate> {
    if !state.is_playing || state.duration_ms == 0 {
        return None;
    }

    let Some(last_sync) = state.last_sync else {
        state.last_sync = Some(now);
        return None;
    };

    let elapsed_ms = now.saturating_duration_since(last_sync).as_millis() as u64;
    let absolute_ms = state.progress_ms.saturating_add(elapsed_ms).min(state.duration_ms);
    Some(state.to_update(absolute_ms))
}

/// One interpolator tick against shared state.
///
/// Skips the tick when the poller holds the lock; a missed frame is better than
/// making the poller wait.
pub fn tick(state: &Mutex<PlaybackState>, sink: &dyn EventSink, now: Instant) -> Option<PresentationUpdate> {
    let update = {
        let mut guard = match state.try_lock() {
            Ok(guard) => guard,
            Err(TryLockError::WouldBlock) => {
                trace!("Playback state busy, skipping interpolation tick");
                return None;
            }
            Err(TryLockError::Poisoned(poisoned)) => poisoned.into_inner(),
        };
        interpolate(&mut guard, now)?
    };

    sink.emit(update.clone());
    Some(update)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::events::{ChannelSink, MonitorEvent};
    use std::time::Duration;

    fn playing_state(progress_ms: u64, duration_ms: u64, last_sync: Option<Instant>) -> PlaybackState {
        PlaybackState {
            track_id: "a".into(),
            track_name: "Song".into(),
            artist_name: "Artist".into(),
            progress_ms,
            duration_ms,
            is_playing: true,
            last_sync,
            ..PlaybackState::default()
        }
    }

    #[test]
    fn test_first_tick_only_records_sync() {
        let now = Instant::now();
        let mut state = playing_state(1000, 200_000, None);
        assert!(interpolate(&mut state, now).is_none());
        assert_eq!(state.last_sync, Some(now));
    }

    #[test]
    fn test_extrapolates_from_last_sync() {
        let synced = Instant::now();
        let mut state = playing_state(50_000, 200_000, Some(synced));

        let update = interpolate(&mut state, synced + Duration::from_millis(50_000)).unwrap();
        assert_eq!(update.progress_pct, 50.0);
        assert_eq!(update.duration_sec, 200);
        // Interpolation does not move the synced progress.
        assert_eq!(state.progress_ms, 50_000);
    }

    #[test]
    fn test_never_exceeds_duration() {
        let synced = Instant::now();
        let mut state = playing_state(190_000, 200_000, Some(synced));

        for secs in [5, 10, 60, 3600] {
            let update = interpolate(&mut state, synced + Duration::from_secs(secs)).unwrap();
            assert!(update.progress_pct <= 100.0);
        }
        let update = interpolate(&mut state, synced + Duration::from_secs(60)).unwrap();
        assert_eq!(update.progress_pct, 100.0);
    }

    #[test]
    fn test_idle_when_paused_or_unknown_length() {
        let now = Instant::now();
        let mut paused = playing_state(1000, 200_000, Some(now));
        paused.is_playing = false;
        assert!(interpolate(&mut paused, now).is_none());

        let mut no_length = playing_state(1000, 0, Some(now));
        assert!(interpolate(&mut no_length, now).is_none());
    }

    #[test]
    fn test_tick_emits_and_skips_when_locked() {
        let synced = Instant::now();
        let state = Mutex::new(playing_state(0, 100_000, Some(synced)));
        let (sink, rx) = ChannelSink::new();

        let update = tick(&state, &sink, synced + Duration::from_millis(25_000)).unwrap();
        assert_eq!(update.progress_pct, 25.0);
        assert!(matches!(rx.try_recv(), Ok(MonitorEvent::Playback(_))));

        let _held = state.lock().unwrap();
        assert!(tick(&state, &sink, synced).is_none());
        assert!(rx.try_recv().is_err());
    }
}
