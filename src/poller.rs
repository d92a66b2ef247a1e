//! # Playback Poller
//!
//! One poll cycle: fetch current playback (with retries), look up library
//! membership, detect track changes, hand the outgoing track to the classifier and
//! commit the new state.
//!
//! The classifier runs without the state lock held, so the interpolator keeps
//! ticking while a skip is written or a library removal is in flight. Every write is
//! guarded by the session generation: a cycle that started before `stop` never
//! touches the state of the next session.

use crate::api::PlaybackSnapshot;
use crate::classifier::TrackChangeHandler;
use crate::events::PresentationUpdate;
use crate::monitor::Session;
use log::{debug, error, info, warn};
use std::time::Instant;

/// Run one poll cycle for the session `generation`.
pub(crate) fn tick(session: &Session, generation: u64) {
    match session.client.current_playback(&session.config.retry) {
        Ok(snapshot) => apply(session, generation, snapshot, Instant::now()),
        Err(err) => {
            if session.is_current(generation) {
                error!("Giving up on playback after {} attempts: {err}", session.config.retry.max_attempts);
                session.shutdown(Some(err.to_string()));
            } else {
                debug!("Discarding failed poll of a stopped session: {err}");
            }
        }
    }
}

/// Commit a fetched snapshot observed at `now`.
pub(crate) fn apply(session: &Session, generation: u64, snapshot: Option<PlaybackSnapshot>, now: Instant) {
    let playing = snapshot.and_then(|snapshot| {
        let item = snapshot.track().cloned()?;
        Some((snapshot, item))
    });
    let Some((snapshot, item)) = playing else {
        {
            let mut state = session.lock_state();
            if !session.is_current(generation) {
                return;
            }
            if state.has_track() {
                debug!("Playback ended");
            }
            state.reset();
        }
        session.sink.emit(PresentationUpdate::default());
        return;
    };

    let is_in_library = match session.client.is_track_in_library(item.id()) {
        Ok(in_library) => in_library,
        Err(err) => {
            warn!("Library check for {} failed, assuming not saved: {err}", item.id());
            false
        }
    };

    let transition = {
        let state = session.lock_state();
        if !session.is_current(generation) {
            return;
        }
        (state.has_track() && state.track_id != item.id())
            .then(|| (state.outgoing(), state.recent_tracks.clone()))
    };

    if let Some((outgoing, recent)) = transition {
        debug!("Track changed: {} -> {}", outgoing.track_id, item.id());
        let handler = TrackChangeHandler::new(session.store.as_ref(), &session.client, &session.config.classifier);
        let outcome = handler.handle(&outgoing, item.id(), &recent, now);
        debug!("Transition from {}: {:?}", outgoing.track_id, outcome.classification);
    }

    let update = {
        let mut state = session.lock_state();
        if !session.is_current(generation) {
            return;
        }
        if state.track_id == item.id() {
            state.is_in_library = is_in_library;
            state.observe(&snapshot, item.duration_ms, now);
        } else {
            state.load_track(&snapshot, &item, is_in_library, now);
            info!("Now playing: {} - {}", state.artist_name, state.track_name);
        }
        if !state.library_status_logged {
            let saved = if state.is_in_library { "in library" } else { "not in library" };
            info!("{} is {saved}", state.track_id);
            state.library_status_logged = true;
        }
        state.to_update(state.progress_ms)
    };
    session.sink.emit(update);
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::{Artist, Credentials, PlaybackApi, TrackItem};
    use crate::config::MonitorConfig;
    use crate::db::{MemoryStore, SkipStore};
    use crate::error::{ApiError, ApiResult};
    use crate::events::{ChannelSink, MonitorEvent, MonitorStatus};
    use crate::model::{SkipEvent, SkippedTrack, TrackRef};
    use crate::retry::RetryPolicy;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::mpsc::Receiver;
    use std::sync::Arc;
    use std::time::Duration;

    /// Every track is in the library; playback always fails when `failing` is set.
    /// With `library_rejected` the library check is unauthorized and refreshing fails.
    #[derive(Default)]
    struct FakeApi {
        failing: bool,
        library_rejected: bool,
        fetches: AtomicUsize,
        refreshes: AtomicUsize,
        removals: AtomicUsize,
    }

    impl PlaybackApi for FakeApi {
        fn current_playback(&self, _: &str) -> ApiResult<Option<PlaybackSnapshot>> {
            self.fetches.fetch_add(1, Ordering::SeqCst);
            if self.failing {
                return Err(ApiError::Server { status: 503 });
            }
            Ok(None)
        }

        fn recently_played(&self, _: &str) -> ApiResult<Vec<String>> {
            Ok(Vec::new())
        }

        fn is_track_in_library(&self, _: &str, _: &str) -> ApiResult<bool> {
            if self.library_rejected {
                return Err(ApiError::Unauthorized);
            }
            Ok(true)
        }

        fn remove_from_library(&self, _: &str, _: &str) -> ApiResult<bool> {
            self.removals.fetch_add(1, Ordering::SeqCst);
            Ok(true)
        }

        fn refresh_access_token(&self, credentials: &Credentials) -> ApiResult<Credentials> {
            self.refreshes.fetch_add(1, Ordering::SeqCst);
            if self.library_rejected {
                return Err(ApiError::Status { status: 400, message: "invalid_grant".into() });
            }
            Ok(credentials.clone())
        }
    }

    /// Memory store that counts every skip-record access.
    #[derive(Default)]
    struct CountingStore {
        inner: MemoryStore,
        record_calls: AtomicUsize,
    }

    impl CountingStore {
        fn touch(&self) {
            self.record_calls.fetch_add(1, Ordering::SeqCst);
        }
    }

    impl SkipStore for CountingStore {
        fn get_skipped_track(&self, id: &str) -> anyhow::Result<Option<SkippedTrack>> {
            self.touch();
            self.inner.get_skipped_track(id)
        }

        fn upsert_skip_event(&self, track: &TrackRef, event: SkipEvent, is_manual: bool) -> anyhow::Result<SkippedTrack> {
            self.touch();
            self.inner.upsert_skip_event(track, event, is_manual)
        }

        fn record_completion(&self, track: &TrackRef) -> anyhow::Result<()> {
            self.touch();
            self.inner.record_completion(track)
        }

        fn get_setting(&self, name: &str) -> anyhow::Result<Option<String>> {
            self.inner.get_setting(name)
        }

        fn set_setting(&self, name: &str, value: &str) -> anyhow::Result<()> {
            self.inner.set_setting(name, value)
        }

        fn list_skipped_tracks(&self) -> anyhow::Result<Vec<SkippedTrack>> {
            self.inner.list_skipped_tracks()
        }

        fn reset_skip_count(&self, id: &str) -> anyhow::Result<bool> {
            self.inner.reset_skip_count(id)
        }
    }

    /// Helper function to create an active session over a memory store
    fn active_session(api: Arc<FakeApi>) -> (Session, Arc<MemoryStore>, Receiver<MonitorEvent>, u64) {
        let store = Arc::new(MemoryStore::new());
        let (session, rx, generation) = session_over(api, store.clone());
        (session, store, rx, generation)
    }

    fn session_over(api: Arc<FakeApi>, store: Arc<dyn SkipStore>) -> (Session, Receiver<MonitorEvent>, u64) {
        let (sink, rx) = ChannelSink::new();
        let config = MonitorConfig {
            retry: RetryPolicy::default().with_initial_delay(Duration::from_millis(1)),
            ..MonitorConfig::default()
        };
        let session = Session::new(api, store, Arc::new(sink), config);
        session.client.set_credentials(Credentials { access_token: "token".into(), ..Credentials::default() });
        let generation = session.next_generation();
        session.activate(generation);
        (session, rx, generation)
    }

    fn playing(id: &str, is_playing: bool, progress_ms: u64) -> Option<PlaybackSnapshot> {
        Some(PlaybackSnapshot {
            is_playing,
            progress_ms: Some(progress_ms),
            item: Some(TrackItem {
                id: Some(id.to_string()),
                name: format!("Song {id}"),
                duration_ms: 200_000,
                artists: vec![Artist { name: "Artist".into() }],
                album: None,
            }),
            context: None,
        })
    }

    #[test]
    fn test_early_change_counts_skip() {
        let (session, store, _rx, generation) = active_session(Arc::default());
        let start = Instant::now();

        apply(&session, generation, playing("a", true, 0), start);
        apply(&session, generation, playing("a", true, 50_000), start + Duration::from_secs(50));
        apply(&session, generation, playing("b", true, 0), start + Duration::from_secs(51));

        let record = store.get_skipped_track("a").unwrap().unwrap();
        assert_eq!(record.skip_count, 1);
        assert_eq!(session.lock_state().track_id, "b");
        assert!(session.lock_state().recent_tracks.contains("a"));
    }

    #[test]
    fn test_late_change_counts_completion() {
        let (session, store, _rx, generation) = active_session(Arc::default());
        let start = Instant::now();

        apply(&session, generation, playing("a", true, 180_000), start);
        apply(&session, generation, playing("b", true, 0), start + Duration::from_secs(1));

        let record = store.get_skipped_track("a").unwrap().unwrap();
        assert_eq!(record.skip_count, 0);
        assert_eq!(record.not_skipped_count, 1);
    }

    #[test]
    fn test_long_pause_is_not_a_skip() {
        let (session, store, _rx, generation) = active_session(Arc::default());
        let start = Instant::now();

        apply(&session, generation, playing("a", true, 50_000), start);
        apply(&session, generation, playing("a", false, 51_000), start + Duration::from_secs(1));
        apply(&session, generation, playing("b", true, 0), start + Duration::from_secs(21));

        assert!(store.get_skipped_track("a").unwrap().is_none());
    }

    #[test]
    fn test_revisit_is_not_a_skip() {
        let (session, store, _rx, generation) = active_session(Arc::default());
        session.lock_state().recent_tracks.push("b");
        let start = Instant::now();

        apply(&session, generation, playing("a", true, 1_000), start);
        apply(&session, generation, playing("b", true, 0), start + Duration::from_secs(2));

        assert!(store.get_skipped_track("a").unwrap().is_none());
    }

    #[test]
    fn test_revisit_never_touches_the_store() {
        let store = Arc::new(CountingStore::default());
        let (session, _rx, generation) = session_over(Arc::default(), store.clone());
        session.lock_state().recent_tracks.push("b");
        let start = Instant::now();

        apply(&session, generation, playing("a", true, 1_000), start);
        apply(&session, generation, playing("b", true, 0), start + Duration::from_secs(2));
        assert_eq!(store.record_calls.load(Ordering::SeqCst), 0);

        // Leaving b for an unseen track is classified and does hit the store.
        apply(&session, generation, playing("c", true, 0), start + Duration::from_secs(3));
        assert!(store.record_calls.load(Ordering::SeqCst) > 0);
    }

    #[test]
    fn test_rejected_library_check_degrades_to_not_saved() {
        let api = Arc::new(FakeApi { library_rejected: true, ..FakeApi::default() });
        let (session, _store, rx, generation) = active_session(api.clone());

        apply(&session, generation, playing("a", true, 5_000), Instant::now());
        apply(&session, generation, playing("a", true, 6_000), Instant::now());

        assert!(session.is_active());
        assert_eq!(api.refreshes.load(Ordering::SeqCst), 2);
        let updates: Vec<PresentationUpdate> = rx
            .try_iter()
            .filter_map(|event| match event {
                MonitorEvent::Playback(update) => Some(update),
                MonitorEvent::Status(_) => None,
            })
            .collect();
        assert_eq!(updates.len(), 2);
        assert!(updates.iter().all(|update| update.track_id == "a" && !update.is_in_library));
        assert!(!session.lock_state().is_in_library);
    }

    #[test]
    fn test_nothing_playing_resets_and_emits_empty_update() {
        let (session, _store, rx, generation) = active_session(Arc::default());
        apply(&session, generation, playing("a", true, 1_000), Instant::now());
        apply(&session, generation, None, Instant::now());

        assert!(!session.lock_state().has_track());
        let last = rx.try_iter().last();
        assert_eq!(last, Some(MonitorEvent::Playback(PresentationUpdate::default())));
    }

    #[test]
    fn test_persistent_failure_stops_session() {
        let api = Arc::new(FakeApi { failing: true, ..FakeApi::default() });
        let (session, _store, rx, generation) = active_session(api.clone());

        tick(&session, generation);

        assert_eq!(api.fetches.load(Ordering::SeqCst), 5);
        assert!(!session.is_active());
        let events: Vec<MonitorEvent> = rx.try_iter().collect();
        assert!(events.iter().any(|event| matches!(
            event,
            MonitorEvent::Playback(update) if update.monitoring_stopped == Some(true) && update.error.is_some()
        )));
        assert_eq!(events.last(), Some(&MonitorEvent::Status(MonitorStatus::Error)));
    }

    #[test]
    fn test_stale_generation_is_discarded() {
        let (session, store, rx, generation) = active_session(Arc::default());
        let start = Instant::now();
        apply(&session, generation, playing("a", true, 10_000), start);

        session.shutdown(None);
        let _ = rx.try_iter().count();

        apply(&session, generation, playing("b", true, 0), start + Duration::from_secs(1));
        assert!(!session.lock_state().has_track());
        assert!(store.get_skipped_track("a").unwrap().is_none());
        assert_eq!(rx.try_iter().count(), 0);
    }
}
