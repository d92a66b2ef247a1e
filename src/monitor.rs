//! # Playback Monitor
//!
//! The [`Monitor`] owns one monitoring session: the shared [`PlaybackState`], the
//! credential-aware client, and two timer threads.
//!
//! - the **poller** (1000 ms) fetches current playback, detects track changes and
//!   feeds the skip classifier
//! - the **interpolator** (250 ms) extrapolates progress for smooth presentation
//!
//! ## Lifecycle
//!
//! `start` seeds the recently-played cache and launches both timers; starting a
//! running monitor restarts it. `stop` cancels both timers and resets the playback
//! state, keeping only the recently-played cache. A poller that exhausts its retries
//! stops the session itself and reports `monitoring_stopped`.
//!
//! ## Concurrency
//!
//! Every write to the playback state happens on the poller thread while holding the
//! state mutex, after checking that its session generation is still the active one.
//! `stop` clears the active generation under the same mutex, so a call that was in
//! flight when the monitor stopped cannot write its result.

use crate::api::{Credentials, PlaybackApi};
use crate::client::AuthorizedClient;
use crate::config::MonitorConfig;
use crate::db::SkipStore;
use crate::events::{EventSink, MonitorStatus, PresentationUpdate};
use crate::retry::RetryPolicy;
use crate::state::PlaybackState;
use crate::{interpolator, poller};
use log::{debug, error, info, warn};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Condvar, Mutex, MutexGuard, PoisonError};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

/// Cancellation flag the timer threads sleep on.
#[derive(Debug, Default)]
struct StopSignal {
    stopped: Mutex<bool>,
    wakeup: Condvar,
}

impl StopSignal {
    /// Sleep for `period`. Returns `false` as soon as the signal is raised.
    fn wait(&self, period: Duration) -> bool {
        let stopped = self.stopped.lock().unwrap_or_else(PoisonError::into_inner);
        let (stopped, _) = self
            .wakeup
            .wait_timeout_while(stopped, period, |stopped| !*stopped)
            .unwrap_or_else(PoisonError::into_inner);
        !*stopped
    }

    fn raise(&self) {
        *self.stopped.lock().unwrap_or_else(PoisonError::into_inner) = true;
        self.wakeup.notify_all();
    }
}

/// Timer threads of one running session.
struct Timers {
    signal: Arc<StopSignal>,
    interpolator: JoinHandle<()>,
    poller: JoinHandle<()>,
}

/// State shared between the controller and its timer threads.
pub(crate) struct Session {
    pub(crate) client: AuthorizedClient,
    pub(crate) store: Arc<dyn SkipStore>,
    pub(crate) sink: Arc<dyn EventSink>,
    pub(crate) config: MonitorConfig,
    pub(crate) state: Mutex<PlaybackState>,
    /// Last generation handed out.
    generation: AtomicU64,
    /// Generation of the running session, `0` when stopped.
    active: AtomicU64,
    timers: Mutex<Option<Timers>>,
}

impl Session {
    pub(crate) fn new(
        api: Arc<dyn PlaybackApi>,
        store: Arc<dyn SkipStore>,
        sink: Arc<dyn EventSink>,
        config: MonitorConfig,
    ) -> Self {
        Self {
            client: AuthorizedClient::new(api, store.clone()),
            store,
            sink,
            config,
            state: Mutex::new(PlaybackState::default()),
            generation: AtomicU64::new(0),
            active: AtomicU64::new(0),
            timers: Mutex::new(None),
        }
    }

    pub(crate) fn lock_state(&self) -> MutexGuard<'_, PlaybackState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn lock_timers(&self) -> MutexGuard<'_, Option<Timers>> {
        self.timers.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub(crate) fn next_generation(&self) -> u64 {
        self.generation.fetch_add(1, Ordering::SeqCst) + 1
    }

    pub(crate) fn activate(&self, generation: u64) {
        self.active.store(generation, Ordering::SeqCst);
    }

    /// Whether `generation` is the session that is running right now.
    pub(crate) fn is_current(&self, generation: u64) -> bool {
        generation != 0 && self.active.load(Ordering::SeqCst) == generation
    }

    pub(crate) fn is_active(&self) -> bool {
        self.active.load(Ordering::SeqCst) != 0
    }

    /// Deactivate the running session, reset the playback state and cancel its timers.
    ///
    /// `failure` carries the reason when the session dies on its own. Returns
    /// `false` when nothing was running.
    pub(crate) fn shutdown(&self, failure: Option<String>) -> bool {
        let was_active = {
            let mut state = self.lock_state();
            let was_active = self.active.swap(0, Ordering::SeqCst) != 0;
            if was_active {
                state.reset();
            }
            was_active
        };
        if !was_active {
            return false;
        }

        let timers = self.lock_timers().take();
        if let Some(timers) = timers {
            timers.signal.raise();
            // The interpolator never blocks, wait for it. The poller may sit in a retry
            // sleep; whatever it fetches is discarded by the generation check.
            if timers.interpolator.thread().id() != thread::current().id() && timers.interpolator.join().is_err() {
                warn!("Interpolator thread panicked");
            }
            drop(timers.poller);
        }

        match failure {
            Some(reason) => {
                self.sink.emit(PresentationUpdate::stopped(reason));
                self.sink.status(MonitorStatus::Error);
            }
            None => self.sink.status(MonitorStatus::Inactive),
        }
        true
    }
}

/// Controller of one monitoring session.
pub struct Monitor {
    session: Arc<Session>,
}

impl Monitor {
    pub fn new(
        api: Arc<dyn PlaybackApi>,
        store: Arc<dyn SkipStore>,
        sink: Arc<dyn EventSink>,
        config: MonitorConfig,
    ) -> Self {
        Self { session: Arc::new(Session::new(api, store, sink, config)) }
    }

    /// Start monitoring with `credentials`. A running session is restarted.
    ///
    /// Returns `false` when the credentials are unusable or the timer threads
    /// cannot be spawned.
    pub fn start(&self, credentials: Credentials) -> bool {
        let session = &self.session;
        if session.is_active() {
            info!("Monitor already running, restarting");
            session.shutdown(None);
        }

        session.sink.status(MonitorStatus::Initializing);
        if !credentials.is_usable() {
            error!("Cannot start monitoring: no access or refresh token configured");
            session.sink.status(MonitorStatus::Error);
            return false;
        }
        session.client.set_credentials(credentials);
        self.seed_recent_tracks();

        let generation = session.next_generation();
        let signal = Arc::new(StopSignal::default());

        let interpolator = spawn_timer("skiptrack-progress", session.config.progress_interval, &signal, {
            let session = Arc::clone(session);
            move || {
                interpolator::tick(&session.state, session.sink.as_ref(), Instant::now());
            }
        });
        let poller = spawn_timer("skiptrack-poller", session.config.poll_interval, &signal, {
            let session = Arc::clone(session);
            move || poller::tick(&session, generation)
        });

        let (interpolator, poller) = match (interpolator, poller) {
            (Ok(interpolator), Ok(poller)) => (interpolator, poller),
            (interpolator, poller) => {
                signal.raise();
                for err in [interpolator.err(), poller.err()].into_iter().flatten() {
                    error!("Failed to spawn monitor thread: {err}");
                }
                session.sink.status(MonitorStatus::Error);
                return false;
            }
        };

        *session.lock_timers() = Some(Timers { signal, interpolator, poller });
        session.activate(generation);
        session.sink.status(MonitorStatus::Active);
        info!(
            "Monitoring playback (poll every {}ms, progress every {}ms)",
            session.config.poll_interval.as_millis(),
            session.config.progress_interval.as_millis()
        );
        true
    }

    /// Stop monitoring. Stopping a stopped monitor is fine.
    pub fn stop(&self) -> bool {
        if self.session.shutdown(None) {
            info!("Monitoring stopped");
        } else {
            debug!("Monitor is not running, nothing to stop");
        }
        true
    }

    pub fn is_active(&self) -> bool {
        self.session.is_active()
    }

    /// Copy of the current playback state.
    pub fn playback_state(&self) -> PlaybackState {
        self.session.lock_state().clone()
    }

    /// Best effort: a failure only means the first revisit may be misread.
    fn seed_recent_tracks(&self) {
        let session = &self.session;
        let policy = RetryPolicy { max_attempts: 1, ..session.config.retry.clone() };
        match session.client.recently_played(&policy) {
            Ok(ids) => {
                let mut state = session.lock_state();
                state.recent_tracks.seed(ids);
                debug!("Recently played cache holds {} tracks", state.recent_tracks.len());
            }
            Err(err) => warn!("Could not fetch recently played tracks: {err}"),
        }
    }
}

impl Drop for Monitor {
    fn drop(&mut self) {
        self.session.shutdown(None);
    }
}

fn spawn_timer<F>(name: &str, period: Duration, signal: &Arc<StopSignal>, tick: F) -> std::io::Result<JoinHandle<()>>
where
    F: Fn() + Send + 'static,
{
    let signal = Arc::clone(signal);
    thread::Builder::new().name(name.to_string()).spawn(move || {
        while signal.wait(period) {
            tick();
        }
    })
}
