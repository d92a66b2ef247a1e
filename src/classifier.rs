//! # Skip Classifier
//!
//! Decides what a track change means for the track that was playing before it:
//!
//! - **Revisit**: the new track is in the recently-played cache, nothing is counted
//! - **Completion**: progress reached `skip_progress_threshold`
//! - **Pause-interrupted**: low progress, but paused for at least `pause_tolerance`
//! - **Skip**: everything else
//!
//! [`classify`] is pure and total. [`TrackChangeHandler`] applies a decision: it
//! records skips and completions of library tracks and removes a track from the
//! library when its skip count crosses `skip_count_threshold`.

use crate::client::AuthorizedClient;
use crate::config::ClassifierConfig;
use crate::db::SkipStore;
use crate::model::{SkipEvent, TrackRef};
use crate::state::RecentTracks;
use chrono::Utc;
use log::{debug, error, info, warn};
use std::time::{Duration, Instant};

/// The track that is being left, as last observed by the poller.
#[derive(Debug, Clone, PartialEq)]
pub struct OutgoingTrack {
    pub track_id: String,
    pub track_name: String,
    pub artist_name: String,
    pub context: Option<String>,
    pub progress_ms: u64,
    pub duration_ms: u64,
    pub is_in_library: bool,
    pub is_playing: bool,
    pub pause_started: Option<Instant>,
    pub total_pause: Duration,
}

impl OutgoingTrack {
    /// Pause time accumulated so far, including a pause that is still running.
    pub fn total_pause_at(&self, now: Instant) -> Duration {
        let running = match (self.is_playing, self.pause_started) {
            (false, Some(started)) => now.saturating_duration_since(started),
            _ => Duration::ZERO,
        };
        self.total_pause + running
    }

    fn track_ref(&self) -> TrackRef {
        TrackRef {
            id: self.track_id.clone(),
            name: self.track_name.clone(),
            artist: self.artist_name.clone(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Classification {
    /// The incoming track was played recently; going back to it says nothing.
    Revisit,
    /// The outgoing track has no known length.
    Unmeasurable,
    Completion { progress: f64 },
    PauseInterrupted { progress: f64, paused: Duration },
    Skip { progress: f64 },
}

/// Classify the transition from `outgoing` to `incoming_id` at `now`.
pub fn classify(
    outgoing: &OutgoingTrack,
    incoming_id: &str,
    recent: &RecentTracks,
    config: &ClassifierConfig,
    now: Instant,
) -> Classification {
    if recent.contains(incoming_id) {
        return Classification::Revisit;
    }
    if outgoing.duration_ms == 0 {
        return Classification::Unmeasurable;
    }

    let progress = (outgoing.progress_ms as f64 / outgoing.duration_ms as f64).min(1.0);
    if progress >= config.skip_progress_threshold {
        return Classification::Completion { progress };
    }

    let paused = outgoing.total_pause_at(now);
    if paused >= config.pause_tolerance {
        return Classification::PauseInterrupted { progress, paused };
    }

    Classification::Skip { progress }
}

/// What applying a classification changed.
#[derive(Debug, Clone, PartialEq)]
pub struct TransitionOutcome {
    pub classification: Classification,
    /// A skip or completion was written to the store.
    pub recorded: bool,
    /// Skip count after recording a skip.
    pub skip_count: Option<u32>,
    /// The track was removed from the library.
    pub removed: bool,
}

impl TransitionOutcome {
    fn unrecorded(classification: Classification) -> Self {
        Self { classification, recorded: false, skip_count: None, removed: false }
    }
}

/// Applies classifications to the store and the library.
pub struct TrackChangeHandler<'a> {
    store: &'a dyn SkipStore,
    client: &'a AuthorizedClient,
    config: &'a ClassifierConfig,
}

impl<'a> TrackChangeHandler<'a> {
    pub fn new(store: &'a dyn SkipStore, client: &'a AuthorizedClient, config: &'a ClassifierConfig) -> Self {
        Self { store, client, config }
    }

    /// Classify the transition and commit its effects.
    ///
    /// Store and library failures are logged; a track change never fails.
    pub fn handle(&self, outgoing: &OutgoingTrack, incoming_id: &str, recent: &RecentTracks, now: Instant) -> TransitionOutcome {
        let classification = classify(outgoing, incoming_id, recent, self.config, now);
        let label = format!("{} - {} ({})", outgoing.artist_name, outgoing.track_name, outgoing.track_id);

        match classification {
            Classification::Revisit => {
                debug!("{incoming_id} was played recently, ignoring transition from {label}");
                TransitionOutcome::unrecorded(classification)
            }
            Classification::Unmeasurable => {
                debug!("No duration for {label}, ignoring transition");
                TransitionOutcome::unrecorded(classification)
            }
            Classification::PauseInterrupted { progress, paused } => {
                info!(
                    "Not counting {label}: paused {}ms at {:.0}%",
                    paused.as_millis(),
                    progress * 100.0
                );
                TransitionOutcome::unrecorded(classification)
            }
            Classification::Completion { progress } => self.complete(outgoing, &label, progress, classification),
            Classification::Skip { progress } => self.skip(outgoing, &label, progress, classification),
        }
    }

    fn complete(&self, outgoing: &OutgoingTrack, label: &str, progress: f64, classification: Classification) -> TransitionOutcome {
        if !outgoing.is_in_library {
            debug!("Completed {label} at {:.0}%, not in library", progress * 100.0);
            return TransitionOutcome::unrecorded(classification);
        }

        match self.store.record_completion(&outgoing.track_ref()) {
            Ok(()) => {
                info!("Listened: {label} ({:.0}%)", progress * 100.0);
                TransitionOutcome { recorded: true, ..TransitionOutcome::unrecorded(classification) }
            }
            Err(err) => {
                error!("Failed to record completion of {label}: {err:#}");
                TransitionOutcome::unrecorded(classification)
            }
        }
    }

    fn skip(&self, outgoing: &OutgoingTrack, label: &str, progress: f64, classification: Classification) -> TransitionOutcome {
        if !outgoing.is_in_library {
            debug!("Skipped {label} at {:.0}%, not in library", progress * 100.0);
            return TransitionOutcome::unrecorded(classification);
        }

        let previous_count = match self.store.get_skipped_track(&outgoing.track_id) {
            Ok(record) => record.map_or(0, |record| record.skip_count),
            Err(err) => {
                error!("Failed to read skip record of {label}: {err:#}");
                return TransitionOutcome::unrecorded(classification);
            }
        };

        let event = SkipEvent {
            timestamp: Utc::now(),
            progress,
            play_duration_ms: Some(outgoing.progress_ms),
            is_manual_skip: self.config.manual_skips,
            context: outgoing.context.clone(),
        };
        if let Err(err) = self.store.upsert_skip_event(&outgoing.track_ref(), event, self.config.manual_skips) {
            error!("Failed to record skip of {label}: {err:#}");
            return TransitionOutcome::unrecorded(classification);
        }

        // Decide on the stored value, not on our own arithmetic.
        let skip_count = match self.store.get_skipped_track(&outgoing.track_id) {
            Ok(Some(record)) => record.skip_count,
            Ok(None) => {
                warn!("Skip record of {label} missing right after writing it");
                return TransitionOutcome { recorded: true, ..TransitionOutcome::unrecorded(classification) };
            }
            Err(err) => {
                error!("Failed to re-read skip record of {label}: {err:#}");
                return TransitionOutcome { recorded: true, ..TransitionOutcome::unrecorded(classification) };
            }
        };
        info!(
            "Skipped: {label} at {:.0}% (skips: {skip_count}/{})",
            progress * 100.0,
            self.config.skip_count_threshold
        );

        let threshold = self.config.skip_count_threshold;
        let crossed = previous_count < threshold && skip_count >= threshold;
        let removed = crossed && self.remove(outgoing, label, skip_count);

        TransitionOutcome { classification, recorded: true, skip_count: Some(skip_count), removed }
    }

    fn remove(&self, outgoing: &OutgoingTrack, label: &str, skip_count: u32) -> bool {
        info!("Removing {label} from library after {skip_count} skips");
        match self.client.remove_from_library(&outgoing.track_id) {
            Ok(true) => true,
            Ok(false) => {
                warn!("Library refused to remove {label}; run `skiptrack enforce` to try again");
                false
            }
            Err(err) => {
                error!("Failed to remove {label} from library: {err}; run `skiptrack enforce` to try again");
                false
            }
        }
    }
}
