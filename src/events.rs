//! Outbound notifications of the monitor.
//!
//! The monitor never knows who is listening. It pushes [`PresentationUpdate`]s and
//! [`MonitorStatus`] changes into an [`EventSink`]; the binary drains a
//! [`ChannelSink`], tests inspect the same channel, and [`LogSink`] simply logs.

use log::{debug, info, trace, warn};
use serde::Serialize;
use std::sync::mpsc::{self, Receiver, Sender};

/// Snapshot of playback for whoever renders it.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PresentationUpdate {
    pub is_playing: bool,
    pub track_id: String,
    pub track_name: String,
    pub artist_name: String,
    pub album_name: String,
    /// `0.0..=100.0`, two decimals.
    pub progress_pct: f64,
    pub duration_sec: u64,
    pub is_in_library: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub monitoring_stopped: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl PresentationUpdate {
    /// Update telling the presentation that monitoring died.
    pub fn stopped(error: impl Into<String>) -> Self {
        Self {
            monitoring_stopped: Some(true),
            error: Some(error.into()),
            ..Self::default()
        }
    }

    pub fn is_empty(&self) -> bool {
        self.track_id.is_empty()
    }
}

/// Lifecycle of a monitor.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum MonitorStatus {
    Initializing,
    Active,
    Inactive,
    Error,
}

#[derive(Debug, Clone, PartialEq)]
pub enum MonitorEvent {
    Playback(PresentationUpdate),
    Status(MonitorStatus),
}

/// Receiver of monitor output. Must never block for long: it is called from the
/// timer threads.
pub trait EventSink: Send + Sync {
    fn emit(&self, update: PresentationUpdate);

    fn status(&self, status: MonitorStatus);
}

/// Forwards every event over an mpsc channel.
#[derive(Debug, Clone)]
pub struct ChannelSink {
    tx: Sender<MonitorEvent>,
}

impl ChannelSink {
    pub fn new() -> (Self, Receiver<MonitorEvent>) {
        let (tx, rx) = mpsc::channel();
        (Self { tx }, rx)
    }

    fn send(&self, event: MonitorEvent) {
        // A dropped receiver only means nobody is watching anymore.
        if self.tx.send(event).is_err() {
            trace!("Monitor event dropped, receiver is gone");
        }
    }
}

impl EventSink for ChannelSink {
    fn emit(&self, update: PresentationUpdate) {
        self.send(MonitorEvent::Playback(update));
    }

    fn status(&self, status: MonitorStatus) {
        self.send(MonitorEvent::Status(status));
    }
}

/// Writes events to the log.
#[derive(Debug, Clone, Copy, Default)]
pub struct LogSink;

impl EventSink for LogSink {
    fn emit(&self, update: PresentationUpdate) {
        if update.monitoring_stopped == Some(true) {
            warn!("Monitoring stopped: {}", update.error.as_deref().unwrap_or("unknown error"));
        } else if update.is_empty() {
            trace!("Nothing playing");
        } else {
            trace!(
                "{} - {} at {:.2}% ({})",
                update.artist_name,
                update.track_name,
                update.progress_pct,
                if update.is_playing { "playing" } else { "paused" }
            );
        }
    }

    fn status(&self, status: MonitorStatus) {
        match status {
            MonitorStatus::Error => warn!("Monitor status: {status:?}"),
            MonitorStatus::Active | MonitorStatus::Inactive => info!("Monitor status: {status:?}"),
            MonitorStatus::Initializing => debug!("Monitor status: {status:?}"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_channel_sink_forwards_in_order() {
        let (sink, rx) = ChannelSink::new();
        sink.status(MonitorStatus::Initializing);
        sink.emit(PresentationUpdate::default());
        sink.status(MonitorStatus::Active);

        let events: Vec<MonitorEvent> = rx.try_iter().collect();
        assert_eq!(
            events,
            vec![
                MonitorEvent::Status(MonitorStatus::Initializing),
                MonitorEvent::Playback(PresentationUpdate::default()),
                MonitorEvent::Status(MonitorStatus::Active),
            ]
        );
    }

    #[test]
    fn test_channel_sink_survives_dropped_receiver() {
        let (sink, rx) = ChannelSink::new();
        drop(rx);
        sink.emit(PresentationUpdate::default());
        sink.status(MonitorStatus::Inactive);
    }

    #[test]
    fn test_stopped_update_serialization() {
        let json = serde_json::to_value(PresentationUpdate::stopped("boom")).unwrap();
        assert_eq!(json["monitoringStopped"], true);
        assert_eq!(json["error"], "boom");
        assert_eq!(json["trackId"], "");

        let json = serde_json::to_value(PresentationUpdate::default()).unwrap();
        assert!(json.get("monitoringStopped").is_none());
    }

    #[test]
    fn test_status_serializes_lowercase() {
        assert_eq!(serde_json::to_string(&MonitorStatus::Inactive).unwrap(), "\"inactive\"");
    }
}
