//! Persisted skip records.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Identifies a track together with the names shown to the user.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TrackRef {
    pub id: String,
    pub name: String,
    pub artist: String,
}

/// A single observed skip. Appended, never edited.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SkipEvent {
    pub timestamp: DateTime<Utc>,
    /// Fraction of the track played before the transition, `0.0..=1.0`.
    pub progress: f64,
    pub play_duration_ms: Option<u64>,
    pub is_manual_skip: bool,
    /// Playback source (playlist, album, ...) as reported by the service.
    pub context: Option<String>,
}

/// Skip statistics of one track.
///
/// `skip_count` always equals `skip_events.len()`; all counters only grow, except
/// through an explicit reset.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SkippedTrack {
    pub id: String,
    pub name: String,
    pub artist: String,
    pub skip_count: u32,
    pub not_skipped_count: u32,
    pub last_skipped: Option<DateTime<Utc>>,
    pub skip_events: Vec<SkipEvent>,
    pub manual_skip_count: u32,
    pub auto_skip_count: u32,
}

impl SkippedTrack {
    /// Fresh record without any statistics.
    pub fn new(track: &TrackRef) -> Self {
        Self {
            id: track.id.clone(),
            name: track.name.clone(),
            artist: track.artist.clone(),
            ..Default::default()
        }
    }

    /// Append `event` and bump the matching counters.
    pub fn push_skip(&mut self, event: SkipEvent, is_manual: bool) {
        self.skip_count += 1;
        if is_manual {
            self.manual_skip_count += 1;
        } else {
            self.auto_skip_count += 1;
        }
        self.last_skipped = Some(event.timestamp);
        self.skip_events.push(SkipEvent { is_manual_skip: is_manual, ..event });
    }

    /// Forget all skips but keep the completion count.
    pub fn reset_skips(&mut self) {
        self.skip_count = 0;
        self.manual_skip_count = 0;
        self.auto_skip_count = 0;
        self.last_skipped = None;
        self.skip_events.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn event(progress: f64) -> SkipEvent {
        SkipEvent {
            timestamp: Utc::now(),
            progress,
            play_duration_ms: Some(1000),
            is_manual_skip: false,
            context: None,
        }
    }

    fn track() -> TrackRef {
        TrackRef { id: "t1".into(), name: "Song".into(), artist: "Artist".into() }
    }

    #[test]
    fn test_push_skip_keeps_count_in_sync() {
        let mut record = SkippedTrack::new(&track());
        record.push_skip(event(0.1), true);
        record.push_skip(event(0.2), false);

        assert_eq!(record.skip_count, 2);
        assert_eq!(record.skip_events.len(), 2);
        assert_eq!(record.manual_skip_count, 1);
        assert_eq!(record.auto_skip_count, 1);
        assert!(record.skip_events[0].is_manual_skip);
        assert!(!record.skip_events[1].is_manual_skip);
        assert_eq!(record.last_skipped, Some(record.skip_events[1].timestamp));
    }

    #[test]
    fn test_reset_keeps_completions() {
        let mut record = SkippedTrack::new(&track());
        record.not_skipped_count = 4;
        record.push_skip(event(0.3), true);
        record.reset_skips();

        assert_eq!(record.skip_count, 0);
        assert!(record.skip_events.is_empty());
        assert!(record.last_skipped.is_none());
        assert_eq!(record.not_skipped_count, 4);
    }

    #[test]
    fn test_serializes_camel_case() {
        let record = SkippedTrack::new(&track());
        let json = serde_json::to_string(&record).unwrap();
        assert!(json.contains("\"skipCount\""));
        assert!(json.contains("\"notSkippedCount\""));
    }
}
