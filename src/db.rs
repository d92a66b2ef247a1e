//! # Persistence
//!
//! Skip records and settings live behind the [`SkipStore`] trait. The monitor only
//! appends skip events, bumps completion counters and reads settings; listing and
//! resetting are used by the command line.
//!
//! Two implementations ship with the crate:
//!
//! - [`SqliteStore`]: the on-disk store used by the binary
//! - [`MemoryStore`]: a volatile store with identical semantics

use crate::model::{SkipEvent, SkippedTrack, TrackRef};
use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use rusqlite::{params, Connection, OptionalExtension};
use std::collections::HashMap;
use std::path::Path;
use std::sync::{Mutex, MutexGuard, PoisonError};

/// Storage the monitor records skips into.
pub trait SkipStore: Send + Sync {
    fn get_skipped_track(&self, id: &str) -> Result<Option<SkippedTrack>>;

    /// Append `event` to the track's history, creating the record on first sight,
    /// and return the updated record.
    fn upsert_skip_event(&self, track: &TrackRef, event: SkipEvent, is_manual: bool) -> Result<SkippedTrack>;

    /// Count a transition where the track was allowed to finish.
    fn record_completion(&self, track: &TrackRef) -> Result<()>;

    fn get_setting(&self, name: &str) -> Result<Option<String>>;

    fn set_setting(&self, name: &str, value: &str) -> Result<()>;

    /// All records, most skipped first.
    fn list_skipped_tracks(&self) -> Result<Vec<SkippedTrack>>;

    /// Zero a track's skip statistics. Returns `false` when the track is unknown.
    fn reset_skip_count(&self, id: &str) -> Result<bool>;
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

/// SQLite backed [`SkipStore`].
#[derive(Debug)]
pub struct SqliteStore {
    conn: Mutex<Connection>,
}

impl SqliteStore {
    /// Open (or create) the database at `path` and make sure the schema exists.
    pub fn open(path: &Path) -> Result<Self> {
        let conn = Connection::open(path)
            .with_context(|| format!("Failed to open skip database at {}", path.display()))?;
        Self::with_connection(conn)
    }

    pub fn open_in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory().context("Failed to open in-memory database")?;
        Self::with_connection(conn)
    }

    fn with_connection(conn: Connection) -> Result<Self> {
        init_schema(&conn)?;
        Ok(Self { conn: Mutex::new(conn) })
    }
}

fn init_schema(conn: &Connection) -> Result<()> {
    conn.execute_batch(
        "PRAGMA foreign_keys = ON;

        CREATE TABLE IF NOT EXISTS skipped_tracks (
            id                TEXT    PRIMARY KEY,
            name              TEXT    NOT NULL,
            artist            TEXT    NOT NULL,
            skip_count        INTEGER NOT NULL DEFAULT 0,
            not_skipped_count INTEGER NOT NULL DEFAULT 0,
            last_skipped      TEXT,
            manual_skip_count INTEGER NOT NULL DEFAULT 0,
            auto_skip_count   INTEGER NOT NULL DEFAULT 0
        );

        CREATE TABLE IF NOT EXISTS skip_events (
            id               INTEGER PRIMARY KEY AUTOINCREMENT,
            track_id         TEXT    NOT NULL REFERENCES skipped_tracks(id) ON DELETE CASCADE,
            timestamp        TEXT    NOT NULL,
            progress         REAL    NOT NULL,
            play_duration_ms INTEGER,
            is_manual        INTEGER NOT NULL,
            context          TEXT
        );

        CREATE INDEX IF NOT EXISTS idx_skip_events_track ON skip_events(track_id);

        CREATE TABLE IF NOT EXISTS settings (
            name  TEXT PRIMARY KEY,
            value TEXT NOT NULL
        );",
    )
    .context("Failed to create skip database schema")?;

    Ok(())
}

/// Make sure a row exists for `track` and refresh its display names.
fn ensure_track(conn: &Connection, track: &TrackRef) -> Result<()> {
    conn.execute(
        "INSERT INTO skipped_tracks (id, name, artist) VALUES (?1, ?2, ?3)
         ON CONFLICT(id) DO UPDATE SET name = excluded.name, artist = excluded.artist",
        params![track.id, track.name, track.artist],
    )
    .with_context(|| format!("Failed to insert skipped track {}", track.id))?;
    Ok(())
}

fn load_events(conn: &Connection, track_id: &str) -> Result<Vec<SkipEvent>> {
    let mut stmt = conn.prepare(
        "SELECT timestamp, progress, play_duration_ms, is_manual, context
         FROM skip_events WHERE track_id = ?1 ORDER BY id",
    )?;

    let events = stmt
        .query_map([track_id], |row| {
            let play_duration_ms: Option<i64> = row.get(2)?;
            Ok(SkipEvent {
                timestamp: row.get(0)?,
                progress: row.get(1)?,
                play_duration_ms: play_duration_ms.map(|ms| ms.max(0) as u64),
                is_manual_skip: row.get(3)?,
                context: row.get(4)?,
            })
        })
        .with_context(|| format!("Cannot query skip events of {track_id}"))?
        .collect::<rusqlite::Result<Vec<_>>>()
        .context("Failed to read skip events")?;

    Ok(events)
}

fn load_track(conn: &Connection, id: &str) -> Result<Option<SkippedTrack>> {
    let track = conn
        .query_row(
            "SELECT id, name, artist, skip_count, not_skipped_count, last_skipped,
                    manual_skip_count, auto_skip_count
             FROM skipped_tracks WHERE id = ?1",
            [id],
            |row| {
                Ok(SkippedTrack {
                    id: row.get(0)?,
                    name: row.get(1)?,
                    artist: row.get(2)?,
                    skip_count: row.get(3)?,
                    not_skipped_count: row.get(4)?,
                    last_skipped: row.get::<_, Option<DateTime<Utc>>>(5)?,
                    skip_events: Vec::new(),
                    manual_skip_count: row.get(6)?,
                    auto_skip_count: row.get(7)?,
                })
            },
        )
        .optional()
        .with_context(|| format!("Failed to query skipped track {id}"))?;

    match track {
        Some(mut track) => {
            track.skip_events = load_events(conn, id)?;
            Ok(Some(track))
        }
        None => Ok(None),
    }
}

impl SkipStore for SqliteStore {
    fn get_skipped_track(&self, id: &str) -> Result<Option<SkippedTrack>> {
        load_track(&lock(&self.conn), id)
    }

    fn upsert_skip_event(&self, track: &TrackRef, event: SkipEvent, is_manual: bool) -> Result<SkippedTrack> {
        let mut conn = lock(&self.conn);
        let tx = conn.transaction()?;

        ensure_track(&tx, track)?;
        tx.execute(
            "UPDATE skipped_tracks
             SET skip_count = skip_count + 1,
                 manual_skip_count = manual_skip_count + ?2,
                 auto_skip_count = auto_skip_count + ?3,
                 last_skipped = ?4
             WHERE id = ?1",
            params![track.id, u32::from(is_manual), u32::from(!is_manual), event.timestamp],
        )
        .with_context(|| format!("Failed to bump skip count of {}", track.id))?;
        tx.execute(
            "INSERT INTO skip_events (track_id, timestamp, progress, play_duration_ms, is_manual, context)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
            params![
                track.id,
                event.timestamp,
                event.progress,
                event.play_duration_ms.map(|ms| ms as i64),
                is_manual,
                event.context,
            ],
        )
        .with_context(|| format!("Failed to append skip event for {}", track.id))?;

        let updated = load_track(&tx, &track.id)?
            .with_context(|| format!("Skipped track {} vanished during update", track.id))?;
        tx.commit().context("Committing skip event failed")?;

        Ok(updated)
    }

    fn record_completion(&self, track: &TrackRef) -> Result<()> {
        let mut conn = lock(&self.conn);
        let tx = conn.transaction()?;

        ensure_track(&tx, track)?;
        tx.execute(
            "UPDATE skipped_tracks SET not_skipped_count = not_skipped_count + 1 WHERE id = ?1",
            [&track.id],
        )
        .with_context(|| format!("Failed to record completion of {}", track.id))?;

        tx.commit().context("Committing completion failed")?;
        Ok(())
    }

    fn get_setting(&self, name: &str) -> Result<Option<String>> {
        lock(&self.conn)
            .query_row("SELECT value FROM settings WHERE name = ?1", [name], |row| row.get(0))
            .optional()
            .with_context(|| format!("Failed to read setting {name}"))
    }

    fn set_setting(&self, name: &str, value: &str) -> Result<()> {
        lock(&self.conn)
            .execute(
                "INSERT INTO settings (name, value) VALUES (?1, ?2)
                 ON CONFLICT(name) DO UPDATE SET value = excluded.value",
                [name, value],
            )
            .with_context(|| format!("Failed to write setting {name}"))?;
        Ok(())
    }

    fn list_skipped_tracks(&self) -> Result<Vec<SkippedTrack>> {
        let conn = lock(&self.conn);
        let ids = {
            let mut stmt = conn.prepare(
                "SELECT id FROM skipped_tracks ORDER BY skip_count DESC, not_skipped_count ASC, id",
            )?;
            let ids = stmt
                .query_map([], |row| row.get::<_, String>(0))?
                .collect::<rusqlite::Result<Vec<_>>>()
                .context("Cannot list skipped tracks")?;
            ids
        };

        let mut tracks = Vec::with_capacity(ids.len());
        for id in ids {
            if let Some(track) = load_track(&conn, &id)? {
                tracks.push(track);
            }
        }
        Ok(tracks)
    }

    fn reset_skip_count(&self, id: &str) -> Result<bool> {
        let mut conn = lock(&self.conn);
        let tx = conn.transaction()?;

        let updated = tx
            .execute(
                "UPDATE skipped_tracks
                 SET skip_count = 0, manual_skip_count = 0, auto_skip_count = 0, last_skipped = NULL
                 WHERE id = ?1",
                [id],
            )
            .with_context(|| format!("Failed to reset skip count of {id}"))?;
        tx.execute("DELETE FROM skip_events WHERE track_id = ?1", [id])?;

        tx.commit().context("Committing skip reset failed")?;
        Ok(updated > 0)
    }
}

/// Volatile [`SkipStore`], nothing survives the process.
#[derive(Debug, Default)]
pub struct MemoryStore {
    tracks: Mutex<HashMap<String, SkippedTrack>>,
    settings: Mutex<HashMap<String, String>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl SkipStore for MemoryStore {
    fn get_skipped_track(&self, id: &str) -> Result<Option<SkippedTrack>> {
        Ok(lock(&self.tracks).get(id).cloned())
    }

    fn upsert_skip_event(&self, track: &TrackRef, event: SkipEvent, is_manual: bool) -> Result<SkippedTrack> {
        let mut tracks = lock(&self.tracks);
        let record = tracks
            .entry(track.id.clone())
            .or_insert_with(|| SkippedTrack::new(track));
        record.name.clone_from(&track.name);
        record.artist.clone_from(&track.artist);
        record.push_skip(event, is_manual);
        Ok(record.clone())
    }

    fn record_completion(&self, track: &TrackRef) -> Result<()> {
        let mut tracks = lock(&self.tracks);
        let record = tracks
            .entry(track.id.clone())
            .or_insert_with(|| SkippedTrack::new(track));
        record.not_skipped_count += 1;
        Ok(())
    }

    fn get_setting(&self, name: &str) -> Result<Option<String>> {
        Ok(lock(&self.settings).get(name).cloned())
    }

    fn set_setting(&self, name: &str, value: &str) -> Result<()> {
        lock(&self.settings).insert(name.to_string(), value.to_string());
        Ok(())
    }

    fn list_skipped_tracks(&self) -> Result<Vec<SkippedTrack>> {
        let mut tracks: Vec<SkippedTrack> = lock(&self.tracks).values().cloned().collect();
        tracks.sort_by(|a, b| {
            b.skip_count
                .cmp(&a.skip_count)
                .then(a.not_skipped_count.cmp(&b.not_skipped_count))
                .then_with(|| a.id.cmp(&b.id))
        });
        Ok(tracks)
    }

    fn reset_skip_count(&self, id: &str) -> Result<bool> {
        match lock(&self.tracks).get_mut(id) {
            Some(record) => {
                record.reset_skips();
                Ok(true)
            }
            None => Ok(false),
        }
    }
}
