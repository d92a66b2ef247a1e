//! # skiptrack Performance Benchmarks
//!
//! The classifier runs on every track change and the interpolator four times a
//! second; both must stay far below a millisecond.
//!
//! ```bash
//! cargo bench
//! cargo bench classifier
//! ```

use criterion::{criterion_group, criterion_main, BenchmarkId, Criterion};
use skiptrack::api::{Artist, PlaybackSnapshot, TrackItem};
use skiptrack::classifier::{classify, OutgoingTrack};
use skiptrack::config::ClassifierConfig;
use skiptrack::db::{MemoryStore, SkipStore};
use skiptrack::events::LogSink;
use skiptrack::interpolator;
use skiptrack::model::{SkipEvent, TrackRef};
use skiptrack::state::{PlaybackState, RecentTracks};
use std::hint::black_box;
use std::sync::Mutex;
use std::time::{Duration, Instant};

/// Helper function to create an outgoing track at `progress_ms` of a 200 s track
fn outgoing(progress_ms: u64) -> OutgoingTrack {
    OutgoingTrack {
        track_id: "outgoing".into(),
        track_name: "Benchmark Song".into(),
        artist_name: "Benchmark Artist".into(),
        context: None,
        progress_ms,
        duration_ms: 200_000,
        is_in_library: true,
        is_playing: true,
        pause_started: None,
        total_pause: Duration::ZERO,
    }
}

fn playing_state() -> PlaybackState {
    let snapshot = PlaybackSnapshot {
        is_playing: true,
        progress_ms: Some(30_000),
        item: Some(TrackItem {
            id: Some("current".into()),
            name: "Benchmark Song".into(),
            duration_ms: 200_000,
            artists: vec![Artist { name: "Benchmark Artist".into() }],
            album: None,
        }),
        context: None,
    };
    let mut state = PlaybackState::default();
    if let Some(item) = snapshot.item.clone() {
        state.load_track(&snapshot, &item, true, Instant::now());
    }
    state
}

fn benchmark_classifier(c: &mut Criterion) {
    let mut group = c.benchmark_group("classifier");
    let config = ClassifierConfig::default();
    let mut recent = RecentTracks::new();
    for id in ["r1", "r2", "r3", "r4", "r5"] {
        recent.push(id);
    }
    let now = Instant::now();

    for progress_ms in [10_000u64, 150_000] {
        group.bench_with_input(BenchmarkId::new("classify", progress_ms), &outgoing(progress_ms), |b, track| {
            b.iter(|| classify(black_box(track), black_box("incoming"), &recent, &config, now))
        });
    }

    group.bench_function("classify_revisit", |b| {
        let track = outgoing(10_000);
        b.iter(|| classify(black_box(&track), black_box("r5"), &recent, &config, now))
    });

    group.bench_function("record_skip_memory_store", |b| {
        let store = MemoryStore::new();
        let track = TrackRef { id: "t".into(), name: "Song".into(), artist: "Artist".into() };
        b.iter(|| {
            let event = SkipEvent {
                timestamp: chrono::Utc::now(),
                progress: 0.1,
                play_duration_ms: Some(20_000),
                is_manual_skip: true,
                context: None,
            };
            black_box(store.upsert_skip_event(&track, event, true).ok());
            black_box(store.reset_skip_count("t").ok());
        })
    });

    group.finish();
}

fn benchmark_interpolator(c: &mut Criterion) {
    let mut group = c.benchmark_group("interpolator");

    group.bench_function("interpolate", |b| {
        let mut state = playing_state();
        let later = Instant::now() + Duration::from_millis(750);
        b.iter(|| interpolator::interpolate(black_box(&mut state), later))
    });

    group.bench_function("tick_with_log_sink", |b| {
        let state = Mutex::new(playing_state());
        let sink = LogSink;
        b.iter(|| interpolator::tick(black_box(&state), &sink, Instant::now()))
    });

    group.finish();
}

criterion_group!(benches, benchmark_classifier, benchmark_interpolator);
criterion_main!(benches);
