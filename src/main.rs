//! # skiptrack
//!
//! Command-line front end of the skip monitor. Settings and skip records live in a
//! SQLite database in the platform data directory (override with `--db`).
//!
//! ## Usage
//!
//! ```bash
//! # Store credentials once
//! skiptrack config set client_id <id>
//! skiptrack config set client_secret <secret>
//! skiptrack config set refresh_token <token>
//!
//! # Watch playback
//! skiptrack monitor
//!
//! # Inspect and curate
//! skiptrack list
//! skiptrack reset <track-id>
//! skiptrack enforce
//! ```

use anyhow::{bail, Context, Result};
use clap::{CommandFactory, Parser};
use log::{debug, info};
use skiptrack::api::spotify::SpotifyClient;
use skiptrack::cli::{self, ConfigAction};
use skiptrack::client::AuthorizedClient;
use skiptrack::config::{self, MonitorConfig, SECRET_SETTINGS, SETTING_NAMES};
use skiptrack::db::{SkipStore, SqliteStore};
use skiptrack::events::{ChannelSink, MonitorEvent, MonitorStatus, PresentationUpdate};
use skiptrack::monitor::Monitor;
use skiptrack::{completion, curation};
use std::path::PathBuf;
use std::sync::Arc;

/// Main entry point.
///
/// Logging goes through `env_logger`; `RUST_LOG` wins over `--verbose`:
/// - `RUST_LOG=debug skiptrack monitor` - Everything
/// - `RUST_LOG=skiptrack::classifier=debug skiptrack monitor` - Decisions only
fn main() -> Result<()> {
    let args = cli::Args::parse();

    let default_filter = if args.verbose { "debug" } else { "info" };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(default_filter)).init();

    match args.command {
        cli::Command::Monitor { json } => {
            let store = open_store(args.db)?;
            run_monitor(store, json)?;
        }
        cli::Command::List { limit } => {
            let store = open_store(args.db)?;
            let records = store.list_skipped_tracks()?;
            print!("{}", curation::format_skip_list(&records, limit));
        }
        cli::Command::Reset { track_id } => {
            let store = open_store(args.db)?;
            if !store.reset_skip_count(&track_id)? {
                bail!("No skip record for track {track_id}");
            }
            println!("Reset skip count of {track_id}");
        }
        cli::Command::Enforce => {
            let store = open_store(args.db)?;
            let threshold = MonitorConfig::load(store.as_ref())?.classifier.skip_count_threshold;
            let client = AuthorizedClient::new(Arc::new(SpotifyClient::new()?), store.clone());
            client.set_credentials(config::load_credentials(store.as_ref())?);

            info!("Removing tracks with at least {threshold} skips");
            let report = curation::enforce_skip_threshold(&client, store.as_ref(), threshold)?;
            println!("Removed {} track(s) from the library", report.removed.len());
            for (id, reason) in &report.failed {
                eprintln!("Could not remove {id}: {reason}");
            }
            if !report.failed.is_empty() {
                bail!("{} removal(s) failed", report.failed.len());
            }
        }
        cli::Command::Config { action } => {
            let store = open_store(args.db)?;
            run_config(store.as_ref(), action)?;
        }
        cli::Command::Completion { shell } => {
            let mut cmd = cli::Args::command();
            completion::generate_completions(completion::shell_to_completion_shell(&shell), &mut cmd);
        }
    }

    Ok(())
}

fn open_store(db: Option<PathBuf>) -> Result<Arc<SqliteStore>> {
    let path = match db {
        Some(path) => path,
        None => config::get_db_path()?,
    };
    debug!("Using database {}", path.display());
    Ok(Arc::new(SqliteStore::open(&path)?))
}

/// Run a monitoring session and print what it reports until it ends.
fn run_monitor(store: Arc<SqliteStore>, json: bool) -> Result<()> {
    let settings = MonitorConfig::load(store.as_ref())?;
    let credentials = config::load_credentials(store.as_ref())?;
    let api = SpotifyClient::new().context("Failed to build HTTP client")?;

    let (sink, events) = ChannelSink::new();
    let monitor = Monitor::new(Arc::new(api), store, Arc::new(sink), settings);
    if !monitor.start(credentials) {
        bail!("Could not start monitoring. Store credentials with `skiptrack config set refresh_token <token>`");
    }

    let mut last_track = String::new();
    for event in events {
        match event {
            MonitorEvent::Playback(update) if json => {
                println!("{}", serde_json::to_string(&update)?);
            }
            MonitorEvent::Playback(update) => {
                if is_news(&update, &last_track) {
                    print_now_playing(&update);
                    last_track.clone_from(&update.track_id);
                }
            }
            MonitorEvent::Status(MonitorStatus::Error) => {
                monitor.stop();
                bail!("Monitoring stopped after repeated failures");
            }
            MonitorEvent::Status(MonitorStatus::Inactive) => break,
            MonitorEvent::Status(status) => debug!("Monitor status: {status:?}"),
        }
    }

    Ok(())
}

/// Track changes and the final `monitoring_stopped` update are printed; progress ticks are not.
fn is_news(update: &PresentationUpdate, last_track: &str) -> bool {
    update.monitoring_stopped == Some(true) || update.track_id != last_track
}

fn print_now_playing(update: &PresentationUpdate) {
    if let Some(error) = &update.error {
        eprintln!("Error: {error}");
    } else if update.is_empty() {
        println!("Nothing playing");
    } else {
        let saved = if update.is_in_library { "saved" } else { "not saved" };
        println!(
            "{} - {} ({}, {}:{:02}, {saved})",
            update.artist_name,
            update.track_name,
            update.album_name,
            update.duration_sec / 60,
            update.duration_sec % 60
        );
    }
}

fn run_config(store: &dyn SkipStore, action: ConfigAction) -> Result<()> {
    match action {
        ConfigAction::Get { name } => {
            if !SETTING_NAMES.contains(&name.as_str()) {
                bail!("Unknown setting {name:?}. Known settings: {}", SETTING_NAMES.join(", "));
            }
            match store.get_setting(&name)? {
                Some(value) => println!("{value}"),
                None => println!("(unset)"),
            }
        }
        ConfigAction::Set { name, value } => {
            config::validate_setting(&name, &value)?;
            store.set_setting(&name, value.trim())?;
            println!("{name} = {}", display_value(&name, value.trim()));
        }
        ConfigAction::Show => {
            for name in SETTING_NAMES {
                let value = store.get_setting(name)?;
                let shown = value.as_deref().map_or_else(|| "(default)".to_string(), |value| display_value(name, value));
                println!("{name:<24} {shown}");
            }
        }
    }
    Ok(())
}

/// Secrets show only a short prefix.
fn display_value(name: &str, value: &str) -> String {
    if !SECRET_SETTINGS.contains(&name) {
        return value.to_string();
    }
    if value.chars().count() <= 8 {
        return "****".to_string();
    }
    let prefix: String = value.chars().take(4).collect();
    format!("{prefix}…")
}
