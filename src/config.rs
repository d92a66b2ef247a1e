//! # Configuration Module
//!
//! Data directory handling and the monitor's runtime settings.
//!
//! ## Data Storage
//!
//! The skip database lives in the platform-standard data directory:
//! - Linux: `~/.local/share/skiptrack/skiptrack.db`
//! - macOS: `~/Library/Application Support/skiptrack/skiptrack.db`
//! - Windows: `%APPDATA%\skiptrack\skiptrack.db`
//!
//! ## Settings
//!
//! Every tunable is a row in the store's `settings` table (see [`SkipStore::get_setting`]).
//! [`MonitorConfig::load`] reads them once when monitoring starts; unknown or broken
//! values fall back to their defaults with a warning. [`validate_setting`] guards the
//! `config set` command so broken values never get written in the first place.

use crate::api::Credentials;
use crate::db::SkipStore;
use crate::retry::RetryPolicy;
use anyhow::{bail, Context, Result};
use log::warn;
use std::fs;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

pub const SKIP_PROGRESS_THRESHOLD: &str = "skip_progress_threshold";
pub const SKIP_COUNT_THRESHOLD: &str = "skip_count_threshold";
pub const PAUSE_TOLERANCE_MS: &str = "pause_tolerance_ms";
pub const MANUAL_SKIPS: &str = "manual_skips";
pub const CLIENT_ID: &str = "client_id";
pub const CLIENT_SECRET: &str = "client_secret";
pub const ACCESS_TOKEN: &str = "access_token";
pub const REFRESH_TOKEN: &str = "refresh_token";

/// Every setting name the store understands.
pub const SETTING_NAMES: [&str; 8] = [
    SKIP_PROGRESS_THRESHOLD,
    SKIP_COUNT_THRESHOLD,
    PAUSE_TOLERANCE_MS,
    MANUAL_SKIPS,
    CLIENT_ID,
    CLIENT_SECRET,
    ACCESS_TOKEN,
    REFRESH_TOKEN,
];

/// Settings whose values should not be echoed back in full.
pub const SECRET_SETTINGS: [&str; 3] = [CLIENT_SECRET, ACCESS_TOKEN, REFRESH_TOKEN];

pub const DEFAULT_SKIP_PROGRESS_THRESHOLD: f64 = 0.42;
pub const DEFAULT_SKIP_COUNT_THRESHOLD: u32 = 5;
pub const DEFAULT_PAUSE_TOLERANCE: Duration = Duration::from_millis(15_000);
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_millis(1000);
pub const DEFAULT_PROGRESS_INTERVAL: Duration = Duration::from_millis(250);

/// Returns the platform-appropriate data directory, creating it when missing.
///
/// # Errors
///
/// Fails when the platform has no data directory or the `skiptrack` subdirectory
/// cannot be created.
pub fn get_data_dir() -> Result<PathBuf> {
    let data_dir = dirs::data_dir().ok_or_else(|| {
        anyhow::anyhow!(
            "Could not determine system data directory. Please ensure your platform supports standard data directories."
        )
    })?;

    let app_dir = data_dir.join("skiptrack");
    fs::create_dir_all(&app_dir).with_context(|| {
        format!(
            "Failed to create skiptrack data directory at {}. Please check file permissions.",
            app_dir.display()
        )
    })?;

    Ok(app_dir)
}

/// Returns the default database file path inside [`get_data_dir`].
pub fn get_db_path() -> Result<PathBuf> {
    Ok(get_data_dir()?.join("skiptrack.db"))
}

/// Decision thresholds used when a track changes.
#[derive(Debug, Clone, PartialEq)]
pub struct ClassifierConfig {
    /// Fraction of a track that counts as "listened to".
    pub skip_progress_threshold: f64,
    /// Paused time at which a low-progress transition is no longer a skip.
    pub pause_tolerance: Duration,
    /// Skip count at which a track is removed from the library.
    pub skip_count_threshold: u32,
    /// Recorded as `is_manual_skip` on every skip event.
    pub manual_skips: bool,
}

impl Default for ClassifierConfig {
    fn default() -> Self {
        Self {
            skip_progress_threshold: DEFAULT_SKIP_PROGRESS_THRESHOLD,
            pause_tolerance: DEFAULT_PAUSE_TOLERANCE,
            skip_count_threshold: DEFAULT_SKIP_COUNT_THRESHOLD,
            manual_skips: true,
        }
    }
}

/// Everything a monitoring session needs besides its collaborators.
#[derive(Debug, Clone, PartialEq)]
pub struct MonitorConfig {
    pub classifier: ClassifierConfig,
    pub poll_interval: Duration,
    pub progress_interval: Duration,
    pub retry: RetryPolicy,
}

impl Default for MonitorConfig {
    fn default() -> Self {
        Self {
            classifier: ClassifierConfig::default(),
            poll_interval: DEFAULT_POLL_INTERVAL,
            progress_interval: DEFAULT_PROGRESS_INTERVAL,
            retry: RetryPolicy::default(),
        }
    }
}

impl MonitorConfig {
    /// Read the classifier settings from `store`, keeping defaults for anything
    /// missing or invalid.
    pub fn load(store: &dyn SkipStore) -> Result<Self> {
        let defaults = ClassifierConfig::default();
        let classifier = ClassifierConfig {
            skip_progress_threshold: read_setting(
                store,
                SKIP_PROGRESS_THRESHOLD,
                defaults.skip_progress_threshold,
            )?,
            pause_tolerance: Duration::from_millis(read_setting(
                store,
                PAUSE_TOLERANCE_MS,
                defaults.pause_tolerance.as_millis() as u64,
            )?),
            skip_count_threshold: read_setting(store, SKIP_COUNT_THRESHOLD, defaults.skip_count_threshold)?,
            manual_skips: read_setting(store, MANUAL_SKIPS, defaults.manual_skips)?,
        };

        Ok(Self { classifier, ..Self::default() })
    }
}

fn read_setting<T: FromStr>(store: &dyn SkipStore, name: &str, default: T) -> Result<T> {
    let Some(raw) = store.get_setting(name)? else {
        return Ok(default);
    };
    if let Err(err) = validate_setting(name, &raw) {
        warn!("Ignoring setting {name}={raw:?}: {err:#}");
        return Ok(default);
    }
    Ok(raw.trim().parse().unwrap_or(default))
}

/// Reject values the monitor could not use.
pub fn validate_setting(name: &str, value: &str) -> Result<()> {
    let value = value.trim();
    match name {
        SKIP_PROGRESS_THRESHOLD => {
            let threshold: f64 = value
                .parse()
                .with_context(|| format!("{name} must be a number, got {value:?}"))?;
            if !(0.0..=1.0).contains(&threshold) {
                bail!("{name} must be between 0 and 1, got {threshold}");
            }
        }
        SKIP_COUNT_THRESHOLD => {
            let threshold: u32 = value
                .parse()
                .with_context(|| format!("{name} must be a whole number, got {value:?}"))?;
            if threshold == 0 {
                bail!("{name} must be at least 1");
            }
        }
        PAUSE_TOLERANCE_MS => {
            value
                .parse::<u64>()
                .with_context(|| format!("{name} must be milliseconds, got {value:?}"))?;
        }
        MANUAL_SKIPS => {
            value
                .parse::<bool>()
                .with_context(|| format!("{name} must be true or false, got {value:?}"))?;
        }
        CLIENT_ID | CLIENT_SECRET | ACCESS_TOKEN | REFRESH_TOKEN => {}
        other => bail!("Unknown setting {other:?}. Known settings: {}", SETTING_NAMES.join(", ")),
    }
    Ok(())
}

/// Read the stored API credentials.
pub fn load_credentials(store: &dyn SkipStore) -> Result<Credentials> {
    let read = |name: &str| -> Result<String> { Ok(store.get_setting(name)?.unwrap_or_default()) };

    Ok(Credentials {
        client_id: read(CLIENT_ID)?,
        client_secret: read(CLIENT_SECRET)?,
        access_token: read(ACCESS_TOKEN)?,
        refresh_token: read(REFRESH_TOKEN)?,
    })
}
