//! Playback monitor that learns which library tracks you keep skipping.
//!
//! skiptrack polls the streaming service for what is playing, notices when the
//! track changes, and decides whether the track that was left was skipped, listened
//! to, or merely interrupted by a long pause. Skips of saved tracks are recorded, and a
//! track that reaches the skip threshold is removed from the library.
//!
//! Core modules:
//! - [`monitor`] - Session lifecycle and timer threads
//! - `poller` - Fetch, change detection and state commits (internal)
//! - [`interpolator`] - Smooth progress between polls
//! - [`classifier`] - Skip / completion / pause decisions and their effects
//! - [`db`] - Skip records and settings
//!
//! ### Supporting Modules
//!
//! - [`api`] - Remote playback API contract and the Spotify client
//! - [`client`] - Credential handling and token refresh
//! - [`retry`] - Exponential backoff with jitter
//! - [`config`] - Data directory and runtime settings
//! - [`curation`] - Skip list and threshold sweep
//! - [`events`] - Presentation updates and status notifications
//!
//! ## Quick Start Example
//!
//! ```no_run
//! use skiptrack::api::spotify::SpotifyClient;
//! use skiptrack::config::{self, MonitorConfig};
//! use skiptrack::db::SqliteStore;
//! use skiptrack::events::LogSink;
//! use skiptrack::monitor::Monitor;
//! use std::sync::Arc;
//!
//! let store = Arc::new(SqliteStore::open(&config::get_db_path()?)?);
//! let settings = MonitorConfig::load(store.as_ref())?;
//! let credentials = config::load_credentials(store.as_ref())?;
//!
//! let monitor = Monitor::new(Arc::new(SpotifyClient::new()?), store, Arc::new(LogSink), settings);
//! if monitor.start(credentials) {
//!     // ... later
//!     monitor.stop();
//! }
//! # Ok::<(), Box<dyn std::error::Error>>(())
//! ```
//!
//! ## Skip Detection
//!
//! When the playing track changes, the outgoing track is judged in this order:
//!
//! - **Revisit**: the new track is among the last five played, nothing is counted
//! - **Completion**: progress reached `skip_progress_threshold` (default 42%)
//! - **Pause-interrupted**: paused for at least `pause_tolerance_ms` (default 15 s)
//! - **Skip**: anything else
//!
//! Only tracks in the user's library are recorded. Removal fires once, when the skip
//! count first reaches `skip_count_threshold` (default 5).
//!
//! ## Error Handling
//!
//! Store and application functions return `anyhow::Result`; the remote layer uses the
//! typed [`error::ApiError`]. Failures inside a running session are logged and never
//! crash it, except a playback fetch that keeps failing after all retries, which stops
//! the session and reports `monitoring_stopped`.

pub mod api;
pub mod classifier;
pub mod cli;
pub mod client;
pub mod completion;
pub mod config;
pub mod curation;
pub mod db;
pub mod error;
pub mod events;
pub mod interpolator;
pub mod model;
pub mod monitor;
mod poller;
pub mod retry;
pub mod state;
