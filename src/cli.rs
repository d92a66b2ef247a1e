//! # Command-Line Interface Module
//!
//! Clap derive definitions for the `skiptrack` binary.
//!
//! ## Commands
//!
//! - `monitor`: Watch playback and record skips until monitoring stops
//! - `list`: Show recorded skips, most skipped first
//! - `reset`: Zero a track's skip counter
//! - `enforce`: Remove every track at or above the skip threshold from the library
//! - `config`: Read and write settings
//! - `completion`: Generate shell completions
//!
//! ## Examples
//!
//! ```bash
//! skiptrack config set refresh_token AQD...
//! skiptrack monitor
//! skiptrack list --limit 20
//! skiptrack reset 4uLU6hMCjMI75M1A2tKUQC
//! ```

use clap::{Parser, Subcommand, ValueEnum};
use std::path::PathBuf;

/// Shell types supported for completion generation
#[derive(Copy, Clone, PartialEq, Eq, PartialOrd, Ord, ValueEnum, Debug)]
#[allow(clippy::enum_variant_names)]
pub enum Shell {
    Bash,
    Zsh,
    Fish,
    PowerShell,
    Elvish,
}

/// Main application arguments structure.
#[derive(Parser)]
#[command(name = "skiptrack")]
#[command(about = "skiptrack: notice skipped tracks and prune them from your library")]
#[command(version)]
pub struct Args {
    /// Path to the skip database
    ///
    /// Defaults to `skiptrack.db` in the platform data directory.
    #[arg(long, global = true, env = "SKIPTRACK_DB")]
    pub db: Option<PathBuf>,

    /// Log at debug level unless RUST_LOG says otherwise
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// The subcommand to execute
    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand)]
pub enum Command {
    /// Monitor playback and record skips
    ///
    /// Uses the credentials stored with `config set`. Runs until monitoring stops
    /// on its own (the service keeps failing) or the process is interrupted.
    Monitor {
        /// Print every presentation update as JSON instead of a status line
        #[arg(long)]
        json: bool,
    },

    /// List recorded skips, most skipped first
    List {
        /// Show at most this many tracks
        #[arg(short, long)]
        limit: Option<usize>,
    },

    /// Reset the skip counter of a track
    ///
    /// Clears the skip history of the track. The next time it reaches the skip
    /// threshold it is removed from the library again.
    Reset {
        /// Track id as reported by the service
        track_id: String,
    },

    /// Remove every track at or above the skip threshold from the library
    Enforce,

    /// Read and write settings
    Config {
        #[command(subcommand)]
        action: ConfigAction,
    },

    /// Generate shell completions
    Completion {
        /// Shell to generate completions for
        #[arg(value_enum)]
        shell: Shell,
    },
}

#[derive(Subcommand)]
pub enum ConfigAction {
    /// Print the value of a setting
    Get {
        /// Setting name, e.g. skip_count_threshold
        name: String,
    },
    /// Validate and store a setting
    Set {
        name: String,
        value: String,
    },
    /// Print every setting, secrets masked
    Show,
}
