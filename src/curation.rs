//! Library curation outside a monitoring session: the skip list and the
//! threshold sweep.

use crate::client::AuthorizedClient;
use crate::db::SkipStore;
use crate::model::SkippedTrack;
use anyhow::{Context, Result};
use log::{info, warn};
use std::fmt::Write;

/// Outcome of [`enforce_skip_threshold`].
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SweepReport {
    /// Ids removed from the library.
    pub removed: Vec<String>,
    /// Ids whose removal failed, with the reason.
    pub failed: Vec<(String, String)>,
}

/// Remove every recorded track with at least `threshold` skips from the library.
///
/// Skip records are kept. A failing removal is reported and the sweep continues.
pub fn enforce_skip_threshold(client: &AuthorizedClient, store: &dyn SkipStore, threshold: u32) -> Result<SweepReport> {
    let records = store.list_skipped_tracks().context("Failed to read skip records")?;
    let mut report = SweepReport::default();

    for record in records.iter().filter(|record| record.skip_count >= threshold) {
        match client.remove_from_library(&record.id) {
            Ok(true) => {
                info!("Removed {} - {} ({} skips)", record.artist, record.name, record.skip_count);
                report.removed.push(record.id.clone());
            }
            Ok(false) => {
                warn!("Library refused to remove {}", record.id);
                report.failed.push((record.id.clone(), "refused by the service".to_string()));
            }
            Err(err) => {
                warn!("Failed to remove {}: {err}", record.id);
                report.failed.push((record.id.clone(), err.to_string()));
            }
        }
    }

    Ok(report)
}

/// Render skip records as a table, keeping the first `limit` rows.
pub fn format_skip_list(records: &[SkippedTrack], limit: Option<usize>) -> String {
    let mut out = String::new();
    if records.is_empty() {
        out.push_str("No skipped tracks recorded.\n");
        return out;
    }

    let _ = writeln!(
        out,
        "{:<24} {:<32} {:<24} {:>7} {:>8}  {}",
        "ID", "Title", "Artist", "Skipped", "Listened", "Last skipped"
    );
    for record in records.iter().take(limit.unwrap_or(usize::MAX)) {
        let last = record
            .last_skipped
            .map(|at| at.format("%Y-%m-%d %H:%M").to_string())
            .unwrap_or_else(|| "-".to_string());
        let _ = writeln!(
            out,
            "{:<24} {:<32} {:<24} {:>7} {:>8}  {}",
            record.id,
            truncate(&record.name, 32),
            truncate(&record.artist, 24),
            record.skip_count,
            record.not_skipped_count,
            last
        );
    }
    out
}

fn truncate(text: &str, width: usize) -> String {
    if text.chars().count() <= width {
        return text.to_string();
    }
    let mut short: String = text.chars().take(width.saturating_sub(1)).collect();
    short.push('…');
    short
}
