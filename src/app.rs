use std::time::{Duration, Instant};

use serde::Serialize;

use crate::dedup::filter_new;
use crate::domain::{DateWindow, EntryId, StoredRow};
use crate::error::SyncError;
use crate::join::merge;
use crate::keeping::{KeepingClient, fetch_reference_data, fetch_time_entries};
use crate::sink::{Destination, RowFailure};

#[derive(Debug, Clone, Copy, Default)]
pub struct SyncOptions {
    pub dry_run: bool,
}

#[derive(Debug, Clone, Serialize)]
pub struct SyncResult {
    pub destination: String,
    pub window: DateWindow,
    pub fetched: usize,
    pub existing: usize,
    pub new_entries: Vec<EntryId>,
    pub written: usize,
    pub failures: Vec<RowFailure>,
    pub action: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct ShowResult {
    pub destination: String,
    pub rows: Vec<StoredRow>,
}

#[derive(Debug, Clone)]
pub struct ProgressEvent {
    pub message: String,
    pub elapsed: Option<Duration>,
}

pub trait ProgressSink {
    fn event(&self, event: ProgressEvent);
}

#[derive(Clone)]
pub struct App<K: KeepingClient> {
    keeping: K,
}

impl<K: KeepingClient> App<K> {
    pub fn new(keeping: K) -> Self {
        Self { keeping }
    }

    /// Fetch, join, dedup against `destination` and append what is new.
    pub fn sync<D: Destination + ?Sized>(
        &self,
        destination: &D,
        window: &DateWindow,
        options: SyncOptions,
        sink: &dyn ProgressSink,
    ) -> Result<SyncResult, SyncError> {
        sink.event(ProgressEvent {
            message: "phase=Fetch; projects, tasks and clients".to_string(),
            elapsed: None,
        });
        let start = Instant::now();
        let reference = fetch_reference_data(&self.keeping)?;
        tracing::info!(
            projects = reference.projects.len(),
            tasks = reference.tasks.len(),
            clients = reference.clients.len(),
            "loaded reference data"
        );

        sink.event(ProgressEvent {
            message: format!("phase=Fetch; time entries {window}"),
            elapsed: Some(start.elapsed()),
        });
        let entries = fetch_time_entries(&self.keeping, window)?;
        tracing::info!(entries = entries.len(), %window, "loaded time entries");

        let merged = merge(&entries, &reference);

        sink.event(ProgressEvent {
            message: format!("phase=Dedup; reading {}", destination.describe()),
            elapsed: Some(start.elapsed()),
        });
        let existing = destination.existing_ids()?;
        let fresh = filter_new(merged, &existing);
        tracing::info!(
            existing = existing.len(),
            new = fresh.len(),
            "filtered known entries"
        );

        let mut result = SyncResult {
            destination: destination.describe(),
            window: *window,
            fetched: entries.len(),
            existing: existing.len(),
            new_entries: fresh.iter().map(|record| record.entry_id).collect(),
            written: 0,
            failures: Vec::new(),
            action: String::new(),
        };

        if fresh.is_empty() {
            sink.event(ProgressEvent {
                message: format!("No new entries to upload to {}", result.destination),
                elapsed: Some(start.elapsed()),
            });
            result.action = "up-to-date".to_string();
            return Ok(result);
        }

        if options.dry_run {
            sink.event(ProgressEvent {
                message: format!(
                    "Dry run: {} new entries would be uploaded to {}",
                    fresh.len(),
                    result.destination
                ),
                elapsed: Some(start.elapsed()),
            });
            result.action = "dry-run".to_string();
            return Ok(result);
        }

        sink.event(ProgressEvent {
            message: format!("phase=Store; writing {} rows", fresh.len()),
            elapsed: Some(start.elapsed()),
        });
        let report = destination.write(&fresh, sink)?;
        result.written = report.written;
        result.failures = report.failures;
        result.action = if result.failures.is_empty() {
            "uploaded".to_string()
        } else {
            "partial".to_string()
        };
        Ok(result)
    }
}

/// Rows currently stored in `destination`.
pub fn show<D: Destination + ?Sized>(
    destination: &D,
    sink: &dyn ProgressSink,
) -> Result<ShowResult, SyncError> {
    sink.event(ProgressEvent {
        message: format!("phase=Fetch; reading {}", destination.describe()),
        elapsed: None,
    });
    Ok(ShowResult {
        destination: destination.describe(),
        rows: destination.stored_rows()?,
    })
}
