//! The two destinations a sync run can append to.

use serde::Serialize;

use crate::app::{ProgressEvent, ProgressSink};
use crate::domain::{EntryId, ExistingIdSet, MergedRecord, StoredRow};
use crate::error::SyncError;
use crate::notion::{self, WorkspaceClient};
use crate::warehouse::{self, WarehouseClient};

#[derive(Debug, Clone, Default, Serialize)]
pub struct WriteReport {
    pub attempted: usize,
    pub written: usize,
    pub failures: Vec<RowFailure>,
}

#[derive(Debug, Clone, Serialize)]
pub struct RowFailure {
    pub entry_id: EntryId,
    pub message: String,
}

pub trait Destination {
    fn describe(&self) -> String;
    /// Ids of every row currently stored.
    fn existing_ids(&self) -> Result<ExistingIdSet, SyncError>;
    fn stored_rows(&self) -> Result<Vec<StoredRow>, SyncError>;
    /// Appends `records`. Callers never pass an empty slice.
    fn write(
        &self,
        records: &[MergedRecord],
        sink: &dyn ProgressSink,
    ) -> Result<WriteReport, SyncError>;
}

/// BigQuery table; all rows go out in one append.
pub struct WarehouseDestination<W: WarehouseClient> {
    client: W,
}

impl<W: WarehouseClient> WarehouseDestination<W> {
    pub fn new(client: W) -> Self {
        Self { client }
    }
}

impl<W: WarehouseClient> Destination for WarehouseDestination<W> {
    fn describe(&self) -> String {
        format!("BigQuery table {}", self.client.table())
    }

    fn existing_ids(&self) -> Result<ExistingIdSet, SyncError> {
        warehouse::existing_ids(&self.client)
    }

    fn stored_rows(&self) -> Result<Vec<StoredRow>, SyncError> {
        warehouse::fetch_rows(&self.client)
    }

    fn write(
        &self,
        records: &[MergedRecord],
        sink: &dyn ProgressSink,
    ) -> Result<WriteReport, SyncError> {
        self.client.insert_rows(records)?;
        tracing::info!(table = %self.client.table(), rows = records.len(), "appended rows");
        sink.event(ProgressEvent {
            message: format!(
                "Uploaded {} rows to {}",
                records.len(),
                self.client.table()
            ),
            elapsed: None,
        });
        Ok(WriteReport {
            attempted: records.len(),
            written: records.len(),
            failures: Vec::new(),
        })
    }
}

/// Notion database; one page per row, failures do not stop the run.
pub struct WorkspaceDestination<N: WorkspaceClient> {
    client: N,
}

impl<N: WorkspaceClient> WorkspaceDestination<N> {
    pub fn new(client: N) -> Self {
        Self { client }
    }
}

impl<N: WorkspaceClient> Destination for WorkspaceDestination<N> {
    fn describe(&self) -> String {
        "Notion database".to_string()
    }

    fn existing_ids(&self) -> Result<ExistingIdSet, SyncError> {
        notion::existing_ids(&self.client)
    }

    fn stored_rows(&self) -> Result<Vec<StoredRow>, SyncError> {
        notion::fetch_rows(&self.client)
    }

    fn write(
        &self,
        records: &[MergedRecord],
        sink: &dyn ProgressSink,
    ) -> Result<WriteReport, SyncError> {
        let mut report = WriteReport {
            attempted: records.len(),
            ..WriteReport::default()
        };
        for (index, record) in records.iter().enumerate() {
            let position = index + 1;
            match self.client.create_page(record) {
                Ok(()) => {
                    report.written += 1;
                    sink.event(ProgressEvent {
                        message: format!(
                            "Row {position} (entry {}) added to the Notion database",
                            record.entry_id
                        ),
                        elapsed: None,
                    });
                }
                Err(err) => {
                    tracing::warn!(entry = %record.entry_id, error = %err, "failed to add row");
                    sink.event(ProgressEvent {
                        message: format!(
                            "Failed to add row {position} (entry {}): {err}",
                            record.entry_id
                        ),
                        elapsed: None,
                    });
                    report.failures.push(RowFailure {
                        entry_id: record.entry_id,
                        message: err.to_string(),
                    });
                }
            }
        }
        Ok(report)
    }
}
