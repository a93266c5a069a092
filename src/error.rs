use std::path::PathBuf;

use miette::Diagnostic;
use thiserror::Error;

#[derive(Debug, Error, Diagnostic)]
pub enum SyncError {
    #[error("Keeping request failed: {0}")]
    KeepingHttp(String),

    #[error("Keeping returned status {status}: {message}")]
    KeepingStatus { status: u16, message: String },

    #[error("unexpected Keeping response: {0}")]
    KeepingPayload(String),

    #[error("Notion request failed: {0}")]
    NotionHttp(String),

    #[error("Notion returned status {status}: {message}")]
    NotionStatus { status: u16, message: String },

    #[error("unexpected Notion response: {0}")]
    NotionPayload(String),

    #[error("BigQuery request failed: {0}")]
    WarehouseHttp(String),

    #[error("BigQuery returned status {status}: {message}")]
    WarehouseStatus { status: u16, message: String },

    #[error("unexpected BigQuery response: {0}")]
    WarehousePayload(String),

    #[error("BigQuery rejected {rejected} of {total} rows: {message}")]
    WarehouseInsert {
        rejected: usize,
        total: usize,
        message: String,
    },

    #[error("BigQuery append stopped after {committed} of {total} rows were stored")]
    PartialAppend {
        committed: usize,
        total: usize,
        #[source]
        source: Box<SyncError>,
    },

    #[error("{source_name} kept reporting more pages after {limit} requests")]
    PageLimit {
        source_name: &'static str,
        limit: usize,
    },

    #[error("invalid date: {0}")]
    InvalidDate(String),

    #[error("invalid time entry id: {0}")]
    InvalidEntryId(String),

    #[error("missing required setting {0}")]
    #[diagnostic(help("set it in keeping-sync.json or as an environment variable"))]
    MissingConfig(String),

    #[error("failed to read config file at {0}")]
    ConfigRead(PathBuf),

    #[error("failed to parse JSON config: {0}")]
    ConfigParse(String),

    #[error("invalid date window: {0}")]
    InvalidWindow(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    Upstream,
    Parse,
    Config,
}

impl SyncError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            SyncError::KeepingHttp(_)
            | SyncError::KeepingStatus { .. }
            | SyncError::KeepingPayload(_)
            | SyncError::NotionHttp(_)
            | SyncError::NotionStatus { .. }
            | SyncError::NotionPayload(_)
            | SyncError::WarehouseHttp(_)
            | SyncError::WarehouseStatus { .. }
            | SyncError::WarehousePayload(_)
            | SyncError::WarehouseInsert { .. }
            | SyncError::PartialAppend { .. }
            | SyncError::PageLimit { .. } => ErrorKind::Upstream,
            SyncError::InvalidDate(_) | SyncError::InvalidEntryId(_) => ErrorKind::Parse,
            SyncError::MissingConfig(_)
            | SyncError::ConfigRead(_)
            | SyncError::ConfigParse(_)
            | SyncError::InvalidWindow(_) => ErrorKind::Config,
        }
    }
}
