use std::collections::HashSet;
use std::fmt;
use std::str::FromStr;

use chrono::{Days, NaiveDate};
use clap::ValueEnum;
use serde::{Deserialize, Serialize};

use crate::error::SyncError;

pub const DATE_FORMAT: &str = "%Y-%m-%d";

/// Days before today covered by the rolling window.
pub const ROLLING_WINDOW_DAYS: u64 = 90;

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum DestinationKind {
    /// BigQuery table, bulk append.
    Warehouse,
    /// Notion database, one page per entry.
    Workspace,
}

impl fmt::Display for DestinationKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DestinationKind::Warehouse => write!(f, "warehouse"),
            DestinationKind::Workspace => write!(f, "workspace"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct EntryId(u64);

impl EntryId {
    pub fn new(value: u64) -> Self {
        Self(value)
    }

    pub fn get(self) -> u64 {
        self.0
    }
}

impl fmt::Display for EntryId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<u64> for EntryId {
    fn from(value: u64) -> Self {
        Self(value)
    }
}

impl FromStr for EntryId {
    type Err = SyncError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        let trimmed = value.trim();
        // Spreadsheet exports sometimes render integer ids as "501.0".
        let digits = trimmed.strip_suffix(".0").unwrap_or(trimmed);
        digits
            .parse::<u64>()
            .map(Self)
            .map_err(|_| SyncError::InvalidEntryId(value.to_string()))
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Project {
    pub id: u64,
    pub name: String,
    pub client_id: Option<u64>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Task {
    pub id: u64,
    pub name: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Client {
    pub id: u64,
    pub name: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ReferenceData {
    pub projects: Vec<Project>,
    pub tasks: Vec<Task>,
    pub clients: Vec<Client>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct TimeEntry {
    pub id: EntryId,
    pub date: NaiveDate,
    pub hours: Option<f64>,
    pub project_id: Option<u64>,
    pub task_id: Option<u64>,
}

/// A time entry with its reference names filled in.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MergedRecord {
    pub entry_id: EntryId,
    pub date: NaiveDate,
    pub hours: Option<f64>,
    pub client: Option<String>,
    pub project: Option<String>,
    pub task: Option<String>,
}

/// A synced row read back from a destination.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StoredRow {
    pub id: EntryId,
    pub date: Option<NaiveDate>,
    pub hours: Option<f64>,
    pub client: Option<String>,
    pub project: Option<String>,
    pub task: Option<String>,
}

/// Entry ids already present in a destination.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ExistingIdSet(HashSet<EntryId>);

impl ExistingIdSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn contains(&self, id: EntryId) -> bool {
        self.0.contains(&id)
    }

    pub fn insert(&mut self, id: EntryId) -> bool {
        self.0.insert(id)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl FromIterator<EntryId> for ExistingIdSet {
    fn from_iter<I: IntoIterator<Item = EntryId>>(iter: I) -> Self {
        Self(iter.into_iter().collect())
    }
}

impl Extend<EntryId> for ExistingIdSet {
    fn extend<I: IntoIterator<Item = EntryId>>(&mut self, iter: I) {
        self.0.extend(iter)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct DateWindow {
    pub start: NaiveDate,
    pub end: NaiveDate,
}

impl DateWindow {
    pub fn new(start: NaiveDate, end: NaiveDate) -> Result<Self, SyncError> {
        if start > end {
            return Err(SyncError::InvalidWindow(format!(
                "start {start} is after end {end}"
            )));
        }
        Ok(Self { start, end })
    }

    /// `today - 90 days ..= tomorrow`.
    pub fn rolling(today: NaiveDate) -> Self {
        let start = today
            .checked_sub_days(Days::new(ROLLING_WINDOW_DAYS))
            .unwrap_or(NaiveDate::MIN);
        let end = today.checked_add_days(Days::new(1)).unwrap_or(NaiveDate::MAX);
        Self { start, end }
    }

    pub fn start_param(&self) -> String {
        self.start.format(DATE_FORMAT).to_string()
    }

    pub fn end_param(&self) -> String {
        self.end.format(DATE_FORMAT).to_string()
    }
}

impl fmt::Display for DateWindow {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}..{}", self.start_param(), self.end_param())
    }
}

pub fn parse_date(value: &str) -> Result<NaiveDate, SyncError> {
    NaiveDate::parse_from_str(value.trim(), DATE_FORMAT)
        .map_err(|_| SyncError::InvalidDate(value.to_string()))
}
