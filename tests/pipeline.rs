use std::sync::{Arc, Mutex};

use assert_matches::assert_matches;
use chrono::NaiveDate;
use serde_json::{Value, json};

use keeping_sync::app::{self, App, SyncOptions};
use keeping_sync::domain::{
    Client, DateWindow, EntryId, MergedRecord, Project, Task, TimeEntry,
};
use keeping_sync::error::SyncError;
use keeping_sync::keeping::{KeepingClient, TimeEntryPage};
use keeping_sync::notion::{QueryPage, WorkspaceClient};
use keeping_sync::output::JsonOutput;
use keeping_sync::sink::{WarehouseDestination, WorkspaceDestination};
use keeping_sync::warehouse::{RowsPage, TableRef, WarehouseClient};

fn date(value: &str) -> NaiveDate {
    NaiveDate::parse_from_str(value, "%Y-%m-%d").unwrap()
}

fn window() -> DateWindow {
    DateWindow::new(date("2024-01-01"), date("2024-04-01")).unwrap()
}

fn entry(id: u64, project_id: Option<u64>, task_id: Option<u64>) -> TimeEntry {
    TimeEntry {
        id: EntryId::new(id),
        date: date("2024-03-01"),
        hours: Some(2.5),
        project_id,
        task_id,
    }
}

struct MockKeeping {
    projects: Vec<Project>,
    pages: Vec<TimeEntryPage>,
    page_requests: Mutex<Vec<u32>>,
}

impl MockKeeping {
    fn new(pages: Vec<TimeEntryPage>) -> Self {
        Self {
            projects: vec![
                Project {
                    id: 10,
                    name: "Website".to_string(),
                    client_id: Some(100),
                },
                Project {
                    id: 11,
                    name: "Intern".to_string(),
                    client_id: None,
                },
            ],
            pages,
            page_requests: Mutex::new(Vec::new()),
        }
    }

    fn single(entries: Vec<TimeEntry>) -> Self {
        Self::new(vec![TimeEntryPage {
            entries,
            current_page: 1,
            last_page: 1,
        }])
    }

    fn requested_pages(&self) -> Vec<u32> {
        self.page_requests.lock().unwrap().clone()
    }
}

impl KeepingClient for MockKeeping {
    fn fetch_projects(&self) -> Result<Vec<Project>, SyncError> {
        Ok(self.projects.clone())
    }

    fn fetch_tasks(&self) -> Result<Vec<Task>, SyncError> {
        Ok(vec![Task {
            id: 20,
            name: "Design".to_string(),
        }])
    }

    fn fetch_clients(&self) -> Result<Vec<Client>, SyncError> {
        Ok(vec![Client {
            id: 100,
            name: "Acme".to_string(),
        }])
    }

    fn fetch_time_entries_page(
        &self,
        _window: &DateWindow,
        page: u32,
    ) -> Result<TimeEntryPage, SyncError> {
        self.page_requests.lock().unwrap().push(page);
        self.pages
            .get(page as usize - 1)
            .cloned()
            .ok_or_else(|| SyncError::KeepingStatus {
                status: 404,
                message: format!("no page {page}"),
            })
    }
}

/// Table whose rows live in memory; inserts append to them.
struct MockWarehouse {
    table: TableRef,
    rows: Mutex<Vec<MergedRecord>>,
    insert_calls: Arc<Mutex<usize>>,
}

impl MockWarehouse {
    fn with_ids(ids: &[u64]) -> Self {
        Self {
            table: TableRef {
                project_id: "proj".to_string(),
                dataset_id: "uren".to_string(),
                table_id: "registratie".to_string(),
            },
            rows: Mutex::new(
                ids.iter()
                    .map(|id| MergedRecord {
                        entry_id: EntryId::new(*id),
                        date: date("2024-02-01"),
                        hours: Some(1.0),
                        client: None,
                        project: None,
                        task: None,
                    })
                    .collect(),
            ),
            insert_calls: Arc::new(Mutex::new(0)),
        }
    }

    fn insert_counter(&self) -> Arc<Mutex<usize>> {
        Arc::clone(&self.insert_calls)
    }
}

impl WarehouseClient for MockWarehouse {
    fn table(&self) -> &TableRef {
        &self.table
    }

    fn columns(&self) -> Result<Vec<String>, SyncError> {
        Ok(["ID", "Datum", "Uren", "Klant", "Project", "Taak"]
            .iter()
            .map(|name| name.to_string())
            .collect())
    }

    fn list_rows(
        &self,
        selected_fields: Option<&str>,
        _page_token: Option<&str>,
    ) -> Result<RowsPage, SyncError> {
        let rows = self
            .rows
            .lock()
            .unwrap()
            .iter()
            .map(|record| {
                let id = Value::String(record.entry_id.to_string());
                match selected_fields {
                    Some(_) => vec![id],
                    None => vec![
                        id,
                        json!(record.date.to_string()),
                        json!(record.hours.map(|hours| hours.to_string())),
                        json!(record.client),
                        json!(record.project),
                        json!(record.task),
                    ],
                }
            })
            .collect();
        Ok(RowsPage {
            rows,
            page_token: None,
        })
    }

    fn insert_rows(&self, records: &[MergedRecord]) -> Result<(), SyncError> {
        *self.insert_calls.lock().unwrap() += 1;
        self.rows.lock().unwrap().extend_from_slice(records);
        Ok(())
    }
}

/// Database that refuses to create pages for the listed entry ids.
#[derive(Default)]
struct MockWorkspace {
    pages: Mutex<Vec<MergedRecord>>,
    reject: Vec<u64>,
}

impl WorkspaceClient for MockWorkspace {
    fn query_database(&self, _start_cursor: Option<&str>) -> Result<QueryPage, SyncError> {
        let results = self
            .pages
            .lock()
            .unwrap()
            .iter()
            .map(|record| {
                json!({
                    "id": format!("page-{}", record.entry_id),
                    "properties": {
                        "ID": { "title": [{ "plain_text": record.entry_id.to_string() }] },
                        "Datum": { "date": { "start": record.date.to_string() } },
                        "Uren": { "number": record.hours },
                    }
                })
            })
            .collect();
        Ok(QueryPage {
            results,
            has_more: false,
            next_cursor: None,
        })
    }

    fn create_page(&self, record: &MergedRecord) -> Result<(), SyncError> {
        if self.reject.contains(&record.entry_id.get()) {
            return Err(SyncError::NotionStatus {
                status: 400,
                message: "validation_error".to_string(),
            });
        }
        self.pages.lock().unwrap().push(record.clone());
        Ok(())
    }
}

#[test]
fn new_entry_is_joined_and_uploaded() {
    let keeping = MockKeeping::single(vec![entry(501, Some(10), Some(20))]);
    let destination = WarehouseDestination::new(MockWarehouse::with_ids(&[]));
    let app = App::new(keeping);

    let result = app
        .sync(&destination, &window(), SyncOptions::default(), &JsonOutput)
        .unwrap();

    assert_eq!(result.action, "uploaded");
    assert_eq!(result.fetched, 1);
    assert_eq!(result.written, 1);
    assert_eq!(result.new_entries, vec![EntryId::new(501)]);

    let rows = app::show(&destination, &JsonOutput).unwrap().rows;
    assert_eq!(rows.len(), 1);
    assert_eq!(rows[0].id, EntryId::new(501));
    assert_eq!(rows[0].client.as_deref(), Some("Acme"));
    assert_eq!(rows[0].project.as_deref(), Some("Website"));
    assert_eq!(rows[0].task.as_deref(), Some("Design"));
    assert_eq!(rows[0].hours, Some(2.5));
}

#[test]
fn project_without_client_leaves_client_empty() {
    let keeping = MockKeeping::single(vec![entry(502, Some(11), None)]);
    let destination = WarehouseDestination::new(MockWarehouse::with_ids(&[]));

    App::new(keeping)
        .sync(&destination, &window(), SyncOptions::default(), &JsonOutput)
        .unwrap();

    let rows = app::show(&destination, &JsonOutput).unwrap().rows;
    assert_eq!(rows[0].client, None);
    assert_eq!(rows[0].project.as_deref(), Some("Intern"));
    assert_eq!(rows[0].task, None);
}

#[test]
fn known_entries_skip_the_write() {
    let keeping = MockKeeping::single(vec![entry(501, Some(10), Some(20))]);
    let warehouse = MockWarehouse::with_ids(&[501]);
    let inserts = warehouse.insert_counter();
    let destination = WarehouseDestination::new(warehouse);

    let result = App::new(keeping)
        .sync(&destination, &window(), SyncOptions::default(), &JsonOutput)
        .unwrap();

    assert_eq!(*inserts.lock().unwrap(), 0);
    assert_eq!(result.action, "up-to-date");
    assert!(result.new_entries.is_empty());
    assert_eq!(result.existing, 1);
    assert_eq!(app::show(&destination, &JsonOutput).unwrap().rows.len(), 1);
}

#[test]
fn second_run_writes_nothing() {
    let destination = WarehouseDestination::new(MockWarehouse::with_ids(&[400]));
    let app = App::new(MockKeeping::single(vec![
        entry(501, Some(10), Some(20)),
        entry(502, Some(11), None),
    ]));

    let first = app
        .sync(&destination, &window(), SyncOptions::default(), &JsonOutput)
        .unwrap();
    let second = app
        .sync(&destination, &window(), SyncOptions::default(), &JsonOutput)
        .unwrap();

    assert_eq!(first.written, 2);
    assert_eq!(second.action, "up-to-date");
    assert_eq!(second.existing, 3);
    assert_eq!(app::show(&destination, &JsonOutput).unwrap().rows.len(), 3);
}

#[test]
fn dry_run_reports_without_writing() {
    let keeping = MockKeeping::single(vec![entry(501, Some(10), Some(20))]);
    let destination = WarehouseDestination::new(MockWarehouse::with_ids(&[]));

    let result = App::new(keeping)
        .sync(
            &destination,
            &window(),
            SyncOptions { dry_run: true },
            &JsonOutput,
        )
        .unwrap();

    assert_eq!(result.action, "dry-run");
    assert_eq!(result.new_entries, vec![EntryId::new(501)]);
    assert_eq!(result.written, 0);
    assert!(app::show(&destination, &JsonOutput).unwrap().rows.is_empty());
}

#[test]
fn single_page_report_is_one_request() {
    let keeping = MockKeeping::single(Vec::new());

    let entries = keeping_sync::keeping::fetch_time_entries(&keeping, &window()).unwrap();

    assert!(entries.is_empty());
    assert_eq!(keeping.requested_pages(), vec![1]);
}

#[test]
fn every_page_is_requested_in_order() {
    let keeping = MockKeeping::new(vec![
        TimeEntryPage {
            entries: vec![entry(501, Some(10), None)],
            current_page: 1,
            last_page: 3,
        },
        TimeEntryPage {
            entries: vec![entry(502, None, None)],
            current_page: 2,
            last_page: 3,
        },
        TimeEntryPage {
            entries: vec![entry(503, None, Some(20))],
            current_page: 3,
            last_page: 3,
        },
    ]);

    let entries = keeping_sync::keeping::fetch_time_entries(&keeping, &window()).unwrap();

    assert_eq!(keeping.requested_pages(), vec![1, 2, 3]);
    let ids: Vec<u64> = entries.iter().map(|entry| entry.id.get()).collect();
    assert_eq!(ids, vec![501, 502, 503]);
}

#[test]
fn failed_page_aborts_before_any_write() {
    let keeping = MockKeeping::new(vec![TimeEntryPage {
        entries: vec![entry(501, Some(10), None)],
        current_page: 1,
        last_page: 2,
    }]);
    let warehouse = MockWarehouse::with_ids(&[]);
    let destination = WarehouseDestination::new(warehouse);

    let err = App::new(keeping)
        .sync(&destination, &window(), SyncOptions::default(), &JsonOutput)
        .unwrap_err();

    assert_matches!(err, SyncError::KeepingStatus { status: 404, .. });
    assert!(app::show(&destination, &JsonOutput).unwrap().rows.is_empty());
}

#[test]
fn warehouse_append_is_one_call() {
    let keeping = MockKeeping::single(vec![
        entry(501, Some(10), Some(20)),
        entry(502, Some(11), None),
        entry(503, None, None),
    ]);
    let warehouse = MockWarehouse::with_ids(&[]);
    let inserts = warehouse.insert_counter();
    let destination = WarehouseDestination::new(warehouse);

    let result = App::new(keeping)
        .sync(&destination, &window(), SyncOptions::default(), &JsonOutput)
        .unwrap();

    assert_eq!(result.written, 3);
    assert_eq!(*inserts.lock().unwrap(), 1);
    assert_eq!(app::show(&destination, &JsonOutput).unwrap().rows.len(), 3);
}

#[test]
fn rejected_workspace_row_does_not_stop_the_rest() {
    let keeping = MockKeeping::single(vec![
        entry(501, Some(10), Some(20)),
        entry(502, Some(11), None),
        entry(503, None, None),
    ]);
    let workspace = MockWorkspace {
        reject: vec![502],
        ..MockWorkspace::default()
    };
    let destination = WorkspaceDestination::new(workspace);

    let result = App::new(keeping)
        .sync(&destination, &window(), SyncOptions::default(), &JsonOutput)
        .unwrap();

    assert_eq!(result.action, "partial");
    assert_eq!(result.written, 2);
    assert_eq!(result.failures.len(), 1);
    assert_eq!(result.failures[0].entry_id, EntryId::new(502));

    let ids: Vec<u64> = app::show(&destination, &JsonOutput)
        .unwrap()
        .rows
        .iter()
        .map(|row| row.id.get())
        .collect();
    assert_eq!(ids, vec![501, 503]);
}

#[test]
fn workspace_rerun_only_retries_the_missing_row() {
    let keeping = MockKeeping::single(vec![
        entry(501, Some(10), Some(20)),
        entry(502, Some(11), None),
    ]);
    let workspace = MockWorkspace {
        reject: vec![502],
        ..MockWorkspace::default()
    };
    let app = App::new(keeping);
    let destination = WorkspaceDestination::new(workspace);
    app.sync(&destination, &window(), SyncOptions::default(), &JsonOutput)
        .unwrap();

    let result = app
        .sync(&destination, &window(), SyncOptions::default(), &JsonOutput)
        .unwrap();

    assert_eq!(result.existing, 1);
    assert_eq!(result.new_entries, vec![EntryId::new(502)]);
}
