//! BigQuery table access over the REST API (`tables.get`, `tabledata.list`,
//! `tabledata.insertAll`).

use std::fmt;
use std::time::Duration;

use chrono::{DateTime, NaiveDate};
use reqwest::blocking::Client;
use reqwest::header::{AUTHORIZATION, HeaderMap, HeaderValue, USER_AGENT};
use serde::Deserialize;
use serde_json::{Value, json};

use crate::config::WarehouseSettings;
use crate::domain::{DATE_FORMAT, ExistingIdSet, MergedRecord, StoredRow, parse_date};
use crate::error::SyncError;
use crate::paginate::{Page, collect_all};

pub const DEFAULT_API_URL: &str = "https://bigquery.googleapis.com/bigquery/v2";

/// Rows per `insertAll` request. Chunks are committed one by one, so a failed
/// chunk leaves the earlier ones in the table (see `SyncError::PartialAppend`).
pub const MAX_INSERT_ROWS: usize = 500;

pub const COL_ID: &str = "ID";
pub const COL_DATE: &str = "Datum";
pub const COL_HOURS: &str = "Uren";
pub const COL_CLIENT: &str = "Klant";
pub const COL_PROJECT: &str = "Project";
pub const COL_TASK: &str = "Taak";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TableRef {
    pub project_id: String,
    pub dataset_id: String,
    pub table_id: String,
}

impl fmt::Display for TableRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}.{}", self.project_id, self.dataset_id, self.table_id)
    }
}

/// One `tabledata.list` page. Each row holds the cell values in column order.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RowsPage {
    pub rows: Vec<Vec<Value>>,
    pub page_token: Option<String>,
}

pub trait WarehouseClient: Send + Sync {
    fn table(&self) -> &TableRef;
    /// Column names in schema order.
    fn columns(&self) -> Result<Vec<String>, SyncError>;
    fn list_rows(
        &self,
        selected_fields: Option<&str>,
        page_token: Option<&str>,
    ) -> Result<RowsPage, SyncError>;
    /// Appends all rows; existing rows are never touched.
    fn insert_rows(&self, records: &[MergedRecord]) -> Result<(), SyncError>;
}

#[derive(Clone)]
pub struct BigQueryHttpClient {
    client: Client,
    api_url: String,
    table: TableRef,
}

impl BigQueryHttpClient {
    pub fn new(settings: &WarehouseSettings) -> Result<Self, SyncError> {
        let mut headers = HeaderMap::new();
        headers.insert(
            USER_AGENT,
            HeaderValue::from_str(&format!("keeping-sync/{}", env!("CARGO_PKG_VERSION")))
                .map_err(|err| SyncError::ConfigParse(err.to_string()))?,
        );
        let mut auth = HeaderValue::from_str(&format!("Bearer {}", settings.access_token))
            .map_err(|_| SyncError::ConfigParse("invalid Google access token".to_string()))?;
        auth.set_sensitive(true);
        headers.insert(AUTHORIZATION, auth);

        let client = Client::builder()
            .default_headers(headers)
            .timeout(Duration::from_secs(60))
            .build()
            .map_err(|err| SyncError::WarehouseHttp(err.to_string()))?;

        Ok(Self {
            client,
            api_url: settings.api_url.trim_end_matches('/').to_string(),
            table: settings.table.clone(),
        })
    }

    fn table_url(&self) -> String {
        format!(
            "{}/projects/{}/datasets/{}/tables/{}",
            self.api_url, self.table.project_id, self.table.dataset_id, self.table.table_id
        )
    }

    fn handle_status(
        response: reqwest::blocking::Response,
    ) -> Result<reqwest::blocking::Response, SyncError> {
        if response.status().is_success() {
            return Ok(response);
        }
        let status = response.status().as_u16();
        let message = response
            .text()
            .unwrap_or_else(|_| "BigQuery request failed".to_string());
        Err(SyncError::WarehouseStatus { status, message })
    }

    fn read_json(response: reqwest::blocking::Response) -> Result<Value, SyncError> {
        Self::handle_status(response)?
            .json()
            .map_err(|err| SyncError::WarehousePayload(err.to_string()))
    }
}

impl WarehouseClient for BigQueryHttpClient {
    fn table(&self) -> &TableRef {
        &self.table
    }

    fn columns(&self) -> Result<Vec<String>, SyncError> {
        let response = self
            .client
            .get(self.table_url())
            .send()
            .map_err(|err| SyncError::WarehouseHttp(err.to_string()))?;
        parse_columns(&Self::read_json(response)?)
    }

    fn list_rows(
        &self,
        selected_fields: Option<&str>,
        page_token: Option<&str>,
    ) -> Result<RowsPage, SyncError> {
        let mut request = self.client.get(format!("{}/data", self.table_url()));
        if let Some(fields) = selected_fields {
            request = request.query(&[("selectedFields", fields)]);
        }
        if let Some(token) = page_token {
            request = request.query(&[("pageToken", token)]);
        }
        let response = request
            .send()
            .map_err(|err| SyncError::WarehouseHttp(err.to_string()))?;
        parse_rows_page(&Self::read_json(response)?)
    }

    fn insert_rows(&self, records: &[MergedRecord]) -> Result<(), SyncError> {
        let url = format!("{}/insertAll", self.table_url());
        append_in_chunks(records, MAX_INSERT_ROWS, |chunk| {
            let response = self
                .client
                .post(&url)
                .json(&insert_payload(chunk))
                .send()
                .map_err(|err| SyncError::WarehouseHttp(err.to_string()))?;
            check_insert_response(&Self::read_json(response)?, chunk.len())
        })
    }
}

/// Sends `records` in chunks of `chunk_size`. A failure after the first chunk
/// reports how many rows were already stored.
pub fn append_in_chunks<F>(
    records: &[MergedRecord],
    chunk_size: usize,
    mut send: F,
) -> Result<(), SyncError>
where
    F: FnMut(&[MergedRecord]) -> Result<(), SyncError>,
{
    let mut committed = 0;
    for chunk in records.chunks(chunk_size.max(1)) {
        if let Err(err) = send(chunk) {
            if committed == 0 {
                return Err(err);
            }
            return Err(SyncError::PartialAppend {
                committed,
                total: records.len(),
                source: Box::new(err),
            });
        }
        committed += chunk.len();
    }
    Ok(())
}

/// Reads only the `ID` column of the whole table.
pub fn existing_ids<W: WarehouseClient + ?Sized>(
    client: &W,
) -> Result<ExistingIdSet, SyncError> {
    let columns = client.columns()?;
    if !columns.iter().any(|name| name == COL_ID) {
        return Err(SyncError::WarehousePayload(format!(
            "table {} has no {COL_ID} column",
            client.table()
        )));
    }
    let rows = list_all(client, Some(COL_ID))?;
    let mut ids = ExistingIdSet::new();
    for row in rows {
        match row.first().and_then(Value::as_str) {
            Some(cell) => {
                ids.insert(cell.parse()?);
            }
            None => tracing::warn!(table = %client.table(), "skipping row with empty ID"),
        }
    }
    Ok(ids)
}

/// Every row of the table with its known columns resolved by name.
pub fn fetch_rows<W: WarehouseClient + ?Sized>(
    client: &W,
) -> Result<Vec<StoredRow>, SyncError> {
    let columns = client.columns()?;
    let index = |name: &str| columns.iter().position(|column| column == name);
    let id_index = index(COL_ID).ok_or_else(|| {
        SyncError::WarehousePayload(format!("table {} has no {COL_ID} column", client.table()))
    })?;
    let (date_index, hours_index) = (index(COL_DATE), index(COL_HOURS));
    let (client_index, project_index, task_index) =
        (index(COL_CLIENT), index(COL_PROJECT), index(COL_TASK));

    let cell = |row: &[Value], at: Option<usize>| -> Option<String> {
        at.and_then(|at| row.get(at))
            .and_then(Value::as_str)
            .map(str::to_string)
    };

    let mut stored = Vec::new();
    for row in list_all(client, None)? {
        let row = row.as_slice();
        let Some(id) = cell(row, Some(id_index)) else {
            continue;
        };
        stored.push(StoredRow {
            id: id.parse()?,
            date: cell(row, date_index)
                .as_deref()
                .map(parse_cell_date)
                .transpose()?,
            hours: cell(row, hours_index).and_then(|value| value.parse().ok()),
            client: cell(row, client_index),
            project: cell(row, project_index),
            task: cell(row, task_index),
        });
    }
    Ok(stored)
}

fn list_all<W: WarehouseClient + ?Sized>(
    client: &W,
    selected_fields: Option<&str>,
) -> Result<Vec<Vec<Value>>, SyncError> {
    collect_all("BigQuery table", None::<String>, |token| {
        let page = client.list_rows(selected_fields, token.as_deref())?;
        Ok(Page {
            items: page.rows,
            next: page.page_token.map(Some),
        })
    })
}

/// DATE cells arrive as `YYYY-MM-DD`, TIMESTAMP cells as epoch seconds.
fn parse_cell_date(value: &str) -> Result<NaiveDate, SyncError> {
    if let Ok(date) = parse_date(value) {
        return Ok(date);
    }
    value
        .parse::<f64>()
        .ok()
        .filter(|seconds| seconds.is_finite())
        .and_then(|seconds| DateTime::from_timestamp(seconds.floor() as i64, 0))
        .map(|timestamp| timestamp.date_naive())
        .ok_or_else(|| SyncError::InvalidDate(value.to_string()))
}

#[derive(Debug, Deserialize)]
struct TableBody {
    schema: SchemaBody,
}

#[derive(Debug, Deserialize)]
struct SchemaBody {
    #[serde(default)]
    fields: Vec<FieldBody>,
}

#[derive(Debug, Deserialize)]
struct FieldBody {
    name: String,
}

pub fn parse_columns(body: &Value) -> Result<Vec<String>, SyncError> {
    let table = TableBody::deserialize(body)
        .map_err(|err| SyncError::WarehousePayload(err.to_string()))?;
    Ok(table.schema.fields.into_iter().map(|field| field.name).collect())
}

pub fn parse_rows_page(body: &Value) -> Result<RowsPage, SyncError> {
    let rows = match body.get("rows") {
        None | Some(Value::Null) => Vec::new(),
        Some(Value::Array(rows)) => rows
            .iter()
            .map(|row| {
                row.get("f")
                    .and_then(Value::as_array)
                    .map(|cells| {
                        cells
                            .iter()
                            .map(|cell| cell.get("v").cloned().unwrap_or(Value::Null))
                            .collect()
                    })
                    .ok_or_else(|| SyncError::WarehousePayload("row without cells".to_string()))
            })
            .collect::<Result<Vec<_>, SyncError>>()?,
        Some(_) => {
            return Err(SyncError::WarehousePayload(
                "rows is not an array".to_string(),
            ));
        }
    };
    let page_token = body
        .get("pageToken")
        .and_then(Value::as_str)
        .filter(|token| !token.is_empty())
        .map(str::to_string);
    Ok(RowsPage { rows, page_token })
}

/// `insertAll` body. The entry id doubles as `insertId` so BigQuery drops
/// accidental resends of the same chunk.
pub fn insert_payload(records: &[MergedRecord]) -> Value {
    let rows: Vec<Value> = records
        .iter()
        .map(|record| {
            json!({
                "insertId": record.entry_id.to_string(),
                "json": {
                    COL_ID: record.entry_id.get(),
                    COL_DATE: record.date.format(DATE_FORMAT).to_string(),
                    COL_HOURS: record.hours,
                    COL_CLIENT: record.client,
                    COL_PROJECT: record.project,
                    COL_TASK: record.task,
                }
            })
        })
        .collect();
    json!({
        "kind": "bigquery#tableDataInsertAllRequest",
        "skipInvalidRows": false,
        "ignoreUnknownValues": false,
        "rows": rows,
    })
}

fn check_insert_response(body: &Value, total: usize) -> Result<(), SyncError> {
    let Some(errors) = body.get("insertErrors").and_then(Value::as_array) else {
        return Ok(());
    };
    if errors.is_empty() {
        return Ok(());
    }
    let message = errors
        .iter()
        .flat_map(|entry| {
            entry
                .get("errors")
                .and_then(Value::as_array)
                .into_iter()
                .flatten()
        })
        .filter_map(|error| error.get("message").and_then(Value::as_str))
        .next()
        .unwrap_or("no error message")
        .to_string();
    Err(SyncError::WarehouseInsert {
        rejected: errors.len(),
        total,
        message,
    })
}
