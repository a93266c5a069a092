use std::time::Duration;

use chrono::NaiveDate;
use reqwest::blocking::Client;
use reqwest::header::{AUTHORIZATION, CONTENT_TYPE, HeaderMap, HeaderValue, USER_AGENT};
use serde::Deserialize;
use serde_json::{Value, json};

use crate::config::NotionSettings;
use crate::domain::{DATE_FORMAT, EntryId, ExistingIdSet, MergedRecord, StoredRow};
use crate::error::SyncError;
use crate::paginate::{Page, collect_all};

pub const NOTION_VERSION: &str = "2022-06-28";
pub const DEFAULT_API_URL: &str = "https://api.notion.com/v1";
pub const QUERY_PAGE_SIZE: u32 = 100;

/// Written to `Klant` when the project has no client.
pub const DEFAULT_CLIENT_LABEL: &str = "Algemeen";

pub const PROP_ID: &str = "ID";
pub const PROP_DATE: &str = "Datum";
pub const PROP_HOURS: &str = "Uren";
pub const PROP_CLIENT: &str = "Klant";
pub const PROP_PROJECT: &str = "Project";
pub const PROP_TASK: &str = "Taak";

#[derive(Debug, Clone, Deserialize)]
pub struct QueryPage {
    pub results: Vec<Value>,
    #[serde(default)]
    pub has_more: bool,
    #[serde(default)]
    pub next_cursor: Option<String>,
}

pub trait WorkspaceClient: Send + Sync {
    fn query_database(&self, start_cursor: Option<&str>) -> Result<QueryPage, SyncError>;
    fn create_page(&self, record: &MergedRecord) -> Result<(), SyncError>;
}

#[derive(Clone)]
pub struct NotionHttpClient {
    client: Client,
    api_url: String,
    database_id: String,
}

impl NotionHttpClient {
    pub fn new(settings: &NotionSettings) -> Result<Self, SyncError> {
        let mut headers = HeaderMap::new();
        headers.insert(
            USER_AGENT,
            HeaderValue::from_str(&format!("keeping-sync/{}", env!("CARGO_PKG_VERSION")))
                .map_err(|err| SyncError::ConfigParse(err.to_string()))?,
        );
        headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
        headers.insert("Notion-Version", HeaderValue::from_static(NOTION_VERSION));
        let mut auth = HeaderValue::from_str(&format!("Bearer {}", settings.access_token))
            .map_err(|_| SyncError::ConfigParse("invalid Notion access token".to_string()))?;
        auth.set_sensitive(true);
        headers.insert(AUTHORIZATION, auth);

        let client = Client::builder()
            .default_headers(headers)
            .timeout(Duration::from_secs(60))
            .build()
            .map_err(|err| SyncError::NotionHttp(err.to_string()))?;

        Ok(Self {
            client,
            api_url: settings.api_url.trim_end_matches('/').to_string(),
            database_id: settings.database_id.clone(),
        })
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
            .unwrap_or_else(|_| "Notion request failed".to_string());
        Err(SyncError::NotionStatus { status, message })
    }

    fn post(&self, url: &str, body: &Value) -> Result<reqwest::blocking::Response, SyncError> {
        let response = self
            .client
            .post(url)
            .json(body)
            .send()
            .map_err(|err| SyncError::NotionHttp(err.to_string()))?;
        Self::handle_status(response)
    }
}

impl WorkspaceClient for NotionHttpClient {
    fn query_database(&self, start_cursor: Option<&str>) -> Result<QueryPage, SyncError> {
        let url = format!("{}/databases/{}/query", self.api_url, self.database_id);
        let mut body = json!({ "page_size": QUERY_PAGE_SIZE });
        if let Some(cursor) = start_cursor {
            body["start_cursor"] = Value::String(cursor.to_string());
        }
        self.post(&url, &body)?
            .json()
            .map_err(|err| SyncError::NotionPayload(err.to_string()))
    }

    fn create_page(&self, record: &MergedRecord) -> Result<(), SyncError> {
        let url = format!("{}/pages", self.api_url);
        self.post(&url, &page_payload(&self.database_id, record))?;
        Ok(())
    }
}

/// Raw result pages of the database, following `next_cursor` while `has_more` is set.
fn query_all<W: WorkspaceClient + ?Sized>(client: &W) -> Result<Vec<Value>, SyncError> {
    collect_all("Notion database", None::<String>, |cursor| {
        let page = client.query_database(cursor.as_deref())?;
        let next = match (page.has_more, page.next_cursor) {
            (false, _) => None,
            (true, Some(cursor)) => Some(Some(cursor)),
            (true, None) => {
                return Err(SyncError::NotionPayload(
                    "has_more is set without next_cursor".to_string(),
                ));
            }
        };
        Ok(Page {
            items: page.results,
            next,
        })
    })
}

fn page_id(page: &Value) -> &str {
    page.get("id").and_then(Value::as_str).unwrap_or("?")
}

/// Every row of the database with all properties parsed.
pub fn fetch_rows<W: WorkspaceClient + ?Sized>(
    client: &W,
) -> Result<Vec<StoredRow>, SyncError> {
    let pages = query_all(client)?;
    let mut rows = Vec::with_capacity(pages.len());
    for page in &pages {
        match row_from_page(page)? {
            Some(row) => rows.push(row),
            None => {
                let page_id = page_id(page);
                tracing::warn!(page_id, "skipping Notion row without an ID");
            }
        }
    }
    Ok(rows)
}

/// Ids from the `ID` title of every row. Other properties are not read.
pub fn existing_ids<W: WorkspaceClient + ?Sized>(
    client: &W,
) -> Result<ExistingIdSet, SyncError> {
    let mut ids = ExistingIdSet::new();
    for page in &query_all(client)? {
        match id_from_page(page)? {
            Some(id) => {
                ids.insert(id);
            }
            None => {
                let page_id = page_id(page);
                tracing::warn!(page_id, "skipping Notion row without an ID");
            }
        }
    }
    Ok(ids)
}

fn properties(page: &Value) -> Result<&Value, SyncError> {
    page.get("properties")
        .ok_or_else(|| SyncError::NotionPayload("page without properties".to_string()))
}

/// The row's entry id, `None` when the `ID` title is blank.
pub fn id_from_page(page: &Value) -> Result<Option<EntryId>, SyncError> {
    text_property(properties(page)?, PROP_ID, "title")
        .map(|text| text.parse())
        .transpose()
}

/// Reads one database page. Returns `None` for rows whose `ID` title is blank.
pub fn row_from_page(page: &Value) -> Result<Option<StoredRow>, SyncError> {
    let Some(id) = id_from_page(page)? else {
        return Ok(None);
    };
    let properties = properties(page)?;

    let date = properties
        .get(PROP_DATE)
        .and_then(|prop| prop.get("date"))
        .and_then(|date| date.get("start"))
        .and_then(Value::as_str)
        .map(|start| {
            // Date-time values carry a time part after the calendar date.
            let day = start.get(..10).unwrap_or(start);
            NaiveDate::parse_from_str(day, DATE_FORMAT)
                .map_err(|_| SyncError::InvalidDate(start.to_string()))
        })
        .transpose()?;

    let hours = properties
        .get(PROP_HOURS)
        .and_then(|prop| prop.get("number"))
        .and_then(Value::as_f64);

    Ok(Some(StoredRow {
        id,
        date,
        hours,
        client: text_property(properties, PROP_CLIENT, "rich_text"),
        project: text_property(properties, PROP_PROJECT, "rich_text"),
        task: text_property(properties, PROP_TASK, "rich_text"),
    }))
}

/// Concatenated text of a title or rich-text property; `None` when empty.
fn text_property(properties: &Value, name: &str, kind: &str) -> Option<String> {
    let segments = properties.get(name)?.get(kind)?.as_array()?;
    let text: String = segments
        .iter()
        .filter_map(|segment| {
            segment
                .get("plain_text")
                .or_else(|| segment.get("text").and_then(|text| text.get("content")))
                .and_then(Value::as_str)
        })
        .collect();
    let text = text.trim();
    (!text.is_empty()).then(|| text.to_string())
}

fn rich_text(content: Option<&str>) -> Value {
    match content {
        Some(content) => json!({ "rich_text": [{ "text": { "content": content } }] }),
        None => json!({ "rich_text": [] }),
    }
}

/// Body of the `POST /pages` call that creates one database row.
pub fn page_payload(database_id: &str, record: &MergedRecord) -> Value {
    let client = record.client.as_deref().unwrap_or(DEFAULT_CLIENT_LABEL);
    json!({
        "parent": { "database_id": database_id },
        "properties": {
            PROP_ID: { "title": [{ "text": { "content": record.entry_id.to_string() } }] },
            PROP_DATE: { "date": { "start": record.date.format(DATE_FORMAT).to_string() } },
            PROP_HOURS: { "number": record.hours.unwrap_or(0.0) },
            PROP_CLIENT: rich_text(Some(client)),
            PROP_PROJECT: rich_text(record.project.as_deref()),
            PROP_TASK: rich_text(record.task.as_deref()),
        }
    })
}
