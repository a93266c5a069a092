use std::time::Duration;

use reqwest::blocking::Client as HttpClient;
use reqwest::header::{ACCEPT, AUTHORIZATION, HeaderMap, HeaderValue, USER_AGENT};
use serde::Deserialize;
use serde::de::DeserializeOwned;

use crate::config::KeepingSettings;
use crate::domain::{Client, DateWindow, EntryId, Project, ReferenceData, Task, TimeEntry, parse_date};
use crate::error::SyncError;
use crate::paginate::{Page, collect_all};

/// One page of `report/time-entries`.
#[derive(Debug, Clone, PartialEq)]
pub struct TimeEntryPage {
    pub entries: Vec<TimeEntry>,
    pub current_page: u32,
    pub last_page: u32,
}

impl TimeEntryPage {
    /// `last_page` of 0 (empty report) also counts as the end.
    pub fn is_last(&self) -> bool {
        self.current_page >= self.last_page
    }
}

pub trait KeepingClient: Send + Sync {
    fn fetch_projects(&self) -> Result<Vec<Project>, SyncError>;
    fn fetch_tasks(&self) -> Result<Vec<Task>, SyncError>;
    fn fetch_clients(&self) -> Result<Vec<Client>, SyncError>;
    fn fetch_time_entries_page(
        &self,
        window: &DateWindow,
        page: u32,
    ) -> Result<TimeEntryPage, SyncError>;
}

#[derive(Clone)]
pub struct KeepingHttpClient {
    client: HttpClient,
    base_url: String,
}

impl KeepingHttpClient {
    pub fn new(settings: &KeepingSettings) -> Result<Self, SyncError> {
        let mut headers = HeaderMap::new();
        headers.insert(
            USER_AGENT,
            HeaderValue::from_str(&format!("keeping-sync/{}", env!("CARGO_PKG_VERSION")))
                .map_err(|err| SyncError::ConfigParse(err.to_string()))?,
        );
        headers.insert(ACCEPT, HeaderValue::from_static("application/json"));
        let mut auth = HeaderValue::from_str(&format!("Bearer {}", settings.access_token))
            .map_err(|_| SyncError::ConfigParse("invalid Keeping access token".to_string()))?;
        auth.set_sensitive(true);
        headers.insert(AUTHORIZATION, auth);

        let client = HttpClient::builder()
            .default_headers(headers)
            .timeout(Duration::from_secs(60))
            .build()
            .map_err(|err| SyncError::KeepingHttp(err.to_string()))?;

        Ok(Self {
            client,
            base_url: organisation_url(&settings.base_url, &settings.organisation_id),
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
            .unwrap_or_else(|_| "Keeping request failed".to_string());
        Err(SyncError::KeepingStatus { status, message })
    }

    fn get_text(&self, path: &str, query: &[(&str, String)]) -> Result<String, SyncError> {
        let url = format!("{}{}", self.base_url, path);
        tracing::debug!(%url, "keeping.request");
        let response = self
            .client
            .get(&url)
            .query(query)
            .send()
            .map_err(|err| SyncError::KeepingHttp(err.to_string()))?;
        let response = Self::handle_status(response)?;
        response
            .text()
            .map_err(|err| SyncError::KeepingHttp(err.to_string()))
    }
}

impl KeepingClient for KeepingHttpClient {
    fn fetch_projects(&self) -> Result<Vec<Project>, SyncError> {
        parse_projects(&self.get_text("projects", &[])?)
    }

    fn fetch_tasks(&self) -> Result<Vec<Task>, SyncError> {
        parse_tasks(&self.get_text("tasks", &[])?)
    }

    fn fetch_clients(&self) -> Result<Vec<Client>, SyncError> {
        parse_clients(&self.get_text("clients", &[])?)
    }

    fn fetch_time_entries_page(
        &self,
        window: &DateWindow,
        page: u32,
    ) -> Result<TimeEntryPage, SyncError> {
        let query = [
            ("page", page.to_string()),
            ("from", window.start_param()),
            ("to", window.end_param()),
        ];
        parse_time_entries_page(&self.get_text("report/time-entries", &query)?)
    }
}

/// Loads the three reference tables, one request each.
pub fn fetch_reference_data<K: KeepingClient + ?Sized>(
    client: &K,
) -> Result<ReferenceData, SyncError> {
    Ok(ReferenceData {
        projects: client.fetch_projects()?,
        tasks: client.fetch_tasks()?,
        clients: client.fetch_clients()?,
    })
}

/// Walks `report/time-entries` from page 1 until the reported last page.
pub fn fetch_time_entries<K: KeepingClient + ?Sized>(
    client: &K,
    window: &DateWindow,
) -> Result<Vec<TimeEntry>, SyncError> {
    collect_all("Keeping time entries", 1u32, |page| {
        let body = client.fetch_time_entries_page(window, *page)?;
        let next = (!body.is_last()).then(|| page + 1);
        Ok(Page {
            items: body.entries,
            next,
        })
    })
}

fn organisation_url(base_url: &str, organisation_id: &str) -> String {
    format!(
        "{}/{}/",
        base_url.trim_end_matches('/'),
        organisation_id.trim_matches('/')
    )
}

#[derive(Debug, Deserialize)]
struct ProjectsBody {
    projects: Vec<ProjectWire>,
}

#[derive(Debug, Deserialize)]
struct ProjectWire {
    id: u64,
    name: String,
    #[serde(default)]
    client: Option<IdRef>,
}

#[derive(Debug, Deserialize)]
struct IdRef {
    id: u64,
}

#[derive(Debug, Deserialize)]
struct TasksBody {
    tasks: Vec<NamedWire>,
}

#[derive(Debug, Deserialize)]
struct ClientsBody {
    clients: Vec<NamedWire>,
}

#[derive(Debug, Deserialize)]
struct NamedWire {
    id: u64,
    name: String,
}

#[derive(Debug, Deserialize)]
struct TimeEntriesBody {
    time_entries: Vec<TimeEntryWire>,
    meta: PageMeta,
}

#[derive(Debug, Deserialize)]
struct PageMeta {
    current_page: u32,
    last_page: u32,
}

#[derive(Debug, Deserialize)]
struct TimeEntryWire {
    id: u64,
    date: String,
    #[serde(default)]
    hours: Option<f64>,
    #[serde(default)]
    project_id: Option<u64>,
    #[serde(default)]
    task_id: Option<u64>,
}

fn decode<T: DeserializeOwned>(body: &str) -> Result<T, SyncError> {
    serde_json::from_str(body).map_err(|err| SyncError::KeepingPayload(err.to_string()))
}

pub fn parse_projects(body: &str) -> Result<Vec<Project>, SyncError> {
    let body: ProjectsBody = decode(body)?;
    Ok(body
        .projects
        .into_iter()
        .map(|project| Project {
            id: project.id,
            name: project.name,
            client_id: project.client.map(|client| client.id),
        })
        .collect())
}

pub fn parse_tasks(body: &str) -> Result<Vec<Task>, SyncError> {
    let body: TasksBody = decode(body)?;
    Ok(body
        .tasks
        .into_iter()
        .map(|task| Task {
            id: task.id,
            name: task.name,
        })
        .collect())
}

pub fn parse_clients(body: &str) -> Result<Vec<Client>, SyncError> {
    let body: ClientsBody = decode(body)?;
    Ok(body
        .clients
        .into_iter()
        .map(|client| Client {
            id: client.id,
            name: client.name,
        })
        .collect())
}

pub fn parse_time_entries_page(body: &str) -> Result<TimeEntryPage, SyncError> {
    let body: TimeEntriesBody = decode(body)?;
    let entries = body
        .time_entries
        .into_iter()
        .map(|entry| {
            Ok(TimeEntry {
                id: EntryId::new(entry.id),
                date: parse_date(&entry.date)?,
                hours: entry.hours,
                project_id: entry.project_id,
                task_id: entry.task_id,
            })
        })
        .collect::<Result<Vec<_>, SyncError>>()?;
    Ok(TimeEntryPage {
        entries,
        current_page: body.meta.current_page,
        last_page: body.meta.last_page,
    })
}
