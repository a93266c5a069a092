use std::fs;

use camino::{Utf8Path, Utf8PathBuf};
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use crate::domain::{DateWindow, parse_date};
use crate::error::SyncError;
use crate::warehouse::TableRef;

pub const DEFAULT_CONFIG_FILE: &str = "keeping-sync.json";

pub const ENV_KEEPING_BASE_URL: &str = "KEEPING_BASE_URL";
pub const ENV_KEEPING_ID: &str = "KEEPING_ID";
pub const ENV_KEEPING_ACCESS_TOKEN: &str = "KEEPING_ACCESS_TOKEN";
pub const ENV_NOTION_API_URL: &str = "NOTION_API_URL";
pub const ENV_NOTION_API_TOKEN: &str = "NOTION_API_TOKEN";
pub const ENV_NOTION_ACCESS_TOKEN: &str = "NOTION_ACCESS_TOKEN";
pub const ENV_NOTION_DATABASE_ID: &str = "NOTION_DATABASE_ID";
pub const ENV_WAREHOUSE_PROJECT_ID: &str = "UREN_REGISTRATIE_PROJECT_ID";
pub const ENV_WAREHOUSE_DATASET_ID: &str = "UREN_REGISTRATIE_DATASET_ID";
pub const ENV_WAREHOUSE_TABLE_ID: &str = "UREN_REGISTRATIE_TABLE_ID";
pub const ENV_GOOGLE_ACCESS_TOKEN: &str = "GOOGLE_ACCESS_TOKEN";
pub const ENV_START_DATE: &str = "START_DATE";
pub const ENV_END_DATE: &str = "END_DATE";

#[derive(Debug, Default, Clone, Deserialize, Serialize)]
pub struct Config {
    #[serde(default)]
    pub schema_version: Option<u32>,
    #[serde(default)]
    pub keeping: KeepingSection,
    #[serde(default)]
    pub notion: NotionSection,
    #[serde(default)]
    pub warehouse: WarehouseSection,
    #[serde(default)]
    pub window: WindowSection,
}

#[derive(Debug, Default, Clone, Deserialize, Serialize)]
pub struct KeepingSection {
    #[serde(default)]
    pub base_url: Option<String>,
    #[serde(default)]
    pub organisation_id: Option<String>,
    #[serde(default)]
    pub access_token: Option<String>,
}

#[derive(Debug, Default, Clone, Deserialize, Serialize)]
pub struct NotionSection {
    #[serde(default)]
    pub api_url: Option<String>,
    #[serde(default)]
    pub access_token: Option<String>,
    #[serde(default)]
    pub database_id: Option<String>,
}

#[derive(Debug, Default, Clone, Deserialize, Serialize)]
pub struct WarehouseSection {
    #[serde(default)]
    pub api_url: Option<String>,
    #[serde(default)]
    pub project_id: Option<String>,
    #[serde(default)]
    pub dataset_id: Option<String>,
    #[serde(default)]
    pub table_id: Option<String>,
    #[serde(default)]
    pub access_token: Option<String>,
}

#[derive(Debug, Default, Clone, Deserialize, Serialize)]
pub struct WindowSection {
    #[serde(default)]
    pub start: Option<String>,
    #[serde(default)]
    pub end: Option<String>,
}

#[derive(Debug, Clone)]
pub struct KeepingSettings {
    pub base_url: String,
    pub organisation_id: String,
    pub access_token: String,
}

#[derive(Debug, Clone)]
pub struct NotionSettings {
    pub api_url: String,
    pub access_token: String,
    pub database_id: String,
}

#[derive(Debug, Clone)]
pub struct WarehouseSettings {
    pub api_url: String,
    pub table: TableRef,
    pub access_token: String,
}

pub struct ConfigLoader;

impl ConfigLoader {
    /// Reads the config file and overlays the process environment.
    pub fn resolve(path: Option<&str>) -> Result<Config, SyncError> {
        let config = Self::load(path.map(Utf8Path::new))?;
        Ok(Self::overlay(config, |key| std::env::var(key).ok()))
    }

    /// An explicit path must exist; the default file is optional.
    pub fn load(path: Option<&Utf8Path>) -> Result<Config, SyncError> {
        let config_path = match path {
            Some(path) => path.to_path_buf(),
            None => Utf8PathBuf::from(DEFAULT_CONFIG_FILE),
        };

        if path.is_none() && !config_path.as_std_path().exists() {
            return Ok(Config::default());
        }

        let content = fs::read_to_string(config_path.as_std_path())
            .map_err(|_| SyncError::ConfigRead(config_path.clone().into_std_path_buf()))?;
        serde_json::from_str(&content).map_err(|err| SyncError::ConfigParse(err.to_string()))
    }

    /// Environment values win over file values.
    pub fn overlay<F>(mut config: Config, lookup: F) -> Config
    where
        F: Fn(&str) -> Option<String>,
    {
        let env = |key: &str| non_empty(lookup(key));
        let apply = |slot: &mut Option<String>, value: Option<String>| {
            if value.is_some() {
                *slot = value;
            }
        };

        apply(&mut config.keeping.base_url, env(ENV_KEEPING_BASE_URL));
        apply(&mut config.keeping.organisation_id, env(ENV_KEEPING_ID));
        apply(
            &mut config.keeping.access_token,
            env(ENV_KEEPING_ACCESS_TOKEN),
        );
        apply(&mut config.notion.api_url, env(ENV_NOTION_API_URL));
        apply(
            &mut config.notion.access_token,
            env(ENV_NOTION_API_TOKEN).or_else(|| env(ENV_NOTION_ACCESS_TOKEN)),
        );
        apply(&mut config.notion.database_id, env(ENV_NOTION_DATABASE_ID));
        apply(
            &mut config.warehouse.project_id,
            env(ENV_WAREHOUSE_PROJECT_ID),
        );
        apply(
            &mut config.warehouse.dataset_id,
            env(ENV_WAREHOUSE_DATASET_ID),
        );
        apply(&mut config.warehouse.table_id, env(ENV_WAREHOUSE_TABLE_ID));
        apply(
            &mut config.warehouse.access_token,
            env(ENV_GOOGLE_ACCESS_TOKEN),
        );
        apply(&mut config.window.start, env(ENV_START_DATE));
        apply(&mut config.window.end, env(ENV_END_DATE));
        config
    }
}

impl Config {
    pub fn keeping(&self) -> Result<KeepingSettings, SyncError> {
        Ok(KeepingSettings {
            base_url: required(&self.keeping.base_url, ENV_KEEPING_BASE_URL)?,
            organisation_id: required(&self.keeping.organisation_id, ENV_KEEPING_ID)?,
            access_token: required(&self.keeping.access_token, ENV_KEEPING_ACCESS_TOKEN)?,
        })
    }

    pub fn notion(&self) -> Result<NotionSettings, SyncError> {
        Ok(NotionSettings {
            api_url: non_empty(self.notion.api_url.clone())
                .unwrap_or_else(|| crate::notion::DEFAULT_API_URL.to_string()),
            access_token: required(&self.notion.access_token, ENV_NOTION_API_TOKEN)?,
            database_id: required(&self.notion.database_id, ENV_NOTION_DATABASE_ID)?,
        })
    }

    pub fn warehouse(&self) -> Result<WarehouseSettings, SyncError> {
        Ok(WarehouseSettings {
            api_url: non_empty(self.warehouse.api_url.clone())
                .unwrap_or_else(|| crate::warehouse::DEFAULT_API_URL.to_string()),
            table: TableRef {
                project_id: required(&self.warehouse.project_id, ENV_WAREHOUSE_PROJECT_ID)?,
                dataset_id: required(&self.warehouse.dataset_id, ENV_WAREHOUSE_DATASET_ID)?,
                table_id: required(&self.warehouse.table_id, ENV_WAREHOUSE_TABLE_ID)?,
            },
            access_token: required(&self.warehouse.access_token, ENV_GOOGLE_ACCESS_TOKEN)?,
        })
    }

    /// Explicit bounds when both are set, the rolling window when neither is.
    pub fn window(&self, today: NaiveDate) -> Result<DateWindow, SyncError> {
        let start = non_empty(self.window.start.clone());
        let end = non_empty(self.window.end.clone());
        match (start, end) {
            (None, None) => Ok(DateWindow::rolling(today)),
            (Some(start), Some(end)) => DateWindow::new(parse_date(&start)?, parse_date(&end)?),
            _ => Err(SyncError::InvalidWindow(format!(
                "{ENV_START_DATE} and {ENV_END_DATE} must be set together"
            ))),
        }
    }
}

fn non_empty(value: Option<String>) -> Option<String> {
    value
        .map(|value| value.trim().to_string())
        .filter(|value| !value.is_empty())
}

fn required(value: &Option<String>, key: &str) -> Result<String, SyncError> {
    non_empty(value.clone()).ok_or_else(|| SyncError::MissingConfig(key.to_string()))
}
