//! Configuration for the ingestion pipeline
//!
//! One [`CustodyConfig`] is loaded per process and handed to each component
//! at construction. Nothing reads configuration from global state.

use crate::filter::normalize_extension;
use custody_db::{Author, ProjectRecord};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Main configuration for Custody
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CustodyConfig {
    /// Path to the SQLite state database
    #[serde(default = "default_database_path")]
    pub database_path: PathBuf,

    /// Sync folder settings
    #[serde(default)]
    pub sync: SyncConfig,

    /// Upload backend settings
    #[serde(default)]
    pub webhook: WebhookConfig,

    /// Projects seeded into the database at startup
    #[serde(default)]
    pub projects: Vec<ProjectConfig>,
}

/// Where files come from and which of them qualify.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SyncConfig {
    /// Root of the monitored tree
    #[serde(default = "default_sync_root")]
    pub root: PathBuf,

    /// Global extension allow-list (".jpg" form); empty = allow all
    #[serde(default)]
    pub file_extensions: Vec<String>,

    /// Names starting with this character are never ingested
    #[serde(default = "default_hidden_prefix")]
    pub hidden_prefix: char,

    /// Extension marking a file that is still being written
    #[serde(default = "default_partial_suffix")]
    pub partial_suffix: String,
}

/// Upload backend settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WebhookConfig {
    /// `host[:port]` of the backend
    #[serde(default = "default_webhook_host")]
    pub host: String,

    /// Bearer token; no Authorization header when unset
    #[serde(default)]
    pub jwt: Option<String>,

    /// Endpoint path segment used when a caller doesn't choose one
    #[serde(default = "default_webhook_source")]
    pub source: String,

    /// Longest wait for the backend between two reads of one upload. A
    /// transfer that keeps moving is never cut off, whatever its size.
    #[serde(default = "default_read_timeout", alias = "timeout_secs")]
    pub read_timeout_secs: u64,

    #[serde(default = "default_connect_timeout")]
    pub connect_timeout_secs: u64,
}

/// A project declared in the config file.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ProjectConfig {
    pub id: String,
    /// Project root, relative to `sync.root` unless absolute
    pub path: String,
    #[serde(default)]
    pub author_type: Option<String>,
    #[serde(default)]
    pub author_name: Option<String>,
    #[serde(default)]
    pub author_identifier: Option<String>,
    #[serde(default)]
    pub file_extensions: Option<Vec<String>>,
}

fn default_database_path() -> PathBuf {
    custody_logging::custody_home().join("custody.sqlite3")
}

fn default_sync_root() -> PathBuf {
    PathBuf::from(".")
}

fn default_hidden_prefix() -> char {
    '.'
}

fn default_partial_suffix() -> String {
    ".partial".to_string()
}

fn default_webhook_host() -> String {
    "localhost:8080".to_string()
}

fn default_webhook_source() -> String {
    "generic".to_string()
}

fn default_read_timeout() -> u64 {
    300
}

fn default_connect_timeout() -> u64 {
    10
}

impl Default for CustodyConfig {
    fn default() -> Self {
        Self {
            database_path: default_database_path(),
            sync: SyncConfig::default(),
            webhook: WebhookConfig::default(),
            projects: Vec::new(),
        }
    }
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            root: default_sync_root(),
            file_extensions: Vec::new(),
            hidden_prefix: default_hidden_prefix(),
            partial_suffix: default_partial_suffix(),
        }
    }
}

impl Default for WebhookConfig {
    fn default() -> Self {
        Self {
            host: default_webhook_host(),
            jwt: None,
            source: default_webhook_source(),
            read_timeout_secs: default_read_timeout(),
            connect_timeout_secs: default_connect_timeout(),
        }
    }
}

impl WebhookConfig {
    pub fn read_timeout(&self) -> Duration {
        Duration::from_secs(self.read_timeout_secs)
    }

    pub fn connect_timeout(&self) -> Duration {
        Duration::from_secs(self.connect_timeout_secs)
    }
}

impl ProjectConfig {
    pub fn to_record(&self) -> ProjectRecord {
        ProjectRecord {
            project_id: self.id.clone(),
            project_path: self.path.clone(),
            author: Author {
                author_type: self.author_type.clone(),
                name: self.author_name.clone(),
                identifier: self.author_identifier.clone(),
            },
            file_extensions: self.file_extensions.clone(),
        }
    }
}

impl CustodyConfig {
    /// Load configuration from a TOML file
    pub fn load(path: &Path) -> crate::Result<Self> {
        let content = std::fs::read_to_string(path)?;
        Self::from_toml(&content)
    }

    /// Parse configuration from TOML text
    pub fn from_toml(content: &str) -> crate::Result<Self> {
        let mut config: CustodyConfig =
            toml::from_str(content).map_err(|e| crate::IngestError::Config(e.to_string()))?;
        config.normalize();
        config.validate()?;
        Ok(config)
    }

    /// Save configuration to a TOML file
    pub fn save(&self, path: &Path) -> crate::Result<()> {
        let content = toml::to_string_pretty(self)
            .map_err(|e| crate::IngestError::Config(e.to_string()))?;
        std::fs::write(path, content)?;
        Ok(())
    }

    /// Canonical ".ext" lowercase form for every extension list.
    pub fn normalize(&mut self) {
        self.sync.file_extensions = normalize_list(&self.sync.file_extensions);
        for project in &mut self.projects {
            if let Some(list) = project.file_extensions.as_mut() {
                *list = normalize_list(list);
            }
        }
    }

    fn validate(&self) -> crate::Result<()> {
        if self.webhook.host.trim().is_empty() {
            return Err(crate::IngestError::Config("webhook.host is empty".to_string()));
        }
        if self.webhook.host.contains("://") {
            return Err(crate::IngestError::Config(format!(
                "webhook.host must be host[:port] without a scheme, got '{}'",
                self.webhook.host
            )));
        }
        if self.webhook.source.trim_matches('/').is_empty() {
            return Err(crate::IngestError::Config("webhook.source is empty".to_string()));
        }
        let mut ids = std::collections::HashSet::new();
        for project in &self.projects {
            if !ids.insert(project.id.as_str()) {
                return Err(crate::IngestError::Config(format!(
                    "duplicate project id '{}'",
                    project.id
                )));
            }
        }
        Ok(())
    }
}

fn normalize_list(list: &[String]) -> Vec<String> {
    let mut out: Vec<String> = list
        .iter()
        .map(|ext| normalize_extension(ext))
        .filter(|ext| ext.len() > 1)
        .collect();
    out.dedup();
    out
}
