use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Root configuration structure
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct Config {
    pub global: GlobalConfig,
    pub storage: StorageConfig,
    #[serde(default)]
    pub notifications: NotificationConfig,
    /// Sites in processing order
    #[serde(default)]
    pub sites: Vec<SiteConfig>,
}

/// Global configuration settings
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct GlobalConfig {
    /// Directory holding local dump artifacts while a site is processed
    pub work_dir: PathBuf,

    /// Append-only status ledger (defaults to `<work_dir>/status.log`)
    #[serde(default)]
    pub status_file: Option<PathBuf>,

    /// Dumps smaller than this are treated as failed
    #[serde(default = "default_min_dump_bytes")]
    pub min_dump_bytes: u64,

    /// Number of leading bytes fetched back from the store for verification
    #[serde(default = "default_verify_bytes")]
    pub verify_bytes: u64,

    /// Timeout applied to every external process
    #[serde(default = "default_timeout")]
    pub default_timeout_seconds: u64,

    /// Logging configuration
    #[serde(default = "default_log_directory")]
    pub log_directory: PathBuf,
    #[serde(default = "default_log_level")]
    pub log_level: String,
    #[serde(default = "default_log_max_files")]
    pub log_max_files: u32,
}

impl GlobalConfig {
    /// Effective ledger path
    pub fn status_path(&self) -> PathBuf {
        self.status_file
            .clone()
            .unwrap_or_else(|| self.work_dir.join("status.log"))
    }
}

/// Object store configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct StorageConfig {
    #[serde(rename = "type")]
    pub store_type: StorageType,

    /// Custom endpoint for S3-compatible providers
    #[serde(default)]
    pub endpoint_url: Option<String>,

    #[serde(default)]
    pub region: Option<String>,

    /// AWS CLI profile
    #[serde(default)]
    pub profile: Option<String>,

    /// Root directory for the local store (one subdirectory per bucket)
    #[serde(default)]
    pub root: Option<PathBuf>,
}

#[derive(Debug, Clone, Copy, Deserialize, Serialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum StorageType {
    S3,
    Local,
}

/// Notification configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct NotificationConfig {
    #[serde(default)]
    pub discord_webhook_url: String,

    #[serde(default = "default_notify_on")]
    pub notify_on: Vec<NotifyEvent>,

    #[serde(default = "default_rate_limit")]
    pub rate_limit_minutes: u64,

    /// Window covered by a digest
    #[serde(default = "default_digest_days")]
    pub digest_days: u32,

    /// Send a digest at the end of every run
    #[serde(default)]
    pub digest_after_run: bool,
}

impl Default for NotificationConfig {
    fn default() -> Self {
        Self {
            discord_webhook_url: String::new(),
            notify_on: default_notify_on(),
            rate_limit_minutes: default_rate_limit(),
            digest_days: default_digest_days(),
            digest_after_run: false,
        }
    }
}

#[derive(Debug, Clone, Copy, Deserialize, Serialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum NotifyEvent {
    Failure,
    Digest,
}

/// Database engine running inside a site's container
#[derive(Debug, Clone, Copy, Deserialize, Serialize, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum DatabaseEngine {
    #[default]
    Mysql,
    Postgres,
}

impl DatabaseEngine {
    /// Header text every dump of this engine starts with
    pub fn dump_signatures(&self) -> &'static [&'static str] {
        match self {
            DatabaseEngine::Mysql => &["-- MySQL dump", "-- MariaDB dump"],
            DatabaseEngine::Postgres => &["PostgreSQL database dump"],
        }
    }
}

impl std::fmt::Display for DatabaseEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            DatabaseEngine::Mysql => write!(f, "mysql"),
            DatabaseEngine::Postgres => write!(f, "postgres"),
        }
    }
}

/// Site entry as written in the configuration file
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct SiteConfig {
    /// Site identifier, used in object keys and the status ledger
    pub name: String,

    /// Name of the database container
    pub container: String,

    /// Destination bucket
    pub bucket: String,

    #[serde(default)]
    pub engine: DatabaseEngine,

    #[serde(default = "default_enabled")]
    pub enabled: bool,

    #[serde(default)]
    pub timeout_seconds: Option<u64>,
}

/// A site resolved for one run
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Site {
    pub id: String,
    pub source_ref: String,
    pub store_ref: String,
    pub engine: DatabaseEngine,
    pub timeout_seconds: u64,
}

// Default value functions

fn default_min_dump_bytes() -> u64 { 1024 }
fn default_verify_bytes() -> u64 { 4096 }
fn default_timeout() -> u64 { 3600 }
fn default_log_directory() -> PathBuf { PathBuf::from("~/logs") }
fn default_log_level() -> String { "info".to_string() }
fn default_log_max_files() -> u32 { 10 }
fn default_enabled() -> bool { true }
fn default_notify_on() -> Vec<NotifyEvent> {
    vec![NotifyEvent::Failure, NotifyEvent::Digest]
}
fn default_rate_limit() -> u64 { 60 }
fn default_digest_days() -> u32 { 7 }
