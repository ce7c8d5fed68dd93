//! Fluent API for building test configurations
//!
//! Provides a builder pattern for creating test configurations with sensible defaults.
//! Every path points inside a temporary directory owned by the builder.

use dump_manager::config::{
    Config, DatabaseEngine, GlobalConfig, NotificationConfig, SiteConfig, StorageConfig,
    StorageType,
};
use std::fs;
use std::path::{Path, PathBuf};
use tempfile::TempDir;

/// Builder for creating test configurations
pub struct ConfigBuilder {
    temp_dir: TempDir,
    global: GlobalConfig,
    storage: StorageConfig,
    notifications: NotificationConfig,
    sites: Vec<SiteConfig>,
}

impl ConfigBuilder {
    /// Create a new ConfigBuilder with a local store and no sites
    pub fn new() -> Self {
        let temp_dir = TempDir::new().expect("Failed to create temp dir");

        let work_dir = temp_dir.path().join("work");
        let log_directory = temp_dir.path().join("logs");
        let store_root = temp_dir.path().join("store");
        fs::create_dir_all(&store_root).expect("Failed to create store root");

        let global = GlobalConfig {
            work_dir,
            status_file: None,
            min_dump_bytes: 1024,
            verify_bytes: 4096,
            default_timeout_seconds: 300,
            log_directory,
            log_level: "debug".to_string(),
            log_max_files: 5,
        };

        let storage = StorageConfig {
            store_type: StorageType::Local,
            endpoint_url: None,
            region: None,
            profile: None,
            root: Some(store_root),
        };

        Self {
            temp_dir,
            global,
            storage,
            notifications: NotificationConfig::default(),
            sites: Vec::new(),
        }
    }

    /// Create a minimal config with one MySQL site named "test"
    pub fn minimal() -> Self {
        Self::new().add_site("test")
    }

    /// Add an enabled MySQL site; container is `<name>-db`, bucket `<name>-backups`
    pub fn add_site(self, name: &str) -> Self {
        self.add_site_with(name, &format!("{}-db", name), &format!("{}-backups", name))
    }

    /// Add an enabled MySQL site with explicit container and bucket
    pub fn add_site_with(mut self, name: &str, container: &str, bucket: &str) -> Self {
        self.sites.push(SiteConfig {
            name: name.to_string(),
            container: container.to_string(),
            bucket: bucket.to_string(),
            engine: DatabaseEngine::Mysql,
            enabled: true,
            timeout_seconds: None,
        });
        self
    }

    /// Add an enabled PostgreSQL site
    pub fn add_postgres_site(mut self, name: &str) -> Self {
        self.sites.push(SiteConfig {
            name: name.to_string(),
            container: format!("{}-db", name),
            bucket: format!("{}-backups", name),
            engine: DatabaseEngine::Postgres,
            enabled: true,
            timeout_seconds: None,
        });
        self
    }

    /// Add a disabled site
    pub fn add_disabled_site(mut self, name: &str) -> Self {
        self.sites.push(SiteConfig {
            name: name.to_string(),
            container: format!("{}-db", name),
            bucket: format!("{}-backups", name),
            engine: DatabaseEngine::Mysql,
            enabled: false,
            timeout_seconds: None,
        });
        self
    }

    /// Set the minimum plausible dump size
    pub fn with_min_dump_bytes(mut self, bytes: u64) -> Self {
        self.global.min_dump_bytes = bytes;
        self
    }

    /// Set the default timeout
    pub fn with_timeout(mut self, seconds: u64) -> Self {
        self.global.default_timeout_seconds = seconds;
        self
    }

    /// Use S3 storage instead of the local store
    pub fn with_s3(mut self, endpoint_url: Option<&str>, region: &str) -> Self {
        self.storage = StorageConfig {
            store_type: StorageType::S3,
            endpoint_url: endpoint_url.map(str::to_string),
            region: Some(region.to_string()),
            profile: None,
            root: None,
        };
        self
    }

    /// Set notification configuration
    pub fn with_notifications(mut self, config: NotificationConfig) -> Self {
        self.notifications = config;
        self
    }

    /// Get the temp directory path
    pub fn temp_dir(&self) -> &Path {
        self.temp_dir.path()
    }

    /// Root directory of the local store
    pub fn store_root(&self) -> Option<PathBuf> {
        self.storage.root.clone()
    }

    /// Build the Config
    pub fn build(self) -> Config {
        self.persist().0
    }

    /// Keep the temp directory (don't delete on drop)
    pub fn persist(self) -> (Config, TempDir) {
        let config = Config {
            global: self.global,
            storage: self.storage,
            notifications: self.notifications,
            sites: self.sites,
        };
        (config, self.temp_dir)
    }
}

impl Default for ConfigBuilder {
    fn default() -> Self {
        Self::new()
    }
}
