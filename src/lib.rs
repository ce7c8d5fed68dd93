//! Dump Manager Library
//!
//! Backs up databases running in containers to an object store: dump,
//! compress, upload, verify, then prune old dumps with a tiered retention
//! policy.

pub mod config;
pub mod managers;
pub mod utils;

use crate::config::{StorageConfig, StorageType};
use crate::utils::{LocalStore, ObjectStore, S3CliStore};
use anyhow::{Context, Result};
use std::time::Duration;

// Re-export commonly used types
pub use config::{load_config, resolve_sites, Config, Site};
pub use managers::coordinator::{RunCoordinator, RunMode, RunSummary};
pub use managers::logging::{init_console_logging, init_logging, LogGuard, LoggingConfig};
pub use managers::notification::{DiscordNotifier, Notifier};
pub use managers::pipeline::{BackupPipeline, BackupStage, PipelineError, PipelineSettings, SiteReport};
pub use managers::status::{StatusRecord, StatusRecorder};

/// Build the object store described by `[storage]`
pub fn build_store(config: &Config) -> Result<Box<dyn ObjectStore>> {
    let storage: &StorageConfig = &config.storage;
    let timeout = Duration::from_secs(config.global.default_timeout_seconds);

    let store: Box<dyn ObjectStore> = match storage.store_type {
        StorageType::S3 => Box::new(S3CliStore::new(storage, &config.global.work_dir, timeout)),
        StorageType::Local => {
            let root = storage
                .root
                .as_ref()
                .context("Local storage requires 'root'")?;
            Box::new(LocalStore::new(root.clone()))
        }
    };

    Ok(store)
}
