use super::expand_tilde;
use super::types::*;
use std::collections::HashSet;
use std::fs;
use std::path::Path;

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Failed to read config file: {0}")]
    ReadError(#[from] std::io::Error),

    #[error("Failed to parse config file: {0}")]
    ParseError(#[from] toml::de::Error),

    #[error("Validation error: {0}")]
    ValidationError(String),

    #[error("Site '{0}' is defined more than once")]
    DuplicateSite(String),
}

pub type Result<T> = std::result::Result<T, ConfigError>;

/// Load and validate configuration from a TOML file
pub fn load_config<P: AsRef<Path>>(path: P) -> Result<Config> {
    let contents = fs::read_to_string(path)?;
    let mut config: Config = toml::from_str(&contents)?;
    expand_paths(&mut config);
    validate_config(&config)?;
    Ok(config)
}

fn expand_paths(config: &mut Config) {
    config.global.work_dir = expand_tilde(&config.global.work_dir);
    config.global.log_directory = expand_tilde(&config.global.log_directory);
    if let Some(ref status) = config.global.status_file {
        config.global.status_file = Some(expand_tilde(status));
    }
    if let Some(ref root) = config.storage.root {
        config.storage.root = Some(expand_tilde(root));
    }
}

/// Validate the configuration
pub fn validate_config(config: &Config) -> Result<()> {
    if config.global.work_dir.as_os_str().is_empty() {
        return Err(ConfigError::ValidationError(
            "global.work_dir must not be empty".to_string(),
        ));
    }

    if config.global.verify_bytes == 0 {
        return Err(ConfigError::ValidationError(
            "global.verify_bytes must be greater than zero".to_string(),
        ));
    }

    if config.global.default_timeout_seconds == 0 {
        return Err(ConfigError::ValidationError(
            "global.default_timeout_seconds must be greater than zero".to_string(),
        ));
    }

    if config.storage.store_type == StorageType::Local && config.storage.root.is_none() {
        return Err(ConfigError::ValidationError(
            "storage.root is required for local storage".to_string(),
        ));
    }

    if config.sites.is_empty() {
        return Err(ConfigError::ValidationError("No sites defined".to_string()));
    }

    let mut seen = HashSet::new();
    for site in &config.sites {
        validate_site(site)?;
        if !seen.insert(site.name.as_str()) {
            return Err(ConfigError::DuplicateSite(site.name.clone()));
        }
    }

    Ok(())
}

fn validate_site(site: &SiteConfig) -> Result<()> {
    if site.name.trim().is_empty() {
        return Err(ConfigError::ValidationError(
            "Site name must not be empty".to_string(),
        ));
    }

    // The name becomes a path component both locally and in object keys
    if site.name.contains('/') || site.name.contains('\\') || site.name.starts_with('.') {
        return Err(ConfigError::ValidationError(format!(
            "Site '{}': name must be a plain file name",
            site.name
        )));
    }

    if site.container.trim().is_empty() {
        return Err(ConfigError::ValidationError(format!(
            "Site '{}': container must not be empty",
            site.name
        )));
    }

    if site.bucket.trim().is_empty() {
        return Err(ConfigError::ValidationError(format!(
            "Site '{}': bucket must not be empty",
            site.name
        )));
    }

    if site.timeout_seconds == Some(0) {
        return Err(ConfigError::ValidationError(format!(
            "Site '{}': timeout_seconds must be greater than zero",
            site.name
        )));
    }

    Ok(())
}

/// Resolve a site entry against global defaults
pub fn resolve_site(site: &SiteConfig, global: &GlobalConfig) -> Site {
    Site {
        id: site.name.clone(),
        source_ref: site.container.clone(),
        store_ref: site.bucket.clone(),
        engine: site.engine,
        timeout_seconds: site.timeout_seconds.unwrap_or(global.default_timeout_seconds),
    }
}

/// Resolve all enabled sites, preserving configuration order
pub fn resolve_sites(config: &Config) -> Vec<Site> {
    config
        .sites
        .iter()
        .filter(|s| s.enabled)
        .map(|s| resolve_site(s, &config.global))
        .collect()
}
