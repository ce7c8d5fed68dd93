//! Configuration module for dump-manager
//!
//! This module handles loading, validating, and resolving configuration from TOML files.
//!
//! Sites are declared as an ordered `[[sites]]` array; that order is the order
//! in which a run processes them.
//!
//! ## Example Usage
//!
//! ```no_run
//! use dump_manager::config;
//!
//! let config = config::load_config("dump-manager.toml")?;
//! for site in config::resolve_sites(&config) {
//!     println!("Site: {} -> s3://{}", site.id, site.store_ref);
//! }
//! # Ok::<(), config::ConfigError>(())
//! ```

mod loader;
mod types;

pub use loader::{load_config, resolve_site, resolve_sites, validate_config, ConfigError, Result};
pub use types::*;

/// Expand tilde (~) in path
pub fn expand_tilde(path: &std::path::Path) -> std::path::PathBuf {
    if let Ok(stripped) = path.strip_prefix("~") {
        if let Some(home) = dirs::home_dir() {
            return home.join(stripped);
        }
    }
    path.to_path_buf()
}
