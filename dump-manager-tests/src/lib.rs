//! Test utilities for dump-manager
//!
//! This crate provides shared test utilities, fixtures and re-exports of
//! the mock implementations used to test the backup pipeline.
//!
//! # Quick Start
//!
//! ```rust,ignore
//! use test_utils::{ConfigBuilder, TestContext, MockDataSource, MockObjectStore};
//!
//! #[test]
//! fn my_test() {
//!     let ctx = TestContext::from_builder(ConfigBuilder::minimal().add_site("blog"));
//!     let source = MockDataSource::new().with_container("blog-db", &test_utils::mysql_dump(200));
//!     // ... test code
//! }
//! ```

pub mod config_builder;
pub mod fixtures;
pub mod test_context;

// Re-export commonly used items
pub use config_builder::ConfigBuilder;
pub use fixtures::*;
pub use test_context::{OptionAssertions, ResultAssertions, TestContext};

// Re-export types from the main crate for convenience
pub use dump_manager::config::{
    Config, DatabaseEngine, GlobalConfig, NotificationConfig, NotifyEvent, Site, SiteConfig,
    StorageConfig, StorageType,
};

// Re-export mock implementations from the main crate
pub use dump_manager::managers::notification::mock::{MockNotifier, SentNotification};
pub use dump_manager::managers::notification::Notifier;
pub use dump_manager::utils::docker_ops::mock::{MockDataSource, SourceCall};
pub use dump_manager::utils::docker_ops::DataSource;
pub use dump_manager::utils::executor::mock::{MockExecutor, MockResponse};
pub use dump_manager::utils::executor::CommandExecutor;
pub use dump_manager::utils::store_ops::mock::{MockObjectStore, StoreCall};
pub use dump_manager::utils::store_ops::ObjectStore;

/// Common test result type
pub type TestResult<T = ()> = anyhow::Result<T>;
