pub mod command;
pub mod compress;
pub mod docker;
pub mod local_store;
pub mod locker;
pub mod s3;

// Trait-based abstractions for testability
pub mod docker_ops;
pub mod executor;
pub mod store_ops;

// Re-export commonly used types and traits (used by test crate)
pub use docker::DockerDataSource;
pub use docker_ops::{Credentials, DataSource, SourceError};
pub use executor::{CommandExecutor, RealExecutor};
pub use local_store::LocalStore;
pub use s3::S3CliStore;
pub use store_ops::{ObjectStore, StorageError, StoredObject};
