//! Container data source abstraction
//!
//! The pipeline asks a data source for the database credentials of a running
//! container and for a dump of that database. `DockerDataSource` (see
//! `utils::docker`) is the real implementation; `mock::MockDataSource` serves
//! tests.

use crate::config::DatabaseEngine;
use std::fmt;
use std::fs::File;
use std::time::Duration;

/// Connection parameters read from a container's environment
#[derive(Clone, PartialEq, Eq)]
pub struct Credentials {
    pub user: String,
    pub database: String,
    pub secret: String,
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credentials")
            .field("user", &self.user)
            .field("database", &self.database)
            .field("secret", &"<redacted>")
            .finish()
    }
}

#[derive(Debug, thiserror::Error)]
pub enum SourceError {
    #[error("Container '{0}' is not running")]
    NotRunning(String),

    #[error("Container '{container}' does not define {field}")]
    MissingField { container: String, field: &'static str },

    #[error("Failed to inspect container '{container}': {reason}")]
    Inspect { container: String, reason: String },

    #[error("Dump command failed: {0}")]
    Dump(String),
}

/// Abstraction over the workload that holds a site's database
pub trait DataSource: Send + Sync {
    /// Read connection parameters from the running container
    fn resolve_credentials(
        &self,
        container: &str,
        engine: DatabaseEngine,
        timeout: Duration,
    ) -> Result<Credentials, SourceError>;

    /// Dump the database, writing it to `sink`
    fn run_dump(
        &self,
        container: &str,
        engine: DatabaseEngine,
        credentials: &Credentials,
        sink: File,
        timeout: Duration,
    ) -> Result<(), SourceError>;
}

/// Mock implementation for testing
/// Available for use in external test crates
pub mod mock {
    use super::*;
    use std::collections::HashMap;
    use std::io::Write;
    use std::sync::{Arc, Mutex};

    /// Recorded data source call
    #[derive(Clone, Debug, PartialEq, Eq)]
    pub enum SourceCall {
        ResolveCredentials { container: String },
        RunDump { container: String, database: String },
    }

    /// Mock data source: containers are "running" when registered
    #[derive(Clone, Default)]
    pub struct MockDataSource {
        pub calls: Arc<Mutex<Vec<SourceCall>>>,
        containers: Arc<Mutex<HashMap<String, Credentials>>>,
        dumps: Arc<Mutex<HashMap<String, Vec<u8>>>>,
        failing_dumps: Arc<Mutex<Vec<String>>>,
    }

    impl MockDataSource {
        pub fn new() -> Self {
            Self::default()
        }

        /// Register a running container with credentials and dump output
        pub fn with_container(self, container: &str, dump: &[u8]) -> Self {
            self.containers.lock().unwrap().insert(
                container.to_string(),
                Credentials {
                    user: "app".to_string(),
                    database: format!("{}_db", container),
                    secret: "hunter2".to_string(),
                },
            );
            self.dumps
                .lock()
                .unwrap()
                .insert(container.to_string(), dump.to_vec());
            self
        }

        /// Make the dump command for a container exit non-zero
        pub fn with_failing_dump(self, container: &str) -> Self {
            self.failing_dumps
                .lock()
                .unwrap()
                .push(container.to_string());
            self
        }

        pub fn get_calls(&self) -> Vec<SourceCall> {
            self.calls.lock().unwrap().clone()
        }

        pub fn dump_called(&self, container: &str) -> bool {
            self.calls.lock().unwrap().iter().any(
                |c| matches!(c, SourceCall::RunDump { container: name, .. } if name == container),
            )
        }

        fn record_call(&self, call: SourceCall) {
            self.calls.lock().unwrap().push(call);
        }
    }

    impl DataSource for MockDataSource {
        fn resolve_credentials(
            &self,
            container: &str,
            _engine: DatabaseEngine,
            _timeout: Duration,
        ) -> Result<Credentials, SourceError> {
            self.record_call(SourceCall::ResolveCredentials {
                container: container.to_string(),
            });
            self.containers
                .lock()
                .unwrap()
                .get(container)
                .cloned()
                .ok_or_else(|| SourceError::NotRunning(container.to_string()))
        }

        fn run_dump(
            &self,
            container: &str,
            _engine: DatabaseEngine,
            credentials: &Credentials,
            mut sink: File,
            _timeout: Duration,
        ) -> Result<(), SourceError> {
            self.record_call(SourceCall::RunDump {
                container: container.to_string(),
                database: credentials.database.clone(),
            });

            let data = self
                .dumps
                .lock()
                .unwrap()
                .get(container)
                .cloned()
                .unwrap_or_default();

            // Partial output before the failure, as a real dump would leave
            sink.write_all(&data[..data.len().min(16)])
                .map_err(|e| SourceError::Dump(e.to_string()))?;

            if self.failing_dumps.lock().unwrap().iter().any(|c| c == container) {
                return Err(SourceError::Dump(format!(
                    "mysqldump: Got error: 1045 for container {}",
                    container
                )));
            }

            sink.write_all(&data[data.len().min(16)..])
                .map_err(|e| SourceError::Dump(e.to_string()))
        }
    }
}
