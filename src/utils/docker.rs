//! Docker-backed data source
//!
//! Credentials are read from the container's configured environment with
//! `docker inspect`; dumps run inside the container with `docker exec`. The
//! database secret is handed to `docker exec -e NAME` through the docker
//! client's own environment so it never appears in an argument list.

use super::docker_ops::{Credentials, DataSource, SourceError};
use super::executor::{CommandExecutor, RealExecutor};
use crate::config::DatabaseEngine;
use std::collections::HashMap;
use std::fs::File;
use std::time::Duration;
use tracing::{debug, info};

const INSPECT_FORMAT: &str = "{{.State.Running}}{{range .Config.Env}}\n{{.}}{{end}}";

/// Environment keys holding credentials, in lookup order
struct EnvKeys {
    user: &'static [&'static str],
    database: &'static [&'static str],
    secret: &'static [&'static str],
}

fn env_keys(engine: DatabaseEngine) -> EnvKeys {
    match engine {
        DatabaseEngine::Mysql => EnvKeys {
            user: &["MYSQL_USER", "MARIADB_USER"],
            database: &["MYSQL_DATABASE", "MARIADB_DATABASE"],
            secret: &["MYSQL_PASSWORD", "MARIADB_PASSWORD"],
        },
        DatabaseEngine::Postgres => EnvKeys {
            user: &["POSTGRES_USER"],
            database: &["POSTGRES_DB"],
            secret: &["POSTGRES_PASSWORD"],
        },
    }
}

fn lookup<'a>(env: &'a HashMap<String, String>, keys: &[&str]) -> Option<&'a str> {
    keys.iter()
        .filter_map(|k| env.get(*k))
        .map(|v| v.trim())
        .find(|v| !v.is_empty())
}

/// Parse `docker inspect` output produced with `INSPECT_FORMAT`
pub fn parse_inspect_output(output: &str) -> (bool, HashMap<String, String>) {
    let mut lines = output.lines();
    let running = lines.next().map(|l| l.trim() == "true").unwrap_or(false);

    let env = lines
        .filter_map(|line| line.split_once('='))
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .collect();

    (running, env)
}

/// Extract credentials for `engine` from a container environment
pub fn credentials_from_env(
    container: &str,
    engine: DatabaseEngine,
    env: &HashMap<String, String>,
) -> Result<Credentials, SourceError> {
    let keys = env_keys(engine);
    let missing = |field| SourceError::MissingField {
        container: container.to_string(),
        field,
    };

    let (user, secret) = match engine {
        DatabaseEngine::Mysql => match (lookup(env, keys.user), lookup(env, keys.secret)) {
            (Some(user), Some(secret)) => (user.to_string(), secret.to_string()),
            // Images configured with only a root password
            (None, _) => match lookup(env, &["MYSQL_ROOT_PASSWORD", "MARIADB_ROOT_PASSWORD"]) {
                Some(root) => ("root".to_string(), root.to_string()),
                None => return Err(missing("MYSQL_USER")),
            },
            (Some(_), None) => return Err(missing("MYSQL_PASSWORD")),
        },
        DatabaseEngine::Postgres => {
            let user = lookup(env, keys.user).unwrap_or("postgres");
            let secret = lookup(env, keys.secret).ok_or_else(|| missing("POSTGRES_PASSWORD"))?;
            (user.to_string(), secret.to_string())
        }
    };

    let database = match engine {
        DatabaseEngine::Mysql => lookup(env, keys.database)
            .ok_or_else(|| missing("MYSQL_DATABASE"))?
            .to_string(),
        DatabaseEngine::Postgres => lookup(env, keys.database).unwrap_or(user.as_str()).to_string(),
    };

    Ok(Credentials {
        user,
        database,
        secret,
    })
}

/// Build the `docker exec` arguments and secret variable for a dump
pub fn dump_invocation(
    container: &str,
    engine: DatabaseEngine,
    credentials: &Credentials,
) -> (Vec<String>, &'static str) {
    let mut args: Vec<String> = vec!["exec".into(), "-i".into()];

    match engine {
        DatabaseEngine::Mysql => {
            args.extend(["-e".into(), "MYSQL_PWD".into(), container.to_string()]);
            // Newer MariaDB images ship only mariadb-dump
            args.extend([
                "sh".into(),
                "-c".into(),
                r#"exec "$(command -v mariadb-dump || command -v mysqldump)" "$@""#.into(),
                "dump".into(),
                "--single-transaction".into(),
                "--routines".into(),
                "--triggers".into(),
                "-u".into(),
                credentials.user.clone(),
                credentials.database.clone(),
            ]);
            (args, "MYSQL_PWD")
        }
        DatabaseEngine::Postgres => {
            args.extend(["-e".into(), "PGPASSWORD".into(), container.to_string()]);
            args.extend([
                "pg_dump".into(),
                "-U".into(),
                credentials.user.clone(),
                credentials.database.clone(),
            ]);
            (args, "PGPASSWORD")
        }
    }
}

/// Data source backed by the docker CLI
pub struct DockerDataSource<E: CommandExecutor = RealExecutor> {
    executor: E,
}

impl DockerDataSource<RealExecutor> {
    pub fn new() -> Self {
        Self {
            executor: RealExecutor::new(),
        }
    }
}

impl Default for DockerDataSource<RealExecutor> {
    fn default() -> Self {
        Self::new()
    }
}

impl<E: CommandExecutor> DockerDataSource<E> {
    pub fn with_executor(executor: E) -> Self {
        Self { executor }
    }
}

impl<E: CommandExecutor> DataSource for DockerDataSource<E> {
    fn resolve_credentials(
        &self,
        container: &str,
        engine: DatabaseEngine,
        timeout: Duration,
    ) -> Result<Credentials, SourceError> {
        debug!("Inspecting container: {}", container);

        let output = self
            .executor
            .run_command_stdout(
                "docker",
                &["inspect", "--format", INSPECT_FORMAT, container],
                &[],
                Some(timeout),
            )
            .map_err(|e| {
                let reason = e.to_string();
                if reason.contains("No such") {
                    SourceError::NotRunning(container.to_string())
                } else {
                    SourceError::Inspect {
                        container: container.to_string(),
                        reason,
                    }
                }
            })?;

        let (running, env) = parse_inspect_output(&output);
        if !running {
            return Err(SourceError::NotRunning(container.to_string()));
        }

        let credentials = credentials_from_env(container, engine, &env)?;
        info!(
            "Resolved credentials for container '{}' (user '{}', database '{}')",
            container, credentials.user, credentials.database
        );
        Ok(credentials)
    }

    fn run_dump(
        &self,
        container: &str,
        engine: DatabaseEngine,
        credentials: &Credentials,
        sink: File,
        timeout: Duration,
    ) -> Result<(), SourceError> {
        let (args, secret_var) = dump_invocation(container, engine, credentials);
        let args: Vec<&str> = args.iter().map(String::as_str).collect();

        info!("Dumping database '{}' from container '{}'", credentials.database, container);

        self.executor
            .run_command_to_file(
                "docker",
                &args,
                &[(secret_var, credentials.secret.as_str())],
                sink,
                Some(timeout),
            )
            .map_err(|e| SourceError::Dump(e.to_string()))
    }
}
