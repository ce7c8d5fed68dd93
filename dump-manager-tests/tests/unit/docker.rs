//! Docker data source driven through a mocked executor

use dump_manager::config::DatabaseEngine;
use dump_manager::utils::docker_ops::{DataSource, SourceError};
use dump_manager::utils::DockerDataSource;
use std::fs::File;
use std::time::Duration;
use test_utils::{mysql_dump, MockExecutor, MockResponse, TestContext};

const TIMEOUT: Duration = Duration::from_secs(30);

fn running_mysql() -> MockExecutor {
    MockExecutor::new().expect(
        "docker inspect",
        MockResponse::ok(
            "true\nPATH=/usr/local/bin\nMYSQL_USER=wp\nMYSQL_PASSWORD=s3cr3t\nMYSQL_DATABASE=wordpress\n",
        ),
    )
}

#[test]
fn test_resolve_then_dump() {
    let ctx = TestContext::new();
    let dump = String::from_utf8(mysql_dump(20)).unwrap();
    let executor = running_mysql().expect("docker exec", MockResponse::ok(&dump));
    let source = DockerDataSource::with_executor(executor.clone());

    let creds = source
        .resolve_credentials("blog-db", DatabaseEngine::Mysql, TIMEOUT)
        .unwrap();
    assert_eq!(creds.user, "wp");
    assert_eq!(creds.database, "wordpress");

    let path = ctx.temp_dir().join("blog.sql");
    source
        .run_dump(
            "blog-db",
            DatabaseEngine::Mysql,
            &creds,
            File::create(&path).unwrap(),
            TIMEOUT,
        )
        .unwrap();

    assert_eq!(std::fs::read_to_string(&path).unwrap(), dump);

    let exec = executor
        .get_calls()
        .into_iter()
        .find(|c| c.subcommand() == Some("exec"))
        .unwrap();
    assert!(exec.has_arg("blog-db"));
    assert!(!exec.args.iter().any(|a| a.contains("s3cr3t")));
    assert_eq!(exec.env_keys, vec!["MYSQL_PWD".to_string()]);
}

#[test]
fn test_stopped_container() {
    let executor = MockExecutor::new().expect(
        "docker inspect",
        MockResponse::ok("false\nMYSQL_USER=wp\nMYSQL_PASSWORD=x\nMYSQL_DATABASE=wp\n"),
    );
    let source = DockerDataSource::with_executor(executor);

    let err = source
        .resolve_credentials("blog-db", DatabaseEngine::Mysql, TIMEOUT)
        .unwrap_err();
    assert!(matches!(err, SourceError::NotRunning(_)));
}

#[test]
fn test_missing_database_is_unavailable() {
    let executor = MockExecutor::new().expect(
        "docker inspect",
        MockResponse::ok("true\nMYSQL_USER=wp\nMYSQL_PASSWORD=x\n"),
    );
    let source = DockerDataSource::with_executor(executor);

    let err = source
        .resolve_credentials("blog-db", DatabaseEngine::Mysql, TIMEOUT)
        .unwrap_err();
    assert!(matches!(err, SourceError::MissingField { .. }));
}

#[test]
fn test_dump_failure_surfaces() {
    let ctx = TestContext::new();
    let executor = running_mysql().expect(
        "docker exec",
        MockResponse::fail("mysqldump: Got error: 1044: Access denied for user 'wp'"),
    );
    let source = DockerDataSource::with_executor(executor);
    let creds = source
        .resolve_credentials("blog-db", DatabaseEngine::Mysql, TIMEOUT)
        .unwrap();

    let err = source
        .run_dump(
            "blog-db",
            DatabaseEngine::Mysql,
            &creds,
            File::create(ctx.temp_dir().join("blog.sql")).unwrap(),
            TIMEOUT,
        )
        .unwrap_err();
    assert!(matches!(err, SourceError::Dump(_)));
}
