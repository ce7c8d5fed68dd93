//! MySQL integration tests
//!
//! These tests require Docker and back up a real MySQL container.
//! Run with: `cargo test -p dump-manager-tests --test integration -- --ignored`

use super::common::{docker_exec, is_docker_available, start_container, wait_until_ready, ContainerGuard};
use dump_manager::managers::coordinator::{RunCoordinator, RunMode};
use dump_manager::managers::pipeline::BackupPipeline;
use dump_manager::utils::compress::gunzip_prefix;
use dump_manager::utils::{DockerDataSource, LocalStore, ObjectStore};
use serial_test::serial;
use test_utils::{date, ConfigBuilder, MockNotifier, TestContext};

const CONTAINER: &str = "dump-manager-it-mysql";

fn start_mysql() -> anyhow::Result<()> {
    start_container(
        CONTAINER,
        "mysql:8.0",
        &[
            "MYSQL_ROOT_PASSWORD=rootpass",
            "MYSQL_DATABASE=wordpress",
        ],
    )?;
    // The init server skips networking, so a TCP check only succeeds once
    // the real server is up
    wait_until_ready(
        CONTAINER,
        &[
            "mysql",
            "-h127.0.0.1",
            "-uroot",
            "-prootpass",
            "-e",
            "SELECT 1",
            "wordpress",
        ],
        90,
    )
}

fn seed_data() -> anyhow::Result<()> {
    docker_exec(
        CONTAINER,
        &[
            "mysql",
            "-uroot",
            "-prootpass",
            "wordpress",
            "-e",
            "CREATE TABLE posts (id INT PRIMARY KEY, title TEXT); \
             INSERT INTO posts VALUES (1, 'hello'), (2, 'world');",
        ],
    )?;
    Ok(())
}

#[test]
#[ignore]
#[serial]
fn test_mysql_backup_end_to_end() {
    if !is_docker_available() {
        eprintln!("Docker not available, skipping");
        return;
    }

    let _guard = ContainerGuard::new(CONTAINER);
    start_mysql().expect("Failed to start MySQL");
    seed_data().expect("Failed to seed data");

    let builder = ConfigBuilder::new()
        .add_site_with("blog", CONTAINER, "acme")
        .with_min_dump_bytes(512);
    let store_root = builder.store_root().unwrap();
    let ctx = TestContext::from_builder(builder);

    let recorder = ctx.recorder();
    let source = DockerDataSource::new();
    let store = LocalStore::new(store_root);
    let notifier = MockNotifier::new();
    let today = date("2025-01-20");

    let pipeline = BackupPipeline::new(&source, &store, &recorder, ctx.pipeline_settings());
    let coordinator = RunCoordinator::new(pipeline, Some(&notifier), ctx.lock_path());
    let summary = coordinator.run(&ctx.sites(), &RunMode::All, today).unwrap();

    assert!(summary.is_success(), "{:?}", summary.reports[0].error);
    assert!(notifier.failures().is_empty());

    let key = "backups/2025/01/20/blog.sql.gz";
    let size = store.head("acme", key).unwrap();
    let data = store.get_range("acme", key, 0..size).unwrap();
    let text = String::from_utf8_lossy(&gunzip_prefix(&data, 1 << 20)).to_string();

    assert!(text.contains("-- MySQL dump"));
    assert!(text.contains("INSERT INTO `posts`"));
    assert!(!text.contains("rootpass"));
    assert!(ctx.work_dir_is_clean());
}

#[test]
#[ignore]
#[serial]
fn test_stopped_mysql_is_reported() {
    if !is_docker_available() {
        eprintln!("Docker not available, skipping");
        return;
    }

    let ctx = TestContext::from_builder(
        ConfigBuilder::new().add_site_with("blog", "dump-manager-it-absent", "acme"),
    );
    let recorder = ctx.recorder();
    let source = DockerDataSource::new();
    let store = LocalStore::new(ctx.create_subdir("store"));

    let pipeline = BackupPipeline::new(&source, &store, &recorder, ctx.pipeline_settings());
    let report = pipeline.run(&ctx.sites()[0], date("2025-01-20"));

    assert!(!report.is_success());
    assert!(report
        .error
        .unwrap()
        .to_string()
        .starts_with("Credentials unavailable"));
}
