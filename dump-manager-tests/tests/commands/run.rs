//! Tests for the 'run' command
//!
//! The run command backs up every enabled site, one named site, or only the
//! first site (smoke test).

use dump_manager::managers::coordinator::{RunCoordinator, RunMode};
use dump_manager::managers::pipeline::{BackupPipeline, BackupStage, PipelineError};
use dump_manager::managers::status::Outcome;
use dump_manager::utils::compress::gunzip_prefix;
use dump_manager::utils::locker::with_run_lock;
use dump_manager::utils::{DockerDataSource, LocalStore, ObjectStore};
use test_utils::{
    date, mysql_dump, tiny_dump, ConfigBuilder, MockDataSource, MockExecutor,
    MockNotifier, MockObjectStore, MockResponse, TestContext,
};

fn three_sites() -> TestContext {
    TestContext::from_builder(
        ConfigBuilder::new()
            .add_site("blog")
            .add_site("shop")
            .add_site("forum"),
    )
}

fn source_for(ctx: &TestContext) -> MockDataSource {
    ctx.sites().iter().fold(MockDataSource::new(), |source, site| {
        source.with_container(&site.source_ref, &mysql_dump(200))
    })
}

#[test]
fn test_run_all_with_one_upload_failure() {
    let ctx = three_sites();
    let recorder = ctx.recorder();
    let source = source_for(&ctx);
    let store = MockObjectStore::new().with_failing_put("shop-backups");
    let notifier = MockNotifier::new();
    let today = date("2025-01-20");

    let pipeline = BackupPipeline::new(&source, &store, &recorder, ctx.pipeline_settings());
    let coordinator = RunCoordinator::new(pipeline, Some(&notifier), ctx.lock_path());

    let summary = coordinator.run(&ctx.sites(), &RunMode::All, today).unwrap();

    assert_eq!(summary.total, 3);
    assert_eq!(summary.succeeded, 2);
    assert_eq!(summary.failed, 1);
    assert!(!summary.is_success());
    assert!(matches!(
        summary.reports[1].error,
        Some(PipelineError::UploadFailed(_))
    ));

    assert_eq!(notifier.failures(), vec!["shop".to_string()]);
    assert!(store.contains("blog-backups", "backups/2025/01/20/blog.sql.gz"));
    assert!(store.contains("forum-backups", "backups/2025/01/20/forum.sql.gz"));
    assert!(ctx.work_dir_is_clean());

    let records = recorder.query(today).unwrap();
    let outcomes: Vec<_> = records.iter().map(|r| (r.site_id.as_str(), r.outcome)).collect();
    assert_eq!(
        outcomes,
        vec![
            ("blog", Outcome::Success),
            ("shop", Outcome::Failure),
            ("forum", Outcome::Success)
        ]
    );
    assert_eq!(records[1].byte_size, 0);
}

#[test]
fn test_run_tiny_dump_is_not_uploaded() {
    let ctx = TestContext::from_builder(ConfigBuilder::new().add_site("blog"));
    let recorder = ctx.recorder();
    let source = MockDataSource::new().with_container("blog-db", &tiny_dump());
    let store = MockObjectStore::new();

    let pipeline = BackupPipeline::new(&source, &store, &recorder, ctx.pipeline_settings());
    let report = pipeline.run(&ctx.sites()[0], date("2025-01-20"));

    assert!(matches!(report.error, Some(PipelineError::DumpFailed(_))));
    assert_eq!(report.stage, BackupStage::CredentialsResolved);
    assert_eq!(store.put_count(), 0);
    assert!(ctx.work_dir_is_clean());
}

#[test]
fn test_run_bad_header_keeps_object() {
    let ctx = TestContext::from_builder(ConfigBuilder::new().add_site("blog"));
    let recorder = ctx.recorder();
    let source = MockDataSource::new().with_container("blog-db", &mysql_dump(200));
    let store = MockObjectStore::new()
        .with_object("blog-backups", "backups/2024/11/12/blog.sql.gz", b"expired")
        .with_corrupt_reads();
    let today = date("2025-01-20");

    let pipeline = BackupPipeline::new(&source, &store, &recorder, ctx.pipeline_settings());
    let report = pipeline.run(&ctx.sites()[0], today);

    assert!(matches!(
        report.error,
        Some(PipelineError::VerificationFailed(_))
    ));
    assert!(store.contains("blog-backups", "backups/2025/01/20/blog.sql.gz"));
    // Retention never ran, so the expired dump is still there
    assert!(store.contains("blog-backups", "backups/2024/11/12/blog.sql.gz"));
    assert!(ctx.work_dir_is_clean());

    let records = recorder.query(today).unwrap();
    assert_eq!(records.len(), 1);
    assert_eq!(records[0].outcome, Outcome::Failure);
}

#[test]
fn test_run_named_site_matches_container() {
    let ctx = TestContext::from_builder(
        ConfigBuilder::new()
            .add_site_with("blog", "wp_blog_mysql", "acme")
            .add_site_with("shop", "shop_mysql", "acme"),
    );
    let recorder = ctx.recorder();
    let source = MockDataSource::new()
        .with_container("wp_blog_mysql", &mysql_dump(200))
        .with_container("shop_mysql", &mysql_dump(200));
    let store = MockObjectStore::new();

    let pipeline = BackupPipeline::new(&source, &store, &recorder, ctx.pipeline_settings());
    let coordinator = RunCoordinator::new(pipeline, None, ctx.lock_path());

    let summary = coordinator
        .run(&ctx.sites(), &RunMode::Named("blog".to_string()), date("2025-01-20"))
        .unwrap();

    assert_eq!(summary.total, 1);
    assert!(source.dump_called("wp_blog_mysql"));
    assert!(!source.dump_called("shop_mysql"));
}

#[test]
fn test_run_named_site_without_match_fails() {
    let ctx = three_sites();
    let recorder = ctx.recorder();
    let source = source_for(&ctx);
    let store = MockObjectStore::new();

    let pipeline = BackupPipeline::new(&source, &store, &recorder, ctx.pipeline_settings());
    let coordinator = RunCoordinator::new(pipeline, None, ctx.lock_path());

    let result = coordinator.run(
        &ctx.sites(),
        &RunMode::Named("wiki".to_string()),
        date("2025-01-20"),
    );

    assert!(result.is_err());
    assert!(source.get_calls().is_empty());
}

#[test]
fn test_smoke_test_runs_first_site_only() {
    let ctx = three_sites();
    let recorder = ctx.recorder();
    let source = source_for(&ctx);
    let store = MockObjectStore::new();

    let pipeline = BackupPipeline::new(&source, &store, &recorder, ctx.pipeline_settings());
    let coordinator = RunCoordinator::new(pipeline, None, ctx.lock_path());

    let summary = coordinator
        .run(&ctx.sites(), &RunMode::Smoke, date("2025-01-20"))
        .unwrap();

    assert_eq!(summary.total, 1);
    assert_eq!(summary.reports[0].site_id, "blog");
    assert!(!source.dump_called("shop-db"));
}

#[test]
fn test_disabled_sites_are_not_counted() {
    let ctx = TestContext::from_builder(
        ConfigBuilder::new()
            .add_disabled_site("legacy")
            .add_site("blog"),
    );
    let recorder = ctx.recorder();
    let source = MockDataSource::new().with_container("blog-db", &mysql_dump(200));
    let store = MockObjectStore::new();

    let pipeline = BackupPipeline::new(&source, &store, &recorder, ctx.pipeline_settings());
    let coordinator = RunCoordinator::new(pipeline, None, ctx.lock_path());

    let summary = coordinator
        .run(&ctx.sites(), &RunMode::Smoke, date("2025-01-20"))
        .unwrap();

    assert_eq!(summary.total, 1);
    assert_eq!(summary.reports[0].site_id, "blog");
    assert!(!source.dump_called("legacy-db"));
}

#[test]
fn test_concurrent_run_is_refused() {
    let ctx = three_sites();
    let recorder = ctx.recorder();
    let source = source_for(&ctx);
    let store = MockObjectStore::new();

    let pipeline = BackupPipeline::new(&source, &store, &recorder, ctx.pipeline_settings());
    let coordinator = RunCoordinator::new(pipeline, None, ctx.lock_path());

    let inner = with_run_lock(&ctx.lock_path(), || {
        coordinator.run(&ctx.sites(), &RunMode::All, date("2025-01-20"))
    })
    .unwrap();

    assert!(inner.is_err());
    assert_eq!(store.put_count(), 0);
}

#[test]
fn test_run_with_docker_and_local_store() {
    let ctx = TestContext::from_builder(ConfigBuilder::new().add_site("blog"));
    let recorder = ctx.recorder();
    let dump = String::from_utf8(mysql_dump(300)).unwrap();
    let executor = MockExecutor::new()
        .expect(
            "docker inspect",
            MockResponse::ok("true\nMYSQL_USER=wp\nMYSQL_PASSWORD=pw\nMYSQL_DATABASE=wordpress"),
        )
        .expect("docker exec", MockResponse::ok(&dump));
    let source = DockerDataSource::with_executor(executor);
    let store = LocalStore::new(ctx.create_subdir("bucket-root"));
    let today = date("2025-01-20");

    let pipeline = BackupPipeline::new(&source, &store, &recorder, ctx.pipeline_settings());
    let report = pipeline.run(&ctx.sites()[0], today);

    assert!(report.is_success(), "{:?}", report.error);
    let key = report.key.clone().unwrap();
    let stored = store.head("blog-backups", &key).unwrap();
    assert_eq!(stored, report.byte_size);

    let prefix = store.get_range("blog-backups", &key, 0..stored).unwrap();
    let header = gunzip_prefix(&prefix, 64);
    assert!(String::from_utf8_lossy(&header).starts_with("-- MySQL dump"));
    assert!(ctx.work_dir_is_clean());
}
