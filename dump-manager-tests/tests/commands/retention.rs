//! Tests for the 'retention' command
//!
//! Without --apply the command only shows the plan; with it, expired dumps
//! are deleted one key at a time.

use dump_manager::managers::retention::{apply_retention, plan, RetentionAnomaly, Tier, KEY_PREFIX};
use dump_manager::utils::ObjectStore;
use test_utils::{date, retention_scenario_keys, MockObjectStore, StoreCall};

fn seeded_store() -> MockObjectStore {
    retention_scenario_keys("blog")
        .into_iter()
        .fold(MockObjectStore::new(), |store, (key, _)| {
            store.with_object("acme", &key, b"dump")
        })
        .with_object("acme", "backups/manual-export.sql.gz", b"manual")
}

#[test]
fn test_audit_plan_reports_tiers() {
    let store = seeded_store();
    let objects = store.list("acme", KEY_PREFIX).unwrap();

    let plan = plan(objects.into_iter().map(|o| o.key), date("2025-01-20"));

    let tier_of = |key: &str| {
        plan.keep
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, tier)| *tier)
    };
    assert_eq!(tier_of("backups/2025/01/13/blog.sql.gz"), Some(Tier::Daily));
    assert_eq!(tier_of("backups/2025/01/05/blog.sql.gz"), Some(Tier::Weekly));
    assert_eq!(tier_of("backups/2024/12/01/blog.sql.gz"), Some(Tier::Monthly));
    assert_eq!(plan.delete, vec!["backups/2024/11/10/blog.sql.gz".to_string()]);
    assert_eq!(plan.unparseable, vec!["backups/manual-export.sql.gz".to_string()]);

    // Planning alone never touches the store
    assert!(store.deleted_keys().is_empty());
}

#[test]
fn test_apply_deletes_only_expired_keys() {
    let store = seeded_store();

    let report = apply_retention(&store, "acme", date("2025-01-20"));

    assert_eq!(report.deleted, vec!["backups/2024/11/10/blog.sql.gz".to_string()]);
    assert_eq!(store.deleted_keys(), report.deleted);
    assert!(store.contains("acme", "backups/manual-export.sql.gz"));
    assert_eq!(
        report.anomalies,
        vec![RetentionAnomaly::UnparseableKey(
            "backups/manual-export.sql.gz".to_string()
        )]
    );
}

#[test]
fn test_apply_is_idempotent() {
    let store = seeded_store();
    let today = date("2025-01-20");

    let first = apply_retention(&store, "acme", today);
    let second = apply_retention(&store, "acme", today);

    assert_eq!(first.deleted.len(), 1);
    assert!(second.deleted.is_empty());
    assert_eq!(first.kept, second.kept);
}

#[test]
fn test_delete_failure_does_not_stop_pass() {
    let store = MockObjectStore::new()
        .with_object("acme", "backups/2024/10/01/blog.sql.gz", b"a")
        .with_object("acme", "backups/2024/10/02/blog.sql.gz", b"b")
        .with_object("acme", "backups/2024/10/03/blog.sql.gz", b"c")
        .with_failing_delete("backups/2024/10/02/blog.sql.gz");

    let report = apply_retention(&store, "acme", date("2025-01-20"));

    assert_eq!(report.deleted.len(), 2);
    assert_eq!(report.delete_failures(), 1);

    let delete_calls = store
        .get_calls()
        .into_iter()
        .filter(|c| matches!(c, StoreCall::Delete { .. }))
        .count();
    assert_eq!(delete_calls, 3);
}

#[test]
fn test_listing_failure_deletes_nothing() {
    let store = seeded_store().with_failing_list();

    let report = apply_retention(&store, "acme", date("2025-01-20"));

    assert!(report.listing_error.is_some());
    assert!(store.deleted_keys().is_empty());
}
