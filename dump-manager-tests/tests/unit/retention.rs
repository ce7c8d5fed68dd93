//! Retention policy properties

use dump_manager::managers::retention::{
    classify, object_key, parse_backup_date, plan, RetentionDecision, Tier,
};
use chrono::{Datelike, Weekday};
use rstest::rstest;
use test_utils::{date, retention_scenario_keys};

#[test]
fn test_reference_scenario() {
    let today = date("2025-01-20");
    let keys = retention_scenario_keys("blog");

    let plan = plan(keys.iter().map(|(k, _)| k.clone()), today);

    for (key, kept) in &keys {
        let in_keep = plan.keep.iter().any(|(k, _)| k == key);
        let in_delete = plan.delete.contains(key);
        assert_eq!(in_keep, *kept, "{}", key);
        assert_eq!(in_delete, !*kept, "{}", key);
    }
}

#[test]
fn test_recent_dates_always_kept() {
    let today = date("2025-03-15");
    for age in 0..=7 {
        let backup = today - chrono::Duration::days(age);
        assert_eq!(
            classify(backup, today),
            RetentionDecision::Keep(Tier::Daily),
            "age {}",
            age
        );
    }
}

#[test]
fn test_weekly_window_only_keeps_sundays() {
    let today = date("2025-03-15");
    for age in 8..=35 {
        let backup = today - chrono::Duration::days(age);
        let decision = classify(backup, today);
        if backup.weekday() == Weekday::Sun {
            assert!(decision.keep(), "{} should be kept", backup);
        } else {
            assert_eq!(decision, RetentionDecision::Delete, "{}", backup);
        }
    }
}

#[rstest]
#[case("2020-03-01")]
#[case("2021-08-01")]
#[case("2023-01-01")]
#[case("2024-09-01")]
#[case("2024-06-02")]
fn test_first_sundays_kept_forever(#[case] backup: &str) {
    assert_eq!(
        classify(date(backup), date("2025-06-30")),
        RetentionDecision::Keep(Tier::Monthly)
    );
}

#[test]
fn test_classification_is_idempotent() {
    let today = date("2025-01-20");
    let mut day = date("2024-01-01");
    while day <= today {
        assert_eq!(classify(day, today), classify(day, today));
        day = day.succ_opt().unwrap();
    }
}

#[test]
fn test_key_round_trip_for_date() {
    let key = object_key(date("2025-02-09"), "shop");
    assert_eq!(key, "backups/2025/02/09/shop.sql.gz");
    assert_eq!(parse_backup_date(&key), Some(date("2025-02-09")));
}

#[rstest]
#[case("backups/2025/1/05/blog.sql.gz")]
#[case("backups/2025/02/30/blog.sql.gz")]
#[case("backups/2025/01/05/")]
#[case("archive/2025/01/05/blog.sql.gz")]
#[case("backups/latest.sql.gz")]
fn test_unparseable_keys_never_classified(#[case] key: &str) {
    let plan = plan(vec![key.to_string()], date("2025-01-20"));
    assert!(plan.keep.is_empty());
    assert!(plan.delete.is_empty());
    assert_eq!(plan.unparseable, vec![key.to_string()]);
}
