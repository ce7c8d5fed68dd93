//! Status ledger and digest aggregation

use dump_manager::managers::status::{Digest, Outcome, StatusRecord, StatusRecorder};
use test_utils::{date, TestContext};

#[test]
fn test_ledger_lines_on_disk() {
    let ctx = TestContext::new();
    let recorder = StatusRecorder::new(ctx.temp_dir().join("status.log"));

    recorder.record(&StatusRecord::success(date("2025-01-20"), "blog", 48213));
    recorder.record(&StatusRecord::failure(
        date("2025-01-20"),
        "shop",
        "Upload failed: AccessDenied | bucket acme\nretry later",
    ));

    let content = ctx.read_file("status.log").unwrap();
    let lines: Vec<_> = content.lines().collect();
    assert_eq!(lines.len(), 2);
    assert_eq!(lines[0], "2025-01-20|blog|success|48213|");
    assert_eq!(
        lines[1],
        "2025-01-20|shop|failure|0|Upload failed: AccessDenied   bucket acme retry later"
    );
    assert!(lines.iter().all(|l| l.matches('|').count() == 4));
}

#[test]
fn test_query_cutoff_is_inclusive() {
    let ctx = TestContext::new();
    let recorder = StatusRecorder::new(ctx.temp_dir().join("status.log"));

    recorder.record(&StatusRecord::success(date("2025-01-13"), "blog", 1));
    recorder.record(&StatusRecord::success(date("2025-01-14"), "blog", 2));

    let records = recorder.query(date("2025-01-14")).unwrap();
    assert_eq!(records.len(), 1);
    assert_eq!(records[0].byte_size, 2);
}

#[test]
fn test_digest_counts() {
    let records = vec![
        StatusRecord::success(date("2025-01-19"), "blog", 1000),
        StatusRecord::failure(date("2025-01-19"), "shop", "Dump failed: exit 2"),
        StatusRecord::success(date("2025-01-20"), "blog", 1500),
        StatusRecord::success(date("2025-01-20"), "shop", 700),
    ];

    let digest = Digest::from_records(&records, date("2025-01-14"));

    assert_eq!(digest.total, 4);
    assert_eq!(digest.succeeded, 3);
    assert_eq!(digest.failed, 1);
    assert_eq!(digest.bytes_uploaded, 3200);
    assert_eq!(digest.failures.len(), 1);
    assert_eq!(digest.failures[0].outcome, Outcome::Failure);
}
