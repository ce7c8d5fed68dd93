//! Tests for the 'status' and 'digest' commands

use dump_manager::managers::coordinator::{digest_since, send_digest};
use dump_manager::managers::status::StatusRecord;
use test_utils::{date, ConfigBuilder, MockNotifier, SentNotification, TestContext};

fn ledger_with_week(ctx: &TestContext) {
    let recorder = ctx.recorder();
    recorder.record(&StatusRecord::success(date("2025-01-12"), "blog", 900));
    recorder.record(&StatusRecord::success(date("2025-01-14"), "blog", 1000));
    recorder.record(&StatusRecord::failure(date("2025-01-15"), "shop", "Dump failed: exit 2"));
    recorder.record(&StatusRecord::success(date("2025-01-20"), "blog", 1100));
    recorder.record(&StatusRecord::success(date("2025-01-20"), "shop", 400));
}

#[test]
fn test_status_window() {
    let ctx = TestContext::with_minimal_config();
    ledger_with_week(&ctx);

    let since = digest_since(date("2025-01-20"), 7);
    let records = ctx.recorder().query(since).unwrap();

    assert_eq!(since, date("2025-01-14"));
    assert_eq!(records.len(), 4);
    assert_eq!(records[0].date, date("2025-01-14"));
}

#[test]
fn test_digest_sent_once() {
    let ctx = TestContext::with_minimal_config();
    ledger_with_week(&ctx);
    let notifier = MockNotifier::new();

    let digest = send_digest(&ctx.recorder(), &notifier, date("2025-01-20"), 7).unwrap();

    assert_eq!(digest.total, 4);
    assert_eq!(digest.succeeded, 3);
    assert_eq!(digest.failed, 1);
    assert_eq!(digest.bytes_uploaded, 2500);

    let sent = notifier.sent.lock().unwrap().clone();
    assert_eq!(sent, vec![SentNotification::Digest(digest)]);
}

#[test]
fn test_digest_of_empty_ledger() {
    let ctx = TestContext::from_builder(ConfigBuilder::minimal());
    let notifier = MockNotifier::new();

    let digest = send_digest(&ctx.recorder(), &notifier, date("2025-01-20"), 7).unwrap();

    assert_eq!(digest.total, 0);
    assert!(digest.failures.is_empty());
    assert_eq!(notifier.digests().len(), 1);
}
