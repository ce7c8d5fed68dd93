//! Tiered retention for stored dumps
//!
//! Every stored object carries its backup date in its key
//! (`backups/YYYY/MM/DD/<site>.sql.gz`). Whether an object is kept depends only
//! on that date and "today":
//!
//! 1. daily: at most 7 days old
//! 2. weekly: a Sunday at most 35 days old
//! 3. monthly: the first Sunday of its month, kept indefinitely
//! 4. anything else is deleted
//!
//! Rules are evaluated in that order and the first match wins.

use crate::utils::store_ops::ObjectStore;
use chrono::{Datelike, NaiveDate, Weekday};
use std::fmt;
use tracing::{info, warn};

/// Prefix shared by every backup key
pub const KEY_PREFIX: &str = "backups/";

/// Extension of a compressed SQL dump
pub const DUMP_EXTENSION: &str = "sql.gz";

/// Daily tier window in days
pub const DAILY_WINDOW_DAYS: i64 = 7;

/// Weekly tier window in days
pub const WEEKLY_WINDOW_DAYS: i64 = 35;

/// Day that anchors the weekly and monthly tiers
pub const END_OF_WEEK: Weekday = Weekday::Sun;

/// Retention tier that kept a backup
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Tier {
    Daily,
    Weekly,
    Monthly,
}

impl fmt::Display for Tier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Tier::Daily => write!(f, "daily"),
            Tier::Weekly => write!(f, "weekly"),
            Tier::Monthly => write!(f, "monthly"),
        }
    }
}

/// Outcome of classifying a single backup date
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RetentionDecision {
    Keep(Tier),
    Delete,
}

impl RetentionDecision {
    pub fn keep(&self) -> bool {
        matches!(self, RetentionDecision::Keep(_))
    }
}

/// Classify a backup date against today.
///
/// Ages are whole calendar days. A date in the future has a negative age and
/// falls in the daily tier.
pub fn classify(backup_date: NaiveDate, today: NaiveDate) -> RetentionDecision {
    let age_days = (today - backup_date).num_days();
    let is_end_of_week = backup_date.weekday() == END_OF_WEEK;

    if age_days <= DAILY_WINDOW_DAYS {
        RetentionDecision::Keep(Tier::Daily)
    } else if is_end_of_week && age_days <= WEEKLY_WINDOW_DAYS {
        RetentionDecision::Keep(Tier::Weekly)
    } else if is_end_of_week && backup_date.day() <= 7 {
        RetentionDecision::Keep(Tier::Monthly)
    } else {
        RetentionDecision::Delete
    }
}

/// Build the object key for a site's dump taken on `date`
pub fn object_key(date: NaiveDate, site_id: &str) -> String {
    format!(
        "{}{}/{}.{}",
        KEY_PREFIX,
        date.format("%Y/%m/%d"),
        site_id,
        DUMP_EXTENSION
    )
}

/// Extract the backup date from a key.
///
/// Returns `None` unless the key is `backups/` followed by a 4-digit year,
/// 2-digit month and 2-digit day forming a real calendar date, and a
/// non-empty object name.
pub fn parse_backup_date(key: &str) -> Option<NaiveDate> {
    let rest = key.strip_prefix(KEY_PREFIX)?;
    let mut parts = rest.splitn(4, '/');

    let year = parts.next()?;
    let month = parts.next()?;
    let day = parts.next()?;
    let name = parts.next()?;

    if name.is_empty() || !is_digits(year, 4) || !is_digits(month, 2) || !is_digits(day, 2) {
        return None;
    }

    NaiveDate::from_ymd_opt(year.parse().ok()?, month.parse().ok()?, day.parse().ok()?)
}

fn is_digits(s: &str, len: usize) -> bool {
    s.len() == len && s.bytes().all(|b| b.is_ascii_digit())
}

/// Keys partitioned by retention decision
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RetentionPlan {
    pub keep: Vec<(String, Tier)>,
    pub delete: Vec<String>,
    /// Keys with no parseable date; neither kept nor deleted
    pub unparseable: Vec<String>,
}

/// Classify every key. Unparseable keys are logged and set aside.
pub fn plan<I, S>(keys: I, today: NaiveDate) -> RetentionPlan
where
    I: IntoIterator<Item = S>,
    S: Into<String>,
{
    let mut plan = RetentionPlan::default();

    for key in keys {
        let key = key.into();
        match parse_backup_date(&key) {
            Some(date) => match classify(date, today) {
                RetentionDecision::Keep(tier) => plan.keep.push((key, tier)),
                RetentionDecision::Delete => plan.delete.push(key),
            },
            None => {
                warn!("Unparseable backup key, excluded from retention: {}", key);
                plan.unparseable.push(key);
            }
        }
    }

    plan
}

/// Non-fatal problems met while pruning
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum RetentionAnomaly {
    #[error("Unparseable backup key: {0}")]
    UnparseableKey(String),

    #[error("Failed to delete {key}: {reason}")]
    DeleteFailed { key: String, reason: String },
}

/// Result of one pruning pass over a bucket
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RetentionReport {
    pub kept: usize,
    pub deleted: Vec<String>,
    pub anomalies: Vec<RetentionAnomaly>,
    /// Set when the bucket could not be listed; nothing was pruned
    pub listing_error: Option<String>,
}

impl RetentionReport {
    pub fn delete_failures(&self) -> usize {
        self.anomalies
            .iter()
            .filter(|a| matches!(a, RetentionAnomaly::DeleteFailed { .. }))
            .count()
    }

    pub fn unparseable(&self) -> usize {
        self.anomalies
            .iter()
            .filter(|a| matches!(a, RetentionAnomaly::UnparseableKey(_)))
            .count()
    }
}

/// List every backup in `bucket` and delete those the policy drops.
///
/// Deletion is attempted one key at a time; a failed delete is recorded and
/// the pass continues.
pub fn apply_retention(store: &dyn ObjectStore, bucket: &str, today: NaiveDate) -> RetentionReport {
    let objects = match store.list(bucket, KEY_PREFIX) {
        Ok(objects) => objects,
        Err(e) => {
            warn!("Retention skipped for bucket '{}': listing failed: {}", bucket, e);
            return RetentionReport {
                listing_error: Some(e.to_string()),
                ..Default::default()
            };
        }
    };

    let plan = plan(objects.into_iter().map(|o| o.key), today);

    let mut report = RetentionReport {
        kept: plan.keep.len(),
        anomalies: plan
            .unparseable
            .into_iter()
            .map(RetentionAnomaly::UnparseableKey)
            .collect(),
        ..Default::default()
    };

    for key in plan.delete {
        match store.delete(bucket, &key) {
            Ok(()) => {
                info!("Deleted expired backup: {}/{}", bucket, key);
                report.deleted.push(key);
            }
            Err(e) => {
                warn!("Failed to delete expired backup {}/{}: {}", bucket, key, e);
                report.anomalies.push(RetentionAnomaly::DeleteFailed {
                    key,
                    reason: e.to_string(),
                });
            }
        }
    }

    info!(
        "Retention for bucket '{}': kept {}, deleted {}, delete failures {}, unparseable {}",
        bucket,
        report.kept,
        report.deleted.len(),
        report.delete_failures(),
        report.unparseable()
    );

    report
}
