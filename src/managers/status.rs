//! Append-only status ledger
//!
//! One line per site per run:
//!
//! ```text
//! 2025-01-20|blog|success|48213|
//! 2025-01-20|shop|failure|0|Upload failed: AccessDenied
//! ```

use anyhow::{Context, Result};
use chrono::NaiveDate;
use std::fmt;
use std::fs::{self, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use tracing::{debug, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    Success,
    Failure,
}

impl fmt::Display for Outcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Outcome::Success => write!(f, "success"),
            Outcome::Failure => write!(f, "failure"),
        }
    }
}

impl FromStr for Outcome {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s {
            "success" => Ok(Outcome::Success),
            "failure" => Ok(Outcome::Failure),
            other => Err(format!("unknown outcome '{}'", other)),
        }
    }
}

/// One ledger entry
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StatusRecord {
    pub date: NaiveDate,
    pub site_id: String,
    pub outcome: Outcome,
    pub byte_size: u64,
    pub error_text: String,
}

impl StatusRecord {
    pub fn success(date: NaiveDate, site_id: &str, byte_size: u64) -> Self {
        Self {
            date,
            site_id: site_id.to_string(),
            outcome: Outcome::Success,
            byte_size,
            error_text: String::new(),
        }
    }

    pub fn failure(date: NaiveDate, site_id: &str, error: &str) -> Self {
        Self {
            date,
            site_id: site_id.to_string(),
            outcome: Outcome::Failure,
            byte_size: 0,
            error_text: error.to_string(),
        }
    }

    /// Format as a ledger line (without trailing newline)
    pub fn to_line(&self) -> String {
        format!(
            "{}|{}|{}|{}|{}",
            self.date.format("%Y-%m-%d"),
            sanitize(&self.site_id),
            self.outcome,
            self.byte_size,
            sanitize(&self.error_text)
        )
    }

    /// Parse a ledger line
    pub fn parse_line(line: &str) -> Option<Self> {
        let mut fields = line.splitn(5, '|');
        let date = NaiveDate::parse_from_str(fields.next()?, "%Y-%m-%d").ok()?;
        let site_id = fields.next()?.to_string();
        let outcome = fields.next()?.parse().ok()?;
        let byte_size = fields.next()?.parse().ok()?;
        let error_text = fields.next()?.to_string();

        if site_id.is_empty() {
            return None;
        }

        Some(Self {
            date,
            site_id,
            outcome,
            byte_size,
            error_text,
        })
    }
}

/// Keep every record on one line with exactly five fields
fn sanitize(text: &str) -> String {
    text.chars()
        .map(|c| match c {
            '|' | '\n' | '\r' => ' ',
            c => c,
        })
        .collect::<String>()
        .trim()
        .to_string()
}

/// Append-only ledger of per-site outcomes
pub struct StatusRecorder {
    path: PathBuf,
}

impl StatusRecorder {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Append a record. Errors are logged, never returned.
    pub fn record(&self, entry: &StatusRecord) {
        if let Err(e) = self.append(entry) {
            warn!(
                "Failed to record status for '{}' in {:?}: {:#}",
                entry.site_id, self.path, e
            );
        }
    }

    fn append(&self, entry: &StatusRecord) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent)
                .context(format!("Failed to create directory {:?}", parent))?;
        }

        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)
            .context("Failed to open status ledger")?;

        writeln!(file, "{}", entry.to_line()).context("Failed to write status ledger")?;
        debug!("Recorded status: {}", entry.to_line());
        Ok(())
    }

    /// All records dated on or after `since`, in insertion order
    pub fn query(&self, since: NaiveDate) -> Result<Vec<StatusRecord>> {
        if !self.path.exists() {
            return Ok(Vec::new());
        }

        let content = fs::read_to_string(&self.path)
            .context(format!("Failed to read status ledger {:?}", self.path))?;

        let mut records = Vec::new();
        for (number, line) in content.lines().enumerate() {
            if line.trim().is_empty() {
                continue;
            }
            match StatusRecord::parse_line(line) {
                Some(record) if record.date >= since => records.push(record),
                Some(_) => {}
                None => warn!("Skipping malformed status line {}: {}", number + 1, line),
            }
        }

        Ok(records)
    }
}

/// Aggregate of ledger records over a window
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Digest {
    pub since: NaiveDate,
    pub total: usize,
    pub succeeded: usize,
    pub failed: usize,
    pub bytes_uploaded: u64,
    pub failures: Vec<StatusRecord>,
}

impl Digest {
    pub fn from_records(records: &[StatusRecord], since: NaiveDate) -> Self {
        let mut digest = Self {
            since,
            total: 0,
            succeeded: 0,
            failed: 0,
            bytes_uploaded: 0,
            failures: Vec::new(),
        };

        for record in records.iter().filter(|r| r.date >= since) {
            digest.total += 1;
            match record.outcome {
                Outcome::Success => {
                    digest.succeeded += 1;
                    digest.bytes_uploaded += record.byte_size;
                }
                Outcome::Failure => {
                    digest.failed += 1;
                    digest.failures.push(record.clone());
                }
            }
        }

        digest
    }
}
