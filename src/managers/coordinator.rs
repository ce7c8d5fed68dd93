//! Run coordinator - backs up sites one after another
//!
//! A failing site never stops the run. Each failure is reported to the
//! notifier as soon as it happens; the run as a whole fails if any site did.

use crate::config::Site;
use crate::managers::notification::Notifier;
use crate::managers::pipeline::{BackupPipeline, SiteReport};
use crate::managers::status::{Digest, StatusRecorder};
use crate::utils::locker::with_run_lock;
use anyhow::{bail, Context, Result};
use chrono::{Days, NaiveDate};
use std::path::PathBuf;
use tracing::{error, info, warn};

/// Which sites a run processes
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RunMode {
    /// Every enabled site, in configuration order
    All,
    /// Sites whose container name contains the given text
    Named(String),
    /// Only the first enabled site
    Smoke,
}

/// Totals for one run
#[derive(Debug, Clone, Default)]
pub struct RunSummary {
    pub total: usize,
    pub succeeded: usize,
    pub failed: usize,
    pub reports: Vec<SiteReport>,
}

impl RunSummary {
    fn push(&mut self, report: SiteReport) {
        self.total += 1;
        if report.is_success() {
            self.succeeded += 1;
        } else {
            self.failed += 1;
        }
        self.reports.push(report);
    }

    pub fn is_success(&self) -> bool {
        self.failed == 0
    }

    pub fn failed_sites(&self) -> Vec<&str> {
        self.reports
            .iter()
            .filter(|r| !r.is_success())
            .map(|r| r.site_id.as_str())
            .collect()
    }
}

/// Pick the sites a mode applies to, preserving order
pub fn select_sites<'s>(sites: &'s [Site], mode: &RunMode) -> Result<Vec<&'s Site>> {
    let selected: Vec<&Site> = match mode {
        RunMode::All => sites.iter().collect(),
        RunMode::Named(name) => {
            let matched: Vec<&Site> = sites
                .iter()
                .filter(|s| s.source_ref.contains(name.as_str()))
                .collect();
            if matched.is_empty() {
                bail!("No enabled site has a container matching '{}'", name);
            }
            matched
        }
        RunMode::Smoke => sites.iter().take(1).collect(),
    };

    if selected.is_empty() {
        bail!("No enabled sites to back up");
    }

    Ok(selected)
}

pub struct RunCoordinator<'a> {
    pipeline: BackupPipeline<'a>,
    notifier: Option<&'a dyn Notifier>,
    lock_path: PathBuf,
    /// Send a digest over this many days once the run is over
    digest_days: Option<u32>,
}

impl<'a> RunCoordinator<'a> {
    pub fn new(
        pipeline: BackupPipeline<'a>,
        notifier: Option<&'a dyn Notifier>,
        lock_path: PathBuf,
    ) -> Self {
        Self {
            pipeline,
            notifier,
            lock_path,
            digest_days: None,
        }
    }

    pub fn with_digest(mut self, days: u32) -> Self {
        self.digest_days = Some(days);
        self
    }

    /// Run the selected sites while holding the run lock
    pub fn run(&self, sites: &[Site], mode: &RunMode, today: NaiveDate) -> Result<RunSummary> {
        let selected = select_sites(sites, mode)?;

        let summary = with_run_lock(&self.lock_path, || self.run_sites(&selected, today))
            .context("Failed to acquire run lock")?;

        info!(
            "Run finished: {} site(s), {} succeeded, {} failed",
            summary.total, summary.succeeded, summary.failed
        );

        if let Some(days) = self.digest_days {
            if let Some(notifier) = self.notifier {
                if let Err(e) = send_digest(self.pipeline.recorder(), notifier, today, days) {
                    warn!("Failed to build digest: {:#}", e);
                }
            }
        }

        Ok(summary)
    }

    fn run_sites(&self, sites: &[&Site], today: NaiveDate) -> RunSummary {
        let mut summary = RunSummary::default();

        for site in sites {
            let report = self.pipeline.run(site, today);

            if let Some(ref e) = report.error {
                error!("Site '{}' failed: {}", site.id, e);
                if let Some(notifier) = self.notifier {
                    notifier.notify_failure(&site.id, &e.to_string());
                }
            }

            summary.push(report);
        }

        summary
    }
}

/// Summarise the ledger over the last `days` days and send it
pub fn send_digest(
    recorder: &StatusRecorder,
    notifier: &dyn Notifier,
    today: NaiveDate,
    days: u32,
) -> Result<Digest> {
    let since = digest_since(today, days);
    let records = recorder.query(since)?;
    let digest = Digest::from_records(&records, since);

    info!(
        "Sending digest since {}: {} run(s), {} failed",
        since, digest.total, digest.failed
    );
    notifier.notify_digest(&digest);

    Ok(digest)
}

/// First day of a window of `days` days ending today
pub fn digest_since(today: NaiveDate, days: u32) -> NaiveDate {
    today
        .checked_sub_days(Days::new(u64::from(days.saturating_sub(1))))
        .unwrap_or(NaiveDate::MIN)
}
