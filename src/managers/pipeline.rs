//! Per-site backup pipeline
//!
//! One site is backed up as a strict sequence of steps:
//!
//! ```text
//! Start -> CredentialsResolved -> Dumped -> Compressed -> Uploaded
//!       -> Verified -> LocalCleaned -> RetentionApplied
//! ```
//!
//! The first failing step aborts the site. Whatever the outcome, exactly one
//! status record is appended and the local artifact never outlives the run.
//! Notifications are left to the caller.

use crate::config::{GlobalConfig, Site};
use crate::managers::retention::{self, RetentionReport};
use crate::managers::status::{StatusRecord, StatusRecorder};
use crate::utils::compress::{create_private_file, gunzip_prefix, gzip_in_place};
use crate::utils::docker_ops::{Credentials, DataSource};
use crate::utils::store_ops::ObjectStore;
use chrono::{DateTime, Local, NaiveDate};
use std::fmt;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};
use tracing::{debug, error, info, warn};

/// Upper bound on decompressed bytes scanned for a dump signature
const HEADER_SCAN_BYTES: usize = 8192;

/// Furthest step a site's backup reached
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum BackupStage {
    Start,
    CredentialsResolved,
    Dumped,
    Compressed,
    Uploaded,
    Verified,
    LocalCleaned,
    RetentionApplied,
}

impl fmt::Display for BackupStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            BackupStage::Start => "start",
            BackupStage::CredentialsResolved => "credentials resolved",
            BackupStage::Dumped => "dumped",
            BackupStage::Compressed => "compressed",
            BackupStage::Uploaded => "uploaded",
            BackupStage::Verified => "verified",
            BackupStage::LocalCleaned => "local cleaned",
            BackupStage::RetentionApplied => "retention applied",
        };
        write!(f, "{}", name)
    }
}

/// Step failures that abort a site's backup
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum PipelineError {
    #[error("Credentials unavailable: {0}")]
    CredentialsUnavailable(String),

    #[error("Dump failed: {0}")]
    DumpFailed(String),

    #[error("Compression failed: {0}")]
    CompressionFailed(String),

    #[error("Upload failed: {0}")]
    UploadFailed(String),

    #[error("Verification failed: {0}")]
    VerificationFailed(String),
}

/// Local dump file owned by one pipeline run.
///
/// The file is removed when the artifact is dropped.
#[derive(Debug)]
pub struct BackupArtifact {
    pub site_id: String,
    pub local_path: PathBuf,
    pub byte_size: u64,
    pub created_at: DateTime<Local>,
}

impl BackupArtifact {
    fn new(site_id: &str, local_path: PathBuf) -> Self {
        Self {
            site_id: site_id.to_string(),
            local_path,
            byte_size: 0,
            created_at: Local::now(),
        }
    }
}

impl Drop for BackupArtifact {
    fn drop(&mut self) {
        match fs::remove_file(&self.local_path) {
            Ok(()) => debug!("Removed local artifact {:?}", self.local_path),
            Err(e) if e.kind() == io::ErrorKind::NotFound => {}
            Err(e) => warn!(
                "Failed to remove local artifact {:?} for '{}': {}",
                self.local_path, self.site_id, e
            ),
        }
    }
}

/// Pipeline tunables taken from `[global]`
#[derive(Debug, Clone)]
pub struct PipelineSettings {
    pub work_dir: PathBuf,
    pub min_dump_bytes: u64,
    pub verify_bytes: u64,
}

impl PipelineSettings {
    pub fn from_global(global: &GlobalConfig) -> Self {
        Self {
            work_dir: global.work_dir.clone(),
            min_dump_bytes: global.min_dump_bytes,
            verify_bytes: global.verify_bytes,
        }
    }
}

/// Outcome of one site's backup
#[derive(Debug, Clone)]
pub struct SiteReport {
    pub site_id: String,
    pub stage: BackupStage,
    /// Object key, once uploaded
    pub key: Option<String>,
    /// Uploaded size; 0 unless the backup succeeded
    pub byte_size: u64,
    pub retention: Option<RetentionReport>,
    pub error: Option<PipelineError>,
    pub duration: Duration,
}

impl SiteReport {
    fn new(site_id: &str) -> Self {
        Self {
            site_id: site_id.to_string(),
            stage: BackupStage::Start,
            key: None,
            byte_size: 0,
            retention: None,
            error: None,
            duration: Duration::ZERO,
        }
    }

    pub fn is_success(&self) -> bool {
        self.error.is_none()
    }
}

pub struct BackupPipeline<'a> {
    source: &'a dyn DataSource,
    store: &'a dyn ObjectStore,
    recorder: &'a StatusRecorder,
    settings: PipelineSettings,
}

impl<'a> BackupPipeline<'a> {
    pub fn new(
        source: &'a dyn DataSource,
        store: &'a dyn ObjectStore,
        recorder: &'a StatusRecorder,
        settings: PipelineSettings,
    ) -> Self {
        Self {
            source,
            store,
            recorder,
            settings,
        }
    }

    pub fn recorder(&self) -> &StatusRecorder {
        self.recorder
    }

    pub fn store(&self) -> &dyn ObjectStore {
        self.store
    }

    /// Back up one site and record the outcome
    pub fn run(&self, site: &Site, today: NaiveDate) -> SiteReport {
        let start = Instant::now();
        info!(
            "Starting backup for site '{}' (container '{}', bucket '{}')",
            site.id, site.source_ref, site.store_ref
        );

        let mut report = SiteReport::new(&site.id);
        let result = self.execute(site, today, &mut report);
        report.duration = start.elapsed();

        let record = match &result {
            Ok(()) => {
                info!(
                    "Backup for site '{}' completed in {:.2}s ({} bytes)",
                    site.id,
                    report.duration.as_secs_f64(),
                    report.byte_size
                );
                StatusRecord::success(today, &site.id, report.byte_size)
            }
            Err(e) => {
                error!(
                    "Backup for site '{}' failed after stage '{}': {}",
                    site.id, report.stage, e
                );
                report.byte_size = 0;
                StatusRecord::failure(today, &site.id, &e.to_string())
            }
        };
        self.recorder.record(&record);

        report.error = result.err();
        report
    }

    fn execute(
        &self,
        site: &Site,
        today: NaiveDate,
        report: &mut SiteReport,
    ) -> Result<(), PipelineError> {
        let timeout = Duration::from_secs(site.timeout_seconds);

        let credentials = self
            .source
            .resolve_credentials(&site.source_ref, site.engine, timeout)
            .map_err(|e| PipelineError::CredentialsUnavailable(e.to_string()))?;
        report.stage = BackupStage::CredentialsResolved;
        debug!("Resolved credentials for '{}': {:?}", site.id, credentials);

        let mut artifact = self.dump(site, &credentials, timeout)?;
        report.stage = BackupStage::Dumped;

        self.compress(&mut artifact)?;
        report.stage = BackupStage::Compressed;

        let key = retention::object_key(today, &site.id);
        // The artifact is dropped (and removed) if the upload fails
        self.upload(site, &artifact, &key)?;
        report.stage = BackupStage::Uploaded;
        report.key = Some(key.clone());

        let verification = self.verify(site, &key);
        if verification.is_ok() {
            report.stage = BackupStage::Verified;
        }

        let uploaded_bytes = artifact.byte_size;
        drop(artifact);
        verification?;
        report.stage = BackupStage::LocalCleaned;

        report.retention = Some(retention::apply_retention(self.store, &site.store_ref, today));
        report.stage = BackupStage::RetentionApplied;
        report.byte_size = uploaded_bytes;

        Ok(())
    }

    fn dump(
        &self,
        site: &Site,
        credentials: &Credentials,
        timeout: Duration,
    ) -> Result<BackupArtifact, PipelineError> {
        let dump_err = |what: &str, e: &dyn fmt::Display| {
            PipelineError::DumpFailed(format!("{}: {}", what, e))
        };

        create_work_dir(&self.settings.work_dir)
            .map_err(|e| dump_err("cannot create work directory", &e))?;

        let path = self.settings.work_dir.join(format!("{}.sql", site.id));
        remove_stale(&path);
        remove_stale(&path.with_extension("sql.gz"));

        let sink = create_private_file(&path)
            .map_err(|e| dump_err(&format!("cannot create {:?}", path), &e))?;
        let mut artifact = BackupArtifact::new(&site.id, path);

        info!("Dumping {} database from container '{}'", site.engine, site.source_ref);
        self.source
            .run_dump(&site.source_ref, site.engine, credentials, sink, timeout)
            .map_err(|e| PipelineError::DumpFailed(e.to_string()))?;

        let size = fs::metadata(&artifact.local_path)
            .map_err(|e| dump_err("cannot stat dump", &e))?
            .len();

        if size < self.settings.min_dump_bytes {
            return Err(PipelineError::DumpFailed(format!(
                "dump is only {} bytes (minimum {})",
                size, self.settings.min_dump_bytes
            )));
        }

        artifact.byte_size = size;
        debug!("Dump for '{}' is {} bytes", site.id, size);
        Ok(artifact)
    }

    fn compress(&self, artifact: &mut BackupArtifact) -> Result<(), PipelineError> {
        let compressed = gzip_in_place(&artifact.local_path)
            .map_err(|e| PipelineError::CompressionFailed(format!("{:#}", e)))?;
        artifact.local_path = compressed;

        artifact.byte_size = fs::metadata(&artifact.local_path)
            .map_err(|e| PipelineError::CompressionFailed(e.to_string()))?
            .len();

        debug!(
            "Compressed dump for '{}' to {} bytes",
            artifact.site_id, artifact.byte_size
        );
        Ok(())
    }

    fn upload(
        &self,
        site: &Site,
        artifact: &BackupArtifact,
        key: &str,
    ) -> Result<(), PipelineError> {
        self.store
            .ensure_namespace(&site.store_ref)
            .map_err(|e| {
                PipelineError::UploadFailed(format!(
                    "cannot prepare bucket '{}': {}",
                    site.store_ref, e
                ))
            })?;

        info!("Uploading {} bytes to {}/{}", artifact.byte_size, site.store_ref, key);
        self.store
            .put(&site.store_ref, key, &artifact.local_path)
            .map_err(|e| PipelineError::UploadFailed(e.to_string()))?;

        let stored = self
            .store
            .head(&site.store_ref, key)
            .map_err(|e| PipelineError::UploadFailed(e.to_string()))?;

        if stored != artifact.byte_size {
            return Err(PipelineError::UploadFailed(format!(
                "stored object is {} bytes, expected {}",
                stored, artifact.byte_size
            )));
        }

        Ok(())
    }

    /// Header-only plausibility check of the stored object
    fn verify(&self, site: &Site, key: &str) -> Result<(), PipelineError> {
        let prefix = self
            .store
            .get_range(&site.store_ref, key, 0..self.settings.verify_bytes)
            .map_err(|e| {
                PipelineError::VerificationFailed(format!("cannot read back {}: {}", key, e))
            })?;

        let header = gunzip_prefix(&prefix, HEADER_SCAN_BYTES);
        let text = String::from_utf8_lossy(&header);
        let signatures = site.engine.dump_signatures();

        if signatures.iter().any(|s| text.contains(s)) {
            info!("Verified {}/{}", site.store_ref, key);
            Ok(())
        } else {
            Err(PipelineError::VerificationFailed(format!(
                "{}/{} does not start like a {} dump",
                site.store_ref, key, site.engine
            )))
        }
    }
}

fn create_work_dir(path: &Path) -> io::Result<()> {
    let mut builder = fs::DirBuilder::new();
    builder.recursive(true);

    #[cfg(unix)]
    {
        use std::os::unix::fs::DirBuilderExt;
        builder.mode(0o700);
    }

    builder.create(path)
}

/// Leftovers from an interrupted run
fn remove_stale(path: &Path) {
    match fs::remove_file(path) {
        Ok(()) => warn!("Removed stale artifact {:?}", path),
        Err(e) if e.kind() == io::ErrorKind::NotFound => {}
        Err(e) => warn!("Failed to remove stale artifact {:?}: {}", path, e),
    }
}
