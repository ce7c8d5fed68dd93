//! S3 object store driven through the `aws` CLI

use super::executor::{CommandExecutor, RealExecutor};
use super::store_ops::{ObjectStore, StorageError, StoredObject};
use crate::config::StorageConfig;
use serde::Deserialize;
use std::fs;
use std::ops::Range;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::{debug, info, warn};

/// Region in which buckets are created without a location constraint
const DEFAULT_REGION: &str = "us-east-1";

#[derive(Debug, Deserialize)]
struct ListObjectsResponse {
    #[serde(rename = "Contents", default)]
    contents: Vec<ListedObject>,
}

#[derive(Debug, Deserialize)]
struct ListedObject {
    #[serde(rename = "Key")]
    key: String,
    #[serde(rename = "Size", default)]
    size: u64,
}

#[derive(Debug, Deserialize)]
struct HeadObjectResponse {
    #[serde(rename = "ContentLength")]
    content_length: u64,
}

pub struct S3CliStore<E: CommandExecutor = RealExecutor> {
    executor: E,
    endpoint_url: Option<String>,
    region: Option<String>,
    profile: Option<String>,
    /// Directory for ranged-read downloads
    scratch_dir: PathBuf,
    timeout: Duration,
}

impl S3CliStore<RealExecutor> {
    pub fn new(config: &StorageConfig, scratch_dir: &Path, timeout: Duration) -> Self {
        Self::with_executor(RealExecutor::new(), config, scratch_dir, timeout)
    }
}

impl<E: CommandExecutor> S3CliStore<E> {
    pub fn with_executor(
        executor: E,
        config: &StorageConfig,
        scratch_dir: &Path,
        timeout: Duration,
    ) -> Self {
        Self {
            executor,
            endpoint_url: config.endpoint_url.clone(),
            region: config.region.clone(),
            profile: config.profile.clone(),
            scratch_dir: scratch_dir.to_path_buf(),
            timeout,
        }
    }

    fn global_args(&self) -> Vec<String> {
        let mut args = Vec::new();
        if let Some(ref url) = self.endpoint_url {
            args.push("--endpoint-url".to_string());
            args.push(url.clone());
        }
        if let Some(ref region) = self.region {
            args.push("--region".to_string());
            args.push(region.clone());
        }
        if let Some(ref profile) = self.profile {
            args.push("--profile".to_string());
            args.push(profile.clone());
        }
        args
    }

    fn aws(&self, args: &[&str]) -> Result<String, StorageError> {
        let mut full: Vec<String> = args.iter().map(|s| s.to_string()).collect();
        full.extend(self.global_args());
        let full: Vec<&str> = full.iter().map(String::as_str).collect();

        self.executor
            .run_command_stdout("aws", &full, &[], Some(self.timeout))
            .map_err(|e| classify_cli_error(&e.to_string()))
    }
}

/// Map aws CLI stderr to a storage error
fn classify_cli_error(message: &str) -> StorageError {
    if message.contains("AccessDenied") || message.contains("Forbidden") || message.contains("(403)") {
        StorageError::PermissionDenied(message.to_string())
    } else if message.contains("NoSuchKey") || message.contains("Not Found") || message.contains("(404)") {
        StorageError::NotFound {
            bucket: String::new(),
            key: message.to_string(),
        }
    } else {
        StorageError::Transport(message.to_string())
    }
}

fn parse_list_output(bucket: &str, output: &str) -> Result<Vec<StoredObject>, StorageError> {
    if output.trim().is_empty() {
        return Ok(Vec::new());
    }
    let response: ListObjectsResponse = serde_json::from_str(output)
        .map_err(|e| StorageError::InvalidResponse(e.to_string()))?;

    Ok(response
        .contents
        .into_iter()
        .map(|o| StoredObject {
            bucket: bucket.to_string(),
            key: o.key,
            byte_size: o.size,
        })
        .collect())
}

impl<E: CommandExecutor> ObjectStore for S3CliStore<E> {
    fn ensure_namespace(&self, bucket: &str) -> Result<(), StorageError> {
        match self.aws(&["s3api", "head-bucket", "--bucket", bucket]) {
            Ok(_) => {
                debug!("Bucket exists: {}", bucket);
                return Ok(());
            }
            // Only a missing bucket is created; anything else is passed on
            Err(StorageError::NotFound { .. }) => {}
            Err(e) => return Err(e),
        }

        info!("Creating bucket: {}", bucket);

        let constraint = self
            .region
            .as_deref()
            .filter(|r| *r != DEFAULT_REGION)
            .map(|r| format!("LocationConstraint={}", r));

        let mut args = vec!["s3api", "create-bucket", "--bucket", bucket];
        if let Some(ref c) = constraint {
            args.push("--create-bucket-configuration");
            args.push(c);
        }

        match self.aws(&args) {
            Ok(_) => Ok(()),
            Err(e) if e.to_string().contains("BucketAlreadyOwnedByYou") => Ok(()),
            Err(e) => Err(e),
        }
    }

    fn put(&self, bucket: &str, key: &str, source: &Path) -> Result<(), StorageError> {
        let source = source.to_string_lossy();
        let target = format!("s3://{}/{}", bucket, key);
        self.aws(&["s3", "cp", &source, &target, "--only-show-errors"])?;
        Ok(())
    }

    fn get_range(
        &self,
        bucket: &str,
        key: &str,
        range: Range<u64>,
    ) -> Result<Vec<u8>, StorageError> {
        if range.end <= range.start {
            return Ok(Vec::new());
        }

        fs::create_dir_all(&self.scratch_dir)?;
        let out = self
            .scratch_dir
            .join(format!(".range-{}-{}", std::process::id(), key.replace('/', "_")));
        let out_str = out.to_string_lossy().to_string();
        // HTTP ranges are inclusive
        let range_header = format!("bytes={}-{}", range.start, range.end - 1);

        let result = self.aws(&[
            "s3api",
            "get-object",
            "--bucket",
            bucket,
            "--key",
            key,
            "--range",
            &range_header,
            &out_str,
        ]);

        let bytes = result.and_then(|_| fs::read(&out).map_err(StorageError::from));
        if let Err(e) = fs::remove_file(&out) {
            if e.kind() != std::io::ErrorKind::NotFound {
                warn!("Failed to remove scratch file {:?}: {}", out, e);
            }
        }
        bytes
    }

    fn list(&self, bucket: &str, prefix: &str) -> Result<Vec<StoredObject>, StorageError> {
        let output = self.aws(&[
            "s3api",
            "list-objects-v2",
            "--bucket",
            bucket,
            "--prefix",
            prefix,
            "--output",
            "json",
        ])?;
        parse_list_output(bucket, &output)
    }

    fn delete(&self, bucket: &str, key: &str) -> Result<(), StorageError> {
        self.aws(&["s3api", "delete-object", "--bucket", bucket, "--key", key])?;
        Ok(())
    }

    fn head(&self, bucket: &str, key: &str) -> Result<u64, StorageError> {
        let output = self.aws(&[
            "s3api",
            "head-object",
            "--bucket",
            bucket,
            "--key",
            key,
            "--output",
            "json",
        ])?;
        let head: HeadObjectResponse = serde_json::from_str(&output)
            .map_err(|e| StorageError::InvalidResponse(e.to_string()))?;
        Ok(head.content_length)
    }
}
