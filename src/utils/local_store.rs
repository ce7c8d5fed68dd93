//! Filesystem-backed object store
//!
//! Each bucket is a directory under `root`; keys map to relative paths.

use super::store_ops::{ObjectStore, StorageError, StoredObject};
use std::fs::{self, File};
use std::io::{ErrorKind, Read, Seek, SeekFrom};
use std::ops::Range;
use std::path::{Component, Path, PathBuf};
use tracing::{debug, info};

pub struct LocalStore {
    root: PathBuf,
}

impl LocalStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    fn bucket_path(&self, bucket: &str) -> Result<PathBuf, StorageError> {
        validate_relative(bucket)?;
        Ok(self.root.join(bucket))
    }

    fn object_path(&self, bucket: &str, key: &str) -> Result<PathBuf, StorageError> {
        validate_relative(key)?;
        Ok(self.bucket_path(bucket)?.join(key))
    }

    fn map_not_found(err: std::io::Error, bucket: &str, key: &str) -> StorageError {
        match err.kind() {
            ErrorKind::NotFound => StorageError::NotFound {
                bucket: bucket.to_string(),
                key: key.to_string(),
            },
            ErrorKind::PermissionDenied => StorageError::PermissionDenied(err.to_string()),
            _ => StorageError::Io(err),
        }
    }
}

/// Reject empty, absolute or parent-escaping names
fn validate_relative(name: &str) -> Result<(), StorageError> {
    let path = Path::new(name);
    let ok = !name.is_empty()
        && path
            .components()
            .all(|c| matches!(c, Component::Normal(_)));
    if ok {
        Ok(())
    } else {
        Err(StorageError::InvalidKey(name.to_string()))
    }
}

fn collect_keys(dir: &Path, base: &Path, out: &mut Vec<(String, u64)>) -> std::io::Result<()> {
    for entry in fs::read_dir(dir)? {
        let entry = entry?;
        let path = entry.path();
        let metadata = entry.metadata()?;
        if metadata.is_dir() {
            collect_keys(&path, base, out)?;
        } else if let Ok(relative) = path.strip_prefix(base) {
            let key = relative
                .components()
                .map(|c| c.as_os_str().to_string_lossy())
                .collect::<Vec<_>>()
                .join("/");
            out.push((key, metadata.len()));
        }
    }
    Ok(())
}

impl ObjectStore for LocalStore {
    fn ensure_namespace(&self, bucket: &str) -> Result<(), StorageError> {
        let path = self.bucket_path(bucket)?;
        if !path.is_dir() {
            info!("Creating bucket directory: {:?}", path);
        }
        fs::create_dir_all(&path)?;
        Ok(())
    }

    fn put(&self, bucket: &str, key: &str, source: &Path) -> Result<(), StorageError> {
        let target = self.object_path(bucket, key)?;
        if let Some(parent) = target.parent() {
            fs::create_dir_all(parent)?;
        }
        let bytes = fs::copy(source, &target)?;
        debug!("Stored {} bytes at {:?}", bytes, target);
        Ok(())
    }

    fn get_range(
        &self,
        bucket: &str,
        key: &str,
        range: Range<u64>,
    ) -> Result<Vec<u8>, StorageError> {
        let path = self.object_path(bucket, key)?;
        let mut file = File::open(&path).map_err(|e| Self::map_not_found(e, bucket, key))?;
        file.seek(SeekFrom::Start(range.start))?;

        let mut buf = Vec::new();
        file.take(range.end.saturating_sub(range.start))
            .read_to_end(&mut buf)?;
        Ok(buf)
    }

    fn list(&self, bucket: &str, prefix: &str) -> Result<Vec<StoredObject>, StorageError> {
        let base = self.bucket_path(bucket)?;
        if !base.is_dir() {
            return Ok(Vec::new());
        }

        let mut keys = Vec::new();
        collect_keys(&base, &base, &mut keys)?;
        keys.sort();

        Ok(keys
            .into_iter()
            .filter(|(key, _)| key.starts_with(prefix))
            .map(|(key, byte_size)| StoredObject {
                bucket: bucket.to_string(),
                key,
                byte_size,
            })
            .collect())
    }

    fn delete(&self, bucket: &str, key: &str) -> Result<(), StorageError> {
        let path = self.object_path(bucket, key)?;
        fs::remove_file(&path).map_err(|e| Self::map_not_found(e, bucket, key))?;

        // Drop now-empty date directories, stopping at the bucket
        let base = self.bucket_path(bucket)?;
        let mut dir = path.parent();
        while let Some(d) = dir {
            if d == base.as_path() || fs::remove_dir(d).is_err() {
                break;
            }
            dir = d.parent();
        }
        Ok(())
    }

    fn head(&self, bucket: &str, key: &str) -> Result<u64, StorageError> {
        let path = self.object_path(bucket, key)?;
        let metadata = fs::metadata(&path).map_err(|e| Self::map_not_found(e, bucket, key))?;
        Ok(metadata.len())
    }
}
