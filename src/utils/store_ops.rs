//! Object store abstraction
//!
//! Buckets are namespaces; keys are `/`-separated strings. The pipeline only
//! ever streams whole artifacts in, reads a short prefix back, lists keys and
//! deletes single keys.

use std::ops::Range;
use std::path::Path;

/// A stored object as reported by a listing
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoredObject {
    pub bucket: String,
    pub key: String,
    pub byte_size: u64,
}

#[derive(Debug, thiserror::Error)]
pub enum StorageError {
    #[error("Object not found: {bucket}/{key}")]
    NotFound { bucket: String, key: String },

    #[error("Permission denied: {0}")]
    PermissionDenied(String),

    #[error("Invalid object key: {0}")]
    InvalidKey(String),

    #[error("Unexpected response from object store: {0}")]
    InvalidResponse(String),

    #[error("Transport error: {0}")]
    Transport(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Abstraction for object store operations, enabling mocking in tests
pub trait ObjectStore: Send + Sync {
    /// Create the bucket if it does not exist yet
    fn ensure_namespace(&self, bucket: &str) -> Result<(), StorageError>;

    /// Upload a local file to `key`
    fn put(&self, bucket: &str, key: &str, source: &Path) -> Result<(), StorageError>;

    /// Fetch a byte range of an object; the result may be shorter than asked
    fn get_range(&self, bucket: &str, key: &str, range: Range<u64>)
        -> Result<Vec<u8>, StorageError>;

    /// List all objects whose key starts with `prefix`
    fn list(&self, bucket: &str, prefix: &str) -> Result<Vec<StoredObject>, StorageError>;

    /// Delete a single object
    fn delete(&self, bucket: &str, key: &str) -> Result<(), StorageError>;

    /// Size of an object in bytes
    fn head(&self, bucket: &str, key: &str) -> Result<u64, StorageError>;
}

/// Mock implementation for testing
/// Available for use in external test crates
pub mod mock {
    use super::*;
    use std::collections::{BTreeMap, HashSet};
    use std::sync::{Arc, Mutex};

    /// Recorded store operation call
    #[derive(Clone, Debug, PartialEq, Eq)]
    pub enum StoreCall {
        EnsureNamespace { bucket: String },
        Put { bucket: String, key: String },
        GetRange { bucket: String, key: String, start: u64, end: u64 },
        List { bucket: String, prefix: String },
        Delete { bucket: String, key: String },
        Head { bucket: String, key: String },
    }

    /// In-memory object store
    #[derive(Clone, Default)]
    pub struct MockObjectStore {
        pub calls: Arc<Mutex<Vec<StoreCall>>>,
        objects: Arc<Mutex<BTreeMap<(String, String), Vec<u8>>>>,
        buckets: Arc<Mutex<HashSet<String>>>,
        failing_put_buckets: Arc<Mutex<HashSet<String>>>,
        failing_deletes: Arc<Mutex<HashSet<String>>>,
        corrupt_reads: Arc<Mutex<bool>>,
        failing_list: Arc<Mutex<bool>>,
    }

    impl MockObjectStore {
        pub fn new() -> Self {
            Self::default()
        }

        /// Pre-seed an object
        pub fn with_object(self, bucket: &str, key: &str, data: &[u8]) -> Self {
            self.buckets.lock().unwrap().insert(bucket.to_string());
            self.objects
                .lock()
                .unwrap()
                .insert((bucket.to_string(), key.to_string()), data.to_vec());
            self
        }

        /// Uploads into `bucket` fail
        pub fn with_failing_put(self, bucket: &str) -> Self {
            self.failing_put_buckets
                .lock()
                .unwrap()
                .insert(bucket.to_string());
            self
        }

        /// Deleting `key` fails
        pub fn with_failing_delete(self, key: &str) -> Self {
            self.failing_deletes.lock().unwrap().insert(key.to_string());
            self
        }

        /// Ranged reads return bytes that are not a valid dump header
        pub fn with_corrupt_reads(self) -> Self {
            *self.corrupt_reads.lock().unwrap() = true;
            self
        }

        /// Listing fails
        pub fn with_failing_list(self) -> Self {
            *self.failing_list.lock().unwrap() = true;
            self
        }

        pub fn get_calls(&self) -> Vec<StoreCall> {
            self.calls.lock().unwrap().clone()
        }

        pub fn contains(&self, bucket: &str, key: &str) -> bool {
            self.objects
                .lock()
                .unwrap()
                .contains_key(&(bucket.to_string(), key.to_string()))
        }

        pub fn has_bucket(&self, bucket: &str) -> bool {
            self.buckets.lock().unwrap().contains(bucket)
        }

        /// Keys stored in a bucket, sorted
        pub fn keys(&self, bucket: &str) -> Vec<String> {
            self.objects
                .lock()
                .unwrap()
                .keys()
                .filter(|(b, _)| b == bucket)
                .map(|(_, k)| k.clone())
                .collect()
        }

        pub fn put_count(&self) -> usize {
            self.calls
                .lock()
                .unwrap()
                .iter()
                .filter(|c| matches!(c, StoreCall::Put { .. }))
                .count()
        }

        pub fn deleted_keys(&self) -> Vec<String> {
            self.calls
                .lock()
                .unwrap()
                .iter()
                .filter_map(|c| match c {
                    StoreCall::Delete { key, .. } => Some(key.clone()),
                    _ => None,
                })
                .collect()
        }

        fn record_call(&self, call: StoreCall) {
            self.calls.lock().unwrap().push(call);
        }

        fn not_found(bucket: &str, key: &str) -> StorageError {
            StorageError::NotFound {
                bucket: bucket.to_string(),
                key: key.to_string(),
            }
        }
    }

    impl ObjectStore for MockObjectStore {
        fn ensure_namespace(&self, bucket: &str) -> Result<(), StorageError> {
            self.record_call(StoreCall::EnsureNamespace {
                bucket: bucket.to_string(),
            });
            self.buckets.lock().unwrap().insert(bucket.to_string());
            Ok(())
        }

        fn put(&self, bucket: &str, key: &str, source: &Path) -> Result<(), StorageError> {
            self.record_call(StoreCall::Put {
                bucket: bucket.to_string(),
                key: key.to_string(),
            });
            if self.failing_put_buckets.lock().unwrap().contains(bucket) {
                return Err(StorageError::Transport(format!(
                    "upload failed: Could not connect to the endpoint URL for bucket {}",
                    bucket
                )));
            }
            let data = std::fs::read(source)?;
            self.objects
                .lock()
                .unwrap()
                .insert((bucket.to_string(), key.to_string()), data);
            Ok(())
        }

        fn get_range(
            &self,
            bucket: &str,
            key: &str,
            range: Range<u64>,
        ) -> Result<Vec<u8>, StorageError> {
            self.record_call(StoreCall::GetRange {
                bucket: bucket.to_string(),
                key: key.to_string(),
                start: range.start,
                end: range.end,
            });
            let objects = self.objects.lock().unwrap();
            let data = objects
                .get(&(bucket.to_string(), key.to_string()))
                .ok_or_else(|| Self::not_found(bucket, key))?;

            if *self.corrupt_reads.lock().unwrap() {
                return Ok(b"<html><body>503 Service Unavailable</body></html>".to_vec());
            }

            let start = (range.start as usize).min(data.len());
            let end = (range.end as usize).min(data.len());
            Ok(data[start..end].to_vec())
        }

        fn list(&self, bucket: &str, prefix: &str) -> Result<Vec<StoredObject>, StorageError> {
            self.record_call(StoreCall::List {
                bucket: bucket.to_string(),
                prefix: prefix.to_string(),
            });
            if *self.failing_list.lock().unwrap() {
                return Err(StorageError::Transport("list failed".to_string()));
            }
            Ok(self
                .objects
                .lock()
                .unwrap()
                .iter()
                .filter(|((b, k), _)| b == bucket && k.starts_with(prefix))
                .map(|((b, k), v)| StoredObject {
                    bucket: b.clone(),
                    key: k.clone(),
                    byte_size: v.len() as u64,
                })
                .collect())
        }

        fn delete(&self, bucket: &str, key: &str) -> Result<(), StorageError> {
            self.record_call(StoreCall::Delete {
                bucket: bucket.to_string(),
                key: key.to_string(),
            });
            if self.failing_deletes.lock().unwrap().contains(key) {
                return Err(StorageError::PermissionDenied(format!(
                    "AccessDenied deleting {}",
                    key
                )));
            }
            self.objects
                .lock()
                .unwrap()
                .remove(&(bucket.to_string(), key.to_string()));
            Ok(())
        }

        fn head(&self, bucket: &str, key: &str) -> Result<u64, StorageError> {
            self.record_call(StoreCall::Head {
                bucket: bucket.to_string(),
                key: key.to_string(),
            });
            self.objects
                .lock()
                .unwrap()
                .get(&(bucket.to_string(), key.to_string()))
                .map(|v| v.len() as u64)
                .ok_or_else(|| Self::not_found(bucket, key))
        }
    }
}
