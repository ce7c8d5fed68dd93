//! File-based locking to prevent overlapping runs

use anyhow::{bail, Context, Result};
use fd_lock::RwLock;
use std::fs::OpenOptions;
use std::io;
use std::path::{Path, PathBuf};
use tracing::{debug, info};

/// Name of the lock file inside the work directory
pub const LOCK_FILE_NAME: &str = ".dump-manager.lock";

/// Lock file path for a work directory
pub fn lock_path(work_dir: &Path) -> PathBuf {
    work_dir.join(LOCK_FILE_NAME)
}

/// Run `f` while holding an exclusive lock on `lock_path`.
///
/// Fails without calling `f` if another run holds the lock. The lock is
/// released when `f` returns, including on panic.
pub fn with_run_lock<T>(lock_path: &Path, f: impl FnOnce() -> T) -> Result<T> {
    debug!("Attempting to acquire lock: {:?}", lock_path);

    if let Some(parent) = lock_path.parent() {
        std::fs::create_dir_all(parent).context("Failed to create lock directory")?;
    }

    let file = OpenOptions::new()
        .read(true)
        .write(true)
        .create(true)
        .truncate(false)
        .open(lock_path)
        .context(format!("Failed to open lock file: {:?}", lock_path))?;

    let mut lock = RwLock::new(file);
    let guard = match lock.try_write() {
        Ok(guard) => guard,
        Err(e) if e.kind() == io::ErrorKind::WouldBlock => {
            bail!("Another run is in progress (lock held: {:?})", lock_path)
        }
        Err(e) => {
            return Err(e).context(format!("Failed to lock {:?}", lock_path));
        }
    };

    info!("Acquired run lock: {:?}", lock_path);
    let result = f();
    drop(guard);
    info!("Released run lock: {:?}", lock_path);

    Ok(result)
}
