//! Gzip helpers for dump artifacts

use anyhow::{Context, Result};
use flate2::read::GzDecoder;
use flate2::write::GzEncoder;
use flate2::Compression;
use std::fs::{self, File, OpenOptions};
use std::io::{self, BufReader, BufWriter, Read, Write};
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

/// Create a new file readable and writable by the owner only
pub fn create_private_file(path: &Path) -> io::Result<File> {
    let mut options = OpenOptions::new();
    options.write(true).create_new(true);

    #[cfg(unix)]
    {
        use std::os::unix::fs::OpenOptionsExt;
        options.mode(0o600);
    }

    options.open(path)
}

/// Compress `path` to `<path>.gz`, removing the original.
///
/// On error neither the original nor a partial `.gz` is left behind.
pub fn gzip_in_place(path: &Path) -> Result<PathBuf> {
    let mut target = path.as_os_str().to_owned();
    target.push(".gz");
    let target = PathBuf::from(target);

    let result = gzip_to(path, &target);

    if let Err(ref e) = result {
        warn!("Compression of {:?} failed: {}", path, e);
        remove_if_exists(&target);
    }
    remove_if_exists(path);

    result.map(|_| target)
}

fn gzip_to(source: &Path, target: &Path) -> Result<()> {
    let input = File::open(source).context(format!("Failed to open {:?}", source))?;
    let output = create_private_file(target).context(format!("Failed to create {:?}", target))?;

    let mut reader = BufReader::new(input);
    let mut encoder = GzEncoder::new(BufWriter::new(output), Compression::best());
    io::copy(&mut reader, &mut encoder).context("Failed to compress dump")?;

    let mut writer = encoder.finish().context("Failed to finish gzip stream")?;
    writer.flush().context("Failed to flush compressed dump")?;

    debug!("Compressed {:?} -> {:?}", source, target);
    Ok(())
}

fn remove_if_exists(path: &Path) {
    if let Err(e) = fs::remove_file(path) {
        if e.kind() != io::ErrorKind::NotFound {
            warn!("Failed to remove {:?}: {}", path, e);
        }
    }
}

/// Decode as much of a (possibly truncated) gzip stream as available, up to
/// `limit` bytes of output.
pub fn gunzip_prefix(data: &[u8], limit: usize) -> Vec<u8> {
    let mut decoder = GzDecoder::new(data);
    let mut out = Vec::new();
    let mut buf = [0u8; 4096];

    while out.len() < limit {
        match decoder.read(&mut buf) {
            Ok(0) => break,
            Ok(n) => out.extend_from_slice(&buf[..n]),
            // Truncated input ends the stream early
            Err(_) => break,
        }
    }

    out.truncate(limit);
    out
}
