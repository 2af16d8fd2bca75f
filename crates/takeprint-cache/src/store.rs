//! Load and save the cache document
//!
//! Saves go through a temp file in the same directory followed by a rename,
//! so a crash mid-write leaves either the old or the new document on disk.

use crate::error::{CacheError, CacheResult};
use crate::format::{DirectoryFingerprintCache, CACHE_FILE_NAME};
use serde_json::Value;
use std::io::{ErrorKind, Write};
use std::path::{Path, PathBuf};

/// Location of the cache document for a directory
pub fn cache_path(directory: &Path) -> PathBuf {
    directory.join(CACHE_FILE_NAME)
}

/// Read the persisted cache.
///
/// `Ok(None)` when the directory has no cache document yet.
pub fn try_load(directory: &Path) -> CacheResult<Option<DirectoryFingerprintCache>> {
    let path = cache_path(directory);

    let json_str = match std::fs::read_to_string(&path) {
        Ok(s) => s,
        Err(e) if e.kind() == ErrorKind::NotFound => return Ok(None),
        Err(source) => return Err(CacheError::Io { path, source }),
    };

    let root: Value = serde_json::from_str(&json_str).map_err(|source| CacheError::Json {
        path: path.clone(),
        source,
    })?;

    if !root.is_object() {
        return Err(CacheError::Shape {
            path,
            reason: "root is not an object".to_string(),
        });
    }

    let mut cache: DirectoryFingerprintCache =
        serde_json::from_value(root).map_err(|e| CacheError::Shape {
            path: path.clone(),
            reason: e.to_string(),
        })?;
    cache.upgrade_version();

    log::debug!(
        "Loaded fingerprint cache {} ({} files, version {})",
        path.display(),
        cache.files.len(),
        cache.version
    );

    Ok(Some(cache))
}

/// Load the cache, falling back to an empty one.
///
/// A missing document is not an error. A corrupt one is logged and returned
/// alongside the fresh cache so the caller can surface it.
pub fn load_reporting(directory: &Path) -> (DirectoryFingerprintCache, Option<CacheError>) {
    match try_load(directory) {
        Ok(Some(cache)) => (cache, None),
        Ok(None) => (DirectoryFingerprintCache::new(), None),
        Err(e) => {
            log::warn!("Ignoring unusable fingerprint cache: {}", e);
            (DirectoryFingerprintCache::new(), Some(e))
        }
    }
}

/// Load the cache, falling back to an empty one. Never fails.
pub fn load(directory: &Path) -> DirectoryFingerprintCache {
    load_reporting(directory).0
}

/// Write the full cache atomically
pub fn save(directory: &Path, cache: &DirectoryFingerprintCache) -> CacheResult<()> {
    let path = cache_path(directory);

    let json_str = serde_json::to_string_pretty(cache).map_err(|source| CacheError::Json {
        path: path.clone(),
        source,
    })?;

    let io_err = |source: std::io::Error| CacheError::Io {
        path: path.clone(),
        source,
    };

    let mut tmp = tempfile::Builder::new()
        .prefix(".takeprint_")
        .suffix(".tmp")
        .tempfile_in(directory)
        .map_err(io_err)?;
    tmp.write_all(json_str.as_bytes()).map_err(io_err)?;
    tmp.as_file().sync_all().map_err(io_err)?;

    tmp.persist(&path).map_err(|e| CacheError::Persist {
        path: path.clone(),
        source: e.error,
    })?;

    log::debug!(
        "Saved fingerprint cache {} ({} files)",
        path.display(),
        cache.files.len()
    );

    Ok(())
}
