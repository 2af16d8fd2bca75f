//! Directory cache document structures
//!
//! One document per directory, stored as JSON:
//!
//! ```json
//! {
//!   "version": 1,
//!   "files": { "take1.wav": { "signature": [1234, 1700000000.5], "fingerprints": { "spectral": [..] } } },
//!   "excluded_files": ["scratch.wav"],
//!   "is_reference_folder": false,
//!   "ignore_fingerprints": false
//! }
//! ```

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::{BTreeMap, BTreeSet};
use std::io;
use std::path::Path;
use std::time::UNIX_EPOCH;

/// Name of the cache document inside its owning directory
pub const CACHE_FILE_NAME: &str = ".takeprint_fingerprints.json";

/// Current schema version
pub const CACHE_VERSION: u32 = 1;

/// Fingerprint vector as stored in the cache
pub type FingerprintVector = Vec<f32>;

/// Cheap content-change proxy: (byte size, modification time in seconds)
///
/// Serialized as a two-element array `[size, mtime]`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(from = "(u64, f64)", into = "(u64, f64)")]
pub struct FileSignature {
    pub size: u64,
    pub mtime: f64,
}

impl FileSignature {
    pub fn new(size: u64, mtime: f64) -> Self {
        Self { size, mtime }
    }

    /// Read the current signature of a file from the filesystem
    pub fn from_path(path: &Path) -> io::Result<Self> {
        let metadata = std::fs::metadata(path)?;
        let modified = metadata.modified()?;
        let mtime = match modified.duration_since(UNIX_EPOCH) {
            Ok(d) => d.as_secs_f64(),
            Err(e) => -e.duration().as_secs_f64(),
        };
        Ok(Self::new(metadata.len(), mtime))
    }
}

impl From<(u64, f64)> for FileSignature {
    fn from((size, mtime): (u64, f64)) -> Self {
        Self { size, mtime }
    }
}

impl From<FileSignature> for (u64, f64) {
    fn from(sig: FileSignature) -> Self {
        (sig.size, sig.mtime)
    }
}

/// Cached fingerprints for one file
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FileCacheEntry {
    pub signature: FileSignature,
    #[serde(default)]
    pub fingerprints: BTreeMap<String, FingerprintVector>,
}

impl FileCacheEntry {
    pub fn new(signature: FileSignature, fingerprints: BTreeMap<String, FingerprintVector>) -> Self {
        Self {
            signature,
            fingerprints,
        }
    }

    /// Vector for one algorithm, if present and non-empty
    pub fn fingerprint(&self, algorithm: &str) -> Option<&[f32]> {
        self.fingerprints
            .get(algorithm)
            .filter(|v| !v.is_empty())
            .map(|v| v.as_slice())
    }

    /// True if the entry was computed from a file with this signature and
    /// carries a slot for every requested algorithm
    pub fn is_valid_for(&self, signature: &FileSignature, algorithms: &[&str]) -> bool {
        self.signature == *signature
            && algorithms
                .iter()
                .all(|name| self.fingerprints.contains_key(*name))
    }
}

/// Per-directory fingerprint cache
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DirectoryFingerprintCache {
    #[serde(default = "current_version")]
    pub version: u32,
    /// Keyed by file name relative to the owning directory
    #[serde(default)]
    pub files: BTreeMap<String, FileCacheEntry>,
    #[serde(default)]
    pub excluded_files: BTreeSet<String>,
    #[serde(default)]
    pub is_reference_folder: bool,
    #[serde(default, rename = "ignore_fingerprints")]
    pub is_ignored: bool,
    /// Top-level keys this version does not know about, kept for rewrite
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

fn current_version() -> u32 {
    CACHE_VERSION
}

impl Default for DirectoryFingerprintCache {
    fn default() -> Self {
        Self::new()
    }
}

impl DirectoryFingerprintCache {
    /// Empty cache shell
    pub fn new() -> Self {
        Self {
            version: CACHE_VERSION,
            files: BTreeMap::new(),
            excluded_files: BTreeSet::new(),
            is_reference_folder: false,
            is_ignored: false,
            extra: Map::new(),
        }
    }

    pub fn get_entry(&self, filename: &str) -> Option<&FileCacheEntry> {
        self.files.get(filename)
    }

    /// Insert or replace one entry; nothing else in the document changes
    pub fn set_entry(&mut self, filename: impl Into<String>, entry: FileCacheEntry) {
        self.files.insert(filename.into(), entry);
    }

    pub fn remove_entry(&mut self, filename: &str) -> Option<FileCacheEntry> {
        self.files.remove(filename)
    }

    /// Move an entry to a new name. Returns false if `old` had no entry.
    pub fn rename_entry(&mut self, old: &str, new: impl Into<String>) -> bool {
        let new = new.into();
        match self.files.remove(old) {
            Some(entry) => {
                if self.excluded_files.remove(old) {
                    self.excluded_files.insert(new.clone());
                }
                self.files.insert(new, entry);
                true
            }
            None => false,
        }
    }

    pub fn is_excluded(&self, filename: &str) -> bool {
        self.excluded_files.contains(filename)
    }

    /// Returns true if the set changed
    pub fn exclude_file(&mut self, filename: impl Into<String>) -> bool {
        self.excluded_files.insert(filename.into())
    }

    /// Returns true if the set changed
    pub fn include_file(&mut self, filename: &str) -> bool {
        self.excluded_files.remove(filename)
    }

    /// Flip the reference flag and return the new value
    pub fn toggle_reference_folder(&mut self) -> bool {
        self.is_reference_folder = !self.is_reference_folder;
        self.is_reference_folder
    }

    /// Flip the ignore flag and return the new value
    pub fn toggle_ignore_fingerprints(&mut self) -> bool {
        self.is_ignored = !self.is_ignored;
        self.is_ignored
    }

    /// Bring the version up to the current schema without ever lowering it
    pub fn upgrade_version(&mut self) {
        self.version = self.version.max(CACHE_VERSION);
    }

    /// Fold a freshly loaded on-disk copy into this in-memory cache.
    ///
    /// Disk wins for flags, exclusions, unknown keys and any entry it holds;
    /// entries only present in memory are kept.
    pub fn merge_from_disk(&mut self, disk: DirectoryFingerprintCache) {
        self.version = self.version.max(disk.version);
        self.is_reference_folder = disk.is_reference_folder;
        self.is_ignored = disk.is_ignored;
        self.excluded_files = disk.excluded_files;
        self.extra = disk.extra;
        for (name, entry) in disk.files {
            self.files.insert(name, entry);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn entry(size: u64) -> FileCacheEntry {
        let mut fps = BTreeMap::new();
        fps.insert("spectral".to_string(), vec![0.5, 0.25]);
        FileCacheEntry::new(FileSignature::new(size, 1_700_000_000.25), fps)
    }

    #[test]
    fn test_signature_serializes_as_pair() {
        let json = serde_json::to_string(&FileSignature::new(42, 1.5)).unwrap();
        assert_eq!(json, "[42,1.5]");
        let back: FileSignature = serde_json::from_str("[42, 1.5]").unwrap();
        assert_eq!(back, FileSignature::new(42, 1.5));
    }

    #[test]
    fn test_ignore_flag_uses_document_key() {
        let mut cache = DirectoryFingerprintCache::new();
        cache.is_ignored = true;
        let value = serde_json::to_value(&cache).unwrap();
        assert_eq!(value["ignore_fingerprints"], Value::Bool(true));
        assert!(value.get("is_ignored").is_none());
    }

    #[test]
    fn test_set_entry_leaves_other_state_alone() {
        let mut cache = DirectoryFingerprintCache::new();
        cache.set_entry("a.wav", entry(1));
        cache.exclude_file("junk.wav");
        cache.is_reference_folder = true;

        cache.set_entry("b.wav", entry(2));
        cache.set_entry("a.wav", entry(3));

        assert_eq!(cache.files.len(), 2);
        assert_eq!(cache.get_entry("a.wav").unwrap().signature.size, 3);
        assert_eq!(cache.get_entry("b.wav").unwrap().signature.size, 2);
        assert!(cache.is_excluded("junk.wav"));
        assert!(cache.is_reference_folder);
    }

    #[test]
    fn test_toggles_are_involutions() {
        let mut cache = DirectoryFingerprintCache::new();
        assert!(cache.toggle_reference_folder());
        assert!(!cache.toggle_reference_folder());
        assert!(cache.toggle_ignore_fingerprints());
        assert!(!cache.toggle_ignore_fingerprints());
        assert!(!cache.is_reference_folder);
        assert!(!cache.is_ignored);
    }

    #[test]
    fn test_flags_are_independent() {
        let mut cache = DirectoryFingerprintCache::new();
        cache.toggle_reference_folder();
        cache.toggle_ignore_fingerprints();
        assert!(cache.is_reference_folder && cache.is_ignored);
        cache.toggle_reference_folder();
        assert!(!cache.is_reference_folder && cache.is_ignored);
    }

    #[test]
    fn test_entry_validity() {
        let e = entry(10);
        let sig = e.signature;
        assert!(e.is_valid_for(&sig, &["spectral"]));
        assert!(!e.is_valid_for(&sig, &["spectral", "chroma"]));
        assert!(!e.is_valid_for(&FileSignature::new(11, sig.mtime), &["spectral"]));
        assert!(!e.is_valid_for(&FileSignature::new(10, sig.mtime + 1.0), &["spectral"]));
    }

    #[test]
    fn test_empty_vector_is_not_a_fingerprint() {
        let mut e = entry(1);
        e.fingerprints.insert("chroma".to_string(), Vec::new());
        assert!(e.fingerprint("chroma").is_none());
        assert_eq!(e.fingerprint("spectral"), Some(&[0.5, 0.25][..]));
    }

    #[test]
    fn test_rename_entry_carries_exclusion() {
        let mut cache = DirectoryFingerprintCache::new();
        cache.set_entry("old.wav", entry(1));
        cache.exclude_file("old.wav");
        assert!(cache.rename_entry("old.wav", "new.wav"));
        assert!(cache.get_entry("old.wav").is_none());
        assert!(cache.get_entry("new.wav").is_some());
        assert!(cache.is_excluded("new.wav"));
        assert!(!cache.rename_entry("missing.wav", "x.wav"));
    }

    #[test]
    fn test_version_never_decreases() {
        let mut cache = DirectoryFingerprintCache::new();
        cache.version = 0;
        cache.upgrade_version();
        assert_eq!(cache.version, CACHE_VERSION);
        cache.version = CACHE_VERSION + 3;
        cache.upgrade_version();
        assert_eq!(cache.version, CACHE_VERSION + 3);
    }

    #[test]
    fn test_merge_from_disk() {
        let mut memory = DirectoryFingerprintCache::new();
        memory.set_entry("session.wav", entry(1));
        memory.set_entry("shared.wav", entry(2));

        let mut disk = DirectoryFingerprintCache::new();
        disk.set_entry("shared.wav", entry(5));
        disk.set_entry("other.wav", entry(6));
        disk.is_reference_folder = true;
        disk.extra.insert("custom_future_field".to_string(), Value::from(42));

        memory.merge_from_disk(disk);
        assert_eq!(memory.files.len(), 3);
        assert_eq!(memory.get_entry("shared.wav").unwrap().signature.size, 5);
        assert!(memory.is_reference_folder);
        assert_eq!(memory.extra["custom_future_field"], Value::from(42));
    }
}
