//! In-memory owner of loaded directory caches
//!
//! The manager keeps a bounded, least-recently-used map from directory to a
//! shared [`DirectoryCache`]. Each directory cache sits behind its own mutex,
//! which doubles as the write lock for that directory's document: workers
//! compute without it and take it only to update and save.

use std::collections::{HashMap, VecDeque};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use takeprint_cache::{
    cache_path, store, CacheResult, DirectoryFingerprintCache, FileSignature,
};

/// Lock a mutex, recovering the data if a previous holder panicked
pub fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

/// One directory's cache plus its persistence bookkeeping
#[derive(Debug)]
pub struct DirectoryCache {
    directory: PathBuf,
    cache: DirectoryFingerprintCache,
    /// Signature of the document when we last read or wrote it
    disk_signature: Option<FileSignature>,
    load_warning: Option<String>,
}

impl DirectoryCache {
    /// Load the directory's document, or start an empty shell
    pub fn open(directory: &Path) -> Self {
        let (cache, warning) = store::load_reporting(directory);
        Self {
            directory: directory.to_path_buf(),
            cache,
            disk_signature: document_signature(directory),
            load_warning: warning.map(|e| e.to_string()),
        }
    }

    pub fn directory(&self) -> &Path {
        &self.directory
    }

    pub fn cache(&self) -> &DirectoryFingerprintCache {
        &self.cache
    }

    /// Mutable access; call [`DirectoryCache::save`] afterwards
    pub fn cache_mut(&mut self) -> &mut DirectoryFingerprintCache {
        &mut self.cache
    }

    /// Persist the full document atomically
    pub fn save(&mut self) -> CacheResult<()> {
        store::save(&self.directory, &self.cache)?;
        self.disk_signature = document_signature(&self.directory);
        Ok(())
    }

    /// Warning from the last load, handed out once
    pub fn take_load_warning(&mut self) -> Option<String> {
        self.load_warning.take()
    }

    /// Reload and merge if someone else rewrote the document since we last
    /// touched it
    fn refresh_if_changed(&mut self) {
        let current = document_signature(&self.directory);
        if current.is_none() || current == self.disk_signature {
            return;
        }

        match store::try_load(&self.directory) {
            Ok(Some(disk)) => {
                log::debug!(
                    "Fingerprint cache for {} changed on disk, merging",
                    self.directory.display()
                );
                self.cache.merge_from_disk(disk);
            }
            Ok(None) => {}
            Err(e) => {
                log::warn!("Ignoring unusable fingerprint cache: {}", e);
                self.load_warning = Some(e.to_string());
            }
        }
        self.disk_signature = current;
    }
}

fn document_signature(directory: &Path) -> Option<FileSignature> {
    FileSignature::from_path(&cache_path(directory)).ok()
}

pub type SharedDirectoryCache = Arc<Mutex<DirectoryCache>>;

#[derive(Default)]
struct ManagerState {
    entries: HashMap<PathBuf, SharedDirectoryCache>,
    /// Front is most recently used
    recency: VecDeque<PathBuf>,
}

impl ManagerState {
    fn touch(&mut self, key: &Path) {
        if let Some(pos) = self.recency.iter().position(|p| p == key) {
            self.recency.remove(pos);
        }
        self.recency.push_front(key.to_path_buf());
    }

    /// Drop least recently used caches nobody else holds
    fn evict(&mut self, capacity: usize) {
        let mut idx = self.recency.len();
        while self.entries.len() > capacity && idx > 0 {
            idx -= 1;
            let key = &self.recency[idx];
            let in_use = self
                .entries
                .get(key)
                .map_or(false, |handle| Arc::strong_count(handle) > 1);
            if in_use {
                continue;
            }
            if let Some(key) = self.recency.remove(idx) {
                log::trace!("Evicting fingerprint cache for {}", key.display());
                self.entries.remove(&key);
            }
        }
    }
}

/// Bounded map of loaded directory caches
pub struct CacheManager {
    capacity: usize,
    state: Mutex<ManagerState>,
}

impl CacheManager {
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity: capacity.max(1),
            state: Mutex::new(ManagerState::default()),
        }
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Number of directories currently loaded
    pub fn len(&self) -> usize {
        lock(&self.state).entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Shared handle to a directory's cache, loading it on first access
    pub fn open(&self, directory: &Path) -> SharedDirectoryCache {
        let key = directory
            .canonicalize()
            .unwrap_or_else(|_| directory.to_path_buf());

        let (handle, fresh) = {
            let mut state = lock(&self.state);
            let existing = state.entries.get(&key).cloned();
            let (handle, fresh) = match existing {
                Some(handle) => (handle, false),
                None => {
                    let handle = Arc::new(Mutex::new(DirectoryCache::open(&key)));
                    state.entries.insert(key.clone(), Arc::clone(&handle));
                    (handle, true)
                }
            };
            state.touch(&key);
            state.evict(self.capacity);
            (handle, fresh)
        };

        if !fresh {
            lock(&handle).refresh_if_changed();
        }
        handle
    }

    /// Apply a mutation to a directory's cache and write it through
    pub fn update<T>(
        &self,
        directory: &Path,
        mutate: impl FnOnce(&mut DirectoryFingerprintCache) -> T,
    ) -> CacheResult<T> {
        let handle = self.open(directory);
        let mut dir_cache = lock(&handle);
        let out = mutate(dir_cache.cache_mut());
        dir_cache.save().map_err(|e| {
            log::warn!("Failed to persist fingerprint cache: {}", e);
            e
        })?;
        Ok(out)
    }

    fn read<T>(&self, directory: &Path, read: impl FnOnce(&DirectoryFingerprintCache) -> T) -> T {
        let handle = self.open(directory);
        let dir_cache = lock(&handle);
        read(dir_cache.cache())
    }

    pub fn is_reference_folder(&self, directory: &Path) -> bool {
        self.read(directory, |c| c.is_reference_folder)
    }

    /// Flip the reference flag; returns the new value
    pub fn toggle_reference_folder(&self, directory: &Path) -> CacheResult<bool> {
        self.update(directory, |c| c.toggle_reference_folder())
    }

    pub fn is_ignored(&self, directory: &Path) -> bool {
        self.read(directory, |c| c.is_ignored)
    }

    /// Flip the ignore flag; returns the new value
    pub fn toggle_ignore_fingerprints(&self, directory: &Path) -> CacheResult<bool> {
        self.update(directory, |c| c.toggle_ignore_fingerprints())
    }

    pub fn exclude_file(&self, directory: &Path, filename: &str) -> CacheResult<bool> {
        self.update(directory, |c| c.exclude_file(filename))
    }

    pub fn include_file(&self, directory: &Path, filename: &str) -> CacheResult<bool> {
        self.update(directory, |c| c.include_file(filename))
    }

    pub fn remove_entry(&self, directory: &Path, filename: &str) -> CacheResult<bool> {
        self.update(directory, |c| c.remove_entry(filename).is_some())
    }

    /// Follow a rename done by the host; the signature is still checked on
    /// next use
    pub fn rename_entry(&self, directory: &Path, old: &str, new: &str) -> CacheResult<bool> {
        self.update(directory, |c| c.rename_entry(old, new))
    }

    /// Drop entries whose file no longer exists; returns how many went away
    pub fn prune_missing(&self, directory: &Path) -> CacheResult<usize> {
        let root = directory.to_path_buf();
        self.update(directory, move |c| {
            let before = c.files.len();
            c.files.retain(|name, _| root.join(name).is_file());
            before - c.files.len()
        })
    }

    /// Tear down every loaded cache
    pub fn clear(&self) {
        let mut state = lock(&self.state);
        state.entries.clear();
        state.recency.clear();
    }
}

impl std::fmt::Debug for CacheManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CacheManager")
            .field("capacity", &self.capacity)
            .field("loaded", &self.len())
            .finish()
    }
}
