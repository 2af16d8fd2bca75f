//! Batch fingerprinting and matching over per-directory caches
//!
//! [`FingerprintEngine`] is the single entry point a host talks to. It keeps
//! every file's fingerprints up to date in its directory's cache document,
//! fanning cache misses out to a dedicated worker pool, and answers pairwise
//! similarity queries from the cached vectors.

mod observer;
mod pool;
mod task;

#[cfg(test)]
mod tests;

pub use observer::{BatchObserver, ChannelObserver, EngineEvent, LogObserver, NoopObserver};
pub use pool::WorkerPool;
pub use task::TaskHandle;

use crate::algorithms::{compute_all, Algorithm};
use crate::audio::AudioDecoder;
use crate::cache_manager::{lock, CacheManager, SharedDirectoryCache};
use crate::compare::{compare, meets_threshold};
use crate::config::{EngineConfig, FingerprintConfig};
use crate::preprocess::prepare;
use anyhow::Result;
use rayon::prelude::*;
use serde::Serialize;
use std::collections::{BTreeMap, HashSet};
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Instant;
use takeprint_cache::{FileCacheEntry, FileSignature};
use task::TaskTracker;

/// Final state of one file in a batch
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "status", content = "message", rename_all = "lowercase")]
pub enum FileStatus {
    /// Valid fingerprints were already cached
    Cached,
    /// Fingerprints were computed in this batch
    Computed,
    /// Directory ignored or file excluded
    Excluded,
    /// Batch was cancelled before the file was dispatched
    Cancelled,
    Error(String),
}

impl FileStatus {
    pub fn is_error(&self) -> bool {
        matches!(self, FileStatus::Error(_))
    }

    /// Fingerprints are available for this file
    pub fn has_fingerprints(&self) -> bool {
        matches!(self, FileStatus::Cached | FileStatus::Computed)
    }
}

/// Outcome of an `ensure_fingerprints` batch
#[derive(Debug, Clone, Default, Serialize)]
pub struct BatchReport {
    pub statuses: BTreeMap<PathBuf, FileStatus>,
    pub warnings: Vec<String>,
    /// At least one file was skipped because of a cancel
    pub cancelled: bool,
    pub elapsed_secs: f64,
}

impl BatchReport {
    /// Status of a path as given by the caller
    pub fn status_of(&self, path: &Path) -> Option<&FileStatus> {
        self.statuses.get(&canonical(path))
    }

    pub fn count(&self, predicate: impl Fn(&FileStatus) -> bool) -> usize {
        self.statuses.values().filter(|s| predicate(s)).count()
    }

    pub fn cached(&self) -> usize {
        self.count(|s| *s == FileStatus::Cached)
    }

    pub fn computed(&self) -> usize {
        self.count(|s| *s == FileStatus::Computed)
    }

    pub fn excluded(&self) -> usize {
        self.count(|s| *s == FileStatus::Excluded)
    }

    pub fn cancelled_files(&self) -> usize {
        self.count(|s| *s == FileStatus::Cancelled)
    }

    pub fn errors(&self) -> usize {
        self.count(FileStatus::is_error)
    }

    /// Every file reached a terminal state other than cancelled
    pub fn is_complete(&self) -> bool {
        self.cancelled_files() == 0
    }
}

/// A pair of files whose fingerprints met the threshold
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MatchResult {
    pub file_a: PathBuf,
    pub file_b: PathBuf,
    pub algorithm: Algorithm,
    pub similarity: f32,
    pub a_is_reference: bool,
    pub b_is_reference: bool,
}

/// File awaiting computation
struct Job {
    path: PathBuf,
    filename: String,
    signature: FileSignature,
    cache: SharedDirectoryCache,
}

/// File with a usable vector for a match query
struct Candidate {
    path: PathBuf,
    is_reference: bool,
    vector: Vec<f32>,
}

struct EngineInner {
    config: FingerprintConfig,
    caches: Arc<CacheManager>,
    decoder: Arc<dyn AudioDecoder>,
    pool: WorkerPool,
    tasks: Arc<TaskTracker>,
}

/// Facade over decoding, fingerprinting, caching and matching.
///
/// Dropping the engine cancels background tasks and blocks until they and
/// the worker threads have exited.
pub struct FingerprintEngine {
    inner: Arc<EngineInner>,
}

impl FingerprintEngine {
    /// Build an engine with its own cache manager
    pub fn new(config: &EngineConfig, decoder: Arc<dyn AudioDecoder>) -> Result<Self> {
        let caches = Arc::new(CacheManager::new(config.engine.cache_capacity));
        Self::with_cache_manager(config, decoder, caches)
    }

    /// Build an engine sharing a host-owned cache manager
    pub fn with_cache_manager(
        config: &EngineConfig,
        decoder: Arc<dyn AudioDecoder>,
        caches: Arc<CacheManager>,
    ) -> Result<Self> {
        config.validate()?;
        let pool = WorkerPool::new(config.engine.workers)?;

        Ok(Self {
            inner: Arc::new(EngineInner {
                config: config.fingerprint.clone(),
                caches,
                decoder,
                pool,
                tasks: Arc::new(TaskTracker::default()),
            }),
        })
    }

    pub fn cache_manager(&self) -> &Arc<CacheManager> {
        &self.inner.caches
    }

    pub fn workers(&self) -> usize {
        self.inner.pool.size()
    }

    /// Background tasks still running
    pub fn active_tasks(&self) -> usize {
        self.inner.tasks.active()
    }

    /// Make sure every file has valid cached fingerprints. Blocks until the
    /// batch is done.
    pub fn ensure_fingerprints(&self, files: &[PathBuf], observer: &dyn BatchObserver) -> BatchReport {
        let cancel = AtomicBool::new(false);
        self.inner.ensure(files, observer, &cancel)
    }

    /// Like [`ensure_fingerprints`](Self::ensure_fingerprints), stopping
    /// before the next file once `cancel` is set
    pub fn ensure_fingerprints_cancellable(
        &self,
        files: &[PathBuf],
        observer: &dyn BatchObserver,
        cancel: &AtomicBool,
    ) -> BatchReport {
        self.inner.ensure(files, observer, cancel)
    }

    /// Run `ensure_fingerprints` in the background
    pub fn spawn_ensure(
        &self,
        files: Vec<PathBuf>,
        observer: Arc<dyn BatchObserver>,
    ) -> Result<TaskHandle<BatchReport>> {
        let inner = Arc::clone(&self.inner);
        self.inner.tasks.spawn("takeprint-ensure", move |cancel| {
            inner.ensure(&files, observer.as_ref(), cancel)
        })
    }

    /// Pairs of files whose `algorithm` vectors meet `threshold`, best first
    pub fn find_matches(&self, files: &[PathBuf], algorithm: Algorithm, threshold: f32) -> Vec<MatchResult> {
        let cancel = AtomicBool::new(false);
        self.inner.find_matches(files, algorithm, threshold, &cancel)
    }

    /// Run `find_matches` in the background; results also go to
    /// `observer.on_match_results`
    pub fn spawn_find_matches(
        &self,
        files: Vec<PathBuf>,
        algorithm: Algorithm,
        threshold: f32,
        observer: Arc<dyn BatchObserver>,
    ) -> Result<TaskHandle<Vec<MatchResult>>> {
        let inner = Arc::clone(&self.inner);
        self.inner.tasks.spawn("takeprint-match", move |cancel| {
            let results = inner.find_matches(&files, algorithm, threshold, cancel);
            observer.on_match_results(&results);
            results
        })
    }

    /// Cached vector for a file, if present and still valid
    pub fn fingerprint_of(&self, path: &Path, algorithm: Algorithm) -> Option<Vec<f32>> {
        let path = canonical(path);
        let (directory, filename) = split_path(&path)?;
        let signature = FileSignature::from_path(&path).ok()?;

        let handle = self.inner.caches.open(&directory);
        let dir_cache = lock(&handle);
        let entry = dir_cache.cache().get_entry(&filename)?;
        if entry.signature != signature {
            return None;
        }
        entry.fingerprint(algorithm.name()).map(<[f32]>::to_vec)
    }

    pub fn is_reference_folder(&self, directory: &Path) -> bool {
        self.inner.caches.is_reference_folder(directory)
    }

    /// Cancel every background task and wait for them to finish
    pub fn shutdown(&self) {
        self.inner.tasks.cancel_all();
        self.inner.tasks.join_all();
    }
}

impl Drop for FingerprintEngine {
    fn drop(&mut self) {
        self.shutdown();
        log::debug!("Fingerprint engine stopped");
    }
}

impl EngineInner {
    fn ensure(&self, files: &[PathBuf], observer: &dyn BatchObserver, cancel: &AtomicBool) -> BatchReport {
        let started = Instant::now();
        let files = unique_paths(files);
        let total = files.len();
        let processed = AtomicUsize::new(0);
        let warnings = Mutex::new(Vec::new());

        log::info!("Ensuring fingerprints for {} files", total);

        let mut report = BatchReport::default();
        let mut finish = |path: PathBuf, status: FileStatus| {
            if let FileStatus::Error(message) = &status {
                log::debug!("{}: {}", path.display(), message);
                observer.on_file_error(&path, message);
            }
            let done = processed.fetch_add(1, Ordering::SeqCst) + 1;
            observer.on_progress(done, total);
            report.statuses.insert(path, status);
        };

        // Sort out cache hits and skips one directory at a time
        let (groups, invalid) = group_by_directory(files);
        for path in invalid {
            finish(path, FileStatus::Error("Not a file path".to_string()));
        }

        let mut jobs = Vec::new();
        for (directory, members) in groups {
            let handle = self.caches.open(&directory);
            let mut dir_cache = lock(&handle);

            if let Some(warning) = dir_cache.take_load_warning() {
                observer.on_warning(&warning);
                lock(&warnings).push(warning);
            }

            let ignored = dir_cache.cache().is_ignored;
            for (path, filename) in members {
                if ignored || dir_cache.cache().is_excluded(&filename) {
                    finish(path, FileStatus::Excluded);
                    continue;
                }

                let signature = match FileSignature::from_path(&path) {
                    Ok(signature) => signature,
                    Err(e) => {
                        finish(path, FileStatus::Error(format!("Cannot read file: {}", e)));
                        continue;
                    }
                };

                let valid = dir_cache
                    .cache()
                    .get_entry(&filename)
                    .map_or(false, |entry| entry.is_valid_for(&signature, &Algorithm::all_names()));
                if valid {
                    log::debug!("Cache hit: {}", path.display());
                    finish(path, FileStatus::Cached);
                } else {
                    jobs.push(Job {
                        path,
                        filename,
                        signature,
                        cache: Arc::clone(&handle),
                    });
                }
            }
        }
        drop(finish);

        log::debug!("{} of {} files need computing", jobs.len(), total);

        let outcomes: Vec<(PathBuf, FileStatus)> = self.pool.install(|| {
            jobs.into_par_iter()
                .map(|job| {
                    if cancel.load(Ordering::SeqCst) {
                        return (job.path, FileStatus::Cancelled);
                    }

                    let status = self.compute_job(&job, observer, &warnings);
                    if let FileStatus::Error(message) = &status {
                        log::debug!("{}: {}", job.path.display(), message);
                        observer.on_file_error(&job.path, message);
                    }
                    let done = processed.fetch_add(1, Ordering::SeqCst) + 1;
                    observer.on_progress(done, total);
                    (job.path, status)
                })
                .collect()
        });
        report.statuses.extend(outcomes);

        report.warnings = warnings.into_inner().unwrap_or_else(|e| e.into_inner());
        // A cancel that lands after the last job has started skips nothing
        report.cancelled = report.cancelled_files() > 0;
        report.elapsed_secs = started.elapsed().as_secs_f64();

        log::info!(
            "Fingerprint batch done in {:.2}s: {} cached, {} computed, {} excluded, {} cancelled, {} failed",
            report.elapsed_secs,
            report.cached(),
            report.computed(),
            report.excluded(),
            report.cancelled_files(),
            report.errors()
        );

        observer.on_finished(&report);
        report
    }

    /// Decode, fingerprint and write through one file
    fn compute_job(&self, job: &Job, observer: &dyn BatchObserver, warnings: &Mutex<Vec<String>>) -> FileStatus {
        let decoded = catch_unwind(AssertUnwindSafe(|| self.decoder.decode(&job.path)));
        let audio = match decoded {
            Ok(Ok(audio)) => audio,
            Ok(Err(e)) => return FileStatus::Error(format!("Decode failed: {:#}", e)),
            Err(_) => return FileStatus::Error("Decoder panicked".to_string()),
        };

        let signal = prepare(&audio);
        if signal.is_empty() {
            return FileStatus::Error("No audio samples decoded".to_string());
        }

        let fingerprints = compute_all(&signal.samples, signal.sample_rate, &self.config);
        let entry = FileCacheEntry::new(job.signature, fingerprints);

        // Per-directory write lock: only one writer touches the document
        let mut dir_cache = lock(&job.cache);
        dir_cache.cache_mut().set_entry(job.filename.clone(), entry);
        if let Err(e) = dir_cache.save() {
            let warning = format!("Could not save fingerprint cache: {}", e);
            log::warn!("{}", warning);
            observer.on_warning(&warning);
            lock(warnings).push(warning);
        }

        log::trace!(
            "Fingerprinted {} ({:.1}s of audio)",
            job.path.display(),
            signal.duration_secs()
        );
        FileStatus::Computed
    }

    fn find_matches(
        &self,
        files: &[PathBuf],
        algorithm: Algorithm,
        threshold: f32,
        cancel: &AtomicBool,
    ) -> Vec<MatchResult> {
        let candidates = self.match_candidates(files, algorithm);
        let n = candidates.len();
        let pairs = &candidates;

        let mut results: Vec<MatchResult> = self.pool.install(|| {
            (0..n)
                .into_par_iter()
                .flat_map_iter(move |i| {
                    let stop = cancel.load(Ordering::SeqCst);
                    let a = &pairs[i];
                    pairs[i + 1..]
                        .iter()
                        .filter(move |_| !stop)
                        .filter_map(move |b| {
                            let similarity = compare(&a.vector, &b.vector);
                            meets_threshold(similarity, threshold).then(|| MatchResult {
                                file_a: a.path.clone(),
                                file_b: b.path.clone(),
                                algorithm,
                                similarity,
                                a_is_reference: a.is_reference,
                                b_is_reference: b.is_reference,
                            })
                        })
                })
                .collect()
        });

        results.sort_by(|x, y| {
            y.similarity
                .total_cmp(&x.similarity)
                .then_with(|| x.file_a.cmp(&y.file_a))
                .then_with(|| x.file_b.cmp(&y.file_b))
        });

        log::info!(
            "{} matches among {} files ({}, threshold {})",
            results.len(),
            n,
            algorithm,
            threshold
        );
        results
    }

    /// Files with a valid, non-empty vector for `algorithm`
    fn match_candidates(&self, files: &[PathBuf], algorithm: Algorithm) -> Vec<Candidate> {
        let (groups, _) = group_by_directory(unique_paths(files));
        let mut candidates = Vec::new();

        for (directory, members) in groups {
            let handle = self.caches.open(&directory);
            let dir_cache = lock(&handle);
            let cache = dir_cache.cache();
            if cache.is_ignored {
                continue;
            }

            for (path, filename) in members {
                if cache.is_excluded(&filename) {
                    continue;
                }
                let Some(entry) = cache.get_entry(&filename) else {
                    log::debug!("No fingerprints for {}", path.display());
                    continue;
                };
                let current = FileSignature::from_path(&path).ok();
                if current != Some(entry.signature) {
                    log::debug!("Stale fingerprints for {}", path.display());
                    continue;
                }
                if let Some(vector) = entry.fingerprint(algorithm.name()) {
                    candidates.push(Candidate {
                        path,
                        is_reference: cache.is_reference_folder,
                        vector: vector.to_vec(),
                    });
                }
            }
        }

        candidates
    }
}

fn canonical(path: &Path) -> PathBuf {
    path.canonicalize().unwrap_or_else(|_| path.to_path_buf())
}

/// Canonicalise and drop repeats, keeping first-seen order
fn unique_paths(files: &[PathBuf]) -> Vec<PathBuf> {
    let mut seen = HashSet::new();
    files
        .iter()
        .map(|p| canonical(p))
        .filter(|p| seen.insert(p.clone()))
        .collect()
}

fn split_path(path: &Path) -> Option<(PathBuf, String)> {
    let filename = path.file_name()?.to_string_lossy().into_owned();
    let directory = match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent.to_path_buf(),
        _ => PathBuf::from("."),
    };
    Some((directory, filename))
}

type DirectoryGroups = BTreeMap<PathBuf, Vec<(PathBuf, String)>>;

/// Files per directory, plus paths that do not name a file
fn group_by_directory(files: Vec<PathBuf>) -> (DirectoryGroups, Vec<PathBuf>) {
    let mut groups: DirectoryGroups = BTreeMap::new();
    let mut invalid = Vec::new();
    for path in files {
        match split_path(&path) {
            Some((directory, filename)) => groups.entry(directory).or_default().push((path, filename)),
            None => invalid.push(path),
        }
    }
    (groups, invalid)
}
