//! Takeprint Core - audio fingerprinting and similarity engine
//!
//! Decodes takes, reduces each to four fixed-length fingerprint vectors and
//! keeps them in a per-directory cache so near-duplicate recordings can be
//! found by pairwise comparison.

pub mod algorithms;
pub mod audio;
pub mod cache_manager;
pub mod compare;
pub mod config;
pub mod engine;
pub mod preprocess;
pub mod transform;

pub use algorithms::{compute_all, Algorithm, FingerprintError, Fingerprinter};
pub use audio::{AudioData, AudioDecoder, FileDecoder};
pub use cache_manager::{CacheManager, DirectoryCache, SharedDirectoryCache};
pub use compare::{compare, meets_threshold};
pub use config::{EngineConfig, FingerprintConfig, MatchingConfig, WorkerConfig};
pub use engine::{
    BatchObserver, BatchReport, ChannelObserver, EngineEvent, FileStatus, FingerprintEngine,
    LogObserver, MatchResult, NoopObserver, TaskHandle,
};
pub use preprocess::{prepare, PreparedSignal};

/// Fingerprint a single file with every algorithm, bypassing the cache
pub fn fingerprint_file(
    path: &std::path::Path,
    config: &FingerprintConfig,
) -> anyhow::Result<std::collections::BTreeMap<String, Vec<f32>>> {
    let audio = audio::decode_audio(path)?;
    let signal = prepare(&audio);
    if signal.is_empty() {
        anyhow::bail!("No audio samples decoded: {}", path.display());
    }
    Ok(compute_all(&signal.samples, signal.sample_rate, config))
}
