//! Takeprint per-directory fingerprint cache
//!
//! Typed records for the cache document plus atomic JSON load/save.

pub mod error;
pub mod format;
pub mod store;

pub use error::{CacheError, CacheResult};
pub use format::{
    DirectoryFingerprintCache, FileCacheEntry, FileSignature, FingerprintVector,
    CACHE_FILE_NAME, CACHE_VERSION,
};
pub use store::{cache_path, load, load_reporting, save, try_load};
