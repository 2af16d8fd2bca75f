//! Fingerprint algorithm family
//!
//! Four interchangeable algorithms map a mono signal to a fixed-length
//! vector. `compute_all` runs each of them independently; a failing algorithm
//! yields an empty vector under its name and never affects the others.

mod chroma;
mod landmark;
mod lightweight;
mod spectral;

pub use chroma::ChromaFingerprinter;
pub use landmark::{LandmarkFingerprinter, Peak, PeakExtractor};
pub use lightweight::LightweightFingerprinter;
pub use spectral::SpectralFingerprinter;

use crate::config::FingerprintConfig;
use anyhow::Result;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::str::FromStr;
use thiserror::Error;

pub use takeprint_cache::FingerprintVector;

/// Algorithm identifiers, stored by name in the cache
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Algorithm {
    Spectral,
    Lightweight,
    Chroma,
    Landmark,
}

impl Algorithm {
    pub const ALL: [Algorithm; 4] = [
        Algorithm::Spectral,
        Algorithm::Lightweight,
        Algorithm::Chroma,
        Algorithm::Landmark,
    ];

    pub fn name(&self) -> &'static str {
        match self {
            Algorithm::Spectral => "spectral",
            Algorithm::Lightweight => "lightweight",
            Algorithm::Chroma => "chroma",
            Algorithm::Landmark => "landmark",
        }
    }

    /// Names of every algorithm, in `ALL` order
    pub fn all_names() -> [&'static str; 4] {
        Self::ALL.map(|a| a.name())
    }

    /// Build the fingerprinter for this algorithm
    pub fn fingerprinter(&self, config: &FingerprintConfig) -> Box<dyn Fingerprinter> {
        match self {
            Algorithm::Spectral => Box::new(SpectralFingerprinter::new(config)),
            Algorithm::Lightweight => Box::new(LightweightFingerprinter::new(config)),
            Algorithm::Chroma => Box::new(ChromaFingerprinter::new(config)),
            Algorithm::Landmark => Box::new(LandmarkFingerprinter::new(config)),
        }
    }
}

impl fmt::Display for Algorithm {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for Algorithm {
    type Err = FingerprintError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Algorithm::ALL
            .into_iter()
            .find(|a| a.name().eq_ignore_ascii_case(s.trim()))
            .ok_or_else(|| FingerprintError::UnknownAlgorithm(s.to_string()))
    }
}

#[derive(Debug, Error)]
pub enum FingerprintError {
    #[error("unknown fingerprint algorithm '{0}'")]
    UnknownAlgorithm(String),

    #[error("{algorithm}: sample rate {sample_rate} Hz has no content above {min_freq} Hz")]
    SampleRateTooLow {
        algorithm: Algorithm,
        sample_rate: u32,
        min_freq: f32,
    },

    #[error("{0} produced non-finite values")]
    NonFinite(Algorithm),

    #[error("{0} panicked")]
    Panicked(Algorithm),
}

/// One fingerprint algorithm.
///
/// Empty input yields an empty vector, which means "no fingerprint".
pub trait Fingerprinter: Send + Sync {
    fn algorithm(&self) -> Algorithm;

    fn compute(&self, samples: &[f32], sample_rate: u32) -> Result<FingerprintVector>;
}

/// Run one algorithm with panic and non-finite output isolation
pub fn compute(
    algorithm: Algorithm,
    samples: &[f32],
    sample_rate: u32,
    config: &FingerprintConfig,
) -> Result<FingerprintVector> {
    let fingerprinter = algorithm.fingerprinter(config);

    let vector = catch_unwind(AssertUnwindSafe(|| fingerprinter.compute(samples, sample_rate)))
        .map_err(|_| FingerprintError::Panicked(algorithm))??;

    if vector.iter().any(|v| !v.is_finite()) {
        return Err(FingerprintError::NonFinite(algorithm).into());
    }

    Ok(vector)
}

/// Run every algorithm, keeping each outcome
pub fn try_compute_all(
    samples: &[f32],
    sample_rate: u32,
    config: &FingerprintConfig,
) -> Vec<(Algorithm, Result<FingerprintVector>)> {
    Algorithm::ALL
        .into_iter()
        .map(|algorithm| (algorithm, compute(algorithm, samples, sample_rate, config)))
        .collect()
}

/// Run every algorithm; failures become empty vectors
pub fn compute_all(
    samples: &[f32],
    sample_rate: u32,
    config: &FingerprintConfig,
) -> BTreeMap<String, FingerprintVector> {
    try_compute_all(samples, sample_rate, config)
        .into_iter()
        .map(|(algorithm, outcome)| {
            let vector = outcome.unwrap_or_else(|e| {
                log::warn!("Fingerprint algorithm {} failed: {:#}", algorithm, e);
                Vec::new()
            });
            (algorithm.name().to_string(), vector)
        })
        .collect()
}
