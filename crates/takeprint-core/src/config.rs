//! Configuration for the fingerprint algorithms and the engine
//!
//! `EngineConfig` can be loaded from TOML; every section falls back to its
//! defaults when absent.

use crate::algorithms::Algorithm;
use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Parameters shared by the fingerprint algorithms.
///
/// Two vectors are only comparable when produced with the same values here.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FingerprintConfig {
    // Framing for the FFT-based algorithms
    pub frame_size: usize,
    pub hop_size: usize,

    // Spectral
    pub spectral_bins: usize,
    pub spectral_min_freq: f32,
    pub spectral_max_freq: f32,
    pub spectral_log_bins: bool,

    // Lightweight
    pub lightweight_frame_size: usize,
    pub lightweight_segments: usize,

    // Chroma
    pub chroma_bins: usize,
    pub chroma_min_freq: f32,
    pub chroma_max_freq: f32,
    pub chroma_ref_freq: f32,

    // Landmark
    pub landmark_max_freq: f32,
    pub landmark_freq_filter_size: usize,
    pub landmark_time_filter_size: usize,
    pub landmark_peak_threshold: f32,
    pub landmark_max_peaks_per_frame: usize,
    pub landmark_fan_out: usize,
    pub landmark_max_time_delta: usize,
    pub landmark_time_buckets: usize,
    pub landmark_ratio_buckets: usize,
    pub landmark_ratio_octaves: f32,
}

impl Default for FingerprintConfig {
    fn default() -> Self {
        Self {
            frame_size: 2048,
            hop_size: 1024,

            spectral_bins: 32,
            spectral_min_freq: 40.0,
            spectral_max_freq: 16000.0,
            spectral_log_bins: true,

            lightweight_frame_size: 1024,
            lightweight_segments: 8,

            chroma_bins: 12,
            chroma_min_freq: 55.0,
            chroma_max_freq: 5000.0,
            chroma_ref_freq: 440.0,

            landmark_max_freq: 5000.0,
            landmark_freq_filter_size: 9,
            landmark_time_filter_size: 5,
            landmark_peak_threshold: 0.05,
            landmark_max_peaks_per_frame: 5,
            landmark_fan_out: 5,
            landmark_max_time_delta: 32,
            landmark_time_buckets: 16,
            landmark_ratio_buckets: 16,
            landmark_ratio_octaves: 2.0,
        }
    }
}

impl FingerprintConfig {
    /// Validate configuration parameters
    pub fn validate(&self) -> Result<()> {
        if self.frame_size < 2 || !self.frame_size.is_power_of_two() {
            anyhow::bail!("frame_size must be a power of two >= 2");
        }
        if self.hop_size == 0 || self.hop_size > self.frame_size {
            anyhow::bail!("hop_size must be in 1..=frame_size");
        }
        if self.spectral_bins == 0 {
            anyhow::bail!("spectral_bins must be > 0");
        }
        if self.spectral_min_freq <= 0.0 || self.spectral_min_freq >= self.spectral_max_freq {
            anyhow::bail!("spectral_min_freq must be > 0 and < spectral_max_freq");
        }
        if self.lightweight_frame_size == 0 || self.lightweight_segments == 0 {
            anyhow::bail!("lightweight_frame_size and lightweight_segments must be > 0");
        }
        if self.chroma_bins == 0 {
            anyhow::bail!("chroma_bins must be > 0");
        }
        if self.chroma_min_freq <= 0.0 || self.chroma_min_freq >= self.chroma_max_freq {
            anyhow::bail!("chroma_min_freq must be > 0 and < chroma_max_freq");
        }
        if self.chroma_ref_freq <= 0.0 {
            anyhow::bail!("chroma_ref_freq must be > 0");
        }
        if self.landmark_max_freq <= 0.0 {
            anyhow::bail!("landmark_max_freq must be > 0");
        }
        if self.landmark_time_buckets == 0
            || self.landmark_ratio_buckets == 0
            || self.landmark_max_time_delta == 0
        {
            anyhow::bail!("landmark bucket counts and max_time_delta must be > 0");
        }
        if self.landmark_ratio_octaves <= 0.0 {
            anyhow::bail!("landmark_ratio_octaves must be > 0");
        }
        Ok(())
    }

    /// Length of the vector an algorithm produces under this configuration
    pub fn vector_len(&self, algorithm: Algorithm) -> usize {
        match algorithm {
            Algorithm::Spectral => self.spectral_bins,
            Algorithm::Lightweight => 2 * self.lightweight_segments,
            Algorithm::Chroma => self.chroma_bins,
            Algorithm::Landmark => self.landmark_time_buckets * self.landmark_ratio_buckets,
        }
    }
}

/// Worker pool and cache manager sizing
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct WorkerConfig {
    pub workers: usize,
    pub cache_capacity: usize,
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self {
            workers: default_workers(),
            cache_capacity: 64,
        }
    }
}

/// Deliberately below the core count: one core stays free for the
/// interactive thread. Clamped to 1..=16.
fn default_workers() -> usize {
    std::thread::available_parallelism()
        .map(|n| n.get().saturating_sub(1))
        .unwrap_or(1)
        .clamp(1, 16)
}

/// Caller-side match policy
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MatchingConfig {
    pub algorithm: Algorithm,
    pub threshold: f32,
}

impl Default for MatchingConfig {
    fn default() -> Self {
        Self {
            algorithm: Algorithm::Spectral,
            threshold: 0.75,
        }
    }
}

/// Top-level engine configuration
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    pub engine: WorkerConfig,
    pub matching: MatchingConfig,
    pub fingerprint: FingerprintConfig,
}

impl EngineConfig {
    /// Load configuration from a TOML file
    pub fn from_file(path: &Path) -> Result<Self> {
        let contents = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;
        Self::from_toml_str(&contents)
            .with_context(|| format!("Invalid config file: {}", path.display()))
    }

    /// Parse configuration from TOML text
    pub fn from_toml_str(contents: &str) -> Result<Self> {
        let config: EngineConfig = toml::from_str(contents)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        if self.engine.workers == 0 {
            anyhow::bail!("engine.workers must be > 0");
        }
        if self.engine.cache_capacity == 0 {
            anyhow::bail!("engine.cache_capacity must be > 0");
        }
        if !(0.0..=1.0).contains(&self.matching.threshold) {
            anyhow::bail!("matching.threshold must be within [0, 1]");
        }
        self.fingerprint.validate()
    }
}
