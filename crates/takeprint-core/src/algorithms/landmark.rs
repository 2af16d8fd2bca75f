//! Landmark fingerprint: histogram of spectral peak-pair relations
//!
//! Peaks are local maxima of the spectrogram found with a 2D max filter
//! (frequency then time). Each peak is paired with up to `fan_out` later
//! peaks within `max_time_delta` frames, and every pair lands in a
//! (time delta, log2 frequency ratio) histogram cell. Only relative positions
//! enter the histogram, so a fixed time offset between two recordings leaves
//! it unchanged.

use super::{Algorithm, Fingerprinter};
use crate::config::FingerprintConfig;
use crate::transform::{compute_spectrogram, Spectrogram};
use anyhow::Result;

/// A local maximum in the spectrogram
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Peak {
    /// Time index (frame number)
    pub t: usize,
    /// Frequency bin index
    pub f: usize,
    /// Magnitude value
    pub m: f32,
}

impl Peak {
    pub fn new(t: usize, f: usize, m: f32) -> Self {
        Self { t, f, m }
    }
}

/// Peak extractor
pub struct PeakExtractor {
    freq_filter_size: usize,
    time_filter_size: usize,
    /// Fraction of the loudest magnitude a peak must reach
    threshold: f32,
    max_peaks_per_frame: usize,
}

impl PeakExtractor {
    pub fn new(config: &FingerprintConfig) -> Self {
        Self {
            freq_filter_size: config.landmark_freq_filter_size.max(1),
            time_filter_size: config.landmark_time_filter_size.max(1),
            threshold: config.landmark_peak_threshold,
            max_peaks_per_frame: config.landmark_max_peaks_per_frame.max(1),
        }
    }

    /// Extract peaks from the first `num_bins` bins of each frame, sorted by
    /// time then frequency
    pub fn extract(&self, magnitudes: &[Vec<f32>], num_bins: usize) -> Vec<Peak> {
        let global_max = magnitudes
            .iter()
            .flat_map(|frame| frame[..num_bins].iter())
            .fold(0.0f32, |acc, &m| acc.max(m));
        if global_max <= 0.0 {
            return Vec::new();
        }
        let floor = global_max * self.threshold;

        let max_filtered = self.apply_2d_max_filter(magnitudes, num_bins);

        let mut peaks = Vec::new();
        for (t, frame) in magnitudes.iter().enumerate() {
            let mut frame_peaks: Vec<Peak> = (1..num_bins)
                .filter(|&f| {
                    let original = frame[f];
                    original > 0.0 && original >= floor && original >= max_filtered[t][f]
                })
                .map(|f| Peak::new(t, f, frame[f]))
                .collect();

            frame_peaks.sort_by(|a, b| b.m.total_cmp(&a.m));
            frame_peaks.truncate(self.max_peaks_per_frame);
            frame_peaks.sort_by_key(|p| p.f);
            peaks.extend(frame_peaks);
        }

        peaks
    }

    /// Apply 2D max filter (frequency then time)
    fn apply_2d_max_filter(&self, magnitudes: &[Vec<f32>], num_bins: usize) -> Vec<Vec<f32>> {
        let num_frames = magnitudes.len();
        let half_f = self.freq_filter_size / 2;
        let half_t = self.time_filter_size / 2;

        let freq_filtered: Vec<Vec<f32>> = magnitudes
            .iter()
            .map(|frame| {
                (0..num_bins)
                    .map(|f| {
                        let f_end = (f + half_f + 1).min(num_bins);
                        frame[f.saturating_sub(half_f)..f_end]
                            .iter()
                            .fold(f32::NEG_INFINITY, |acc, &m| acc.max(m))
                    })
                    .collect()
            })
            .collect();

        (0..num_frames)
            .map(|t| {
                let t_start = t.saturating_sub(half_t);
                let t_end = (t + half_t + 1).min(num_frames);
                (0..num_bins)
                    .map(|f| {
                        (t_start..t_end)
                            .map(|ti| freq_filtered[ti][f])
                            .fold(f32::NEG_INFINITY, f32::max)
                    })
                    .collect()
            })
            .collect()
    }
}

pub struct LandmarkFingerprinter {
    frame_size: usize,
    hop_size: usize,
    max_freq: f32,
    extractor: PeakExtractor,
    fan_out: usize,
    max_time_delta: usize,
    time_buckets: usize,
    ratio_buckets: usize,
    ratio_octaves: f32,
}

impl LandmarkFingerprinter {
    pub fn new(config: &FingerprintConfig) -> Self {
        Self {
            frame_size: config.frame_size,
            hop_size: config.hop_size,
            max_freq: config.landmark_max_freq,
            extractor: PeakExtractor::new(config),
            fan_out: config.landmark_fan_out.max(1),
            max_time_delta: config.landmark_max_time_delta,
            time_buckets: config.landmark_time_buckets,
            ratio_buckets: config.landmark_ratio_buckets,
            ratio_octaves: config.landmark_ratio_octaves,
        }
    }

    /// Bins analysed: everything up to the landmark frequency limit
    fn analysed_bins(&self, spectrogram: &Spectrogram) -> usize {
        let limit = self.max_freq.min(spectrogram.nyquist());
        (0..spectrogram.num_bins)
            .take_while(|&bin| spectrogram.bin_frequency(bin) <= limit)
            .count()
    }

    /// Histogram cell of a peak pair, `None` if outside the pairing window
    fn cell(&self, anchor: &Peak, target: &Peak) -> Option<usize> {
        let dt = target.t.checked_sub(anchor.t)?;
        if dt == 0 || dt > self.max_time_delta {
            return None;
        }
        let time_bucket = ((dt - 1) * self.time_buckets / self.max_time_delta).min(self.time_buckets - 1);

        let ratio = (target.f as f32 / anchor.f as f32)
            .log2()
            .clamp(-self.ratio_octaves, self.ratio_octaves);
        let position = (ratio + self.ratio_octaves) / (2.0 * self.ratio_octaves);
        let ratio_bucket = ((position * self.ratio_buckets as f32) as usize).min(self.ratio_buckets - 1);

        Some(time_bucket * self.ratio_buckets + ratio_bucket)
    }
}

impl Fingerprinter for LandmarkFingerprinter {
    fn algorithm(&self) -> Algorithm {
        Algorithm::Landmark
    }

    fn compute(&self, samples: &[f32], sample_rate: u32) -> Result<Vec<f32>> {
        if samples.is_empty() {
            return Ok(Vec::new());
        }

        let spectrogram = compute_spectrogram(samples, sample_rate, self.frame_size, self.hop_size)?;
        let num_bins = self.analysed_bins(&spectrogram);
        let peaks = self.extractor.extract(&spectrogram.magnitudes, num_bins);

        let mut histogram = vec![0.0f64; self.time_buckets * self.ratio_buckets];
        let mut pairs = 0usize;

        for (i, anchor) in peaks.iter().enumerate() {
            let mut paired = 0;
            for target in &peaks[i + 1..] {
                if target.t > anchor.t + self.max_time_delta || paired >= self.fan_out {
                    break;
                }
                if let Some(cell) = self.cell(anchor, target) {
                    histogram[cell] += 1.0;
                    pairs += 1;
                    paired += 1;
                }
            }
        }

        log::trace!("landmark: {} peaks, {} pairs", peaks.len(), pairs);

        if pairs == 0 {
            return Ok(vec![0.0; histogram.len()]);
        }
        Ok(histogram.iter().map(|h| (h / pairs as f64) as f32).collect())
    }
}
