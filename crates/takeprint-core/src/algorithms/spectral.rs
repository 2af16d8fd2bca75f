//! Spectral fingerprint: average band energy distribution
//!
//! FFT bins are folded into `spectral_bins` bands (log- or linearly spaced
//! between the configured frequency limits), averaged per band within a frame
//! and then averaged across frames.

use super::{Algorithm, FingerprintError, Fingerprinter};
use crate::config::FingerprintConfig;
use crate::transform::{compute_spectrogram, Spectrogram};
use anyhow::Result;

pub struct SpectralFingerprinter {
    frame_size: usize,
    hop_size: usize,
    num_bands: usize,
    min_freq: f32,
    max_freq: f32,
    log_bands: bool,
}

impl SpectralFingerprinter {
    pub fn new(config: &FingerprintConfig) -> Self {
        Self {
            frame_size: config.frame_size,
            hop_size: config.hop_size,
            num_bands: config.spectral_bins,
            min_freq: config.spectral_min_freq,
            max_freq: config.spectral_max_freq,
            log_bands: config.spectral_log_bins,
        }
    }

    /// Band index for every FFT bin, `None` outside the analysed range
    fn band_map(&self, spectrogram: &Spectrogram, upper: f32) -> Vec<Option<usize>> {
        let span_log = (upper / self.min_freq).ln();
        let span_lin = upper - self.min_freq;

        (0..spectrogram.num_bins)
            .map(|bin| {
                let freq = spectrogram.bin_frequency(bin);
                if freq < self.min_freq || freq >= upper {
                    return None;
                }
                let position = if self.log_bands {
                    (freq / self.min_freq).ln() / span_log
                } else {
                    (freq - self.min_freq) / span_lin
                };
                let band = (position * self.num_bands as f32) as usize;
                Some(band.min(self.num_bands - 1))
            })
            .collect()
    }
}

impl Fingerprinter for SpectralFingerprinter {
    fn algorithm(&self) -> Algorithm {
        Algorithm::Spectral
    }

    fn compute(&self, samples: &[f32], sample_rate: u32) -> Result<Vec<f32>> {
        if samples.is_empty() {
            return Ok(Vec::new());
        }

        let spectrogram = compute_spectrogram(samples, sample_rate, self.frame_size, self.hop_size)?;

        let upper = self.max_freq.min(spectrogram.nyquist());
        if upper <= self.min_freq {
            return Err(FingerprintError::SampleRateTooLow {
                algorithm: Algorithm::Spectral,
                sample_rate,
                min_freq: self.min_freq,
            }
            .into());
        }

        let band_map = self.band_map(&spectrogram, upper);
        let mut bins_per_band = vec![0usize; self.num_bands];
        for band in band_map.iter().flatten() {
            bins_per_band[*band] += 1;
        }

        let mut totals = vec![0.0f64; self.num_bands];
        let mut frame_bands = vec![0.0f64; self.num_bands];

        for frame in &spectrogram.magnitudes {
            frame_bands.iter_mut().for_each(|v| *v = 0.0);
            for (bin, band) in band_map.iter().enumerate() {
                if let Some(band) = band {
                    frame_bands[*band] += frame[bin] as f64;
                }
            }
            for band in 0..self.num_bands {
                if bins_per_band[band] > 0 {
                    totals[band] += frame_bands[band] / bins_per_band[band] as f64;
                }
            }
        }

        let num_frames = spectrogram.num_frames.max(1) as f64;
        Ok(totals.iter().map(|t| (t / num_frames) as f32).collect())
    }
}
