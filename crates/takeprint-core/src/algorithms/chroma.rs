//! Chroma fingerprint: energy folded into pitch classes
//!
//! Every FFT bin inside the chroma range contributes its energy to the pitch
//! class of its nearest note, octave ignored. Each frame's chroma is
//! normalised to unit sum so loud passages do not dominate, then frames are
//! averaged.

use super::{Algorithm, FingerprintError, Fingerprinter};
use crate::config::FingerprintConfig;
use crate::transform::compute_spectrogram;
use anyhow::Result;

pub struct ChromaFingerprinter {
    frame_size: usize,
    hop_size: usize,
    num_classes: usize,
    min_freq: f32,
    max_freq: f32,
    ref_freq: f32,
}

impl ChromaFingerprinter {
    pub fn new(config: &FingerprintConfig) -> Self {
        Self {
            frame_size: config.frame_size,
            hop_size: config.hop_size,
            num_classes: config.chroma_bins,
            min_freq: config.chroma_min_freq,
            max_freq: config.chroma_max_freq,
            ref_freq: config.chroma_ref_freq,
        }
    }

    /// Pitch class of a frequency; class 0 is the reference note
    pub fn pitch_class(&self, freq: f32) -> usize {
        let steps = (self.num_classes as f32 * (freq / self.ref_freq).log2()).round() as i64;
        steps.rem_euclid(self.num_classes as i64) as usize
    }
}

impl Fingerprinter for ChromaFingerprinter {
    fn algorithm(&self) -> Algorithm {
        Algorithm::Chroma
    }

    fn compute(&self, samples: &[f32], sample_rate: u32) -> Result<Vec<f32>> {
        if samples.is_empty() {
            return Ok(Vec::new());
        }

        let spectrogram = compute_spectrogram(samples, sample_rate, self.frame_size, self.hop_size)?;

        let upper = self.max_freq.min(spectrogram.nyquist());
        let class_map: Vec<Option<usize>> = (0..spectrogram.num_bins)
            .map(|bin| {
                let freq = spectrogram.bin_frequency(bin);
                (freq >= self.min_freq && freq < upper).then(|| self.pitch_class(freq))
            })
            .collect();

        if class_map.iter().all(|c| c.is_none()) {
            return Err(FingerprintError::SampleRateTooLow {
                algorithm: Algorithm::Chroma,
                sample_rate,
                min_freq: self.min_freq,
            }
            .into());
        }

        let mut totals = vec![0.0f64; self.num_classes];
        let mut frame_chroma = vec![0.0f64; self.num_classes];

        for frame in &spectrogram.magnitudes {
            frame_chroma.iter_mut().for_each(|v| *v = 0.0);
            for (bin, class) in class_map.iter().enumerate() {
                if let Some(class) = class {
                    let m = frame[bin] as f64;
                    frame_chroma[*class] += m * m;
                }
            }

            let frame_energy: f64 = frame_chroma.iter().sum();
            if frame_energy > 0.0 {
                for (total, v) in totals.iter_mut().zip(&frame_chroma) {
                    *total += v / frame_energy;
                }
            }
        }

        let num_frames = spectrogram.num_frames.max(1) as f64;
        Ok(totals.iter().map(|t| (t / num_frames) as f32).collect())
    }
}
