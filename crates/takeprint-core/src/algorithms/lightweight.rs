//! Lightweight fingerprint: per-segment energy and zero-crossing rate
//!
//! The signal is cut into non-overlapping frames; RMS energy and the
//! zero-crossing rate (crossings per sample) of each frame are averaged over
//! `lightweight_segments` equal time segments. Output layout is
//! `[rms_0 .. rms_n, zcr_0 .. zcr_n]`. No FFT involved.

use super::{Algorithm, Fingerprinter};
use crate::config::FingerprintConfig;
use crate::transform::frame_count;
use anyhow::Result;

pub struct LightweightFingerprinter {
    frame_size: usize,
    segments: usize,
}

impl LightweightFingerprinter {
    pub fn new(config: &FingerprintConfig) -> Self {
        Self {
            frame_size: config.lightweight_frame_size,
            segments: config.lightweight_segments,
        }
    }
}

fn rms(frame: &[f32]) -> f64 {
    let energy: f64 = frame.iter().map(|&s| (s as f64) * (s as f64)).sum();
    (energy / frame.len() as f64).sqrt()
}

fn zero_crossing_rate(frame: &[f32]) -> f64 {
    if frame.len() < 2 {
        return 0.0;
    }
    let crossings = frame
        .windows(2)
        .filter(|w| (w[0] >= 0.0) != (w[1] >= 0.0))
        .count();
    crossings as f64 / (frame.len() - 1) as f64
}

impl Fingerprinter for LightweightFingerprinter {
    fn algorithm(&self) -> Algorithm {
        Algorithm::Lightweight
    }

    fn compute(&self, samples: &[f32], _sample_rate: u32) -> Result<Vec<f32>> {
        if samples.is_empty() {
            return Ok(Vec::new());
        }

        let num_frames = frame_count(samples.len(), self.frame_size, self.frame_size);

        let mut rms_sum = vec![0.0f64; self.segments];
        let mut zcr_sum = vec![0.0f64; self.segments];
        let mut counts = vec![0usize; self.segments];

        for (frame_idx, frame) in samples.chunks(self.frame_size).enumerate() {
            let segment = frame_idx * self.segments / num_frames;
            rms_sum[segment] += rms(frame);
            zcr_sum[segment] += zero_crossing_rate(frame);
            counts[segment] += 1;
        }

        let mean = |sums: &[f64]| -> Vec<f32> {
            sums.iter()
                .zip(&counts)
                .map(|(s, &c)| if c > 0 { (s / c as f64) as f32 } else { 0.0 })
                .collect()
        };

        let mut vector = mean(&rms_sum);
        vector.extend(mean(&zcr_sum));
        Ok(vector)
    }
}
