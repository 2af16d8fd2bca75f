//! Short-time Fourier transform shared by the FFT-based algorithms
//!
//! Frames overlap by `frame_size - hop_size` samples and are Hann windowed.
//! Input shorter than one frame is zero-padded into a single frame.

use anyhow::Result;
use rustfft::{num_complex::Complex, FftPlanner};
use std::f32::consts::PI;

/// Magnitude spectrogram with linearly spaced bins
#[derive(Debug, Clone)]
pub struct Spectrogram {
    /// Magnitude values [time_frame][frequency_bin]
    pub magnitudes: Vec<Vec<f32>>,
    /// Number of time frames
    pub num_frames: usize,
    /// Number of frequency bins (frame_size / 2 + 1)
    pub num_bins: usize,
    pub frame_size: usize,
    pub sample_rate: u32,
}

impl Spectrogram {
    /// Center frequency of an FFT bin in Hz
    pub fn bin_frequency(&self, bin: usize) -> f32 {
        bin as f32 * self.sample_rate as f32 / self.frame_size as f32
    }

    pub fn nyquist(&self) -> f32 {
        self.sample_rate as f32 / 2.0
    }
}

/// Number of frames a signal of `len` samples produces
pub fn frame_count(len: usize, frame_size: usize, hop_size: usize) -> usize {
    if len == 0 {
        0
    } else if len <= frame_size {
        1
    } else {
        (len - frame_size).div_ceil(hop_size) + 1
    }
}

/// Compute the magnitude spectrogram of a mono signal
pub fn compute_spectrogram(
    samples: &[f32],
    sample_rate: u32,
    frame_size: usize,
    hop_size: usize,
) -> Result<Spectrogram> {
    if frame_size < 2 || hop_size == 0 {
        anyhow::bail!("invalid framing: frame_size={} hop_size={}", frame_size, hop_size);
    }
    if sample_rate == 0 {
        anyhow::bail!("sample rate must be > 0");
    }

    let num_frames = frame_count(samples.len(), frame_size, hop_size);
    let num_bins = frame_size / 2 + 1;

    let mut planner = FftPlanner::new();
    let fft = planner.plan_fft_forward(frame_size);
    let window = create_hann_window(frame_size);

    let mut magnitudes = Vec::with_capacity(num_frames);
    let mut buffer = vec![Complex::new(0.0f32, 0.0); frame_size];

    for frame_idx in 0..num_frames {
        let start = frame_idx * hop_size;
        let end = (start + frame_size).min(samples.len());

        for (i, slot) in buffer.iter_mut().enumerate() {
            let s = if start + i < end { samples[start + i] } else { 0.0 };
            *slot = Complex::new(s * window[i], 0.0);
        }

        fft.process(&mut buffer);

        magnitudes.push(buffer[..num_bins].iter().map(|c| c.norm()).collect());
    }

    Ok(Spectrogram {
        magnitudes,
        num_frames,
        num_bins,
        frame_size,
        sample_rate,
    })
}

/// Create Hann window
pub fn create_hann_window(size: usize) -> Vec<f32> {
    (0..size)
        .map(|i| {
            let x = i as f32 / (size - 1) as f32;
            0.5 * (1.0 - (2.0 * PI * x).cos())
        })
        .collect()
}
