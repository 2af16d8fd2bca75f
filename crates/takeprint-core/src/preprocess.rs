//! Signal preprocessing
//!
//! Turns a decoded buffer into the canonical mono sequence every algorithm
//! consumes. The sample rate passes through untouched.

use crate::audio::AudioData;

/// Canonical mono signal
#[derive(Debug, Clone, PartialEq)]
pub struct PreparedSignal {
    pub samples: Vec<f32>,
    pub sample_rate: u32,
}

impl PreparedSignal {
    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    pub fn duration_secs(&self) -> f64 {
        if self.sample_rate == 0 {
            return 0.0;
        }
        self.samples.len() as f64 / self.sample_rate as f64
    }
}

/// Downmix to mono and sanitize samples
pub fn prepare(audio: &AudioData) -> PreparedSignal {
    let samples = audio
        .to_mono()
        .into_iter()
        .map(|s| if s.is_finite() { s.clamp(-1.0, 1.0) } else { 0.0 })
        .collect();

    PreparedSignal {
        samples,
        sample_rate: audio.sample_rate,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_downmix_and_rate_passthrough() {
        let audio = AudioData::new(vec![0.2, 0.4, -0.6, -0.2], 22050, 2);
        let signal = prepare(&audio);
        assert_eq!(signal.sample_rate, 22050);
        assert_eq!(signal.samples.len(), 2);
        assert!((signal.samples[0] - 0.3).abs() < 1e-6);
        assert!((signal.samples[1] + 0.4).abs() < 1e-6);
    }

    #[test]
    fn test_empty_buffer() {
        let signal = prepare(&AudioData::new(Vec::new(), 44100, 2));
        assert!(signal.is_empty());
        assert_eq!(signal.duration_secs(), 0.0);
    }

    #[test]
    fn test_sanitizes_samples() {
        let audio = AudioData::new(vec![f32::NAN, 3.0, -f32::INFINITY, 0.5], 8000, 1);
        assert_eq!(prepare(&audio).samples, vec![0.0, 1.0, 0.0, 0.5]);
    }
}
