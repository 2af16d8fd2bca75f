//! Audio decoding for multiple formats

use super::AudioFormat;
use anyhow::{Context, Result};
use std::path::Path;

/// Decoded audio data
#[derive(Debug, Clone, PartialEq)]
pub struct AudioData {
    /// Interleaved samples in [-1, 1]
    pub samples: Vec<f32>,
    pub sample_rate: u32,
    pub channels: u16,
    pub duration_ms: u32,
}

impl AudioData {
    /// Wrap an interleaved buffer
    pub fn new(samples: Vec<f32>, sample_rate: u32, channels: u16) -> Self {
        let duration_ms = duration_ms(samples.len(), sample_rate, channels);
        Self {
            samples,
            sample_rate,
            channels,
            duration_ms,
        }
    }

    /// Build from planar channel buffers (one `Vec` per channel).
    ///
    /// Channels shorter than the longest one are padded with silence.
    pub fn from_planar(planes: &[Vec<f32>], sample_rate: u32) -> Self {
        let channels = planes.len().max(1);
        let frames = planes.iter().map(|p| p.len()).max().unwrap_or(0);

        let mut samples = Vec::with_capacity(frames * channels);
        for frame_idx in 0..frames {
            for plane in planes {
                samples.push(plane.get(frame_idx).copied().unwrap_or(0.0));
            }
        }

        Self::new(samples, sample_rate, channels as u16)
    }

    /// Number of sample frames (samples per channel)
    pub fn frames(&self) -> usize {
        self.samples.len() / self.channels.max(1) as usize
    }

    /// Convert to mono by averaging channels
    pub fn to_mono(&self) -> Vec<f32> {
        if self.channels <= 1 {
            return self.samples.clone();
        }

        let mut mono = Vec::with_capacity(self.frames());
        for chunk in self.samples.chunks(self.channels as usize) {
            let avg: f32 = chunk.iter().sum::<f32>() / chunk.len() as f32;
            mono.push(avg);
        }
        mono
    }
}

fn duration_ms(num_samples: usize, sample_rate: u32, channels: u16) -> u32 {
    let per_second = sample_rate as u64 * channels.max(1) as u64;
    if per_second == 0 {
        return 0;
    }
    (num_samples as f64 / per_second as f64 * 1000.0) as u32
}

/// Source of decoded audio for the engine.
///
/// The host application plugs its own decode pipeline in here; `FileDecoder`
/// is the built-in implementation.
pub trait AudioDecoder: Send + Sync {
    fn decode(&self, path: &Path) -> Result<AudioData>;
}

/// Decodes files from disk by extension
#[derive(Debug, Clone, Copy, Default)]
pub struct FileDecoder;

impl AudioDecoder for FileDecoder {
    fn decode(&self, path: &Path) -> Result<AudioData> {
        decode_audio(path)
    }
}

/// Decode an audio file at its native sample rate and channel count
pub fn decode_audio(path: &Path) -> Result<AudioData> {
    if !path.exists() {
        anyhow::bail!("Audio file not found: {}", path.display());
    }

    let format = AudioFormat::from_path(path);

    let audio_data = if format.is_container() {
        super::decode_container(path)?
    } else {
        match format {
            AudioFormat::Wav => decode_wav(path)?,
            AudioFormat::Mp3 => decode_mp3(path)?,
            AudioFormat::Flac => decode_flac(path)?,
            AudioFormat::Ogg => decode_ogg(path)?,
            _ => {
                anyhow::bail!("Unsupported audio format: {}", path.display());
            }
        }
    };

    log::trace!(
        "Decoded {}: {} samples, {} ch @ {}Hz",
        path.display(),
        audio_data.samples.len(),
        audio_data.channels,
        audio_data.sample_rate
    );

    Ok(audio_data)
}

/// Decode WAV file
fn decode_wav(path: &Path) -> Result<AudioData> {
    let mut reader = hound::WavReader::open(path)
        .with_context(|| format!("Failed to open WAV file: {}", path.display()))?;

    let spec = reader.spec();

    // Read samples and convert to f32
    let samples: Vec<f32> = match spec.sample_format {
        hound::SampleFormat::Float => reader
            .samples::<f32>()
            .collect::<Result<Vec<_>, _>>()
            .with_context(|| format!("Corrupt WAV data: {}", path.display()))?,
        hound::SampleFormat::Int => {
            let max_val = (1i64 << (spec.bits_per_sample - 1)) as f32;
            reader
                .samples::<i32>()
                .map(|s| s.map(|v| v as f32 / max_val))
                .collect::<Result<Vec<_>, _>>()
                .with_context(|| format!("Corrupt WAV data: {}", path.display()))?
        }
    };

    Ok(AudioData::new(samples, spec.sample_rate, spec.channels))
}

/// Decode MP3 file
fn decode_mp3(path: &Path) -> Result<AudioData> {
    let data = std::fs::read(path)
        .with_context(|| format!("Failed to read MP3 file: {}", path.display()))?;

    let mut decoder = minimp3::Decoder::new(&data[..]);
    let mut samples = Vec::new();
    let mut sample_rate = 0;
    let mut channels = 0;

    loop {
        match decoder.next_frame() {
            Ok(frame) => {
                if sample_rate == 0 {
                    sample_rate = frame.sample_rate as u32;
                    channels = frame.channels as u16;
                }
                // Convert i16 to f32
                for &sample in &frame.data {
                    samples.push(sample as f32 / 32768.0);
                }
            }
            Err(minimp3::Error::Eof) => break,
            Err(e) => anyhow::bail!("MP3 decode error in {}: {}", path.display(), e),
        }
    }

    Ok(AudioData::new(samples, sample_rate, channels))
}

/// Decode FLAC file
fn decode_flac(path: &Path) -> Result<AudioData> {
    let mut reader = claxon::FlacReader::open(path)
        .with_context(|| format!("Failed to open FLAC file: {}", path.display()))?;

    let info = reader.streaminfo();
    let max_val = (1i64 << (info.bits_per_sample - 1)) as f32;

    let samples: Vec<f32> = reader
        .samples()
        .map(|s| s.map(|v| v as f32 / max_val))
        .collect::<Result<Vec<_>, _>>()
        .with_context(|| format!("Corrupt FLAC data: {}", path.display()))?;

    Ok(AudioData::new(samples, info.sample_rate, info.channels as u16))
}

/// Decode OGG Vorbis file
fn decode_ogg(path: &Path) -> Result<AudioData> {
    let file = std::fs::File::open(path)
        .with_context(|| format!("Failed to open OGG file: {}", path.display()))?;

    let mut reader = lewton::inside_ogg::OggStreamReader::new(file)
        .with_context(|| format!("Invalid OGG stream: {}", path.display()))?;

    let sample_rate = reader.ident_hdr.audio_sample_rate;
    let channels = reader.ident_hdr.audio_channels as u16;

    let mut samples = Vec::new();
    while let Some(packet) = reader.read_dec_packet_itl()? {
        // Convert i16 to f32
        for &sample in &packet {
            samples.push(sample as f32 / 32768.0);
        }
    }

    Ok(AudioData::new(samples, sample_rate, channels))
}
