//! Audio decoding
//!
//! Supports WAV, MP3, FLAC, OGG, and container formats (M4A, MP4, MKV, ...)
//! using pure Rust decoders. No resampling happens here.

mod container;
mod decoder;

pub use container::decode_container;
pub use decoder::{decode_audio, AudioData, AudioDecoder, FileDecoder};

use std::path::Path;

/// Supported audio and container formats
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AudioFormat {
    // Pure audio formats
    Wav,
    Mp3,
    Flac,
    Ogg,

    // Container formats (demuxed with Symphonia)
    Mp4,
    Mkv,
    Mov,
    Webm,
    Aiff,

    Unknown,
}

impl AudioFormat {
    /// Detect format from file extension
    pub fn from_path(path: &Path) -> Self {
        let ext = path
            .extension()
            .and_then(|e| e.to_str())
            .map(|e| e.to_ascii_lowercase());

        match ext.as_deref() {
            Some("wav") | Some("wave") => AudioFormat::Wav,
            Some("mp3") => AudioFormat::Mp3,
            Some("flac") => AudioFormat::Flac,
            Some("ogg") | Some("oga") => AudioFormat::Ogg,

            Some("mp4") | Some("m4a") | Some("m4v") => AudioFormat::Mp4,
            Some("mkv") | Some("mka") => AudioFormat::Mkv,
            Some("mov") => AudioFormat::Mov,
            Some("webm") => AudioFormat::Webm,
            Some("aif") | Some("aiff") => AudioFormat::Aiff,

            _ => AudioFormat::Unknown,
        }
    }

    /// Check if format needs container demuxing
    pub fn is_container(&self) -> bool {
        matches!(
            self,
            AudioFormat::Mp4 | AudioFormat::Mkv | AudioFormat::Mov | AudioFormat::Webm | AudioFormat::Aiff
        )
    }
}

/// True if the built-in decoder knows the file's extension
pub fn is_supported_audio(path: &Path) -> bool {
    AudioFormat::from_path(path) != AudioFormat::Unknown
}
