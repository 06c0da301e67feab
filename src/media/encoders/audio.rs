// SPDX-License-Identifier: GPL-3.0-only

//! Audio encoder selection
//!
//! Recordings carry a single low-bitrate mono track. The encoder always runs
//! at [`AUDIO_ENCODER_RATE`] with one channel; only the codec is configurable.

use super::set_if_present;
use gstreamer as gst;
use serde::{Deserialize, Serialize};
use std::fmt;
use tracing::debug;

/// Sample rate every audio encoder is opened at
pub const AUDIO_ENCODER_RATE: u32 = 22_050;

/// Channels every audio encoder is opened with
pub const AUDIO_ENCODER_CHANNELS: u32 = 1;

/// Target bitrate of the audio track
pub const AUDIO_BITRATE_BPS: i32 = 32_000;

/// Audio codec types
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AudioCodec {
    Aac,
    Mp3,
    Opus,
    Vorbis,
}

/// Sample layout an encoder wants on input
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SampleFormat {
    F32,
    S16,
}

impl SampleFormat {
    pub fn bytes_per_sample(&self) -> usize {
        match self {
            SampleFormat::F32 => 4,
            SampleFormat::S16 => 2,
        }
    }

    pub fn gst_format(&self) -> &'static str {
        match self {
            SampleFormat::F32 => "F32LE",
            SampleFormat::S16 => "S16LE",
        }
    }
}

impl AudioCodec {
    pub const ALL: [AudioCodec; 4] = [
        AudioCodec::Aac,
        AudioCodec::Mp3,
        AudioCodec::Opus,
        AudioCodec::Vorbis,
    ];

    /// Encoder elements in fallback order
    pub fn encoders(&self) -> &'static [&'static str] {
        match self {
            AudioCodec::Aac => &["avenc_aac", "fdkaacenc", "voaacenc"],
            AudioCodec::Mp3 => &["lamemp3enc"],
            AudioCodec::Opus => &["opusenc"],
            AudioCodec::Vorbis => &["vorbisenc"],
        }
    }

    /// Samples per channel in one encoder input frame
    pub fn frame_size(&self) -> usize {
        match self {
            AudioCodec::Aac => 1024,
            AudioCodec::Mp3 => 1152,
            AudioCodec::Opus => 480,
            AudioCodec::Vorbis => 1024,
        }
    }

    pub fn sample_format(&self) -> SampleFormat {
        match self {
            AudioCodec::Mp3 => SampleFormat::S16,
            AudioCodec::Aac | AudioCodec::Opus | AudioCodec::Vorbis => SampleFormat::F32,
        }
    }

    /// Get audio caps string for this codec
    pub fn caps_string(&self) -> &'static str {
        match self {
            AudioCodec::Aac => "audio/mpeg,mpegversion=4",
            AudioCodec::Mp3 => "audio/mpeg,mpegversion=1,layer=3",
            AudioCodec::Opus => "audio/x-opus",
            AudioCodec::Vorbis => "audio/x-vorbis",
        }
    }

    pub fn parser_name(&self) -> Option<&'static str> {
        match self {
            AudioCodec::Aac => Some("aacparse"),
            AudioCodec::Mp3 => Some("mpegaudioparse"),
            AudioCodec::Opus | AudioCodec::Vorbis => None,
        }
    }
}

impl fmt::Display for AudioCodec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            AudioCodec::Aac => "AAC",
            AudioCodec::Mp3 => "MP3",
            AudioCodec::Opus => "Opus",
            AudioCodec::Vorbis => "Vorbis",
        };
        write!(f, "{}", name)
    }
}

/// Configure audio encoder
pub fn configure_audio_encoder(encoder: &gst::Element, encoder_name: &str) {
    let bitrate = AUDIO_BITRATE_BPS.to_string();
    match encoder_name {
        "opusenc" => {
            set_if_present(encoder, "bitrate", &bitrate);
            set_if_present(encoder, "audio-type", "voice");
            debug!("Configured opusenc: bitrate={} bps, audio-type=voice", AUDIO_BITRATE_BPS);
        }

        "avenc_aac" | "fdkaacenc" | "voaacenc" | "vorbisenc" => {
            set_if_present(encoder, "bitrate", &bitrate);
            debug!("Configured {}: bitrate={} bps", encoder_name, AUDIO_BITRATE_BPS);
        }

        "lamemp3enc" => {
            // lamemp3enc takes kbit/s
            set_if_present(encoder, "target", "bitrate");
            set_if_present(encoder, "bitrate", &(AUDIO_BITRATE_BPS / 1000).to_string());
            set_if_present(encoder, "cbr", "true");
            debug!("Configured lamemp3enc: bitrate={} kbps", AUDIO_BITRATE_BPS / 1000);
        }

        _ => {
            debug!("Unknown audio encoder type, using default configuration");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_frame_sizes() {
        assert_eq!(AudioCodec::Aac.frame_size(), 1024);
        assert_eq!(AudioCodec::Mp3.frame_size(), 1152);
        assert_eq!(AudioCodec::Opus.frame_size(), 480);
        assert_eq!(AudioCodec::Vorbis.frame_size(), 1024);
    }

    #[test]
    fn test_mp3_takes_integer_samples() {
        assert_eq!(AudioCodec::Mp3.sample_format(), SampleFormat::S16);
        assert_eq!(AudioCodec::Opus.sample_format().bytes_per_sample(), 4);
    }

    #[test]
    fn test_aac_fallbacks() {
        assert_eq!(AudioCodec::Aac.encoders()[0], "avenc_aac");
        assert!(AudioCodec::Aac.caps_string().contains("audio/mpeg"));
    }
}
