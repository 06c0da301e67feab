// SPDX-License-Identifier: GPL-3.0-only

//! GStreamer encoder detection
//!
//! Probes the encoder tables of [`VideoCodec`] and [`AudioCodec`] against the
//! installed GStreamer plugins.

use super::audio::AudioCodec;
use super::video::{HwPreference, VideoCodec, video_encoder_candidates};
use gstreamer as gst;
use tracing::{debug, info};

/// One probed encoder element
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EncoderAvailability {
    pub element: &'static str,
    /// Codec display name
    pub codec: String,
    pub hardware: bool,
    pub available: bool,
}

/// Check if a specific GStreamer element is available
pub fn is_element_available(element_name: &str) -> bool {
    gst::init().ok();
    gst::ElementFactory::find(element_name).is_some()
}

/// Probe every video encoder in the candidate tables
pub fn detect_video_encoders() -> Vec<EncoderAvailability> {
    let mut found: Vec<EncoderAvailability> = Vec::new();
    for codec in VideoCodec::ALL {
        for candidate in video_encoder_candidates(codec, HwPreference::Auto) {
            let available = is_element_available(candidate.element);
            debug!(encoder = %candidate.element, available, "Probed video encoder");
            found.push(EncoderAvailability {
                element: candidate.element,
                codec: codec.to_string(),
                hardware: candidate.is_hardware(),
                available,
            });
        }
    }
    info!(
        available = found.iter().filter(|e| e.available).count(),
        total = found.len(),
        "Detected video encoders"
    );
    found
}

/// Probe every audio encoder in the codec tables
pub fn detect_audio_encoders() -> Vec<EncoderAvailability> {
    let mut found: Vec<EncoderAvailability> = Vec::new();
    for codec in AudioCodec::ALL {
        for element in codec.encoders() {
            let available = is_element_available(element);
            debug!(encoder = %element, available, "Probed audio encoder");
            found.push(EncoderAvailability {
                element,
                codec: codec.to_string(),
                hardware: false,
                available,
            });
        }
    }
    info!(
        available = found.iter().filter(|e| e.available).count(),
        total = found.len(),
        "Detected audio encoders"
    );
    found
}
