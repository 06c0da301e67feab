// SPDX-License-Identifier: GPL-3.0-only

//! Media encoder selection and configuration
//!
//! This module provides the encoder tables the writer walks through:
//! - Hardware encoder priority per vendor, software last
//! - Per-element quality configuration
//! - Encoder detection for the `encoders` command

pub mod audio;
pub mod detection;
pub mod video;

use gstreamer as gst;
use gstreamer::prelude::*;

pub use audio::{AudioCodec, SampleFormat};
pub use detection::{EncoderAvailability, detect_audio_encoders, detect_video_encoders};
pub use video::{
    EncoderCandidate, HwPreference, HwVendor, RawVideoFormat, VideoCodec, VideoEncoderTuning,
    video_encoder_candidates,
};

/// Set a property from its string form when the element has it
pub(crate) fn set_if_present(element: &gst::Element, property: &str, value: &str) {
    if element.has_property(property) {
        element.set_property_from_str(property, value);
    }
}
