// SPDX-License-Identifier: GPL-3.0-only

//! Video encoder tables with hardware acceleration priority
//!
//! For every codec the candidates are tried in this order:
//! - Hardware encoders of the preferred vendor(s), in vendor table order
//! - Software encoders, always last
//!
//! Each candidate carries the raw pixel layout it wants on its input.

use super::set_if_present;
use gstreamer as gst;
use serde::{Deserialize, Serialize};
use std::fmt;
use tracing::debug;

/// Video codecs the writer can produce
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum VideoCodec {
    H264,
    HEVC,
    AV1,
    VP8,
    VP9,
    MPEG1,
}

impl VideoCodec {
    pub const ALL: [VideoCodec; 6] = [
        VideoCodec::H264,
        VideoCodec::HEVC,
        VideoCodec::AV1,
        VideoCodec::VP8,
        VideoCodec::VP9,
        VideoCodec::MPEG1,
    ];

    /// Get the parser element name (if needed)
    pub fn parser_name(&self) -> Option<&'static str> {
        match self {
            VideoCodec::H264 => Some("h264parse"),
            VideoCodec::HEVC => Some("h265parse"),
            VideoCodec::AV1 => Some("av1parse"),
            VideoCodec::VP8 | VideoCodec::VP9 => None,
            VideoCodec::MPEG1 => Some("mpegvideoparse"),
        }
    }

    /// Software encoders in fallback order
    pub fn software_encoders(&self) -> &'static [&'static str] {
        match self {
            VideoCodec::H264 => &["x264enc", "openh264enc"],
            VideoCodec::HEVC => &["x265enc"],
            VideoCodec::AV1 => &["svtav1enc", "av1enc"],
            VideoCodec::VP8 => &["vp8enc"],
            VideoCodec::VP9 => &["vp9enc"],
            VideoCodec::MPEG1 => &["avenc_mpeg1video"],
        }
    }

    /// Hardware encoder element for a vendor, if the vendor supports this codec
    pub fn hardware_encoder(&self, vendor: HwVendor) -> Option<&'static str> {
        match (self, vendor) {
            (VideoCodec::H264, HwVendor::Nvidia) => Some("nvh264enc"),
            (VideoCodec::H264, HwVendor::QuickSync) => Some("qsvh264enc"),
            (VideoCodec::H264, HwVendor::Amd) => Some("amfh264enc"),
            (VideoCodec::H264, HwVendor::Vaapi) => Some("vah264enc"),
            (VideoCodec::HEVC, HwVendor::Nvidia) => Some("nvh265enc"),
            (VideoCodec::HEVC, HwVendor::QuickSync) => Some("qsvh265enc"),
            (VideoCodec::HEVC, HwVendor::Amd) => Some("amfh265enc"),
            (VideoCodec::HEVC, HwVendor::Vaapi) => Some("vah265enc"),
            (VideoCodec::AV1, HwVendor::Nvidia) => Some("nvav1enc"),
            (VideoCodec::AV1, HwVendor::QuickSync) => Some("qsvav1enc"),
            (VideoCodec::AV1, HwVendor::Amd) => Some("amfav1enc"),
            (VideoCodec::AV1, HwVendor::Vaapi) => Some("vaav1enc"),
            _ => None,
        }
    }
}

impl fmt::Display for VideoCodec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            VideoCodec::H264 => "H.264",
            VideoCodec::HEVC => "H.265",
            VideoCodec::AV1 => "AV1",
            VideoCodec::VP8 => "VP8",
            VideoCodec::VP9 => "VP9",
            VideoCodec::MPEG1 => "MPEG-1",
        };
        write!(f, "{}", name)
    }
}

/// Hardware encoder vendors
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum HwVendor {
    Nvidia,
    QuickSync,
    Amd,
    Vaapi,
}

impl HwVendor {
    pub const ALL: [HwVendor; 4] = [
        HwVendor::Nvidia,
        HwVendor::QuickSync,
        HwVendor::Amd,
        HwVendor::Vaapi,
    ];

    pub fn from_name(name: &str) -> Option<Self> {
        match name.trim().to_ascii_lowercase().as_str() {
            "nvidia" | "nvenc" => Some(HwVendor::Nvidia),
            "quicksync" | "qsv" | "intel" => Some(HwVendor::QuickSync),
            "amd" | "amf" => Some(HwVendor::Amd),
            "vaapi" | "va" => Some(HwVendor::Vaapi),
            _ => None,
        }
    }

    /// Raw layout this vendor's encoders want on input
    pub fn input_format(&self) -> RawVideoFormat {
        match self {
            HwVendor::QuickSync | HwVendor::Vaapi => RawVideoFormat::Nv12,
            HwVendor::Nvidia | HwVendor::Amd => RawVideoFormat::I420,
        }
    }
}

/// Which encoders to try before software
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum HwPreference {
    /// Every vendor in table order
    #[default]
    Auto,
    /// Only this vendor
    Vendor(HwVendor),
    /// No hardware encoders
    Software,
}

impl HwPreference {
    /// Parse `auto`, `software` or a vendor name; unknown names mean `auto`
    pub fn from_name(name: &str) -> Self {
        match name.trim().to_ascii_lowercase().as_str() {
            "" | "auto" => HwPreference::Auto,
            "software" | "none" | "cpu" => HwPreference::Software,
            other => HwVendor::from_name(other)
                .map(HwPreference::Vendor)
                .unwrap_or(HwPreference::Auto),
        }
    }

    fn vendors(&self) -> Vec<HwVendor> {
        match self {
            HwPreference::Auto => HwVendor::ALL.to_vec(),
            HwPreference::Vendor(vendor) => vec![*vendor],
            HwPreference::Software => Vec::new(),
        }
    }
}

/// Planar 4:2:0 layouts accepted by encoders
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RawVideoFormat {
    I420,
    Nv12,
}

impl RawVideoFormat {
    pub fn gst_format(&self) -> &'static str {
        match self {
            RawVideoFormat::I420 => "I420",
            RawVideoFormat::Nv12 => "NV12",
        }
    }

    /// Bytes of one frame
    pub fn frame_size(&self, width: u32, height: u32) -> usize {
        let luma = width as usize * height as usize;
        luma + 2 * (width.div_ceil(2) as usize * height.div_ceil(2) as usize)
    }
}

/// An encoder element to try
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EncoderCandidate {
    /// GStreamer element name
    pub element: &'static str,
    pub codec: VideoCodec,
    /// Vendor for hardware encoders
    pub vendor: Option<HwVendor>,
    pub input_format: RawVideoFormat,
}

impl EncoderCandidate {
    pub fn is_hardware(&self) -> bool {
        self.vendor.is_some()
    }
}

/// Encoders to try for `codec`, hardware first, software last
pub fn video_encoder_candidates(codec: VideoCodec, preference: HwPreference) -> Vec<EncoderCandidate> {
    let mut candidates: Vec<EncoderCandidate> = preference
        .vendors()
        .into_iter()
        .filter_map(|vendor| {
            codec.hardware_encoder(vendor).map(|element| EncoderCandidate {
                element,
                codec,
                vendor: Some(vendor),
                input_format: vendor.input_format(),
            })
        })
        .collect();

    candidates.extend(codec.software_encoders().iter().map(|element| EncoderCandidate {
        element,
        codec,
        vendor: None,
        input_format: RawVideoFormat::I420,
    }));
    candidates
}

/// Encoder tuning applied after the element is created
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct VideoEncoderTuning {
    /// CRF-like constant quality, lower is better
    pub quality: i32,
    /// GPU to run hardware encoders on
    pub gpu_index: u32,
    /// Keyframe interval in frames
    pub keyframe_interval: u32,
}

/// MPEG-1 has no constant-quality mode
const MPEG1_BITRATE_BPS: i32 = 700_000;

/// Configure encoder based on element name and tuning
pub fn configure_video_encoder(encoder: &gst::Element, encoder_name: &str, tuning: &VideoEncoderTuning) {
    let quality = tuning.quality.clamp(0, 51);
    let gop = tuning.keyframe_interval.max(1).to_string();

    match encoder_name {
        "x264enc" | "x265enc" => {
            set_if_present(encoder, "speed-preset", "veryfast");
            set_if_present(encoder, "tune", "zerolatency");
            set_if_present(encoder, "key-int-max", &gop);
            if encoder_name == "x264enc" {
                set_if_present(encoder, "pass", "quant");
                set_if_present(encoder, "quantizer", &quality.to_string());
            } else {
                set_if_present(encoder, "qp", &quality.to_string());
            }
            debug!(encoder = %encoder_name, crf = quality, "Configured software encoder");
        }

        "openh264enc" => {
            set_if_present(encoder, "rate-control", "quality");
            set_if_present(encoder, "usage-type", "camera");
            set_if_present(encoder, "gop-size", &gop);
            debug!("Configured openh264enc: rate-control=quality");
        }

        "nvh264enc" | "nvh265enc" | "nvav1enc" => {
            set_if_present(encoder, "rc-mode", "constqp");
            set_if_present(encoder, "qp-const", &quality.to_string());
            set_if_present(encoder, "cuda-device-id", &tuning.gpu_index.to_string());
            set_if_present(encoder, "gop-size", &gop);
            debug!(gpu = tuning.gpu_index, qp = quality, "Configured NVIDIA encoder");
        }

        "qsvh264enc" | "qsvh265enc" | "qsvav1enc" => {
            set_if_present(encoder, "rate-control", "icq");
            set_if_present(encoder, "icq-quality", &quality.to_string());
            set_if_present(encoder, "gop-size", &gop);
            debug!(qp = quality, "Configured Intel QSV encoder");
        }

        "amfh264enc" | "amfh265enc" | "amfav1enc" => {
            set_if_present(encoder, "rate-control", "cqp");
            set_if_present(encoder, "qp-i", &quality.to_string());
            set_if_present(encoder, "qp-p", &quality.to_string());
            set_if_present(encoder, "gop-size", &gop);
            debug!(qp = quality, "Configured AMD AMF encoder");
        }

        "vah264enc" | "vah265enc" | "vaav1enc" => {
            set_if_present(encoder, "rate-control", "cqp");
            set_if_present(encoder, "qpi", &quality.to_string());
            set_if_present(encoder, "key-int-max", &gop);
            debug!(qp = quality, "Configured VA-API encoder");
        }

        "svtav1enc" => {
            set_if_present(encoder, "crf", &quality.to_string());
            set_if_present(encoder, "preset", "10");
            debug!(crf = quality, "Configured svtav1enc");
        }

        "av1enc" => {
            set_if_present(encoder, "end-usage", "q");
            set_if_present(encoder, "cq-level", &quality.to_string());
            set_if_present(encoder, "cpu-used", "8");
            debug!(cq = quality, "Configured av1enc");
        }

        "vp8enc" | "vp9enc" => {
            set_if_present(encoder, "end-usage", "cq");
            set_if_present(encoder, "cq-level", &quality.to_string());
            set_if_present(encoder, "deadline", "1");
            set_if_present(encoder, "keyframe-max-dist", &gop);
            debug!(encoder = %encoder_name, cq = quality, "Configured libvpx encoder");
        }

        "avenc_mpeg1video" => {
            set_if_present(encoder, "bitrate", &MPEG1_BITRATE_BPS.to_string());
            set_if_present(encoder, "max-bframes", "0");
            set_if_present(encoder, "gop-size", &gop);
            debug!("Configured avenc_mpeg1video: bitrate=700 kbps, no B-frames");
        }

        _ => {
            debug!("Unknown encoder type, using default configuration");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_software_fallback_is_last() {
        let candidates = video_encoder_candidates(VideoCodec::H264, HwPreference::Auto);
        assert_eq!(candidates.len(), 6);
        assert!(candidates[..4].iter().all(|c| c.is_hardware()));
        assert_eq!(candidates[4].element, "x264enc");
        assert_eq!(candidates[5].element, "openh264enc");
    }

    #[test]
    fn test_vendor_preference_limits_hardware() {
        let candidates = video_encoder_candidates(
            VideoCodec::HEVC,
            HwPreference::Vendor(HwVendor::QuickSync),
        );
        let elements: Vec<_> = candidates.iter().map(|c| c.element).collect();
        assert_eq!(elements, vec!["qsvh265enc", "x265enc"]);
        assert_eq!(candidates[0].input_format, RawVideoFormat::Nv12);
    }

    #[test]
    fn test_software_preference_skips_hardware() {
        let candidates = video_encoder_candidates(VideoCodec::AV1, HwPreference::Software);
        assert!(candidates.iter().all(|c| !c.is_hardware()));
        let vp8 = video_encoder_candidates(VideoCodec::VP8, HwPreference::Auto);
        assert_eq!(vp8.len(), 1);
    }

    #[test]
    fn test_preference_names() {
        assert_eq!(HwPreference::from_name("nvidia"), HwPreference::Vendor(HwVendor::Nvidia));
        assert_eq!(HwPreference::from_name("software"), HwPreference::Software);
        assert_eq!(HwPreference::from_name("bogus"), HwPreference::Auto);
    }

    #[test]
    fn test_raw_frame_size() {
        assert_eq!(RawVideoFormat::I420.frame_size(4, 2), 8 + 4);
        assert_eq!(RawVideoFormat::Nv12.frame_size(640, 480), 640 * 480 * 3 / 2);
    }
}
