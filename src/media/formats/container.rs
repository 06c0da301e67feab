// SPDX-License-Identifier: GPL-3.0-only

//! Output container selection by file extension

use std::fmt;
use std::path::Path;

/// Container formats the writer can mux into
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum ContainerFormat {
    Mp4,
    QuickTime,
    #[default]
    Matroska,
    WebM,
    Avi,
    MpegTs,
    MpegPs,
    Flv,
}

impl ContainerFormat {
    /// Pick a container from the path's extension, Matroska when unknown
    pub fn from_path(path: &Path) -> Self {
        path.extension()
            .and_then(|ext| ext.to_str())
            .and_then(Self::from_extension)
            .unwrap_or_default()
    }

    pub fn from_extension(ext: &str) -> Option<Self> {
        match ext.to_ascii_lowercase().as_str() {
            "mp4" | "m4v" => Some(ContainerFormat::Mp4),
            "mov" => Some(ContainerFormat::QuickTime),
            "mkv" => Some(ContainerFormat::Matroska),
            "webm" => Some(ContainerFormat::WebM),
            "avi" => Some(ContainerFormat::Avi),
            "ts" => Some(ContainerFormat::MpegTs),
            "mpg" | "mpeg" => Some(ContainerFormat::MpegPs),
            "flv" => Some(ContainerFormat::Flv),
            _ => None,
        }
    }

    /// GStreamer muxer element
    pub fn muxer_name(&self) -> &'static str {
        match self {
            ContainerFormat::Mp4 => "mp4mux",
            ContainerFormat::QuickTime => "qtmux",
            ContainerFormat::Matroska => "matroskamux",
            ContainerFormat::WebM => "webmmux",
            ContainerFormat::Avi => "avimux",
            ContainerFormat::MpegTs => "mpegtsmux",
            ContainerFormat::MpegPs => "mpegpsmux",
            ContainerFormat::Flv => "flvmux",
        }
    }

    /// Canonical file extension
    pub fn extension(&self) -> &'static str {
        match self {
            ContainerFormat::Mp4 => "mp4",
            ContainerFormat::QuickTime => "mov",
            ContainerFormat::Matroska => "mkv",
            ContainerFormat::WebM => "webm",
            ContainerFormat::Avi => "avi",
            ContainerFormat::MpegTs => "ts",
            ContainerFormat::MpegPs => "mpg",
            ContainerFormat::Flv => "flv",
        }
    }

    /// Request pad templates for a video and an audio stream
    pub fn pad_templates(&self) -> (&'static str, &'static str) {
        match self {
            ContainerFormat::MpegTs | ContainerFormat::MpegPs => ("sink_%d", "sink_%d"),
            ContainerFormat::Flv => ("video", "audio"),
            _ => ("video_%u", "audio_%u"),
        }
    }
}

impl fmt::Display for ContainerFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.muxer_name())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_container_from_extension() {
        assert_eq!(ContainerFormat::from_path(Path::new("a/b.MP4")), ContainerFormat::Mp4);
        assert_eq!(ContainerFormat::from_path(Path::new("x.m4v")), ContainerFormat::Mp4);
        assert_eq!(ContainerFormat::from_path(Path::new("x.mpeg")), ContainerFormat::MpegPs);
        assert_eq!(ContainerFormat::from_path(Path::new("x.flv")).muxer_name(), "flvmux");
    }

    #[test]
    fn test_unknown_falls_back_to_matroska() {
        assert_eq!(ContainerFormat::from_path(Path::new("clip.xyz")), ContainerFormat::Matroska);
        assert_eq!(ContainerFormat::from_path(Path::new("noext")), ContainerFormat::Matroska);
    }
}
