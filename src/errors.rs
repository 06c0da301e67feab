// SPDX-License-Identifier: GPL-3.0-only

//! Error types for the monitoring pipeline

use crate::backends::camera::types::BackendError;
use std::fmt;

/// Result type alias using AppError
pub type AppResult<T> = Result<T, AppError>;

/// Result type alias for the encoder/muxer
pub type MediaResult<T> = Result<T, MediaError>;

/// Result type alias for the audio reader
pub type AudioResult<T> = Result<T, AudioError>;

/// Result type alias for per-frame processing
pub type PipelineResult<T> = Result<T, PipelineError>;

/// Result type alias for configuration loading
pub type ConfigResult<T> = Result<T, ConfigError>;

/// Top-level error type used by the binary
#[derive(Debug, Clone)]
pub enum AppError {
    /// Frame source errors
    Source(BackendError),
    /// Frame pipeline errors
    Pipeline(PipelineError),
    /// Encoder/muxer errors
    Media(MediaError),
    /// Audio reader errors
    Audio(AudioError),
    /// Configuration errors
    Config(ConfigError),
    /// Generic error with message
    Other(String),
}

/// Motion engine errors
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MotionError {
    /// Motion frame and video frame have different dimensions
    DimensionMismatch {
        motion: (u32, u32),
        video: (u32, u32),
    },
    /// Image does not have the layout an algorithm requires
    InvalidImage(String),
}

/// Per-frame transform errors
#[derive(Debug, Clone)]
pub enum PipelineError {
    /// Raw frame could not be decoded into a working image
    InvalidFrame(String),
    /// Mask image could not be loaded
    Mask(String),
    /// Motion engine failure
    Motion(MotionError),
    /// External frame hook failure
    Hook(String),
    /// Overlay rendering failure
    Overlay(String),
    /// A processing step or the frame hook panicked
    Panicked(String),
}

/// Audio decode/resample errors
#[derive(Debug, Clone)]
pub enum AudioError {
    /// GStreamer could not be initialized
    Init(String),
    /// Failed to open the source or find an audio stream
    Open(String),
    /// A filter element could not be created or configured
    Filter(String),
    /// Unrecoverable error while reading
    Read(String),
}

/// Encoder/muxer errors
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MediaError {
    /// Width or height is not a multiple of two
    InvalidDimensions { width: u32, height: u32 },
    /// Frame size differs from the size given at open
    FrameSizeMismatch {
        expected: (u32, u32),
        actual: (u32, u32),
    },
    /// Write attempted on a closed session
    NotOpen,
    /// Open attempted while a session is already open
    AlreadyOpen,
    /// Session has no video stream
    NoVideoStream,
    /// A previous fatal error made the session unusable
    SessionFailed,
    /// Codec could not be opened
    CodecOpen(String),
    /// No encoder element could be opened for the codec
    NoEncoder(String),
    /// Encoding failed
    Encode(String),
    /// Container write failed
    Container(String),
    /// No packet was written within the watchdog timeout
    TimedOut,
    /// The abort flag was raised
    Aborted,
    /// Allocation of a packet or frame failed
    ResourceExhausted(String),
    /// Filesystem error
    Io(String),
}

/// Configuration errors
#[derive(Debug, Clone)]
pub enum ConfigError {
    /// Reading or writing the file failed
    Io(String),
    /// JSON parse/serialize failure
    Parse(String),
    /// No configuration directory on this system
    NoConfigDir,
}

impl fmt::Display for AppError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AppError::Source(e) => write!(f, "Source error: {}", e),
            AppError::Pipeline(e) => write!(f, "Pipeline error: {}", e),
            AppError::Media(e) => write!(f, "Media error: {}", e),
            AppError::Audio(e) => write!(f, "Audio error: {}", e),
            AppError::Config(e) => write!(f, "Configuration error: {}", e),
            AppError::Other(msg) => write!(f, "{}", msg),
        }
    }
}

impl fmt::Display for MotionError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MotionError::DimensionMismatch { motion, video } => write!(
                f,
                "Motion frame {}x{} does not match video frame {}x{}",
                motion.0, motion.1, video.0, video.1
            ),
            MotionError::InvalidImage(msg) => write!(f, "Invalid image: {}", msg),
        }
    }
}

impl fmt::Display for PipelineError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PipelineError::InvalidFrame(msg) => write!(f, "Invalid frame: {}", msg),
            PipelineError::Mask(msg) => write!(f, "Mask error: {}", msg),
            PipelineError::Motion(e) => write!(f, "Error processing motion: {}", e),
            PipelineError::Hook(msg) => write!(f, "Frame hook error: {}", msg),
            PipelineError::Overlay(msg) => write!(f, "Overlay error: {}", msg),
            PipelineError::Panicked(msg) => write!(f, "Frame processing panicked: {}", msg),
        }
    }
}

impl fmt::Display for AudioError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AudioError::Init(msg) => write!(f, "Failed to initialize GStreamer: {}", msg),
            AudioError::Open(msg) => write!(f, "Failed to open input: {}", msg),
            AudioError::Filter(msg) => write!(f, "Failed to create the filter graph: {}", msg),
            AudioError::Read(msg) => write!(f, "Failed to read audio: {}", msg),
        }
    }
}

impl fmt::Display for MediaError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MediaError::InvalidDimensions { width, height } => write!(
                f,
                "Video file resolution must be a multiple of two ({}x{})",
                width, height
            ),
            MediaError::FrameSizeMismatch { expected, actual } => write!(
                f,
                "Frame size cannot change during recording ({}x{} != {}x{})",
                actual.0, actual.1, expected.0, expected.1
            ),
            MediaError::NotOpen => write!(f, "A media file was not opened yet"),
            MediaError::AlreadyOpen => write!(f, "A media file is already open"),
            MediaError::NoVideoStream => write!(f, "Video codec is not open"),
            MediaError::SessionFailed => write!(f, "Session failed and must be closed"),
            MediaError::CodecOpen(msg) => write!(f, "Cannot open codec: {}", msg),
            MediaError::NoEncoder(msg) => write!(f, "Failed opening any codec: {}", msg),
            MediaError::Encode(msg) => write!(f, "Encode error: {}", msg),
            MediaError::Container(msg) => write!(f, "Container error: {}", msg),
            MediaError::TimedOut => write!(f, "Writer timeout"),
            MediaError::Aborted => write!(f, "Writer aborted"),
            MediaError::ResourceExhausted(msg) => write!(f, "Out of resources: {}", msg),
            MediaError::Io(msg) => write!(f, "I/O error: {}", msg),
        }
    }
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConfigError::Io(msg) => write!(f, "I/O error: {}", msg),
            ConfigError::Parse(msg) => write!(f, "Parse error: {}", msg),
            ConfigError::NoConfigDir => write!(f, "No configuration directory available"),
        }
    }
}

impl std::error::Error for AppError {}
impl std::error::Error for MotionError {}
impl std::error::Error for PipelineError {}
impl std::error::Error for AudioError {}
impl std::error::Error for MediaError {}
impl std::error::Error for ConfigError {}

impl From<BackendError> for AppError {
    fn from(err: BackendError) -> Self {
        AppError::Source(err)
    }
}

impl From<PipelineError> for AppError {
    fn from(err: PipelineError) -> Self {
        AppError::Pipeline(err)
    }
}

impl From<MediaError> for AppError {
    fn from(err: MediaError) -> Self {
        AppError::Media(err)
    }
}

impl From<AudioError> for AppError {
    fn from(err: AudioError) -> Self {
        AppError::Audio(err)
    }
}

impl From<ConfigError> for AppError {
    fn from(err: ConfigError) -> Self {
        AppError::Config(err)
    }
}

impl From<String> for AppError {
    fn from(msg: String) -> Self {
        AppError::Other(msg)
    }
}

impl From<&str> for AppError {
    fn from(msg: &str) -> Self {
        AppError::Other(msg.to_string())
    }
}

impl From<MotionError> for PipelineError {
    fn from(err: MotionError) -> Self {
        PipelineError::Motion(err)
    }
}

impl From<BackendError> for PipelineError {
    fn from(err: BackendError) -> Self {
        PipelineError::InvalidFrame(err.to_string())
    }
}

impl From<std::io::Error> for MediaError {
    fn from(err: std::io::Error) -> Self {
        MediaError::Io(err.to_string())
    }
}

impl From<std::io::Error> for ConfigError {
    fn from(err: std::io::Error) -> Self {
        ConfigError::Io(err.to_string())
    }
}

impl From<serde_json::Error> for ConfigError {
    fn from(err: serde_json::Error) -> Self {
        ConfigError::Parse(err.to_string())
    }
}

impl From<std::io::Error> for AppError {
    fn from(err: std::io::Error) -> Self {
        AppError::Other(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_media_error_messages() {
        let err = MediaError::InvalidDimensions {
            width: 641,
            height: 480,
        };
        assert!(err.to_string().contains("multiple of two"));

        let err = MediaError::FrameSizeMismatch {
            expected: (640, 480),
            actual: (320, 240),
        };
        assert!(err.to_string().contains("320x240"));
    }

    #[test]
    fn test_conversions_into_app_error() {
        let app: AppError = MediaError::NotOpen.into();
        assert!(matches!(app, AppError::Media(MediaError::NotOpen)));

        let app: AppError = "boom".into();
        assert_eq!(app.to_string(), "boom");
    }
}
