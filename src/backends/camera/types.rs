// SPDX-License-Identifier: GPL-3.0-only
// Shared types for frame sources and the frame pipeline

//! Shared frame types

use gstreamer::buffer::{MappedBuffer, Readable};
use image::{GrayImage, RgbImage};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Instant;

/// Frame data storage - either pre-copied bytes or zero-copy GStreamer buffer
///
/// Frames handed to observers are read-only snapshots; cloning a frame only
/// bumps the reference count of the underlying pixels.
#[derive(Clone)]
pub enum FrameData {
    /// Pre-copied bytes (pipeline output, file sources, tests)
    Copied(Arc<[u8]>),
    /// Zero-copy mapped GStreamer buffer
    Mapped(Arc<MappedBuffer<Readable>>),
}

impl FrameData {
    /// Create FrameData from a mapped GStreamer buffer (zero-copy)
    pub fn from_mapped_buffer(buffer: MappedBuffer<Readable>) -> Self {
        FrameData::Mapped(Arc::new(buffer))
    }

    /// Get the length of the frame data in bytes
    pub fn len(&self) -> usize {
        match self {
            FrameData::Copied(data) => data.len(),
            FrameData::Mapped(buf) => buf.len(),
        }
    }

    /// Check if the frame data is empty
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl std::fmt::Debug for FrameData {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            FrameData::Copied(data) => write!(f, "FrameData::Copied({} bytes)", data.len()),
            FrameData::Mapped(buf) => write!(f, "FrameData::Mapped({} bytes)", buf.len()),
        }
    }
}

impl AsRef<[u8]> for FrameData {
    fn as_ref(&self) -> &[u8] {
        match self {
            FrameData::Copied(data) => data.as_ref(),
            FrameData::Mapped(buf) => buf.as_slice(),
        }
    }
}

impl std::ops::Deref for FrameData {
    type Target = [u8];

    fn deref(&self) -> &[u8] {
        self.as_ref()
    }
}

impl From<Vec<u8>> for FrameData {
    fn from(data: Vec<u8>) -> Self {
        FrameData::Copied(Arc::from(data.into_boxed_slice()))
    }
}

/// Pixel layouts accepted by the pipeline and the encoder's converter
///
/// All formats are 8 bits per channel.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum PixelFormat {
    /// Single channel luma
    Gray8,
    /// Packed R, G, B
    Rgb24,
    /// Packed B, G, R
    Bgr24,
    /// Packed R, G, B, A
    Rgba,
}

impl PixelFormat {
    /// Number of interleaved channels
    pub fn channels(&self) -> u32 {
        match self {
            PixelFormat::Gray8 => 1,
            PixelFormat::Rgb24 | PixelFormat::Bgr24 => 3,
            PixelFormat::Rgba => 4,
        }
    }

    /// Bits per channel
    pub fn depth_bits(&self) -> u32 {
        8
    }

    /// GStreamer raw video format name
    pub fn gst_format(&self) -> &'static str {
        match self {
            PixelFormat::Gray8 => "GRAY8",
            PixelFormat::Rgb24 => "RGB",
            PixelFormat::Bgr24 => "BGR",
            PixelFormat::Rgba => "RGBA",
        }
    }

    /// Parse a GStreamer raw video format name
    pub fn from_gst_format(name: &str) -> Option<Self> {
        match name {
            "GRAY8" => Some(PixelFormat::Gray8),
            "RGB" => Some(PixelFormat::Rgb24),
            "BGR" => Some(PixelFormat::Bgr24),
            "RGBA" | "RGBx" => Some(PixelFormat::Rgba),
            _ => None,
        }
    }
}

/// A single video frame
///
/// `stride` is the number of bytes between the starts of two rows and may be
/// larger than `width * channels` for buffers coming out of GStreamer.
#[derive(Debug, Clone)]
pub struct Frame {
    pub width: u32,
    pub height: u32,
    pub format: PixelFormat,
    pub stride: u32,
    pub data: FrameData,
    pub captured_at: Instant,
}

impl Frame {
    /// Create a tightly packed frame from raw bytes
    pub fn new(width: u32, height: u32, format: PixelFormat, data: Vec<u8>) -> BackendResult<Self> {
        let stride = width * format.channels();
        let expected = stride as usize * height as usize;
        if data.len() < expected {
            return Err(BackendError::FormatNotSupported(format!(
                "Frame data size {} is smaller than {}x{} {:?} ({} bytes)",
                data.len(),
                width,
                height,
                format,
                expected
            )));
        }
        Ok(Self {
            width,
            height,
            format,
            stride,
            data: data.into(),
            captured_at: Instant::now(),
        })
    }

    /// Wrap an RGB image without copying its pixels again
    pub fn from_rgb(image: RgbImage) -> Self {
        let (width, height) = image.dimensions();
        Self {
            width,
            height,
            format: PixelFormat::Rgb24,
            stride: width * 3,
            data: image.into_raw().into(),
            captured_at: Instant::now(),
        }
    }

    /// Wrap a grayscale image
    pub fn from_gray(image: GrayImage) -> Self {
        let (width, height) = image.dimensions();
        Self {
            width,
            height,
            format: PixelFormat::Gray8,
            stride: width,
            data: image.into_raw().into(),
            captured_at: Instant::now(),
        }
    }

    /// Number of interleaved channels
    pub fn channels(&self) -> u32 {
        self.format.channels()
    }

    /// Pixel bytes of row `y`, without stride padding
    pub fn row(&self, y: u32) -> &[u8] {
        let start = (y * self.stride) as usize;
        let len = (self.width * self.channels()) as usize;
        &self.data[start..start + len]
    }

    /// Check that the buffer actually holds `height` rows of `stride` bytes
    pub fn validate(&self) -> BackendResult<()> {
        let row_bytes = self.width * self.channels();
        if self.stride < row_bytes {
            return Err(BackendError::FormatNotSupported(format!(
                "Stride {} is smaller than row size {}",
                self.stride, row_bytes
            )));
        }
        let needed = if self.height == 0 {
            0
        } else {
            (self.stride as usize) * (self.height as usize - 1) + row_bytes as usize
        };
        if self.data.len() < needed {
            return Err(BackendError::FormatNotSupported(format!(
                "Frame data size {} is smaller than required {}",
                self.data.len(),
                needed
            )));
        }
        Ok(())
    }

    /// Copy the frame into an owned RGB image
    pub fn to_rgb_image(&self) -> BackendResult<RgbImage> {
        self.validate()?;
        let mut out = Vec::with_capacity((self.width * self.height * 3) as usize);
        for y in 0..self.height {
            let row = self.row(y);
            match self.format {
                PixelFormat::Rgb24 => out.extend_from_slice(row),
                PixelFormat::Bgr24 => {
                    for px in row.chunks_exact(3) {
                        out.extend_from_slice(&[px[2], px[1], px[0]]);
                    }
                }
                PixelFormat::Rgba => {
                    for px in row.chunks_exact(4) {
                        out.extend_from_slice(&px[..3]);
                    }
                }
                PixelFormat::Gray8 => {
                    for &v in row {
                        out.extend_from_slice(&[v, v, v]);
                    }
                }
            }
        }
        RgbImage::from_raw(self.width, self.height, out)
            .ok_or_else(|| BackendError::Other("Failed to build RGB image".into()))
    }
}

/// Fixed rotate/flip transform applied to every frame of a camera
///
/// Rotation is clockwise and applied before the horizontal flip. Unknown
/// configuration strings fall back to [`RotateFlip::None`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum RotateFlip {
    #[default]
    None,
    Rotate90,
    Rotate180,
    Rotate270,
    FlipX,
    Rotate90FlipX,
    Rotate180FlipX,
    Rotate270FlipX,
}

impl RotateFlip {
    /// Parse a rotate/flip mode name
    ///
    /// Accepts the `Rotate<deg>Flip<axis>` names including the aliases
    /// (`RotateNoneFlipY` is the same transform as `Rotate180FlipX`).
    pub fn from_name(name: &str) -> Self {
        match name.trim() {
            "Rotate90FlipNone" | "Rotate270FlipXY" => RotateFlip::Rotate90,
            "Rotate180FlipNone" | "RotateNoneFlipXY" => RotateFlip::Rotate180,
            "Rotate270FlipNone" | "Rotate90FlipXY" => RotateFlip::Rotate270,
            "RotateNoneFlipX" | "Rotate180FlipY" => RotateFlip::FlipX,
            "Rotate90FlipX" | "Rotate270FlipY" => RotateFlip::Rotate90FlipX,
            "Rotate180FlipX" | "RotateNoneFlipY" => RotateFlip::Rotate180FlipX,
            "Rotate270FlipX" | "Rotate90FlipY" => RotateFlip::Rotate270FlipX,
            _ => RotateFlip::None,
        }
    }

    /// Whether width and height are swapped by this transform
    pub fn swaps_dimensions(&self) -> bool {
        matches!(
            self,
            RotateFlip::Rotate90
                | RotateFlip::Rotate270
                | RotateFlip::Rotate90FlipX
                | RotateFlip::Rotate270FlipX
        )
    }

    /// Apply the transform to an RGB image
    pub fn apply(&self, image: RgbImage) -> RgbImage {
        use image::imageops::{flip_horizontal, rotate90, rotate180, rotate270};

        match self {
            RotateFlip::None => image,
            RotateFlip::Rotate90 => rotate90(&image),
            RotateFlip::Rotate180 => rotate180(&image),
            RotateFlip::Rotate270 => rotate270(&image),
            RotateFlip::FlipX => flip_horizontal(&image),
            RotateFlip::Rotate90FlipX => flip_horizontal(&rotate90(&image)),
            RotateFlip::Rotate180FlipX => flip_horizontal(&rotate180(&image)),
            RotateFlip::Rotate270FlipX => flip_horizontal(&rotate270(&image)),
        }
    }
}

/// Result type alias for frame source operations
pub type BackendResult<T> = Result<T, BackendError>;

/// Frame source errors
#[derive(Debug, Clone)]
pub enum BackendError {
    /// Failed to initialize the source
    InitializationFailed(String),
    /// Source is not running
    NotRunning,
    /// Format not supported
    FormatNotSupported(String),
    /// Other errors
    Other(String),
}

impl std::fmt::Display for BackendError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            BackendError::InitializationFailed(msg) => write!(f, "Initialization failed: {}", msg),
            BackendError::NotRunning => write!(f, "Source is not running"),
            BackendError::FormatNotSupported(msg) => write!(f, "Format not supported: {}", msg),
            BackendError::Other(msg) => write!(f, "Error: {}", msg),
        }
    }
}

impl std::error::Error for BackendError {}
