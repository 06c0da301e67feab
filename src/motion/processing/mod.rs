// SPDX-License-Identifier: GPL-3.0-only

//! Post-processing stages run on the video frame after detection

pub mod blobs;
pub mod grid;
pub mod highlight;

pub use blobs::BlobCounter;
pub use grid::GridMotionArea;
pub use highlight::{AreaHighlighting, BorderHighlighting};

use crate::errors::MotionError;
use image::{GrayImage, RgbImage};
use serde::{Deserialize, Serialize};

/// A stage that reads the motion mask and may draw onto the video frame
pub trait MotionProcessing: Send {
    fn process_frame(&mut self, video: &mut RgbImage, motion: &GrayImage) -> Result<(), MotionError>;

    fn reset(&mut self);

    /// Whether the video frame originated from a grayscale source
    fn set_grayscale(&mut self, _grayscale: bool) {}
}

/// Post-processing stage names as they appear in configuration
///
/// The declaration order is the order stages run in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProcessingKind {
    AreaHighlighting,
    BorderHighlighting,
    GridMotionArea,
    BlobCounting,
}
