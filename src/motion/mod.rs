// SPDX-License-Identifier: GPL-3.0-only

//! Motion engine
//!
//! A [`MotionEngine`] owns exactly one [`MotionDetector`] and any number of
//! post-processing stages. For every frame it:
//!
//! 1. Runs the detector, which produces a binary motion mask and a level
//! 2. ANDs the mask with the zone mask when zones are configured
//! 3. Runs the post-processing stages in their fixed order
//!
//! ```text
//! frame ─► detector ─► mask ─► & zones ─► level
//!                               │
//!                               └─► area/border highlight ─► grid ─► blobs
//! ```

pub mod background;
pub mod difference;
pub mod engine;
pub mod ops;
pub mod processing;
pub mod two_frames;
pub mod zones;

pub use background::BackgroundModelingDetector;
pub use difference::FrameDifferenceDetector;
pub use engine::MotionEngine;
pub use ops::DifferenceSettings;
pub use processing::{MotionProcessing, ProcessingKind};
pub use two_frames::TwoFramesDetector;
pub use zones::{ZoneMask, ZoneRect};

use image::{GrayImage, RgbImage};
use serde::{Deserialize, Serialize};

/// A stateful motion detection algorithm
pub trait MotionDetector: Send {
    /// Feed the next video frame
    fn process_frame(&mut self, frame: &RgbImage);

    /// Fraction of changed pixels in the last frame, in [0, 1]
    fn motion_level(&self) -> f64;

    /// Binary motion mask of the last frame, if any
    fn motion_frame(&self) -> Option<&GrayImage>;

    fn motion_frame_mut(&mut self) -> Option<&mut GrayImage>;

    /// Return to the initial state
    fn reset(&mut self);

    /// Install a fixed background; `false` when the algorithm has none
    fn set_background(&mut self, _frame: &RgbImage) -> bool {
        false
    }
}

/// Detector algorithm names as they appear in configuration
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DetectorKind {
    FrameDifference,
    #[default]
    TwoFrames,
    BackgroundModeling,
}

/// Motion engine configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MotionSettings {
    pub detector: DetectorKind,
    /// Difference in color instead of luma
    pub color: bool,
    pub difference_threshold: i32,
    pub suppress_noise: bool,
    pub frames_per_background_update: i32,
    pub ms_per_background_update: i32,
    pub processing: Vec<ProcessingKind>,
    pub grid_width: i32,
    pub grid_height: i32,
    pub grid_highlight_amount: f32,
    pub min_object_width: u32,
    pub min_object_height: u32,
}

impl Default for MotionSettings {
    fn default() -> Self {
        Self {
            detector: DetectorKind::default(),
            color: false,
            difference_threshold: ops::DEFAULT_DIFFERENCE_THRESHOLD as i32,
            suppress_noise: true,
            frames_per_background_update: 2,
            ms_per_background_update: 0,
            processing: Vec::new(),
            grid_width: processing::grid::DEFAULT_GRID_SIZE as i32,
            grid_height: processing::grid::DEFAULT_GRID_SIZE as i32,
            grid_highlight_amount: processing::grid::DEFAULT_HIGHLIGHT_AMOUNT,
            min_object_width: 10,
            min_object_height: 10,
        }
    }
}

/// Build the configured detector
pub fn create_detector(settings: &MotionSettings) -> Box<dyn MotionDetector> {
    let diff = DifferenceSettings::new(settings.difference_threshold, settings.suppress_noise);
    match settings.detector {
        DetectorKind::FrameDifference => Box::new(FrameDifferenceDetector::new(diff, settings.color)),
        DetectorKind::TwoFrames => Box::new(TwoFramesDetector::new(diff, settings.color)),
        DetectorKind::BackgroundModeling => {
            let mut detector = BackgroundModelingDetector::new(diff, settings.color);
            detector.set_frames_per_update(settings.frames_per_background_update);
            detector.set_ms_per_update(settings.ms_per_background_update);
            Box::new(detector)
        }
    }
}
