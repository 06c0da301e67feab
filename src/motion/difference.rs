// SPDX-License-Identifier: GPL-3.0-only

//! Frame-difference detector against a fixed background

use super::MotionDetector;
use super::ops::{DifferenceSettings, Reference};
use image::{GrayImage, RgbImage};
use tracing::debug;

/// Compares each frame with a background captured on the first frame or set manually
///
/// A manually installed background survives [`MotionDetector::reset`]; a
/// dimension change always replaces it with the incoming frame.
#[derive(Debug, Clone)]
pub struct FrameDifferenceDetector {
    settings: DifferenceSettings,
    color: bool,
    background: Option<Reference>,
    manual_background: bool,
    motion_frame: Option<GrayImage>,
    pixels_changed: usize,
}

impl FrameDifferenceDetector {
    pub fn new(settings: DifferenceSettings, color: bool) -> Self {
        Self {
            settings,
            color,
            background: None,
            manual_background: false,
            motion_frame: None,
            pixels_changed: 0,
        }
    }

    pub fn settings_mut(&mut self) -> &mut DifferenceSettings {
        &mut self.settings
    }

    /// Install a background frame, discarding any previous one
    pub fn set_background(&mut self, frame: &RgbImage) {
        self.reset_with(true);
        self.background = Some(Reference::capture(frame, self.color));
        self.manual_background = true;
        debug!(
            width = frame.width(),
            height = frame.height(),
            "Manual background installed"
        );
    }

    pub fn has_manual_background(&self) -> bool {
        self.manual_background
    }

    fn reset_with(&mut self, force: bool) {
        if force || !self.manual_background {
            self.background = None;
            self.manual_background = false;
        }
        self.motion_frame = None;
        self.pixels_changed = 0;
    }

    fn cold_start(&mut self, frame: &RgbImage) {
        self.background = Some(Reference::capture(frame, self.color));
        self.motion_frame = Some(GrayImage::new(frame.width(), frame.height()));
        self.pixels_changed = 0;
    }
}

impl MotionDetector for FrameDifferenceDetector {
    fn process_frame(&mut self, frame: &RgbImage) {
        let Some(background) = &self.background else {
            self.cold_start(frame);
            return;
        };

        if background.dimensions() != frame.dimensions() {
            self.reset_with(true);
            self.cold_start(frame);
            return;
        }

        let diff = background.difference(frame);
        let (mask, changed) = self.settings.finish(diff);
        self.motion_frame = Some(mask);
        self.pixels_changed = changed;
    }

    fn motion_level(&self) -> f64 {
        level_of(self.motion_frame.as_ref(), self.pixels_changed)
    }

    fn motion_frame(&self) -> Option<&GrayImage> {
        self.motion_frame.as_ref()
    }

    fn motion_frame_mut(&mut self) -> Option<&mut GrayImage> {
        self.motion_frame.as_mut()
    }

    fn reset(&mut self) {
        self.reset_with(false);
    }

    fn set_background(&mut self, frame: &RgbImage) -> bool {
        FrameDifferenceDetector::set_background(self, frame);
        true
    }
}

/// Changed pixels over frame area; zero without a motion frame
pub(crate) fn level_of(motion_frame: Option<&GrayImage>, changed: usize) -> f64 {
    match motion_frame {
        Some(mask) if mask.width() > 0 && mask.height() > 0 => {
            changed as f64 / (mask.width() as f64 * mask.height() as f64)
        }
        _ => 0.0,
    }
}
