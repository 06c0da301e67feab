// SPDX-License-Identifier: GPL-3.0-only

//! Two-frame difference detector

use super::MotionDetector;
use super::difference::level_of;
use super::ops::{DifferenceSettings, Reference};
use image::{GrayImage, RgbImage};

/// Compares each frame with the one before it
#[derive(Debug, Clone)]
pub struct TwoFramesDetector {
    settings: DifferenceSettings,
    color: bool,
    previous: Option<Reference>,
    motion_frame: Option<GrayImage>,
    pixels_changed: usize,
}

impl TwoFramesDetector {
    pub fn new(settings: DifferenceSettings, color: bool) -> Self {
        Self {
            settings,
            color,
            previous: None,
            motion_frame: None,
            pixels_changed: 0,
        }
    }

    pub fn settings_mut(&mut self) -> &mut DifferenceSettings {
        &mut self.settings
    }
}

impl MotionDetector for TwoFramesDetector {
    fn process_frame(&mut self, frame: &RgbImage) {
        let current = Reference::capture(frame, self.color);

        let Some(previous) = self.previous.take() else {
            self.previous = Some(current);
            self.motion_frame = Some(GrayImage::new(frame.width(), frame.height()));
            self.pixels_changed = 0;
            return;
        };

        if previous.dimensions() != frame.dimensions() {
            self.previous = Some(current);
            self.motion_frame = Some(GrayImage::new(frame.width(), frame.height()));
            self.pixels_changed = 0;
            return;
        }

        let diff = previous.difference(frame);
        let (mask, changed) = self.settings.finish(diff);
        self.motion_frame = Some(mask);
        self.pixels_changed = changed;
        self.previous = Some(current);
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
        self.previous = None;
        self.motion_frame = None;
        self.pixels_changed = 0;
    }
}
