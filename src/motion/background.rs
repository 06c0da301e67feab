// SPDX-License-Identifier: GPL-3.0-only

//! Adaptive background modeling detector
//!
//! The background is blended toward the current frame either every N frames
//! (`frames_per_update`, clamped to [1, 50]) or, when `ms_per_update` is
//! non-zero, once per elapsed period. In timer mode the blend weight is
//! `min(0.1 * updates, 1.0)` where `updates` is the number of whole periods
//! since the previous frame; leftover milliseconds carry over.

use super::MotionDetector;
use super::difference::level_of;
use super::ops::{DifferenceSettings, Reference};
use image::{GrayImage, RgbImage};
use std::time::Instant;

/// Blend weight used by frame-counter updates
const FRAME_COUNTER_ALPHA: f64 = 0.05;

#[derive(Debug, Clone)]
pub struct BackgroundModelingDetector {
    settings: DifferenceSettings,
    color: bool,
    background: Option<Reference>,
    motion_frame: Option<GrayImage>,
    pixels_changed: usize,
    frames_per_update: u32,
    frames_counter: u32,
    ms_per_update: u32,
    ms_left_unprocessed: u64,
    last_measurement: Option<Instant>,
}

impl BackgroundModelingDetector {
    pub fn new(settings: DifferenceSettings, color: bool) -> Self {
        Self {
            settings,
            color,
            background: None,
            motion_frame: None,
            pixels_changed: 0,
            frames_per_update: 2,
            frames_counter: 0,
            ms_per_update: 0,
            ms_left_unprocessed: 0,
            last_measurement: None,
        }
    }

    pub fn settings_mut(&mut self) -> &mut DifferenceSettings {
        &mut self.settings
    }

    pub fn frames_per_update(&self) -> u32 {
        self.frames_per_update
    }

    pub fn set_frames_per_update(&mut self, frames: i32) {
        self.frames_per_update = frames.clamp(1, 50) as u32;
    }

    pub fn ms_per_update(&self) -> u32 {
        self.ms_per_update
    }

    pub fn set_ms_per_update(&mut self, ms: i32) {
        self.ms_per_update = ms.clamp(0, 5000) as u32;
    }

    /// Process a frame observed at `now`
    pub fn process_frame_at(&mut self, frame: &RgbImage, now: Instant) {
        let needs_cold_start = self
            .background
            .as_ref()
            .is_none_or(|bg| bg.dimensions() != frame.dimensions());
        if needs_cold_start {
            self.reset();
            self.last_measurement = Some(now);
            self.background = Some(Reference::capture(frame, self.color));
            self.motion_frame = Some(GrayImage::new(frame.width(), frame.height()));
            return;
        }

        let alpha = self.update_weight(now);
        let Some(background) = self.background.as_mut() else {
            return;
        };
        if let Some(alpha) = alpha {
            background.blend(frame, alpha);
        }

        let diff = background.difference(frame);
        let (mask, changed) = self.settings.finish(diff);
        self.motion_frame = Some(mask);
        self.pixels_changed = changed;
    }

    /// Blend weight for this frame, or `None` when the background is kept
    fn update_weight(&mut self, now: Instant) -> Option<f64> {
        if self.ms_per_update == 0 {
            self.frames_counter += 1;
            if self.frames_counter >= self.frames_per_update {
                self.frames_counter = 0;
                return Some(FRAME_COUNTER_ALPHA);
            }
            return None;
        }

        let last = self.last_measurement.replace(now).unwrap_or(now);
        let elapsed = now.saturating_duration_since(last).as_millis() as u64;
        let ms = elapsed + self.ms_left_unprocessed;
        let period = u64::from(self.ms_per_update);
        self.ms_left_unprocessed = ms % period;
        let updates = ms / period;
        if updates > 0 {
            Some((0.1 * updates as f64).min(1.0))
        } else {
            None
        }
    }
}

impl MotionDetector for BackgroundModelingDetector {
    fn process_frame(&mut self, frame: &RgbImage) {
        self.process_frame_at(frame, Instant::now());
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
        self.background = None;
        self.motion_frame = None;
        self.frames_counter = 0;
        self.pixels_changed = 0;
        self.ms_left_unprocessed = 0;
    }
}
