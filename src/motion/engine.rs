// SPDX-License-Identifier: GPL-3.0-only

//! Detector + zones + post-processing for one camera

use super::processing::{
    AreaHighlighting, BlobCounter, BorderHighlighting, GridMotionArea, MotionProcessing,
    ProcessingKind,
};
use super::zones::{ZoneMask, ZoneRect};
use super::{MotionDetector, MotionSettings, create_detector};
use crate::errors::MotionError;
use image::RgbImage;
use tracing::debug;

/// Per-camera motion engine
///
/// Owned by exactly one frame pipeline; nothing in here is shared between
/// cameras.
pub struct MotionEngine {
    detector: Option<Box<dyn MotionDetector>>,
    area: Option<AreaHighlighting>,
    border: Option<BorderHighlighting>,
    grid: Option<GridMotionArea>,
    blobs: Option<BlobCounter>,
    zones: Vec<ZoneRect>,
    zone_mask: Option<ZoneMask>,
    grayscale_source: bool,
}

impl MotionEngine {
    pub fn new(detector: Box<dyn MotionDetector>) -> Self {
        Self {
            detector: Some(detector),
            area: None,
            border: None,
            grid: None,
            blobs: None,
            zones: Vec::new(),
            zone_mask: None,
            grayscale_source: false,
        }
    }

    /// Engine that never reports motion
    pub fn disabled() -> Self {
        let mut engine = Self::new(create_detector(&MotionSettings::default()));
        engine.detector = None;
        engine
    }

    pub fn from_settings(settings: &MotionSettings) -> Self {
        let mut engine = Self::new(create_detector(settings));
        let mut kinds = settings.processing.clone();
        kinds.sort();
        kinds.dedup();
        for kind in kinds {
            match kind {
                ProcessingKind::AreaHighlighting => engine.area = Some(AreaHighlighting::default()),
                ProcessingKind::BorderHighlighting => {
                    engine.border = Some(BorderHighlighting::default())
                }
                ProcessingKind::GridMotionArea => {
                    let mut grid = GridMotionArea::new(settings.grid_width, settings.grid_height);
                    grid.highlight_amount = settings.grid_highlight_amount;
                    engine.grid = Some(grid);
                }
                ProcessingKind::BlobCounting => {
                    engine.blobs = Some(BlobCounter::new(
                        settings.min_object_width,
                        settings.min_object_height,
                    ))
                }
            }
        }
        debug!(
            detector = ?settings.detector,
            processing = ?settings.processing,
            "Motion engine created"
        );
        engine
    }

    pub fn with_processing(mut self, kind: ProcessingKind) -> Self {
        match kind {
            ProcessingKind::AreaHighlighting => self.area = Some(AreaHighlighting::default()),
            ProcessingKind::BorderHighlighting => self.border = Some(BorderHighlighting::default()),
            ProcessingKind::GridMotionArea => self.grid = Some(GridMotionArea::default()),
            ProcessingKind::BlobCounting => self.blobs = Some(BlobCounter::default()),
        }
        self
    }

    /// Replace the motion zones; an empty list means the whole frame
    pub fn set_zones(&mut self, zones: Vec<ZoneRect>) {
        self.zones = zones;
        self.zone_mask = None;
    }

    pub fn zones(&self) -> &[ZoneRect] {
        &self.zones
    }

    pub fn zone_mask(&self) -> Option<&ZoneMask> {
        self.zone_mask.as_ref()
    }

    /// Mark frames as coming from a grayscale source
    pub fn set_grayscale_source(&mut self, grayscale: bool) {
        self.grayscale_source = grayscale;
    }

    pub fn detector(&self) -> Option<&dyn MotionDetector> {
        self.detector.as_deref()
    }

    pub fn detector_mut(&mut self) -> Option<&mut (dyn MotionDetector + 'static)> {
        self.detector.as_deref_mut()
    }

    pub fn grid(&self) -> Option<&GridMotionArea> {
        self.grid.as_ref()
    }

    pub fn blobs(&self) -> Option<&BlobCounter> {
        self.blobs.as_ref()
    }

    /// Run detection on `frame` and draw post-processing onto it
    ///
    /// Returns the motion level over the zone area when zones are set,
    /// otherwise over the full frame.
    pub fn process_frame(&mut self, frame: &mut RgbImage) -> Result<f64, MotionError> {
        let Some(detector) = self.detector.as_mut() else {
            return Ok(0.0);
        };

        let dims = frame.dimensions();
        if !self.zones.is_empty()
            && self.zone_mask.as_ref().is_none_or(|m| m.dimensions() != dims)
        {
            let rebuilt = ZoneMask::build(&self.zones, dims.0, dims.1);
            debug!(width = dims.0, height = dims.1, area = rebuilt.area(), "Zone mask rebuilt");
            self.zone_mask = Some(rebuilt);
        }

        detector.process_frame(frame);
        let mut level = detector.motion_level();

        if let (Some(zone_mask), Some(motion)) = (&self.zone_mask, detector.motion_frame_mut()) {
            if zone_mask.dimensions() == motion.dimensions() {
                let changed = zone_mask.apply(motion);
                level = if zone_mask.area() == 0 {
                    0.0
                } else {
                    changed as f64 / zone_mask.area() as f64
                };
            }
        }

        let Some(motion) = detector.motion_frame() else {
            return Ok(level);
        };
        let grayscale = self.grayscale_source;
        let stages: [Option<&mut dyn MotionProcessing>; 4] = [
            self.area.as_mut().map(|s| s as &mut dyn MotionProcessing),
            self.border.as_mut().map(|s| s as &mut dyn MotionProcessing),
            self.grid.as_mut().map(|s| s as &mut dyn MotionProcessing),
            self.blobs.as_mut().map(|s| s as &mut dyn MotionProcessing),
        ];
        for stage in stages.into_iter().flatten() {
            stage.set_grayscale(grayscale);
            stage.process_frame(frame, motion)?;
        }
        Ok(level)
    }

    /// Install a manual background on detectors that support one
    pub fn set_background(&mut self, frame: &RgbImage) -> bool {
        self.detector
            .as_mut()
            .is_some_and(|detector| detector.set_background(frame))
    }

    pub fn reset(&mut self) {
        if let Some(detector) = self.detector.as_mut() {
            detector.reset();
        }
        if let Some(s) = self.area.as_mut() {
            s.reset();
        }
        if let Some(s) = self.border.as_mut() {
            s.reset();
        }
        if let Some(s) = self.grid.as_mut() {
            s.reset();
        }
        if let Some(s) = self.blobs.as_mut() {
            s.reset();
        }
        self.zone_mask = None;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::motion::DetectorKind;

    #[test]
    fn test_disabled_engine_reports_zero() {
        let mut engine = MotionEngine::disabled();
        let mut frame = RgbImage::new(4, 4);
        assert_eq!(engine.process_frame(&mut frame).unwrap(), 0.0);
    }

    #[test]
    fn test_processing_order_is_fixed() {
        let settings = MotionSettings {
            processing: vec![
                ProcessingKind::BlobCounting,
                ProcessingKind::GridMotionArea,
                ProcessingKind::BlobCounting,
            ],
            ..MotionSettings::default()
        };
        let engine = MotionEngine::from_settings(&settings);
        assert!(engine.grid().is_some());
        assert!(engine.blobs().is_some());
    }

    #[test]
    fn test_zone_mask_rebuilt_on_dimension_change() {
        let settings = MotionSettings {
            detector: DetectorKind::FrameDifference,
            ..MotionSettings::default()
        };
        let mut engine = MotionEngine::from_settings(&settings);
        engine.set_zones(vec![ZoneRect::new(0.0, 0.0, 50.0, 100.0)]);
        engine.process_frame(&mut RgbImage::new(8, 8)).unwrap();
        assert_eq!(engine.zone_mask().map(|m| m.area()), Some(32));
        engine.process_frame(&mut RgbImage::new(10, 10)).unwrap();
        assert_eq!(engine.zone_mask().map(|m| m.area()), Some(50));
    }
}
