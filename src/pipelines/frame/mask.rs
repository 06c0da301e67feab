// SPDX-License-Identifier: GPL-3.0-only

//! Static privacy mask
//!
//! Pixels under a non-zero mask pixel are blacked out. The mask image is
//! loaded once and resized to each new frame size with nearest-neighbour.

use crate::errors::PipelineError;
use image::imageops::{self, FilterType};
use image::{GrayImage, RgbImage};
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

/// Resolve a configured mask path against the masks directory
pub fn resolve_mask_path(configured: &str, masks_dir: Option<&Path>) -> Option<PathBuf> {
    let configured = configured.trim();
    if configured.is_empty() {
        return None;
    }
    let path = Path::new(configured);
    if path.is_absolute() {
        return Some(path.to_path_buf());
    }
    Some(match masks_dir {
        Some(dir) => dir.join(path),
        None => path.to_path_buf(),
    })
}

pub fn load_mask(path: &Path) -> Result<GrayImage, PipelineError> {
    image::open(path)
        .map(|img| img.to_luma8())
        .map_err(|e| PipelineError::Mask(format!("{}: {}", path.display(), e)))
}

#[derive(Debug, Default)]
pub struct FrameMask {
    source: Option<GrayImage>,
    resized: Option<GrayImage>,
}

impl FrameMask {
    /// Mask that never changes a frame
    pub fn none() -> Self {
        Self::default()
    }

    pub fn from_image(mask: GrayImage) -> Self {
        Self {
            source: Some(mask),
            resized: None,
        }
    }

    /// Load the configured mask; failures disable masking
    pub fn load(configured: &str, masks_dir: Option<&Path>) -> Self {
        let Some(path) = resolve_mask_path(configured, masks_dir) else {
            return Self::none();
        };
        match load_mask(&path) {
            Ok(mask) => {
                debug!(path = %path.display(), "Mask loaded");
                Self::from_image(mask)
            }
            Err(e) => {
                warn!(error = %e, "Mask unavailable, masking disabled");
                Self::none()
            }
        }
    }

    pub fn is_enabled(&self) -> bool {
        self.source.is_some()
    }

    pub fn apply(&mut self, frame: &mut RgbImage) {
        let Some(source) = self.source.as_ref() else {
            return;
        };
        let dims = frame.dimensions();
        if self.resized.as_ref().is_none_or(|m| m.dimensions() != dims) {
            let resized = if source.dimensions() == dims {
                source.clone()
            } else {
                imageops::resize(source, dims.0, dims.1, FilterType::Nearest)
            };
            self.resized = Some(resized);
        }
        let Some(mask) = self.resized.as_ref() else {
            return;
        };
        for (pixel, m) in frame.pixels_mut().zip(mask.pixels()) {
            if m.0[0] != 0 {
                pixel.0 = [0, 0, 0];
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{Luma, Rgb};

    #[test]
    fn test_masked_pixels_are_zeroed() {
        let mut mask = GrayImage::new(2, 1);
        mask.put_pixel(1, 0, Luma([255]));
        let mut frame = RgbImage::from_pixel(2, 1, Rgb([9, 9, 9]));

        FrameMask::from_image(mask).apply(&mut frame);
        assert_eq!(frame.get_pixel(0, 0), &Rgb([9, 9, 9]));
        assert_eq!(frame.get_pixel(1, 0), &Rgb([0, 0, 0]));
    }

    #[test]
    fn test_mask_resized_to_frame() {
        // Left half masked at 2x1, applied to a 4x2 frame
        let mut mask = GrayImage::new(2, 1);
        mask.put_pixel(0, 0, Luma([1]));
        let mut frame = RgbImage::from_pixel(4, 2, Rgb([5, 5, 5]));

        let mut fm = FrameMask::from_image(mask);
        fm.apply(&mut frame);
        assert_eq!(frame.get_pixel(1, 1), &Rgb([0, 0, 0]));
        assert_eq!(frame.get_pixel(2, 1), &Rgb([5, 5, 5]));
    }

    #[test]
    fn test_missing_mask_disables() {
        let fm = FrameMask::load("does-not-exist.png", Some(Path::new("/nonexistent")));
        assert!(!fm.is_enabled());
        assert!(!FrameMask::load("", None).is_enabled());
    }

    #[test]
    fn test_resolve_relative_path() {
        let resolved = resolve_mask_path("front.png", Some(Path::new("/masks")));
        assert_eq!(resolved, Some(PathBuf::from("/masks/front.png")));
        let absolute = resolve_mask_path("/tmp/m.png", Some(Path::new("/masks")));
        assert_eq!(absolute, Some(PathBuf::from("/tmp/m.png")));
    }
}
