// SPDX-License-Identifier: GPL-3.0-only

//! Pixel operations shared by the difference detectors

use image::{GrayImage, RgbImage};
use imageproc::distance_transform::Norm;

/// Default per-pixel difference threshold
pub const DEFAULT_DIFFERENCE_THRESHOLD: u8 = 15;

/// Threshold and noise suppression applied to a raw difference image
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DifferenceSettings {
    threshold: u8,
    pub suppress_noise: bool,
}

impl Default for DifferenceSettings {
    fn default() -> Self {
        Self {
            threshold: DEFAULT_DIFFERENCE_THRESHOLD,
            suppress_noise: true,
        }
    }
}

impl DifferenceSettings {
    pub fn new(threshold: i32, suppress_noise: bool) -> Self {
        let mut settings = Self {
            suppress_noise,
            ..Self::default()
        };
        settings.set_threshold(threshold);
        settings
    }

    pub fn threshold(&self) -> u8 {
        self.threshold
    }

    /// Set the threshold, clamped to [1, 255]
    pub fn set_threshold(&mut self, threshold: i32) {
        self.threshold = threshold.clamp(1, 255) as u8;
    }

    /// Binarize a difference image and optionally erode it once
    ///
    /// Returns the motion mask (0 or 255 per pixel) and its nonzero count.
    pub fn finish(&self, mut diff: GrayImage) -> (GrayImage, usize) {
        threshold_in_place(&mut diff, self.threshold);
        let mask = if self.suppress_noise {
            erode_3x3(&diff)
        } else {
            diff
        };
        let changed = count_nonzero(&mask);
        (mask, changed)
    }
}

/// Reference image a detector compares against
#[derive(Debug, Clone)]
pub enum Reference {
    Gray(GrayImage),
    Color(RgbImage),
}

impl Reference {
    /// Capture a frame as reference in gray or color mode
    pub fn capture(frame: &RgbImage, color: bool) -> Self {
        if color {
            Reference::Color(frame.clone())
        } else {
            Reference::Gray(to_gray(frame))
        }
    }

    pub fn dimensions(&self) -> (u32, u32) {
        match self {
            Reference::Gray(img) => img.dimensions(),
            Reference::Color(img) => img.dimensions(),
        }
    }

    /// Absolute difference against `frame`, reduced to a single channel
    pub fn difference(&self, frame: &RgbImage) -> GrayImage {
        match self {
            Reference::Gray(bg) => abs_diff_gray(&to_gray(frame), bg),
            Reference::Color(bg) => to_gray(&abs_diff_rgb(frame, bg)),
        }
    }

    /// Blend toward `frame`: `ref = (1 - alpha) * ref + alpha * frame`
    pub fn blend(&mut self, frame: &RgbImage, alpha: f64) {
        let alpha = alpha.clamp(0.0, 1.0);
        match self {
            Reference::Gray(bg) => {
                let gray = to_gray(frame);
                blend_bytes(&mut **bg, gray.as_raw(), alpha);
            }
            Reference::Color(bg) => blend_bytes(&mut **bg, frame.as_raw(), alpha),
        }
    }
}

/// Convert to single-channel luma
pub fn to_gray(frame: &RgbImage) -> GrayImage {
    image::imageops::grayscale(frame)
}

pub fn abs_diff_gray(a: &GrayImage, b: &GrayImage) -> GrayImage {
    let (width, height) = a.dimensions();
    let data = a
        .as_raw()
        .iter()
        .zip(b.as_raw().iter())
        .map(|(&x, &y)| x.abs_diff(y))
        .collect();
    GrayImage::from_raw(width, height, data).unwrap_or_else(|| GrayImage::new(width, height))
}

pub fn abs_diff_rgb(a: &RgbImage, b: &RgbImage) -> RgbImage {
    let (width, height) = a.dimensions();
    let data = a
        .as_raw()
        .iter()
        .zip(b.as_raw().iter())
        .map(|(&x, &y)| x.abs_diff(y))
        .collect();
    RgbImage::from_raw(width, height, data).unwrap_or_else(|| RgbImage::new(width, height))
}

/// Binary threshold: values strictly above `threshold` become 255, the rest 0
pub fn threshold_in_place(image: &mut GrayImage, threshold: u8) {
    for v in image.iter_mut() {
        *v = if *v > threshold { 255 } else { 0 };
    }
}

/// One erosion with a 3x3 square; pixels outside the image never erode
pub fn erode_3x3(mask: &GrayImage) -> GrayImage {
    imageproc::morphology::erode(mask, Norm::LInf, 1)
}

pub fn count_nonzero(mask: &GrayImage) -> usize {
    mask.as_raw().iter().filter(|&&v| v != 0).count()
}

/// Weighted running average with rounding, matching 8-bit saturating blends
fn blend_bytes(dst: &mut [u8], src: &[u8], alpha: f64) {
    let keep = 1.0 - alpha;
    for (d, &s) in dst.iter_mut().zip(src.iter()) {
        let v = keep * f64::from(*d) + alpha * f64::from(s);
        *d = v.round().clamp(0.0, 255.0) as u8;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_threshold_clamped() {
        let mut settings = DifferenceSettings::default();
        assert_eq!(settings.threshold(), 15);
        settings.set_threshold(0);
        assert_eq!(settings.threshold(), 1);
        settings.set_threshold(1000);
        assert_eq!(settings.threshold(), 255);
    }

    #[test]
    fn test_erode_removes_isolated_pixel() {
        let mut mask = GrayImage::new(5, 5);
        mask.put_pixel(2, 2, image::Luma([255]));
        let eroded = erode_3x3(&mask);
        assert_eq!(count_nonzero(&eroded), 0);
    }

    #[test]
    fn test_erode_keeps_full_frame() {
        let mask = GrayImage::from_pixel(4, 4, image::Luma([255]));
        let eroded = erode_3x3(&mask);
        assert_eq!(count_nonzero(&eroded), 16);
    }

    #[test]
    fn test_color_difference_reduced_to_luma() {
        let a = RgbImage::from_pixel(2, 2, image::Rgb([0, 0, 0]));
        let b = RgbImage::from_pixel(2, 2, image::Rgb([200, 200, 200]));
        let reference = Reference::capture(&a, true);
        let diff = reference.difference(&b);
        assert!(diff.as_raw().iter().all(|&v| v >= 199));
    }

    #[test]
    fn test_blend_moves_toward_frame() {
        let bg = RgbImage::from_pixel(1, 1, image::Rgb([0, 0, 0]));
        let frame = RgbImage::from_pixel(1, 1, image::Rgb([200, 200, 200]));
        let mut reference = Reference::capture(&bg, false);
        reference.blend(&frame, 0.05);
        match reference {
            Reference::Gray(img) => assert_eq!(img.get_pixel(0, 0)[0], 10),
            Reference::Color(_) => panic!("expected gray reference"),
        }
    }
}
