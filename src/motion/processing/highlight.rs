// SPDX-License-Identifier: GPL-3.0-only

//! Motion area and border highlighting

use super::MotionProcessing;
use crate::errors::MotionError;
use image::{GrayImage, Rgb, RgbImage};
use imageproc::contours::find_contours;

/// Luma of a highlight color, used on grayscale video
pub fn highlight_luma(color: Rgb<u8>) -> u8 {
    let [r, g, b] = color.0;
    (0.2125 * f64::from(r) + 0.7154 * f64::from(g) + 0.0721 * f64::from(b)) as u8
}

fn check_dimensions(video: &RgbImage, motion: &GrayImage) -> Result<(), MotionError> {
    if video.dimensions() != motion.dimensions() {
        return Err(MotionError::DimensionMismatch {
            motion: motion.dimensions(),
            video: video.dimensions(),
        });
    }
    Ok(())
}

/// Recolors every motion pixel
#[derive(Debug, Clone)]
pub struct AreaHighlighting {
    pub color: Rgb<u8>,
    grayscale: bool,
}

impl Default for AreaHighlighting {
    fn default() -> Self {
        Self {
            color: Rgb([255, 0, 0]),
            grayscale: false,
        }
    }
}

impl MotionProcessing for AreaHighlighting {
    fn process_frame(&mut self, video: &mut RgbImage, motion: &GrayImage) -> Result<(), MotionError> {
        check_dimensions(video, motion)?;
        let fill = if self.grayscale {
            let l = highlight_luma(self.color);
            Rgb([l, l, l])
        } else {
            self.color
        };
        for (pixel, m) in video.pixels_mut().zip(motion.pixels()) {
            if m[0] != 0 {
                *pixel = fill;
            }
        }
        Ok(())
    }

    fn reset(&mut self) {}

    fn set_grayscale(&mut self, grayscale: bool) {
        self.grayscale = grayscale;
    }
}

/// Draws the boundary pixels of every contour in the motion mask
#[derive(Debug, Clone)]
pub struct BorderHighlighting {
    pub color: Rgb<u8>,
}

impl Default for BorderHighlighting {
    fn default() -> Self {
        Self {
            color: Rgb([255, 0, 0]),
        }
    }
}

impl MotionProcessing for BorderHighlighting {
    fn process_frame(&mut self, video: &mut RgbImage, motion: &GrayImage) -> Result<(), MotionError> {
        check_dimensions(video, motion)?;
        for contour in find_contours::<u32>(motion) {
            for p in contour.points {
                video.put_pixel(p.x, p.y, self.color);
            }
        }
        Ok(())
    }

    fn reset(&mut self) {}
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_area_highlight_recolors_motion_only() {
        let mut video = RgbImage::new(2, 1);
        let mut motion = GrayImage::new(2, 1);
        motion.put_pixel(1, 0, image::Luma([255]));
        AreaHighlighting::default()
            .process_frame(&mut video, &motion)
            .unwrap();
        assert_eq!(video.get_pixel(0, 0), &Rgb([0, 0, 0]));
        assert_eq!(video.get_pixel(1, 0), &Rgb([255, 0, 0]));
    }

    #[test]
    fn test_area_highlight_gray_uses_luma() {
        let mut highlight = AreaHighlighting::default();
        highlight.set_grayscale(true);
        let mut video = RgbImage::new(1, 1);
        let motion = GrayImage::from_pixel(1, 1, image::Luma([255]));
        highlight.process_frame(&mut video, &motion).unwrap();
        assert_eq!(video.get_pixel(0, 0), &Rgb([54, 54, 54]));
    }

    #[test]
    fn test_border_keeps_interior() {
        let mut video = RgbImage::new(9, 9);
        let mut motion = GrayImage::new(9, 9);
        for y in 2..7 {
            for x in 2..7 {
                motion.put_pixel(x, y, image::Luma([255]));
            }
        }
        BorderHighlighting::default()
            .process_frame(&mut video, &motion)
            .unwrap();
        assert_eq!(video.get_pixel(2, 2), &Rgb([255, 0, 0]));
        assert_eq!(video.get_pixel(4, 4), &Rgb([0, 0, 0]));
    }

    #[test]
    fn test_dimension_mismatch_rejected() {
        let mut video = RgbImage::new(4, 4);
        let motion = GrayImage::new(2, 2);
        assert!(
            AreaHighlighting::default()
                .process_frame(&mut video, &motion)
                .is_err()
        );
    }
}
