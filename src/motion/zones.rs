// SPDX-License-Identifier: GPL-3.0-only

//! Motion zones and their rasterized mask

use image::{GrayImage, Luma};
use serde::{Deserialize, Serialize};

/// Motion-sensitive rectangle in percent of the frame
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ZoneRect {
    pub left: f32,
    pub top: f32,
    pub width: f32,
    pub height: f32,
}

impl ZoneRect {
    pub fn new(left: f32, top: f32, width: f32, height: f32) -> Self {
        Self {
            left,
            top,
            width,
            height,
        }
    }

    /// Whole-frame zone
    pub fn full() -> Self {
        Self::new(0.0, 0.0, 100.0, 100.0)
    }

    /// Pixel rectangle `(x0, y0, x1, y1)` (exclusive end) intersected with the frame
    pub fn to_pixels(&self, width: u32, height: u32) -> Option<(u32, u32, u32, u32)> {
        let sx = width as f32 / 100.0;
        let sy = height as f32 / 100.0;
        let x = (self.left * sx).round() as i64;
        let y = (self.top * sy).round() as i64;
        let w = (self.width * sx).round() as i64;
        let h = (self.height * sy).round() as i64;

        let x0 = x.clamp(0, width as i64);
        let y0 = y.clamp(0, height as i64);
        let x1 = (x + w).clamp(0, width as i64);
        let y1 = (y + h).clamp(0, height as i64);
        if x1 <= x0 || y1 <= y0 {
            return None;
        }
        Some((x0 as u32, y0 as u32, x1 as u32, y1 as u32))
    }
}

/// Binary mask of all zones at one resolution
#[derive(Debug, Clone)]
pub struct ZoneMask {
    mask: GrayImage,
    area: usize,
}

impl ZoneMask {
    /// Rasterize zones into a fresh mask
    ///
    /// The area is the number of covered pixels, so overlaps count once.
    pub fn build(zones: &[ZoneRect], width: u32, height: u32) -> Self {
        let mut mask = GrayImage::new(width, height);
        for zone in zones {
            if let Some((x0, y0, x1, y1)) = zone.to_pixels(width, height) {
                for y in y0..y1 {
                    for x in x0..x1 {
                        mask.put_pixel(x, y, Luma([255]));
                    }
                }
            }
        }
        let area = mask.as_raw().iter().filter(|&&v| v != 0).count();
        Self { mask, area }
    }

    pub fn dimensions(&self) -> (u32, u32) {
        self.mask.dimensions()
    }

    pub fn area(&self) -> usize {
        self.area
    }

    /// AND the mask into `motion` and return the surviving pixel count
    pub fn apply(&self, motion: &mut GrayImage) -> usize {
        let mut count = 0;
        for (m, z) in motion.iter_mut().zip(self.mask.as_raw().iter()) {
            *m &= *z;
            if *m != 0 {
                count += 1;
            }
        }
        count
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_zone_to_pixels_rounds() {
        let zone = ZoneRect::new(10.0, 0.0, 50.0, 100.0);
        assert_eq!(zone.to_pixels(40, 10), Some((4, 0, 24, 10)));
    }

    #[test]
    fn test_zone_outside_frame_is_dropped() {
        let zone = ZoneRect::new(120.0, 0.0, 10.0, 10.0);
        assert_eq!(zone.to_pixels(100, 100), None);
    }

    #[test]
    fn test_overlapping_zones_count_once() {
        let zones = [
            ZoneRect::new(0.0, 0.0, 50.0, 100.0),
            ZoneRect::new(25.0, 0.0, 50.0, 100.0),
        ];
        let mask = ZoneMask::build(&zones, 100, 10);
        assert_eq!(mask.area(), 75 * 10);
    }
}
