// SPDX-License-Identifier: GPL-3.0-only

//! Fisheye lens correction
//!
//! Equidistant lens model: a ray at angle `θ` from the optical axis lands at
//! radius `f·θ` on the sensor. For each output pixel of the rectilinear view
//! (focal `f·scale`) the source radius is `f·atan(r)`, where `r` is the
//! output radius normalized by the target focal.

use image::{Rgb, RgbImage};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FisheyeSettings {
    pub enabled: bool,
    /// Lens focal length in pixels
    pub focal_length: f32,
    pub scale: f32,
    pub offset_x: f32,
    pub offset_y: f32,
}

impl Default for FisheyeSettings {
    fn default() -> Self {
        Self {
            enabled: false,
            focal_length: 300.0,
            scale: 1.0,
            offset_x: 0.0,
            offset_y: 0.0,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
struct MapKey {
    width: u32,
    height: u32,
    focal_length: f32,
    scale: f32,
    offset_x: f32,
    offset_y: f32,
}

/// Precomputed source coordinate per output pixel
#[derive(Debug, Clone)]
pub struct RemapTable {
    key: MapKey,
    coords: Vec<(f32, f32)>,
}

impl RemapTable {
    pub fn build(width: u32, height: u32, settings: &FisheyeSettings) -> Self {
        let f = settings.focal_length.max(1.0);
        let target = (f * settings.scale).max(1e-3);
        let cx = width as f32 / 2.0 + settings.offset_x;
        let cy = height as f32 / 2.0 + settings.offset_y;

        let mut coords = Vec::with_capacity(width as usize * height as usize);
        for y in 0..height {
            for x in 0..width {
                let dx = x as f32 - cx;
                let dy = y as f32 - cy;
                let dist = (dx * dx + dy * dy).sqrt();
                if dist < f32::EPSILON {
                    coords.push((cx, cy));
                    continue;
                }
                let source_radius = f * (dist / target).atan();
                let k = source_radius / dist;
                coords.push((cx + dx * k, cy + dy * k));
            }
        }

        Self {
            key: MapKey {
                width,
                height,
                focal_length: settings.focal_length,
                scale: settings.scale,
                offset_x: settings.offset_x,
                offset_y: settings.offset_y,
            },
            coords,
        }
    }

    fn matches(&self, width: u32, height: u32, settings: &FisheyeSettings) -> bool {
        self.key.width == width
            && self.key.height == height
            && self.key.focal_length == settings.focal_length
            && self.key.scale == settings.scale
            && self.key.offset_x == settings.offset_x
            && self.key.offset_y == settings.offset_y
    }

    pub fn source_of(&self, x: u32, y: u32) -> (f32, f32) {
        self.coords[(y * self.key.width + x) as usize]
    }

    pub fn remap(&self, src: &RgbImage) -> RgbImage {
        let (w, h) = src.dimensions();
        RgbImage::from_fn(w, h, |x, y| {
            let (sx, sy) = self.coords[(y * w + x) as usize];
            sample_bilinear(src, sx, sy)
        })
    }
}

/// Bilinear sample; black outside the image
fn sample_bilinear(src: &RgbImage, x: f32, y: f32) -> Rgb<u8> {
    let (w, h) = src.dimensions();
    if x < 0.0 || y < 0.0 || x > (w - 1) as f32 || y > (h - 1) as f32 {
        return Rgb([0, 0, 0]);
    }
    let x0 = x.floor() as u32;
    let y0 = y.floor() as u32;
    let x1 = (x0 + 1).min(w - 1);
    let y1 = (y0 + 1).min(h - 1);
    let fx = x - x0 as f32;
    let fy = y - y0 as f32;

    let p00 = src.get_pixel(x0, y0).0;
    let p10 = src.get_pixel(x1, y0).0;
    let p01 = src.get_pixel(x0, y1).0;
    let p11 = src.get_pixel(x1, y1).0;

    let mut out = [0u8; 3];
    for c in 0..3 {
        let top = p00[c] as f32 * (1.0 - fx) + p10[c] as f32 * fx;
        let bottom = p01[c] as f32 * (1.0 - fx) + p11[c] as f32 * fx;
        out[c] = (top * (1.0 - fy) + bottom * fy).round().clamp(0.0, 255.0) as u8;
    }
    Rgb(out)
}

/// Remap table cache for one camera
#[derive(Debug, Default)]
pub struct FisheyeCorrector {
    table: Option<RemapTable>,
}

impl FisheyeCorrector {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn apply(&mut self, frame: &RgbImage, settings: &FisheyeSettings) -> RgbImage {
        let (w, h) = frame.dimensions();
        if w == 0 || h == 0 {
            return frame.clone();
        }
        if self.table.as_ref().is_none_or(|t| !t.matches(w, h, settings)) {
            self.table = Some(RemapTable::build(w, h, settings));
        }
        match self.table.as_ref() {
            Some(table) => table.remap(frame),
            None => frame.clone(),
        }
    }

    pub fn invalidate(&mut self) {
        self.table = None;
    }

    pub fn has_table(&self) -> bool {
        self.table.is_some()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_center_maps_to_itself() {
        let settings = FisheyeSettings::default();
        let table = RemapTable::build(10, 10, &settings);
        assert_eq!(table.source_of(5, 5), (5.0, 5.0));
    }

    #[test]
    fn test_source_radius_is_compressed() {
        let settings = FisheyeSettings {
            enabled: true,
            focal_length: 10.0,
            ..FisheyeSettings::default()
        };
        let table = RemapTable::build(40, 40, &settings);
        // Output radius 10 at focal 10: source radius 10*atan(1)
        let (sx, sy) = table.source_of(30, 20);
        assert!((sx - (20.0 + 10.0 * std::f32::consts::FRAC_PI_4)).abs() < 1e-3);
        assert!((sy - 20.0).abs() < 1e-3);
    }

    #[test]
    fn test_table_reused_until_settings_change() {
        let mut corrector = FisheyeCorrector::new();
        let frame = RgbImage::from_pixel(8, 8, Rgb([100, 100, 100]));
        let mut settings = FisheyeSettings::default();
        let out = corrector.apply(&frame, &settings);
        assert_eq!(out.dimensions(), (8, 8));
        assert!(corrector.has_table());

        settings.scale = 0.5;
        corrector.apply(&frame, &settings);
        assert!(corrector.table.as_ref().is_some_and(|t| t.key.scale == 0.5));

        corrector.invalidate();
        assert!(!corrector.has_table());
    }

    #[test]
    fn test_outside_source_is_black() {
        let src = RgbImage::from_pixel(2, 2, Rgb([255, 255, 255]));
        assert_eq!(sample_bilinear(&src, -1.0, 0.0), Rgb([0, 0, 0]));
        assert_eq!(sample_bilinear(&src, 0.5, 0.5), Rgb([255, 255, 255]));
    }
}
