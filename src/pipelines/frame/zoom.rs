// SPDX-License-Identifier: GPL-3.0-only

//! Digital zoom

use image::RgbImage;
use image::imageops::{self, FilterType};

/// Crop rectangle `(x, y, width, height)` for a zoom factor around `focus`
///
/// The rectangle is `frame / factor` in size, centered on the focus point and
/// shifted back inside the frame when it would cross an edge.
pub fn zoom_rect(width: u32, height: u32, factor: f32, focus: (f32, f32)) -> (u32, u32, u32, u32) {
    if factor <= 1.0 || width == 0 || height == 0 {
        return (0, 0, width, height);
    }
    let crop_w = ((width as f32 / factor).round() as u32).clamp(1, width);
    let crop_h = ((height as f32 / factor).round() as u32).clamp(1, height);

    let fx = focus.0.clamp(0.0, width as f32);
    let fy = focus.1.clamp(0.0, height as f32);
    let x = (fx - crop_w as f32 / 2.0).round().max(0.0) as u32;
    let y = (fy - crop_h as f32 / 2.0).round().max(0.0) as u32;

    (x.min(width - crop_w), y.min(height - crop_h), crop_w, crop_h)
}

/// Crop around `focus` and scale back to the full frame size
pub fn apply_zoom(frame: &RgbImage, factor: f32, focus: (f32, f32)) -> RgbImage {
    let (w, h) = frame.dimensions();
    let (x, y, cw, ch) = zoom_rect(w, h, factor, focus);
    if (cw, ch) == (w, h) {
        return frame.clone();
    }
    let cropped = imageops::crop_imm(frame, x, y, cw, ch).to_image();
    imageops::resize(&cropped, w, h, FilterType::Triangle)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_no_zoom_is_full_frame() {
        assert_eq!(zoom_rect(100, 50, 1.0, (50.0, 25.0)), (0, 0, 100, 50));
        assert_eq!(zoom_rect(100, 50, 0.5, (50.0, 25.0)), (0, 0, 100, 50));
    }

    #[test]
    fn test_centered_zoom() {
        assert_eq!(zoom_rect(100, 50, 2.0, (50.0, 25.0)), (25, 13, 50, 25));
    }

    #[test]
    fn test_rect_shifted_not_shrunk_at_edges() {
        assert_eq!(zoom_rect(100, 50, 2.0, (0.0, 0.0)), (0, 0, 50, 25));
        assert_eq!(zoom_rect(100, 50, 2.0, (100.0, 50.0)), (50, 25, 50, 25));
        // Focus far outside is clamped to the frame first
        assert_eq!(zoom_rect(100, 50, 4.0, (500.0, -20.0)), (75, 0, 25, 13));
    }

    #[test]
    fn test_zoomed_frame_keeps_dimensions() {
        let frame = RgbImage::new(64, 48);
        assert_eq!(apply_zoom(&frame, 3.0, (10.0, 10.0)).dimensions(), (64, 48));
    }
}
