// SPDX-License-Identifier: GPL-3.0-only

//! Blob counting over the motion mask

use super::MotionProcessing;
use crate::errors::MotionError;
use image::{GrayImage, Rgb, RgbImage};
use imageproc::contours::{BorderType, find_contours};
use imageproc::drawing::draw_hollow_rect_mut;
use imageproc::rect::Rect;

/// Counts moving objects as external contours of the motion mask
///
/// Objects whose bounding box is smaller than the minimum width or height are
/// ignored.
#[derive(Debug, Clone)]
pub struct BlobCounter {
    pub min_width: u32,
    pub min_height: u32,
    pub highlight: bool,
    pub highlight_color: Rgb<u8>,
    rectangles: Vec<Rect>,
}

impl Default for BlobCounter {
    fn default() -> Self {
        Self::new(10, 10)
    }
}

impl BlobCounter {
    pub fn new(min_width: u32, min_height: u32) -> Self {
        Self {
            min_width,
            min_height,
            highlight: true,
            highlight_color: Rgb([255, 0, 0]),
            rectangles: Vec::new(),
        }
    }

    pub fn objects_count(&self) -> usize {
        self.rectangles.len()
    }

    pub fn object_rectangles(&self) -> &[Rect] {
        &self.rectangles
    }
}

/// Bounding boxes of top-level objects in a binary mask
pub fn external_bounding_boxes(mask: &GrayImage) -> Vec<Rect> {
    find_contours::<u32>(mask)
        .into_iter()
        .filter(|c| c.border_type == BorderType::Outer && c.parent.is_none())
        .filter_map(|c| {
            let min_x = c.points.iter().map(|p| p.x).min()?;
            let max_x = c.points.iter().map(|p| p.x).max()?;
            let min_y = c.points.iter().map(|p| p.y).min()?;
            let max_y = c.points.iter().map(|p| p.y).max()?;
            Some(Rect::at(min_x as i32, min_y as i32).of_size(max_x - min_x + 1, max_y - min_y + 1))
        })
        .collect()
}

impl MotionProcessing for BlobCounter {
    fn process_frame(&mut self, video: &mut RgbImage, motion: &GrayImage) -> Result<(), MotionError> {
        self.rectangles = external_bounding_boxes(motion)
            .into_iter()
            .filter(|r| r.width() >= self.min_width && r.height() >= self.min_height)
            .collect();

        if self.highlight {
            for rect in &self.rectangles {
                draw_hollow_rect_mut(video, *rect, self.highlight_color);
            }
        }
        Ok(())
    }

    fn reset(&mut self) {
        self.rectangles.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn fill(mask: &mut GrayImage, x0: u32, y0: u32, w: u32, h: u32) {
        for y in y0..y0 + h {
            for x in x0..x0 + w {
                mask.put_pixel(x, y, image::Luma([255]));
            }
        }
    }

    #[test]
    fn test_counts_objects_above_minimum() {
        let mut mask = GrayImage::new(64, 64);
        fill(&mut mask, 2, 2, 12, 12);
        fill(&mut mask, 30, 30, 20, 15);
        fill(&mut mask, 55, 2, 3, 3);

        let mut counter = BlobCounter::default();
        let mut video = RgbImage::new(64, 64);
        counter.process_frame(&mut video, &mask).unwrap();

        assert_eq!(counter.objects_count(), 2);
        let mut sizes: Vec<_> = counter
            .object_rectangles()
            .iter()
            .map(|r| (r.width(), r.height()))
            .collect();
        sizes.sort();
        assert_eq!(sizes, vec![(12, 12), (20, 15)]);
        assert_eq!(video.get_pixel(2, 2), &Rgb([255, 0, 0]));
    }

    #[test]
    fn test_hole_does_not_add_object() {
        let mut mask = GrayImage::new(40, 40);
        fill(&mut mask, 5, 5, 30, 30);
        for y in 10..30 {
            for x in 10..30 {
                mask.put_pixel(x, y, image::Luma([0]));
            }
        }
        fill(&mut mask, 15, 15, 10, 10);
        assert_eq!(external_bounding_boxes(&mask).len(), 1);
    }
}
