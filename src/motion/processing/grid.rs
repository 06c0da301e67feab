// SPDX-License-Identifier: GPL-3.0-only

//! Grid motion area processing

use super::MotionProcessing;
use crate::errors::MotionError;
use image::{GrayImage, Rgb, RgbImage};
use imageproc::drawing::draw_hollow_rect_mut;
use imageproc::rect::Rect;

pub const DEFAULT_GRID_SIZE: u32 = 16;
pub const DEFAULT_HIGHLIGHT_AMOUNT: f32 = 0.15;

/// Splits the frame into a grid and measures the motion fraction of every cell
///
/// Cell size uses ceil division, so the last row and column may be partial
/// (or empty on frames smaller than the grid) and the cells always tile the
/// whole frame.
#[derive(Debug, Clone)]
pub struct GridMotionArea {
    grid_width: u32,
    grid_height: u32,
    pub highlight: bool,
    pub highlight_amount: f32,
    pub highlight_color: Rgb<u8>,
    motion_grid: Vec<f32>,
}

impl Default for GridMotionArea {
    fn default() -> Self {
        Self::new(DEFAULT_GRID_SIZE as i32, DEFAULT_GRID_SIZE as i32)
    }
}

impl GridMotionArea {
    pub fn new(grid_width: i32, grid_height: i32) -> Self {
        let grid_width = grid_width.clamp(2, 64) as u32;
        let grid_height = grid_height.clamp(2, 64) as u32;
        Self {
            grid_width,
            grid_height,
            highlight: true,
            highlight_amount: DEFAULT_HIGHLIGHT_AMOUNT,
            highlight_color: Rgb([255, 0, 0]),
            motion_grid: vec![0.0; (grid_width * grid_height) as usize],
        }
    }

    pub fn grid_size(&self) -> (u32, u32) {
        (self.grid_width, self.grid_height)
    }

    /// Row-major motion fractions, one per cell
    pub fn motion_grid(&self) -> &[f32] {
        &self.motion_grid
    }

    pub fn cell(&self, col: u32, row: u32) -> f32 {
        self.motion_grid
            .get((row * self.grid_width + col) as usize)
            .copied()
            .unwrap_or(0.0)
    }

    /// Pixel bounds `(x, y, w, h)` of a cell on a `width`x`height` frame
    pub fn cell_bounds(&self, col: u32, row: u32, width: u32, height: u32) -> (u32, u32, u32, u32) {
        let cell_w = width.div_ceil(self.grid_width);
        let cell_h = height.div_ceil(self.grid_height);
        let x = (col * cell_w).min(width);
        let y = (row * cell_h).min(height);
        let w = cell_w.min(width - x);
        let h = cell_h.min(height - y);
        (x, y, w, h)
    }
}

impl MotionProcessing for GridMotionArea {
    fn process_frame(&mut self, video: &mut RgbImage, motion: &GrayImage) -> Result<(), MotionError> {
        let (width, height) = video.dimensions();
        if motion.dimensions() != (width, height) {
            return Ok(());
        }

        for row in 0..self.grid_height {
            for col in 0..self.grid_width {
                let (x, y, w, h) = self.cell_bounds(col, row, width, height);
                let idx = (row * self.grid_width + col) as usize;
                if w == 0 || h == 0 {
                    self.motion_grid[idx] = 0.0;
                    continue;
                }
                let mut changed = 0u32;
                for py in y..y + h {
                    for px in x..x + w {
                        if motion.get_pixel(px, py)[0] != 0 {
                            changed += 1;
                        }
                    }
                }
                self.motion_grid[idx] = changed as f32 / (w * h) as f32;
            }
        }

        if self.highlight {
            for row in 0..self.grid_height {
                for col in 0..self.grid_width {
                    if self.cell(col, row) <= self.highlight_amount {
                        continue;
                    }
                    let (x, y, w, h) = self.cell_bounds(col, row, width, height);
                    if w > 0 && h > 0 {
                        let rect = Rect::at(x as i32, y as i32).of_size(w, h);
                        draw_hollow_rect_mut(video, rect, self.highlight_color);
                    }
                }
            }
        }
        Ok(())
    }

    fn reset(&mut self) {
        self.motion_grid = vec![0.0; (self.grid_width * self.grid_height) as usize];
    }
}
