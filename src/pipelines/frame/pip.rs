// SPDX-License-Identifier: GPL-3.0-only

//! Picture-in-picture
//!
//! Every pipeline publishes its latest output into a shared [`FrameRegistry`];
//! a camera with a PiP configuration draws the latest frames of its children
//! into sub-rectangles of its own output.

use image::RgbImage;
use image::imageops::{self, FilterType};
use std::collections::HashMap;
use std::sync::{Arc, PoisonError, RwLock};

/// One child camera placement, in percent of the parent frame
#[derive(Debug, Clone, PartialEq)]
pub struct PipEntry {
    pub camera: String,
    pub x: f32,
    pub y: f32,
    pub width: f32,
    pub height: f32,
}

impl PipEntry {
    /// Pixel rectangle inside a `width`×`height` parent, `None` when empty
    pub fn to_pixels(&self, width: u32, height: u32) -> Option<(u32, u32, u32, u32)> {
        let px = |pct: f32, total: u32| ((pct.clamp(0.0, 100.0) / 100.0) * total as f32).round() as u32;
        let x = px(self.x, width);
        let y = px(self.y, height);
        let w = px(self.width, width).min(width.saturating_sub(x));
        let h = px(self.height, height).min(height.saturating_sub(y));
        (w > 0 && h > 0).then_some((x, y, w, h))
    }
}

/// Parse `id,x,y,w,h|id,x,y,w,h`; malformed entries are skipped
pub fn parse_pip_config(config: &str) -> Vec<PipEntry> {
    config
        .split('|')
        .filter_map(|entry| {
            let parts: Vec<&str> = entry.split(',').map(str::trim).collect();
            let [camera, x, y, w, h] = parts.as_slice() else {
                return None;
            };
            if camera.is_empty() {
                return None;
            }
            Some(PipEntry {
                camera: camera.to_string(),
                x: x.parse().ok()?,
                y: y.parse().ok()?,
                width: w.parse().ok()?,
                height: h.parse().ok()?,
            })
        })
        .collect()
}

#[derive(Debug, Default)]
struct Published {
    frame: Option<Arc<RgbImage>>,
    error: bool,
}

/// Latest output frame of every camera
#[derive(Debug, Clone, Default)]
pub struct FrameRegistry {
    slots: Arc<RwLock<HashMap<String, Published>>>,
}

impl FrameRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn publish(&self, camera: &str, frame: Arc<RgbImage>) {
        let mut slots = self.slots.write().unwrap_or_else(PoisonError::into_inner);
        let slot = slots.entry(camera.to_string()).or_default();
        slot.frame = Some(frame);
        slot.error = false;
    }

    pub fn set_error(&self, camera: &str, error: bool) {
        let mut slots = self.slots.write().unwrap_or_else(PoisonError::into_inner);
        slots.entry(camera.to_string()).or_default().error = error;
    }

    /// Latest frame of a camera that is not in error state
    pub fn latest(&self, camera: &str) -> Option<Arc<RgbImage>> {
        let slots = self.slots.read().unwrap_or_else(PoisonError::into_inner);
        slots
            .get(camera)
            .filter(|slot| !slot.error)
            .and_then(|slot| slot.frame.clone())
    }

    pub fn remove(&self, camera: &str) {
        self.slots
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(camera);
    }
}

/// Draw each child's latest frame into its rectangle
pub fn compose(frame: &mut RgbImage, entries: &[PipEntry], registry: &FrameRegistry, own_id: &str) {
    let (w, h) = frame.dimensions();
    for entry in entries {
        if entry.camera == own_id {
            continue;
        }
        let Some((x, y, pw, ph)) = entry.to_pixels(w, h) else {
            continue;
        };
        let Some(child) = registry.latest(&entry.camera) else {
            continue;
        };
        let scaled = imageops::resize(child.as_ref(), pw, ph, FilterType::Triangle);
        imageops::replace(frame, &scaled, i64::from(x), i64::from(y));
    }
}
