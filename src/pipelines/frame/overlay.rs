// SPDX-License-Identifier: GPL-3.0-only

//! Timestamp and status text overlay
//!
//! Templates mix substitution tokens with `strftime` fields:
//!
//! | Token      | Replaced with                         |
//! |------------|---------------------------------------|
//! | `{FPS}`    | Frame rate, two decimals              |
//! | `{CAMERA}` | Camera name                           |
//! | `{REC}`    | `REC` while recording, else empty     |
//! | `{LEVEL}`  | Motion level, up to two decimals      |
//! | `{<tag>}`  | Value of a user tag                   |

use crate::constants::overlay::{BACKGROUND_ALPHA, FONT_SEARCH_PATHS, INVALID_TIMESTAMP, TEXT_PADDING};
use ab_glyph::{FontVec, PxScale};
use chrono::format::{Item, StrftimeItems};
use chrono::{Duration as ChronoDuration, NaiveDateTime};
use image::{Rgb, RgbImage};
use imageproc::drawing::{draw_text_mut, text_size};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt::Write;
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

/// Where the overlay text is placed
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Anchor {
    Off,
    #[default]
    TopLeft,
    TopCenter,
    TopRight,
    BottomLeft,
    BottomCenter,
    BottomRight,
}

impl Anchor {
    /// Top-left corner of a `text_w`×`text_h` box in a `width`×`height` frame
    pub fn origin(&self, width: u32, height: u32, text_w: u32, text_h: u32) -> Option<(i32, i32)> {
        let right = width.saturating_sub(text_w) as i32;
        let center = (width.saturating_sub(text_w) / 2) as i32;
        let bottom = height.saturating_sub(text_h) as i32;
        match self {
            Anchor::Off => None,
            Anchor::TopLeft => Some((0, 0)),
            Anchor::TopCenter => Some((center, 0)),
            Anchor::TopRight => Some((right, 0)),
            Anchor::BottomLeft => Some((0, bottom)),
            Anchor::BottomCenter => Some((center, bottom)),
            Anchor::BottomRight => Some((right, bottom)),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct OverlaySettings {
    pub template: String,
    pub anchor: Anchor,
    /// Hours added to local time
    pub utc_offset_hours: f64,
    pub show_background: bool,
    pub foreground: [u8; 3],
    pub background: [u8; 3],
    pub font_path: Option<PathBuf>,
    /// Text height in pixels, 0 picks one from the frame height
    pub font_size: f32,
}

impl Default for OverlaySettings {
    fn default() -> Self {
        Self {
            template: "{FPS} FPS %Y-%m-%d %H:%M:%S".to_string(),
            anchor: Anchor::TopLeft,
            utc_offset_hours: 0.0,
            show_background: true,
            foreground: [255, 255, 255],
            background: [0, 0, 0],
            font_path: None,
            font_size: 0.0,
        }
    }
}

/// Values substituted into the template for one frame
#[derive(Debug, Clone, Copy)]
pub struct OverlayContext<'a> {
    pub fps: f64,
    pub camera: &'a str,
    pub recording: bool,
    pub level: f64,
    pub tags: &'a HashMap<String, String>,
}

/// Parse `key=value;key=value`
pub fn parse_tags(config: &str) -> HashMap<String, String> {
    config
        .split(';')
        .filter_map(|pair| {
            let (key, value) = pair.split_once('=')?;
            let key = key.trim();
            (!key.is_empty()).then(|| (key.to_string(), value.trim().to_string()))
        })
        .collect()
}

fn format_level(level: f64) -> String {
    let s = format!("{:.2}", level);
    s.trim_end_matches('0').trim_end_matches('.').to_string()
}

/// Substituted values must not be read as strftime fields
fn literal(value: &str) -> String {
    value.replace('%', "%%")
}

/// Expand tokens and strftime fields of `template`
pub fn render_text(template: &str, ctx: &OverlayContext<'_>, time: NaiveDateTime) -> String {
    let mut text = template
        .replace("{FPS}", &format!("{:.2}", ctx.fps))
        .replace("{CAMERA}", &literal(ctx.camera))
        .replace("{REC}", if ctx.recording { "REC" } else { "" })
        .replace("{LEVEL}", &format_level(ctx.level));
    for (key, value) in ctx.tags {
        text = text.replace(&format!("{{{}}}", key), &literal(value));
    }

    let items: Vec<Item<'_>> = StrftimeItems::new(&text).collect();
    if items.iter().any(|item| matches!(item, Item::Error)) {
        return INVALID_TIMESTAMP.to_string();
    }
    let mut out = String::new();
    match write!(out, "{}", time.format_with_items(items.iter())) {
        Ok(()) => out,
        Err(_) => INVALID_TIMESTAMP.to_string(),
    }
}

/// Local wall-clock time shifted by the configured offset
pub fn overlay_time(offset_hours: f64) -> NaiveDateTime {
    let offset = ChronoDuration::milliseconds((offset_hours * 3_600_000.0).round() as i64);
    chrono::Local::now().naive_local() + offset
}

fn load_font(path: &Path) -> Option<FontVec> {
    let bytes = std::fs::read(path).ok()?;
    FontVec::try_from_vec(bytes).ok()
}

/// Text renderer with its loaded font
pub struct TextOverlay {
    settings: OverlaySettings,
    font: Option<FontVec>,
}

impl TextOverlay {
    pub fn new(settings: OverlaySettings) -> Self {
        let font = if settings.anchor == Anchor::Off {
            None
        } else {
            let configured = settings.font_path.iter().map(PathBuf::as_path);
            let system = FONT_SEARCH_PATHS.iter().map(Path::new);
            let found = configured
                .chain(system)
                .find_map(|path| load_font(path).map(|font| (path.to_path_buf(), font)));
            match found {
                Some((path, font)) => {
                    debug!(font = %path.display(), "Overlay font loaded");
                    Some(font)
                }
                None => {
                    warn!("No usable overlay font found, text overlay disabled");
                    None
                }
            }
        };
        Self { settings, font }
    }

    pub fn settings(&self) -> &OverlaySettings {
        &self.settings
    }

    pub fn is_active(&self) -> bool {
        self.settings.anchor != Anchor::Off && self.font.is_some()
    }

    fn scale_for(&self, frame_height: u32) -> PxScale {
        let size = if self.settings.font_size > 0.0 {
            self.settings.font_size
        } else {
            (frame_height as f32 / 30.0).max(12.0)
        };
        PxScale::from(size)
    }

    pub fn draw(&self, frame: &mut RgbImage, ctx: &OverlayContext<'_>) {
        let Some(font) = self.font.as_ref() else {
            return;
        };
        let text = render_text(
            &self.settings.template,
            ctx,
            overlay_time(self.settings.utc_offset_hours),
        );
        if text.trim().is_empty() {
            return;
        }

        let (w, h) = frame.dimensions();
        let scale = self.scale_for(h);
        let (tw, th) = text_size(scale, font, &text);
        let box_w = (tw + TEXT_PADDING).min(w);
        let box_h = th.min(h);
        let Some((x, y)) = self.settings.anchor.origin(w, h, box_w, box_h) else {
            return;
        };

        if self.settings.show_background {
            blend_rect(
                frame,
                (x as u32, y as u32, box_w, box_h),
                Rgb(self.settings.background),
                BACKGROUND_ALPHA,
            );
        }
        draw_text_mut(frame, Rgb(self.settings.foreground), x, y, scale, font, &text);
    }
}

/// Alpha-blend a solid rectangle onto the frame
pub fn blend_rect(frame: &mut RgbImage, rect: (u32, u32, u32, u32), color: Rgb<u8>, alpha: u8) {
    let (x0, y0, rw, rh) = rect;
    let (w, h) = frame.dimensions();
    let a = u32::from(alpha);
    for y in y0..(y0 + rh).min(h) {
        for x in x0..(x0 + rw).min(w) {
            let px = frame.get_pixel_mut(x, y);
            for c in 0..3 {
                px.0[c] = ((u32::from(px.0[c]) * (255 - a) + u32::from(color.0[c]) * a) / 255) as u8;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    fn time() -> NaiveDateTime {
        NaiveDate::from_ymd_opt(2024, 3, 5)
            .and_then(|d| d.and_hms_opt(7, 8, 9))
            .unwrap()
    }

    fn ctx(tags: &HashMap<String, String>) -> OverlayContext<'_> {
        OverlayContext {
            fps: 24.5,
            camera: "Door",
            recording: true,
            level: 0.5,
            tags,
        }
    }

    #[test]
    fn test_tokens_and_time() {
        let tags = parse_tags("site=North; ;empty=");
        let text = render_text("{CAMERA} {REC} {FPS} {LEVEL} {site} %Y-%m-%d %H:%M", &ctx(&tags), time());
        assert_eq!(text, "Door REC 24.50 0.5 North 2024-03-05 07:08");
    }

    #[test]
    fn test_invalid_format() {
        let tags = HashMap::new();
        assert_eq!(render_text("%Q %", &ctx(&tags), time()), INVALID_TIMESTAMP);
    }

    #[test]
    fn test_percent_in_camera_name_is_literal() {
        let tags = HashMap::new();
        let context = OverlayContext {
            camera: "100%",
            ..ctx(&tags)
        };
        assert_eq!(render_text("{CAMERA}", &context, time()), "100%");
    }

    #[test]
    fn test_level_formatting() {
        assert_eq!(format_level(0.0), "0");
        assert_eq!(format_level(0.126), "0.13");
        assert_eq!(format_level(1.0), "1");
    }

    #[test]
    fn test_anchor_origins() {
        assert_eq!(Anchor::Off.origin(100, 50, 20, 10), None);
        assert_eq!(Anchor::TopRight.origin(100, 50, 20, 10), Some((80, 0)));
        assert_eq!(Anchor::BottomCenter.origin(100, 50, 20, 10), Some((40, 40)));
    }

    #[test]
    fn test_blend_rect_half_alpha() {
        let mut frame = RgbImage::from_pixel(2, 2, Rgb([255, 255, 255]));
        blend_rect(&mut frame, (0, 0, 1, 1), Rgb([0, 0, 0]), 128);
        assert_eq!(frame.get_pixel(0, 0), &Rgb([127, 127, 127]));
        assert_eq!(frame.get_pixel(1, 1), &Rgb([255, 255, 255]));
    }
}
